use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Epoch values above this are taken to be milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e12;

/// Handles parsing timestamps from the formats seen in conversation logs
pub struct TimestampParser;

impl TimestampParser {
    /// Parse a timestamp string into a DateTime<Utc>
    /// Handles both Z suffix and timezone info formats
    pub fn parse(timestamp_str: &str) -> Result<DateTime<Utc>> {
        let trimmed = timestamp_str.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(dt.with_timezone(&Utc));
        }

        // Naive datetimes are assumed to be UTC
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
            }
        }

        anyhow::bail!("Failed to parse timestamp: {}", timestamp_str)
    }

    /// Parse a JSON timestamp: a string, or a number of epoch seconds or milliseconds.
    pub fn parse_value(value: &Value) -> Result<DateTime<Utc>> {
        match value {
            Value::String(s) => Self::parse(s),
            Value::Number(n) => {
                let raw = n
                    .as_f64()
                    .ok_or_else(|| anyhow::anyhow!("Timestamp is not a finite number: {}", n))?;
                let millis = if raw.abs() >= EPOCH_MILLIS_THRESHOLD {
                    raw
                } else {
                    raw * 1000.0
                };
                Utc.timestamp_millis_opt(millis as i64)
                    .single()
                    .ok_or_else(|| anyhow::anyhow!("Timestamp out of range: {}", n))
            }
            other => anyhow::bail!("Unsupported timestamp value: {}", other),
        }
    }
}
