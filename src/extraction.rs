//! Usage extraction from raw log objects
//!
//! Upstream record shapes vary: usage may sit at the top level, under a
//! response or metadata envelope, or inside the assistant message. Rather than
//! branching on each shape, [`UsageExtractor`] walks an ordered list of
//! [`UsageLocation`]s and stops at the first one holding a recognisable usage
//! object. Field names are resolved through alias lists in the same way, so a
//! new source shape is a data change, not a control-flow change.

use crate::models::UsageRecord;
use crate::timestamp_parser::TimestampParser;
use serde_json::{Map, Value};

/// A named path into a raw log object where usage data may live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageLocation {
    pub name: &'static str,
    pub path: &'static [&'static str],
}

impl UsageLocation {
    pub const fn new(name: &'static str, path: &'static [&'static str]) -> Self {
        Self { name, path }
    }

    fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Map<String, Value>> {
        lookup(root, self.path)?.as_object()
    }
}

/// Locations tried in order; the first match wins.
pub const DEFAULT_USAGE_LOCATIONS: &[UsageLocation] = &[
    UsageLocation::new("usage", &["usage"]),
    UsageLocation::new("response.usage", &["response", "usage"]),
    UsageLocation::new("metadata.usage", &["metadata", "usage"]),
    UsageLocation::new("stats", &["stats"]),
    UsageLocation::new("message.usage", &["message", "usage"]),
];

pub const TOTAL_TOKEN_KEYS: &[&str] = &["total_tokens", "totalTokens"];
pub const INPUT_TOKEN_KEYS: &[&str] = &["input_tokens", "inputTokens", "prompt_tokens"];
pub const OUTPUT_TOKEN_KEYS: &[&str] = &["output_tokens", "outputTokens", "completion_tokens"];
pub const CACHE_CREATION_KEYS: &[&str] = &["cache_creation_input_tokens", "cacheCreationInputTokens"];
pub const CACHE_READ_KEYS: &[&str] = &["cache_read_input_tokens", "cacheReadInputTokens"];

pub const MODEL_PATHS: &[&[&str]] = &[
    &["model"],
    &["message", "model"],
    &["response", "model"],
    &["metadata", "model"],
];

pub const TIMESTAMP_PATHS: &[&[&str]] = &[&["timestamp"], &["created_at"], &["createdAt"]];

const TOKEN_KEY_GROUPS: &[&[&str]] = &[
    TOTAL_TOKEN_KEYS,
    INPUT_TOKEN_KEYS,
    OUTPUT_TOKEN_KEYS,
    CACHE_CREATION_KEYS,
    CACHE_READ_KEYS,
];

/// Turns raw JSON log objects into [`UsageRecord`]s.
#[derive(Debug, Clone)]
pub struct UsageExtractor {
    locations: Vec<UsageLocation>,
}

impl Default for UsageExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageExtractor {
    pub fn new() -> Self {
        Self::with_locations(DEFAULT_USAGE_LOCATIONS.to_vec())
    }

    pub fn with_locations(locations: Vec<UsageLocation>) -> Self {
        Self { locations }
    }

    /// Append a location to the end of the search order.
    pub fn add_location(&mut self, location: UsageLocation) {
        self.locations.push(location);
    }

    pub fn locations(&self) -> &[UsageLocation] {
        &self.locations
    }

    /// Find the usage object for a raw line, if any location holds one.
    pub fn find_usage<'a>(&self, raw: &'a Value) -> Option<(&'static str, &'a Map<String, Value>)> {
        self.locations.iter().find_map(|location| {
            location
                .resolve(raw)
                .filter(|usage| is_recognisable(usage))
                .map(|usage| (location.name, usage))
        })
    }

    /// Extract one record. Lines without a recognisable usage object yield `None`.
    pub fn extract(&self, raw: &Value) -> Option<UsageRecord> {
        let (_, usage) = self.find_usage(raw)?;

        let input_tokens = token_field(usage, INPUT_TOKEN_KEYS).unwrap_or(0);
        let output_tokens = token_field(usage, OUTPUT_TOKEN_KEYS).unwrap_or(0);
        let cache_creation_tokens = token_field(usage, CACHE_CREATION_KEYS).unwrap_or(0);
        let cache_read_tokens = token_field(usage, CACHE_READ_KEYS).unwrap_or(0);
        let total_tokens = token_field(usage, TOTAL_TOKEN_KEYS).unwrap_or_else(|| {
            input_tokens
                .saturating_add(output_tokens)
                .saturating_add(cache_creation_tokens)
                .saturating_add(cache_read_tokens)
        });

        let model = MODEL_PATHS
            .iter()
            .find_map(|path| lookup(raw, path).and_then(Value::as_str))
            .map(str::to_string);

        let timestamp = TIMESTAMP_PATHS
            .iter()
            .find_map(|path| lookup(raw, path).and_then(|v| TimestampParser::parse_value(v).ok()));

        Some(UsageRecord {
            timestamp,
            model,
            input_tokens,
            output_tokens,
            cache_creation_tokens,
            cache_read_tokens,
            total_tokens,
        })
    }
}

fn lookup<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |value, key| value.get(*key))
}

fn is_recognisable(usage: &Map<String, Value>) -> bool {
    TOKEN_KEY_GROUPS
        .iter()
        .flat_map(|keys| keys.iter())
        .any(|key| usage.contains_key(*key))
}

/// First alias present with a non-negative integer value.
fn token_field(usage: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| usage.get(*key).and_then(as_token_count))
}

fn as_token_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
