use glob::{glob, Pattern};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Locates the projects directory holding conversation logs.
///
/// An explicit Claude config directory wins; otherwise the first existing
/// platform candidate is used, falling back to the primary candidate so a
/// first run simply sees no data.
pub fn resolve_base_dir(claude_home: Option<&Path>) -> PathBuf {
    if let Some(home) = claude_home {
        return home.join("projects");
    }

    let candidates = candidate_base_dirs();
    for candidate in &candidates {
        if candidate.is_dir() {
            debug!(base_dir = %candidate.display(), "Using log directory");
            return candidate.clone();
        }
    }

    candidates
        .into_iter()
        .next()
        .unwrap_or_else(|| PathBuf::from(".claude").join("projects"))
}

/// Platform search order for the projects directory.
pub fn candidate_base_dirs() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if cfg!(windows) {
        if let Some(appdata) = dirs::config_dir() {
            candidates.push(appdata.join("Claude").join("projects"));
        }
    }

    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".claude").join("projects"));
        if !cfg!(windows) {
            candidates.push(home.join(".config").join("claude").join("projects"));
        }
    }

    candidates
}

/// Handles traversal of the `{project}/{conversation}.jsonl` log layout
#[derive(Debug, Clone)]
pub struct LogStore {
    base_dir: PathBuf,
}

impl LogStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Whether the base directory exists at all. Absent means "no data yet".
    pub fn has_data_source(&self) -> bool {
        self.base_dir.is_dir()
    }

    /// Project directory names, sorted. Empty when the base directory is absent.
    pub fn list_projects(&self) -> Vec<String> {
        if !self.base_dir.exists() {
            debug!(base_dir = %self.base_dir.display(), "Log directory absent, no projects");
            return Vec::new();
        }

        let entries = match std::fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(base_dir = %self.base_dir.display(), error = %e, "Failed to read log directory");
                return Vec::new();
            }
        };

        let mut projects: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        projects.sort();
        projects
    }

    /// Directory for `project_id`, if the id names an existing project.
    pub fn project_dir(&self, project_id: &str) -> Option<PathBuf> {
        if !is_plain_component(project_id) {
            return None;
        }
        let dir = self.base_dir.join(project_id);
        dir.is_dir().then_some(dir)
    }

    pub fn project_exists(&self, project_id: &str) -> bool {
        self.project_dir(project_id).is_some()
    }

    /// Conversation logs of a project, sorted by path.
    pub fn list_conversation_files(&self, project_id: &str) -> Vec<PathBuf> {
        let Some(dir) = self.project_dir(project_id) else {
            return Vec::new();
        };

        let pattern = PathBuf::from(Pattern::escape(&dir.to_string_lossy())).join("*.jsonl");
        let mut files: Vec<PathBuf> = match glob(&pattern.to_string_lossy()) {
            Ok(paths) => paths.flatten().filter(|p| p.is_file()).collect(),
            Err(e) => {
                warn!(project = project_id, error = %e, "Invalid glob pattern for project");
                Vec::new()
            }
        };
        files.sort();
        files
    }
}

fn is_plain_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
