use policy_engine::adapter::{format_policy_text, parse_policy_text, Adapter, PolicyRow};
use policy_engine::{PolicyError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Policy rows kept in a comma-separated text file, one row per line.
///
/// Only whole-file load and save are supported; the enforcer skips
/// incremental writes and the CLI saves after each mutation.
pub struct FileAdapter {
    path: PathBuf,
}

impl FileAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Adapter for FileAdapter {
    fn load_policy(&self) -> Result<Vec<PolicyRow>> {
        let text = fs::read_to_string(&self.path).map_err(|e| {
            PolicyError::Adapter(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        let rows = parse_policy_text(&text)?;
        debug!(path = %self.path.display(), rows = rows.len(), "Read policy file");
        Ok(rows)
    }

    fn save_policy(&self, rows: &[PolicyRow]) -> Result<()> {
        let text = format_policy_text(rows)?;
        fs::write(&self.path, text).map_err(|e| {
            PolicyError::Adapter(format!("Failed to write {}: {}", self.path.display(), e))
        })
    }
}
