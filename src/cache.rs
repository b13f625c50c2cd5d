use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::workspace::ProjectFile;

/// Last-known project state, written after successful loads and file
/// updates. When the backend is unreachable on startup the snapshot lets
/// the workspace open read-only instead of empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    pub project_id: String,
    pub files: Vec<ProjectFile>,
    #[serde(default)]
    pub build_params: Option<serde_json::Value>,
    pub saved_at: DateTime<Utc>,
}

impl WorkspaceSnapshot {
    pub fn new(project_id: &str, files: Vec<ProjectFile>) -> Self {
        Self {
            project_id: project_id.to_string(),
            files,
            build_params: None,
            saved_at: Utc::now(),
        }
    }
}

pub fn snapshot_path() -> Result<PathBuf> {
    let cache = dirs::cache_dir().ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
    Ok(cache.join("vibe-workspace").join("snapshot.json"))
}

pub fn save_snapshot(path: &Path, snapshot: &WorkspaceSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create cache directory: {}", parent.display()))?;
    }

    let content = serde_json::to_string(snapshot).context("Failed to serialize snapshot")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write snapshot: {}", path.display()))?;
    Ok(())
}

/// Load the snapshot for a project. Returns None when no snapshot exists,
/// it belongs to a different project, or it fails to parse. A corrupt file
/// is logged and treated as absent.
pub fn load_snapshot(path: &Path, project_id: &str) -> Option<WorkspaceSnapshot> {
    let content = std::fs::read_to_string(path).ok()?;

    let snapshot: WorkspaceSnapshot = match serde_json::from_str(&content) {
        Ok(s) => s,
        Err(e) => {
            warn!("Ignoring corrupt snapshot {}: {}", path.display(), e);
            return None;
        }
    };

    if snapshot.project_id != project_id {
        return None;
    }
    Some(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("snap").join("snapshot.json");

        let files = vec![ProjectFile::new("/a.js", "let x = 1;".into())];
        let snapshot = WorkspaceSnapshot::new("proj-1", files);
        save_snapshot(&path, &snapshot).unwrap();

        let loaded = load_snapshot(&path, "proj-1").unwrap();
        assert_eq!(loaded.project_id, "proj-1");
        assert_eq!(loaded.files.len(), 1);
        assert_eq!(loaded.files[0].path, "/a.js");
    }

    #[test]
    fn test_other_project_snapshot_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("snapshot.json");

        let snapshot = WorkspaceSnapshot::new("proj-1", Vec::new());
        save_snapshot(&path, &snapshot).unwrap();

        assert!(load_snapshot(&path, "proj-2").is_none());
    }

    #[test]
    fn test_corrupt_snapshot_treated_as_absent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("snapshot.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(load_snapshot(&path, "proj-1").is_none());
    }

    #[test]
    fn test_missing_snapshot_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.json");
        assert!(load_snapshot(&path, "proj-1").is_none());
    }
}
