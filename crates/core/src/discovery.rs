//! Walks the transcript tree: one directory per project, each containing
//! transcript files and an optional `sessions-index.json` title map.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::DiscoveryError;

/// Non-session files that the indexer must skip by filename stem.
pub fn is_skippable_stem(stem: &str) -> bool {
    stem.starts_with("agent-") || stem == "sessions-index"
}

/// List project directories directly under the transcript root.
pub async fn discover_projects(root: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
    let mut read_dir = tokio::fs::read_dir(root)
        .await
        .map_err(|e| DiscoveryError::io(root, e))?;

    let mut projects = Vec::new();
    while let Some(entry) = read_dir
        .next_entry()
        .await
        .map_err(|e| DiscoveryError::io(root, e))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| DiscoveryError::io(entry.path(), e))?;
        if file_type.is_dir() {
            projects.push(entry.path());
        }
    }
    projects.sort();
    Ok(projects)
}

/// List transcript (`.jsonl`) files within one project directory, excluding
/// non-session files per [`is_skippable_stem`].
pub async fn discover_transcript_files(project_dir: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
    let mut read_dir = tokio::fs::read_dir(project_dir)
        .await
        .map_err(|e| DiscoveryError::io(project_dir, e))?;

    let mut files = Vec::new();
    while let Some(entry) = read_dir
        .next_entry()
        .await
        .map_err(|e| DiscoveryError::io(project_dir, e))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if is_skippable_stem(stem) {
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

/// Read a project's `sessions-index.json` title map. Malformed files yield
/// an empty map and a logged error rather than aborting discovery.
pub async fn load_title_map(project_dir: &Path) -> HashMap<String, String> {
    let path = project_dir.join("sessions-index.json");
    let raw = match tokio::fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read sessions-index.json");
            return HashMap::new();
        }
    };

    let value: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "malformed sessions-index.json");
            return HashMap::new();
        }
    };

    let Some(object) = value.as_object() else {
        return HashMap::new();
    };

    object
        .iter()
        .filter_map(|(session_id, v)| {
            let title = match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Object(o) => o
                    .get("summary")
                    .or_else(|| o.get("title"))
                    .and_then(|t| t.as_str())
                    .map(|s| s.to_string()),
                _ => None,
            };
            title.map(|t| (session_id.clone(), t))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_agent_and_sessions_index_stems() {
        assert!(is_skippable_stem("agent-123"));
        assert!(is_skippable_stem("sessions-index"));
        assert!(!is_skippable_stem("abc123"));
    }

    #[tokio::test]
    async fn discovers_jsonl_files_excluding_skippable_stems() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("abc.jsonl"), "").await.unwrap();
        tokio::fs::write(dir.path().join("agent-1.jsonl"), "").await.unwrap();
        tokio::fs::write(dir.path().join("sessions-index.json"), "{}").await.unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), "").await.unwrap();

        let files = discover_transcript_files(dir.path()).await.unwrap();
        assert_eq!(files, vec![dir.path().join("abc.jsonl")]);
    }

    #[tokio::test]
    async fn loads_title_map_from_string_values() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("sessions-index.json"),
            r#"{"abc": "My session title"}"#,
        )
        .await
        .unwrap();

        let map = load_title_map(dir.path()).await;
        assert_eq!(map.get("abc"), Some(&"My session title".to_string()));
    }

    #[tokio::test]
    async fn malformed_title_map_yields_empty() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("sessions-index.json"), "not json")
            .await
            .unwrap();
        let map = load_title_map(dir.path()).await;
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn missing_title_map_yields_empty() {
        let dir = tempfile::tempdir().unwrap();
        let map = load_title_map(dir.path()).await;
        assert!(map.is_empty());
    }
}
