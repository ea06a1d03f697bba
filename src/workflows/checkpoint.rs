//! Persisted pause points of a research run.

use crate::research::WorkflowState;
use crate::types::{AppError, Result};
use crate::workflows::Node;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A paused run: the node to resume at and the state it will see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub node: Node,
    pub state: WorkflowState,
    /// Prompt shown to whoever has to answer before the run can continue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(node: Node, state: WorkflowState, interrupt: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            node,
            state,
            interrupt,
            created_at: Utc::now(),
        }
    }
}

/// Checkpoints as pretty JSON files, one per id, in a directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Write a checkpoint, replacing any earlier file with the same id.
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(&checkpoint.id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(checkpoint)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::info!(
            id = %checkpoint.id,
            node = %checkpoint.node,
            path = %path.display(),
            "Checkpoint saved"
        );
        Ok(path)
    }

    /// Load by id, or by path when `id_or_path` names an existing file.
    pub async fn load(&self, id_or_path: &str) -> Result<Checkpoint> {
        let direct = PathBuf::from(id_or_path);
        let path = if direct.is_file() {
            direct
        } else {
            self.path_for(id_or_path)
        };

        let body = match tokio::fs::read_to_string(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::NotFound(format!(
                    "Checkpoint '{}' not found in {}",
                    id_or_path,
                    self.dir.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&body)
            .map_err(|e| AppError::Parse(format!("Invalid checkpoint {}: {}", path.display(), e)))
    }

    /// Remove a checkpoint once its run has moved on.
    pub async fn remove(&self, id: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Ids of the stored checkpoints, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoints"));

        let mut state = WorkflowState::new("tidal energy").with_locale("zh-CN");
        state.decompose_iterations = 2;
        let checkpoint = Checkpoint::new(
            Node::HumanFeedback,
            state,
            Some("Please Review the subquestions".to_string()),
        );

        let path = store.save(&checkpoint).await.unwrap();
        assert!(path.ends_with(format!("{}.json", checkpoint.id)));

        let by_id = store.load(&checkpoint.id).await.unwrap();
        assert_eq!(by_id, checkpoint);
        let by_path = store.load(path.to_str().unwrap()).await.unwrap();
        assert_eq!(by_path.state.locale, "zh-CN");

        assert_eq!(store.list().await.unwrap(), vec![checkpoint.id.clone()]);
        store.remove(&checkpoint.id).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(matches!(
            store.load("nope").await,
            Err(AppError::NotFound(_))
        ));
        store.remove("nope").await.unwrap();
    }
}
