//! On-disk storage for CM output files.
//!
//! Each task gets its own directory under the artifact root, so deleting a
//! task maps to removing one directory.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use uuid::Uuid;

use crate::cm::CmArtifact;

/// Metadata for a stored artifact, persisted alongside the task record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub path: PathBuf,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, std::io::Error> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Write an artifact to `<root>/<task_id>/<filename>` and return its
    /// reference, including the content digest served as the ETag.
    pub async fn store(
        &self,
        task_id: Uuid,
        artifact: &CmArtifact,
    ) -> Result<ArtifactRef, std::io::Error> {
        let dir = self.root.join(task_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;

        let filename = sanitize_filename(&artifact.filename);
        let path = dir.join(&filename);
        tokio::fs::write(&path, &artifact.bytes).await?;

        let digest = Sha256::digest(&artifact.bytes);

        Ok(ArtifactRef {
            path,
            filename,
            content_type: artifact.content_type.clone(),
            size: artifact.bytes.len() as u64,
            sha256: hex::encode(digest),
        })
    }

    pub async fn open(&self, artifact: &ArtifactRef) -> Result<tokio::fs::File, std::io::Error> {
        tokio::fs::File::open(&artifact.path).await
    }

    /// Remove a task's artifact directory. Missing directories are fine;
    /// most tasks never produce a file.
    pub async fn remove(&self, task_id: Uuid) -> Result<(), std::io::Error> {
        let dir = self.root.join(task_id.to_string());
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Sanitize a filename to prevent path traversal.
/// Keeps only the final path component and strips traversal sequences.
fn sanitize_filename(s: &str) -> String {
    let filename = s.rsplit(['/', '\\']).next().unwrap_or(s);
    let cleaned = filename.replace("..", "").replace('\0', "").trim().to_string();
    if cleaned.is_empty() {
        "artifact".to_string()
    } else {
        cleaned
    }
}
