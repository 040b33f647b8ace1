use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

/// Flat-file document store. Every document is one JSON file under the data
/// directory, read and written wholesale.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).with_context(|| format!("Failed to create data dir {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// A missing or unreadable document is "empty", never an error. A corrupt
    /// file is logged and ignored; the next save replaces it.
    pub async fn load_document<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let path = self.path_for(name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(_) => return None,
        };

        match serde_json::from_slice(&bytes) {
            Ok(document) => Some(document),
            Err(e) => {
                warn!("Ignoring corrupt document {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Write to a uniquely named temp file in the data dir, fsync, then
    /// rename over the target. A crash mid-write leaves the previous document
    /// intact, and concurrent saves of the same document cannot share a temp
    /// file and tear each other's writes.
    pub async fn save_document<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.path_for(name);
        let bytes = serde_json::to_vec_pretty(value).context("Failed to serialize document")?;
        let root = self.root.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&root)
                .with_context(|| format!("Failed to create temp file in {}", root.display()))?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path)
                .with_context(|| format!("Failed to move temp file into place at {}", path.display()))?;
            Ok(())
        })
        .await
        .context("Document write task failed")?
    }
}
