use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::{Result, ScanError};
use crate::types::ResultDocument;

/// Durable home for terminal result documents.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save(&self, doc: &ResultDocument) -> Result<()>;

    /// `Ok(None)` when no document exists for the id.
    async fn load(&self, scan_id: &str) -> Result<Option<ResultDocument>>;
}

/// One pretty-printed `<scan_id>.json` file per job in a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, scan_id: &str) -> Result<PathBuf> {
        // Ids become file names; refuse anything that could escape the directory.
        let ok = !scan_id.is_empty()
            && scan_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !ok {
            return Err(ScanError::NotFound(scan_id.to_string()));
        }
        Ok(self.dir.join(format!("{scan_id}.json")))
    }
}

#[async_trait]
impl ResultStore for JsonFileStore {
    async fn save(&self, doc: &ResultDocument) -> Result<()> {
        let path = self.path_for(&doc.scan_id)?;
        let json = serde_json::to_vec_pretty(doc)?;
        fs::write(&path, json).await?;
        debug!(path = %path.display(), "saved result document");
        Ok(())
    }

    async fn load(&self, scan_id: &str) -> Result<Option<ResultDocument>> {
        let path = match self.path_for(scan_id) {
            Ok(p) => p,
            Err(_) => return Ok(None),
        };
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
