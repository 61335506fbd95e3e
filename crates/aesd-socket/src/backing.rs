//! Optional flat-file mirror of the command log
//!
//! Every completed record is appended to the file in store order. The file
//! is truncated when the server starts and removed on clean shutdown. It is
//! never read back; the in-memory store stays the source of every response.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ServerError, ServerResult};

/// Append-only mirror file
#[derive(Debug)]
pub struct BackingFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl BackingFile {
    /// Create (or truncate) the mirror file
    pub async fn create(path: impl Into<PathBuf>) -> ServerResult<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .await
            .map_err(|e| ServerError::Io(format!("{}: {e}", path.display())))?;

        info!(path = %path.display(), "Opened backing file");

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one completed record
    pub async fn append(&self, record: &[u8]) -> ServerResult<()> {
        let mut file = self.file.lock().await;
        file.write_all(record).await?;
        file.flush().await?;
        Ok(())
    }

    /// Close and delete the file
    pub async fn remove(&self) -> ServerResult<()> {
        self.file.lock().await.sync_all().await?;
        tokio::fs::remove_file(&self.path).await?;
        debug!(path = %self.path.display(), "Removed backing file");
        Ok(())
    }
}
