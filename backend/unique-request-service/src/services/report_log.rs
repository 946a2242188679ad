use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::Result;

/// Destination for aggregator report lines
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn write_line(&self, line: &str) -> Result<()>;
}

/// Append-only text file, one report per line
pub struct FileReportSink {
    path: PathBuf,
    // Serialises appends so lines never interleave.
    lock: Mutex<()>,
}

impl FileReportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl ReportSink for FileReportSink {
    async fn write_line(&self, line: &str) -> Result<()> {
        let _guard = self.lock.lock().await;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(format!("{}\n", line).as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
