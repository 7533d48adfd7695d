//! Record writers.

use async_trait::async_trait;
use barrage_core::{RecordWriter, WriteRecord};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Appends one JSON object per line to a file created on first write.
#[derive(Debug)]
pub struct JsonLinesWriter {
    path: PathBuf,
    file: Mutex<Option<BufWriter<File>>>,
}

impl JsonLinesWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    /// `<dir>/<name>.jsonl`
    pub fn in_dir(dir: &Path, name: &str) -> Self {
        Self::new(dir.join(format!("{name}.jsonl")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> anyhow::Result<BufWriter<File>> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        tracing::debug!(path = %self.path.display(), "opened output file");
        Ok(BufWriter::new(file))
    }
}

#[async_trait]
impl RecordWriter for JsonLinesWriter {
    async fn write(&self, _cancel: &CancellationToken, record: &WriteRecord) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut guard = self.file.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        let file = guard
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("output file {} not open", self.path.display()))?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        if let Some(mut file) = self.file.lock().await.take() {
            file.shutdown().await?;
        }
        Ok(())
    }
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopWriter;

#[async_trait]
impl RecordWriter for NoopWriter {
    async fn write(&self, _cancel: &CancellationToken, _record: &WriteRecord) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use barrage_core::AttemptResult;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let writer = JsonLinesWriter::in_dir(&dir.path().join("nested"), "login");
        let cancel = CancellationToken::new();

        for seq in 1..=2 {
            let mut attempt = AttemptResult::pending(seq, false);
            attempt.status_code = Some(200);
            let mut data = BTreeMap::new();
            data.insert("token".to_string(), serde_json::json!("abc"));
            writer
                .write(&cancel, &WriteRecord::from_attempt(&attempt, data))
                .await
                .unwrap();
        }
        writer.close().await.unwrap();

        let content = std::fs::read_to_string(writer.path()).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["seq"], 2);
        assert_eq!(lines[0]["data"]["token"], "abc");
    }

    #[tokio::test]
    async fn test_no_file_without_records() {
        let dir = tempfile::tempdir().unwrap();
        let writer = JsonLinesWriter::in_dir(dir.path(), "idle");
        writer.close().await.unwrap();
        assert!(!writer.path().exists());
    }
}
