//! Topic `out` logs.
//!
//! Every line is prefixed with a local `YYYY-MM-DD HH:MM:SS` timestamp.
//! Files are opened and closed per write so no handle outlives a topic.

use crate::error::{ClientError, ClientResult};
use crate::session::layout::TopicDirs;
use chrono::{DateTime, Local};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct OutLogger {
    dirs: TopicDirs,
}

impl OutLogger {
    pub fn new(dirs: TopicDirs) -> Self {
        Self { dirs }
    }

    /// Append `msg` to the `out` file of `topic`. Empty messages are skipped.
    pub async fn log(&self, topic: &str, msg: &str) -> ClientResult<()> {
        if msg.is_empty() {
            return Ok(());
        }
        let path = self.dirs.out_path(topic);
        let line = log_line(Local::now(), msg);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| ClientError::filesystem(&path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| ClientError::filesystem(&path, e))?;
        file.flush()
            .await
            .map_err(|e| ClientError::filesystem(&path, e))?;
        Ok(())
    }
}

fn log_line(at: DateTime<Local>, msg: &str) -> String {
    format!("{} {}\n", at.format(TIMESTAMP_FORMAT), msg)
}
