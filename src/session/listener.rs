//! Per-topic `in` pipe listener.

use crate::app::event::UserLine;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::unix::pipe;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Spawn a task forwarding every line written to `in_path` as a [`UserLine`].
///
/// The task ends when `session` is cancelled (topic left, or process
/// shutdown) or the dispatch loop drops its receiver. The pipe must already
/// exist.
pub fn spawn_listener(
    topic: String,
    in_path: PathBuf,
    session: CancellationToken,
    tx: mpsc::UnboundedSender<UserLine>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = listen(&topic, &in_path, &session, &tx).await {
            warn!("Listener for {:?} stopped: {}: {}", topic, in_path.display(), e);
        }
        debug!("Listener for {:?} exited", topic);
    })
}

async fn listen(
    topic: &str,
    in_path: &Path,
    session: &CancellationToken,
    tx: &mpsc::UnboundedSender<UserLine>,
) -> io::Result<()> {
    // Opening read-write keeps a writer on the pipe ourselves: open never
    // blocks and the reader never sees EOF between external writers.
    let receiver = pipe::OpenOptions::new()
        .read_write(true)
        .open_receiver(in_path)?;
    let mut reader = BufReader::new(receiver);
    let mut buf = Vec::new();

    loop {
        let n = tokio::select! {
            _ = session.cancelled() => return Ok(()),
            n = reader.read_until(b'\n', &mut buf) => n?,
        };
        if n == 0 {
            return Ok(());
        }

        let text = String::from_utf8_lossy(&buf)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        buf.clear();

        if session.is_cancelled() {
            return Ok(());
        }
        if text.is_empty() {
            continue;
        }
        let line = UserLine {
            topic: topic.to_string(),
            text,
        };
        if tx.send(line).is_err() {
            return Ok(());
        }
    }
}
