//! On-disk layout of a server tree.
//!
//! ```text
//! <root>/in, <root>/out            server session (topic "")
//! <root>/<topic>/in                named pipe, one command or message per line
//! <root>/<topic>/out               append-only timestamped log
//! ```

use crate::error::{ClientError, ClientResult};
use std::ffi::CString;
use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

pub const IN_FILE: &str = "in";
pub const OUT_FILE: &str = "out";

#[derive(Debug, Clone)]
pub struct TopicDirs {
    root: PathBuf,
}

impl TopicDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn dir(&self, topic: &str) -> PathBuf {
        if topic.is_empty() {
            self.root.clone()
        } else {
            self.root.join(sanitize_topic(topic))
        }
    }

    pub fn in_path(&self, topic: &str) -> PathBuf {
        self.dir(topic).join(IN_FILE)
    }

    pub fn out_path(&self, topic: &str) -> PathBuf {
        self.dir(topic).join(OUT_FILE)
    }

    /// Make sure the directory, `out` log and `in` pipe of `topic` exist.
    /// Existing files are left alone.
    pub fn prepare(&self, topic: &str) -> ClientResult<PathBuf> {
        let dir = self.dir(topic);
        fs::create_dir_all(&dir).map_err(|e| ClientError::filesystem(&dir, e))?;

        let out = dir.join(OUT_FILE);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&out)
            .map_err(|e| ClientError::filesystem(&out, e))?;

        let input = dir.join(IN_FILE);
        match fs::metadata(&input) {
            Ok(meta) if meta.file_type().is_fifo() => {}
            Ok(_) => {
                return Err(ClientError::filesystem(
                    &input,
                    io::Error::new(io::ErrorKind::AlreadyExists, "exists and is not a named pipe"),
                ));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                mkfifo(&input).map_err(|e| ClientError::filesystem(&input, e))?;
            }
            Err(e) => return Err(ClientError::filesystem(&input, e)),
        }

        Ok(dir)
    }
}

/// Map a topic to a single safe path component.
///
/// Path separators and control characters become `_`, and `.` / `..`
/// can never escape the server tree. A topic named like the root
/// session's own files (a nick `in` or `out`) gets a trailing `.`, which
/// no nick or channel name can contain.
pub fn sanitize_topic(topic: &str) -> String {
    let sanitized: String = topic
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    match sanitized.as_str() {
        "." | ".." => "_".repeat(sanitized.len()),
        IN_FILE | OUT_FILE => format!("{}.", sanitized),
        _ => sanitized,
    }
}

fn mkfifo(path: &Path) -> io::Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: `c_path` is a valid NUL-terminated string for the whole call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::AlreadyExists {
        return Ok(());
    }
    Err(err)
}
