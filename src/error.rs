//! Error taxonomy.
//!
//! Parse and filesystem errors are contained where they happen and only
//! logged. Connection errors end the session: the client has exactly one
//! upstream link and cannot make progress without it.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A protocol line that could not be turned into a [`ParsedEvent`].
///
/// [`ParsedEvent`]: crate::irc::message::ParsedEvent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed event: empty line")]
    Empty,
    #[error("malformed event: no command in {0:?}")]
    MissingCommand(String),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("connection error: {0}")]
    Connection(#[from] io::Error),

    #[error("connection closed by remote end")]
    ConnectionClosed,

    #[error("server error: {0}")]
    Fatal(String),
}

impl ClientError {
    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ClientError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
