use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no matching nodes")]
    NoMatchingNodes,
    #[error("more than one matching node")]
    ManyMatchingNodes,
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
}

/// Machine-readable tag carried by error replies. Command errors are reply
/// values, never panics; the snapshot variants are fatal to the instance and
/// surface through `restore` instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ErrorKind {
    NoMatchingNodes,
    ManyMatchingNodes,
    InvalidPath,
    InvalidPattern,
    ResourceLimit,
    TxnAborted,
    CorruptSnapshot,
    UnsupportedVersion,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NoMatchingNodes => ErrorKind::NoMatchingNodes,
            Error::ManyMatchingNodes => ErrorKind::ManyMatchingNodes,
            Error::InvalidPath(_) => ErrorKind::InvalidPath,
            Error::InvalidPattern(_) => ErrorKind::InvalidPattern,
            Error::ResourceLimit(_) => ErrorKind::ResourceLimit,
            Error::CorruptSnapshot(_) => ErrorKind::CorruptSnapshot,
            Error::UnsupportedVersion(_) => ErrorKind::UnsupportedVersion,
        }
    }
}
