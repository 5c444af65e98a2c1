//! Store error types

use std::path::PathBuf;

/// Errors produced while reading, writing or locking a document
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Document {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("Document {path} has unsupported schema version {found:?} (supported: {supported})")]
    UnsupportedSchema {
        path: PathBuf,
        found: String,
        supported: String,
    },

    #[error("Document {path} is locked by another process")]
    Locked { path: PathBuf },

    #[error("Failed to serialize document for {path}: {message}")]
    Serialize { path: PathBuf, message: String },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            message: message.into(),
        }
    }
}
