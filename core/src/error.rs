use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no inverted index found at {0}")]
    NoIndex(PathBuf),

    #[error("dimension mismatch in {path}: expected {expected}, found {found}")]
    DimensionMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("malformed record at {path}:{line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(PathBuf),

    #[error("metadata CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Attach the offending path to an I/O error.
pub(crate) fn io_at(path: &Path) -> impl FnOnce(io::Error) -> IndexError + '_ {
    move |source| IndexError::Io { path: path.to_path_buf(), source }
}

pub(crate) fn malformed(path: &Path, line: usize, reason: impl Into<String>) -> IndexError {
    IndexError::Malformed { path: path.to_path_buf(), line, reason: reason.into() }
}
