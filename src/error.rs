use std::path::PathBuf;

/// Result type used throughout the library.
pub type Result<T> = std::result::Result<T, CurateError>;

/// Errors that abort the curation of a single sample.
///
/// Every variant is fatal for the sample it was raised for and for nothing
/// else; batch callers keep going with the remaining samples.
#[derive(Debug, thiserror::Error)]
pub enum CurateError {
    #[error("input not found or unreadable: {path}: {source}")]
    InputNotFound {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed input {path}: {reason}")]
    MalformedInput { path: PathBuf, reason: String },

    #[error("failed to write {path}: {source}")]
    OutputWrite {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl CurateError {
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn write(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::OutputWrite {
            source,
            path: path.into(),
        }
    }
}
