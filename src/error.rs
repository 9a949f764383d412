//! Error types for the scopist host.

use scopist_search::SearchError;

/// Top-level error type for the host layer.
#[derive(Debug, thiserror::Error)]
pub enum ScopistError {
    /// Settings file could not be parsed, serialized or applied.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error raised by the collection engine.
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Article export failed.
    #[error("export error: {0}")]
    Export(String),
}

impl From<csv::Error> for ScopistError {
    fn from(err: csv::Error) -> Self {
        Self::Export(err.to_string())
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ScopistError>;
