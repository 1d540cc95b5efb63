//! Error types for panforge operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PanforgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Invalid species selection: {0}")]
    Selection(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Clustering tool error: {0}")]
    Tool(String),

    #[error("Data integrity error: {0}")]
    Integrity(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl PanforgeError {
    /// Transient errors are worth retrying; everything else is terminal.
    pub fn is_transient(&self) -> bool {
        matches!(self, PanforgeError::Store(_) | PanforgeError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, PanforgeError>;
