//! Error types for tessera-core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The platform produced a record that breaks its own contract
    #[error("Malformed mutation record: {0}")]
    MalformedRecord(String),

    #[error("DOM error: {0}")]
    Dom(#[from] tessera_dom::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
