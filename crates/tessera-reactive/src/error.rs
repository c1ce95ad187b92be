//! Error types for tessera-reactive

use thiserror::Error;

/// Adapter error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An engine primitive was used before `set_reactivity_engine`
    #[error("No reactivity engine bound: call set_reactivity_engine first")]
    EngineNotBound,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
