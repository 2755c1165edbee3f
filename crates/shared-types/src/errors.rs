//! # Error Types
//!
//! Errors raised by the shared entity helpers.

use thiserror::Error;

/// Failure to produce or read the canonical encoding of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializationError {
    /// Encoding failed.
    #[error("Encoding failed: {0}")]
    Encode(String),

    /// Decoding failed.
    #[error("Decoding failed: {0}")]
    Decode(String),
}
