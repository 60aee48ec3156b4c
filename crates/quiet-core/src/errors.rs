//! Unified error type for the Quiet core.
//!
//! Handler failures are recorded on the envelope and never unwind through
//! the pipeline; `QuietError` is reserved for conditions the caller must
//! see (iteration cap, storage invariant breakage, bad client input).

use serde::{Deserialize, Serialize};

/// Unified error type for all Quiet operations.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum QuietError {
    /// Invalid input or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// What was invalid
        message: String,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        /// What was not found
        message: String,
    },

    /// Cryptographic operation failed
    #[error("Crypto error: {message}")]
    Crypto {
        /// Which operation failed and why
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// What failed to (de)serialize
        message: String,
    },

    /// Storage operation failed
    #[error("Storage error: {message}")]
    Storage {
        /// Which store operation failed
        message: String,
    },

    /// Internal system error (iteration cap, broken invariant)
    #[error("Internal error: {message}")]
    Internal {
        /// What went wrong
        message: String,
    },
}

impl QuietError {
    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a crypto error
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Standard result type for core operations
pub type Result<T> = std::result::Result<T, QuietError>;
