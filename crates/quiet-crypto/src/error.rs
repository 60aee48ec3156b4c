//! Crypto result aliases over the unified error type.

pub use quiet_core::errors::{QuietError, Result};
