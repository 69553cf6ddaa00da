//! The `utils` module provides shared building blocks used across `relaychat`:
//! the crate-wide error type and logging setup.

pub mod error;
pub mod logging;

pub use error::{RelayError, Result};
