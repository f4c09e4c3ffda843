//! Testkit Common Library
//!
//! Shared error handling, logging and environment utilities for the
//! testkit workspace.
//!
//! # Overview
//!
//! This crate provides functionality used across all testkit workspace
//! members:
//!
//! - **Error Handling**: Base error type and result alias
//! - **Logging**: `tracing` initialization for fixtures and tests
//! - **Environment**: typed environment-variable lookup helpers
//!
//! # Example
//!
//! ```no_run
//! use testkit_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("harness starting");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod env;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CommonError, Result};
