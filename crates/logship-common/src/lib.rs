//! Logship Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging setup for the logship workspace.
//!
//! # Overview
//!
//! This crate provides the functionality used across all logship workspace
//! members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Logging**: Configuration and initialization of the tracing stack

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{LogshipError, Result};
