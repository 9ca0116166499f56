//! tunegate Library
//!
//! Request admission and download coordination for a music delivery bot: a per-user
//! session cache, sliding-window search rate limiting, free/bonus/premium download
//! quotas, a download orchestrator with a strict failure taxonomy, and supervised
//! background maintenance.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
