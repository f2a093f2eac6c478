//! Infrastructure layer module
//!
//! Process-level concerns shared by the CLI and the daemon:
//! - Configuration management
//! - Logging infrastructure

pub mod config;
pub mod logging;
