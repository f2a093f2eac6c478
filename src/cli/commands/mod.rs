//! CLI command implementations.

pub mod command;
pub mod daemon;
pub mod init;
pub mod log;
pub mod notification;
pub mod problem;
pub mod reconcile;
pub mod retry;
pub mod settings;
