//! Core library modules for rclone-transfer
//!
//! This module contains the internal implementation of transfer sessions.

pub mod command;
pub mod error;
pub mod executor;
pub mod files;
pub mod link;
pub mod listener;
pub mod process;
pub mod progress;
pub mod remote;
pub mod service_accounts;
pub mod session;
pub mod settings;

// Re-export main types for internal use
pub use session::TransferSession;
pub use settings::Settings;
