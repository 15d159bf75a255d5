//! # rclone-transfer Library
//!
//! Drives downloads, uploads and remote-to-remote clones through the
//! `rclone` executable, adding what rclone does not do on its own.
//!
//! ## Features
//!
//! - **Live progress**: the latest `Transferred:` sample of `rclone -P`
//! - **Service-account rotation**: drive transfers switch accounts on `RATE_LIMIT_EXCEEDED`
//! - **Cancellation**: a cancelled session kills rclone and reports exactly once
//! - **Share links**: drive links from `lsjson` ids, `rclone link` for other backends
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use rclone_transfer::{Settings, TaskContext, TransferListener, TransferSession, UploadResult};
//!
//! struct Printer;
//!
//! #[async_trait::async_trait]
//! impl TransferListener for Printer {
//!     async fn on_download_complete(&self) { println!("done"); }
//!     async fn on_download_error(&self, message: String) { eprintln!("{message}"); }
//!     async fn on_upload_complete(&self, result: UploadResult) { println!("{}", result.link); }
//!     async fn on_upload_error(&self, message: String) { eprintln!("{message}"); }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let session = TransferSession::new(
//!         Arc::new(Printer),
//!         TaskContext { name: "Movies".to_string(), ..Default::default() },
//!         Arc::new(Settings::default()),
//!     );
//!     session
//!         .download("gdrive", "Movies", Path::new("rclone.conf"), Path::new("./Movies"))
//!         .await;
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

// Re-export core types that users might need
pub use crate::core::error::{Error, Result};
pub use crate::core::executor::TransferState;
pub use crate::core::listener::{TaskContext, TransferListener, UploadResult};
pub use crate::core::progress::ProgressSample;
pub use crate::core::remote::RemoteOptions;
pub use crate::core::service_accounts::ServiceAccountPool;
pub use crate::core::session::{CloneResult, OperationKind, TransferSession};
pub use crate::core::settings::Settings;

pub mod core;

/// Read the options of one remote from an rclone config
///
/// # Examples
/// ```rust,no_run
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let options = rclone_transfer::remote_options("rclone.conf", "gdrive").await?;
/// println!("gdrive is a {} remote", options.remote_type());
/// # Ok(())
/// # }
/// ```
pub async fn remote_options<P: AsRef<Path>>(config_path: P, remote: &str) -> Result<RemoteOptions> {
    core::remote::remote_options(config_path.as_ref(), remote).await
}

/// Create a session sharing `settings`
pub fn session<L: TransferListener>(
    listener: Arc<L>,
    context: TaskContext,
    settings: Arc<Settings>,
) -> TransferSession<L> {
    TransferSession::new(listener, context, settings)
}
