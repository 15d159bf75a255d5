//! Listener interface consumed by transfer sessions
//!
//! The host application owns message formatting and task bookkeeping.
//! A session only reads the task context and reports through the
//! callbacks below, exactly once per operation.

use async_trait::async_trait;

/// Read-only task data a session needs from its caller
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskContext {
    /// Display name of the transferred item
    pub name: String,

    /// Upload destination, `remote:path` or `mrcc:remote:path`
    pub destination: String,

    /// Per-task rclone flag overrides, `key:value|--flag` syntax
    pub flags: String,

    /// Whether the local copy is kept for seeding
    pub seed: bool,

    /// Whether the task relocates into a new directory
    pub relocate: bool,

    /// Caller identity, selects the private config with `mrcc:`
    pub caller_id: String,
}

/// Details of a finished upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadResult {
    /// Share link, empty when it could not be resolved
    pub link: String,
    pub size: u64,
    pub files: usize,
    pub folders: usize,
    pub mime_type: String,
    pub name: String,
    /// Fully qualified `remote:path` of the uploaded item
    pub destination: String,
}

/// Callbacks fired by a session
#[async_trait]
pub trait TransferListener: Send + Sync {
    async fn on_download_complete(&self);

    async fn on_download_error(&self, message: String);

    async fn on_upload_complete(&self, result: UploadResult);

    async fn on_upload_error(&self, message: String);
}
