//! Transfer sessions
//!
//! A session drives one download, upload or clone for a listener and
//! reports back through exactly one terminal callback, whichever way the
//! transfer ends.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::core::command::{build_transfer, effective_flags, Method, SlotTarget, TransferCommand};
use crate::core::error::{Error, Result};
use crate::core::executor::{AttemptOutcome, TransferExecutor, TransferState};
use crate::core::files::{count_files_and_folders_async, mime_type, FOLDER_MIME};
use crate::core::link::LinkResolver;
use crate::core::listener::{TaskContext, TransferListener, UploadResult};
use crate::core::progress::{ProgressSample, ProgressTracker};
use crate::core::remote::{remote_options, RemoteOptions};
use crate::core::service_accounts::{ensure_pool, PoolSetup, ServiceAccountPool};
use crate::core::settings::Settings;

/// Destination prefix selecting the caller's private config
const PRIVATE_CONFIG_PREFIX: &str = "mrcc:";

/// Kind of operation a session runs, set once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Download,
    Upload,
    Clone,
}

/// Successful clone: the caller reports completion itself
#[derive(Debug, Clone, PartialEq)]
pub struct CloneResult {
    pub link: Option<String>,
    pub destination: String,
}

/// Where an upload goes
#[derive(Debug, Clone, PartialEq)]
pub struct UploadTarget {
    pub config_path: PathBuf,
    pub remote: String,
    pub path: String,
}

/// Split an upload destination into config, remote and path
pub fn parse_upload_target(
    destination: &str,
    caller_id: &str,
    settings: &Settings,
) -> Result<UploadTarget> {
    let destination = destination.trim_matches('/');
    let (config_path, destination) = match destination.strip_prefix(PRIVATE_CONFIG_PREFIX) {
        Some(rest) => (settings.private_config(caller_id), rest),
        None => (settings.config_path.clone(), destination),
    };

    let (remote, path) = destination.split_once(':').ok_or_else(|| {
        Error::InvalidInput(format!(
            "Upload destination '{destination}' is not in remote:path form"
        ))
    })?;

    Ok(UploadTarget {
        config_path,
        remote: remote.to_string(),
        path: path.to_string(),
    })
}

/// One transfer operation on behalf of a listener
pub struct TransferSession<L: TransferListener> {
    listener: Arc<L>,
    context: TaskContext,
    settings: Arc<Settings>,
    cancel: CancellationToken,
    /// Set by whichever side delivers the terminal callback first
    terminal_claimed: AtomicBool,
    kind: OnceLock<OperationKind>,
    progress: ProgressTracker,
    state: Mutex<TransferState>,
    pool: Mutex<Option<ServiceAccountPool>>,
}

impl<L: TransferListener> TransferSession<L> {
    pub fn new(listener: Arc<L>, context: TaskContext, settings: Arc<Settings>) -> Self {
        Self {
            listener,
            context,
            settings,
            cancel: CancellationToken::new(),
            terminal_claimed: AtomicBool::new(false),
            kind: OnceLock::new(),
            progress: ProgressTracker::new(),
            state: Mutex::new(TransferState::Idle),
            pool: Mutex::new(None),
        }
    }

    pub fn transferred_size(&self) -> String {
        self.progress.snapshot().transferred
    }

    pub fn size(&self) -> String {
        self.progress.snapshot().size
    }

    pub fn percentage(&self) -> String {
        self.progress.snapshot().percentage
    }

    pub fn speed(&self) -> String {
        self.progress.snapshot().speed
    }

    pub fn eta(&self) -> String {
        self.progress.snapshot().eta
    }

    /// Latest progress sample as a whole
    pub fn progress(&self) -> ProgressSample {
        self.progress.snapshot()
    }

    pub fn state(&self) -> TransferState {
        self.state.lock().map(|state| *state).unwrap_or_default()
    }

    pub fn kind(&self) -> Option<OperationKind> {
        self.kind.get().copied()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Service-account rotation state, once a pool has been used
    pub fn service_accounts(&self) -> Option<ServiceAccountPool> {
        self.pool.lock().ok().and_then(|pool| pool.clone())
    }

    pub fn context(&self) -> &TaskContext {
        &self.context
    }

    /// Take the right to deliver the terminal callback, false when already taken
    fn claim_terminal(&self) -> bool {
        !self.terminal_claimed.swap(true, Ordering::SeqCst)
    }

    /// Claim the session for `kind`, sessions run a single operation
    fn begin(&self, kind: OperationKind) -> Result<()> {
        self.kind.set(kind).map_err(|_| {
            Error::InvalidInput("transfer session already used for another operation".to_string())
        })
    }

    /// Download `remote:remote_path` into `local_path`
    pub async fn download(
        &self,
        remote: &str,
        remote_path: &str,
        config_path: &Path,
        local_path: &Path,
    ) {
        let result = match self.begin(OperationKind::Download) {
            Ok(()) => self.run_download(remote, remote_path, config_path, local_path).await,
            Err(e) => Err(e),
        };

        let outcome = match result {
            Ok(AttemptOutcome::Completed) => Ok(()),
            Ok(AttemptOutcome::Failed(message)) => Err(message),
            Ok(AttemptOutcome::Cancelled | AttemptOutcome::Killed) => return,
            Err(e) => Err(e.to_string()),
        };
        if self.is_cancelled() || !self.claim_terminal() {
            return;
        }

        match outcome {
            Ok(()) => self.listener.on_download_complete().await,
            Err(message) => self.listener.on_download_error(message).await,
        }
    }

    async fn run_download(
        &self,
        remote: &str,
        remote_path: &str,
        config_path: &Path,
        local_path: &Path,
    ) -> Result<AttemptOutcome> {
        let options = remote_options(config_path, remote).await?;
        let (config_path, remote, mut pool) =
            self.prepare_accounts(remote, &options, config_path).await?;
        if let Some(pool) = &pool {
            info!("Download with service account {}", pool.current_profile());
        }

        let overrides = effective_flags(&self.context.flags, &self.settings);
        let mut command = build_transfer(
            &self.settings,
            &config_path,
            &format!("{remote}:{remote_path}"),
            &local_path.display().to_string(),
            overrides,
            Method::Copy,
            SlotTarget::Source,
        );
        if options.is_drive() && overrides.is_empty() {
            command.extend(["--drive-acknowledge-abuse"]);
        }

        Ok(self.execute(command, &options, pool.as_mut()).await)
    }

    /// Upload `local_path` to the destination of the task context
    pub async fn upload(&self, local_path: &Path, size: u64) {
        let result = match self.begin(OperationKind::Upload) {
            Ok(()) => self.run_upload(local_path, size).await,
            Err(e) => Err(e),
        };

        let outcome = match result {
            Ok(Some(result)) => Ok(result),
            Ok(None) => return,
            Err(e) => Err(e.to_string()),
        };
        if self.is_cancelled() || !self.claim_terminal() {
            return;
        }

        match outcome {
            Ok(result) => {
                info!("Upload Done. Path: {}", result.destination);
                self.listener.on_upload_complete(result).await;
            }
            Err(message) => self.listener.on_upload_error(message).await,
        }
    }

    async fn run_upload(&self, local_path: &Path, size: u64) -> Result<Option<UploadResult>> {
        let target = parse_upload_target(
            &self.context.destination,
            &self.context.caller_id,
            &self.settings,
        )?;
        let name = self.context.name.clone();
        let mut path = target.path;

        let is_folder = tokio::fs::metadata(local_path).await?.is_dir();
        let (mime, folders, files) = if is_folder {
            let (folders, files) = count_files_and_folders_async(local_path).await?;
            path = if path.is_empty() { name.clone() } else { format!("{path}/{name}") };
            (FOLDER_MIME.to_string(), folders, files)
        } else {
            if self.settings.is_excluded(local_path) {
                return Err(Error::ExtensionExcluded(local_path.display().to_string()));
            }
            (mime_type(local_path), 0, 1)
        };

        let options = remote_options(&target.config_path, &target.remote).await?;
        let (config_path, remote, mut pool) =
            self.prepare_accounts(&target.remote, &options, &target.config_path).await?;
        if let Some(pool) = &pool {
            info!("Upload with service account {}", pool.current_profile());
        }

        let overrides = effective_flags(&self.context.flags, &self.settings);
        let method = if !self.context.seed || self.context.relocate {
            Method::Move
        } else {
            Method::Copy
        };
        let mut command = build_transfer(
            &self.settings,
            &config_path,
            &local_path.display().to_string(),
            &format!("{remote}:{path}"),
            overrides,
            method,
            SlotTarget::Destination,
        );
        if options.is_drive() && overrides.is_empty() {
            command.extend(["--drive-chunk-size", "128M", "--drive-upload-cutoff", "128M"]);
        }

        match self.execute(command, &options, pool.as_mut()).await {
            AttemptOutcome::Completed => {}
            AttemptOutcome::Failed(message) => return Err(Error::TransferError(message)),
            AttemptOutcome::Cancelled | AttemptOutcome::Killed => return Ok(None),
        }

        if self.is_cancelled() {
            return Ok(None);
        }

        // Links are looked up through the original remote, never a service account
        let resolved = LinkResolver::new(&self.settings, &target.config_path, &self.cancel)
            .resolve(&options, &target.remote, &path, &name, is_folder)
            .await;
        if self.is_cancelled() {
            return Ok(None);
        }

        Ok(Some(UploadResult {
            link: resolved.link.unwrap_or_default(),
            size,
            files,
            folders,
            mime_type: mime,
            name,
            destination: resolved.destination,
        }))
    }

    /// Copy `src_remote:src_path` to another remote
    ///
    /// Failures go to `on_upload_error`. On success the link and final
    /// destination are returned and the caller reports completion.
    pub async fn clone_remote(
        &self,
        config_path: &Path,
        src_remote: &str,
        src_path: &str,
        destination: &str,
        flags: &str,
        mime_type: &str,
    ) -> Option<CloneResult> {
        let result = match self.begin(OperationKind::Clone) {
            Ok(()) => {
                self.run_clone(config_path, src_remote, src_path, destination, flags, mime_type)
                    .await
            }
            Err(e) => Err(e),
        };

        if self.is_cancelled() {
            return None;
        }

        match result {
            Ok(Some(result)) => self.claim_terminal().then_some(result),
            Ok(None) => None,
            Err(e) => {
                if self.claim_terminal() {
                    self.listener.on_upload_error(e.to_string()).await;
                }
                None
            }
        }
    }

    async fn run_clone(
        &self,
        config_path: &Path,
        src_remote: &str,
        src_path: &str,
        destination: &str,
        flags: &str,
        mime_type: &str,
    ) -> Result<Option<CloneResult>> {
        let (dst_remote, dst_path) = destination.split_once(':').ok_or_else(|| {
            Error::InvalidInput(format!(
                "Clone destination '{destination}' is not in remote:path form"
            ))
        })?;

        let (src_options, dst_options) = tokio::try_join!(
            remote_options(config_path, src_remote),
            remote_options(config_path, dst_remote),
        )?;

        let overrides = effective_flags(flags, &self.settings);
        let mut command = build_transfer(
            &self.settings,
            config_path,
            &format!("{src_remote}:{src_path}"),
            destination,
            overrides,
            Method::Copy,
            SlotTarget::None,
        );
        if overrides.is_empty() && src_options.is_drive() {
            if dst_options.is_drive() {
                command.extend(["--tpslimit", "3", "--transfers", "3"]);
            } else {
                command.extend(["--drive-acknowledge-abuse"]);
            }
        }

        match self.execute(command, &src_options, None).await {
            AttemptOutcome::Completed => {}
            AttemptOutcome::Failed(message) => return Err(Error::TransferError(message)),
            AttemptOutcome::Cancelled | AttemptOutcome::Killed => return Ok(None),
        }

        if self.is_cancelled() {
            return Ok(None);
        }

        let resolved = LinkResolver::new(&self.settings, config_path, &self.cancel)
            .resolve(
                &dst_options,
                dst_remote,
                dst_path,
                &self.context.name,
                mime_type == FOLDER_MIME,
            )
            .await;

        Ok(Some(CloneResult {
            link: resolved.link,
            destination: resolved.destination,
        }))
    }

    /// Stop the running operation and notify the listener once
    ///
    /// Nothing is reported when the operation already delivered its own
    /// terminal callback.
    pub async fn cancel(&self) {
        self.cancel.cancel();
        if !self.claim_terminal() {
            return;
        }

        let name = &self.context.name;
        match self.kind() {
            Some(OperationKind::Download) => {
                info!("Cancelling Download: {name}");
                self.listener.on_download_error("Download stopped by user!".to_string()).await;
            }
            Some(OperationKind::Upload) => {
                info!("Cancelling Upload: {name}");
                self.listener.on_upload_error("your upload has been stopped!".to_string()).await;
            }
            _ => {
                info!("Cancelling Clone: {name}");
                self.listener.on_upload_error("your clone has been stopped!".to_string()).await;
            }
        }
    }

    /// Set up a service-account pool when the remote qualifies
    ///
    /// Returns the config and remote to transfer with, plus the pool.
    async fn prepare_accounts(
        &self,
        remote: &str,
        options: &RemoteOptions,
        config_path: &Path,
    ) -> Result<(PathBuf, String, Option<ServiceAccountPool>)> {
        let eligible = options.is_drive()
            && self.settings.use_service_accounts
            && config_path == self.settings.config_path
            && options.get("service_account_file").is_none()
            && tokio::fs::metadata(&self.settings.accounts_dir)
                .await
                .is_ok_and(|m| m.is_dir());
        if !eligible {
            return Ok((config_path.to_path_buf(), remote.to_string(), None));
        }

        match ensure_pool(remote, options, &self.settings).await? {
            PoolSetup::Ready { config_path, pool_size } => {
                let pool = ServiceAccountPool::seeded(pool_size);
                let profile = pool.current_profile();
                Ok((config_path, profile, Some(pool)))
            }
            PoolSetup::Disabled(config_path) => {
                warn!("Service accounts unavailable for {remote}, using {}", config_path.display());
                Ok((config_path, remote.to_string(), None))
            }
        }
    }

    async fn execute(
        &self,
        command: TransferCommand,
        options: &RemoteOptions,
        pool: Option<&mut ServiceAccountPool>,
    ) -> AttemptOutcome {
        let executor =
            TransferExecutor::new(&self.settings, &self.progress, &self.cancel, &self.state);
        let Some(pool) = pool else {
            return executor.run(command, options.remote_type(), None).await;
        };

        let outcome = executor.run(command, options.remote_type(), Some(&mut *pool)).await;
        if let Ok(mut slot) = self.pool.lock() {
            *slot = Some(pool.clone());
        }
        outcome
    }
}
