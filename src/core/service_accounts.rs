//! Service-account pools for drive remotes
//!
//! A pool is an auxiliary rclone config with one `saNNN` remote per
//! credential file found in the accounts directory. When Google answers
//! with `RATE_LIMIT_EXCEEDED` the executor switches to the next profile
//! and retries, until every account of the pool has been tried once.

use std::path::{Path, PathBuf};

use log::info;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::core::error::{Error, Result};
use crate::core::remote::RemoteOptions;
use crate::core::settings::Settings;

/// Failure signature that makes a transfer eligible for rotation
pub const RATE_LIMIT_SIGNATURE: &str = "RATE_LIMIT_EXCEEDED";

/// Scoping options copied from the source remote, in priority order
const SCOPE_OPTIONS: [&str; 2] = ["team_drive", "root_folder_id"];

/// Name of the profile at `index`
pub fn profile_name(index: usize) -> String {
    format!("sa{index:03}")
}

/// Rotation state of one session
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceAccountPool {
    pool_size: usize,
    current_index: usize,
    attempts_used: usize,
    enabled: bool,
}

impl ServiceAccountPool {
    /// Create a pool positioned on `start_index`, which counts as the first attempt
    pub fn new(pool_size: usize, start_index: usize) -> Self {
        Self {
            pool_size,
            current_index: if pool_size == 0 { 0 } else { start_index % pool_size },
            attempts_used: 1,
            enabled: pool_size > 0,
        }
    }

    /// Create a pool on a uniformly random profile, spreading concurrent sessions
    pub fn seeded(pool_size: usize) -> Self {
        let start = if pool_size == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..pool_size)
        };
        Self::new(pool_size, start)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn attempts_used(&self) -> usize {
        self.attempts_used
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Profile currently in use
    pub fn current_profile(&self) -> String {
        profile_name(self.current_index)
    }

    /// Whether every profile of the pool has already been tried
    pub fn is_exhausted(&self) -> bool {
        self.attempts_used >= self.pool_size
    }

    /// Whether a failure should be retried on the next profile
    pub fn can_rotate(&self, remote_type: &str, error: &str) -> bool {
        self.enabled
            && self.pool_size > 0
            && remote_type == crate::core::remote::DRIVE_TYPE
            && error.contains(RATE_LIMIT_SIGNATURE)
            && !self.is_exhausted()
    }

    /// Move to the next profile and return its name
    pub fn rotate(&mut self) -> String {
        if self.pool_size > 0 {
            self.current_index = (self.current_index + 1) % self.pool_size;
        }
        self.attempts_used += 1;
        let remote = self.current_profile();
        info!("Switching to {remote} remote");
        remote
    }

    /// Error describing an exhausted pool
    pub fn exhausted_error(&self) -> Error {
        Error::CredentialExhausted(self.attempts_used)
    }
}

/// Result of preparing a pool for a remote
#[derive(Debug, Clone, PartialEq)]
pub enum PoolSetup {
    /// Rotation not applicable, keep using the original config
    Disabled(PathBuf),
    /// Generated (or reused) pool config with `pool_size` profiles
    Ready { config_path: PathBuf, pool_size: usize },
}

/// List credential files, sorted so profile numbers are stable
async fn list_accounts(accounts_dir: &Path) -> Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(accounts_dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    files.sort();
    Ok(files)
}

/// Render the pool config for the given credential files
fn render_pool(accounts_dir: &Path, files: &[String], option: &str, value: &str) -> String {
    files
        .iter()
        .enumerate()
        .map(|(i, file)| {
            format!(
                "[{}]\ntype = drive\nscope = drive\nservice_account_file = {}\n{option} = {value}\n\n",
                profile_name(i),
                accounts_dir.join(file).display(),
            )
        })
        .collect()
}

/// Write through a temporary file and rename, so readers never see partial content
///
/// Every write gets its own temporary name, concurrent writers of the same
/// pool race only on the final rename.
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    let tmp = path.with_extension(format!("conf.{suffix}.tmp"));
    tokio::fs::write(&tmp, contents).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Make sure a service-account config exists for `remote`
///
/// An existing pool file is reused as is. Without a `team_drive` or
/// `root_folder_id` option, or without any credential file, rotation is
/// not possible and the original config is returned.
pub async fn ensure_pool(
    remote: &str,
    options: &RemoteOptions,
    settings: &Settings,
) -> Result<PoolSetup> {
    let pool_file = settings.pool_dir.join(format!("{remote}.conf"));
    let accounts = list_accounts(&settings.accounts_dir).await?;

    if tokio::fs::metadata(&pool_file).await.is_ok_and(|m| m.is_file()) {
        if accounts.is_empty() {
            return Ok(PoolSetup::Disabled(settings.config_path.clone()));
        }
        return Ok(PoolSetup::Ready {
            config_path: pool_file,
            pool_size: accounts.len(),
        });
    }

    let Some((option, value)) = SCOPE_OPTIONS
        .iter()
        .find_map(|key| options.get(key).map(|value| (*key, value)))
    else {
        info!(
            "Remote {remote} has neither team_drive nor root_folder_id, service accounts disabled"
        );
        return Ok(PoolSetup::Disabled(settings.config_path.clone()));
    };

    if accounts.is_empty() {
        info!("No service account files found in {}", settings.accounts_dir.display());
        return Ok(PoolSetup::Disabled(settings.config_path.clone()));
    }

    tokio::fs::create_dir_all(&settings.pool_dir).await?;
    let text = render_pool(&settings.accounts_dir, &accounts, option, value);
    write_atomic(&pool_file, &text).await?;
    info!(
        "Created service account config {} with {} profiles",
        pool_file.display(),
        accounts.len()
    );

    Ok(PoolSetup::Ready {
        config_path: pool_file,
        pool_size: accounts.len(),
    })
}
