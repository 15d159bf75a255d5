//! # rclone-transfer CLI
//!
//! Command-line interface for the rclone-transfer library.
//! Runs a single download, upload or clone through rclone with a live
//! progress bar, service-account rotation and share links.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::error;
use rclone_transfer::{Settings, TaskContext, TransferListener, TransferSession, UploadResult};

mod cli;

/// Command-line interface for rclone-transfer
#[derive(Parser)]
#[command(name = "rclone-transfer")]
#[command(about = "rclone-driven transfers with live progress, account rotation and share links")]
#[command(long_about = "Runs one rclone transfer and reports its outcome:
  rclone-transfer download gdrive Movies/Show ./Show
  rclone-transfer upload ./Show.mkv gdrive:Uploads
  rclone-transfer upload ./Show mrcc:box:Uploads --caller-id 42
  rclone-transfer clone gdrive:Movies/Show box:Backup/Show --folder
  rclone-transfer remote gdrive

Press Ctrl-C to cancel a running transfer.")]
#[command(version)]
struct Cli {
    /// JSON settings file, missing keys keep their defaults
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// rclone config file (defaults to the settings value)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// rclone flag overrides, e.g. "--tpslimit:3|--drive-stop-on-upload-limit"
    #[arg(long, global = true, default_value = "")]
    flags: String,

    /// Rotate drive service accounts on rate limits
    #[arg(long, global = true)]
    service_accounts: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download remote:path into a local directory
    Download {
        remote: String,
        path: String,
        local: PathBuf,
    },
    /// Upload a local file or folder to remote:path
    Upload {
        local: PathBuf,
        destination: String,
        /// Display name, defaults to the local file name
        #[arg(long)]
        name: Option<String>,
        /// Keep the local copy (copy instead of move)
        #[arg(long)]
        seed: bool,
        /// Move even when seeding
        #[arg(long)]
        relocate: bool,
        /// Caller id selecting the private config for mrcc: destinations
        #[arg(long, default_value = "")]
        caller_id: String,
    },
    /// Copy remote:path to another remote
    Clone {
        source: String,
        destination: String,
        /// The source is a folder
        #[arg(long)]
        folder: bool,
    },
    /// Show the options of a configured remote
    Remote { name: String },
}

/// Terminal outcome reported by a session
#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Done(String),
    Failed(String),
}

/// Listener printing to the terminal and remembering the outcome
#[derive(Default)]
struct ConsoleListener {
    outcome: Mutex<Option<Outcome>>,
}

impl ConsoleListener {
    fn record(&self, outcome: Outcome) {
        if let Ok(mut slot) = self.outcome.lock() {
            *slot = Some(outcome);
        }
    }

    fn outcome(&self) -> Option<Outcome> {
        self.outcome.lock().ok().and_then(|slot| slot.clone())
    }
}

#[async_trait::async_trait]
impl TransferListener for ConsoleListener {
    async fn on_download_complete(&self) {
        self.record(Outcome::Done("✅ Download completed".to_string()));
    }

    async fn on_download_error(&self, message: String) {
        self.record(Outcome::Failed(message));
    }

    async fn on_upload_complete(&self, result: UploadResult) {
        let mut summary = format!(
            "✅ Uploaded {} ({}, {} files, {} folders) to {}",
            result.name, result.mime_type, result.files, result.folders, result.destination
        );
        if !result.link.is_empty() {
            summary.push_str(&format!("\n🔗 {}", result.link));
        }
        self.record(Outcome::Done(summary));
    }

    async fn on_upload_error(&self, message: String) {
        self.record(Outcome::Failed(message));
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("❌ Error: {e:#}");
        eprintln!("❌ Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging to stderr
    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();

    let mut settings = match &cli.settings {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(config) = &cli.config {
        settings.config_path = config.clone();
    }
    if cli.service_accounts {
        settings.use_service_accounts = true;
    }
    let settings = Arc::new(settings);

    if cli.verbose {
        eprintln!(
            "🔧 rclone-transfer v{} using {}",
            env!("CARGO_PKG_VERSION"),
            settings.config_path.display()
        );
    }

    match cli.command {
        Command::Remote { name } => show_remote(&settings.config_path, &name).await,
        Command::Download {
            remote,
            path,
            local,
        } => {
            let context = TaskContext {
                name: display_name(&path),
                flags: cli.flags,
                ..Default::default()
            };
            let config = settings.config_path.clone();
            let message = format!("⬇️  Downloading {remote}:{path}");
            drive(settings, context, &message, |session| async move {
                session.download(&remote, &path, &config, &local).await;
                None
            })
            .await
        }
        Command::Upload {
            local,
            destination,
            name,
            seed,
            relocate,
            caller_id,
        } => {
            let size = size_of(&local).await?;
            let context = TaskContext {
                name: name.unwrap_or_else(|| display_name(&local.to_string_lossy())),
                destination: destination.clone(),
                flags: cli.flags,
                seed,
                relocate,
                caller_id,
            };
            let message = format!("⬆️  Uploading to {destination}");
            drive(settings, context, &message, |session| async move {
                session.upload(&local, size).await;
                None
            })
            .await
        }
        Command::Clone {
            source,
            destination,
            folder,
        } => {
            let Some((src_remote, src_path)) = source.split_once(':') else {
                bail!("clone source '{source}' is not in remote:path form");
            };
            let (src_remote, src_path) = (src_remote.to_string(), src_path.to_string());
            let context = TaskContext {
                name: display_name(&src_path),
                ..Default::default()
            };
            let config = settings.config_path.clone();
            let mime = if folder { "Folder" } else { "" };
            let flags = cli.flags;
            let message = format!("🔁 Cloning {source} to {destination}");
            drive(settings, context, &message, |session| async move {
                session
                    .clone_remote(&config, &src_remote, &src_path, &destination, &flags, mime)
                    .await
                    .map(|result| {
                        let mut summary = format!("✅ Cloned to {}", result.destination);
                        if let Some(link) = result.link {
                            summary.push_str(&format!("\n🔗 {link}"));
                        }
                        summary
                    })
            })
            .await
        }
    }
}

/// Run one session with a progress bar and Ctrl-C cancellation
///
/// The operation closure may return a summary when the session itself
/// does not report success (clones).
async fn drive<F, Fut>(
    settings: Arc<Settings>,
    context: TaskContext,
    message: &str,
    operation: F,
) -> anyhow::Result<()>
where
    F: FnOnce(Arc<TransferSession<ConsoleListener>>) -> Fut,
    Fut: std::future::Future<Output = Option<String>>,
{
    let listener = Arc::new(ConsoleListener::default());
    let session = Arc::new(TransferSession::new(Arc::clone(&listener), context, settings));
    let progress = cli::ProgressManager::new(message);

    let ticker = {
        let session = Arc::clone(&session);
        let pb = progress.pb.clone();
        tokio::spawn(async move {
            let manager = cli::ProgressManager { pb };
            let mut interval = tokio::time::interval(Duration::from_millis(500));
            loop {
                interval.tick().await;
                manager.update(&session.progress());
            }
        })
    };

    let canceller = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                session.cancel().await;
            }
        })
    };

    let summary = operation(Arc::clone(&session)).await;
    ticker.abort();
    canceller.abort();

    match summary.map(Outcome::Done).or_else(|| listener.outcome()) {
        Some(Outcome::Done(text)) => {
            progress.finish("done");
            eprintln!("{text}");
            Ok(())
        }
        Some(Outcome::Failed(text)) => {
            progress.finish("failed");
            bail!("{text}")
        }
        None => {
            progress.finish("stopped");
            bail!("transfer ended without a result")
        }
    }
}

/// Print the options of a remote, hiding secrets
async fn show_remote(config: &Path, name: &str) -> anyhow::Result<()> {
    let options = rclone_transfer::remote_options(config, name).await?;
    println!("[{}]", options.name());
    for (key, value) in options.iter() {
        let hidden = matches!(key, "token" | "client_secret" | "pass" | "password");
        println!("{key} = {}", if hidden { "***" } else { value });
    }
    Ok(())
}

/// Size in bytes of a file or folder tree
async fn size_of(path: &Path) -> anyhow::Result<u64> {
    let root = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        walkdir::WalkDir::new(&root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.metadata().map(|m| m.len()).unwrap_or(0))
            .sum()
    })
    .await
    .context("measuring upload size")
}

/// Last path component, used as the display name
fn display_name(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    trimmed
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(trimmed)
        .to_string()
}
