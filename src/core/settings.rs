//! Runtime settings for rclone-transfer
//!
//! Everything a session needs to know about its surroundings: where the
//! rclone executable and configs live, the global extension filter and
//! the service-account switches.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::error::{Error, Result};

/// Configuration shared by all transfer sessions
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Path or name of the rclone executable
    pub rclone_binary: PathBuf,

    /// Default rclone config file
    pub config_path: PathBuf,

    /// Directory holding one JSON credential file per service account
    pub accounts_dir: PathBuf,

    /// Directory where generated service-account configs are written
    pub pool_dir: PathBuf,

    /// Directory of per-caller private configs selected with the `mrcc:` prefix
    pub private_config_dir: PathBuf,

    /// rclone debug log file
    pub log_file: PathBuf,

    /// Extensions (without the dot) never uploaded and excluded from transfers
    pub extension_filter: Vec<String>,

    /// Global flag overrides, used when a task brings none of its own
    pub rclone_flags: String,

    /// Whether drive remotes may rotate through service accounts
    pub use_service_accounts: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rclone_binary: PathBuf::from("rclone"),
            config_path: PathBuf::from("rclone.conf"),
            accounts_dir: PathBuf::from("accounts"),
            pool_dir: PathBuf::from("rclone_sa"),
            private_config_dir: PathBuf::from("rclone"),
            log_file: PathBuf::from("rlog.txt"),
            extension_filter: vec!["aria2".to_string(), "!qB".to_string()],
            rclone_flags: String::new(),
            use_service_accounts: false,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file, missing keys keep their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Cannot read settings file {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    /// Parse settings from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::ConfigError(format!("Invalid settings: {e}")))
    }

    /// Private config of a caller, selected by the `mrcc:` destination prefix
    pub fn private_config(&self, caller_id: &str) -> PathBuf {
        self.private_config_dir.join(format!("{caller_id}.conf"))
    }

    /// Whether a path ends with one of the filtered extensions (case-insensitive)
    pub fn is_excluded(&self, path: &Path) -> bool {
        let lower = path.to_string_lossy().to_lowercase();
        self.extension_filter
            .iter()
            .any(|ext| lower.ends_with(&ext.to_lowercase()))
    }

    /// The `--exclude` glob built from the extension filter
    pub fn exclude_pattern(&self) -> Option<String> {
        if self.extension_filter.is_empty() {
            return None;
        }
        Some(format!("*.{{{}}}", self.extension_filter.join(",")))
    }

    /// Message used when rclone fails without writing anything to stderr
    pub fn log_hint(&self) -> String {
        format!("Use '/shell cat {}' to see more information", self.log_file.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.config_path, PathBuf::from("rclone.conf"));
        assert_eq!(settings.pool_dir, PathBuf::from("rclone_sa"));
        assert!(!settings.use_service_accounts);
        assert_eq!(settings.log_hint(), "Use '/shell cat rlog.txt' to see more information");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings = Settings::from_json(
            r#"{ "use_service_accounts": true, "extension_filter": ["iso", "exe"] }"#,
        )
        .unwrap();
        assert!(settings.use_service_accounts);
        assert_eq!(settings.extension_filter, vec!["iso", "exe"]);
        assert_eq!(settings.rclone_binary, PathBuf::from("rclone"));
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        match Settings::from_json("{ not json") {
            Err(Error::ConfigError(msg)) => assert!(msg.starts_with("Invalid settings")),
            other => panic!("Expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn test_is_excluded() {
        let settings = Settings {
            extension_filter: vec!["iso".to_string()],
            ..Default::default()
        };
        assert!(settings.is_excluded(Path::new("/downloads/Linux.ISO")));
        assert!(!settings.is_excluded(Path::new("/downloads/linux.img")));
    }

    #[test]
    fn test_exclude_pattern() {
        let settings = Settings::default();
        assert_eq!(settings.exclude_pattern().as_deref(), Some("*.{aria2,!qB}"));

        let empty = Settings {
            extension_filter: Vec::new(),
            ..Default::default()
        };
        assert_eq!(empty.exclude_pattern(), None);
    }

    #[test]
    fn test_private_config() {
        let settings = Settings::default();
        assert_eq!(settings.private_config("1234"), PathBuf::from("rclone/1234.conf"));
    }
}
