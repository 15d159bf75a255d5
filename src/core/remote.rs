//! Remote option resolution
//!
//! Reads an rclone INI config and returns the options of one remote.
//! The file is read again on every call so edits are picked up between
//! transfers.

use std::collections::BTreeMap;
use std::path::Path;

use crate::core::error::{Error, Result};

/// Remote type that supports service-account rotation and drive links
pub const DRIVE_TYPE: &str = "drive";

/// Options of one named remote section
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteOptions {
    name: String,
    options: BTreeMap<String, String>,
}

impl RemoteOptions {
    /// Remote section name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend type, always present
    pub fn remote_type(&self) -> &str {
        self.options.get("type").map(String::as_str).unwrap_or_default()
    }

    /// Whether this remote belongs to the drive family
    pub fn is_drive(&self) -> bool {
        self.remote_type() == DRIVE_TYPE
    }

    /// Value of an option, empty values are treated as missing
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Iterate over all options in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Parse INI text into sections of lower-cased keys
fn parse_sections(contents: &str) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    let mut current: Option<String> = None;

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let name = name.trim().to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }

        let Some(section) = current.as_ref() else {
            continue;
        };

        let (key, value) = match line.split_once(['=', ':']) {
            Some((key, value)) => (key, value),
            None => (line, ""),
        };

        if let Some(options) = sections.get_mut(section) {
            options.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }

    sections
}

/// Extract one remote from already loaded config text
pub fn parse_remote_options(contents: &str, remote: &str) -> Result<RemoteOptions> {
    let mut sections = parse_sections(contents);
    let options = sections
        .remove(remote)
        .ok_or_else(|| Error::ConfigError(format!("No section: '{remote}'")))?;

    if !options.contains_key("type") {
        return Err(Error::ConfigError(format!("Remote '{remote}' has no type option")));
    }

    Ok(RemoteOptions {
        name: remote.to_string(),
        options,
    })
}

/// Read a config file and return the options of `remote`
pub async fn remote_options(config_path: &Path, remote: &str) -> Result<RemoteOptions> {
    let contents = tokio::fs::read_to_string(config_path).await.map_err(|e| {
        Error::ConfigError(format!("Cannot read rclone config {}: {e}", config_path.display()))
    })?;
    parse_remote_options(&contents, remote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const CONFIG: &str = "\
# main remotes
[gdrive]
type = drive
scope = drive
team_drive = 0ABCdefGHI

[box]
type = webdav
url = https://dav.example.org
; trailing comment
vendor=other
";

    #[test]
    fn test_parse_drive_remote() {
        let opts = parse_remote_options(CONFIG, "gdrive").unwrap();
        assert_eq!(opts.name(), "gdrive");
        assert_eq!(opts.remote_type(), "drive");
        assert!(opts.is_drive());
        assert_eq!(opts.get("team_drive"), Some("0ABCdefGHI"));
        assert_eq!(opts.get("root_folder_id"), None);
    }

    #[test]
    fn test_parse_values_with_separators() {
        let opts = parse_remote_options(CONFIG, "box").unwrap();
        assert!(!opts.is_drive());
        assert_eq!(opts.get("url"), Some("https://dav.example.org"));
        assert_eq!(opts.get("vendor"), Some("other"));
        assert_eq!(opts.iter().count(), 3);
    }

    #[test]
    fn test_missing_section() {
        match parse_remote_options(CONFIG, "s3") {
            Err(Error::ConfigError(msg)) => assert_eq!(msg, "No section: 's3'"),
            other => panic!("Expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn test_section_without_type() {
        let result = parse_remote_options("[broken]\nurl = x\n", "broken");
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_empty_values_are_missing() {
        let config = "[d]\ntype = drive\nservice_account_file =\n";
        let opts = parse_remote_options(config, "d").unwrap();
        assert_eq!(opts.get("service_account_file"), None);
    }

    #[tokio::test]
    async fn test_remote_options_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rclone.conf");
        std::fs::write(&path, CONFIG).unwrap();

        let opts = tokio_test::assert_ok!(remote_options(&path, "box").await);
        assert_eq!(opts.remote_type(), "webdav");

        // Re-read on every call
        std::fs::write(&path, "[box]\ntype = sftp\n").unwrap();
        let opts = tokio_test::assert_ok!(remote_options(&path, "box").await);
        assert_eq!(opts.remote_type(), "sftp");
        tokio_test::assert_err!(remote_options(&path, "gdrive").await);
    }

    #[tokio::test]
    async fn test_unreadable_config() {
        let dir = tempdir().unwrap();
        let result = remote_options(&dir.path().join("missing.conf"), "gdrive").await;
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }
}
