//! rclone command construction
//!
//! Builds the argument vectors for copy/move transfers and for the
//! auxiliary `lsjson` and `link` calls.

use std::ffi::OsString;
use std::path::Path;

use crate::core::settings::Settings;

/// Transfer verb passed to rclone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Copy,
    Move,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Copy => "copy",
            Method::Move => "move",
        }
    }
}

/// Handle to the `remote:path` argument rewritten when switching accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteSlot(usize);

impl RemoteSlot {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Which endpoint of a transfer carries the rotatable remote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotTarget {
    /// Neither side rotates (clone)
    None,
    /// The source is `remote:path` (download)
    Source,
    /// The destination is `remote:path` (upload)
    Destination,
}

/// A fully built rclone invocation
#[derive(Debug, Clone, PartialEq)]
pub struct TransferCommand {
    program: OsString,
    args: Vec<String>,
    slot: Option<RemoteSlot>,
}

impl TransferCommand {
    pub fn program(&self) -> &OsString {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn slot(&self) -> Option<RemoteSlot> {
        self.slot
    }

    /// Argument currently stored in the remote slot
    pub fn remote_arg(&self) -> Option<&str> {
        self.slot.map(|slot| self.args[slot.index()].as_str())
    }

    /// Append backend-specific arguments
    pub fn extend<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
    }

    /// Replace the remote of the slot argument, keeping its path
    ///
    /// Returns false when the command has no rotatable remote.
    pub fn rewrite_remote(&mut self, remote: &str) -> bool {
        let Some(slot) = self.slot else {
            return false;
        };
        let arg = &mut self.args[slot.index()];
        let path = arg.split_once(':').map(|(_, path)| path).unwrap_or_default();
        *arg = format!("{remote}:{path}");
        true
    }

    /// Create a tokio command ready to spawn
    pub fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

/// Parse a `key:value|--flag|...` override string into arguments
pub fn parse_flags(flags: &str) -> Vec<String> {
    let mut args = Vec::new();
    for flag in flags.split('|') {
        if let Some((key, value)) = flag.split_once(':') {
            args.push(key.trim().to_string());
            args.push(value.trim().to_string());
        } else if !flag.is_empty() {
            args.push(flag.trim().to_string());
        }
    }
    args
}

/// Effective override string: task flags first, then the global ones
pub fn effective_flags<'a>(task_flags: &'a str, settings: &'a Settings) -> &'a str {
    if task_flags.is_empty() {
        &settings.rclone_flags
    } else {
        task_flags
    }
}

/// Build a copy/move command
///
/// `overrides` are appended after the fixed scaffolding flags. The slot
/// target chooses which endpoint may later be rewritten to another
/// service account.
pub fn build_transfer(
    settings: &Settings,
    config_path: &Path,
    source: &str,
    destination: &str,
    overrides: &str,
    method: Method,
    target: SlotTarget,
) -> TransferCommand {
    let mut args = vec![
        method.as_str().to_string(),
        "--fast-list".to_string(),
        "--config".to_string(),
        config_path.display().to_string(),
        "-P".to_string(),
    ];

    let source_index = args.len();
    args.push(source.to_string());
    let destination_index = args.len();
    args.push(destination.to_string());

    if let Some(pattern) = settings.exclude_pattern() {
        args.push("--exclude".to_string());
        args.push(pattern);
    }

    args.extend(
        [
            "--retries-sleep",
            "3s",
            "--ignore-case",
            "--low-level-retries",
            "1",
            "-M",
            "--log-file",
        ]
        .map(String::from),
    );
    args.push(settings.log_file.display().to_string());
    args.push("--log-level".to_string());
    args.push("DEBUG".to_string());

    args.extend(parse_flags(overrides));

    let slot = match target {
        SlotTarget::None => None,
        SlotTarget::Source => Some(RemoteSlot(source_index)),
        SlotTarget::Destination => Some(RemoteSlot(destination_index)),
    };

    TransferCommand {
        program: settings.rclone_binary.clone().into_os_string(),
        args,
        slot,
    }
}

/// `rclone lsjson` listing used to find drive ids
pub fn build_list_json(settings: &Settings, config_path: &Path, path: &str) -> TransferCommand {
    TransferCommand {
        program: settings.rclone_binary.clone().into_os_string(),
        args: vec![
            "lsjson".to_string(),
            "--fast-list".to_string(),
            "--no-mimetype".to_string(),
            "--no-modtime".to_string(),
            "--config".to_string(),
            config_path.display().to_string(),
            path.to_string(),
        ],
        slot: None,
    }
}

/// `rclone link` producing a public link for `path`
pub fn build_link(settings: &Settings, config_path: &Path, path: &str) -> TransferCommand {
    TransferCommand {
        program: settings.rclone_binary.clone().into_os_string(),
        args: vec![
            "link".to_string(),
            "--config".to_string(),
            config_path.display().to_string(),
            path.to_string(),
        ],
        slot: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            extension_filter: vec!["aria2".to_string(), "!qB".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_flags() {
        assert_eq!(
            parse_flags("--buffer-size:64M | --drive-starred-only||--tpslimit: 5"),
            vec!["--buffer-size", "64M", "--drive-starred-only", "--tpslimit", "5"]
        );
        assert!(parse_flags("").is_empty());
    }

    #[test]
    fn test_value_with_colon_splits_once() {
        assert_eq!(
            parse_flags("--header:Authorization: Bearer x"),
            vec!["--header", "Authorization: Bearer x"]
        );
    }

    #[test]
    fn test_effective_flags() {
        let mut settings = settings();
        assert_eq!(effective_flags("--a", &settings), "--a");
        assert_eq!(effective_flags("", &settings), "");
        settings.rclone_flags = "--global".to_string();
        assert_eq!(effective_flags("", &settings), "--global");
    }

    #[test]
    fn test_download_layout() {
        let cmd = build_transfer(
            &settings(),
            Path::new("rclone.conf"),
            "gdrive:Movies/x",
            "/downloads/x",
            "--checkers:4",
            Method::Copy,
            SlotTarget::Source,
        );
        assert_eq!(cmd.program(), "rclone");
        assert_eq!(
            cmd.args(),
            [
                "copy", "--fast-list", "--config", "rclone.conf", "-P", "gdrive:Movies/x",
                "/downloads/x", "--exclude", "*.{aria2,!qB}", "--retries-sleep", "3s",
                "--ignore-case", "--low-level-retries", "1", "-M", "--log-file", "rlog.txt",
                "--log-level", "DEBUG", "--checkers", "4",
            ]
        );
        assert_eq!(cmd.remote_arg(), Some("gdrive:Movies/x"));
    }

    #[test]
    fn test_rewrite_destination_slot() {
        let mut cmd = build_transfer(
            &settings(),
            Path::new("rclone_sa/gd.conf"),
            "/downloads/x",
            "sa003:Uploads/x",
            "",
            Method::Move,
            SlotTarget::Destination,
        );
        assert_eq!(cmd.args()[0], "move");
        assert!(cmd.rewrite_remote("sa004"));
        assert_eq!(cmd.remote_arg(), Some("sa004:Uploads/x"));
        // Nothing else moves
        assert_eq!(cmd.args()[5], "/downloads/x");
    }

    #[test]
    fn test_slot_is_stable_without_filter() {
        let settings = Settings {
            extension_filter: Vec::new(),
            ..Default::default()
        };
        let mut cmd = build_transfer(
            &settings,
            Path::new("c.conf"),
            "sa000:a/b:c",
            "/tmp/x",
            "",
            Method::Copy,
            SlotTarget::Source,
        );
        assert!(!cmd.args().iter().any(|a| a == "--exclude"));
        cmd.rewrite_remote("sa001");
        assert_eq!(cmd.remote_arg(), Some("sa001:a/b:c"));
    }

    #[test]
    fn test_clone_has_no_slot() {
        let mut cmd = build_transfer(
            &settings(),
            Path::new("rclone.conf"),
            "a:x",
            "b:y",
            "",
            Method::Copy,
            SlotTarget::None,
        );
        assert!(!cmd.rewrite_remote("sa001"));
        cmd.extend(["--tpslimit", "3"]);
        assert_eq!(&cmd.args()[cmd.args().len() - 2..], ["--tpslimit", "3"]);
    }

    #[test]
    fn test_auxiliary_commands() {
        let list = build_list_json(&settings(), Path::new("rclone.conf"), "gd:folder");
        assert_eq!(
            list.args(),
            [
                "lsjson",
                "--fast-list",
                "--no-mimetype",
                "--no-modtime",
                "--config",
                "rclone.conf",
                "gd:folder"
            ]
        );
        let link = build_link(&settings(), Path::new("rclone.conf"), "box:file.bin");
        assert_eq!(link.args(), ["link", "--config", "rclone.conf", "box:file.bin"]);
    }
}
