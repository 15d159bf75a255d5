//! Share link resolution after a finished transfer
//!
//! Drive remotes get a canonical Google Drive link built from the item id
//! found with `rclone lsjson`; every other backend asks `rclone link`.
//! A transfer that succeeded stays successful when no link can be made.

use std::path::Path;

use log::{error, warn};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::core::command::{build_link, build_list_json};
use crate::core::error::{Error, Result};
use crate::core::process::{run_to_completion, ExitOutcome};
use crate::core::remote::RemoteOptions;
use crate::core::settings::Settings;

/// Entry of `rclone lsjson` output, other fields are ignored
#[derive(Debug, Deserialize)]
struct ListEntry {
    #[serde(rename = "Path")]
    path: String,
    #[serde(rename = "ID", default)]
    id: Option<String>,
}

/// Link (if any) and fully qualified destination of a transferred item
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLink {
    pub link: Option<String>,
    pub destination: String,
}

/// Canonical drive link for an item id
pub fn drive_link(id: &str, is_folder: bool) -> String {
    if is_folder {
        format!("https://drive.google.com/drive/folders/{id}")
    } else {
        format!("https://drive.google.com/uc?id={id}&export=download")
    }
}

/// Fully qualified path of the transferred item
///
/// Folder paths already end with the item name, files are appended.
pub fn destination_path(remote: &str, path: &str, name: &str, is_folder: bool) -> String {
    if is_folder {
        format!("{remote}:{path}")
    } else if path.is_empty() {
        format!("{remote}:{name}")
    } else {
        format!("{remote}:{path}/{name}")
    }
}

/// Path listed by `lsjson` to find the item: its parent for folders
fn listing_path(remote: &str, path: &str, name: &str, is_folder: bool) -> String {
    if !is_folder {
        return destination_path(remote, path, name, false);
    }
    match path.trim_matches('/').rsplit_once('/') {
        Some((parent, _)) => format!("{remote}:{parent}"),
        None => format!("{remote}:"),
    }
}

/// Find the id of `name` in `lsjson` output
fn find_id(listing: &str, name: &str) -> Result<String> {
    let entries: Vec<ListEntry> = serde_json::from_str(listing)?;
    entries
        .into_iter()
        .find(|entry| entry.path == name)
        .and_then(|entry| entry.id)
        .ok_or_else(|| Error::LinkResolutionError(format!("'{name}' not found in listing")))
}

/// Resolves share links with one rclone config
///
/// Lookups stop, without a link, once `cancel` fires.
pub struct LinkResolver<'a> {
    settings: &'a Settings,
    config_path: &'a Path,
    cancel: &'a CancellationToken,
}

impl<'a> LinkResolver<'a> {
    pub fn new(
        settings: &'a Settings,
        config_path: &'a Path,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            settings,
            config_path,
            cancel,
        }
    }

    /// Resolve a link for `name` stored under `remote:path`
    pub async fn resolve(
        &self,
        options: &RemoteOptions,
        remote: &str,
        path: &str,
        name: &str,
        is_folder: bool,
    ) -> ResolvedLink {
        let destination = destination_path(remote, path, name, is_folder);

        let link = if options.is_drive() {
            self.drive(remote, path, name, is_folder).await
        } else {
            self.generic(&destination).await
        };

        let link = match link {
            Ok(link) => link,
            Err(e) => {
                error!("while getting link. Path: {destination} | {e}");
                None
            }
        };

        ResolvedLink { link, destination }
    }

    /// Build a drive link from the id listed by `lsjson`
    async fn drive(
        &self,
        remote: &str,
        path: &str,
        name: &str,
        is_folder: bool,
    ) -> Result<Option<String>> {
        let listing = listing_path(remote, path, name, is_folder);
        let command = build_list_json(self.settings, self.config_path, &listing);
        let output = run_to_completion(&command, self.cancel).await?;

        match output.outcome {
            ExitOutcome::Success => {
                let id = find_id(&output.stdout, name)?;
                Ok(Some(drive_link(&id, is_folder)))
            }
            ExitOutcome::Killed => Ok(None),
            ExitOutcome::Failed(_) => Err(self.failure(output.stderr)),
        }
    }

    /// Ask the backend for a public link
    async fn generic(&self, destination: &str) -> Result<Option<String>> {
        let command = build_link(self.settings, self.config_path, destination);
        let output = run_to_completion(&command, self.cancel).await?;

        match output.outcome {
            ExitOutcome::Success if output.stdout.is_empty() => {
                warn!("rclone link returned nothing for {destination}");
                Ok(None)
            }
            ExitOutcome::Success => Ok(Some(output.stdout)),
            ExitOutcome::Killed => Ok(None),
            ExitOutcome::Failed(_) => Err(self.failure(output.stderr)),
        }
    }

    fn failure(&self, stderr: String) -> Error {
        if stderr.is_empty() {
            Error::LinkResolutionError(self.settings.log_hint())
        } else {
            Error::LinkResolutionError(format!("Stderr: {stderr}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::remote::parse_remote_options;

    #[test]
    fn test_drive_link_shapes() {
        assert_eq!(drive_link("abc", true), "https://drive.google.com/drive/folders/abc");
        assert_eq!(
            drive_link("abc", false),
            "https://drive.google.com/uc?id=abc&export=download"
        );
    }

    #[test]
    fn test_destination_path() {
        assert_eq!(destination_path("gd", "Movies/Show", "Show", true), "gd:Movies/Show");
        assert_eq!(destination_path("gd", "Movies", "a.mkv", false), "gd:Movies/a.mkv");
        assert_eq!(destination_path("gd", "", "a.mkv", false), "gd:a.mkv");
    }

    #[test]
    fn test_listing_path() {
        assert_eq!(listing_path("gd", "/Movies/Show/", "Show", true), "gd:Movies");
        assert_eq!(listing_path("gd", "Show", "Show", true), "gd:");
        assert_eq!(listing_path("gd", "Movies", "a.mkv", false), "gd:Movies/a.mkv");
    }

    #[test]
    fn test_find_id() {
        let listing = r#"[
            {"Path":"Other","Name":"Other","Size":-1,"IsDir":true,"ID":"1"},
            {"Path":"Show","Name":"Show","Size":-1,"IsDir":true,"ID":"2x"}
        ]"#;
        assert_eq!(find_id(listing, "Show").unwrap(), "2x");
        assert!(matches!(find_id(listing, "Missing"), Err(Error::LinkResolutionError(_))));
        assert!(matches!(find_id("not json", "Show"), Err(Error::LinkResolutionError(_))));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::tempdir;

        fn settings_with(dir: &Path, body: &str) -> Settings {
            let path = dir.join("rclone");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            Settings {
                rclone_binary: path,
                ..Default::default()
            }
        }

        #[tokio::test]
        async fn test_drive_folder_link() {
            let dir = tempdir().unwrap();
            let settings = settings_with(
                dir.path(),
                r#"echo '[{"Path":"Show","IsDir":true,"ID":"F1"}]'"#,
            );
            let options = parse_remote_options("[gd]\ntype = drive\n", "gd").unwrap();
            let cancel = CancellationToken::new();
            let resolver = LinkResolver::new(&settings, Path::new("rclone.conf"), &cancel);

            let resolved = resolver.resolve(&options, "gd", "Movies/Show", "Show", true).await;
            assert_eq!(
                resolved.link.as_deref(),
                Some("https://drive.google.com/drive/folders/F1")
            );
            assert_eq!(resolved.destination, "gd:Movies/Show");
        }

        #[tokio::test]
        async fn test_generic_link() {
            let dir = tempdir().unwrap();
            let settings = settings_with(dir.path(), "echo \"https://share.example/$4\"");
            let options = parse_remote_options("[box]\ntype = webdav\n", "box").unwrap();
            let cancel = CancellationToken::new();
            let resolver = LinkResolver::new(&settings, Path::new("rclone.conf"), &cancel);

            let resolved = resolver.resolve(&options, "box", "up", "a.bin", false).await;
            assert_eq!(resolved.link.as_deref(), Some("https://share.example/box:up/a.bin"));
            assert_eq!(resolved.destination, "box:up/a.bin");
        }

        #[tokio::test]
        async fn test_link_failure_is_not_fatal() {
            let dir = tempdir().unwrap();
            let settings = settings_with(dir.path(), "echo 'link not supported' >&2\nexit 1");
            let options = parse_remote_options("[box]\ntype = sftp\n", "box").unwrap();
            let cancel = CancellationToken::new();
            let resolver = LinkResolver::new(&settings, Path::new("rclone.conf"), &cancel);

            let resolved = resolver.resolve(&options, "box", "", "a.bin", false).await;
            assert_eq!(resolved.link, None);
            assert_eq!(resolved.destination, "box:a.bin");
        }

        #[tokio::test]
        async fn test_missing_drive_entry_is_not_fatal() {
            let dir = tempdir().unwrap();
            let settings = settings_with(dir.path(), "echo '[]'");
            let options = parse_remote_options("[gd]\ntype = drive\n", "gd").unwrap();
            let cancel = CancellationToken::new();
            let resolver = LinkResolver::new(&settings, Path::new("rclone.conf"), &cancel);

            let resolved = resolver.resolve(&options, "gd", "x", "a.bin", false).await;
            assert_eq!(resolved.link, None);
        }

        #[tokio::test]
        async fn test_cancelled_lookup_spawns_nothing() {
            let dir = tempdir().unwrap();
            let marker = dir.path().join("spawned");
            let settings = settings_with(dir.path(), &format!("touch '{}'", marker.display()));
            let options = parse_remote_options("[box]\ntype = webdav\n", "box").unwrap();
            let cancel = CancellationToken::new();
            cancel.cancel();
            let resolver = LinkResolver::new(&settings, Path::new("rclone.conf"), &cancel);

            let resolved = resolver.resolve(&options, "box", "up", "a.bin", false).await;
            assert_eq!(resolved.link, None);
            assert_eq!(resolved.destination, "box:up/a.bin");
            assert!(!marker.exists());
        }
    }
}
