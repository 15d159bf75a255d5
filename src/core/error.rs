//! Error types for rclone-transfer
//!
//! Every failure a transfer session can run into, from unreadable rclone
//! configs to a transfer the executable reported as failed.

use std::fmt;

/// Maximum number of characters of a transfer error forwarded to a listener
pub const MAX_ERROR_LENGTH: usize = 4000;

/// Main error type for rclone-transfer operations
#[derive(Debug)]
pub enum Error {
    /// Missing or unreadable config file, or missing remote section
    ConfigError(String),

    /// The transfer executable exited with a non-zero, non-killed status
    TransferError(String),

    /// A finished transfer whose share link could not be produced
    LinkResolutionError(String),

    /// Every service account in the pool has been tried
    CredentialExhausted(usize),

    /// Upload rejected because of the global extension filter
    ExtensionExcluded(String),

    /// Invalid configuration or parameters
    InvalidInput(String),

    /// File I/O error
    IoError(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConfigError(msg) => {
                write!(f, "{msg}")
            }
            Error::TransferError(msg) => {
                write!(f, "{msg}")
            }
            Error::LinkResolutionError(msg) => {
                write!(f, "Link resolution failed: {msg}")
            }
            Error::CredentialExhausted(count) => {
                write!(
                    f,
                    "Reached maximum number of service accounts switching, which is {count}"
                )
            }
            Error::ExtensionExcluded(_) => {
                write!(f, "This file extension is excluded by extension filter!")
            }
            Error::InvalidInput(msg) => {
                write!(f, "Invalid input: {msg}")
            }
            Error::IoError(err) => {
                write!(f, "I/O error: {err}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::LinkResolutionError(err.to_string())
    }
}

/// Truncate an error message to at most `MAX_ERROR_LENGTH` characters
pub fn truncate_message(message: &str) -> String {
    message.chars().take(MAX_ERROR_LENGTH).collect()
}

/// Convenience result type for rclone-transfer operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_excluded_message() {
        let err = Error::ExtensionExcluded("movie.iso".to_string());
        assert_eq!(err.to_string(), "This file extension is excluded by extension filter!");
    }

    #[test]
    fn test_config_error_is_passed_through() {
        let err = Error::ConfigError("No section: 'gdrive'".to_string());
        assert_eq!(err.to_string(), "No section: 'gdrive'");
    }

    #[test]
    fn test_truncate_message() {
        let long = "x".repeat(MAX_ERROR_LENGTH + 250);
        assert_eq!(truncate_message(&long).len(), MAX_ERROR_LENGTH);
        assert_eq!(truncate_message("short"), "short");

        // Multi-byte characters are never split
        let wide = "é".repeat(MAX_ERROR_LENGTH + 1);
        assert_eq!(truncate_message(&wide).chars().count(), MAX_ERROR_LENGTH);
    }

    #[test]
    fn test_io_error_source() {
        use std::error::Error as _;
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(err.source().is_some());
        assert!(Error::InvalidInput("bad".to_string()).source().is_none());
    }
}
