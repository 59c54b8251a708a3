//! Update pipeline errors.
//!
//! ## Covered failure classes
//! - network loss / timeouts
//! - API and manifest responses
//! - checksum mismatch on a downloaded archive
//! - backup and file-system failures during install

use serde::{Deserialize, Serialize};
use std::fmt;

/// Updater error type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum UpdaterError {
    /// Network connection failure.
    Network { message: String, recoverable: bool },
    /// HTTP request timeout.
    Timeout { operation: String },
    /// Non-success API response.
    Api { status_code: u16, message: String },
    /// The release manifest was missing or malformed.
    Manifest { message: String },
    /// Digest of the downloaded archive did not match the manifest.
    ChecksumMismatch { expected: String, actual: String },
    /// Snapshot of the current installation could not be created.
    /// Installation never proceeds past this.
    BackupFailed { path: String, message: String },
    /// File-system failure (staging, extraction, copy-over).
    FileSystem {
        operation: String,
        path: String,
        message: String,
    },
    /// A download or install was started while one was already running.
    OperationInProgress { operation: String },
    /// Settings file could not be written.
    Config { message: String },
}

impl fmt::Display for UpdaterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdaterError::Network { message, .. } => write!(f, "Network error: {}", message),
            UpdaterError::Timeout { operation } => write!(f, "Timed out during {}", operation),
            UpdaterError::Api { status_code, message } => {
                write!(f, "API error ({}): {}", status_code, message)
            }
            UpdaterError::Manifest { message } => write!(f, "Release manifest error: {}", message),
            UpdaterError::ChecksumMismatch { expected, actual } => {
                write!(f, "Checksum mismatch: expected {}, got {}", expected, actual)
            }
            UpdaterError::BackupFailed { path, message } => {
                write!(f, "Backup to '{}' failed: {}", path, message)
            }
            UpdaterError::FileSystem { operation, path, message } => {
                write!(f, "File system error during {} on '{}': {}", operation, path, message)
            }
            UpdaterError::OperationInProgress { operation } => {
                write!(f, "Another {} is already in progress", operation)
            }
            UpdaterError::Config { message } => write!(f, "Settings error: {}", message),
        }
    }
}

impl std::error::Error for UpdaterError {}

impl UpdaterError {
    /// Whether retrying the same operation can reasonably succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            UpdaterError::Network { recoverable, .. } => *recoverable,
            UpdaterError::Timeout { .. } => true,
            // 5xx may clear up; 4xx will not
            UpdaterError::Api { status_code, .. } => *status_code >= 500,
            UpdaterError::Manifest { .. } => false,
            // a re-download can fix a corrupt archive
            UpdaterError::ChecksumMismatch { .. } => true,
            UpdaterError::BackupFailed { .. } => false,
            UpdaterError::FileSystem { .. } => false,
            UpdaterError::OperationInProgress { .. } => true,
            UpdaterError::Config { .. } => false,
        }
    }

    /// Short message suitable for the user-facing status line. The full
    /// technical detail stays in `Display`.
    pub fn user_message(&self) -> String {
        match self {
            UpdaterError::Network { .. } => "Check your internet connection.".to_string(),
            UpdaterError::Timeout { .. } => {
                "The update server is slow to respond. Try again later.".to_string()
            }
            UpdaterError::Api { status_code, .. } => {
                if *status_code == 404 {
                    "The requested update could not be found.".to_string()
                } else if *status_code >= 500 {
                    "The update server has a temporary problem. Try again later.".to_string()
                } else {
                    format!("Update server error ({})", status_code)
                }
            }
            UpdaterError::Manifest { .. } => {
                "The release information could not be read.".to_string()
            }
            UpdaterError::ChecksumMismatch { .. } => {
                "The downloaded update failed verification and was discarded.".to_string()
            }
            UpdaterError::BackupFailed { .. } => {
                "Could not back up the current installation. The update was not applied."
                    .to_string()
            }
            UpdaterError::FileSystem { .. } => {
                "A file operation failed. Check disk space and permissions.".to_string()
            }
            UpdaterError::OperationInProgress { operation } => {
                format!("An update {} is already running.", operation)
            }
            UpdaterError::Config { message } => format!("Settings error: {}", message),
        }
    }

    /// Maps a reqwest failure onto the taxonomy.
    pub fn from_reqwest(err: &reqwest::Error, operation: &str) -> Self {
        if err.is_timeout() {
            UpdaterError::Timeout {
                operation: operation.to_string(),
            }
        } else if err.is_connect() {
            UpdaterError::Network {
                message: format!("connection failed during {}", operation),
                recoverable: true,
            }
        } else if let Some(status) = err.status() {
            UpdaterError::Api {
                status_code: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            UpdaterError::Network {
                message: err.to_string(),
                recoverable: err.is_request() || err.is_body(),
            }
        }
    }

    /// Maps an IO failure onto the taxonomy.
    pub fn from_io(err: &std::io::Error, operation: &str, path: &std::path::Path) -> Self {
        UpdaterError::FileSystem {
            operation: operation.to_string(),
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}
