//! # stainbatch updater library
//!
//! Keeps a portable stainbatch installation current against GitHub releases.
//!
//! ## How it works
//! - **Check (checker.rs)**: a release manifest (`update.json`) published as a
//!   release asset is fetched first; it carries the exact download URL, byte
//!   size and SHA-256 digest. When the manifest is unreachable or malformed,
//!   the checker falls back to the release-listing API and picks the first
//!   channel-appropriate release with a zip asset.
//! - **Download/install (installer.rs)**: the archive is streamed to a staging
//!   file with progress reporting and cooperative cancellation, verified
//!   against the manifest digest, then applied: snapshot the install root,
//!   extract, overwrite, restart.
//! - **Settings (config.rs)**: channel, cadence, skipped versions and the
//!   auto-download/install flags persist in `config/updater.toml`.
//!
//! ## Release manifest
//! Each release should ship an `update.json` asset:
//! ```json
//! {
//!   "version": "1.3.0",
//!   "url": "https://github.com/acme/stainbatch/releases/download/v1.3.0/stainbatch-windows-x64.zip",
//!   "notes": "Pigment density table refresh",
//!   "pub_date": "2026-05-02T09:00:00Z",
//!   "size": 8493201,
//!   "sha256": "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08",
//!   "prerelease": false,
//!   "channel": "stable"
//! }
//! ```

pub mod checker;
pub mod config;
pub mod error;
pub mod github;
pub mod installer;
pub mod version;


// Re-exports for convenience
pub use checker::{CheckOutcome, UpdateChecker};
pub use config::{SettingsStore, UpdateSettings};
pub use error::UpdaterError;
pub use github::{GitHubAsset, GitHubClient, GitHubRelease, ReleaseManifest};
pub use installer::{
    DownloadOutcome, DownloadProgress, InstallReport, InstallerPhase, UpdateInstaller,
};
pub use version::Version;

use serde::{Deserialize, Serialize};

/// Update track. Controls which releases are offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateChannel {
    Stable,
    Beta,
    Dev,
}

impl UpdateChannel {
    fn rank(self) -> u8 {
        match self {
            UpdateChannel::Stable => 0,
            UpdateChannel::Beta => 1,
            UpdateChannel::Dev => 2,
        }
    }

    /// Whether a release tagged for `other` may be offered on this channel.
    /// Stable takes only stable; beta takes stable and beta; dev takes all.
    pub fn admits(self, other: UpdateChannel) -> bool {
        other.rank() <= self.rank()
    }

    /// Whether a prerelease may be offered on this channel.
    pub fn admits_prerelease(self) -> bool {
        !matches!(self, UpdateChannel::Stable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UpdateChannel::Stable => "stable",
            UpdateChannel::Beta => "beta",
            UpdateChannel::Dev => "dev",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stable" => Some(UpdateChannel::Stable),
            "beta" => Some(UpdateChannel::Beta),
            "dev" => Some(UpdateChannel::Dev),
            _ => None,
        }
    }
}

impl Default for UpdateChannel {
    fn default() -> Self {
        UpdateChannel::Stable
    }
}

impl std::fmt::Display for UpdateChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved, offerable update. Built from the release manifest when
/// available, otherwise from the release-listing API (in which case
/// `sha256` is `None` and verification is skipped downstream).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateInfo {
    /// Version string, e.g. "1.3.0".
    pub version: String,
    /// Direct download URL of the release archive.
    pub download_url: String,
    /// Human-readable release notes.
    pub notes: Option<String>,
    /// Publish timestamp as reported by the release source.
    pub published_at: Option<String>,
    /// Archive size in bytes, when known.
    pub size: Option<u64>,
    /// Hex SHA-256 digest of the archive, when the manifest provided one.
    pub sha256: Option<String>,
    /// Whether the release is marked as a prerelease.
    pub prerelease: bool,
    /// Channel the release was published for.
    pub channel: UpdateChannel,
}
