//! GitHub release source.
//!
//! Two endpoints are used: the well-known per-release manifest URL
//! (`<download base>/<owner>/<repo>/releases/latest/download/update.json`,
//! the preferred path) and the REST release-listing API (the fallback).
//! Both base URLs can be overridden for tests against a local mock server.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::UpdaterError;
use crate::{UpdateChannel, UpdateInfo};

/// Release asset expected to carry the update manifest.
pub const MANIFEST_ASSET: &str = "update.json";

/// Release listing entry (only the fields we consume).
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    pub name: Option<String>,
    pub body: Option<String>,
    pub prerelease: bool,
    pub draft: bool,
    pub published_at: Option<String>,
    pub assets: Vec<GitHubAsset>,
}

impl GitHubRelease {
    /// First asset whose name ends in `.zip`, if any.
    pub fn zip_asset(&self) -> Option<&GitHubAsset> {
        self.assets.iter().find(|a| a.name.ends_with(".zip"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubAsset {
    pub name: String,
    pub size: u64,
    pub browser_download_url: String,
    pub content_type: Option<String>,
}

/// `update.json`: the per-release manifest published alongside the archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseManifest {
    pub version: String,
    /// Direct download URL of the release archive.
    pub url: String,
    pub notes: Option<String>,
    pub pub_date: Option<String>,
    pub size: Option<u64>,
    /// Hex SHA-256 of the archive. Absent digests skip verification.
    pub sha256: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub channel: UpdateChannel,
}

impl ReleaseManifest {
    pub fn into_update_info(self) -> UpdateInfo {
        UpdateInfo {
            version: self.version,
            download_url: self.url,
            notes: self.notes,
            published_at: self.pub_date,
            size: self.size,
            sha256: self.sha256,
            prerelease: self.prerelease,
            channel: self.channel,
        }
    }
}

/// GitHub API client.
pub struct GitHubClient {
    owner: String,
    repo: String,
    http: reqwest::Client,
    /// API base URL (default "https://api.github.com").
    api_base: String,
    /// Download base URL for the manifest shortcut (default "https://github.com").
    download_base: String,
}

impl GitHubClient {
    pub fn new(owner: &str, repo: &str) -> Self {
        Self::with_base_urls(owner, repo, None, None)
    }

    /// Constructor with overridable base URLs (mock server support).
    pub fn with_base_urls(
        owner: &str,
        repo: &str,
        api_base: Option<&str>,
        download_base: Option<&str>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("stainbatch-updater/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let normalize = |base: Option<&str>, default: &str| {
            base.filter(|s| !s.trim().is_empty())
                .unwrap_or(default)
                .trim_end_matches('/')
                .to_string()
        };

        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            http,
            api_base: normalize(api_base, "https://api.github.com"),
            download_base: normalize(download_base, "https://github.com"),
        }
    }

    /// Well-known manifest location for the latest release.
    pub fn manifest_url(&self) -> String {
        format!(
            "{}/{}/{}/releases/latest/download/{}",
            self.download_base, self.owner, self.repo, MANIFEST_ASSET
        )
    }

    /// Fetches and parses the latest-release manifest.
    pub async fn fetch_manifest(&self) -> Result<ReleaseManifest, UpdaterError> {
        let url = self.manifest_url();
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| UpdaterError::from_reqwest(&e, "manifest fetch"))?;

        if !response.status().is_success() {
            return Err(UpdaterError::Manifest {
                message: format!("{} for {}", response.status(), url),
            });
        }

        response.json().await.map_err(|e| UpdaterError::Manifest {
            message: e.to_string(),
        })
    }

    /// Lists releases, newest first (up to `per_page`).
    pub async fn fetch_releases(&self, per_page: u32) -> Result<Vec<GitHubRelease>> {
        let url = format!(
            "{}/repos/{}/{}/releases?per_page={}",
            self.api_base, self.owner, self.repo, per_page
        );

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("release listing failed ({}): {}", status, body);
        }

        let releases: Vec<GitHubRelease> = response.json().await?;
        Ok(releases)
    }

    /// Opens a status-checked streaming response for an archive download.
    pub async fn open_download(&self, url: &str) -> Result<reqwest::Response> {
        tracing::debug!("[GitHub] GET {}", url);
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("download request failed ({}): {}", response.status(), url);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_manifest() {
        let json = r#"{
            "version": "1.3.0",
            "url": "https://example.com/stainbatch-windows-x64.zip",
            "notes": "Pigment density table refresh",
            "pub_date": "2026-05-02T09:00:00Z",
            "size": 8493201,
            "sha256": "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08",
            "prerelease": false,
            "channel": "stable"
        }"#;

        let manifest: ReleaseManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.version, "1.3.0");
        assert_eq!(manifest.channel, UpdateChannel::Stable);
        assert!(manifest.sha256.is_some());

        let info = manifest.into_update_info();
        assert_eq!(info.size, Some(8493201));
        assert!(!info.prerelease);
    }

    #[test]
    fn parse_manifest_minimal() {
        // prerelease and channel are optional; absent digest means no verification
        let json = r#"{ "version": "1.4.0-beta.1", "url": "https://example.com/b.zip" }"#;
        let manifest: ReleaseManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.channel, UpdateChannel::Stable);
        assert!(!manifest.prerelease);
        assert!(manifest.sha256.is_none());
    }

    #[test]
    fn parse_release_listing() {
        let json = r#"[{
            "tag_name": "v1.2.1",
            "name": "1.2.1",
            "body": "Fixes",
            "prerelease": false,
            "draft": false,
            "published_at": "2026-03-10T12:00:00Z",
            "assets": [
                { "name": "checksums.txt", "size": 120, "browser_download_url": "u1", "content_type": "text/plain" },
                { "name": "stainbatch-windows-x64.zip", "size": 900, "browser_download_url": "u2", "content_type": "application/zip" }
            ]
        }]"#;

        let releases: Vec<GitHubRelease> = serde_json::from_str(json).unwrap();
        assert_eq!(releases.len(), 1);
        let asset = releases[0].zip_asset().unwrap();
        assert_eq!(asset.name, "stainbatch-windows-x64.zip");
        assert_eq!(asset.browser_download_url, "u2");
    }

    #[test]
    fn manifest_url_override() {
        let client =
            GitHubClient::with_base_urls("acme", "stainbatch", None, Some("http://127.0.0.1:9876/"));
        assert_eq!(
            client.manifest_url(),
            "http://127.0.0.1:9876/acme/stainbatch/releases/latest/download/update.json"
        );
    }
}
