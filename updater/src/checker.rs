//! Update check pipeline.
//!
//! ## Check sequence
//! 1. Rate limit: automatic checks short-circuit while the configured
//!    interval has not elapsed. User-initiated checks always run.
//! 2. Manifest first: the per-release `update.json` gives the exact
//!    download URL, size, digest and channel.
//! 3. Fallback: on any manifest failure, the release-listing API is
//!    queried; drafts are dropped, channel rules applied, and the first
//!    release with a zip asset wins. No digest is available on this path.
//! 4. Skip list, then strict version comparison.
//!
//! Network and parse failures never propagate out of a check; they
//! degrade to the fallback or to a `Failed` outcome.

use crate::config::SettingsStore;
use crate::github::{GitHubClient, GitHubRelease};
use crate::{version, UpdateChannel, UpdateInfo, UpdateSettings};

/// Result of one check. `Idle → Checking → {NoUpdate, UpdateAvailable,
/// Skipped, Failed}` collapses to the terminal state the caller sees.
#[derive(Debug, Clone)]
pub enum CheckOutcome {
    /// Already current (or the check was rate-limited).
    NoUpdate,
    /// A newer, unskipped release is available.
    UpdateAvailable(UpdateInfo),
    /// The newest release is on the user's skip list.
    Skipped { version: String },
    /// Neither the manifest nor the API produced usable information.
    Failed { reason: String },
}

/// Checks the configured release source for a newer version.
pub struct UpdateChecker {
    current_version: String,
}

impl UpdateChecker {
    pub fn new(current_version: impl Into<String>) -> Self {
        Self {
            current_version: current_version.into(),
        }
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    /// Runs one check. The settings handle is passed explicitly; the
    /// last-check timestamp is updated (and persisted) as soon as the
    /// remote source has answered, whatever the outcome.
    pub async fn check_for_updates(
        &self,
        store: &mut SettingsStore,
        user_initiated: bool,
    ) -> CheckOutcome {
        let settings = store.settings().clone();

        if settings.github_owner.is_empty() || settings.github_repo.is_empty() {
            return CheckOutcome::Failed {
                reason: "update source not configured (github_owner/github_repo)".to_string(),
            };
        }

        if !user_initiated && !store.should_check_now() {
            tracing::debug!("[Checker] Interval not elapsed, skipping automatic check");
            return CheckOutcome::NoUpdate;
        }

        let client = GitHubClient::with_base_urls(
            &settings.github_owner,
            &settings.github_repo,
            settings.api_base_url.as_deref(),
            settings.download_base_url.as_deref(),
        );

        tracing::info!(
            "[Checker] Checking {}/{} ({} channel)",
            settings.github_owner,
            settings.github_repo,
            settings.channel
        );

        // Preferred path: the per-release manifest.
        let info = match client.fetch_manifest().await {
            Ok(manifest) if self.admits(&settings, manifest.channel, manifest.prerelease) => {
                Some(manifest.into_update_info())
            }
            Ok(manifest) => {
                tracing::info!(
                    "[Checker] Manifest offers {} on '{}' channel, not admitted on '{}'",
                    manifest.version,
                    manifest.channel,
                    settings.channel
                );
                None
            }
            Err(e) => {
                tracing::warn!("[Checker] Manifest unavailable, trying release API: {}", e);
                None
            }
        };

        let info = match info {
            Some(info) => info,
            None => match self.resolve_from_releases(&client, &settings).await {
                Ok(Some(info)) => info,
                Ok(None) => {
                    tracing::info!("[Checker] No suitable release found");
                    record_check_time(store);
                    return CheckOutcome::NoUpdate;
                }
                Err(e) => {
                    tracing::error!("[Checker] Release listing failed: {}", e);
                    return CheckOutcome::Failed {
                        reason: format!("{}", e),
                    };
                }
            },
        };

        // The remote side answered; that is what the rate limit counts,
        // regardless of which outcome the answer produces.
        record_check_time(store);

        // Skip list wins over everything else.
        if store.is_skipped(&info.version) {
            tracing::info!("[Checker] Version {} is on the skip list", info.version);
            return CheckOutcome::Skipped {
                version: info.version,
            };
        }

        if !version::is_newer(&info.version, &self.current_version) {
            tracing::info!(
                "[Checker] {} is not newer than running {}",
                info.version,
                self.current_version
            );
            return CheckOutcome::NoUpdate;
        }

        tracing::info!("[Checker] Update available: {}", info.version);
        CheckOutcome::UpdateAvailable(info)
    }

    /// Fallback path: build an `UpdateInfo` from the release listing.
    /// The result carries no digest, so verification is skipped downstream.
    async fn resolve_from_releases(
        &self,
        client: &GitHubClient,
        settings: &UpdateSettings,
    ) -> anyhow::Result<Option<UpdateInfo>> {
        let releases = client.fetch_releases(20).await?;
        Ok(select_release(&releases, settings).map(|(release, asset)| UpdateInfo {
            // Tags carry a single-character prefix ("v1.2.0"); multi-character
            // prefixes mis-parse and are rejected by the version comparison.
            version: version::strip_tag_prefix(&release.tag_name).to_string(),
            download_url: asset.browser_download_url.clone(),
            notes: release.body.clone(),
            published_at: release.published_at.clone(),
            size: Some(asset.size),
            sha256: None,
            prerelease: release.prerelease,
            channel: settings.channel,
        }))
    }

    fn admits(&self, settings: &UpdateSettings, channel: UpdateChannel, prerelease: bool) -> bool {
        if !settings.channel.admits(channel) {
            return false;
        }
        !prerelease || settings.include_prerelease || settings.channel.admits_prerelease()
    }
}

/// Bookkeeping, not user intent: log and carry on if the save fails.
fn record_check_time(store: &mut SettingsStore) {
    if let Err(e) = store.touch_last_check() {
        tracing::warn!("[Checker] Could not persist last-check timestamp: {}", e);
    }
}

/// Picks the first non-draft, channel-admitted release carrying a zip
/// asset. Releases come newest first from the API.
pub fn select_release<'a>(
    releases: &'a [GitHubRelease],
    settings: &UpdateSettings,
) -> Option<(&'a GitHubRelease, &'a crate::github::GitHubAsset)> {
    releases
        .iter()
        .filter(|r| !r.draft)
        .filter(|r| {
            !r.prerelease || settings.include_prerelease || settings.channel.admits_prerelease()
        })
        .find_map(|r| r.zip_asset().map(|a| (r, a)))
}
