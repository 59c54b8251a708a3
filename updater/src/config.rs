//! Durable update preferences.
//!
//! Settings live in `config/updater.toml` next to the executable (or the
//! working directory in development). A missing or unreadable file never
//! fails a load; documented defaults are substituted. Saving is different:
//! a failed save means a user action was not honored, so it propagates.

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::UpdaterError;
use crate::UpdateChannel;

/// Persisted update preferences. Mirrors the settings file field for field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateSettings {
    /// GitHub repository owner.
    pub github_owner: String,
    /// GitHub repository name.
    pub github_repo: String,
    /// Update track (stable/beta/dev).
    pub channel: UpdateChannel,
    /// Offer prereleases even on the stable channel.
    pub include_prerelease: bool,
    /// Run a check when the application starts.
    pub check_on_startup: bool,
    /// Minimum hours between automatic checks.
    pub check_interval_hours: u32,
    /// RFC 3339 timestamp of the last completed check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<String>,
    /// Versions the user chose not to be offered again.
    pub skipped_versions: Vec<String>,
    /// Download a found update without asking.
    pub auto_download: bool,
    /// Install a verified download without asking.
    pub auto_install: bool,
    /// Where installation snapshots go. Defaults to `<staging>/backups`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<String>,
    /// Reserved: public key for release signature checks. Persisted so
    /// existing settings files keep it; not consumed by this version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_path: Option<String>,
    /// Installation directory override. Defaults to the executable's parent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_root: Option<String>,
    /// API base URL override (local mock server support).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    /// Download base URL override for the manifest shortcut.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_base_url: Option<String>,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            github_owner: String::new(),
            github_repo: "stainbatch".to_string(),
            channel: UpdateChannel::Stable,
            include_prerelease: false,
            check_on_startup: true,
            check_interval_hours: 24,
            last_check: None,
            skipped_versions: Vec::new(),
            auto_download: false,
            auto_install: false,
            backup_dir: None,
            public_key_path: None,
            install_root: None,
            api_base_url: None,
            download_base_url: None,
        }
    }
}

/// Settings handle: the deserialized settings plus the file they came from.
/// Passed explicitly to the checker and the settings UI, never held in a
/// global configuration singleton.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
    settings: UpdateSettings,
}

impl SettingsStore {
    /// Loads settings from `path`. Absent or corrupt files yield defaults.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str::<UpdateSettings>(&content) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(
                        "[Settings] {} is not valid, using defaults: {}",
                        path.display(),
                        e
                    );
                    UpdateSettings::default()
                }
            },
            Err(_) => UpdateSettings::default(),
        };
        Self { path, settings }
    }

    /// Loads from the default location (exe-relative, then CWD).
    pub fn load_default() -> Self {
        Self::load(default_settings_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &UpdateSettings {
        &self.settings
    }

    /// Applies a mutation and persists it immediately.
    pub fn update(&mut self, mutate: impl FnOnce(&mut UpdateSettings)) -> Result<()> {
        mutate(&mut self.settings);
        self.save()
    }

    /// Serializes the current settings back to the file they came from.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| UpdaterError::Config {
                message: format!("cannot create {}: {}", parent.display(), e),
            })?;
        }
        let content = toml::to_string_pretty(&self.settings).map_err(|e| UpdaterError::Config {
            message: e.to_string(),
        })?;
        std::fs::write(&self.path, content).map_err(|e| UpdaterError::Config {
            message: format!("cannot write {}: {}", self.path.display(), e),
        })?;
        Ok(())
    }

    /// Whether a startup check is due: checking is enabled and at least
    /// `check_interval_hours` have passed since the last check (or no
    /// check has ever run).
    pub fn should_check_now(&self) -> bool {
        if !self.settings.check_on_startup {
            return false;
        }
        match self.hours_since_last_check() {
            Some(hours) => hours >= self.settings.check_interval_hours as f64,
            None => true,
        }
    }

    pub fn hours_since_last_check(&self) -> Option<f64> {
        let last = self.settings.last_check.as_deref()?;
        let parsed = chrono::DateTime::parse_from_rfc3339(last).ok()?;
        let elapsed = Utc::now().signed_duration_since(parsed.with_timezone(&Utc));
        Some(elapsed.num_seconds() as f64 / 3600.0)
    }

    /// Records a completed check and persists it.
    pub fn touch_last_check(&mut self) -> Result<()> {
        self.settings.last_check = Some(Utc::now().to_rfc3339());
        self.save()
    }

    /// Adds a version to the skip list (idempotent) and persists.
    pub fn skip_version(&mut self, version: &str) -> Result<()> {
        if !self.is_skipped(version) {
            self.settings.skipped_versions.push(version.to_string());
            self.save()?;
        }
        Ok(())
    }

    pub fn is_skipped(&self, version: &str) -> bool {
        self.settings.skipped_versions.iter().any(|v| v == version)
    }

    /// `config set <key> <value>` support for the CLI.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "github_owner" => self.settings.github_owner = value.to_string(),
            "github_repo" => self.settings.github_repo = value.to_string(),
            "channel" => {
                self.settings.channel = UpdateChannel::parse(value).ok_or_else(|| {
                    anyhow::anyhow!("invalid channel '{}' (use stable/beta/dev)", value)
                })?;
            }
            "include_prerelease" | "check_on_startup" | "auto_download" | "auto_install" => {
                let parsed: bool = value
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid boolean '{}' (use true/false)", value))?;
                match key {
                    "include_prerelease" => self.settings.include_prerelease = parsed,
                    "check_on_startup" => self.settings.check_on_startup = parsed,
                    "auto_download" => self.settings.auto_download = parsed,
                    _ => self.settings.auto_install = parsed,
                }
            }
            "check_interval_hours" => {
                self.settings.check_interval_hours = value
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid integer '{}'", value))?;
            }
            "backup_dir" => self.settings.backup_dir = Some(value.to_string()),
            "install_root" => self.settings.install_root = Some(value.to_string()),
            "api_base_url" => self.settings.api_base_url = Some(value.to_string()),
            "download_base_url" => self.settings.download_base_url = Some(value.to_string()),
            _ => {
                anyhow::bail!(
                    "unknown settings key '{}'\nAvailable: github_owner, github_repo, channel, \
                     include_prerelease, check_on_startup, check_interval_hours, auto_download, \
                     auto_install, backup_dir, install_root, api_base_url, download_base_url",
                    key
                );
            }
        }
        self.save()
    }
}

/// Settings file location: `config/updater.toml` next to the executable,
/// falling back to the working directory.
pub fn default_settings_path() -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let cfg = dir.join("config").join("updater.toml");
            if cfg.exists() {
                return cfg;
            }
        }
    }

    PathBuf::from("config").join("updater.toml")
}
