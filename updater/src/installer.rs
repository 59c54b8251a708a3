//! Download and installation of a resolved update.
//!
//! ## Flow
//! `Idle → Downloading → {Downloaded, Cancelled, Failed} → Installing →
//! {Installed, Failed}`
//!
//! - Download streams the archive to a staging file chunk by chunk,
//!   reporting progress and checking the cancellation token between
//!   chunks. A manifest digest, when present, is verified before the
//!   download counts as complete; a mismatched file is deleted.
//! - Install snapshots every top-level file of the install root into a
//!   timestamped backup directory before anything is overwritten. A failed
//!   snapshot aborts the whole installation. Extraction and copy failures
//!   are reported with the backup left in place; there is no automatic
//!   rollback.
//! - Cancellation is cooperative and only honored at chunk boundaries;
//!   once file copy has begun it has no effect.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use futures_util::StreamExt;

use crate::error::UpdaterError;
use crate::github::GitHubClient;
use crate::{UpdateInfo, UpdateSettings};

/// Installer state, advanced by `download` and `install`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerPhase {
    Idle,
    Downloading,
    Downloaded,
    Cancelled,
    Installing,
    Installed,
    Failed,
}

/// Progress report emitted after every written chunk.
#[derive(Debug, Clone, Copy)]
pub struct DownloadProgress {
    pub bytes_downloaded: u64,
    /// Total byte count when the server (or manifest) reported one.
    pub total_bytes: Option<u64>,
}

/// Terminal download states that are not errors.
#[derive(Debug, Clone)]
pub enum DownloadOutcome {
    /// Archive staged (and verified, when a digest was available).
    Downloaded(PathBuf),
    /// Cancelled at a chunk boundary; the partial file was deleted.
    Cancelled,
}

/// What a completed installation hands back to the caller.
#[derive(Debug, Clone)]
pub struct InstallReport {
    /// Snapshot of the pre-update installation, kept for manual recovery.
    pub backup_dir: PathBuf,
    pub files_installed: usize,
    /// The caller is responsible for relaunching the executable.
    pub restart_required: bool,
}

/// Downloads and applies updates. One operation at a time; the caller
/// owns the installer and drives it from a single task.
pub struct UpdateInstaller {
    install_root: PathBuf,
    staging_dir: PathBuf,
    backup_root: PathBuf,
    cancel: CancellationToken,
    phase: InstallerPhase,
}

impl UpdateInstaller {
    /// Resolves directories from settings: install root from the override
    /// or the executable's parent, staging under the per-user data area.
    pub fn new(settings: &UpdateSettings) -> Self {
        let install_root = settings
            .install_root
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::current_exe()
                    .ok()
                    .and_then(|p| p.parent().map(|d| d.to_path_buf()))
                    .unwrap_or_else(|| PathBuf::from("."))
            });

        let staging_dir = resolve_staging_dir();
        let backup_root = settings
            .backup_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| staging_dir.join("backups"));

        Self::with_paths(install_root, staging_dir, backup_root)
    }

    /// Explicit-path constructor (tests, embedding).
    pub fn with_paths(install_root: PathBuf, staging_dir: PathBuf, backup_root: PathBuf) -> Self {
        Self {
            install_root,
            staging_dir,
            backup_root,
            cancel: CancellationToken::new(),
            phase: InstallerPhase::Idle,
        }
    }

    pub fn phase(&self) -> InstallerPhase {
        self.phase
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    /// Requests cancellation of the in-flight download. Honored only at
    /// chunk boundaries; a running installation is unaffected.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A clonable handle for cancelling from elsewhere (e.g. a UI button).
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Clears a `Cancelled`/`Failed` terminal state so the installer can
    /// be reused.
    pub fn reset(&mut self) {
        self.cancel = CancellationToken::new();
        self.phase = InstallerPhase::Idle;
    }

    /// Streams the release archive into the staging directory, reporting
    /// `(bytes_downloaded, total_bytes)` after each chunk.
    pub async fn download(
        &mut self,
        client: &GitHubClient,
        info: &UpdateInfo,
        progress: mpsc::Sender<DownloadProgress>,
    ) -> Result<DownloadOutcome, UpdaterError> {
        if matches!(
            self.phase,
            InstallerPhase::Downloading | InstallerPhase::Installing
        ) {
            return Err(UpdaterError::OperationInProgress {
                operation: "download".to_string(),
            });
        }
        self.phase = InstallerPhase::Downloading;

        // A cancel requested before the first chunk still counts.
        if self.cancel.is_cancelled() {
            self.phase = InstallerPhase::Cancelled;
            return Ok(DownloadOutcome::Cancelled);
        }

        std::fs::create_dir_all(&self.staging_dir)
            .map_err(|e| self.fail(UpdaterError::from_io(&e, "create staging dir", &self.staging_dir)))?;
        let dest = self.staging_dir.join(archive_file_name(info));

        let response = match client.open_download(&info.download_url).await {
            Ok(r) => r,
            Err(e) => {
                self.phase = InstallerPhase::Failed;
                return Err(UpdaterError::Network {
                    message: format!("{}", e),
                    recoverable: true,
                });
            }
        };

        let total_bytes = response.content_length().or(info.size);
        tracing::info!(
            "[Installer] Downloading {} ({} bytes) → {}",
            info.version,
            total_bytes.map_or("?".to_string(), |t| t.to_string()),
            dest.display()
        );

        let mut file = tokio::fs::File::create(&dest)
            .await
            .map_err(|e| self.fail(UpdaterError::from_io(&e, "create staging file", &dest)))?;

        let mut stream = response.bytes_stream();
        let mut bytes_downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            // Cooperative cancellation between chunks.
            if self.cancel.is_cancelled() {
                drop(file);
                let _ = tokio::fs::remove_file(&dest).await;
                self.phase = InstallerPhase::Cancelled;
                tracing::info!("[Installer] Download cancelled, partial file removed");
                return Ok(DownloadOutcome::Cancelled);
            }

            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&dest).await;
                    return Err(self.fail(UpdaterError::from_reqwest(&e, "download")));
                }
            };

            file.write_all(&chunk)
                .await
                .map_err(|e| self.fail(UpdaterError::from_io(&e, "write chunk", &dest)))?;
            bytes_downloaded += chunk.len() as u64;

            let _ = progress
                .send(DownloadProgress {
                    bytes_downloaded,
                    total_bytes,
                })
                .await;
        }

        file.flush()
            .await
            .map_err(|e| self.fail(UpdaterError::from_io(&e, "flush", &dest)))?;
        drop(file);

        // Integrity check. The API-fallback path has no digest, an
        // accepted gap, logged so it shows up in support bundles.
        match &info.sha256 {
            Some(expected) => {
                verify_archive(&dest, expected).await.map_err(|e| self.fail(e))?;
                tracing::info!("[Installer] Checksum verified");
            }
            None => {
                tracing::warn!("[Installer] No digest available, skipping verification");
            }
        }

        self.phase = InstallerPhase::Downloaded;
        tracing::info!("[Installer] Downloaded {} bytes", bytes_downloaded);
        Ok(DownloadOutcome::Downloaded(dest))
    }

    /// Applies a staged archive: snapshot, extract, copy over, clean up.
    pub async fn install(
        &mut self,
        archive: &Path,
        info: &UpdateInfo,
    ) -> Result<InstallReport, UpdaterError> {
        if matches!(
            self.phase,
            InstallerPhase::Downloading | InstallerPhase::Installing
        ) {
            return Err(UpdaterError::OperationInProgress {
                operation: "install".to_string(),
            });
        }
        self.phase = InstallerPhase::Installing;

        tracing::info!(
            "[Installer] Installing {} into {}",
            info.version,
            self.install_root.display()
        );

        // 1. Snapshot. Fail-closed: nothing is touched if this fails.
        let backup_dir = self
            .backup_root
            .join(format!("backup-{}", chrono::Local::now().format("%Y%m%d-%H%M%S")));
        let backed_up = self.snapshot_install_root(&backup_dir).map_err(|e| {
            self.phase = InstallerPhase::Failed;
            UpdaterError::BackupFailed {
                path: backup_dir.display().to_string(),
                message: e.to_string(),
            }
        })?;
        tracing::info!(
            "[Installer] Backed up {} file(s) → {}",
            backed_up,
            backup_dir.display()
        );

        // 2. Extract into a temporary directory.
        let extract_dir = tempfile::tempdir()
            .map_err(|e| self.fail(UpdaterError::from_io(&e, "create temp dir", &self.staging_dir)))?;
        let extracted = extract_zip(archive, extract_dir.path()).map_err(|e| {
            self.phase = InstallerPhase::Failed;
            UpdaterError::FileSystem {
                operation: "extract".to_string(),
                path: archive.display().to_string(),
                message: e.to_string(),
            }
        })?;
        tracing::info!("[Installer] Extracted {} file(s)", extracted);

        // 3. Copy over the installation, overwriting in place.
        let files_installed =
            copy_dir_recursive(extract_dir.path(), &self.install_root).map_err(|e| {
                self.phase = InstallerPhase::Failed;
                UpdaterError::FileSystem {
                    operation: "copy".to_string(),
                    path: self.install_root.display().to_string(),
                    message: format!("{} (backup preserved at {})", e, backup_dir.display()),
                }
            })?;

        // 4. Clean up: temp dir drops itself; the archive is spent.
        if let Err(e) = std::fs::remove_file(archive) {
            tracing::warn!("[Installer] Could not remove {}: {}", archive.display(), e);
        }

        self.phase = InstallerPhase::Installed;
        tracing::info!(
            "[Installer] Installed {} file(s), restart required",
            files_installed
        );
        Ok(InstallReport {
            backup_dir,
            files_installed,
            restart_required: true,
        })
    }

    /// Copies every top-level file of the install root into `backup_dir`.
    /// Transient files (logs, temp files, dotfiles) and directories are
    /// not part of the snapshot.
    fn snapshot_install_root(&self, backup_dir: &Path) -> std::io::Result<usize> {
        std::fs::create_dir_all(backup_dir)?;
        let mut count = 0;
        for entry in std::fs::read_dir(&self.install_root)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if is_transient(&path) {
                continue;
            }
            std::fs::copy(&path, backup_dir.join(entry.file_name()))?;
            count += 1;
        }
        Ok(count)
    }

    fn fail(&mut self, err: UpdaterError) -> UpdaterError {
        self.phase = InstallerPhase::Failed;
        err
    }
}

/// Per-user staging area for downloaded archives.
fn resolve_staging_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA")
            .map(|appdata| PathBuf::from(appdata).join("stainbatch").join("updates"))
            .unwrap_or_else(|_| PathBuf::from("./updates"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(|home| {
                PathBuf::from(home)
                    .join(".cache")
                    .join("stainbatch")
                    .join("updates")
            })
            .unwrap_or_else(|_| PathBuf::from("./updates"))
    }
}

/// Log and temp files churn constantly and are worthless in a snapshot.
fn is_transient(path: &Path) -> bool {
    let by_ext = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("log") | Some("tmp") | Some("old")
    );
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false);
    by_ext || hidden
}

fn archive_file_name(info: &UpdateInfo) -> String {
    info.download_url
        .rsplit('/')
        .next()
        .filter(|n| !n.is_empty())
        .map(|n| n.to_string())
        .unwrap_or_else(|| format!("stainbatch-{}.zip", info.version))
}

/// Recomputes the archive digest and compares it (case-insensitively)
/// against the manifest's. A mismatched file is deleted on the spot.
pub async fn verify_archive(path: &Path, expected: &str) -> Result<(), UpdaterError> {
    let actual = sha256_of(path)
        .await
        .map_err(|e| UpdaterError::from_io(&e, "hash", path))?;

    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        let _ = tokio::fs::remove_file(path).await;
        Err(UpdaterError::ChecksumMismatch {
            expected: expected.to_lowercase(),
            actual,
        })
    }
}

/// Hex SHA-256 of a file. Hashing runs on a blocking task so the
/// executor stays responsive.
pub async fn sha256_of(path: &Path) -> std::io::Result<String> {
    let content = tokio::fs::read(path).await?;
    let digest = tokio::task::spawn_blocking(move || {
        let mut hasher = Sha256::new();
        hasher.update(&content);
        hasher.finalize()
    })
    .await
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    Ok(hex::encode(digest))
}

/// Unpacks a zip archive, recreating subdirectories. Entries whose names
/// contain `..` are skipped.
fn extract_zip(archive: &Path, dest: &Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    let mut count = 0;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let name = entry.name().to_string();
        if name.contains("..") {
            tracing::warn!("[Installer] Skipping suspicious entry '{}'", name);
            continue;
        }
        let out_path = dest.join(&name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut outfile = std::fs::File::create(&out_path)?;
            std::io::copy(&mut entry, &mut outfile)?;
            count += 1;
        }
    }

    Ok(count)
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<usize> {
    std::fs::create_dir_all(dst)?;
    let mut count = 0;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let path = entry.path();
        let dest = dst.join(entry.file_name());
        if path.is_dir() {
            count += copy_dir_recursive(&path, &dest)?;
        } else {
            std::fs::copy(&path, &dest)?;
            count += 1;
        }
    }
    Ok(count)
}
