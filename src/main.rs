//! Command-line front end.
//!
//! ## Commands
//! - `search [term]`: list matching finishes
//! - `batch <term> <size> <unit> [--json]`: print a scaled batch table
//! - `export <term> <size> <unit> <file>`: write the table as CSV
//! - `update check|download|install|skip [version]`: drive the updater
//! - `config show` / `config set <key> <value>`: update preferences
//!
//! Logs go to stderr so stdout stays pipeable. `update check` exits with
//! 0 when an update is available, 2 when up to date, 1 on failure.

use anyhow::{bail, Result};
use std::path::PathBuf;

use stainbatch::{batch, export, BatchUnit, Finish, FormulaStore};
use stainbatch_updater_lib::checker::{CheckOutcome, UpdateChecker};
use stainbatch_updater_lib::config::SettingsStore;
use stainbatch_updater_lib::github::GitHubClient;
use stainbatch_updater_lib::installer::{DownloadOutcome, DownloadProgress, UpdateInstaller};
use stainbatch_updater_lib::{UpdateInfo, UpdaterError};

const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = match run(&args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

async fn run(args: &[String]) -> Result<i32> {
    let command = args.first().map(String::as_str).unwrap_or("help");

    match command {
        "search" => {
            let store = load_store()?;
            let term = args.get(1).map(String::as_str).unwrap_or("");
            let matches = store.search(term);
            if matches.is_empty() {
                println!("No finishes match '{}'", term);
            } else {
                for finish in matches {
                    print_finish(finish);
                }
            }
            maybe_startup_check().await;
            Ok(0)
        }
        "batch" => {
            let (finish_term, size, unit) = batch_args(args)?;
            let store = load_store()?;
            let (finish, items) = compute_batch(&store, &finish_term, size, unit)?;
            if args.iter().any(|a| a == "--json") {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                println!("{} ({}), {} {}", finish.color_name, finish.formula_name, size, unit);
                print!("{}", render_text_table(&items));
            }
            maybe_startup_check().await;
            Ok(0)
        }
        "export" => {
            let (finish_term, size, unit) = batch_args(args)?;
            let Some(path) = args.get(4) else {
                bail!("usage: stainbatch export <finish> <size> <unit> <file>");
            };
            let store = load_store()?;
            let (_, items) = compute_batch(&store, &finish_term, size, unit)?;
            export::write_batch_csv(&items, &PathBuf::from(path))?;
            println!("Wrote {}", path);
            Ok(0)
        }
        "update" => run_update(args).await,
        "config" => run_config(args),
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(0)
        }
        other => {
            print_usage();
            bail!("unknown command '{}'", other);
        }
    }
}

fn print_usage() {
    println!("stainbatch {}: wood stain formula batch calculator", CURRENT_VERSION);
    println!();
    println!("Usage:");
    println!("  stainbatch search [term]");
    println!("  stainbatch batch <finish> <size> <unit> [--json]    units: g, gal, floz, lb");
    println!("  stainbatch export <finish> <size> <unit> <file>");
    println!("  stainbatch update check|download|install|skip [version]");
    println!("  stainbatch config show");
    println!("  stainbatch config set <key> <value>");
}

fn load_store() -> Result<FormulaStore> {
    let mut store = FormulaStore::new(data_dir());
    let report = store.reload();

    // one table failing still leaves the other usable
    if let Err(e) = &report.finishes {
        eprintln!("Warning: {}", e);
    }
    if let Err(e) = &report.ingredients {
        eprintln!("Warning: {}", e);
    }
    if report.finishes.is_err() && report.ingredients.is_err() {
        bail!("no formula data could be loaded from {}", data_dir().display());
    }
    Ok(store)
}

/// Data directory next to the executable, falling back to `./data`.
fn data_dir() -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let data = dir.join("data");
            if data.is_dir() {
                return data;
            }
        }
    }
    PathBuf::from("data")
}

fn batch_args(args: &[String]) -> Result<(String, f64, BatchUnit)> {
    let (Some(term), Some(size), Some(unit)) = (args.get(1), args.get(2), args.get(3)) else {
        bail!("usage: stainbatch {} <finish> <size> <unit>", args[0]);
    };
    let size: f64 = size
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid batch size '{}'", size))?;
    if size <= 0.0 {
        bail!("batch size must be positive");
    }
    let unit = BatchUnit::parse(unit)
        .ok_or_else(|| anyhow::anyhow!("invalid unit '{}' (use g, gal, floz, lb)", unit))?;
    Ok((term.clone(), size, unit))
}

fn compute_batch<'a>(
    store: &'a FormulaStore,
    term: &str,
    size: f64,
    unit: BatchUnit,
) -> Result<(&'a Finish, Vec<batch::BatchLineItem>)> {
    let Some(finish) = store.find_finish(term) else {
        bail!("no finish matches '{}'", term);
    };
    let ingredients = store.ingredients_for(finish);
    let items = batch::calculate_batch(&ingredients, size, unit);
    if items.is_empty() {
        bail!(
            "formula {} has no ingredients with positive baseline mass",
            finish.formula_name
        );
    }
    Ok((finish, items))
}

fn print_finish(finish: &Finish) {
    println!(
        "{:<24} {:<12} id {:<6} {}",
        finish.color_name,
        finish.formula_name,
        finish.formula_id,
        finish.created.format("%Y-%m-%d")
    );
}

fn render_text_table(items: &[batch::BatchLineItem]) -> String {
    let unit = items.first().map(|i| i.unit.label()).unwrap_or("g");
    let mut out = format!(
        "{:<8} {:<24} {:>12} {:>12} {:>12}\n",
        "Code",
        "Ingredient",
        "Baseline (g)",
        "Scaled (g)",
        format!("Batch ({})", unit)
    );
    for item in items {
        out.push_str(&format!(
            "{:<8} {:<24} {:>12.3} {:>12.3} {:>12.3}\n",
            item.code, item.label, item.baseline_grams, item.scaled_grams, item.display_value
        ));
    }
    let (baseline, scaled, display) = batch::totals(items);
    out.push_str(&format!(
        "{:<8} {:<24} {:>12.3} {:>12.3} {:>12.3}\n",
        "Total", "", baseline, scaled, display
    ));
    out
}

/// Interval-gated background check run after data commands. Failures
/// and rate-limited checks stay silent; an available update gets one
/// line on stderr.
async fn maybe_startup_check() {
    let mut store = SettingsStore::load_default();
    if !store.should_check_now() || store.settings().github_owner.is_empty() {
        return;
    }

    let checker = UpdateChecker::new(CURRENT_VERSION);
    if let CheckOutcome::UpdateAvailable(info) = checker.check_for_updates(&mut store, false).await
    {
        eprintln!(
            "Update {} is available (running {}). Run 'stainbatch update check' for details.",
            info.version, CURRENT_VERSION
        );
    }
}

// --- update subcommands ---

async fn run_update(args: &[String]) -> Result<i32> {
    let action = args.get(1).map(String::as_str).unwrap_or("check");
    let mut store = SettingsStore::load_default();

    match action {
        "check" => {
            let checker = UpdateChecker::new(CURRENT_VERSION);
            match checker.check_for_updates(&mut store, true).await {
                CheckOutcome::UpdateAvailable(info) => {
                    println!("Update available: {} → {}", CURRENT_VERSION, info.version);
                    if let Some(notes) = &info.notes {
                        println!("\n{}", notes);
                    }
                    println!("\nRun 'stainbatch update install' to apply it.");
                    Ok(0)
                }
                CheckOutcome::NoUpdate => {
                    println!("Up to date ({})", CURRENT_VERSION);
                    Ok(2)
                }
                CheckOutcome::Skipped { version } => {
                    println!("Latest version {} is on your skip list", version);
                    println!("Remove it with 'stainbatch config show' / editing skipped_versions.");
                    Ok(2)
                }
                CheckOutcome::Failed { reason } => {
                    eprintln!("Update check failed: {}", reason);
                    Ok(1)
                }
            }
        }
        "download" => {
            let (info, archive) = resolve_and_download(&mut store).await?;
            println!("Downloaded {} to {}", info.version, archive.display());
            Ok(0)
        }
        "install" => {
            let (info, archive) = resolve_and_download(&mut store).await?;
            let mut installer = UpdateInstaller::new(store.settings());
            let report = installer
                .install(&archive, &info)
                .await
                .map_err(|e| update_failure(&e))?;
            println!(
                "Installed {} ({} file(s)). Backup: {}",
                info.version,
                report.files_installed,
                report.backup_dir.display()
            );
            if report.restart_required {
                println!("Restart stainbatch to finish the update.");
            }
            Ok(0)
        }
        "skip" => {
            let Some(version) = args.get(2) else {
                bail!("usage: stainbatch update skip <version>");
            };
            store.skip_version(version)?;
            println!("Version {} will not be offered again", version);
            Ok(0)
        }
        other => bail!("unknown update action '{}' (use check/download/install/skip)", other),
    }
}

async fn resolve_and_download(store: &mut SettingsStore) -> Result<(UpdateInfo, PathBuf)> {
    let checker = UpdateChecker::new(CURRENT_VERSION);
    let info = match checker.check_for_updates(store, true).await {
        CheckOutcome::UpdateAvailable(info) => info,
        CheckOutcome::NoUpdate => bail!("already up to date ({})", CURRENT_VERSION),
        CheckOutcome::Skipped { version } => {
            bail!("latest version {} is on the skip list", version)
        }
        CheckOutcome::Failed { reason } => bail!("update check failed: {}", reason),
    };

    let settings = store.settings();
    let client = GitHubClient::with_base_urls(
        &settings.github_owner,
        &settings.github_repo,
        settings.api_base_url.as_deref(),
        settings.download_base_url.as_deref(),
    );

    let mut installer = UpdateInstaller::new(settings);
    let (tx, mut rx) = tokio::sync::mpsc::channel::<DownloadProgress>(16);
    let reporter = tokio::spawn(async move {
        while let Some(p) = rx.recv().await {
            match p.total_bytes {
                Some(total) if total > 0 => eprint!(
                    "\rDownloading… {:.0}% ({}/{} bytes)",
                    p.bytes_downloaded as f64 / total as f64 * 100.0,
                    p.bytes_downloaded,
                    total
                ),
                _ => eprint!("\rDownloading… {} bytes", p.bytes_downloaded),
            }
        }
        eprintln!();
    });

    let outcome = installer.download(&client, &info, tx).await;
    let _ = reporter.await;

    match outcome.map_err(|e| update_failure(&e))? {
        DownloadOutcome::Downloaded(path) => Ok((info, path)),
        DownloadOutcome::Cancelled => bail!("download was cancelled"),
    }
}

/// Short user-facing message first, technical detail after, plus a retry
/// hint when the failure class allows one.
fn update_failure(e: &UpdaterError) -> anyhow::Error {
    let mut message = format!("{} ({})", e.user_message(), e);
    if e.is_recoverable() {
        message.push_str("; try again");
    }
    anyhow::anyhow!(message)
}

// --- config subcommands ---

fn run_config(args: &[String]) -> Result<i32> {
    let mut store = SettingsStore::load_default();

    match args.get(1).map(String::as_str) {
        Some("show") | None => {
            println!("# {}", store.path().display());
            print!("{}", toml_view(&store)?);
            Ok(0)
        }
        Some("set") => {
            let (Some(key), Some(value)) = (args.get(2), args.get(3)) else {
                bail!("usage: stainbatch config set <key> <value>");
            };
            store.set_value(key, value)?;
            println!("{} = {}", key, value);
            Ok(0)
        }
        Some(other) => bail!("unknown config action '{}' (use show/set)", other),
    }
}

fn toml_view(store: &SettingsStore) -> Result<String> {
    Ok(toml::to_string_pretty(store.settings())?)
}
