//! CLI layer: argument parsing, database/embedding resolution, CVE
//! selection, and the per-file scan loop tying [`crate::engine::MatchEngine`]
//! to whichever search backend was selected.

pub mod args;

pub use args::Cli;

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use crate::config::MatcherConfig;
use crate::db::{Db, FileChange};
use crate::embedding::EmbeddingTable;
use crate::engine::MatchEngine;
use crate::error::CveScanError;
use crate::ingest::IngestedFile;
use crate::patch::{self, CveDesc};
use crate::report::{self, ReportFlags};
use crate::search::cpu::CpuSearcher;
use crate::search::gpu::{GpuDriver, KernelConfig};
use crate::search::{CostModel, Needle, SearchResult, Searcher};

/// Entry point called from `main`. Returns the error that should set the
/// process exit code; all recoverable errors (bad diffs, unreadable files)
/// are logged and skipped internally, per §7's propagation policy.
pub fn run() -> Result<(), CveScanError> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    let config = MatcherConfig::from_args(&cli)?;

    let data_dir = data_dir();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if cli.w2v_list {
        write_w2v_list(&mut out, &data_dir)?;
    }

    let embed_dir = data_dir.join(&cli.w2v);
    if !embed_dir.is_dir() {
        return Err(CveScanError::Config(format!(
            "word2vec artifact '{}' not found at '{}'; train one first",
            cli.w2v,
            embed_dir.display()
        )));
    }
    let embed = EmbeddingTable::load(&embed_dir, config.default_distance)?;

    if cli.w2v_show {
        report::write_w2v_show(&mut out, &embed)?;
    }

    let db_path = resolve_db_path(cli.db.as_deref(), &data_dir)?;
    let db = Db::open(&db_path)?;

    if cli.cve_list {
        report::write_cve_list(&mut out, &db.list_cves()?)?;
    }
    if cli.cwe_list {
        report::write_cwe_list(&mut out, &db.list_cwes()?)?;
    }

    if cli.files.is_empty() {
        if cli.cve_list || cli.cwe_list || cli.w2v_list || cli.w2v_show {
            return Ok(());
        }
        return Err(CveScanError::Config("no source files specified".into()));
    }

    let ignore = load_ignore_set(&cli)?;
    let cves = collect_cves(&db, &cli, &config, &ignore)?;
    if cves.is_empty() {
        return Err(CveScanError::Config("no CVEs to check".into()));
    }
    tracing::info!(count = cves.len(), "CVEs selected for matching");

    let engine = MatchEngine::new(&cves, &embed, &config);
    let cancel = install_cancel_flag();

    let cpu = CpuSearcher;
    let mut gpu = if config.use_gpu {
        match GpuDriver::new(
            &embed,
            KernelConfig {
                haystack_max: config.haystack_max as u32,
                dim: embed.dim() as u32,
                costs: CostModel {
                    ins_cost: config.ins_cost,
                    del_cost: config.del_cost,
                },
                default_dist: config.default_distance,
            },
        ) {
            Ok(driver) => Some(driver),
            Err(e) => {
                tracing::warn!(error = %e, "GPU init failed, falling back to CPU search");
                None
            }
        }
    } else {
        None
    };

    let flags = ReportFlags {
        cve_info: cli.report_cve_info,
        cwe: cli.report_cwe,
        diff: cli.report_diff,
        diff_full: cli.report_diff_full,
        diff_id: cli.report_diff_id,
    };

    for path in &cli.files {
        if cancel.load(Ordering::SeqCst) {
            tracing::warn!("cancellation requested, stopping before next file");
            break;
        }
        let file = match IngestedFile::load(path, &embed) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "failed to read file, skipping");
                continue;
            }
        };
        tracing::info!(file = %path.display(), tokens = file.indices.len(), "processing file");

        for window in file.windows(config.haystack_max, config.window_overlap) {
            if cancel.load(Ordering::SeqCst) {
                tracing::warn!("cancellation requested, stopping before next window");
                break;
            }

            let mut device_err = None;
            let mut search = |needles: &[Needle]| -> Vec<SearchResult> {
                match &mut gpu {
                    Some(driver) => match driver.dispatch(needles, window.tokens) {
                        Ok(r) => r,
                        Err(e) => {
                            device_err = Some(e);
                            Vec::new()
                        }
                    },
                    None => cpu.search(needles, window.tokens, &embed, engine.costs()),
                }
            };

            let matches = engine.scan_window(&window, &mut search)?;
            if let Some(e) = device_err {
                return Err(e);
            }

            for m in &matches {
                let cve_report = m
                    .cve_id
                    .as_ref()
                    .and_then(|_| db.cve_report(&m.change_id).ok().flatten());
                report::write_match(&mut out, m, &file, cve_report.as_ref(), flags)?;
            }
        }
    }

    Ok(())
}

fn init_logging(level: &str) {
    let level = match level {
        "error" => tracing::Level::ERROR,
        "info" => tracing::Level::INFO,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::WARN,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// A graceful cancel flag polled between files and between before/after
/// phases, never mid-dispatch, per §5's cancellation contract.
fn install_cancel_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = flag.clone();
    let _ = ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    });
    flag
}

fn data_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.join("data")))
        .unwrap_or_else(|| PathBuf::from("data"))
}

fn resolve_db_path(explicit: Option<&Path>, data_dir: &Path) -> Result<PathBuf, CveScanError> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    let entries = fs::read_dir(data_dir)
        .map_err(|e| CveScanError::Config(format!("cannot read data dir '{}': {e}", data_dir.display())))?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("CVEfixes_") && name.ends_with(".sqlite") {
            return Ok(entry.path());
        }
    }
    Err(CveScanError::Config(format!(
        "no CVEfixes_*.sqlite database found under '{}', pass --db explicitly",
        data_dir.display()
    )))
}

fn write_w2v_list(out: &mut impl io::Write, data_dir: &Path) -> Result<(), CveScanError> {
    writeln!(out, "Available word2vec models w2v-(training algorithm)-v(vector-size)-w(window size):").map_err(CveScanError::Io)?;
    let Ok(entries) = fs::read_dir(data_dir) else {
        return Ok(());
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("w2v-") {
            writeln!(out, "{name}").map_err(CveScanError::Io)?;
        }
    }
    writeln!(out).map_err(CveScanError::Io)?;
    Ok(())
}

fn load_ignore_set(cli: &Cli) -> Result<HashSet<String>, CveScanError> {
    let mut set: HashSet<String> = cli.ignore.iter().cloned().collect();
    if let Some(path) = &cli.ignore_file {
        let text = fs::read_to_string(path)?;
        for line in text.lines() {
            let l = line.trim();
            if !l.is_empty() {
                set.insert(l.to_string());
            }
        }
    }
    Ok(set)
}

/// Recreate the unified diff text stored in the database into a full
/// `diff --git` blob the patch parser expects — mirrors
/// `cvematch.py`'s `db_diff_to_git_diff`.
fn db_diff_to_git_diff(diff_str: &str) -> String {
    format!("diff --git a/a.cpp b/a.cpp\nindex 0000..0000 000000\n{diff_str}")
}

fn collect_cves(
    db: &Db,
    cli: &Cli,
    config: &MatcherConfig,
    ignore: &HashSet<String>,
) -> Result<Vec<CveDesc>, CveScanError> {
    let mut cve_ids: Vec<String> = cli.cve.clone();
    for cwe in &cli.cwe {
        cve_ids.extend(db.cves_by_cwe(cwe)?);
    }
    for no_cve in &cli.no_cve {
        cve_ids.retain(|id| id != no_cve);
    }

    let changes: Vec<FileChange> = if !cve_ids.is_empty() {
        let mut v = Vec::new();
        for id in &cve_ids {
            v.extend(db.changes_for_cve(id)?);
        }
        v
    } else {
        // changes_for_language("C++") already unions in "C" rows.
        db.changes_for_language("C++")?
    };

    let mut out = Vec::new();
    for change in changes {
        let cve_report = db.cve_report(&change.file_change_id).ok().flatten();
        let cve_id = cve_report.as_ref().map(|r| r.cve_id.clone());
        if let Some(id) = &cve_id {
            if ignore.contains(id) {
                continue;
            }
        }
        let cwe_id = cve_report
            .as_ref()
            .and_then(|r| r.cwes.first())
            .map(|c| c.cwe_id.clone());

        let diff = db_diff_to_git_diff(&change.diff);
        let parsed = if cli.split_diffs {
            patch::parse_diff_split(
                &change.file_change_id,
                cve_id.as_deref(),
                cwe_id.as_deref(),
                &diff,
                config.min_hunk_tokens,
            )
        } else {
            patch::parse_diff(
                &change.file_change_id,
                cve_id.as_deref(),
                cwe_id.as_deref(),
                &diff,
                config.min_hunk_tokens,
            )
            .into_iter()
            .collect()
        };
        if parsed.is_empty() {
            tracing::warn!(change_id = %change.file_change_id, "diff produced no usable before-hunks, skipping");
        }
        out.extend(parsed);
    }
    Ok(out)
}
