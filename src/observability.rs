//! Observability: tracing setup, log file housekeeping and counters

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Lines kept in the active log file; older lines move to `{file}.1`
pub const LOG_LINE_LIMIT: usize = 10_000;

/// Install the global subscriber: stdout plus an optional append-mode file.
///
/// Filtering follows `RUST_LOG`, defaulting to `info`.
pub fn init_tracing(log_file: Option<&Path>) -> io::Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| io::Error::other(e.to_string()))
}

/// Keep the last `keep` lines of `path`; the rest replaces `{path}.1`.
///
/// Rewrites in place so an open append handle keeps working. Returns the
/// number of lines moved out.
pub fn trim_log_file(path: &Path, keep: usize) -> io::Result<usize> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let lines: Vec<&str> = content.lines().collect();
    if lines.len() <= keep {
        return Ok(0);
    }

    let split = lines.len() - keep;
    std::fs::write(rotated_path(path), join_lines(&lines[..split]))?;
    std::fs::write(path, join_lines(&lines[split..]))?;

    tracing::debug!(path = %path.display(), moved = split, "Trimmed log file");
    Ok(split)
}

/// Last `lines` lines of the log file; empty when the file does not exist.
pub fn tail_log(path: &Path, lines: usize) -> io::Result<Vec<String>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    Ok(all[start..].iter().map(|l| l.to_string()).collect())
}

fn rotated_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".1");
    PathBuf::from(name)
}

fn join_lines(lines: &[&str]) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Counters for sync activity
#[derive(Debug, Default)]
pub struct Metrics {
    syncs_started: AtomicU64,
    pairs_succeeded: AtomicU64,
    pairs_failed: AtomicU64,
    files_copied: AtomicU64,
    credential_refreshes: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sync_started(&self) {
        self.syncs_started.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "syncs_started", "Metric incremented");
    }

    pub fn pair_succeeded(&self) {
        self.pairs_succeeded.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "pairs_succeeded", "Metric incremented");
    }

    pub fn pair_failed(&self) {
        self.pairs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "pairs_failed", "Metric incremented");
    }

    pub fn files_copied(&self, count: usize) {
        self.files_copied.fetch_add(count as u64, Ordering::Relaxed);
        tracing::debug!(counter = "files_copied", count, "Metric incremented");
    }

    pub fn credential_refreshed(&self) {
        self.credential_refreshes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "credential_refreshes", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            syncs_started: self.syncs_started.load(Ordering::Relaxed),
            pairs_succeeded: self.pairs_succeeded.load(Ordering::Relaxed),
            pairs_failed: self.pairs_failed.load(Ordering::Relaxed),
            files_copied: self.files_copied.load(Ordering::Relaxed),
            credential_refreshes: self.credential_refreshes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub syncs_started: u64,
    pub pairs_succeeded: u64,
    pub pairs_failed: u64,
    pub files_copied: u64,
    pub credential_refreshes: u64,
}
