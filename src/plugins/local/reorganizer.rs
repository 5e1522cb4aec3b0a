use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::core::error::ReorganizeError;
use crate::core::model::{FileNote, JobStats, ProgressSnapshot, ReorganizeParams, ReorganizeStats};
use crate::core::source::ProgressSource;
use crate::plugins::local::mover::move_file;

pub const CANCELLED_MESSAGE: &str = "Cancelled by user";

const GROUP_LEN: usize = 7;
const SUBGROUP_LEN: usize = 10;
/// Files at least this many components below the source root already sit in
/// a `<group>/<subgroup>/` folder.
const ORGANIZED_DEPTH: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyOrganized,
    TooShort(usize),
    NotNumeric,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyOrganized => f.write_str("already organized"),
            SkipReason::TooShort(len) => write!(f, "name length {len} < {SUBGROUP_LEN}"),
            SkipReason::NotNumeric => write!(f, "first {SUBGROUP_LEN} characters are not numeric"),
        }
    }
}

/// Group (first 7 characters) and subgroup (first 10) of an ID-prefixed
/// file name like `5206010001_WS.jpg`.
pub fn id_keys(name: &str) -> Result<(String, String), SkipReason> {
    let len = name.chars().count();
    if len < SUBGROUP_LEN {
        return Err(SkipReason::TooShort(len));
    }
    let subgroup: String = name.chars().take(SUBGROUP_LEN).collect();
    if !subgroup.chars().all(|c| c.is_ascii_digit()) {
        return Err(SkipReason::NotNumeric);
    }
    let group = subgroup.chars().take(GROUP_LEN).collect();
    Ok((group, subgroup))
}

#[derive(Debug, PartialEq, Eq)]
enum Placement {
    Move { group: String, subgroup: String, target: PathBuf },
    Skip(SkipReason),
}

fn place(root: &Path, path: &Path, name: &str) -> Placement {
    let depth = path.strip_prefix(root).map(|rel| rel.components().count()).unwrap_or(0);
    if depth > ORGANIZED_DEPTH {
        return Placement::Skip(SkipReason::AlreadyOrganized);
    }
    match id_keys(name) {
        Ok((group, subgroup)) => {
            let target = root.join(&group).join(&subgroup).join(name);
            if target == path {
                Placement::Skip(SkipReason::AlreadyOrganized)
            } else {
                Placement::Move { group, subgroup, target }
            }
        }
        Err(reason) => Placement::Skip(reason),
    }
}

/// Every file under `root`, materialized up front so the total is exact.
/// Unreadable subdirectories are noted and skipped; only an unreadable root
/// is fatal.
fn list_files(root: &Path, recursive: bool) -> Result<(Vec<PathBuf>, Vec<FileNote>), walkdir::Error> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();
    let mut problems = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(max_depth).sort_by_file_name() {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(e) if e.depth() == 0 => return Err(e),
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                let name = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                problems.push(FileNote { name, reason: e.to_string() });
            }
        }
    }
    Ok((files, problems))
}

/// Sorts files into `<root>/<group>/<subgroup>/<name>`, one file per
/// iteration, reporting through `emit` after each.
///
/// `cancel` is checked before every file; a file that has started is always
/// finished. The last snapshot emitted is terminal and carries the stats.
pub fn reorganize(
    params: &ReorganizeParams,
    cancel: &CancellationToken,
    pause: Duration,
    mut emit: impl FnMut(ProgressSnapshot),
) -> ReorganizeStats {
    let root = params.source.as_path();
    let (files, problems) = match list_files(root, params.recursive) {
        Ok(listing) => listing,
        Err(e) => {
            warn!(root = %root.display(), error = %e, "cannot list files");
            emit(ProgressSnapshot::failed(format!("cannot list files in {}: {e}", root.display())));
            return ReorganizeStats::default();
        }
    };

    let total = files.len() as u64;
    let mut stats = ReorganizeStats { errors: problems, ..Default::default() };
    info!(root = %root.display(), total, recursive = params.recursive, "reorganizing");

    if total == 0 {
        emit(finished(0, 0, "No files found".to_string(), &stats));
        return stats;
    }
    emit(ProgressSnapshot::running(0, total, format!("Found {total} files")));

    let mut groups = HashSet::new();
    let mut subgroups = HashSet::new();

    for path in &files {
        if cancel.is_cancelled() {
            info!(processed = stats.processed_files, moved = stats.moved_files, "reorganization cancelled");
            emit(ProgressSnapshot {
                current: Some(stats.processed_files),
                total: Some(total),
                message: CANCELLED_MESSAGE.to_string(),
                is_running: Some(false),
                error: Some(CANCELLED_MESSAGE.to_string()),
                result: Some(JobStats::Reorganize(stats.clone())),
            });
            return stats;
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let message = match place(root, path, &name) {
            Placement::Move { group, subgroup, target } => match move_file(path, &target) {
                Ok(()) => {
                    debug!(file = %name, %group, %subgroup, "moved");
                    stats.moved_files += 1;
                    groups.insert(group);
                    subgroups.insert(subgroup);
                    format!("Moved {name}")
                }
                Err(e) => {
                    warn!(file = %name, error = %e, "move failed");
                    stats.failed_files += 1;
                    stats.errors.push(FileNote { name: name.clone(), reason: e.to_string() });
                    format!("Failed {name}: {e}")
                }
            },
            Placement::Skip(reason) => {
                debug!(file = %name, %reason, "skipped");
                stats.skipped_files += 1;
                let message = format!("Skipped {name}: {reason}");
                stats.skipped.push(FileNote { name, reason: reason.to_string() });
                message
            }
        };

        stats.processed_files += 1;
        stats.unique_groups = groups.len() as u64;
        stats.unique_subgroups = subgroups.len() as u64;

        if stats.processed_files == total {
            let summary = format!(
                "Completed: moved {} of {} files into {} groups",
                stats.moved_files, total, stats.unique_groups
            );
            info!(moved = stats.moved_files, skipped = stats.skipped_files, failed = stats.failed_files, "reorganization finished");
            emit(finished(total, total, summary, &stats));
        } else {
            emit(ProgressSnapshot::running(stats.processed_files, total, message));
            if !pause.is_zero() {
                std::thread::sleep(pause);
            }
        }
    }
    stats
}

fn finished(current: u64, total: u64, message: String, stats: &ReorganizeStats) -> ProgressSnapshot {
    ProgressSnapshot {
        current: Some(current),
        total: Some(total),
        message,
        is_running: Some(false),
        error: None,
        result: Some(JobStats::Reorganize(stats.clone())),
    }
}

/// The process-wide file reorganizer. One run at a time; share it as an
/// `Arc` with every coordinator that may start one.
#[derive(Debug, Default)]
pub struct Reorganizer {
    busy: AtomicBool,
}

struct BusyGuard(Arc<Reorganizer>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.busy.store(false, Ordering::Release);
    }
}

impl Reorganizer {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Claims the reorganizer and starts a run on the blocking pool.
    /// Refused immediately, never queued, while another run holds it.
    pub fn try_start(
        self: &Arc<Self>,
        params: ReorganizeParams,
        cancel: CancellationToken,
        pause: Duration,
    ) -> Result<LocalRun, ReorganizeError> {
        if !params.source.is_dir() {
            return Err(ReorganizeError::NotADirectory(params.source));
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ReorganizeError::Busy);
        }
        let guard = BusyGuard(self.clone());

        let (tx, rx) = mpsc::channel(64);
        let token = cancel.clone();
        let worker = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            reorganize(&params, &token, pause, |snapshot| {
                let _ = tx.blocking_send(snapshot);
            });
        });

        Ok(LocalRun { rx, cancel, worker: Some(worker) })
    }
}

/// A running reorganization seen as a progress source.
#[derive(Debug)]
pub struct LocalRun {
    rx: mpsc::Receiver<ProgressSnapshot>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

#[async_trait]
impl ProgressSource for LocalRun {
    fn name(&self) -> &'static str {
        "local-reorganizer"
    }

    async fn next_snapshot(&mut self) -> Option<ProgressSnapshot> {
        self.rx.recv().await
    }

    /// Signals the runner and waits for it to finish its current file,
    /// returning its last word (normally the partial stats).
    async fn stop(&mut self) -> Option<ProgressSnapshot> {
        self.cancel.cancel();
        let mut last = None;
        while let Some(snapshot) = self.rx.recv().await {
            last = Some(snapshot);
        }
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!(error = %e, "reorganizer worker ended abnormally");
            }
        }
        last
    }
}

impl Drop for LocalRun {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Completion;
    use std::fs;

    fn touch(dir: &Path, rel: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    fn run(root: &Path, recursive: bool, cancel: &CancellationToken) -> (ReorganizeStats, Vec<ProgressSnapshot>) {
        let params = ReorganizeParams { source: root.to_path_buf(), recursive };
        let mut seen = vec![];
        let stats = reorganize(&params, cancel, Duration::ZERO, |s| seen.push(s));
        (stats, seen)
    }

    #[test]
    fn id_keys_need_ten_leading_digits() {
        assert_eq!(
            id_keys("5206010001_WS.jpg"),
            Ok(("5206010".to_string(), "5206010001".to_string()))
        );
        assert_eq!(id_keys("12345.png"), Err(SkipReason::TooShort(9)));
        assert_eq!(id_keys("bad_name.jpg"), Err(SkipReason::NotNumeric));
        assert_eq!(id_keys("520601000A.jpg"), Err(SkipReason::NotNumeric));
        assert!(id_keys("5206010001").is_ok());
    }

    #[test]
    fn flat_directory_scenario() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["5206010001_WS.jpg", "bad_name.jpg", "12345.png"] {
            touch(dir.path(), name);
        }

        let (stats, seen) = run(dir.path(), false, &CancellationToken::new());

        assert!(dir.path().join("5206010/5206010001/5206010001_WS.jpg").is_file());
        assert!(dir.path().join("bad_name.jpg").is_file());
        assert!(dir.path().join("12345.png").is_file());
        assert_eq!(stats.moved_files, 1);
        assert_eq!(stats.unique_groups, 1);
        assert_eq!(stats.skipped_files, 2);
        assert_eq!(stats.processed_files, 3);

        let last = seen.last().unwrap();
        assert_eq!(last.completion(), Completion::Succeeded);
        assert_eq!(last.result, Some(JobStats::Reorganize(stats.clone())));
    }

    #[test]
    fn one_snapshot_per_file_with_exact_total() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["5206010001_A.jpg", "5206010002_A.jpg", "5206020001_A.jpg", "nope.txt"] {
            touch(dir.path(), name);
        }

        let (stats, seen) = run(dir.path(), false, &CancellationToken::new());

        // one up front, then one per file
        assert_eq!(seen.len(), 5);
        assert!(seen.iter().all(|s| s.total == Some(4)));
        let currents: Vec<u64> = seen.iter().filter_map(|s| s.current).collect();
        assert_eq!(currents, vec![0, 1, 2, 3, 4]);
        assert_eq!(seen.iter().filter(|s| s.is_terminal()).count(), 1);
        assert_eq!(stats.unique_groups, 2);
        assert_eq!(stats.unique_subgroups, 3);
    }

    #[test]
    fn recursive_flag_controls_listing_and_deep_files_stay() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "incoming/5206010001_WS.jpg");
        touch(dir.path(), "5206010/5206010002/5206010002_WS.jpg");

        let (stats, _) = run(dir.path(), false, &CancellationToken::new());
        assert_eq!(stats.processed_files, 0);

        let (stats, _) = run(dir.path(), true, &CancellationToken::new());
        assert_eq!(stats.processed_files, 2);
        assert_eq!(stats.moved_files, 1);
        assert_eq!(stats.skipped[0].reason, "already organized");
        assert!(dir.path().join("5206010/5206010001/5206010001_WS.jpg").is_file());
        assert!(dir.path().join("5206010/5206010002/5206010002_WS.jpg").is_file());
    }

    #[test]
    fn empty_directory_finishes_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let (stats, seen) = run(dir.path(), true, &CancellationToken::new());
        assert_eq!(stats, ReorganizeStats::default());
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].completion(), Completion::Succeeded);
    }

    #[test]
    fn occupied_target_is_a_file_error_not_a_job_failure() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "5206010001_WS.jpg");
        touch(dir.path(), "sub/5206010001_WS.jpg");

        let (stats, seen) = run(dir.path(), true, &CancellationToken::new());
        assert_eq!(stats.moved_files, 1);
        assert_eq!(stats.failed_files, 1);
        assert_eq!(stats.errors.len(), 1);
        assert_eq!(seen.last().unwrap().completion(), Completion::Succeeded);
    }

    #[test]
    fn missing_root_fails_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone");
        let (_, seen) = run(&gone, false, &CancellationToken::new());
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0].completion(), Completion::Failed(_)));
    }

    #[test]
    fn cancellation_is_checked_between_files() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..6 {
            touch(dir.path(), &format!("520601000{i}_WS.jpg"));
        }
        let params = ReorganizeParams { source: dir.path().to_path_buf(), recursive: false };
        let cancel = CancellationToken::new();
        let mut seen = vec![];
        let stats = reorganize(&params, &cancel, Duration::ZERO, |s| {
            if s.current == Some(2) {
                cancel.cancel();
            }
            seen.push(s);
        });

        assert_eq!(stats.processed_files, 2);
        assert_eq!(stats.moved_files, 2);
        let last = seen.last().unwrap();
        assert_eq!(last.error.as_deref(), Some(CANCELLED_MESSAGE));
        assert_eq!(last.result, Some(JobStats::Reorganize(stats)));
        let left = fs::read_dir(dir.path()).unwrap().filter(|e| e.as_ref().unwrap().path().is_file()).count();
        assert_eq!(left, 4);
    }

    #[tokio::test]
    async fn second_start_is_refused_while_busy() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            touch(dir.path(), &format!("520601000{i}_WS.jpg"));
        }
        let reorganizer = Arc::new(Reorganizer::new());
        let params = ReorganizeParams { source: dir.path().to_path_buf(), recursive: false };

        let mut first = reorganizer
            .try_start(params.clone(), CancellationToken::new(), Duration::from_millis(20))
            .unwrap();
        assert!(reorganizer.is_busy());
        let second = reorganizer.try_start(params, CancellationToken::new(), Duration::ZERO);
        assert!(matches!(second, Err(ReorganizeError::Busy)));

        let mut last = None;
        while let Some(s) = first.next_snapshot().await {
            last = Some(s);
        }
        assert_eq!(last.unwrap().completion(), Completion::Succeeded);
        first.stop().await;
        assert!(!reorganizer.is_busy());
    }

    #[tokio::test]
    async fn not_a_directory_is_refused_without_claiming() {
        let reorganizer = Arc::new(Reorganizer::new());
        let params = ReorganizeParams { source: "/definitely/not/here".into(), recursive: false };
        let err = reorganizer.try_start(params, CancellationToken::new(), Duration::ZERO).unwrap_err();
        assert!(matches!(err, ReorganizeError::NotADirectory(_)));
        assert!(!reorganizer.is_busy());
    }
}
