//! In-memory job state.
//!
//! One [`JobState`] per job, guarded by the mutex in [`JobHandle`]. The
//! worker-pool loops and the reconciliation sweep are the only writers;
//! everything else reads snapshots.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use courier_core::{
    DownloadError, FileEntry, FileProgress, FileStatus, HistoryRecord, JobId, JobSnapshot,
    JobStatus,
};

use crate::progress::{AggregateInput, AggregateView, recompute};
use crate::transfer::{ProcessHandle, StopReason};

/// Mutable state of one download job.
#[derive(Debug)]
pub struct JobState {
    pub id: JobId,
    pub name: String,
    pub dest_dir: PathBuf,
    pub files: Vec<FileEntry>,
    pub total_bytes: u64,
    /// Bytes confirmed written by fully-completed files.
    pub downloaded_bytes: u64,
    /// Names of files fully on disk.
    pub completed: HashSet<String>,
    /// Names of files whose transfer failed this attempt.
    pub failed: Vec<String>,
    /// Per-file live progress, keyed by file name.
    pub active: HashMap<String, FileProgress>,
    pub status: JobStatus,
    pub cancelled: bool,
    pub paused: bool,
    pub error: Option<DownloadError>,
    /// Quota failures are surfaced once per job even when several files
    /// hit the quota concurrently.
    pub quota_notified: bool,
    /// Latch preventing two tasks from finalizing the same job.
    pub finalizing: bool,
    pub extraction_error: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl JobState {
    pub fn new(
        id: JobId,
        name: String,
        dest_dir: PathBuf,
        files: Vec<FileEntry>,
        total_bytes: u64,
    ) -> Self {
        Self {
            id,
            name,
            dest_dir,
            files,
            total_bytes,
            downloaded_bytes: 0,
            completed: HashSet::new(),
            failed: Vec::new(),
            active: HashMap::new(),
            status: JobStatus::Starting,
            cancelled: false,
            paused: false,
            error: None,
            quota_notified: false,
            finalizing: false,
            extraction_error: None,
            started_at: Utc::now(),
        }
    }

    /// Files fully on disk.
    #[must_use]
    pub fn completed_files(&self) -> usize {
        self.completed.len()
    }

    /// The finalize predicate, evaluated against a live-process count
    /// taken at the same moment.
    ///
    /// Either signal suffices for the byte/file check: a manifest total
    /// may be absent or inaccurate, so byte-count completion and
    /// file-count completion are each accepted on their own.
    #[must_use]
    pub fn finalize_ready(&self, live_processes: usize) -> bool {
        if self.cancelled || self.paused || !self.failed.is_empty() || live_processes > 0 {
            return false;
        }
        if self.status.is_terminal() {
            return false;
        }
        let bytes_done = self.total_bytes > 0 && self.downloaded_bytes >= self.total_bytes;
        let files_done = self.completed_files() >= self.files.len();
        bytes_done || files_done
    }

    /// Recompute the aggregate progress view.
    #[must_use]
    pub fn aggregate(&self, live_processes: usize) -> AggregateView {
        let active: Vec<(u64, f64)> = self
            .active
            .values()
            .filter(|p| p.status == FileStatus::Downloading)
            .map(|p| {
                let size = self
                    .files
                    .iter()
                    .find(|f| f.name == p.name)
                    .map_or(0, |f| f.size);
                (size, p.percent)
            })
            .collect();

        recompute(&AggregateInput {
            downloaded_bytes: self.downloaded_bytes,
            total_bytes: self.total_bytes,
            active: &active,
            completed_files: self.completed_files(),
            file_count: self.files.len(),
            finalize_ready: self.status == JobStatus::Completed
                || self.finalize_ready(live_processes),
        })
    }

    /// Point-in-time snapshot for the presentation layer.
    #[must_use]
    pub fn snapshot(&self, live_processes: usize) -> JobSnapshot {
        let view = self.aggregate(live_processes);
        let mut files: Vec<FileProgress> = self.active.values().cloned().collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));

        JobSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            percent: f64::from(view.percent),
            downloaded_bytes: view.bytes,
            total_bytes: self.total_bytes,
            file_count: self.files.len(),
            completed_files: self.completed_files(),
            files,
            failed_files: self.failed.clone(),
            error: self.error.clone(),
        }
    }

    /// Build the durable record written at finalization.
    #[must_use]
    pub fn history_record(&self, finished_at: DateTime<Utc>) -> HistoryRecord {
        HistoryRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            total_bytes: self.total_bytes,
            file_count: self.files.len(),
            started_at: self.started_at,
            finished_at,
            error: self.error.clone(),
        }
    }
}

/// Shared handle to one job: state, pending queue, and in-flight workers.
#[derive(Debug)]
pub struct JobHandle {
    state: Mutex<JobState>,
    queue: Mutex<VecDeque<FileEntry>>,
    procs: Mutex<Vec<Arc<ProcessHandle>>>,
    /// True while no worker pool runs for this job.
    settled: AtomicBool,
}

impl JobHandle {
    #[must_use]
    pub fn new(state: JobState) -> Self {
        let queue = state.files.iter().cloned().collect();
        Self {
            state: Mutex::new(state),
            queue: Mutex::new(queue),
            procs: Mutex::new(Vec::new()),
            settled: AtomicBool::new(false),
        }
    }

    /// Lock the job state.
    pub fn state(&self) -> MutexGuard<'_, JobState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Pop the next pending file, unless the job is paused or cancelled.
    pub fn next_file(&self) -> Option<FileEntry> {
        {
            let state = self.state();
            if state.paused || state.cancelled {
                return None;
            }
        }
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
    }

    /// Replace the pending queue (resume/retry recompute the remainder).
    pub fn requeue(&self, files: Vec<FileEntry>) {
        let mut queue = self
            .queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        queue.clear();
        queue.extend(files);
    }

    /// Number of files still waiting for a worker.
    pub fn queue_len(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Track a freshly-launched worker.
    pub fn register_proc(&self, proc: Arc<ProcessHandle>) {
        self.procs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(proc);
    }

    /// Drop workers whose exit path has already run, returning how many
    /// are still live.
    pub fn prune_procs(&self) -> usize {
        let mut procs = self
            .procs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        procs.retain(|p| !p.is_done());
        procs.len()
    }

    /// Number of in-flight workers.
    pub fn live_procs(&self) -> usize {
        self.prune_procs()
    }

    /// Catch a stop that was signalled before this worker registered
    /// its handle. Pause and cancel flip the state flag before touching
    /// the handle list, so reading the flags after registration closes
    /// the window.
    pub fn signal_if_stopping(&self, proc: &ProcessHandle) {
        let state = self.state();
        if state.cancelled {
            proc.signal_stop(StopReason::Cancelled);
        } else if state.paused {
            proc.signal_stop(StopReason::Paused);
        }
    }

    /// Mark whether the worker pool for this job has drained.
    pub fn set_settled(&self, settled: bool) {
        self.settled.store(settled, Ordering::Release);
    }

    /// True when no worker pool is running for this job.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    /// Ask every in-flight worker to terminate with the given reason.
    pub fn signal_all(&self, reason: StopReason) {
        let procs = self
            .procs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for proc in procs.iter() {
            proc.signal_stop(reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> JobState {
        JobState::new(
            JobId::from("j1"),
            "pkg".to_string(),
            PathBuf::from("/tmp/pkg"),
            vec![
                FileEntry {
                    url: "https://h/a".into(),
                    name: "a".into(),
                    size: 100,
                },
                FileEntry {
                    url: "https://h/b".into(),
                    name: "b".into(),
                    size: 200,
                },
                FileEntry {
                    url: "https://h/c".into(),
                    name: "c".into(),
                    size: 300,
                },
            ],
            600,
        )
    }

    #[test]
    fn test_finalize_predicate_requires_quiet_job() {
        let mut state = sample_state();
        state.completed = ["a", "b", "c"].iter().map(ToString::to_string).collect();
        state.downloaded_bytes = 600;

        assert!(state.finalize_ready(0));
        assert!(!state.finalize_ready(1)); // worker still live
        state.paused = true;
        assert!(!state.finalize_ready(0));
        state.paused = false;
        state.failed.push("c".to_string());
        assert!(!state.finalize_ready(0));
    }

    #[test]
    fn test_finalize_predicate_accepts_either_signal() {
        let mut state = sample_state();
        // Byte counter complete, file counter not (inaccurate manifest).
        state.downloaded_bytes = 600;
        state.completed.insert("a".to_string());
        assert!(state.finalize_ready(0));

        let mut state = sample_state();
        // File counter complete, byte counter short.
        state.completed = ["a", "b", "c"].iter().map(ToString::to_string).collect();
        state.downloaded_bytes = 550;
        assert!(state.finalize_ready(0));
    }

    #[test]
    fn test_aggregate_clamps_at_99_with_outstanding_files() {
        let mut state = sample_state();
        state.status = JobStatus::InProgress;
        state.completed = ["a", "b"].iter().map(ToString::to_string).collect();
        state.downloaded_bytes = 300;
        state.active.insert("c".to_string(), {
            let mut p = FileProgress::pending("c");
            p.status = FileStatus::Downloading;
            p.percent = 100.0;
            p
        });

        // Worker for "c" still live: arithmetic would say ~100 but the
        // predicate is false, so the view holds at 99.
        let view = state.aggregate(1);
        assert!(view.percent <= 99);
    }

    #[test]
    fn test_scenario_three_files_parallel_two() {
        let mut state = sample_state();
        state.status = JobStatus::InProgress;
        state.completed = ["a", "b"].iter().map(ToString::to_string).collect();
        state.downloaded_bytes = 300;
        state.active.insert("c".to_string(), {
            let mut p = FileProgress::pending("c");
            p.status = FileStatus::Downloading;
            p.percent = 50.0;
            p
        });

        let view = state.aggregate(1);
        assert_eq!(view.percent, 75);
        assert_eq!(view.bytes, 450);
    }

    #[test]
    fn test_next_file_respects_pause_and_cancel() {
        let handle = JobHandle::new(sample_state());
        assert!(handle.next_file().is_some());

        handle.state().paused = true;
        assert!(handle.next_file().is_none());
        assert_eq!(handle.queue_len(), 2);

        handle.state().paused = false;
        handle.state().cancelled = true;
        assert!(handle.next_file().is_none());
    }

    #[test]
    fn test_proc_tracking_prunes_dead_workers() {
        let handle = JobHandle::new(sample_state());
        let proc = Arc::new(ProcessHandle::new("a"));
        handle.register_proc(Arc::clone(&proc));
        assert_eq!(handle.live_procs(), 1);

        proc.signal_stop(StopReason::Cancelled);
        assert_eq!(handle.live_procs(), 1); // signalled, not yet exited
    }

    #[test]
    fn test_late_registration_still_observes_pause() {
        let handle = JobHandle::new(sample_state());
        // Pause landed while the worker was between popping its file
        // and registering; the broadcast missed it.
        handle.state().paused = true;

        let proc = Arc::new(ProcessHandle::new("a"));
        handle.register_proc(Arc::clone(&proc));
        handle.signal_if_stopping(&proc);
        assert_eq!(proc.take_stop(), Some(StopReason::Paused));
    }

    #[test]
    fn test_late_registration_prefers_cancel_over_pause() {
        let handle = JobHandle::new(sample_state());
        handle.state().paused = true;
        handle.state().cancelled = true;

        let proc = Arc::new(ProcessHandle::new("a"));
        handle.register_proc(Arc::clone(&proc));
        handle.signal_if_stopping(&proc);
        assert_eq!(proc.take_stop(), Some(StopReason::Cancelled));
    }

    #[test]
    fn test_settled_flag_round_trip() {
        let handle = JobHandle::new(sample_state());
        assert!(!handle.is_settled());
        handle.set_settled(true);
        assert!(handle.is_settled());
    }
}
