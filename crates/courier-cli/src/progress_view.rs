//! Terminal progress rendering.
//!
//! Adapts job events onto indicatif progress bars and records terminal
//! outcomes so the command handler can await a job's end.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::Notify;

use courier_core::{JobEvent, JobEventEmitterPort, JobId};

/// How a job ended, from the renderer's point of view.
#[derive(Clone, Debug)]
pub enum JobOutcome {
    Completed { extraction_error: Option<String> },
    Failed { message: String },
    Cancelled,
}

struct Inner {
    multi: MultiProgress,
    bars: Mutex<HashMap<JobId, ProgressBar>>,
    outcomes: Mutex<HashMap<JobId, JobOutcome>>,
    notify: Notify,
}

/// Event emitter that renders jobs as terminal progress bars.
#[derive(Clone)]
pub struct ConsoleEmitter {
    inner: Arc<Inner>,
}

impl Default for ConsoleEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleEmitter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                multi: MultiProgress::new(),
                bars: Mutex::new(HashMap::new()),
                outcomes: Mutex::new(HashMap::new()),
                notify: Notify::new(),
            }),
        }
    }

    /// Wait until the job reaches a terminal event.
    pub async fn wait_for(&self, id: &JobId) -> JobOutcome {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(outcome) = self.inner.lock_outcomes().get(id).cloned() {
                return outcome;
            }
            notified.await;
        }
    }

    fn record(&self, id: JobId, outcome: JobOutcome) {
        self.inner.lock_outcomes().insert(id, outcome);
        self.inner.notify.notify_waiters();
    }

    fn with_bar(&self, id: &JobId, f: impl FnOnce(&ProgressBar)) {
        if let Some(bar) = self.inner.lock_bars().get(id) {
            f(bar);
        }
    }

    fn take_bar(&self, id: &JobId) -> Option<ProgressBar> {
        self.inner.lock_bars().remove(id)
    }
}

impl Inner {
    fn lock_bars(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, ProgressBar>> {
        self.bars
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_outcomes(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, JobOutcome>> {
        self.outcomes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg:24!} [{bar:40.cyan/blue}] {pos:>3}% {prefix}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

impl JobEventEmitterPort for ConsoleEmitter {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn emit(&self, event: JobEvent) {
        match event {
            JobEvent::JobStarted { id, name, .. } => {
                let bar = self.inner.multi.add(ProgressBar::new(100));
                bar.set_style(bar_style());
                bar.set_message(name);
                self.inner.lock_bars().insert(id, bar);
            }
            JobEvent::JobProgress {
                id, percent, speed, eta, ..
            } => {
                self.with_bar(&id, |bar| {
                    bar.set_position(percent.clamp(0.0, 100.0) as u64);
                    let mut tail = speed.unwrap_or_default();
                    if let Some(eta) = eta {
                        tail.push_str(&format!(" ETA {eta}"));
                    }
                    bar.set_prefix(tail);
                });
            }
            JobEvent::JobPaused { id } => {
                self.with_bar(&id, |bar| bar.set_prefix("paused"));
            }
            JobEvent::JobResumed { id } => {
                self.with_bar(&id, |bar| bar.set_prefix(""));
            }
            JobEvent::ExtractionStarted { id, archive_count } => {
                self.with_bar(&id, |bar| {
                    bar.set_prefix(format!("extracting {archive_count} archive(s)"));
                });
            }
            JobEvent::JobCompleted {
                id,
                extraction_error,
            } => {
                if let Some(bar) = self.take_bar(&id) {
                    bar.set_position(100);
                    bar.finish();
                }
                self.record(id, JobOutcome::Completed { extraction_error });
            }
            JobEvent::JobError { id, message, .. } => {
                self.with_bar(&id, |bar| bar.set_prefix("error"));
                self.record(id, JobOutcome::Failed { message });
            }
            JobEvent::JobCancelled { id } => {
                if let Some(bar) = self.take_bar(&id) {
                    bar.abandon();
                }
                self.record(id, JobOutcome::Cancelled);
            }
        }
    }

    fn clone_box(&self) -> Box<dyn JobEventEmitterPort> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_for_sees_outcome_recorded_before_wait() {
        let emitter = ConsoleEmitter::new();
        let id = JobId::from("j1");
        emitter.emit(JobEvent::completed(id.clone(), None::<String>));

        match emitter.wait_for(&id).await {
            JobOutcome::Completed {
                extraction_error: None,
            } => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_event_records_failure() {
        let emitter = ConsoleEmitter::new();
        let id = JobId::from("j2");
        emitter.emit(JobEvent::errored(
            id.clone(),
            courier_core::DownloadError::QuotaExceeded,
        ));

        match emitter.wait_for(&id).await {
            JobOutcome::Failed { message } => assert!(message.contains("quota")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
