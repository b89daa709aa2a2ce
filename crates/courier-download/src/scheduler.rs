//! Bounded worker pool.
//!
//! Spawns `min(limit, queue length)` pull-loops over a job's pending
//! queue. Each loop pops the next file and drives one transfer at a
//! time; an individual failure is logged and the loop moves on, so a
//! single bad file never aborts sibling transfers. Loops stop popping
//! as soon as the job is flagged paused or cancelled (enforced inside
//! [`JobHandle::next_file`]).
//!
//! The pool owns no retry policy: resume and retry are job-level
//! operations that rebuild the queue and call back in here.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;

use courier_core::{DownloadResult, FileEntry};

use crate::state::JobHandle;

/// Run transfers for everything in the job's queue, returning when the
/// queue is drained or the job stops accepting work.
pub async fn run_pool<W, Fut>(job: Arc<JobHandle>, limit: usize, work: W)
where
    W: Fn(FileEntry) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = DownloadResult<()>> + Send + 'static,
{
    let workers = limit.min(job.queue_len()).max(1);

    let mut set = JoinSet::new();
    for _ in 0..workers {
        let job = Arc::clone(&job);
        let work = work.clone();
        set.spawn(async move {
            while let Some(file) = job.next_file() {
                let name = file.name.clone();
                if let Err(e) = work(file).await {
                    tracing::warn!(file = %name, error = %e, "file transfer failed");
                }
            }
        });
    }

    while let Some(res) = set.join_next().await {
        if let Err(e) = res {
            tracing::error!(error = %e, "worker loop panicked");
        }
    }
}
