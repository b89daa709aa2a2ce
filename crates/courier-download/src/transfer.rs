//! Transfer worker: supervises one transfer-tool subprocess for one file.
//!
//! Each worker owns its child process for the duration of the transfer,
//! feeds every output line to the progress parser, and accumulates a
//! tail of recent output for the error classifier. Cancellation and
//! pause arrive through the worker's [`ProcessHandle`]; the stop reason
//! is tagged on the handle at signal time so the exit path never has to
//! re-read job flags that may have changed since the kill was sent.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use courier_core::{DownloadError, FileEntry};

use crate::classify::classify;
use crate::progress::{LineProgress, parse_line};

/// Lines of tool output kept for classification on failure.
const OUTPUT_TAIL_LINES: usize = 50;

/// Why a worker was asked to stop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Job suspended; the file will be re-transferred on resume.
    Paused,
    /// Job cancelled; nothing further is reported.
    Cancelled,
}

/// Signalling handle for one in-flight transfer process.
///
/// The stop reason is written exactly once, at the moment of signalling,
/// and consumed exactly once by the worker's exit path.
#[derive(Debug)]
pub struct ProcessHandle {
    file_name: String,
    stop: Mutex<Option<StopReason>>,
    token: CancellationToken,
    done: AtomicBool,
}

impl ProcessHandle {
    /// Create a handle for the named file.
    #[must_use]
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            stop: Mutex::new(None),
            token: CancellationToken::new(),
            done: AtomicBool::new(false),
        }
    }

    /// Name of the file this worker is transferring.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Ask the worker to terminate its process. The first reason wins;
    /// later signals do not overwrite it.
    pub fn signal_stop(&self, reason: StopReason) {
        let mut stop = self
            .stop
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if stop.is_none() {
            *stop = Some(reason);
        }
        drop(stop);
        self.token.cancel();
    }

    /// Consume the stop reason, if one was signalled.
    pub(crate) fn take_stop(&self) -> Option<StopReason> {
        self.stop
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }

    /// True once the worker's exit path has run.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn mark_done(&self) {
        self.done.store(true, Ordering::Release);
    }
}

/// Terminal disposition of one transfer.
#[derive(Debug)]
pub enum TransferOutcome {
    /// Process exited zero; the file is on disk.
    Completed,
    /// Process was killed on request; not an error.
    Stopped(StopReason),
    /// Process failed; error already classified.
    Failed(DownloadError),
}

/// Run one transfer-tool invocation for one file.
///
/// `output_path` must already have passed path validation. Progress
/// lines are delivered through `on_line` as they arrive; stats lines
/// take priority over incidental percent matches, which the caller
/// sees via [`LineProgress::from_stats`].
pub async fn run_transfer(
    transfer_bin: &Path,
    file: &FileEntry,
    output_path: &Path,
    handle: &ProcessHandle,
    mut on_line: impl FnMut(LineProgress) + Send,
) -> TransferOutcome {
    // The tool speaks plain HTTP too, but only encrypted transports are
    // allowed out of this process.
    if !file.url.starts_with("https://") {
        handle.mark_done();
        return TransferOutcome::Failed(DownloadError::unsupported_transport(&file.url));
    }

    if let Some(parent) = output_path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            handle.mark_done();
            return TransferOutcome::Failed(DownloadError::from_io_error(&e));
        }
    }

    let mut child = match Command::new(transfer_bin)
        .arg("copyurl")
        .arg(&file.url)
        .arg(output_path)
        .arg("--progress")
        .arg("-v")
        .args(["--stats", "1s"])
        .args(["--buffer-size", "16M"])
        .args(["--contimeout", "60s"])
        .args(["--timeout", "300s"])
        .args(["--retries", "3"])
        .args(["--low-level-retries", "10"])
        .arg("--drive-acknowledge-abuse")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            handle.mark_done();
            return TransferOutcome::Failed(DownloadError::from_io_error(&e));
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    if let Some(stdout) = child.stdout.take() {
        spawn_line_reader(stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_line_reader(stderr, tx.clone());
    }
    drop(tx);

    let mut tail: VecDeque<String> = VecDeque::with_capacity(OUTPUT_TAIL_LINES);
    let mut kill_sent = false;
    let mut streams_done = false;

    let status = loop {
        tokio::select! {
            maybe_line = rx.recv(), if !streams_done => {
                match maybe_line {
                    Some(line) => consume_line(&line, &mut tail, &mut on_line),
                    // Both streams hit EOF; the wait branch will
                    // observe the exit.
                    None => streams_done = true,
                }
            }
            () = handle.token.cancelled(), if !kill_sent => {
                kill_sent = true;
                if let Err(e) = child.start_kill() {
                    tracing::warn!(file = %file.name, error = %e, "failed to kill transfer process");
                }
            }
            status = child.wait() => {
                break status;
            }
        }
    };

    // Drain whatever the readers flushed after exit, for classification.
    while let Some(line) = rx.recv().await {
        consume_line(&line, &mut tail, &mut on_line);
    }

    handle.mark_done();

    let status = match status {
        Ok(status) => status,
        Err(e) => return TransferOutcome::Failed(DownloadError::from_io_error(&e)),
    };

    if status.success() {
        return TransferOutcome::Completed;
    }

    if let Some(reason) = handle.take_stop() {
        return TransferOutcome::Stopped(reason);
    }

    let exit_code = status.code().unwrap_or(-1);
    let output: Vec<&str> = tail.iter().map(String::as_str).collect();
    TransferOutcome::Failed(classify(&output.join("\n"), exit_code))
}

fn consume_line(
    line: &str,
    tail: &mut VecDeque<String>,
    on_line: &mut (impl FnMut(LineProgress) + Send),
) {
    if tail.len() == OUTPUT_TAIL_LINES {
        tail.pop_front();
    }
    tail.push_back(line.to_string());

    if let Some(progress) = parse_line(line) {
        on_line(progress);
    }
}

fn spawn_line_reader(stream: impl AsyncRead + Unpin + Send + 'static, tx: mpsc::UnboundedSender<String>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}
