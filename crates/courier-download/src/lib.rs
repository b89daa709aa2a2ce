//! Download engine for courier.
//!
//! Turns a validated manifest into a set of supervised, concurrent
//! transfer-tool subprocesses: a bounded worker pool per job, live
//! progress parsed from tool output, pause/resume/retry/cancel, failure
//! classification, and optional split-archive extraction on completion.

pub mod classify;
pub mod extract;
pub mod history;
pub mod manager;
pub mod progress;
pub mod scheduler;
pub mod state;
pub mod transfer;

pub use classify::classify;
pub use extract::Extractor;
pub use history::JsonHistoryStore;
pub use manager::JobManager;
pub use transfer::{ProcessHandle, StopReason, TransferOutcome};
