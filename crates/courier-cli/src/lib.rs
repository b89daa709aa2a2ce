//! CLI surface for the courier download engine.

pub mod fetch;
pub mod parser;
pub mod progress_view;

pub use fetch::load_manifest;
pub use parser::{Cli, Commands, HistoryCommands};
pub use progress_view::{ConsoleEmitter, JobOutcome};
