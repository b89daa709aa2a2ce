//! Ports: traits and configuration that adapters implement or consume.

pub mod config;
pub mod emitter;
pub mod history;

pub use config::{DEFAULT_PARALLEL, EngineConfig, MAX_PARALLEL_CAP};
pub use emitter::{JobEventEmitterPort, NoopJobEmitter};
pub use history::{HistoryStorePort, MemoryHistoryStore};
