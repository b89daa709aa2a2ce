//! Job event emitter trait for cross-crate event broadcasting.
//!
//! This module defines the abstraction for emitting job events.
//! Implementations handle transport details (channels, desktop IPC,
//! terminal rendering, etc.).

use crate::download::JobEvent;

/// Trait for emitting job events.
///
/// This abstraction keeps event plumbing consistent across surfaces and
/// prevents channel types from becoming part of the public API surface.
///
/// # Implementations
///
/// - [`NoopJobEmitter`] - For tests and contexts that don't need events
/// - Surface-specific implementations (desktop IPC bridge, CLI renderer)
pub trait JobEventEmitterPort: Send + Sync {
    /// Emit a job event.
    ///
    /// Implementations should handle the event asynchronously or buffer it.
    /// This method should not block.
    fn emit(&self, event: JobEvent);

    /// Clone this emitter into a boxed trait object.
    ///
    /// This enables cloning of `Arc<dyn JobEventEmitterPort>` without
    /// requiring the underlying type to implement Clone.
    fn clone_box(&self) -> Box<dyn JobEventEmitterPort>;
}

/// A no-op event emitter for tests and contexts without a listener.
#[derive(Debug, Clone, Default)]
pub struct NoopJobEmitter;

impl NoopJobEmitter {
    /// Create a new no-op emitter.
    pub const fn new() -> Self {
        Self
    }
}

impl JobEventEmitterPort for NoopJobEmitter {
    fn emit(&self, _event: JobEvent) {
        // Intentionally do nothing
    }

    fn clone_box(&self) -> Box<dyn JobEventEmitterPort> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::JobId;
    use std::sync::Arc;

    #[test]
    fn test_noop_emitter() {
        let emitter = NoopJobEmitter::new();

        // Should not panic
        emitter.emit(JobEvent::cancelled(JobId::from("x")));
    }

    #[test]
    fn test_arc_emitter() {
        let emitter: Arc<dyn JobEventEmitterPort> = Arc::new(NoopJobEmitter::new());
        emitter.emit(JobEvent::paused(JobId::from("x")));
        let _boxed: Box<dyn JobEventEmitterPort> = emitter.clone_box();
    }
}
