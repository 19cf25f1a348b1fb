//! Control-side error types
//!
//! The render path itself never fails: malformed commands degrade to
//! inaction and unknown ids are dropped. Typed errors exist only at the
//! control API surface, where the caller can actually react to them.

use thiserror::Error;

/// Errors surfaced to the control thread
#[derive(Debug, Error)]
pub enum EngineError {
    /// The command ring buffer is full; the command was not enqueued.
    /// The caller may retry on the next tick.
    #[error("Command queue full, dropped: {0}")]
    CommandQueueFull(&'static str),

    /// A decoded asset failed validation before registration
    #[error("Invalid asset: {0}")]
    InvalidAsset(String),
}

/// Result type alias for control-side operations
pub type EngineResult<T> = Result<T, EngineError>;
