//! Error types for the heartlight pipeline.
//!
//! Configuration mistakes (positions, anchors, unknown keys) are returned
//! synchronously from the call that made them. Chain failures inside the
//! event polling loop are logged and reported to the dispatcher's error hook
//! instead of stopping the loop.

/// Errors raised by pipeline components.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A value does not have the shape its destination requires.
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// Two keys were assigned the same slot, a slot is out of range, or a
    /// key names no registered buffer.
    #[error("position conflict: {0}")]
    PositionConflict(String),

    #[error("unknown key: {0}")]
    UnknownKey(String),

    #[error("unknown fixture: {0}")]
    UnknownFixture(u32),

    #[error("unknown expansion: {0}")]
    UnknownExpansion(String),

    /// A chain step failed, or asked for a statistic of an empty input.
    #[error("chain step {index} ({step}) failed: {reason}")]
    InvalidChain {
        index: usize,
        step: String,
        reason: String,
    },

    #[error("invalid edge mode '{0}' (expected 'reflect' or 'wrap')")]
    InvalidEdgeMode(String),

    #[error("invalid parameter '{0}' (expected intensity, red, green, blue, white, rgb or rgbw)")]
    InvalidParameter(String),
}

impl Error {
    pub(crate) fn shape(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
