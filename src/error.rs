//! Library error type shared by the registry, bridge and command surface.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaygroundError {
    #[error("block count must be positive")]
    InvalidBlockCount,

    #[error("expected {expected} heights, got {actual}")]
    HeightCountMismatch { expected: usize, actual: usize },

    #[error("block heights must be positive and finite, got {0}")]
    InvalidHeight(f32),

    #[error("no block with index {0}")]
    NotFound(usize),

    #[error("swap({i}, {j}) is out of range for {len} slots")]
    IndexOutOfRange { i: i64, j: i64, len: usize },

    #[error("physics body for block {0} is not available")]
    UnavailableBody(usize),

    #[error("player body is not available")]
    PlayerUnavailable,
}

pub type Result<T> = std::result::Result<T, PlaygroundError>;
