use thiserror::Error;

use super::tracker::CloseReason;

/// Everything that can go wrong inside the palette. None of these reach the
/// user: each one ends the session and leaves the document untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlashError {
    #[error("anchor position has no screen rect yet")]
    TransientLayoutFailure,
    #[error("slash session invalidated: {0}")]
    InvalidatedSession(CloseReason),
    #[error("trigger range {from}..{to} no longer exists")]
    StaleRangeOnExecute { from: usize, to: usize },
    #[error("position {pos} is outside the document (len {len})")]
    OutOfBounds { pos: usize, len: usize },
}
