//! Error types for the game core.

use thiserror::Error;

/// Errors reported at the boundary of the core.
///
/// The hot path never produces these: a move validated with
/// [`crate::Game::is_legal`] can be applied with
/// [`crate::Game::make_move`] unconditionally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A position or move string does not match its notation grammar.
    #[error("malformed notation: {0}")]
    MalformedNotation(String),

    /// A parsed position violates a board invariant.
    #[error("invalid position: {0}")]
    InvalidPosition(&'static str),

    /// A move that is not legal in the current position.
    #[error("illegal move: {0}")]
    IllegalMove(String),

    /// The undo stack reached its hard maximum.
    #[error("game capacity exceeded ({0} plies)")]
    CapacityExceeded(usize),
}

/// Result alias for core operations.
pub type EngineResult<T> = Result<T, EngineError>;
