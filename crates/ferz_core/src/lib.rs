//! Chess game core for the ferz engine: position representation, legal
//! move generation, make/unmake and draw detection.
//!
//! The crate is deliberately search-free. A search drives it through
//! [`Game`]: ask for moves (lazily with [`Game::next_move`] or all at
//! once with [`Game::legal_moves`]), apply one with [`Game::make_move`],
//! read the hash and terminal state, and revert with [`Game::unmake`].
//! Steady-state make/unmake/generate performs no allocation.

pub mod attacks;
pub mod bitboard;
pub mod board;
pub mod error;
pub mod game;
pub mod magics;
pub mod movegen;
pub mod moves;
pub mod perft;
pub mod types;
pub mod zobrist;

pub use bitboard::Bitboard;
pub use board::Board;
pub use error::{EngineError, EngineResult};
pub use game::{Game, DRAW_SCORE, MAX_CAPACITY, MAX_SCORE};
pub use moves::Move;
pub use perft::perft;
pub use types::Color;
pub use zobrist::ZOBRIST;

/// External position evaluator.
///
/// The core itself only knows about draws; everything heuristic lives
/// behind this seam. [`Game::score_with`] consults the evaluator
/// whenever no draw can be claimed.
pub trait Scorer: Send {
    /// Evaluation of the position from the side to move's perspective,
    /// in centipawns.
    fn score(&self, game: &Game) -> i32;
}
