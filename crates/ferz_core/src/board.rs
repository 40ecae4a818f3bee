//! Validated position snapshots and FEN notation.
//!
//! A [`Board`] is an immutable description of a chess position: fifteen
//! bitboards, the side to move, castling rights, the en-passant square
//! and the move clocks. Boards are produced by parsing FEN or by
//! snapshotting a [`crate::Game`], and every constructor enforces the
//! position invariants, so a `Board` handed to the game core is always
//! playable.

use std::fmt;

use crate::attacks::{bishop_attacks, king_attacks, knight_attacks, pawn_attacks, rook_attacks};
use crate::bitboard::Bitboard;
use crate::error::{EngineError, EngineResult};
use crate::types::*;

/// Bitboards of the standard start position.
pub const START_BITBOARDS: [Bitboard; 15] = [
    Bitboard(0x0000_0000_0000_0010), //  0: white king
    Bitboard(0x0000_0000_0000_0008), //  1: white queens
    Bitboard(0x0000_0000_0000_0081), //  2: white rooks
    Bitboard(0x0000_0000_0000_0024), //  3: white bishops
    Bitboard(0x0000_0000_0000_0042), //  4: white knights
    Bitboard(0x0000_0000_0000_FF00), //  5: white pawns
    Bitboard(0x00FF_0000_0000_0000), //  6: black pawns
    Bitboard(0x4200_0000_0000_0000), //  7: black knights
    Bitboard(0x2400_0000_0000_0000), //  8: black bishops
    Bitboard(0x8100_0000_0000_0000), //  9: black rooks
    Bitboard(0x0800_0000_0000_0000), // 10: black queens
    Bitboard(0x1000_0000_0000_0000), // 11: black king
    Bitboard(0xFFFF_0000_0000_FFFF), // 12: all pieces
    Bitboard(0x0000_0000_0000_FFFF), // 13: white pieces
    Bitboard(0xFFFF_0000_0000_0000), // 14: black pieces
];

/// A validated position and turn.
#[derive(Clone, Debug)]
pub struct Board {
    pub(crate) bitboards: [Bitboard; 15],
    pub(crate) turn: Color,
    pub(crate) castle: u8,
    pub(crate) passant: u8,
    pub(crate) clock: u32,
    pub(crate) counter: u32,
}

impl Board {
    /// The standard start position.
    pub fn new() -> Board {
        Board {
            bitboards: START_BITBOARDS,
            turn: Color::White,
            castle: START_CASTLE,
            passant: NULL_PASSANT,
            clock: 0,
            counter: 1,
        }
    }

    /// Parses a six-field FEN string, rejecting anything that does not
    /// match the grammar or violates the position invariants.
    pub fn from_fen(fen: &str) -> EngineResult<Board> {
        let malformed = || EngineError::MalformedNotation(fen.to_string());

        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(malformed());
        }

        // Piece placement, ranks 8 down to 1

        let ranks: Vec<&str> = fields[0].split('/').collect();
        if ranks.len() != 8 {
            return Err(malformed());
        }

        let mut bitboards = [Bitboard::EMPTY; 15];

        for (i, row) in ranks.iter().enumerate() {
            let rank = 7 - i;
            let mut file = 0;

            for c in row.chars() {
                if let Some(skip) = c.to_digit(10) {
                    if skip == 0 {
                        return Err(malformed());
                    }
                    file += skip as usize;
                } else {
                    let piece = piece_index(c).ok_or_else(malformed)?;
                    if file >= 8 {
                        return Err(malformed());
                    }
                    let bits = Bitboard::from_square(rank * 8 + file);
                    let color = if piece <= WHITE_PAWN {
                        WHITE_PIECES
                    } else {
                        BLACK_PIECES
                    };
                    bitboards[piece] |= bits;
                    bitboards[color] |= bits;
                    bitboards[ALL_PIECES] |= bits;
                    file += 1;
                }
                if file > 8 {
                    return Err(malformed());
                }
            }
            if file != 8 {
                return Err(malformed());
            }
        }

        // Side to move

        let turn = match fields[1] {
            "w" => Color::White,
            "b" => Color::Black,
            _ => return Err(malformed()),
        };

        // Castling availability, a subset of KQkq in that order

        let mut castle = NULL_CASTLE;
        if fields[2] != "-" {
            if fields[2].is_empty() {
                return Err(malformed());
            }
            let mut order = 0;
            for c in fields[2].chars() {
                let (bit, position) = match c {
                    'K' => (CASTLE_WK, 1),
                    'Q' => (CASTLE_WQ, 2),
                    'k' => (CASTLE_BK, 3),
                    'q' => (CASTLE_BQ, 4),
                    _ => return Err(malformed()),
                };
                if position <= order {
                    return Err(malformed());
                }
                order = position;
                castle |= bit;
            }
        }

        // En-passant target square

        let passant = if fields[3] == "-" {
            NULL_PASSANT
        } else {
            let sq = coord_to_sq(fields[3]).ok_or_else(malformed)?;
            if rank_of(sq) != 2 && rank_of(sq) != 5 {
                return Err(malformed());
            }
            sq as u8
        };

        // Half-move clock and full-move counter; the counter starts at
        // one and takes no leading zeros

        let digits = |field: &str| {
            if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
                None
            } else {
                field.parse::<u32>().ok()
            }
        };

        let clock = digits(fields[4]).ok_or_else(malformed)?;
        let counter = digits(fields[5]).ok_or_else(malformed)?;
        if counter == 0 || fields[5].starts_with('0') {
            return Err(malformed());
        }

        let board = Board {
            bitboards,
            turn,
            castle,
            passant,
            clock,
            counter,
        };

        board.validate()?;
        Ok(board)
    }

    /// Serializes the position back to FEN.
    pub fn to_fen(&self) -> String {
        let mut notation = String::with_capacity(90);

        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                match self.piece_at(rank * 8 + file) {
                    Some(piece) => {
                        if empty > 0 {
                            notation.push((b'0' + empty) as char);
                            empty = 0;
                        }
                        notation.push(piece_char(piece).unwrap_or('?'));
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                notation.push((b'0' + empty) as char);
            }
            if rank > 0 {
                notation.push('/');
            }
        }

        notation.push(' ');
        notation.push(match self.turn {
            Color::White => 'w',
            Color::Black => 'b',
        });

        notation.push(' ');
        if self.castle == NULL_CASTLE {
            notation.push('-');
        } else {
            if self.castle & CASTLE_WK != 0 {
                notation.push('K');
            }
            if self.castle & CASTLE_WQ != 0 {
                notation.push('Q');
            }
            if self.castle & CASTLE_BK != 0 {
                notation.push('k');
            }
            if self.castle & CASTLE_BQ != 0 {
                notation.push('q');
            }
        }

        notation.push(' ');
        if self.passant == NULL_PASSANT {
            notation.push('-');
        } else {
            notation.push_str(&sq_to_coord(self.passant as usize));
        }

        notation.push_str(&format!(" {} {}", self.clock, self.counter));
        notation
    }

    /// Piece identifier standing on `sq`, if any.
    pub fn piece_at(&self, sq: usize) -> Option<usize> {
        if !self.bitboards[ALL_PIECES].contains(sq) {
            return None;
        }
        (0..12).find(|&piece| self.bitboards[piece].contains(sq))
    }

    pub fn turn(&self) -> Color {
        self.turn
    }

    /// Checks the position invariants; every public constructor runs
    /// this before handing out a board.
    pub fn validate(&self) -> EngineResult<()> {
        // Exactly one king per side

        if self.bitboards[WHITE_KING].popcount() != 1 {
            return Err(EngineError::InvalidPosition("white must have one king"));
        }
        if self.bitboards[BLACK_KING].popcount() != 1 {
            return Err(EngineError::InvalidPosition("black must have one king"));
        }

        // Piece bitboards must be pairwise disjoint and sum to the
        // occupancy boards

        let mut seen = Bitboard::EMPTY;
        let mut white = Bitboard::EMPTY;
        for piece in 0..12 {
            if !(seen & self.bitboards[piece]).is_empty() {
                return Err(EngineError::InvalidPosition("overlapping pieces"));
            }
            seen |= self.bitboards[piece];
            if piece <= WHITE_PAWN {
                white |= self.bitboards[piece];
            }
        }

        if seen != self.bitboards[ALL_PIECES] {
            return Err(EngineError::InvalidPosition("occupancy board mismatch"));
        }
        if white != self.bitboards[WHITE_PIECES] {
            return Err(EngineError::InvalidPosition("white occupancy mismatch"));
        }
        if (seen ^ white) != self.bitboards[BLACK_PIECES] {
            return Err(EngineError::InvalidPosition("black occupancy mismatch"));
        }

        // No pawns on the back ranks

        let pawns = self.bitboards[WHITE_PAWN] | self.bitboards[BLACK_PAWN];
        if !(pawns & (Bitboard::RANK_1 | Bitboard::RANK_8)).is_empty() {
            return Err(EngineError::InvalidPosition("pawn on a back rank"));
        }

        // Castling rights require the king and rook on their home squares

        let rights = [
            (CASTLE_WK, WHITE_KING, E1, WHITE_ROOK, H1),
            (CASTLE_WQ, WHITE_KING, E1, WHITE_ROOK, A1),
            (CASTLE_BK, BLACK_KING, E8, BLACK_ROOK, H8),
            (CASTLE_BQ, BLACK_KING, E8, BLACK_ROOK, A8),
        ];
        for (bit, king, king_home, rook, rook_home) in rights {
            if self.castle & bit != 0
                && (!self.bitboards[king].contains(king_home)
                    || !self.bitboards[rook].contains(rook_home))
            {
                return Err(EngineError::InvalidPosition("stale castling right"));
            }
        }

        // The en-passant square must sit right behind a pawn that could
        // just have advanced two squares

        if self.passant != NULL_PASSANT {
            let sq = self.passant as usize;
            let valid = match self.turn {
                Color::Black => {
                    rank_of(sq) == 2
                        && self.bitboards[WHITE_PAWN].contains(sq + 8)
                        && !self.bitboards[ALL_PIECES].contains(sq)
                        && !self.bitboards[ALL_PIECES].contains(sq - 8)
                }
                Color::White => {
                    rank_of(sq) == 5
                        && self.bitboards[BLACK_PAWN].contains(sq - 8)
                        && !self.bitboards[ALL_PIECES].contains(sq)
                        && !self.bitboards[ALL_PIECES].contains(sq + 8)
                }
            };
            if !valid {
                return Err(EngineError::InvalidPosition("stale en-passant square"));
            }
        }

        // The side that just moved cannot have left its king in check

        let idle_king = match self.turn {
            Color::White => self.bitboards[BLACK_KING],
            Color::Black => self.bitboards[WHITE_KING],
        };
        if square_attacked(&self.bitboards, idle_king.lsb_square(), self.turn) {
            return Err(EngineError::InvalidPosition("idle side is in check"));
        }

        if self.counter == 0 {
            return Err(EngineError::InvalidPosition("full-move counter is zero"));
        }

        Ok(())
    }
}

/// Whether `sq` is attacked by any piece of the given color.
pub(crate) fn square_attacked(bitboards: &[Bitboard; 15], sq: usize, by: Color) -> bool {
    let occupied = bitboards[ALL_PIECES];
    let (pawns, knights, king, diagonal, lateral) = match by {
        Color::White => (
            bitboards[WHITE_PAWN],
            bitboards[WHITE_KNIGHT],
            bitboards[WHITE_KING],
            bitboards[WHITE_BISHOP] | bitboards[WHITE_QUEEN],
            bitboards[WHITE_ROOK] | bitboards[WHITE_QUEEN],
        ),
        Color::Black => (
            bitboards[BLACK_PAWN],
            bitboards[BLACK_KNIGHT],
            bitboards[BLACK_KING],
            bitboards[BLACK_BISHOP] | bitboards[BLACK_QUEEN],
            bitboards[BLACK_ROOK] | bitboards[BLACK_QUEEN],
        ),
    };

    !(pawns & pawn_attacks(sq, by.other())).is_empty()
        || !(knights & knight_attacks(sq)).is_empty()
        || !(king & king_attacks(sq)).is_empty()
        || !(diagonal & bishop_attacks(sq, occupied)).is_empty()
        || !(lateral & rook_attacks(sq, occupied)).is_empty()
}

impl Default for Board {
    fn default() -> Self {
        Board::new()
    }
}

/// Position equality; the move clocks are not compared, matching the
/// repetition rule's notion of "same position".
impl PartialEq for Board {
    fn eq(&self, other: &Self) -> bool {
        self.bitboards == other.bitboards
            && self.turn == other.turn
            && self.castle == other.castle
            && self.passant == other.passant
    }
}

impl Eq for Board {}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in (0..8).rev() {
            for file in 0..8 {
                let c = self
                    .piece_at(rank * 8 + file)
                    .and_then(piece_char)
                    .unwrap_or('.');
                write!(f, "{c} ")?;
            }
            writeln!(f)?;
        }

        let tail = self.to_fen();
        let tail = tail.split_once(' ').map(|(_, rest)| rest).unwrap_or("");
        write!(f, "{tail}")
    }
}
