//! Staged legal move generation.
//!
//! Moves are produced in phases so a search can consume them lazily in a
//! useful order: queen promotions, then captures with the most valuable
//! victims first, then castlings and quiet moves, then underpromotions.
//! When the side to move is in double check a single king-moves phase
//! replaces them all.
//!
//! Every emitted move is fully legal. Pawns and pieces filter their
//! destinations through [`Game::pin_mask`], which collapses to the
//! check-evasion mask when the piece is not pinned; king moves run their
//! own attack probe with the king lifted off the occupancy.

use crate::attacks::{
    bishop_attacks, king_attacks, knight_attacks, pawn_attacks, pin_ray, queen_attacks,
    rook_attacks,
};
use crate::bitboard::Bitboard;
use crate::game::{Game, GenStatus, MOVES_PER_PLY};
use crate::moves::*;
use crate::types::*;

impl Game {
    /// Start of the current ply's slice in the shared move buffer.
    #[inline(always)]
    fn ply_base(&self) -> i32 {
        (1 + self.index) * MOVES_PER_PLY as i32
    }

    /// Resets the cursor to an empty slice for the current ply.
    fn rewind_cursor(&mut self) {
        self.next = self.ply_base();
        self.last = self.next - 1;
    }

    #[inline(always)]
    fn push(&mut self, mv: Move) {
        self.last += 1;
        self.legals[self.last as usize] = mv;
    }

    /// Capture victims of the side to move, most valuable first.
    #[inline(always)]
    fn victims(&self) -> &'static [usize; 5] {
        match self.turn {
            Color::White => &[BLACK_QUEEN, BLACK_ROOK, BLACK_BISHOP, BLACK_KNIGHT, BLACK_PAWN],
            Color::Black => &[WHITE_QUEEN, WHITE_ROOK, WHITE_BISHOP, WHITE_KNIGHT, WHITE_PAWN],
        }
    }

    /// Returns the next legal move, advancing the phase machine lazily,
    /// or `None` once every phase is exhausted for this position.
    pub fn next_move(&mut self) -> Option<Move> {
        let mv = self.next_move_raw();
        if mv == Move::NULL {
            None
        } else {
            Some(mv)
        }
    }

    pub(crate) fn next_move_raw(&mut self) -> Move {
        if self.next <= self.last {
            let mv = self.legals[self.next as usize];
            self.next += 1;
            return mv;
        }

        while self.status != GenStatus::Finalized {
            match self.status {
                GenStatus::KingMoves => {
                    self.status = GenStatus::Finalized;
                    self.rewind_cursor();
                    self.gen_king_moves();
                }
                GenStatus::Promotions => {
                    self.status = GenStatus::Captures;
                    self.rewind_cursor();
                    self.gen_promotions();
                }
                GenStatus::Captures => {
                    self.status = GenStatus::OtherMoves;
                    self.gen_captures();
                }
                GenStatus::OtherMoves => {
                    self.status = GenStatus::Underproms;
                    self.gen_other_moves();
                }
                GenStatus::Underproms => {
                    self.status = GenStatus::Finalized;
                    // No queen promotion implies no underpromotion
                    if self.last < self.ply_base() {
                        break;
                    }
                    self.gen_underproms();
                }
                GenStatus::Finalized => unreachable!(),
            }

            if self.next <= self.last {
                let mv = self.legals[self.next as usize];
                self.next += 1;
                return mv;
            }
        }

        Move::NULL
    }

    /// All legal moves for the current position. The staged cursor is
    /// left untouched.
    pub fn legal_moves(&mut self) -> Vec<Move> {
        let mut moves = Vec::with_capacity(64);
        self.legal_moves_into(&mut moves);
        moves
    }

    /// Fills `out` with every legal move, reusing its allocation.
    pub fn legal_moves_into(&mut self, out: &mut Vec<Move>) {
        out.clear();

        let saved = (self.next, self.last, self.status);
        self.rewind_cursor();

        if self.evasion.is_empty() {
            self.gen_king_moves();
        } else {
            self.gen_promotions();
            self.gen_captures();
            self.gen_other_moves();
            self.gen_underproms();
        }

        for i in self.ply_base()..=self.last {
            out.push(self.legals[i as usize]);
        }

        (self.next, self.last, self.status) = saved;
    }

    /// Whether any legal move exists, probing as little as possible:
    /// king escapes first, then the phase machine until one move shows.
    pub fn has_legal_moves(&mut self) -> bool {
        let escapes = self.kattacks & !self.rival_kattacks & !self.loyal;
        for to in escapes {
            if self.is_legal_king_move(to) {
                return true;
            }
        }

        if self.evasion.is_empty() {
            return false;
        }

        // Anything already generated for this ply settles it, whether
        // or not the caller consumed it
        if self.last >= self.ply_base() {
            return true;
        }

        if self.next_move_raw() != Move::NULL {
            self.next -= 1;
            return true;
        }

        false
    }

    /// Whether a move can be played in the current position.
    pub fn is_legal(&mut self, mv: Move) -> bool {
        self.is_valid(mv) && self.legal_moves().contains(&mv)
    }

    /// Structural pre-check: the encoded pieces actually stand on the
    /// encoded squares. Legality proper goes through generation.
    fn is_valid(&self, mv: Move) -> bool {
        if mv == Move::NULL {
            return false;
        }

        let mut piece = mv.piece();
        if piece > BLACK_KING {
            return false;
        }
        if mv.is_promotion() {
            piece = if piece <= WHITE_PAWN { WHITE_PAWN } else { BLACK_PAWN };
        }
        if !self.bitboards[piece].contains(mv.from()) {
            return false;
        }

        if mv.is_capture() {
            if mv.is_passant() {
                self.passant != NULL_PASSANT && mv.to() == self.passant as usize
            } else {
                let capture = mv.capture();
                capture <= BLACK_KING && self.bitboards[capture].contains(mv.to())
            }
        } else {
            self.free.contains(mv.to())
        }
    }

    /* Attack probes */

    /// Whether the rival side attacks `sq`.
    fn is_attacked(&self, sq: usize) -> bool {
        !(self.rival_pawns & pawn_attacks(sq, self.turn)).is_empty()
            || !(self.rival_knights & knight_attacks(sq)).is_empty()
            || !(self.rival_king & king_attacks(sq)).is_empty()
            || !(self.rival_sliders_b & bishop_attacks(sq, self.occupied)).is_empty()
            || !(self.rival_sliders_r & rook_attacks(sq, self.occupied)).is_empty()
    }

    /// Whether the king may move to `to`. The king's own bit is lifted
    /// off the occupancy so a checking slider's ray extends through the
    /// square the king vacates.
    pub(crate) fn is_legal_king_move(&self, to: usize) -> bool {
        let occupied = self.occupied ^ self.king;

        (self.rival_pawns & pawn_attacks(to, self.turn)).is_empty()
            && (self.rival_knights & knight_attacks(to)).is_empty()
            && (self.rival_sliders_b & bishop_attacks(to, occupied)).is_empty()
            && (self.rival_sliders_r & rook_attacks(to, occupied)).is_empty()
    }

    /// Destination mask for the piece on `from`: the pin ray when the
    /// piece is absolutely pinned, the check-evasion mask otherwise.
    /// Kings never consult this mask.
    fn pin_mask(&self, from: usize) -> Bitboard {
        let file = from & 0x07;
        let rank = from & 0x38;
        let king_file = self.target & 0x07;
        let king_rank = self.target & 0x38;

        // A piece at the far end of its line shared with the king has
        // no square beyond it, so no pinner fits there.
        let diagonal = if king_file == file {
            if rank == 0 || rank == 0x38 {
                return self.evasion;
            }
            false
        } else if king_rank == rank {
            if file == 0 || file == 0x07 {
                return self.evasion;
            }
            false
        } else {
            if file == 0 || file == 0x07 || rank == 0 || rank == 0x38 {
                return self.evasion;
            }
            true
        };

        let mask = pin_ray(self.target, from);

        if !mask.is_empty() {
            if diagonal {
                if !(mask & self.rival_sliders_b).is_empty() {
                    let attacks = bishop_attacks(from, self.occupied);
                    if !(attacks & self.king).is_empty()
                        && !(mask & attacks & self.rival_sliders_b).is_empty()
                    {
                        return mask & self.evasion;
                    }
                }
            } else if !(mask & self.rival_sliders_r).is_empty() {
                let attacks = rook_attacks(from, self.occupied);
                if !(attacks & self.king).is_empty()
                    && !(mask & attacks & self.rival_sliders_r).is_empty()
                {
                    return mask & self.evasion;
                }
            }
        }

        self.evasion
    }

    /// Check-evasion destinations for non-king moves: every square when
    /// not in check, the squares that block or capture a single
    /// checker, empty under double check.
    pub(crate) fn evasion_mask(&self) -> Bitboard {
        // Contact checks by pawn or knight cannot be blocked

        let attacks_p = if self.rival_pawns.is_empty() {
            Bitboard::EMPTY
        } else {
            pawn_attacks(self.target, self.turn)
        };

        let mut mask = attacks_p & self.rival_pawns;

        if !mask.is_empty() {
            // The checker is the pawn that just double-advanced, so
            // capturing it en passant also evades
            if self.passant != NULL_PASSANT {
                mask |= Bitboard::from_square(self.passant as usize);
            }
        } else if !self.rival_knights.is_empty() {
            mask = self.rival_knights & knight_attacks(self.target);
        }

        if !mask.is_empty() {
            // A discovered slider check on top of the contact check
            // leaves king moves only

            if !self.rival_sliders_b.is_empty()
                && !(self.rival_sliders_b & bishop_attacks(self.target, self.occupied)).is_empty()
            {
                return Bitboard::EMPTY;
            }
            if !self.rival_sliders_r.is_empty()
                && !(self.rival_sliders_r & rook_attacks(self.target, self.occupied)).is_empty()
            {
                return Bitboard::EMPTY;
            }

            return mask;
        }

        // Slider checks: block the ray or capture the checker

        let attacks_b = if self.rival_sliders_b.is_empty() {
            Bitboard::EMPTY
        } else {
            bishop_attacks(self.target, self.occupied)
        };
        let attacks_r = if self.rival_sliders_r.is_empty() {
            Bitboard::EMPTY
        } else {
            rook_attacks(self.target, self.occupied)
        };

        let checkers_b = attacks_b & self.rival_sliders_b;
        let checkers_r = attacks_r & self.rival_sliders_r;

        match (checkers_b | checkers_r).popcount() {
            0 => Bitboard::ALL,
            1 => {
                let checker = (checkers_b | checkers_r).lsb_square();
                let ray = pin_ray(self.target, checker);
                if checkers_b.is_empty() {
                    attacks_r & ray
                } else {
                    attacks_b & ray
                }
            }
            _ => Bitboard::EMPTY,
        }
    }

    /* Unpacking helpers */

    /// Emits `from -> to` for every destination, without further checks.
    fn push_moves(&mut self, from: usize, bits: Bitboard, flags: u32) {
        let flags = flags | from as u32;
        for to in bits {
            self.push(Move(flags | (to as u32) << 10));
        }
    }

    /// Emits pawn moves whose origin is `to + disp`, keeping only
    /// destinations the pin mask allows.
    fn push_pawn_moves(&mut self, disp: i32, bits: Bitboard, flags: u32) {
        for to in bits {
            let from = (to as i32 + disp) as usize;
            if self.pin_mask(from).contains(to) {
                self.push(Move(flags | (to as u32) << 10 | from as u32));
            }
        }
    }

    /// Emits king moves, keeping only legal destinations.
    fn push_king_moves(&mut self, bits: Bitboard, flags: u32) {
        let flags = flags | self.target as u32;
        for to in bits {
            if self.is_legal_king_move(to) {
                self.push(Move(flags | (to as u32) << 10));
            }
        }
    }

    /* Generation phases */

    /// Queen promotions, straight and capturing.
    fn gen_promotions(&mut self) {
        let white = self.turn == Color::White;
        let (movers, promo) = if white {
            (self.pawns & Bitboard::RANK_7, WHITE_QUEEN)
        } else {
            (self.pawns & Bitboard::RANK_2, BLACK_QUEEN)
        };

        if movers.is_empty() {
            return;
        }

        let (disp_a, disp_b, disp_push) = if white { (-7, -9, -8) } else { (7, 9, 8) };
        let (shift_a, shift_b, shift_push) = if white {
            (movers.north_west(), movers.north_east(), movers.north())
        } else {
            (movers.south_east(), movers.south_west(), movers.south())
        };

        let mut side_a = shift_a & self.enemy;
        for &victim in self.victims() {
            if side_a.is_empty() {
                break;
            }
            let bits = side_a & self.bitboards[victim];
            if !bits.is_empty() {
                let flags = (victim as u32) << 16 | (promo as u32) << 6 | PROMCAP_MOVE;
                self.push_pawn_moves(disp_a, bits, flags);
                side_a ^= bits;
            }
        }

        let mut side_b = shift_b & self.enemy;
        for &victim in self.victims() {
            if side_b.is_empty() {
                break;
            }
            let bits = side_b & self.bitboards[victim];
            if !bits.is_empty() {
                let flags = (victim as u32) << 16 | (promo as u32) << 6 | PROMCAP_MOVE;
                self.push_pawn_moves(disp_b, bits, flags);
                side_b ^= bits;
            }
        }

        self.push_pawn_moves(disp_push, shift_push & self.free, (promo as u32) << 6 | PROMOTE_MOVE);
    }

    /// Knight, bishop and rook promotions, straight and capturing.
    fn gen_underproms(&mut self) {
        let white = self.turn == Color::White;
        let (movers, promos) = if white {
            (
                self.pawns & Bitboard::RANK_7,
                [WHITE_KNIGHT, WHITE_BISHOP, WHITE_ROOK],
            )
        } else {
            (
                self.pawns & Bitboard::RANK_2,
                [BLACK_KNIGHT, BLACK_BISHOP, BLACK_ROOK],
            )
        };

        if movers.is_empty() {
            return;
        }

        let (disp_a, disp_b, disp_push) = if white { (-7, -9, -8) } else { (7, 9, 8) };
        let (shift_a, shift_b, shift_push) = if white {
            (movers.north_west(), movers.north_east(), movers.north())
        } else {
            (movers.south_east(), movers.south_west(), movers.south())
        };

        let mut side_a = shift_a & self.enemy;
        for &victim in self.victims() {
            if side_a.is_empty() {
                break;
            }
            let bits = side_a & self.bitboards[victim];
            if !bits.is_empty() {
                let flags = (victim as u32) << 16 | PROMCAP_MOVE;
                for promo in promos {
                    self.push_pawn_moves(disp_a, bits, (promo as u32) << 6 | flags);
                }
                side_a ^= bits;
            }
        }

        let mut side_b = shift_b & self.enemy;
        for &victim in self.victims() {
            if side_b.is_empty() {
                break;
            }
            let bits = side_b & self.bitboards[victim];
            if !bits.is_empty() {
                let flags = (victim as u32) << 16 | PROMCAP_MOVE;
                for promo in promos {
                    self.push_pawn_moves(disp_b, bits, (promo as u32) << 6 | flags);
                }
                side_b ^= bits;
            }
        }

        let pushes = shift_push & self.free;
        for promo in promos {
            self.push_pawn_moves(disp_push, pushes, (promo as u32) << 6 | PROMOTE_MOVE);
        }
    }

    /// Non-promotion captures, most valuable victims first, including
    /// en passant.
    fn gen_captures(&mut self) {
        let white = self.turn == Color::White;
        let pawn_piece = self.color ^ 0x8;

        // Pawn captures off the promotion rank

        let promo_rank = if white { Bitboard::RANK_7 } else { Bitboard::RANK_2 };
        let movers = self.pawns & !promo_rank;
        let (disp_a, disp_b) = if white { (-7, -9) } else { (7, 9) };

        if !movers.is_empty() {
            let (shift_a, shift_b) = if white {
                (movers.north_west(), movers.north_east())
            } else {
                (movers.south_east(), movers.south_west())
            };

            let mut side_a = shift_a & self.enemy;
            for &victim in self.victims() {
                if side_a.is_empty() {
                    break;
                }
                let bits = side_a & self.bitboards[victim];
                if !bits.is_empty() {
                    let flags = (victim as u32) << 16 | (pawn_piece as u32) << 6 | CAPTURE_MOVE;
                    self.push_pawn_moves(disp_a, bits, flags);
                    side_a ^= bits;
                }
            }

            let mut side_b = shift_b & self.enemy;
            for &victim in self.victims() {
                if side_b.is_empty() {
                    break;
                }
                let bits = side_b & self.bitboards[victim];
                if !bits.is_empty() {
                    let flags = (victim as u32) << 16 | (pawn_piece as u32) << 6 | CAPTURE_MOVE;
                    self.push_pawn_moves(disp_b, bits, flags);
                    side_b ^= bits;
                }
            }
        }

        // Piece captures

        let (knight_piece, bishop_piece, rook_piece, queen_piece, king_piece) = if white {
            (WHITE_KNIGHT, WHITE_BISHOP, WHITE_ROOK, WHITE_QUEEN, WHITE_KING)
        } else {
            (BLACK_KNIGHT, BLACK_BISHOP, BLACK_ROOK, BLACK_QUEEN, BLACK_KING)
        };

        for from in self.knights {
            let attacks = knight_attacks(from) & self.pin_mask(from);
            if attacks.is_empty() {
                continue;
            }
            for &victim in self.victims() {
                let bits = attacks & self.bitboards[victim];
                self.push_moves(from, bits, (victim as u32) << 16 | (knight_piece as u32) << 6 | CAPTURE_MOVE);
            }
        }

        for from in self.bishops {
            let attacks = bishop_attacks(from, self.occupied) & self.pin_mask(from);
            if attacks.is_empty() {
                continue;
            }
            for &victim in self.victims() {
                let bits = attacks & self.bitboards[victim];
                self.push_moves(from, bits, (victim as u32) << 16 | (bishop_piece as u32) << 6 | CAPTURE_MOVE);
            }
        }

        for from in self.rooks {
            let attacks = rook_attacks(from, self.occupied) & self.pin_mask(from);
            if attacks.is_empty() {
                continue;
            }
            for &victim in self.victims() {
                let bits = attacks & self.bitboards[victim];
                self.push_moves(from, bits, (victim as u32) << 16 | (rook_piece as u32) << 6 | CAPTURE_MOVE);
            }
        }

        for from in self.queens {
            let attacks = queen_attacks(from, self.occupied) & self.pin_mask(from);
            if attacks.is_empty() {
                continue;
            }
            for &victim in self.victims() {
                let bits = attacks & self.bitboards[victim];
                self.push_moves(from, bits, (victim as u32) << 16 | (queen_piece as u32) << 6 | CAPTURE_MOVE);
            }
        }

        // King captures

        let attacks_k = self.kattacks & !self.rival_kattacks;
        if !attacks_k.is_empty() {
            for &victim in self.victims() {
                let bits = attacks_k & self.bitboards[victim];
                self.push_king_moves(bits, (victim as u32) << 16 | (king_piece as u32) << 6 | CAPTURE_MOVE);
            }
        }

        // En passant

        if self.passant == NULL_PASSANT || self.pawns.is_empty() {
            return;
        }

        let to = self.passant as usize;
        let to_mask = Bitboard::from_square(to);
        let capt_mask = Bitboard::from_square(to ^ 0x8);

        // Lift the captured pawn off the occupancy while probing, so a
        // discovered check along the shared rank is seen

        self.occupied ^= capt_mask;
        self.rival_pawns ^= capt_mask;

        let flags = (pawn_piece as u32) << 6 | PASSANT_MOVE;

        let (origin_a, origin_b) = if white {
            (to_mask.south_east(), to_mask.south_west())
        } else {
            (to_mask.north_west(), to_mask.north_east())
        };

        if !(origin_a & self.pawns).is_empty() {
            let from = (to as i32 + disp_a) as usize;
            if self.pin_mask(from).contains(to) {
                self.push(Move(flags | (to as u32) << 10 | from as u32));
            }
        }

        if !(origin_b & self.pawns).is_empty() {
            let from = (to as i32 + disp_b) as usize;
            if self.pin_mask(from).contains(to) {
                self.push(Move(flags | (to as u32) << 10 | from as u32));
            }
        }

        self.rival_pawns ^= capt_mask;
        self.occupied ^= capt_mask;
    }

    /// Castlings, quiet piece moves and pawn advances.
    fn gen_other_moves(&mut self) {
        let white = self.turn == Color::White;

        // Castling: rights intact, path free, king neither in check nor
        // crossing an attacked square

        if white {
            if self.castle & (CASTLE_WK | CASTLE_WQ) != 0 && !self.in_check() {
                if self.castle & CASTLE_WK != 0
                    && (self.occupied & Bitboard(0x0000_0000_0000_0060)).is_empty()
                    && !self.is_attacked(F1)
                    && !self.is_attacked(G1)
                {
                    self.push(WS_CASTLE);
                }
                if self.castle & CASTLE_WQ != 0
                    && (self.occupied & Bitboard(0x0000_0000_0000_000E)).is_empty()
                    && !self.is_attacked(C1)
                    && !self.is_attacked(D1)
                {
                    self.push(WL_CASTLE);
                }
            }
        } else if self.castle & (CASTLE_BK | CASTLE_BQ) != 0 && !self.in_check() {
            if self.castle & CASTLE_BK != 0
                && (self.occupied & Bitboard(0x6000_0000_0000_0000)).is_empty()
                && !self.is_attacked(F8)
                && !self.is_attacked(G8)
            {
                self.push(BS_CASTLE);
            }
            if self.castle & CASTLE_BQ != 0
                && (self.occupied & Bitboard(0x0E00_0000_0000_0000)).is_empty()
                && !self.is_attacked(C8)
                && !self.is_attacked(D8)
            {
                self.push(BL_CASTLE);
            }
        }

        // Quiet piece moves

        let (knight_piece, bishop_piece, rook_piece, queen_piece, king_piece) = if white {
            (WHITE_KNIGHT, WHITE_BISHOP, WHITE_ROOK, WHITE_QUEEN, WHITE_KING)
        } else {
            (BLACK_KNIGHT, BLACK_BISHOP, BLACK_ROOK, BLACK_QUEEN, BLACK_KING)
        };

        for from in self.knights {
            let bits = knight_attacks(from) & self.pin_mask(from);
            self.push_moves(from, self.free & bits, (knight_piece as u32) << 6 | SIMPLE_MOVE);
        }

        for from in self.bishops {
            let bits = bishop_attacks(from, self.occupied) & self.pin_mask(from);
            self.push_moves(from, self.free & bits, (bishop_piece as u32) << 6 | SIMPLE_MOVE);
        }

        for from in self.rooks {
            let bits = rook_attacks(from, self.occupied) & self.pin_mask(from);
            self.push_moves(from, self.free & bits, (rook_piece as u32) << 6 | SIMPLE_MOVE);
        }

        for from in self.queens {
            let bits = queen_attacks(from, self.occupied) & self.pin_mask(from);
            self.push_moves(from, self.free & bits, (queen_piece as u32) << 6 | SIMPLE_MOVE);
        }

        let attacks_k = self.kattacks & !self.rival_kattacks;
        self.push_king_moves(self.free & attacks_k, (king_piece as u32) << 6 | SIMPLE_MOVE);

        if self.pawns.is_empty() {
            return;
        }

        // Pawn single and double advances

        let pawn_piece = self.color ^ 0x8;
        let flags = (pawn_piece as u32) << 6 | PAWN_MOVE;

        if white {
            let singles = self.free & (self.pawns & !Bitboard::RANK_7).north();
            self.push_pawn_moves(-8, singles, flags);

            let doubles = self.free & (singles & Bitboard::RANK_3).north();
            self.push_pawn_moves(-16, doubles, flags);
        } else {
            let singles = self.free & (self.pawns & !Bitboard::RANK_2).south();
            self.push_pawn_moves(8, singles, flags);

            let doubles = self.free & (singles & Bitboard::RANK_6).south();
            self.push_pawn_moves(16, doubles, flags);
        }
    }

    /// King moves only, for positions in double check.
    fn gen_king_moves(&mut self) {
        let attacks_k = self.kattacks & !self.rival_kattacks;
        if attacks_k.is_empty() {
            return;
        }

        let king_piece = match self.turn {
            Color::White => WHITE_KING,
            Color::Black => BLACK_KING,
        };

        for &victim in self.victims() {
            let bits = attacks_k & self.bitboards[victim];
            self.push_king_moves(bits, (victim as u32) << 16 | (king_piece as u32) << 6 | CAPTURE_MOVE);
        }

        self.push_king_moves(self.free & attacks_k, (king_piece as u32) << 6 | SIMPLE_MOVE);
    }
}

#[cfg(test)]
#[path = "movegen_tests.rs"]
mod movegen_tests;
