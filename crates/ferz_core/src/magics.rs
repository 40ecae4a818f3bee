//! Magic bitboard tables for sliding piece attacks.
//!
//! The tables are generated once at startup: for every square the
//! relevant occupancy mask is computed, all blocker subsets enumerated,
//! and a collision-free magic multiplier searched with sparse random
//! candidates. After initialization an attack lookup is a mask, a
//! multiplication, a shift and one table read, with no branches and no
//! collisions. The generated set is deterministic because the search is
//! seeded with a fixed value.

use std::sync::LazyLock;

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

use crate::bitboard::Bitboard;

const ROOK_DELTAS: [(i8, i8); 4] = [(0, 1), (1, 0), (0, -1), (-1, 0)];
const BISHOP_DELTAS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];

/// Sum over all squares of `2 ^ relevant_rook_bits`, at most 12 per square.
const ROOK_TABLE_SIZE: usize = 102_400;

/// Sum over all squares of `2 ^ relevant_bishop_bits`, at most 9 per square.
const BISHOP_TABLE_SIZE: usize = 5_248;

/// Per-square lookup data: occupancy mask, multiplier, index shift and
/// the square's slice offset into the flat attack table.
#[derive(Clone, Copy, Default)]
struct SquareMagic {
    mask: Bitboard,
    magic: u64,
    shift: u32,
    offset: usize,
}

/// Precomputed sliding attack tables, read-only after generation.
pub struct MagicTables {
    rooks: [SquareMagic; 64],
    bishops: [SquareMagic; 64],
    rook_attacks: Vec<Bitboard>,
    bishop_attacks: Vec<Bitboard>,
}

/// Process-wide table singleton, generated on first use.
pub static MAGICS: LazyLock<MagicTables> = LazyLock::new(MagicTables::generate);

impl MagicTables {
    /// Rook attacks from `sq` with the given blockers.
    #[inline(always)]
    pub fn rook(&self, sq: usize, occupied: Bitboard) -> Bitboard {
        let entry = &self.rooks[sq];
        let index = ((occupied.0 & entry.mask.0).wrapping_mul(entry.magic) >> entry.shift) as usize;
        self.rook_attacks[entry.offset + index]
    }

    /// Bishop attacks from `sq` with the given blockers.
    #[inline(always)]
    pub fn bishop(&self, sq: usize, occupied: Bitboard) -> Bitboard {
        let entry = &self.bishops[sq];
        let index = ((occupied.0 & entry.mask.0).wrapping_mul(entry.magic) >> entry.shift) as usize;
        self.bishop_attacks[entry.offset + index]
    }

    fn generate() -> Self {
        let mut rng = SmallRng::seed_from_u64(0x5DEE_CE66_D001_1CE5);

        let (rooks, rook_attacks) = build_tables(&ROOK_DELTAS, ROOK_TABLE_SIZE, &mut rng);
        let (bishops, bishop_attacks) = build_tables(&BISHOP_DELTAS, BISHOP_TABLE_SIZE, &mut rng);

        MagicTables {
            rooks,
            bishops,
            rook_attacks,
            bishop_attacks,
        }
    }
}

/// Builds the per-square magics and the flat attack table for one
/// slider kind.
fn build_tables(
    deltas: &[(i8, i8); 4],
    capacity: usize,
    rng: &mut SmallRng,
) -> ([SquareMagic; 64], Vec<Bitboard>) {
    let mut magics = [SquareMagic::default(); 64];
    let mut table = Vec::with_capacity(capacity);

    for sq in 0..64 {
        let mask = relevant_mask(sq, deltas);
        let bits = mask.popcount() as usize;
        let shift = (64 - bits) as u32;

        let occupancies = enumerate_occupancies(mask);
        let attacks: Vec<Bitboard> = occupancies
            .iter()
            .map(|&occ| sliding_attacks(sq, deltas, occ))
            .collect();

        let (magic, entries) = find_magic(mask, shift, &occupancies, &attacks, rng);

        magics[sq] = SquareMagic {
            mask,
            magic,
            shift,
            offset: table.len(),
        };
        table.extend_from_slice(&entries);
    }

    debug_assert_eq!(table.len(), capacity);
    (magics, table)
}

/// Searches a collision-free magic multiplier for one square and returns
/// it together with the filled attack slice.
fn find_magic(
    mask: Bitboard,
    shift: u32,
    occupancies: &[Bitboard],
    attacks: &[Bitboard],
    rng: &mut SmallRng,
) -> (u64, Vec<Bitboard>) {
    let size = 1usize << (64 - shift);

    'search: loop {
        let magic = sparse_random(rng);

        // Candidates that map the mask mostly to low bits collide often.
        if (mask.0.wrapping_mul(magic) & 0xFF00_0000_0000_0000).count_ones() < 6 {
            continue;
        }

        let mut entries: Vec<Option<Bitboard>> = vec![None; size];

        for (&occ, &attack) in occupancies.iter().zip(attacks) {
            let index = ((occ.0 & mask.0).wrapping_mul(magic) >> shift) as usize;

            match entries[index] {
                None => entries[index] = Some(attack),
                Some(existing) if existing == attack => {}
                Some(_) => continue 'search,
            }
        }

        let entries = entries
            .into_iter()
            .map(|slot| slot.unwrap_or(Bitboard::EMPTY))
            .collect();

        return (magic, entries);
    }
}

/// Sparse candidate multipliers collide less in the magic search.
#[inline]
fn sparse_random(rng: &mut SmallRng) -> u64 {
    rng.next_u64() & rng.next_u64() & rng.next_u64()
}

/// Occupancy mask of the squares whose blockers matter for a slider on
/// `sq`: every square along each ray except the final one before the
/// board edge.
fn relevant_mask(sq: usize, deltas: &[(i8, i8); 4]) -> Bitboard {
    let mut mask = Bitboard::EMPTY;
    let from_rank = (sq / 8) as i8;
    let from_file = (sq % 8) as i8;

    for &(dr, df) in deltas {
        let mut rank = from_rank + dr;
        let mut file = from_file + df;

        while (0..8).contains(&(rank + dr)) && (0..8).contains(&(file + df)) {
            mask |= Bitboard::from_square((rank * 8 + file) as usize);
            rank += dr;
            file += df;
        }
    }

    mask
}

/// All blocker subsets of a relevant mask.
fn enumerate_occupancies(mask: Bitboard) -> Vec<Bitboard> {
    let squares: Vec<usize> = mask.collect();
    let count = 1usize << squares.len();
    let mut occupancies = Vec::with_capacity(count);

    for subset in 0..count {
        let mut occ = Bitboard::EMPTY;
        for (i, &sq) in squares.iter().enumerate() {
            if subset & (1 << i) != 0 {
                occ |= Bitboard::from_square(sq);
            }
        }
        occupancies.push(occ);
    }

    occupancies
}

/// Classical ray walk; the oracle the magic tables must reproduce.
pub(crate) fn sliding_attacks(sq: usize, deltas: &[(i8, i8); 4], occupied: Bitboard) -> Bitboard {
    let mut attacks = Bitboard::EMPTY;
    let from_rank = (sq / 8) as i8;
    let from_file = (sq % 8) as i8;

    for &(dr, df) in deltas {
        let mut rank = from_rank + dr;
        let mut file = from_file + df;

        while (0..8).contains(&rank) && (0..8).contains(&file) {
            let target = (rank * 8 + file) as usize;
            attacks |= Bitboard::from_square(target);
            if occupied.contains(target) {
                break;
            }
            rank += dr;
            file += df;
        }
    }

    attacks
}

/// Ray walk entry points for the test oracle.
pub(crate) fn rook_attacks_slow(sq: usize, occupied: Bitboard) -> Bitboard {
    sliding_attacks(sq, &ROOK_DELTAS, occupied)
}

pub(crate) fn bishop_attacks_slow(sq: usize, occupied: Bitboard) -> Bitboard {
    sliding_attacks(sq, &BISHOP_DELTAS, occupied)
}
