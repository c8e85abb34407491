//! Zobrist hashing keys for position identity and repetition tracking.
//!
//! The keys are generated from a fixed seed so hashes are deterministic
//! across runs, which keeps transposition-table contents and test
//! expectations reproducible.

use std::sync::OnceLock;

use crate::board::types::{CastlingRights, Piece, Square};

#[derive(Debug)]
struct ZobristTables {
    piece_square: [[u64; 64]; Piece::COUNT],
    castling: [u64; 16],
    en_passant_file: [u64; 8],
    side_to_move: u64,
}

static TABLES: OnceLock<ZobristTables> = OnceLock::new();

#[inline]
fn tables() -> &'static ZobristTables {
    TABLES.get_or_init(build_tables)
}

fn build_tables() -> ZobristTables {
    let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;

    let mut piece_square = [[0u64; 64]; Piece::COUNT];
    for piece in &mut piece_square {
        for sq in piece {
            *sq = next_random_u64(&mut seed);
        }
    }

    let mut castling = [0u64; 16];
    for key in &mut castling {
        *key = next_random_u64(&mut seed);
    }

    let mut en_passant_file = [0u64; 8];
    for key in &mut en_passant_file {
        *key = next_random_u64(&mut seed);
    }

    let side_to_move = next_random_u64(&mut seed);

    ZobristTables {
        piece_square,
        castling,
        en_passant_file,
        side_to_move,
    }
}

#[inline]
fn next_random_u64(state: &mut u64) -> u64 {
    // splitmix64
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Key for a `(piece, square)` occupancy term.
#[inline]
pub fn piece_square_key(piece: Piece, square: Square) -> u64 {
    tables().piece_square[piece.index()][square as usize]
}

/// Key contribution of a castling-rights mask (`0..=15`).
#[inline]
pub fn castling_key(castling_rights: CastlingRights) -> u64 {
    tables().castling[(castling_rights & 0x0F) as usize]
}

/// Key contribution of an en-passant file (`0..=7`).
#[inline]
pub fn en_passant_file_key(file: u8) -> u64 {
    tables().en_passant_file[file as usize]
}

/// Toggle key, xor-ed in when black is to move.
#[inline]
pub fn side_key() -> u64 {
    tables().side_to_move
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::types::{Color, PieceType};

    #[test]
    fn keys_are_deterministic_across_calls() {
        let piece = Piece::new(Color::White, PieceType::Knight);
        assert_eq!(piece_square_key(piece, 42), piece_square_key(piece, 42));
        assert_eq!(castling_key(0b1010), castling_key(0b1010));
        assert_eq!(side_key(), side_key());
    }

    #[test]
    fn keys_are_pairwise_distinct_in_samples() {
        let knight = Piece::new(Color::White, PieceType::Knight);
        let bishop = Piece::new(Color::White, PieceType::Bishop);
        assert_ne!(piece_square_key(knight, 0), piece_square_key(knight, 1));
        assert_ne!(piece_square_key(knight, 0), piece_square_key(bishop, 0));
        assert_ne!(castling_key(0), castling_key(1));
        assert_ne!(en_passant_file_key(0), en_passant_file_key(7));
    }
}
