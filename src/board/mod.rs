//! Board representation: primitives, bitboards, attack tables, Zobrist
//! hashing, FEN I/O, and the incremental make/unmake board.

pub mod attacks;
pub mod bitboard;
#[allow(clippy::module_inception)]
pub mod board;
pub mod fen;
pub mod moves;
pub mod types;
pub mod zobrist;

pub use board::{Board, NullUndo, UndoInfo, START_FEN};
pub use fen::FenError;
