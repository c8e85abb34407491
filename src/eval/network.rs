//! External network evaluator.
//!
//! Implements the [`Evaluator`](crate::eval::Evaluator) capability on top of
//! a small quantized network with per-side accumulators. The delta hooks
//! keep the accumulators in sync with make/unmake instead of rescanning the
//! board at every leaf.
//!
//! The weight file is this crate's own fixed little-endian layout (magic,
//! version, hidden size, feature weights, biases, output layer). The file
//! path comes from the `MAPLE_EVAL_FILE` environment variable; a missing or
//! unreadable file makes construction fail so the caller can fall back to
//! the handcrafted evaluator.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use thiserror::Error;

use crate::board::moves::{move_from, move_to, move_type, promotion_type, Move, MoveType};
use crate::board::types::{make_square, square_rank, Color, Piece, PieceType, Square};
use crate::board::{Board, UndoInfo};
use crate::eval::Evaluator;

/// Environment variable naming the network weight file.
pub const EVAL_FILE_ENV: &str = "MAPLE_EVAL_FILE";

const MAGIC: &[u8; 8] = b"MAPLENET";
const VERSION: u32 = 1;

/// One input feature per (piece, square) pair, from each side's perspective.
const FEATURE_COUNT: usize = 12 * 64;

const MIN_HIDDEN: u32 = 8;
const MAX_HIDDEN: u32 = 2048;

// Quantization constants: activations clip to [0, QA], output weights are
// scaled by QB, and the final sum maps to centipawns through SCALE.
const QA: i32 = 255;
const QB: i32 = 64;
const SCALE: i32 = 400;

/// Scores are clamped here, far inside the mate band.
const SCORE_LIMIT: i32 = 8_000;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("{EVAL_FILE_ENV} is not set")]
    NotConfigured,
    #[error("failed to read network file: {0}")]
    Io(#[from] io::Error),
    #[error("not a network file (bad magic)")]
    BadMagic,
    #[error("unsupported network version {0}")]
    BadVersion(u32),
    #[error("implausible hidden layer size {0}")]
    BadDimensions(u32),
}

struct NetworkWeights {
    hidden_size: usize,
    // [FEATURE_COUNT * hidden_size], feature-major.
    feature_weights: Vec<i16>,
    feature_bias: Vec<i16>,
    // [2 * hidden_size]: side-to-move half first, opponent half second.
    output_weights: Vec<i16>,
    output_bias: i32,
}

/// Accumulator pair for one position, plus the hash it was computed for so
/// a desynchronized stack can be detected and refreshed.
#[derive(Clone)]
struct Accumulator {
    halves: [Vec<i32>; 2],
    hash: u64,
}

pub struct NetworkEvaluator {
    weights: NetworkWeights,
    stack: Vec<Accumulator>,
}

impl NetworkEvaluator {
    /// Load the network named by `MAPLE_EVAL_FILE`.
    pub fn from_env() -> Result<Self, NetworkError> {
        let path = std::env::var(EVAL_FILE_ENV).map_err(|_| NetworkError::NotConfigured)?;
        Self::load(Path::new(&path))
    }

    pub fn load(path: &Path) -> Result<Self, NetworkError> {
        let mut file = File::open(path)?;

        let mut magic = [0u8; 8];
        file.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(NetworkError::BadMagic);
        }

        let version = read_u32(&mut file)?;
        if version != VERSION {
            return Err(NetworkError::BadVersion(version));
        }

        let hidden = read_u32(&mut file)?;
        if !(MIN_HIDDEN..=MAX_HIDDEN).contains(&hidden) {
            return Err(NetworkError::BadDimensions(hidden));
        }
        let hidden_size = hidden as usize;

        let feature_weights = read_i16_vec(&mut file, FEATURE_COUNT * hidden_size)?;
        let feature_bias = read_i16_vec(&mut file, hidden_size)?;
        let output_weights = read_i16_vec(&mut file, 2 * hidden_size)?;
        let output_bias = read_i32(&mut file)?;

        Ok(Self {
            weights: NetworkWeights {
                hidden_size,
                feature_weights,
                feature_bias,
                output_weights,
                output_bias,
            },
            stack: Vec::with_capacity(128),
        })
    }

    /// Feature index of `piece` on `sq` from `perspective`. The opponent's
    /// perspective flips piece colors and mirrors ranks.
    fn feature_index(perspective: Color, piece: Piece, sq: Square) -> usize {
        let (piece_idx, square_idx) = match perspective {
            Color::White => (piece.index(), sq as usize),
            Color::Black => {
                let flipped = Piece::new(piece.color().opposite(), piece.piece_type());
                (flipped.index(), (sq ^ 56) as usize)
            }
        };
        piece_idx * 64 + square_idx
    }

    fn fresh_accumulator(&self, board: &Board) -> Accumulator {
        let h = self.weights.hidden_size;
        let mut halves = [vec![0i32; h], vec![0i32; h]];

        for (side, half) in halves.iter_mut().enumerate() {
            let perspective = if side == 0 { Color::White } else { Color::Black };
            for (i, bias) in self.weights.feature_bias.iter().enumerate() {
                half[i] = i32::from(*bias);
            }
            for sq in 0..64u8 {
                if let Some(piece) = board.piece_on(sq) {
                    let feature = Self::feature_index(perspective, piece, sq);
                    add_feature(half, &self.weights.feature_weights, feature, h);
                }
            }
        }

        Accumulator {
            halves,
            hash: board.hash_key(),
        }
    }

    fn add_piece(&self, acc: &mut Accumulator, piece: Piece, sq: Square) {
        let h = self.weights.hidden_size;
        for (side, half) in acc.halves.iter_mut().enumerate() {
            let perspective = if side == 0 { Color::White } else { Color::Black };
            let feature = Self::feature_index(perspective, piece, sq);
            add_feature(half, &self.weights.feature_weights, feature, h);
        }
    }

    fn remove_piece(&self, acc: &mut Accumulator, piece: Piece, sq: Square) {
        let h = self.weights.hidden_size;
        for (side, half) in acc.halves.iter_mut().enumerate() {
            let perspective = if side == 0 { Color::White } else { Color::Black };
            let feature = Self::feature_index(perspective, piece, sq);
            sub_feature(half, &self.weights.feature_weights, feature, h);
        }
    }

    /// Advance the top accumulator over `m`. `board` is the position after
    /// the move; the mover is therefore the side no longer on turn.
    fn apply_move(&self, acc: &mut Accumulator, board: &Board, m: Move, undo: &UndoInfo) {
        let mover = board.side_to_move().opposite();
        let from = move_from(m);
        let to = move_to(m);

        if let (Some(captured), Some(captured_sq)) = (undo.captured, undo.captured_square) {
            self.remove_piece(acc, captured, captured_sq);
        }

        self.remove_piece(acc, undo.moved, from);
        let landed = match move_type(m) {
            MoveType::Promotion => Piece::new(mover, promotion_type(m)),
            _ => undo.moved,
        };
        self.add_piece(acc, landed, to);

        if move_type(m) == MoveType::Castling {
            let back_rank = square_rank(from);
            let (rook_from, rook_to) = if to > from {
                (make_square(7, back_rank), make_square(5, back_rank))
            } else {
                (make_square(0, back_rank), make_square(3, back_rank))
            };
            let rook = Piece::new(mover, PieceType::Rook);
            self.remove_piece(acc, rook, rook_from);
            self.add_piece(acc, rook, rook_to);
        }

        acc.hash = board.hash_key();
    }

    fn forward(&self, acc: &Accumulator, side_to_move: Color) -> i32 {
        let h = self.weights.hidden_size;
        let (us, them) = match side_to_move {
            Color::White => (&acc.halves[0], &acc.halves[1]),
            Color::Black => (&acc.halves[1], &acc.halves[0]),
        };

        let mut sum = 0i64;
        for i in 0..h {
            let a = clipped_relu(us[i]);
            sum += i64::from(a) * i64::from(self.weights.output_weights[i]);
        }
        for i in 0..h {
            let a = clipped_relu(them[i]);
            sum += i64::from(a) * i64::from(self.weights.output_weights[h + i]);
        }
        sum += i64::from(self.weights.output_bias);

        let score = (sum * i64::from(SCALE) / i64::from(QA * QB)) as i32;
        score.clamp(-SCORE_LIMIT, SCORE_LIMIT)
    }
}

impl Evaluator for NetworkEvaluator {
    fn evaluate(&mut self, board: &Board) -> i32 {
        let in_sync = self
            .stack
            .last()
            .is_some_and(|acc| acc.hash == board.hash_key());
        if !in_sync {
            // No usable context (search just started, or the stack got out
            // of step): rebuild from the board.
            let acc = self.fresh_accumulator(board);
            self.stack.clear();
            self.stack.push(acc);
        }
        let acc = self.stack.last().expect("stack seeded above");
        self.forward(acc, board.side_to_move())
    }

    fn on_make(&mut self, board: &Board, m: Move, undo: &UndoInfo) {
        let parent = self
            .stack
            .last()
            .filter(|top| top.hash == undo.hash)
            .cloned();
        let acc = match parent {
            Some(mut acc) => {
                self.apply_move(&mut acc, board, m, undo);
                acc
            }
            // Parent unknown; fall back to a full rebuild of the child.
            None => self.fresh_accumulator(board),
        };
        self.stack.push(acc);
    }

    fn on_unmake(&mut self, _board: &Board) {
        self.stack.pop();
    }

    // Null moves leave piece placement untouched; the accumulators carry
    // over and only the perspective chosen at evaluate time changes. The
    // hash does change, so push a relabeled copy to keep the stack aligned.
    fn on_null(&mut self, board: &Board) {
        if let Some(top) = self.stack.last() {
            let mut acc = top.clone();
            acc.hash = board.hash_key();
            self.stack.push(acc);
        }
    }

    fn on_unmake_null(&mut self, _board: &Board) {
        self.stack.pop();
    }

    fn available(&self) -> bool {
        true
    }
}

#[inline]
fn clipped_relu(x: i32) -> i32 {
    x.clamp(0, QA)
}

#[inline]
fn add_feature(half: &mut [i32], weights: &[i16], feature: usize, hidden: usize) {
    let base = feature * hidden;
    for (acc, w) in half.iter_mut().zip(&weights[base..base + hidden]) {
        *acc += i32::from(*w);
    }
}

#[inline]
fn sub_feature(half: &mut [i32], weights: &[i16], feature: usize, hidden: usize) {
    let base = feature * hidden;
    for (acc, w) in half.iter_mut().zip(&weights[base..base + hidden]) {
        *acc -= i32::from(*w);
    }
}

fn read_u32(file: &mut File) -> Result<u32, NetworkError> {
    let mut buf = [0u8; 4];
    file.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32(file: &mut File) -> Result<i32, NetworkError> {
    let mut buf = [0u8; 4];
    file.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_i16_vec(file: &mut File, count: usize) -> Result<Vec<i16>, NetworkError> {
    let mut bytes = vec![0u8; count * 2];
    file.read_exact(&mut bytes)?;
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}
