//! Iterative-deepening search driver.
//!
//! Depth 1 runs with a full window; deeper iterations open an aspiration
//! window around the previous score and widen on fail-low/high. Each
//! completed iteration reports a [`SearchInfo`] and updates the provisional
//! best move; a stop or timeout discards the partial iteration (except a
//! depth-1 partial result, kept so a bestmove can always be emitted).
//!
//! With more than one thread configured the driver runs Lazy SMP: helper
//! workers iterate independently on clones of the root board, sharing the
//! transposition table and stop conditions, and the main worker's result is
//! authoritative.

pub mod ordering;
pub mod tt;
mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::board::moves::{Move, NULL_MOVE};
use crate::board::Board;
use crate::eval::{build_evaluator, EvalMode, Evaluator, MATE_SCORE};
use crate::movegen::generate_legal;
use crate::search::tt::TranspositionTable;
use crate::search::worker::SearchWorker;

pub const MAX_PLY: usize = 128;

const ASPIRATION_WINDOW: i32 = 50;

#[derive(Debug, Clone, Copy, Default)]
pub struct SearchLimits {
    pub max_depth: Option<u8>,
    pub move_time: Option<Duration>,
}

#[derive(Debug, Clone, Copy)]
pub struct SearchResult {
    pub best_move: Move,
    pub score: i32,
}

/// Per-iteration progress report for UCI `info` lines.
#[derive(Debug, Clone)]
pub struct SearchInfo {
    pub depth: u8,
    pub score: i32,
    pub is_mate: bool,
    /// Signed mate distance in moves; positive when the engine mates.
    pub mate_in: i32,
    pub nodes: u64,
    pub time_ms: u64,
    pub pv: Vec<Move>,
}

impl SearchInfo {
    fn from_score(depth: u8, score: i32, nodes: u64, time_ms: u64, pv: Vec<Move>) -> Self {
        let mate_bound = MATE_SCORE - MAX_PLY as i32;
        let (is_mate, mate_in) = if score > mate_bound {
            (true, (MATE_SCORE - score + 1) / 2)
        } else if score < -mate_bound {
            (true, -((MATE_SCORE + score + 1) / 2))
        } else {
            (false, 0)
        };
        Self {
            depth,
            score,
            is_mate,
            mate_in,
            nodes,
            time_ms,
            pv,
        }
    }
}

/// Walk the transposition table from the root, keeping only moves that are
/// legal in the position reached so far.
pub fn extract_pv(board: &Board, tt: &TranspositionTable, max_len: usize) -> Vec<Move> {
    let mut pv = Vec::new();
    let mut current = board.clone();
    for _ in 0..max_len {
        let Some(entry) = tt.probe(current.hash_key()) else {
            break;
        };
        if entry.best_move == NULL_MOVE {
            break;
        }
        if !generate_legal(&current).contains(entry.best_move) {
            break;
        }
        pv.push(entry.best_move);
        current.make_move(entry.best_move);
    }
    pv
}

/// Single-worker iterative deepening. `game_history` holds the position
/// hashes leading up to the root, for repetition detection.
#[allow(clippy::too_many_arguments)]
fn iterate(
    root: &Board,
    limits: &SearchLimits,
    tt: &TranspositionTable,
    evaluator: &mut dyn Evaluator,
    stop: &AtomicBool,
    secondary_stop: Option<&AtomicBool>,
    game_history: &[u64],
    mut info: Option<&mut dyn FnMut(&SearchInfo)>,
) -> SearchResult {
    let deadline = limits.move_time.map(|t| Instant::now() + t);
    let mut board = root.clone();
    let mut worker = SearchWorker::new(
        root,
        tt,
        evaluator,
        stop,
        secondary_stop,
        deadline,
        game_history,
    );

    let max_depth = limits
        .max_depth
        .unwrap_or(MAX_PLY as u8)
        .clamp(1, MAX_PLY as u8);
    let mate_bound = MATE_SCORE - MAX_PLY as i32;

    let mut best = SearchResult {
        best_move: NULL_MOVE,
        score: 0,
    };

    for depth in 1..=max_depth {
        let (best_move, score) = if depth <= 1 {
            worker.search_root(&mut board, depth, -MATE_SCORE - 1, MATE_SCORE + 1)
        } else {
            // Aspiration: a narrow window around the previous score,
            // widened (and the delta doubled) on each fail.
            let mut delta = ASPIRATION_WINDOW;
            let mut alpha = best.score - delta;
            let mut beta = best.score + delta;
            loop {
                let result = worker.search_root(&mut board, depth, alpha, beta);
                if worker.stopped {
                    break result;
                }
                if result.1 <= alpha {
                    alpha = (alpha - delta).max(-MATE_SCORE - 1);
                    delta *= 2;
                } else if result.1 >= beta {
                    beta = (beta + delta).min(MATE_SCORE + 1);
                    delta *= 2;
                } else {
                    break result;
                }
            }
        };

        if worker.stopped {
            // A partial depth-1 result still beats no move at all.
            if depth == 1 && best_move != NULL_MOVE {
                best = SearchResult { best_move, score };
            }
            break;
        }

        best = SearchResult { best_move, score };

        if let Some(callback) = info.as_mut() {
            let time_ms = worker.start.elapsed().as_millis() as u64;
            let pv = extract_pv(root, tt, depth as usize);
            let report = SearchInfo::from_score(depth, score, worker.nodes, time_ms, pv);
            callback(&report);
        }

        // A proven mate cannot improve with more depth.
        if score > mate_bound || score < -mate_bound {
            break;
        }
    }

    best
}

/// Run a search with `threads` workers sharing `tt` and `stop`.
///
/// Helper workers run the same iterative-deepening loop without reporting;
/// they feed the shared table and are stopped once the main worker returns.
#[allow(clippy::too_many_arguments)]
pub fn run_search(
    root: &Board,
    limits: &SearchLimits,
    tt: &TranspositionTable,
    stop: &AtomicBool,
    game_history: &[u64],
    threads: usize,
    eval_mode: EvalMode,
    info: &mut dyn FnMut(&SearchInfo),
) -> SearchResult {
    tt.new_search();

    let threads = threads.max(1);
    if threads == 1 {
        let mut evaluator = build_evaluator(eval_mode);
        return iterate(
            root,
            limits,
            tt,
            evaluator.as_mut(),
            stop,
            None,
            game_history,
            Some(info),
        );
    }

    let helpers_done = AtomicBool::new(false);
    thread::scope(|scope| {
        for _ in 1..threads {
            let helper_board = root.clone();
            let helpers_done = &helpers_done;
            let history = game_history;
            scope.spawn(move || {
                let mut evaluator = build_evaluator(eval_mode);
                let _ = iterate(
                    &helper_board,
                    limits,
                    tt,
                    evaluator.as_mut(),
                    stop,
                    Some(helpers_done),
                    history,
                    None,
                );
            });
        }

        let mut evaluator = build_evaluator(eval_mode);
        let result = iterate(
            root,
            limits,
            tt,
            evaluator.as_mut(),
            stop,
            None,
            game_history,
            Some(info),
        );
        helpers_done.store(true, Ordering::Relaxed);
        result
    })
}

/// Fixed-depth single-threaded search with the handcrafted evaluator.
pub fn search_depth(board: &Board, depth: u8, tt: &TranspositionTable) -> SearchResult {
    tt.new_search();
    let stop = AtomicBool::new(false);
    let mut evaluator = build_evaluator(EvalMode::Handcrafted);
    iterate(
        board,
        &SearchLimits {
            max_depth: Some(depth),
            move_time: None,
        },
        tt,
        evaluator.as_mut(),
        &stop,
        None,
        &[],
        None,
    )
}

/// Like [`search_depth`] but seeded with a game history for repetition
/// detection.
pub fn search_depth_with_history(
    board: &Board,
    depth: u8,
    tt: &TranspositionTable,
    game_history: &[u64],
) -> SearchResult {
    tt.new_search();
    let stop = AtomicBool::new(false);
    let mut evaluator = build_evaluator(EvalMode::Handcrafted);
    iterate(
        board,
        &SearchLimits {
            max_depth: Some(depth),
            move_time: None,
        },
        tt,
        evaluator.as_mut(),
        &stop,
        None,
        game_history,
        None,
    )
}

// Re-exported for integration points that only need the table.
pub use tt::Bound;

/// Shared handle bundling the table and stop flag between the UCI thread
/// and search workers.
#[derive(Clone)]
pub struct SharedSearch {
    pub tt: Arc<TranspositionTable>,
    pub stop: Arc<AtomicBool>,
}

impl SharedSearch {
    pub fn new(hash_mb: usize) -> Self {
        Self {
            tt: Arc::new(TranspositionTable::new(hash_mb)),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn reset_stop(&self) {
        self.stop.store(false, Ordering::Relaxed);
    }
}
