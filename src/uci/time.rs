//! Time allocation for `go` commands.
//!
//! `movetime` is honored directly minus a fixed overhead. With clock and
//! increment the budget is `time/divisor + 3*inc/4`, divisor being
//! `movestogo` when the GUI supplies it and 30 otherwise, capped so the
//! engine never burns its whole clock on one move. `infinite` or no clock
//! means no limit.

use std::time::Duration;

use crate::board::types::Color;

/// Latency reserve subtracted from every allocation.
pub const MOVE_OVERHEAD_MS: u64 = 50;

/// Parsed `go` arguments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GoParams {
    pub depth: Option<u8>,
    pub movetime_ms: Option<u64>,
    pub wtime_ms: Option<u64>,
    pub btime_ms: Option<u64>,
    pub winc_ms: Option<u64>,
    pub binc_ms: Option<u64>,
    pub movestogo: Option<u64>,
    pub infinite: bool,
}

/// Decide the time budget for this move, `None` meaning unlimited.
pub fn allocate_time(params: &GoParams, side_to_move: Color) -> Option<Duration> {
    if let Some(movetime) = params.movetime_ms {
        return Some(Duration::from_millis(
            movetime.saturating_sub(MOVE_OVERHEAD_MS).max(1),
        ));
    }

    if params.infinite {
        return None;
    }

    let (my_time, my_inc) = match side_to_move {
        Color::White => (params.wtime_ms, params.winc_ms),
        Color::Black => (params.btime_ms, params.binc_ms),
    };
    let my_time = my_time?;
    let my_inc = my_inc.unwrap_or(0);

    let divisor = params.movestogo.unwrap_or(30).max(1);
    let mut limit = my_time / divisor + my_inc * 3 / 4;

    let ceiling = my_time.saturating_sub(MOVE_OVERHEAD_MS);
    if limit > ceiling {
        limit = ceiling;
    }

    Some(Duration::from_millis(limit.max(1)))
}
