//! UCI protocol front end.
//!
//! Reads one command per line on stdin and writes protocol replies to
//! stdout. `go` launches a search worker thread with a cooperative stop
//! flag; `info` lines and the final `bestmove` are emitted by that thread,
//! so a `stop` only has to raise the flag and join. Unknown commands and
//! malformed arguments are ignored, as the protocol expects.

pub mod time;

use std::io::{self, BufRead, Write};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::board::moves::{
    move_from, move_to, move_to_uci, move_type, promotion_type, Move, MoveType,
};
use crate::board::types::PieceType;
use crate::board::{attacks, Board};
use crate::eval::{resolve_mode, EvalMode};
use crate::movegen::generate_legal;
use crate::search::tt::{TranspositionTable, MAX_SIZE_MB, MIN_SIZE_MB};
use crate::search::{run_search, SearchInfo, SearchLimits, SharedSearch};
use crate::uci::time::{allocate_time, GoParams};

const ENGINE_NAME: &str = "Maple Chess";
const ENGINE_AUTHOR: &str = "the Maple Chess developers";

const DEFAULT_HASH_MB: usize = 64;
const MAX_THREADS: usize = 256;

/// Run the blocking stdin/stdout command loop until `quit`.
pub fn run_stdio_loop() -> io::Result<()> {
    // Attack and magic tables are immutable after this point and shared by
    // every search thread.
    attacks::init();

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut state = UciState::new();

    for line in stdin.lock().lines() {
        let line = line?;
        let should_quit = state.handle_command(&line, &mut stdout)?;
        stdout.flush()?;
        if should_quit {
            break;
        }
    }

    state.stop_search();
    Ok(())
}

struct UciState {
    board: Board,
    /// Position hashes of the game line leading to `board`, used to seed
    /// the search repetition stack.
    game_history: Vec<u64>,
    shared: SharedSearch,
    search_thread: Option<JoinHandle<()>>,
    hash_mb: usize,
    threads: usize,
    eval_mode: EvalMode,
}

impl UciState {
    fn new() -> Self {
        let board = Board::start_position();
        let game_history = vec![board.hash_key()];
        Self {
            board,
            game_history,
            shared: SharedSearch::new(DEFAULT_HASH_MB),
            search_thread: None,
            hash_mb: DEFAULT_HASH_MB,
            threads: 1,
            // NNUE is the default; without a usable network this resolves
            // to the handcrafted evaluator with a one-line warning.
            eval_mode: resolve_mode(EvalMode::Nnue),
        }
    }

    fn handle_command(&mut self, line: &str, out: &mut impl Write) -> io::Result<bool> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(false);
        }

        let mut parts = trimmed.split_whitespace();
        let command = parts.next().unwrap_or_default();

        match command {
            "uci" => {
                writeln!(out, "id name {ENGINE_NAME}")?;
                writeln!(out, "id author {ENGINE_AUTHOR}")?;
                writeln!(
                    out,
                    "option name Hash type spin default {DEFAULT_HASH_MB} min {MIN_SIZE_MB} max {MAX_SIZE_MB}"
                )?;
                writeln!(
                    out,
                    "option name Threads type spin default 1 min 1 max {MAX_THREADS}"
                )?;
                writeln!(
                    out,
                    "option name Eval type combo default NNUE var NNUE var Handcrafted"
                )?;
                writeln!(out, "uciok")?;
            }
            "isready" => {
                writeln!(out, "readyok")?;
            }
            "ucinewgame" => {
                self.stop_search();
                self.shared.tt.clear();
                self.board = Board::start_position();
                self.game_history = vec![self.board.hash_key()];
            }
            "position" => {
                // A bad position command leaves the previous state intact.
                if let Err(err) = self.handle_position(trimmed) {
                    writeln!(out, "info string position error: {err}")?;
                }
            }
            "go" => {
                self.stop_search();
                self.handle_go(trimmed);
            }
            "stop" => {
                self.stop_search();
            }
            "setoption" => {
                if let Err(err) = self.handle_setoption(trimmed) {
                    writeln!(out, "info string setoption error: {err}")?;
                }
            }
            "quit" => {
                return Ok(true);
            }
            _ => {
                // Unknown commands are ignored for GUI compatibility.
            }
        }

        Ok(false)
    }

    /// Raise the stop flag and wait for any in-flight search. The worker
    /// prints its bestmove before exiting, preserving output ordering.
    fn stop_search(&mut self) {
        if let Some(handle) = self.search_thread.take() {
            self.shared.request_stop();
            let _ = handle.join();
        }
        self.shared.reset_stop();
    }

    fn handle_position(&mut self, line: &str) -> Result<(), String> {
        let mut tokens = line.split_whitespace().peekable();
        let _ = tokens.next(); // "position"

        let mut board = match tokens.next() {
            Some("startpos") => Board::start_position(),
            Some("fen") => {
                let mut fen_parts = Vec::new();
                while let Some(tok) = tokens.peek() {
                    if *tok == "moves" {
                        break;
                    }
                    fen_parts.push(tokens.next().unwrap_or_default());
                }
                if fen_parts.is_empty() {
                    return Err("missing FEN after 'position fen'".to_owned());
                }
                Board::from_fen(&fen_parts.join(" ")).map_err(|e| e.to_string())?
            }
            Some(other) => return Err(format!("unsupported position token '{other}'")),
            None => return Err("incomplete position command".to_owned()),
        };

        let mut history = vec![board.hash_key()];
        if tokens.peek().copied() == Some("moves") {
            let _ = tokens.next();
            for lan in tokens {
                let m = parse_uci_move(&board, lan)
                    .ok_or_else(|| format!("illegal move '{lan}' in position command"))?;
                board.make_move(m);
                history.push(board.hash_key());
            }
        }

        self.board = board;
        self.game_history = history;
        Ok(())
    }

    fn handle_setoption(&mut self, line: &str) -> Result<(), String> {
        let mut tokens = line.split_whitespace();
        let _ = tokens.next(); // "setoption"

        let mut name_tokens = Vec::new();
        let mut value_tokens = Vec::new();
        let mut mode = "";
        for tok in tokens {
            match tok {
                "name" => mode = "name",
                "value" => mode = "value",
                _ if mode == "name" => name_tokens.push(tok),
                _ if mode == "value" => value_tokens.push(tok),
                _ => {}
            }
        }
        let name = name_tokens.join(" ");
        let value = value_tokens.join(" ");

        if name.eq_ignore_ascii_case("Hash") {
            let parsed = value
                .parse::<usize>()
                .map_err(|_| format!("invalid Hash value '{value}'"))?;
            // Out-of-range sizes are clamped silently; reallocation happens
            // only between searches.
            self.stop_search();
            self.hash_mb = parsed.clamp(MIN_SIZE_MB, MAX_SIZE_MB);
            self.shared.tt = Arc::new(TranspositionTable::new(self.hash_mb));
        } else if name.eq_ignore_ascii_case("Threads") {
            let parsed = value
                .parse::<usize>()
                .map_err(|_| format!("invalid Threads value '{value}'"))?;
            self.threads = parsed.clamp(1, MAX_THREADS);
        } else if name.eq_ignore_ascii_case("Eval") {
            let requested =
                EvalMode::parse(&value).ok_or_else(|| format!("unknown Eval value '{value}'"))?;
            self.eval_mode = resolve_mode(requested);
        }
        // Unknown option names are ignored.

        Ok(())
    }

    fn handle_go(&mut self, line: &str) {
        let params = parse_go_params(line);
        let limits = SearchLimits {
            max_depth: params.depth,
            move_time: allocate_time(&params, self.board.side_to_move()),
        };

        let board = self.board.clone();
        let history = self.game_history.clone();
        let tt = Arc::clone(&self.shared.tt);
        let stop = Arc::clone(&self.shared.stop);
        stop.store(false, Ordering::Relaxed);
        let threads = self.threads;
        let eval_mode = self.eval_mode;

        self.search_thread = Some(std::thread::spawn(move || {
            let mut print_info = |info: &SearchInfo| {
                let mut line = format!("info depth {}", info.depth);
                if info.is_mate {
                    line.push_str(&format!(" score mate {}", info.mate_in));
                } else {
                    line.push_str(&format!(" score cp {}", info.score));
                }
                line.push_str(&format!(" nodes {} time {}", info.nodes, info.time_ms));
                if info.time_ms > 0 {
                    line.push_str(&format!(" nps {}", info.nodes * 1000 / info.time_ms));
                }
                line.push_str(&format!(" hashfull {}", tt.hashfull_permille(1000)));
                if !info.pv.is_empty() {
                    line.push_str(" pv");
                    for m in &info.pv {
                        line.push(' ');
                        line.push_str(&move_to_uci(*m));
                    }
                }
                println!("{line}");
            };

            let result = run_search(
                &board,
                &limits,
                &tt,
                &stop,
                &history,
                threads,
                eval_mode,
                &mut print_info,
            );

            println!("bestmove {}", move_to_uci(result.best_move));
            let _ = io::stdout().flush();
        }));
    }
}

fn parse_go_params(line: &str) -> GoParams {
    let mut params = GoParams::default();
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let mut i = 0usize;
    while i < tokens.len() {
        match tokens[i] {
            "depth" => {
                i += 1;
                params.depth = tokens.get(i).and_then(|t| t.parse().ok());
            }
            "movetime" => {
                i += 1;
                params.movetime_ms = tokens.get(i).and_then(|t| t.parse().ok());
            }
            "wtime" => {
                i += 1;
                params.wtime_ms = tokens.get(i).and_then(|t| t.parse().ok());
            }
            "btime" => {
                i += 1;
                params.btime_ms = tokens.get(i).and_then(|t| t.parse().ok());
            }
            "winc" => {
                i += 1;
                params.winc_ms = tokens.get(i).and_then(|t| t.parse().ok());
            }
            "binc" => {
                i += 1;
                params.binc_ms = tokens.get(i).and_then(|t| t.parse().ok());
            }
            "movestogo" => {
                i += 1;
                params.movestogo = tokens.get(i).and_then(|t| t.parse().ok());
            }
            "infinite" => {
                params.infinite = true;
            }
            _ => {}
        }
        i += 1;
    }
    params
}

/// Parse a UCI move like `e2e4` or `e7e8q` against the legal moves of
/// `board`. Castling arrives as a king move, en passant as a pawn move to
/// the en-passant square.
pub fn parse_uci_move(board: &Board, text: &str) -> Option<Move> {
    let bytes = text.as_bytes();
    if bytes.len() < 4 {
        return None;
    }

    let from = crate::board::types::parse_square(text.get(0..2)?)?;
    let to = crate::board::types::parse_square(text.get(2..4)?)?;

    let promo = if bytes.len() >= 5 {
        Some(match bytes[4] {
            b'n' => PieceType::Knight,
            b'b' => PieceType::Bishop,
            b'r' => PieceType::Rook,
            b'q' => PieceType::Queen,
            _ => return None,
        })
    } else {
        None
    };

    let legal = generate_legal(board);
    legal.iter().copied().find(|&m| {
        if move_from(m) != from || move_to(m) != to {
            return false;
        }
        if move_type(m) == MoveType::Promotion {
            promo == Some(promotion_type(m))
        } else {
            promo.is_none()
        }
    })
}
