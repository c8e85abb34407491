//! FEN parsing and generation.
//!
//! Six space-separated fields: placement, side to move, castling rights,
//! en-passant square, halfmove clock, fullmove number. Parsing validates the
//! structure and rejects positions without exactly one king per side; the
//! board is left untouched on failure because parsing builds a fresh board.

use thiserror::Error;

use crate::board::board::Board;
use crate::board::types::{
    make_square, parse_square, square_file, square_name, Color, Piece, PieceType,
    CASTLE_BLACK_KINGSIDE, CASTLE_BLACK_QUEENSIDE, CASTLE_WHITE_KINGSIDE, CASTLE_WHITE_QUEENSIDE,
};
use crate::board::zobrist;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FenError {
    #[error("FEN is missing the {0} field")]
    MissingField(&'static str),
    #[error("invalid piece placement: {0}")]
    BadPlacement(String),
    #[error("invalid side-to-move field: {0}")]
    BadSideToMove(String),
    #[error("invalid castling rights field: {0}")]
    BadCastling(String),
    #[error("invalid en-passant field: {0}")]
    BadEnPassant(String),
    #[error("invalid clock field: {0}")]
    BadClock(String),
    #[error("each side must have exactly one king")]
    KingCount,
}

impl Board {
    /// Build a board from a FEN string.
    pub fn from_fen(fen: &str) -> Result<Board, FenError> {
        let mut fields = fen.split_whitespace();
        let placement = fields.next().ok_or(FenError::MissingField("placement"))?;
        let side = fields.next().ok_or(FenError::MissingField("side-to-move"))?;
        let castling = fields.next().ok_or(FenError::MissingField("castling"))?;
        let en_passant = fields.next().ok_or(FenError::MissingField("en-passant"))?;
        let halfmove = fields.next().ok_or(FenError::MissingField("halfmove clock"))?;
        let fullmove = fields.next().ok_or(FenError::MissingField("fullmove number"))?;

        let mut board = Board::new();

        parse_placement(placement, &mut board)?;

        board.side_to_move = match side {
            "w" => Color::White,
            "b" => Color::Black,
            other => return Err(FenError::BadSideToMove(other.to_owned())),
        };

        board.castling = parse_castling(castling)?;

        board.ep_square = if en_passant == "-" {
            None
        } else {
            let sq = parse_square(en_passant)
                .ok_or_else(|| FenError::BadEnPassant(en_passant.to_owned()))?;
            Some(sq)
        };

        board.halfmove_clock = halfmove
            .parse::<u16>()
            .map_err(|_| FenError::BadClock(halfmove.to_owned()))?;
        board.fullmove_number = fullmove
            .parse::<u16>()
            .map_err(|_| FenError::BadClock(fullmove.to_owned()))?;

        for color in [Color::White, Color::Black] {
            if board.pieces(color, PieceType::King).count_ones() != 1 {
                return Err(FenError::KingCount);
            }
        }

        // Rights are only meaningful while the king and the matching rook
        // still sit on their home squares; stray flags are dropped.
        let white_rook = Some(Piece::new(Color::White, PieceType::Rook));
        let black_rook = Some(Piece::new(Color::Black, PieceType::Rook));
        if board.piece_on(4) != Some(Piece::new(Color::White, PieceType::King)) {
            board.castling &= !(CASTLE_WHITE_KINGSIDE | CASTLE_WHITE_QUEENSIDE);
        }
        if board.piece_on(7) != white_rook {
            board.castling &= !CASTLE_WHITE_KINGSIDE;
        }
        if board.piece_on(0) != white_rook {
            board.castling &= !CASTLE_WHITE_QUEENSIDE;
        }
        if board.piece_on(60) != Some(Piece::new(Color::Black, PieceType::King)) {
            board.castling &= !(CASTLE_BLACK_KINGSIDE | CASTLE_BLACK_QUEENSIDE);
        }
        if board.piece_on(63) != black_rook {
            board.castling &= !CASTLE_BLACK_KINGSIDE;
        }
        if board.piece_on(56) != black_rook {
            board.castling &= !CASTLE_BLACK_QUEENSIDE;
        }

        // put_piece already accumulated the piece keys; fold in the
        // remaining hash terms.
        board.hash ^= zobrist::castling_key(board.castling);
        if let Some(ep) = board.ep_square {
            board.hash ^= zobrist::en_passant_file_key(square_file(ep));
        }
        if board.side_to_move == Color::Black {
            board.hash ^= zobrist::side_key();
        }
        debug_assert_eq!(board.hash, board.compute_hash());

        Ok(board)
    }

    /// Emit the position as a FEN string.
    pub fn to_fen(&self) -> String {
        let mut fen = String::new();

        for rank in (0..8).rev() {
            let mut empty = 0u8;
            for file in 0..8 {
                match self.piece_on(make_square(file, rank)) {
                    None => empty += 1,
                    Some(piece) => {
                        if empty > 0 {
                            fen.push((b'0' + empty) as char);
                            empty = 0;
                        }
                        fen.push(piece.to_fen_char());
                    }
                }
            }
            if empty > 0 {
                fen.push((b'0' + empty) as char);
            }
            if rank > 0 {
                fen.push('/');
            }
        }

        fen.push(' ');
        fen.push(match self.side_to_move() {
            Color::White => 'w',
            Color::Black => 'b',
        });

        fen.push(' ');
        if self.castling_rights() == 0 {
            fen.push('-');
        } else {
            if self.castling_rights() & CASTLE_WHITE_KINGSIDE != 0 {
                fen.push('K');
            }
            if self.castling_rights() & CASTLE_WHITE_QUEENSIDE != 0 {
                fen.push('Q');
            }
            if self.castling_rights() & CASTLE_BLACK_KINGSIDE != 0 {
                fen.push('k');
            }
            if self.castling_rights() & CASTLE_BLACK_QUEENSIDE != 0 {
                fen.push('q');
            }
        }

        fen.push(' ');
        match self.en_passant_square() {
            None => fen.push('-'),
            Some(ep) => fen.push_str(&square_name(ep)),
        }

        fen.push_str(&format!(
            " {} {}",
            self.halfmove_clock(),
            self.fullmove_number()
        ));

        fen
    }
}

fn parse_placement(placement: &str, board: &mut Board) -> Result<(), FenError> {
    let ranks: Vec<&str> = placement.split('/').collect();
    if ranks.len() != 8 {
        return Err(FenError::BadPlacement(
            "placement must contain 8 ranks".to_owned(),
        ));
    }

    for (fen_rank_idx, rank_str) in ranks.iter().enumerate() {
        let rank = 7 - fen_rank_idx as u8;
        let mut file = 0u8;

        for ch in rank_str.chars() {
            if let Some(step) = ch.to_digit(10) {
                if !(1..=8).contains(&step) {
                    return Err(FenError::BadPlacement(format!(
                        "invalid empty-square count '{ch}'"
                    )));
                }
                file += step as u8;
                continue;
            }

            let piece = Piece::from_fen_char(ch)
                .ok_or_else(|| FenError::BadPlacement(format!("invalid piece character '{ch}'")))?;
            if file >= 8 {
                return Err(FenError::BadPlacement(format!(
                    "rank '{rank_str}' has too many files"
                )));
            }
            board.put_piece(piece, make_square(file, rank));
            file += 1;
        }

        if file != 8 {
            return Err(FenError::BadPlacement(format!(
                "rank '{rank_str}' does not sum to 8 files"
            )));
        }
    }

    Ok(())
}

fn parse_castling(castling: &str) -> Result<u8, FenError> {
    if castling == "-" {
        return Ok(0);
    }
    let mut rights = 0u8;
    for ch in castling.chars() {
        rights |= match ch {
            'K' => CASTLE_WHITE_KINGSIDE,
            'Q' => CASTLE_WHITE_QUEENSIDE,
            'k' => CASTLE_BLACK_KINGSIDE,
            'q' => CASTLE_BLACK_QUEENSIDE,
            _ => return Err(FenError::BadCastling(castling.to_owned())),
        };
    }
    Ok(rights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::board::START_FEN;

    #[test]
    fn start_position_round_trips() {
        let board = Board::from_fen(START_FEN).expect("start FEN should parse");
        assert_eq!(board.to_fen(), START_FEN);
    }

    #[test]
    fn canonical_fens_round_trip() {
        let fens = [
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1",
            "4k3/8/8/8/8/8/8/4K3 w - - 42 99",
            "r2q1rk1/pP1p2pp/Q4n2/bbp1p3/Np6/1B3NBn/pPPP1PPP/R3K2R b KQ - 0 1",
        ];
        for fen in fens {
            let board = Board::from_fen(fen).expect("FEN should parse");
            assert_eq!(board.to_fen(), fen, "round trip failed for {fen}");
            assert_eq!(board.hash_key(), board.compute_hash());
        }
    }

    #[test]
    fn rejects_malformed_fens() {
        // Too few ranks.
        assert!(Board::from_fen("8/8/8/8/8/8/8 w - - 0 1").is_err());
        // Rank does not sum to 8.
        assert!(Board::from_fen("9/8/8/8/8/8/8/8 w - - 0 1").is_err());
        // Unknown piece letter.
        assert!(Board::from_fen("xnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1").is_err());
        // Bad side to move.
        assert!(Board::from_fen("4k3/8/8/8/8/8/8/4K3 x - - 0 1").is_err());
        // Bad castling char.
        assert!(Board::from_fen("4k3/8/8/8/8/8/8/4K3 w X - 0 1").is_err());
        // Bad en-passant square.
        assert!(Board::from_fen("4k3/8/8/8/8/8/8/4K3 w - z9 0 1").is_err());
        // Missing clocks.
        assert!(Board::from_fen("4k3/8/8/8/8/8/8/4K3 w - -").is_err());
        // No kings.
        assert!(Board::from_fen("8/8/8/8/8/8/8/8 w - - 0 1").is_err());
        // Two white kings.
        assert!(Board::from_fen("4k3/8/8/8/8/8/8/2K1K3 w - - 0 1").is_err());
    }

    #[test]
    fn stray_castling_rights_are_dropped() {
        // Kings displaced: all rights vanish despite the KQkq field.
        let board = Board::from_fen("r2k3r/8/8/8/8/8/8/R2K3R w KQkq - 0 1")
            .expect("FEN should parse");
        assert_eq!(board.castling_rights(), 0);

        // Only the rook-side flag whose rook is missing is dropped.
        let board = Board::from_fen("r3k2r/8/8/8/8/8/8/R3K3 w KQkq - 0 1")
            .expect("FEN should parse");
        assert_eq!(
            board.castling_rights(),
            crate::board::types::CASTLE_WHITE_QUEENSIDE
                | crate::board::types::CASTLE_BLACK_KINGSIDE
                | crate::board::types::CASTLE_BLACK_QUEENSIDE
        );
    }

    #[test]
    fn missing_field_errors_name_the_field() {
        assert_eq!(
            Board::from_fen(""),
            Err(FenError::MissingField("placement"))
        );
        assert_eq!(
            Board::from_fen("4k3/8/8/8/8/8/8/4K3"),
            Err(FenError::MissingField("side-to-move"))
        );
    }
}
