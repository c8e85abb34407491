//! Legal move generation and terminal-state detection.
//!
//! Generation is pseudo-legal by piece type, then filtered by making each
//! move on a scratch board and rejecting those that leave the mover's king
//! attacked. Castling legality (empty path, no attacked transit squares) is
//! checked during generation.

pub mod perft;

use crate::board::attacks;
use crate::board::bitboard::{pop_lsb, square_bb, Bitboard, FILE_MASKS, RANK_MASKS};
use crate::board::moves::{
    make_move, make_move_typed, make_promotion, Move, MoveList, MoveType,
};
use crate::board::types::{
    make_square, CastlingRights, Color, PieceType, Square, CASTLE_BLACK_KINGSIDE,
    CASTLE_BLACK_QUEENSIDE, CASTLE_WHITE_KINGSIDE, CASTLE_WHITE_QUEENSIDE,
};
use crate::board::Board;

/// How a finished position ended, if it has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameTermination {
    None,
    Checkmate,
    Stalemate,
    FiftyMoveRule,
}

fn generate_pawn_moves(board: &Board, moves: &mut MoveList) {
    let us = board.side_to_move();
    let them = us.opposite();
    let occ = board.all_pieces();
    let enemy = board.color_pieces(them);
    let pawns = board.pieces(us, PieceType::Pawn);

    let (push_dir, promo_rank): (i16, Bitboard) = match us {
        Color::White => (8, RANK_MASKS[7]),
        Color::Black => (-8, RANK_MASKS[0]),
    };

    let single_push = match us {
        Color::White => pawns << 8,
        Color::Black => pawns >> 8,
    } & !occ;

    // The double push passes through the single-push square, so it is
    // derived from the already-filtered single pushes.
    let double_push = match us {
        Color::White => (single_push & RANK_MASKS[2]) << 8,
        Color::Black => (single_push & RANK_MASKS[5]) >> 8,
    } & !occ;

    let mut push_no_promo = single_push & !promo_rank;
    while push_no_promo != 0 {
        let to = pop_lsb(&mut push_no_promo);
        let from = (to as i16 - push_dir) as Square;
        moves.push(make_move(from, to));
    }

    let mut push_promo = single_push & promo_rank;
    while push_promo != 0 {
        let to = pop_lsb(&mut push_promo);
        let from = (to as i16 - push_dir) as Square;
        push_promotions(moves, from, to);
    }

    let mut doubles = double_push;
    while doubles != 0 {
        let to = pop_lsb(&mut doubles);
        let from = (to as i16 - 2 * push_dir) as Square;
        moves.push(make_move(from, to));
    }

    let (left_cap, right_cap, left_delta, right_delta): (Bitboard, Bitboard, i16, i16) = match us {
        Color::White => (
            (pawns & !FILE_MASKS[0]) << 7,
            (pawns & !FILE_MASKS[7]) << 9,
            7,
            9,
        ),
        Color::Black => (
            (pawns & !FILE_MASKS[7]) >> 7,
            (pawns & !FILE_MASKS[0]) >> 9,
            -7,
            -9,
        ),
    };

    for (cap, delta) in [(left_cap, left_delta), (right_cap, right_delta)] {
        let mut no_promo = cap & enemy & !promo_rank;
        while no_promo != 0 {
            let to = pop_lsb(&mut no_promo);
            let from = (to as i16 - delta) as Square;
            moves.push(make_move(from, to));
        }
        let mut promo = cap & enemy & promo_rank;
        while promo != 0 {
            let to = pop_lsb(&mut promo);
            let from = (to as i16 - delta) as Square;
            push_promotions(moves, from, to);
        }
    }

    if let Some(ep) = board.en_passant_square() {
        // Pawns that could capture toward the en-passant square are exactly
        // those a pawn of the opposite color on that square would attack.
        let mut ep_attackers = attacks::pawn_attacks(them, ep) & pawns;
        while ep_attackers != 0 {
            let from = pop_lsb(&mut ep_attackers);
            moves.push(make_move_typed(from, ep, MoveType::EnPassant));
        }
    }
}

#[inline]
fn push_promotions(moves: &mut MoveList, from: Square, to: Square) {
    moves.push(make_promotion(from, to, PieceType::Queen));
    moves.push(make_promotion(from, to, PieceType::Rook));
    moves.push(make_promotion(from, to, PieceType::Bishop));
    moves.push(make_promotion(from, to, PieceType::Knight));
}

fn generate_piece_moves(board: &Board, moves: &mut MoveList) {
    let us = board.side_to_move();
    let own = board.color_pieces(us);
    let occ = board.all_pieces();

    let mut knights = board.pieces(us, PieceType::Knight);
    while knights != 0 {
        let from = pop_lsb(&mut knights);
        push_targets(moves, from, attacks::knight_attacks(from) & !own);
    }

    let mut bishops = board.pieces(us, PieceType::Bishop);
    while bishops != 0 {
        let from = pop_lsb(&mut bishops);
        push_targets(moves, from, attacks::bishop_attacks(from, occ) & !own);
    }

    let mut rooks = board.pieces(us, PieceType::Rook);
    while rooks != 0 {
        let from = pop_lsb(&mut rooks);
        push_targets(moves, from, attacks::rook_attacks(from, occ) & !own);
    }

    let mut queens = board.pieces(us, PieceType::Queen);
    while queens != 0 {
        let from = pop_lsb(&mut queens);
        push_targets(moves, from, attacks::queen_attacks(from, occ) & !own);
    }

    let king_sq = board.king_square(us);
    push_targets(moves, king_sq, attacks::king_attacks(king_sq) & !own);

    generate_castling_moves(board, moves);
}

#[inline]
fn push_targets(moves: &mut MoveList, from: Square, mut targets: Bitboard) {
    while targets != 0 {
        let to = pop_lsb(&mut targets);
        moves.push(make_move(from, to));
    }
}

fn generate_castling_moves(board: &Board, moves: &mut MoveList) {
    let us = board.side_to_move();
    let them = us.opposite();
    let occ = board.all_pieces();
    let rights = board.castling_rights();

    let (kingside, queenside, back_rank): (CastlingRights, CastlingRights, u8) = match us {
        Color::White => (CASTLE_WHITE_KINGSIDE, CASTLE_WHITE_QUEENSIDE, 0),
        Color::Black => (CASTLE_BLACK_KINGSIDE, CASTLE_BLACK_QUEENSIDE, 7),
    };

    let e_sq = make_square(4, back_rank);
    // Kingside: f and g must be empty; e, f, g must be unattacked.
    if rights & kingside != 0 {
        let f_sq = make_square(5, back_rank);
        let g_sq = make_square(6, back_rank);
        if occ & (square_bb(f_sq) | square_bb(g_sq)) == 0
            && !board.is_square_attacked(e_sq, them)
            && !board.is_square_attacked(f_sq, them)
            && !board.is_square_attacked(g_sq, them)
        {
            moves.push(make_move_typed(e_sq, g_sq, MoveType::Castling));
        }
    }
    // Queenside: b, c, d must be empty; e, d, c must be unattacked.
    if rights & queenside != 0 {
        let b_sq = make_square(1, back_rank);
        let c_sq = make_square(2, back_rank);
        let d_sq = make_square(3, back_rank);
        if occ & (square_bb(b_sq) | square_bb(c_sq) | square_bb(d_sq)) == 0
            && !board.is_square_attacked(e_sq, them)
            && !board.is_square_attacked(d_sq, them)
            && !board.is_square_attacked(c_sq, them)
        {
            moves.push(make_move_typed(e_sq, c_sq, MoveType::Castling));
        }
    }
}

/// All pseudo-legal moves for the side to move. May leave the king in check.
pub fn generate_pseudo_legal(board: &Board) -> MoveList {
    let mut moves = MoveList::new();
    generate_pawn_moves(board, &mut moves);
    generate_piece_moves(board, &mut moves);
    moves
}

/// All legal moves for the side to move.
pub fn generate_legal(board: &Board) -> MoveList {
    let pseudo = generate_pseudo_legal(board);
    let us = board.side_to_move();
    let them = us.opposite();

    let mut scratch = board.clone();
    let mut legal = MoveList::new();
    for &m in pseudo.iter() {
        let undo = scratch.make_move(m);
        if !scratch.is_square_attacked(scratch.king_square(us), them) {
            legal.push(m);
        }
        scratch.unmake_move(m, &undo);
    }
    legal
}

/// Is the side to move in check?
#[inline]
pub fn in_check(board: &Board) -> bool {
    let us = board.side_to_move();
    board.is_square_attacked(board.king_square(us), us.opposite())
}

pub fn is_checkmate(board: &Board) -> bool {
    in_check(board) && generate_legal(board).is_empty()
}

pub fn is_stalemate(board: &Board) -> bool {
    !in_check(board) && generate_legal(board).is_empty()
}

#[inline]
pub fn is_draw_by_fifty_move_rule(board: &Board) -> bool {
    board.halfmove_clock() >= 100
}

pub fn game_termination(board: &Board) -> GameTermination {
    if generate_legal(board).is_empty() {
        return if in_check(board) {
            GameTermination::Checkmate
        } else {
            GameTermination::Stalemate
        };
    }
    if is_draw_by_fifty_move_rule(board) {
        return GameTermination::FiftyMoveRule;
    }
    GameTermination::None
}

/// Does `m` capture something (including en passant)?
#[inline]
pub fn is_capture(board: &Board, m: Move) -> bool {
    board.piece_on(crate::board::moves::move_to(m)).is_some()
        || crate::board::moves::move_type(m) == MoveType::EnPassant
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::moves::{move_to_uci, move_type};
    use crate::board::types::parse_square;

    fn legal_uci(board: &Board) -> Vec<String> {
        generate_legal(board).iter().map(|m| move_to_uci(*m)).collect()
    }

    #[test]
    fn start_position_has_twenty_moves() {
        let board = Board::start_position();
        assert_eq!(generate_legal(&board).len(), 20);
    }

    #[test]
    fn pinned_piece_may_not_move() {
        // The e-file knight is pinned against the king by the rook.
        let board = Board::from_fen("4r2k/8/8/8/8/4N3/8/4K3 w - - 0 1")
            .expect("FEN should parse");
        let moves = legal_uci(&board);
        assert!(moves.iter().all(|m| !m.starts_with("e3")), "knight is pinned: {moves:?}");
    }

    #[test]
    fn en_passant_is_generated_and_flagged() {
        let board =
            Board::from_fen("rnbqkbnr/ppp1p1pp/8/3pPp2/8/8/PPPP1PPP/RNBQKBNR w KQkq f6 0 3")
                .expect("FEN should parse");
        let moves = generate_legal(&board);
        let ep = moves
            .iter()
            .find(|m| move_to_uci(**m) == "e5f6" && move_type(**m) == MoveType::EnPassant);
        assert!(ep.is_some(), "expected en passant e5f6 in {:?}", moves);
    }

    #[test]
    fn en_passant_that_exposes_king_is_rejected() {
        // Capturing en passant removes both rank-5 pawns and exposes the
        // white king to the rook on h5.
        let board = Board::from_fen("4k3/8/8/K2Pp2r/8/8/8/8 w - e6 0 1")
            .expect("FEN should parse");
        let moves = legal_uci(&board);
        assert!(
            !moves.contains(&"d5e6".to_owned()),
            "en passant must be rejected when it exposes the king: {moves:?}"
        );
    }

    #[test]
    fn castling_requires_empty_and_unattacked_path() {
        // All rights, clear ranks: both castlings available.
        let board = Board::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1")
            .expect("FEN should parse");
        let moves = legal_uci(&board);
        assert!(moves.contains(&"e1g1".to_owned()));
        assert!(moves.contains(&"e1c1".to_owned()));

        // Enemy rook covering f1 forbids kingside castling only.
        let board = Board::from_fen("r3k2r/8/8/8/8/5r2/8/R3K2R w KQkq - 0 1")
            .expect("FEN should parse");
        let moves = legal_uci(&board);
        assert!(!moves.contains(&"e1g1".to_owned()));
        assert!(moves.contains(&"e1c1".to_owned()));

        // King in check: neither castling is available.
        let board = Board::from_fen("r3k2r/8/8/8/8/4r3/8/R3K2R w KQkq - 0 1")
            .expect("FEN should parse");
        let moves = legal_uci(&board);
        assert!(!moves.contains(&"e1g1".to_owned()));
        assert!(!moves.contains(&"e1c1".to_owned()));

        // Blocked queenside path forbids queenside castling only.
        let board = Board::from_fen("r3k2r/8/8/8/8/8/8/RN2K2R w KQkq - 0 1")
            .expect("FEN should parse");
        let moves = legal_uci(&board);
        assert!(moves.contains(&"e1g1".to_owned()));
        assert!(!moves.contains(&"e1c1".to_owned()));
    }

    #[test]
    fn promotions_produce_four_moves_each() {
        let board = Board::from_fen("4k3/P7/8/8/8/8/8/4K3 w - - 0 1").expect("FEN should parse");
        let moves = legal_uci(&board);
        for promo in ["a7a8q", "a7a8r", "a7a8b", "a7a8n"] {
            assert!(moves.contains(&promo.to_owned()), "missing {promo} in {moves:?}");
        }
    }

    #[test]
    fn checkmate_and_stalemate_detection() {
        // Back-rank mate, rook out of the king's reach.
        let mated = Board::from_fen("R5k1/5ppp/8/8/8/8/8/K7 b - - 0 1").expect("FEN should parse");
        assert!(is_checkmate(&mated));
        assert!(!is_stalemate(&mated));

        // Classic king + queen stalemate.
        let stale = Board::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").expect("FEN should parse");
        assert!(is_stalemate(&stale));
        assert!(!is_checkmate(&stale));
    }

    #[test]
    fn fifty_move_rule_threshold() {
        let fresh = Board::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 99 1").expect("FEN should parse");
        assert!(!is_draw_by_fifty_move_rule(&fresh));
        let done = Board::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 100 1").expect("FEN should parse");
        assert!(is_draw_by_fifty_move_rule(&done));
        assert_eq!(game_termination(&done), GameTermination::FiftyMoveRule);
    }

    #[test]
    fn in_check_matches_attack_query() {
        let board = Board::from_fen("4k3/8/8/8/8/8/4r3/4K3 w - - 0 1").expect("FEN should parse");
        assert!(in_check(&board));
        let sq = parse_square("e1").expect("square");
        assert!(board.is_square_attacked(sq, Color::Black));
    }

    /// Check the representation invariants that must hold on every
    /// reachable position.
    fn assert_board_consistent(board: &Board) {
        use crate::board::bitboard::square_bb;
        use crate::board::types::Piece;

        // Incremental hash agrees with full recomputation.
        assert_eq!(board.hash_key(), board.compute_hash());

        // Piece bitboards partition occupancy and agree with the mailbox.
        let mut union = 0u64;
        for piece_idx in 0..Piece::COUNT {
            for other_idx in piece_idx + 1..Piece::COUNT {
                let a = board.pieces(
                    if piece_idx < 6 { Color::White } else { Color::Black },
                    crate::board::types::PieceType::from_index(piece_idx % 6).expect("index"),
                );
                let b = board.pieces(
                    if other_idx < 6 { Color::White } else { Color::Black },
                    crate::board::types::PieceType::from_index(other_idx % 6).expect("index"),
                );
                assert_eq!(a & b, 0, "bitboards {piece_idx} and {other_idx} overlap");
            }
        }
        for color in [Color::White, Color::Black] {
            let mut color_union = 0u64;
            for pt in crate::board::types::PieceType::ALL {
                color_union |= board.pieces(color, pt);
            }
            assert_eq!(color_union, board.color_pieces(color));
            union |= color_union;
        }
        assert_eq!(union, board.all_pieces());

        for sq in 0..64u8 {
            match board.piece_on(sq) {
                Some(piece) => {
                    assert_ne!(
                        board.pieces(piece.color(), piece.piece_type()) & square_bb(sq),
                        0,
                        "mailbox piece missing from its bitboard on square {sq}"
                    );
                }
                None => assert_eq!(board.all_pieces() & square_bb(sq), 0),
            }
        }

        // One king per side.
        assert_eq!(board.pieces(Color::White, PieceType::King).count_ones(), 1);
        assert_eq!(board.pieces(Color::Black, PieceType::King).count_ones(), 1);

        // The en-passant square sits on the rank behind the double push.
        if let Some(ep) = board.en_passant_square() {
            let rank = crate::board::types::square_rank(ep);
            match board.side_to_move() {
                Color::White => assert_eq!(rank, 5),
                Color::Black => assert_eq!(rank, 2),
            }
        }
    }

    #[test]
    fn random_playouts_preserve_board_invariants() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0xC0FFEE);

        for game in 0..20 {
            let mut board = Board::start_position();
            assert_board_consistent(&board);

            for _ply in 0..60 {
                let moves = generate_legal(&board);
                if moves.is_empty() || is_draw_by_fifty_move_rule(&board) {
                    break;
                }
                let m = moves[rng.random_range(0..moves.len())];

                let before = board.clone();
                let undo = board.make_move(m);
                assert_board_consistent(&board);

                // Unmake restores the position bit-identically.
                let mut replay = board.clone();
                replay.unmake_move(m, &undo);
                assert_eq!(replay, before, "unmake mismatch in game {game}");
                assert_eq!(replay.to_fen(), before.to_fen());

                // Halfmove clock obeys the reset rules.
                if is_capture(&before, m)
                    || before.piece_on(crate::board::moves::move_from(m))
                        .map(|p| p.piece_type())
                        == Some(PieceType::Pawn)
                {
                    assert_eq!(board.halfmove_clock(), 0);
                }
            }
        }
    }

    #[test]
    fn random_playouts_round_trip_fen() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        let mut board = Board::start_position();

        for _ in 0..80 {
            let moves = generate_legal(&board);
            if moves.is_empty() {
                break;
            }
            let m = moves[rng.random_range(0..moves.len())];
            board.make_move(m);

            let fen = board.to_fen();
            let reparsed = Board::from_fen(&fen).expect("generated FEN should parse");
            assert_eq!(reparsed, board);
            assert_eq!(reparsed.to_fen(), fen);
        }
    }
}
