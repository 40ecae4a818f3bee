//! End-to-end game scenarios and randomized invariants.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use ferz_core::{Color, EngineError, Game, Move};

const TEST_POSITIONS: &[&str] = &[
    "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
    "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
    "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2pP/R2Q1RK1 w kq - 0 1",
    "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
];

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_scholars_mate() {
    let mut game = Game::new();
    game.to_moves("e2e4 e7e5 f1c4 b8c6 d1h5 g8f6 h5f7").unwrap();

    assert!(game.in_check());
    assert!(game.has_ended());
    assert_eq!(game.winner(), Some(Color::White));
    assert_eq!(game.turn(), Color::Black);
    assert_eq!(game.outcome(), -ferz_core::MAX_SCORE);
}

#[test]
fn test_stalemate_scenario() {
    let mut game = Game::from_fen("8/8/8/8/8/4k3/4p3/4K3 w - - 0 1").unwrap();

    assert!(game.legal_moves().is_empty());
    assert!(!game.in_check());
    assert!(game.has_ended());
    assert_eq!(game.winner(), None);
}

#[test]
fn test_insufficient_material_scenario() {
    let mut game = Game::from_fen("k7/8/8/8/8/8/8/K6B w - - 0 1").unwrap();

    assert!(game.has_ended());
    assert_eq!(game.winner(), None);
}

#[test]
fn test_make_unmake_leaves_position_untouched() {
    // Applying and reverting every legal move must restore the hash
    // and the FEN, including the clocks.
    for fen in TEST_POSITIONS {
        let mut game = Game::from_fen(fen).unwrap();
        let hash = game.hash();
        let notation = game.to_fen();
        let length = game.length();

        for mv in game.legal_moves() {
            game.make_move(mv);
            game.unmake();

            assert_eq!(game.hash(), hash, "hash changed after {mv} in {fen}");
            assert_eq!(game.to_fen(), notation, "fen changed after {mv} in {fen}");
            assert_eq!(game.length(), length);
        }
    }
}

#[test]
fn test_castling_clears_rights_and_hash() {
    let mut game = Game::new();
    game.to_moves("e2e4 e7e5 g1f3 g8f6 f1c4 f8c5 e1g1").unwrap();

    let fen = game.to_fen();
    assert!(fen.contains(" kq "), "white rights must be gone: {fen}");

    // The incremental hash must agree with one computed from scratch
    // for the resulting position.
    let fresh = Game::from_fen(&fen).unwrap();
    assert_eq!(game.hash(), fresh.hash());
}

#[test]
fn test_en_passant_not_confused_with_diagonal_push() {
    let mut game =
        Game::from_fen("rnbqkbnr/1ppppppp/8/p7/8/8/PPPPPPPP/RNBQKBNR w KQkq a6 0 2").unwrap();

    let moves = game.legal_moves();
    let notations: Vec<String> = moves.iter().map(|m| m.to_coordinate()).collect();

    assert!(!notations.iter().any(|n| n == "b2a3"));
    assert!(notations.iter().any(|n| n == "b2b3"));
    assert!(notations.iter().any(|n| n == "b2b4"));
    assert!(matches!(game.make("b2a3"), Err(EngineError::IllegalMove(_))));
}

#[test]
fn test_en_passant_capture_and_hash() {
    let mut game = Game::new();
    game.to_moves("e2e4 a7a5 e4e5 a5a4 b2b4").unwrap();

    assert!(game.to_fen().contains(" b3 "), "double push must set the square");

    let mv = game.to_move("a4b3").unwrap();
    assert!(mv.is_passant());
    assert!(game.is_legal(mv));
    game.make_move(mv);

    // The white b-pawn is gone and the incremental hash matches a
    // fresh computation.
    let fen = game.to_fen();
    assert!(fen.starts_with("rnbqkbnr/1ppppppp"), "unexpected position: {fen}");
    assert!(fen.contains("/1p6/"), "capturing pawn must land on b3: {fen}");
    assert_eq!(game.hash(), Game::from_fen(&fen).unwrap().hash());
}

#[test]
fn test_promotion_round_trip() {
    let mut game = Game::from_fen("rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8")
        .unwrap();

    let hash = game.hash();
    let mv = game.to_move("d7c8q").unwrap();
    assert!(mv.is_promotion());
    assert!(mv.is_capture());
    assert!(game.is_legal(mv));

    game.make_move(mv);
    assert!(game.to_fen().starts_with("rnQq1k1r"));
    game.unmake();
    assert_eq!(game.hash(), hash);
}

// =============================================================================
// Boundary behavior
// =============================================================================

#[test]
fn test_malformed_moves_rejected() {
    let mut game = Game::new();

    for notation in ["", "e2", "e2e9", "x2e4", "e2e4qq", "e1g1g"] {
        assert!(
            matches!(game.make(notation), Err(EngineError::MalformedNotation(_))),
            "accepted malformed move: {notation:?}"
        );
    }

    assert_eq!(game.length(), 0, "rejected moves must not change state");
}

#[test]
fn test_illegal_moves_rejected_without_state_change() {
    let mut game = Game::new();
    let fen = game.to_fen();

    for notation in ["e2e5", "e1e2", "b1c4", "e7e5", "0000"] {
        assert!(
            game.make(notation).is_err(),
            "accepted illegal move: {notation}"
        );
    }

    assert_eq!(game.to_fen(), fen);
}

#[test]
fn test_move_list_and_length() {
    let mut game = Game::new();
    let played = ["e2e4", "c7c5", "g1f3"];

    for notation in played {
        game.make(notation).unwrap();
    }

    assert_eq!(game.length(), 3);
    let moves: Vec<String> = game.moves().iter().map(|m| m.to_coordinate()).collect();
    assert_eq!(moves, played);

    game.unmake();
    assert_eq!(game.length(), 2);
    assert!(!game.was_capture());
}

#[test]
fn test_clone_is_independent() {
    let mut game = Game::new();
    game.to_moves("e2e4 e7e5").unwrap();

    let mut clone = game.clone();
    clone.make("g1f3").unwrap();
    clone.unmake();
    clone.unmake();

    assert_eq!(game.length(), 2);
    assert_eq!(
        game.to_fen(),
        "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq e6 0 2"
    );
    assert_eq!(clone.length(), 1);
    assert_eq!(
        clone.to_fen(),
        "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1"
    );
}

#[test]
fn test_score_defers_to_external_scorer() {
    struct PieceCounter;

    impl ferz_core::Scorer for PieceCounter {
        fn score(&self, game: &Game) -> i32 {
            let board = game.board();
            let pieces = (0..64).filter(|&sq| board.piece_at(sq).is_some()).count();
            pieces as i32
        }
    }

    let mut game = Game::new();
    assert_eq!(game.score_with(&PieceCounter), 32);
    assert_eq!(game.score(), 0);

    // Once a draw is claimable the evaluator is bypassed.
    for _ in 0..2 {
        for mv in ["g1f3", "g8f6", "f3g1", "f6g8"] {
            game.make(mv).unwrap();
        }
    }
    assert!(game.is_repetition());
    assert_eq!(game.score_with(&PieceCounter), ferz_core::DRAW_SCORE);
}

// =============================================================================
// Randomized invariants
// =============================================================================

/// Plays random legal games, checking on every ply that the position
/// invariants hold, that the incremental hash matches a recomputation,
/// that make/unmake is the identity, and that the lazy generator agrees
/// with the terminal tests.
#[test]
fn test_random_playout_invariants() {
    let mut rng = SmallRng::seed_from_u64(0xFE52);

    for _ in 0..40 {
        let mut game = Game::new();

        for _ in 0..64 {
            let moves = game.legal_moves();

            assert_eq!(
                game.has_legal_moves(),
                !moves.is_empty(),
                "generator and terminal test disagree at {}",
                game.to_fen()
            );

            if moves.is_empty() || game.has_ended() {
                break;
            }

            // Incremental hash equals a from-scratch computation
            let fen = game.to_fen();
            let fresh = Game::from_fen(&fen).unwrap();
            assert_eq!(game.hash(), fresh.hash(), "hash drift at {fen}");

            // The position invariants hold for every reachable position
            game.board().validate().unwrap_or_else(|e| {
                panic!("invalid reachable position {fen}: {e}");
            });

            // Applying and reverting a random move restores everything
            let mv = moves[rng.gen_range(0..moves.len())];
            let length = game.length();

            game.make_move(mv);
            game.unmake();
            assert_eq!(game.to_fen(), fen, "make/unmake not inverse for {mv}");
            assert_eq!(game.length(), length);

            game.make_move(mv);
        }
    }
}

/// The staged generator must yield exactly the full legal move set at
/// random reachable positions.
#[test]
fn test_random_playout_staged_generator() {
    let mut rng = SmallRng::seed_from_u64(0x5EED);

    for _ in 0..10 {
        let mut game = Game::new();

        for _ in 0..48 {
            let moves = game.legal_moves();
            if moves.is_empty() {
                break;
            }

            let full: std::collections::HashSet<Move> = moves.iter().copied().collect();
            let mut staged = std::collections::HashSet::new();
            while let Some(mv) = game.next_move() {
                assert!(staged.insert(mv), "staged generator repeated {mv}");
            }
            assert_eq!(staged, full, "staged set mismatch at {}", game.to_fen());

            let mv = moves[rng.gen_range(0..moves.len())];
            game.make_move(mv);
        }
    }
}

/// Every generated move must leave the moving side's king unattacked;
/// conversely no pseudo-move outside the list may be legal. The first
/// half is covered by validating the resulting positions, the second by
/// probing the checked boundary with every 4-character move string over
/// occupied origin squares.
#[test]
fn test_generator_completeness_spot_check() {
    let mut game =
        Game::from_fen("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1")
            .unwrap();

    let legal: std::collections::HashSet<String> = game
        .legal_moves()
        .iter()
        .map(|m| m.to_coordinate())
        .collect();

    for from in 0..64usize {
        if game.board().piece_at(from).is_none() {
            continue;
        }
        for to in 0..64usize {
            let notation = format!(
                "{}{}",
                ferz_core::types::sq_to_coord(from),
                ferz_core::types::sq_to_coord(to)
            );
            let accepted = game.make(&notation).is_ok();
            if accepted {
                game.unmake();
            }
            assert_eq!(
                accepted,
                legal.contains(&notation),
                "boundary and generator disagree on {notation}"
            );
        }
    }
}
