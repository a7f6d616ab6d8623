//! Integration tests for the board, rules and game record.
//!
//! Randomized tests drive games with a seeded RNG so failures reproduce.

use michi_zero::board::{Board, Color, Square};
use michi_zero::constants::{NO_VERTEX, PASS, Vertex};
use michi_zero::game::GameState;
use michi_zero::playout::mcplayout;
use michi_zero::position::{MoveError, Position};

// =============================================================================
// Helper functions for setting up test positions
// =============================================================================

/// Play `(color, vertex)` text pairs on a fresh game.
fn setup_game(size: usize, moves: &[(&str, &str)]) -> GameState {
    let mut game = GameState::new(size, 7.5);
    for (color, vertex) in moves {
        game.play_text(color, vertex)
            .unwrap_or_else(|err| panic!("{color} {vertex}: {err}"));
    }
    game
}

/// A uniformly random legal move for the side to move, or pass.
fn random_legal_move(position: &Position, rng: &mut fastrand::Rng) -> Vertex {
    let color = position.to_move();
    let mut candidates: Vec<Vertex> = position
        .board
        .empty_intersections()
        .filter(|&v| position.is_move_legal(color, v))
        .collect();
    candidates.sort_unstable();
    if candidates.is_empty() || rng.u32(0..20) == 0 {
        return PASS;
    }
    candidates[rng.usize(0..candidates.len())]
}

// =============================================================================
// Hash consistency
// =============================================================================

#[test]
fn test_incremental_hash_matches_recomputation() {
    let mut rng = fastrand::Rng::with_seed(17);
    for size in [5, 7, 9] {
        let mut position = Position::new(size, 7.5);
        for _ in 0..150 {
            let mv = random_legal_move(&position, &mut rng);
            position.play_move(mv);
            assert_eq!(position.hash(), position.compute_hash(), "size {size}");
            assert_eq!(position.ko_hash(), position.board.compute_hash_ko());
            if position.passes() >= 2 {
                position.reset_game();
            }
        }
    }
}

#[test]
fn test_same_stones_different_side_to_move_hash_differently() {
    let mut a = Position::new(9, 7.5);
    let mut b = Position::new(9, 7.5);
    let d4 = a.board.text_to_move("D4");
    a.play_move(d4);
    b.play_move(d4);
    b.play_move(PASS);
    b.play_move(PASS);
    assert_eq!(a.ko_hash(), b.ko_hash());
    assert_ne!(a.hash(), b.hash());
}

#[test]
fn test_symmetric_positions_share_symmetry_hashes() {
    let mut a = Position::new(9, 7.5);
    let mut b = Position::new(9, 7.5);
    a.play_move(a.board.text_to_move("C3"));
    b.play_move(b.board.text_to_move("G7"));

    let hashes_a: Vec<u64> = (0..8).map(|s| a.get_symmetry_hash(s)).collect();
    assert!(hashes_a.contains(&b.hash()));
}

// =============================================================================
// Captures, ko and suicide
// =============================================================================

#[test]
fn test_capture_group_in_corner() {
    let game = setup_game(
        5,
        &[("b", "A1"), ("w", "A2"), ("b", "B1"), ("w", "B2"), ("b", "E5"), ("w", "C1")],
    );
    let board = game.board();
    assert_eq!(board.get_state(board.text_to_move("A1")), Square::Empty);
    assert_eq!(board.get_state(board.text_to_move("B1")), Square::Empty);
    assert_eq!(board.prisoners(Color::White), 2);
}

#[test]
fn test_simple_ko_cannot_be_retaken_immediately() {
    let mut game = setup_game(
        5,
        &[
            ("b", "B3"),
            ("w", "C3"),
            ("b", "C4"),
            ("w", "D4"),
            ("b", "C2"),
            ("w", "D2"),
            ("b", "A1"),
            ("w", "E3"),
            ("b", "D3"),
        ],
    );
    let c3 = game.board().text_to_move("C3");
    assert_eq!(game.board().get_state(c3), Square::Empty);
    assert_eq!(game.board().prisoners(Color::Black), 1);
    assert_eq!(game.play_text("w", "C3"), Err(MoveError::Ko));

    // After an exchange elsewhere the ko may be retaken.
    game.play_text("w", "A5").unwrap();
    game.play_text("b", "B5").unwrap();
    assert_eq!(game.play_text("w", "C3"), Ok(()));
    let d3 = game.board().text_to_move("D3");
    assert_eq!(game.board().get_state(d3), Square::Empty);
}

#[test]
fn test_suicide_rejected_without_changing_state() {
    let mut game = setup_game(5, &[("b", "A2"), ("w", "E5"), ("b", "B1")]);
    let before = game.hash();
    assert_eq!(game.play_text("w", "A1"), Err(MoveError::Suicide));
    assert_eq!(game.hash(), before);
    assert_eq!(game.move_number(), 3);
}

#[test]
fn test_ko_recapture_would_repeat_position() {
    let game = setup_game(
        5,
        &[
            ("b", "B3"),
            ("w", "C3"),
            ("b", "C4"),
            ("w", "D4"),
            ("b", "C2"),
            ("w", "D2"),
            ("b", "A1"),
            ("w", "E3"),
            ("b", "D3"),
        ],
    );
    let state = game.state();
    let board = &state.position().board;
    assert!(state.would_repeat(Color::White, board.text_to_move("C3")));
    assert!(!state.would_repeat(Color::White, board.text_to_move("A5")));
    assert!(!state.super_ko());
}

// =============================================================================
// Eyes and scoring
// =============================================================================

#[test]
fn test_corner_eye() {
    let game = setup_game(5, &[("b", "A2"), ("w", "E5"), ("b", "B1"), ("w", "E4"), ("b", "B2")]);
    let board = game.board();
    let a1 = board.text_to_move("A1");
    assert!(board.is_eye(a1, Color::Black));
    assert!(!board.is_eye(a1, Color::White));
}

#[test]
fn test_playout_leaves_scoreable_board() {
    let mut rng = fastrand::Rng::with_seed(3);
    for _ in 0..5 {
        let mut position = Position::new(7, 7.5);
        let score = mcplayout(&mut position, &mut rng);

        let board = &position.board;
        let black = board.compute_reach_color(Color::Black) as f32;
        let white = board.compute_reach_color(Color::White) as f32;
        assert!(black + white >= (49 - board.empty_count()) as f32);
        assert!(black <= 49.0 && white <= 49.0);
        assert_eq!(board.area_score(7.5), black - white - 7.5);
        assert!(score.abs() <= 49.0 + 7.5);
    }
}

// =============================================================================
// Move text
// =============================================================================

#[test]
fn test_text_round_trip_every_vertex() {
    for size in [2, 5, 9] {
        let board = Board::new(size);
        for v in board.vertices() {
            assert_eq!(board.text_to_move(&board.move_to_text(v)), v);
            assert_eq!(board.text_to_move_sgf(&board.move_to_text_sgf(v)), v);
        }
        assert_eq!(board.text_to_move("pass"), PASS);
        assert_eq!(board.text_to_move_sgf("tt"), PASS);
    }
}

#[test]
fn test_malformed_text_is_rejected() {
    let board = Board::new(9);
    for text in ["", "I5", "Z1", "A0", "A10", "44", "A"] {
        assert_eq!(board.text_to_move(text), NO_VERTEX, "{text:?}");
    }
}

// =============================================================================
// Game record
// =============================================================================

#[test]
fn test_undo_forward_restores_hashes() {
    let mut rng = fastrand::Rng::with_seed(99);
    let mut game = GameState::new(9, 7.5);
    let mut hashes = vec![game.hash()];
    for _ in 0..12 {
        let mv = random_legal_move(game.position(), &mut rng);
        game.play_move(mv);
        hashes.push(game.hash());
    }

    for expected in hashes.iter().rev().skip(1) {
        assert!(game.undo_move());
        assert_eq!(game.hash(), *expected);
    }
    assert!(!game.undo_move());

    for expected in hashes.iter().skip(1) {
        assert!(game.forward_move());
        assert_eq!(game.hash(), *expected);
    }
    assert!(!game.forward_move());
}

#[test]
fn test_rewind_and_replay_diverges() {
    let mut game = setup_game(9, &[("b", "E5"), ("w", "C3"), ("b", "G7")]);
    game.rewind();
    assert_eq!(game.move_number(), 0);
    assert_eq!(game.board().empty_count(), 81);

    game.play_text("b", "D4").unwrap();
    assert!(!game.forward_move());
    assert_eq!(game.move_number(), 1);
}
