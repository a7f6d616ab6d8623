//! Rules layer on top of the board, and positional superko tracking.
//!
//! [`Position`] adds the game counters the board itself does not know about:
//! move number, komi, handicap, consecutive passes, the ko point and the last
//! move. It keeps the full hash in step with the ko point, side to move and
//! pass count.
//!
//! [`KoState`] wraps a `Position` with the history of ko hashes needed to
//! detect positional superko.

use std::fmt;

use thiserror::Error;

use crate::analysis::AnalyzeTags;
use crate::board::{Board, Color, Square};
use crate::constants::{MAX_PASSES, NO_VERTEX, PASS, RESIGN, Vertex};
use crate::zobrist::{ZOBRIST, ZOBRIST_BLACK_TO_MOVE};

/// Reasons a move can be rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("illegal move: point not empty")]
    Occupied,
    #[error("illegal move: retakes ko")]
    Ko,
    #[error("illegal move: suicide")]
    Suicide,
    #[error("illegal move: repeats a previous position")]
    Superko,
    #[error("illegal move: forbidden by move restrictions")]
    Restricted,
    #[error("invalid vertex: {0}")]
    InvalidVertex(String),
    #[error("invalid color: {0}")]
    InvalidColor(String),
    #[error("game is over")]
    GameOver,
}

/// A board plus the counters that make up the rules state of a game.
#[derive(Clone)]
pub struct Position {
    pub board: Board,
    move_number: usize,
    ko_move: Vertex,
    last_move: Vertex,
    komi: f32,
    handicap: usize,
    passes: usize,
}

impl Position {
    /// A new game on an empty board.
    pub fn new(size: usize, komi: f32) -> Self {
        Position {
            board: Board::new(size),
            move_number: 0,
            ko_move: NO_VERTEX,
            last_move: NO_VERTEX,
            komi,
            handicap: 0,
            passes: 0,
        }
    }

    /// Start a new game with a new size and komi.
    pub fn init_game(&mut self, size: usize, komi: f32) {
        *self = Position::new(size, komi);
    }

    /// Clear the board, keeping size and komi.
    pub fn reset_game(&mut self) {
        let komi = self.komi;
        self.init_game(self.board.size(), komi);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn size(&self) -> usize {
        self.board.size()
    }

    pub fn to_move(&self) -> Color {
        self.board.to_move()
    }

    pub fn set_to_move(&mut self, color: Color) {
        self.board.set_to_move(color);
    }

    pub fn move_number(&self) -> usize {
        self.move_number
    }

    pub(crate) fn set_move_number(&mut self, move_number: usize) {
        self.move_number = move_number;
    }

    pub fn ko_move(&self) -> Vertex {
        self.ko_move
    }

    pub fn last_move(&self) -> Vertex {
        self.last_move
    }

    pub fn komi(&self) -> f32 {
        self.komi
    }

    pub fn set_komi(&mut self, komi: f32) {
        self.komi = komi;
    }

    pub fn handicap(&self) -> usize {
        self.handicap
    }

    pub fn set_handicap(&mut self, handicap: usize) {
        self.handicap = handicap;
    }

    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Full hash: contents, prisoners, side to move, ko point and passes.
    pub fn hash(&self) -> u64 {
        self.board.hash()
    }

    /// Contents-only hash used for superko.
    pub fn ko_hash(&self) -> u64 {
        self.board.ko_hash()
    }

    // =========================================================================
    // Moves
    // =========================================================================

    /// Play `vertex` for the side to move.
    pub fn play_move(&mut self, vertex: Vertex) {
        self.play_move_color(self.to_move(), vertex);
    }

    /// Play `vertex` for `color`. The move must be legal; use
    /// [`Position::is_move_legal`] first.
    pub fn play_move_color(&mut self, color: Color, vertex: Vertex) {
        debug_assert!(vertex != RESIGN);
        let zob = &*ZOBRIST;

        self.board.xor_hash(zob.ko_move[self.ko_move as usize]);
        self.ko_move = if vertex == PASS {
            NO_VERTEX
        } else {
            self.board.update_board(color, vertex)
        };
        self.board.xor_hash(zob.ko_move[self.ko_move as usize]);

        self.last_move = vertex;
        self.move_number += 1;

        // The board still holds the previous side to move; hand the turn over
        // keeping the black-to-move key consistent.
        if self.board.to_move() == color {
            self.board.xor_hash(ZOBRIST_BLACK_TO_MOVE);
        }
        self.board.force_to_move(color.opponent());

        self.board.xor_hash(zob.passes[self.passes]);
        if vertex == PASS {
            self.increment_passes();
        } else {
            self.passes = 0;
        }
        self.board.xor_hash(zob.passes[self.passes]);
    }

    /// Count one more consecutive pass, saturating.
    fn increment_passes(&mut self) {
        self.passes = (self.passes + 1).min(MAX_PASSES);
    }

    /// Whether `color` may play `vertex` under the board rules alone.
    pub fn is_move_legal(&self, color: Color, vertex: Vertex) -> bool {
        self.check_move(color, vertex).is_ok()
    }

    /// Like [`Position::is_move_legal`], additionally honoring move restrictions.
    pub fn is_move_allowed(&self, color: Color, vertex: Vertex, tags: &AnalyzeTags) -> bool {
        self.check_move_allowed(color, vertex, tags).is_ok()
    }

    pub fn check_move_allowed(
        &self,
        color: Color,
        vertex: Vertex,
        tags: &AnalyzeTags,
    ) -> Result<(), MoveError> {
        if tags.is_to_avoid(color, vertex, self.move_number) {
            return Err(MoveError::Restricted);
        }
        self.check_move(color, vertex)
    }

    /// Board-rule legality with the reason for rejection.
    pub fn check_move(&self, color: Color, vertex: Vertex) -> Result<(), MoveError> {
        if vertex == PASS || vertex == RESIGN {
            return Ok(());
        }
        if !self.board.is_on_board(vertex) {
            return Err(MoveError::InvalidVertex(vertex.to_string()));
        }
        if self.board.get_state(vertex) != Square::Empty {
            return Err(MoveError::Occupied);
        }
        if vertex == self.ko_move {
            return Err(MoveError::Ko);
        }
        if self.board.is_suicide(vertex, color) {
            return Err(MoveError::Suicide);
        }
        Ok(())
    }

    // =========================================================================
    // Scoring and Hashing
    // =========================================================================

    /// Area score from Black's point of view, komi and handicap included.
    pub fn final_score(&self) -> f32 {
        self.board.area_score(self.komi + self.handicap as f32)
    }

    /// Recompute the full hash from scratch.
    pub fn compute_hash(&self) -> u64 {
        self.board.compute_hash(self.ko_move) ^ ZOBRIST.passes[self.passes]
    }

    /// Full hash of this position transformed by `symmetry`.
    pub fn get_symmetry_hash(&self, symmetry: usize) -> u64 {
        self.board.compute_hash_symmetry(self.ko_move, symmetry) ^ ZOBRIST.passes[self.passes]
    }

    pub fn move_to_text(&self, vertex: Vertex) -> String {
        self.board.move_to_text(vertex)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "\nPasses: {}            Black (X) Prisoners: {}",
            self.passes,
            self.board.prisoners(Color::Black)
        )?;
        let side = match self.to_move() {
            Color::Black => "Black (X) to move",
            Color::White => "White (O) to move",
        };
        writeln!(
            f,
            "{side}    White (O) Prisoners: {}",
            self.board.prisoners(Color::White)
        )?;
        write!(f, "{}", self.board.render(self.last_move))
    }
}

/// A position plus the ko hashes of every position seen so far.
#[derive(Clone)]
pub struct KoState {
    position: Position,
    ko_hash_history: Vec<u64>,
}

impl KoState {
    pub fn new(size: usize, komi: f32) -> Self {
        let position = Position::new(size, komi);
        let ko_hash_history = vec![position.ko_hash()];
        KoState {
            position,
            ko_hash_history,
        }
    }

    pub fn init_game(&mut self, size: usize, komi: f32) {
        self.position.init_game(size, komi);
        self.reset_ko_hash_history();
    }

    pub fn reset_game(&mut self) {
        self.position.reset_game();
        self.reset_ko_hash_history();
    }

    /// Forget every earlier position; the current one becomes the start.
    pub fn reset_ko_hash_history(&mut self) {
        self.ko_hash_history.clear();
        self.ko_hash_history.push(self.position.ko_hash());
    }

    #[inline]
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Mutable access for edits that are not moves (komi, side to move).
    #[inline]
    pub fn position_mut(&mut self) -> &mut Position {
        &mut self.position
    }

    pub fn play_move(&mut self, vertex: Vertex) {
        self.play_move_color(self.position.to_move(), vertex);
    }

    /// Play a move and record the resulting ko hash. Resigning leaves the
    /// board untouched.
    pub fn play_move_color(&mut self, color: Color, vertex: Vertex) {
        if vertex != RESIGN {
            self.position.play_move_color(color, vertex);
        }
        self.ko_hash_history.push(self.position.ko_hash());
    }

    /// Whether the current position already occurred earlier in the game.
    pub fn super_ko(&self) -> bool {
        match self.ko_hash_history.split_last() {
            Some((current, earlier)) => earlier.contains(current),
            None => false,
        }
    }

    /// Full legality of a move: restrictions, board rules, then positional
    /// superko.
    pub fn check_move(
        &self,
        color: Color,
        vertex: Vertex,
        tags: &AnalyzeTags,
    ) -> Result<(), MoveError> {
        self.position.check_move_allowed(color, vertex, tags)?;
        if self.would_repeat(color, vertex) {
            return Err(MoveError::Superko);
        }
        Ok(())
    }

    /// Whether `color` playing `vertex` would recreate an earlier position.
    pub fn would_repeat(&self, color: Color, vertex: Vertex) -> bool {
        if vertex == PASS || vertex == RESIGN {
            return false;
        }
        let mut next = self.position.clone();
        next.play_move_color(color, vertex);
        self.ko_hash_history.contains(&next.ko_hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(pos: &Position, text: &str) -> Vertex {
        pos.board.text_to_move(text)
    }

    fn play_all(state: &mut KoState, moves: &[&str]) {
        for m in moves {
            let vertex = state.position().board.text_to_move(m);
            assert!(state.position().is_move_legal(state.position().to_move(), vertex), "{m}");
            state.play_move(vertex);
        }
    }

    #[test]
    fn test_hash_tracks_side_to_move_and_passes() {
        let mut pos = Position::new(9, 7.5);
        let start = pos.hash();
        pos.play_move(PASS);
        assert_ne!(pos.hash(), start);
        assert_eq!(pos.hash(), pos.compute_hash());
        assert_eq!(pos.passes(), 1);
        pos.play_move(PASS);
        assert_eq!(pos.passes(), 2);
        assert_eq!(pos.to_move(), Color::Black);
        assert_eq!(pos.hash(), pos.compute_hash());
        // Same contents and side to move, different pass count.
        assert_ne!(pos.hash(), start);
    }

    #[test]
    fn test_passes_saturate() {
        let mut pos = Position::new(9, 7.5);
        for _ in 0..7 {
            pos.play_move(PASS);
        }
        assert_eq!(pos.passes(), MAX_PASSES);
        assert_eq!(pos.hash(), pos.compute_hash());
        let e5 = v(&pos, "E5");
        pos.play_move(e5);
        assert_eq!(pos.passes(), 0);
        assert_eq!(pos.hash(), pos.compute_hash());
    }

    #[test]
    fn test_check_move_reasons() {
        let mut pos = Position::new(9, 7.5);
        let e5 = v(&pos, "E5");
        pos.play_move(e5);
        assert_eq!(pos.check_move(Color::White, e5), Err(MoveError::Occupied));
        assert!(pos.check_move(Color::White, PASS).is_ok());
        assert!(matches!(
            pos.check_move(Color::White, NO_VERTEX),
            Err(MoveError::InvalidVertex(_))
        ));
    }

    #[test]
    fn test_ko_recapture_forbidden_for_one_move() {
        let mut state = KoState::new(9, 7.5);
        // Black: D5 E4 E6, White: F4 F6 G5 E5, then black F5 captures E5.
        play_all(
            &mut state,
            &["D5", "F4", "E4", "F6", "E6", "G5", "A1", "E5", "F5"],
        );
        let pos = state.position();
        let e5 = v(pos, "E5");
        assert_eq!(pos.ko_move(), e5);
        assert_eq!(pos.check_move(Color::White, e5), Err(MoveError::Ko));
        assert_eq!(pos.hash(), pos.compute_hash());

        // White plays elsewhere, black answers: the ko may be retaken.
        play_all(&mut state, &["J9", "J8"]);
        assert_eq!(state.position().ko_move(), NO_VERTEX);
        assert!(state.position().is_move_legal(Color::White, e5));
    }

    #[test]
    fn test_super_ko_detects_repetition() {
        let mut state = KoState::new(9, 7.5);
        assert!(!state.super_ko());
        play_all(&mut state, &["D5", "F4", "E4", "F6", "E6", "G5", "A1", "E5", "F5"]);
        assert!(!state.super_ko());
        // A pass leaves the contents unchanged, so the ko hash repeats.
        state.play_move(PASS);
        assert!(state.super_ko());
    }

    #[test]
    fn test_would_repeat() {
        let mut state = KoState::new(9, 7.5);
        play_all(&mut state, &["E5", "D5"]);
        let e5 = v(state.position(), "E5");
        assert!(!state.would_repeat(Color::White, PASS));
        assert!(!state.would_repeat(Color::Black, v(state.position(), "C3")));
        // Contents with only D5 on the board never occurred.
        assert!(state.position().board.get_state(e5) == Square::Black);
    }

    #[test]
    fn test_final_score_includes_handicap() {
        let mut pos = Position::new(9, 0.5);
        pos.set_handicap(2);
        let e5 = v(&pos, "E5");
        pos.play_move(e5);
        assert_eq!(pos.final_score(), 81.0 - 2.5);
    }

    #[test]
    fn test_symmetry_hash_identity_matches_full_hash() {
        let mut pos = Position::new(9, 7.5);
        let c3 = v(&pos, "C3");
        pos.play_move(c3);
        assert_eq!(pos.get_symmetry_hash(0), pos.hash());
        // The transposed position of C3 is C3 itself; a flip is not.
        assert_eq!(pos.get_symmetry_hash(4), pos.hash());
        assert_ne!(pos.get_symmetry_hash(2), pos.hash());
    }
}
