//! Game record: the current state plus a snapshot per move.
//!
//! [`GameState`] keeps one [`KoState`] snapshot for every move number so the
//! protocol layer can undo and redo freely, and the search can replay the
//! moves between two roots when reusing its tree. Playing a move after an
//! undo cuts off the snapshots that were ahead of it.

use std::fmt;

use crate::analysis::AnalyzeTags;
use crate::board::{Board, Color, Square};
use crate::constants::{NO_VERTEX, PASS, RESIGN, Vertex};
use crate::position::{KoState, MoveError, Position};
use crate::timecontrol::TimeControl;

/// Largest number of traditional fixed handicap stones.
pub const FIXED_HANDICAP_MAX: usize = 9;

#[derive(Clone)]
pub struct GameState {
    state: KoState,
    history: Vec<KoState>,
    time_control: TimeControl,
    resigned: Option<Color>,
}

impl GameState {
    pub fn new(size: usize, komi: f32) -> Self {
        let state = KoState::new(size, komi);
        let history = vec![state.clone()];
        GameState {
            state,
            history,
            time_control: TimeControl::default(),
            resigned: None,
        }
    }

    pub fn init_game(&mut self, size: usize, komi: f32) {
        self.state.init_game(size, komi);
        self.restart();
    }

    /// Clear the board, keeping size, komi and time settings.
    pub fn reset_game(&mut self) {
        self.state.reset_game();
        self.restart();
    }

    fn restart(&mut self) {
        self.history.clear();
        self.history.push(self.state.clone());
        self.time_control.reset_clocks();
        self.resigned = None;
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> &KoState {
        &self.state
    }

    pub fn position(&self) -> &Position {
        self.state.position()
    }

    pub fn board(&self) -> &Board {
        &self.state.position().board
    }

    pub fn to_move(&self) -> Color {
        self.position().to_move()
    }

    pub fn set_to_move(&mut self, color: Color) {
        self.state.position_mut().set_to_move(color);
    }

    pub fn move_number(&self) -> usize {
        self.position().move_number()
    }

    pub fn last_move(&self) -> Vertex {
        self.position().last_move()
    }

    pub fn komi(&self) -> f32 {
        self.position().komi()
    }

    pub fn set_komi(&mut self, komi: f32) {
        self.state.position_mut().set_komi(komi);
    }

    pub fn handicap(&self) -> usize {
        self.position().handicap()
    }

    pub fn hash(&self) -> u64 {
        self.position().hash()
    }

    pub fn has_resigned(&self) -> bool {
        self.resigned.is_some()
    }

    pub fn who_resigned(&self) -> Option<Color> {
        self.resigned
    }

    // =========================================================================
    // Moves and Navigation
    // =========================================================================

    pub fn play_move(&mut self, vertex: Vertex) {
        self.play_move_color(self.to_move(), vertex);
    }

    /// Play a move that is already known to be legal.
    pub fn play_move_color(&mut self, color: Color, vertex: Vertex) {
        if vertex == RESIGN {
            self.resigned = Some(color);
        } else {
            self.state.play_move_color(color, vertex);
        }
        self.history.truncate(self.move_number());
        self.history.push(self.state.clone());
    }

    /// Parse and play a move given as protocol text, rejecting anything the
    /// board rules or positional superko forbid without touching the state.
    pub fn play_text(&mut self, color: &str, vertex: &str) -> Result<(), MoveError> {
        self.play_text_with_tags(color, vertex, &AnalyzeTags::default())
    }

    /// [`GameState::play_text`] that also rejects moves `tags` avoid.
    pub fn play_text_with_tags(
        &mut self,
        color: &str,
        vertex: &str,
        tags: &AnalyzeTags,
    ) -> Result<(), MoveError> {
        if self.has_resigned() {
            return Err(MoveError::GameOver);
        }
        let color = Color::parse(color).ok_or_else(|| MoveError::InvalidColor(color.to_string()))?;
        let mv = self.board().text_to_move(vertex);
        if mv == NO_VERTEX {
            return Err(MoveError::InvalidVertex(vertex.to_string()));
        }
        self.state.check_move(color, mv, tags)?;

        self.set_to_move(color);
        self.play_move(mv);
        Ok(())
    }

    /// Go back to the start of the recorded game.
    pub fn rewind(&mut self) {
        self.state = self.history[0].clone();
    }

    pub fn undo_move(&mut self) -> bool {
        let move_number = self.move_number();
        if move_number == 0 {
            return false;
        }
        self.state = self.history[move_number - 1].clone();
        true
    }

    /// Redo a move taken back with [`GameState::undo_move`].
    pub fn forward_move(&mut self) -> bool {
        let move_number = self.move_number();
        if self.history.len() <= move_number + 1 {
            return false;
        }
        self.state = self.history[move_number + 1].clone();
        true
    }

    /// Board as it was `moves_ago` moves before the current one.
    pub fn get_past_board(&self, moves_ago: usize) -> &Board {
        let move_number = self.move_number();
        debug_assert!(moves_ago <= move_number);
        debug_assert!(move_number < self.history.len());
        &self.history[move_number - moves_ago].position().board
    }

    /// Make the current position the start of the record.
    pub fn clear_game_history(&mut self) {
        self.state.position_mut().set_move_number(0);
        self.history.clear();
        self.history.push(self.state.clone());
    }

    // =========================================================================
    // Handicap
    // =========================================================================

    /// Whether `handicap` traditional stones fit on this board.
    pub fn valid_handicap(&self, handicap: usize) -> bool {
        let size = self.board().size();
        if !(2..=FIXED_HANDICAP_MAX).contains(&handicap) {
            return false;
        }
        if size % 2 == 0 && handicap > 4 {
            return false;
        }
        if size == 7 && handicap > 4 {
            return false;
        }
        size >= 7
    }

    /// Whether no stone is on the board.
    pub fn is_board_empty(&self) -> bool {
        let size = self.board().size();
        self.board().empty_count() == size * size
    }

    /// Place `handicap` stones on the traditional star points of an empty
    /// board. White moves next.
    pub fn place_fixed_handicap(&mut self, handicap: usize) -> bool {
        if !self.valid_handicap(handicap) || !self.is_board_empty() {
            return false;
        }

        let size = self.board().size();
        let high = if size >= 13 { 3 } else { 2 };
        let mid = size / 2;
        let low = size - 1 - high;

        let mut points = vec![(low, low), (high, high)];
        if handicap >= 3 {
            points.push((high, low));
        }
        if handicap >= 4 {
            points.push((low, high));
        }
        if handicap >= 5 && handicap % 2 == 1 {
            points.push((mid, mid));
        }
        if handicap >= 6 {
            points.push((low, mid));
            points.push((high, mid));
        }
        if handicap >= 8 {
            points.push((mid, low));
            points.push((mid, high));
        }
        for (x, y) in points {
            let v = self.board().get_vertex(x, y);
            self.play_move_color(Color::Black, v);
        }

        self.start_handicap_game(handicap);
        true
    }

    /// Make the stones now on the board a handicap of `handicap` stones:
    /// the record restarts here and White moves next.
    pub fn start_handicap_game(&mut self, handicap: usize) {
        let next = if handicap > 0 { Color::White } else { Color::Black };
        self.set_to_move(next);
        self.clear_game_history();
        self.state.position_mut().set_handicap(handicap);
    }

    /// Place up to `handicap` extra black stones on a grid between the star
    /// points, skipping any point with a stone in its 3x3 neighborhood.
    /// Returns the number placed.
    pub fn place_scripted_handicap(&mut self, handicap: usize) -> usize {
        let size = self.board().size();
        let low = if size >= 13 { 3 } else { 2 };
        let mid = size / 2;
        let high = size.saturating_sub(1 + low);
        let mut interval = high.saturating_sub(mid) / 2;
        let mut placed = 0;

        while interval >= 3 {
            for i in (low..=high).step_by(interval) {
                for j in (low..=high).step_by(interval) {
                    if placed >= handicap {
                        return placed;
                    }
                    let clear = (i - 1..=i + 1).all(|x| {
                        (j - 1..=j + 1).all(|y| self.board().get_state_xy(x, y) == Square::Empty)
                    });
                    if !clear {
                        continue;
                    }
                    let v = self.board().get_vertex(i, j);
                    self.play_move_color(Color::Black, v);
                    placed += 1;
                }
            }
            interval /= 2;
        }
        placed
    }

    // =========================================================================
    // Time Control
    // =========================================================================

    pub fn time_control(&self) -> &TimeControl {
        &self.time_control
    }

    pub fn set_time_control(&mut self, time_control: TimeControl) {
        self.time_control = time_control;
    }

    pub fn start_clock(&mut self, color: Color) {
        self.time_control.start(color);
    }

    pub fn stop_clock(&mut self, color: Color) {
        self.time_control.stop(color);
    }

    pub fn adjust_time(&mut self, color: Color, time: i32, stones: i32) {
        self.time_control.adjust_time(color, time, stones);
    }

    /// Area score from Black's point of view.
    pub fn final_score(&self) -> f32 {
        self.position().final_score()
    }

    /// Whether the last two moves were passes.
    pub fn both_passed(&self) -> bool {
        self.position().passes() >= 2 && self.last_move() == PASS
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.position())?;
        write!(f, "{}", self.time_control)
    }
}
