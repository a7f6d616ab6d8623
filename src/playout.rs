//! Monte Carlo playout evaluator.
//!
//! A model-free [`Evaluator`]: the prior is uniform over the legal moves that
//! do not fill one of the mover's own eyes, and the value is the mean area
//! score of a few random games played out from the position.

use crate::board::{Color, Square};
use crate::constants::{PASS, Vertex};
use crate::evaluator::{Evaluator, NetOutput};
use crate::network::max_score;
use crate::position::Position;

/// Prior weight of passing relative to one board move.
const PASS_WEIGHT: f32 = 0.1;

/// Random playouts per evaluation.
pub const DEFAULT_PLAYOUTS: usize = 8;

/// Uniform priors, value from random playouts.
#[derive(Debug, Clone)]
pub struct PlayoutEvaluator {
    playouts: usize,
}

impl Default for PlayoutEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_PLAYOUTS)
    }
}

impl PlayoutEvaluator {
    pub fn new(playouts: usize) -> Self {
        Self {
            playouts: playouts.max(1),
        }
    }
}

impl Evaluator for PlayoutEvaluator {
    fn evaluate(&self, position: &Position, symmetry: usize) -> NetOutput {
        let size = position.size();
        let color = position.to_move();
        let board = &position.board;

        let moves: Vec<Vertex> = board
            .empty_intersections()
            .filter(|&v| !board.is_eye(v, color) && position.is_move_legal(color, v))
            .collect();

        let mut output = NetOutput::empty(size, 0.0);
        let total = moves.len() as f32 + PASS_WEIGHT;
        for &v in &moves {
            let (x, y) = board.get_xy(v);
            output.policy[y * size + x] = 1.0 / total;
        }
        output.policy_pass = PASS_WEIGHT / total;

        // Same position and symmetry give the same playouts.
        let mut rng = fastrand::Rng::with_seed(position.hash() ^ symmetry as u64);
        let mut sum = 0.0;
        for _ in 0..self.playouts {
            let mut game = position.clone();
            let black_score = mcplayout(&mut game, &mut rng);
            sum += if color == Color::Black {
                black_score
            } else {
                -black_score
            };
        }
        let mean = sum / self.playouts as f32;
        output.value = (mean / max_score(size, position.komi())).clamp(-1.0, 1.0);
        output
    }
}

/// Play random moves until two consecutive passes or the length limit,
/// then return the area score from Black's point of view.
pub fn mcplayout(position: &mut Position, rng: &mut fastrand::Rng) -> f32 {
    let size = position.size();
    let max_moves = position.move_number() + 3 * size * size;
    let mut passes = 0;

    while passes < 2 && position.move_number() < max_moves {
        let color = position.to_move();
        match choose_random_move(position, color, rng) {
            Some(vertex) => {
                position.play_move_color(color, vertex);
                passes = 0;
            }
            None => {
                position.play_move_color(color, PASS);
                passes += 1;
            }
        }
    }

    position.final_score()
}

/// A random legal move for `color` that does not fill its own eye.
fn choose_random_move(position: &Position, color: Color, rng: &mut fastrand::Rng) -> Option<Vertex> {
    let board = &position.board;
    let mut candidates: Vec<Vertex> = board
        .empty_intersections()
        .filter(|&v| !board.is_eye(v, color))
        .collect();

    // Partial Fisher-Yates: draw candidates until a legal one turns up.
    let n = candidates.len();
    for i in 0..n {
        let j = rng.usize(i..n);
        candidates.swap(i, j);
        let v = candidates[i];
        debug_assert!(board.get_state(v) == Square::Empty);
        if position.is_move_legal(color, v) {
            return Some(v);
        }
    }
    None
}
