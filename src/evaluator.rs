//! Position evaluator boundary.
//!
//! The search treats the evaluator as a black box mapping a position to a
//! move prior and a scalar value. Implementations must be deterministic for a
//! given `(position, symmetry)` pair so that results can be cached by hash.
//!
//! Two evaluators ship with the crate:
//! - [`UniformEvaluator`]: equal priors, constant value (useful for tests)
//! - [`crate::playout::PlayoutEvaluator`]: uniform priors, value from random playouts

use crate::board::Square;
use crate::position::Position;

/// Number of board symmetries (rotations and reflections).
pub const NUM_SYMMETRIES: usize = 8;

/// The identity symmetry.
pub const IDENTITY_SYMMETRY: usize = 0;

/// Map `(x, y)` through one of the eight board symmetries.
///
/// Bit 2 transposes, bit 1 flips x, bit 0 flips y.
pub fn get_symmetry((x, y): (usize, usize), symmetry: usize, size: usize) -> (usize, usize) {
    debug_assert!(symmetry < NUM_SYMMETRIES);
    debug_assert!(x < size && y < size);
    let (mut x, mut y) = if symmetry & 4 != 0 { (y, x) } else { (x, y) };
    if symmetry & 2 != 0 {
        x = size - x - 1;
    }
    if symmetry & 1 != 0 {
        y = size - y - 1;
    }
    (x, y)
}

/// Raw evaluator output.
#[derive(Debug, Clone, PartialEq)]
pub struct NetOutput {
    /// Prior for each intersection, indexed `y * size + x`, in the
    /// orientation of the position that was evaluated.
    pub policy: Vec<f32>,
    /// Prior for passing.
    pub policy_pass: f32,
    /// Value in `[-1, 1]` from the point of view of the side to move.
    pub value: f32,
}

impl NetOutput {
    /// An output with all-zero priors and the given value.
    pub fn empty(size: usize, value: f32) -> Self {
        NetOutput {
            policy: vec![0.0; size * size],
            policy_pass: 0.0,
            value,
        }
    }
}

/// A policy/value evaluator.
pub trait Evaluator: Send + Sync {
    /// Evaluate `position` as seen through `symmetry`. The returned policy is
    /// already mapped back to the position's own orientation.
    fn evaluate(&self, position: &Position, symmetry: usize) -> NetOutput;

    /// Approximate memory held by the evaluator, in bytes. Counted against
    /// the engine's memory budget.
    fn memory_usage(&self) -> usize {
        0
    }
}

/// Assigns equal prior to every empty intersection and to pass, with a
/// constant value. Useful for testing the search without a model.
#[derive(Debug, Clone, Default)]
pub struct UniformEvaluator {
    value: f32,
}

impl UniformEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A uniform evaluator that always reports `value` for the side to move.
    pub fn with_value(value: f32) -> Self {
        Self {
            value: value.clamp(-1.0, 1.0),
        }
    }
}

impl Evaluator for UniformEvaluator {
    fn evaluate(&self, position: &Position, _symmetry: usize) -> NetOutput {
        let board = &position.board;
        let size = board.size();
        let mut output = NetOutput::empty(size, self.value);
        let prior = 1.0 / (board.empty_count() + 1) as f32;
        for y in 0..size {
            for x in 0..size {
                if board.get_state_xy(x, y) == Square::Empty {
                    output.policy[y * size + x] = prior;
                }
            }
        }
        output.policy_pass = prior;
        output
    }
}
