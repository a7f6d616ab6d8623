//! Evaluator front end: caching, symmetry ensembles and score mapping.
//!
//! The search never calls an [`Evaluator`] directly. It asks the
//! [`Network`] for a [`NetResult`], which checks the cache first (including
//! symmetric variants of the position early in the game), evaluates on a
//! miss, maps the raw value onto the score range and stores the result.

use tracing::debug;

use crate::cache::EvalCache;
use crate::evaluator::{Evaluator, IDENTITY_SYMMETRY, NUM_SYMMETRIES, get_symmetry};
use crate::position::Position;
use crate::timecontrol::opening_moves;

/// Which symmetries of the position to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensemble {
    /// Evaluate under one fixed symmetry.
    Direct(usize),
    /// Evaluate under one symmetry picked at random.
    RandomSymmetry,
    /// Average all eight symmetries.
    Average,
}

/// Evaluator output with the value mapped to a score in points.
#[derive(Debug, Clone, PartialEq)]
pub struct NetResult {
    /// Prior for each intersection, indexed `y * size + x`.
    pub policy: Vec<f32>,
    pub policy_pass: f32,
    /// Expected score for the side to move, in `[-(size² + komi), size² + komi]`.
    pub score: f32,
}

impl NetResult {
    pub fn empty(size: usize) -> Self {
        NetResult {
            policy: vec![0.0; size * size],
            policy_pass: 0.0,
            score: 0.0,
        }
    }
}

/// Largest score magnitude on a board of `size` with `komi`.
pub fn max_score(size: usize, komi: f32) -> f32 {
    (size * size) as f32 + komi
}

/// Map a value in `[-1, 1]` linearly onto the score range.
pub fn value_to_score(value: f32, size: usize, komi: f32) -> f32 {
    let max = max_score(size, komi);
    let min = -max;
    let value = value.clamp(-1.0, 1.0);
    (value + 1.0) * (max - min) / 2.0 + min
}

/// Cached, symmetry-aware access to an evaluator.
pub struct Network<E> {
    evaluator: E,
    cache: EvalCache,
    symmetric_lookups: bool,
}

impl<E: Evaluator> Network<E> {
    pub fn new(evaluator: E, cache_entries: usize) -> Self {
        Network {
            evaluator,
            cache: EvalCache::new(cache_entries),
            symmetric_lookups: true,
        }
    }

    /// Allow or forbid cache hits on symmetric positions. These must be off
    /// when the evaluator or the move choice is randomized.
    pub fn with_symmetric_lookups(mut self, enabled: bool) -> Self {
        self.symmetric_lookups = enabled;
        self
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn cache(&self) -> &EvalCache {
        &self.cache
    }

    /// Memory held by the evaluator and the cache, in bytes.
    pub fn memory_usage(&self) -> usize {
        self.evaluator.memory_usage() + self.cache.estimated_size()
    }

    /// Evaluate `position`, going through the cache.
    pub fn get_output(
        &self,
        position: &Position,
        ensemble: Ensemble,
        read_cache: bool,
        write_cache: bool,
    ) -> NetResult {
        if read_cache {
            if let Some(result) = self.lookup_cache(position) {
                return result;
            }
        }

        let result = match ensemble {
            Ensemble::Direct(symmetry) => self.get_output_internal(position, symmetry),
            Ensemble::RandomSymmetry => {
                self.get_output_internal(position, fastrand::usize(..NUM_SYMMETRIES))
            }
            Ensemble::Average => {
                let size = position.size();
                let weight = 1.0 / NUM_SYMMETRIES as f32;
                let mut avg = NetResult::empty(size);
                for symmetry in 0..NUM_SYMMETRIES {
                    let r = self.get_output_internal(position, symmetry);
                    avg.score += r.score * weight;
                    avg.policy_pass += r.policy_pass * weight;
                    for (a, p) in avg.policy.iter_mut().zip(&r.policy) {
                        *a += p * weight;
                    }
                }
                avg
            }
        };

        if write_cache {
            self.cache.insert(position.hash(), result.clone());
        }
        result
    }

    /// Look the position up in the cache, trying its symmetric images in the
    /// opening.
    fn lookup_cache(&self, position: &Position) -> Option<NetResult> {
        if let Some(result) = self.cache.lookup(position.hash()) {
            return Some(result);
        }

        let size = position.size();
        if !self.symmetric_lookups || position.move_number() >= opening_moves(size) / 2 {
            return None;
        }

        for symmetry in 0..NUM_SYMMETRIES {
            if symmetry == IDENTITY_SYMMETRY {
                continue;
            }
            let Some(cached) = self.cache.lookup(position.get_symmetry_hash(symmetry)) else {
                continue;
            };
            debug!(symmetry, "cache hit on symmetric position");
            // The cached policy is laid out for the transformed board.
            let mut policy = vec![0.0; size * size];
            for y in 0..size {
                for x in 0..size {
                    let (sx, sy) = get_symmetry((x, y), symmetry, size);
                    policy[y * size + x] = cached.policy[sy * size + sx];
                }
            }
            return Some(NetResult { policy, ..cached });
        }
        None
    }

    fn get_output_internal(&self, position: &Position, symmetry: usize) -> NetResult {
        let output = self.evaluator.evaluate(position, symmetry);
        NetResult {
            policy: output.policy,
            policy_pass: output.policy_pass,
            score: value_to_score(output.value, position.size(), position.komi()),
        }
    }
}
