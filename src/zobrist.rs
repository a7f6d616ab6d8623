//! Zobrist hashing tables.
//!
//! The tables are generated once per process from a fixed seed, so hashes are
//! stable across runs and can be used as evaluation-cache keys.

use std::sync::LazyLock;

use crate::constants::{MAX_PASSES, NUM_VERTICES};

/// Initial value of every hash before any vertex is mixed in.
pub const ZOBRIST_EMPTY: u64 = 0x1234_5678_8765_4321;

/// Mixed into the full hash whenever Black is to move.
pub const ZOBRIST_BLACK_TO_MOVE: u64 = 0xABCD_ABCD_ABCD_ABCD;

/// Number of distinct prisoner counts hashed per color before wrapping.
pub const PRISONER_SLOTS: usize = NUM_VERTICES * 2;

const SEED: u64 = 0x9E37_79B9_7F4A_7C15;

/// Random keys for every hashed feature of a position.
pub struct Zobrist {
    /// Indexed by square state (black, white, empty, border) then vertex.
    pub states: [[u64; NUM_VERTICES]; 4],
    /// Indexed by the current ko vertex.
    pub ko_move: [u64; NUM_VERTICES],
    /// Indexed by color then prisoner count.
    pub prisoners: [[u64; PRISONER_SLOTS]; 2],
    /// Indexed by the consecutive pass count. Slot 0 is zero so a position
    /// with no passes hashes the same whether or not it was ever updated.
    pub passes: [u64; MAX_PASSES + 1],
}

impl Zobrist {
    fn generate(seed: u64) -> Self {
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut table = Zobrist {
            states: [[0; NUM_VERTICES]; 4],
            ko_move: [0; NUM_VERTICES],
            prisoners: [[0; PRISONER_SLOTS]; 2],
            passes: [0; MAX_PASSES + 1],
        };
        for row in table.states.iter_mut() {
            row.iter_mut().for_each(|k| *k = rng.u64(..));
        }
        table.ko_move.iter_mut().for_each(|k| *k = rng.u64(..));
        for row in table.prisoners.iter_mut() {
            row.iter_mut().for_each(|k| *k = rng.u64(..));
        }
        table.passes[1..].iter_mut().for_each(|k| *k = rng.u64(..));
        table
    }

    /// Key for `count` prisoners taken by `color`.
    #[inline]
    pub fn prisoner_key(&self, color: usize, count: usize) -> u64 {
        self.prisoners[color][count % PRISONER_SLOTS]
    }
}

/// Process-wide tables.
pub static ZOBRIST: LazyLock<Box<Zobrist>> = LazyLock::new(|| Box::new(Zobrist::generate(SEED)));
