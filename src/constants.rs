//! Constants for board geometry, vertex sentinels, and search defaults.
//!
//! The board uses a 1D "letterboxed" array: every row and column is padded
//! with one border vertex on each side, so neighbor lookups never need a
//! bounds check.
//!
//! # Board Size Configuration
//!
//! The maximum board size is controlled by Cargo features:
//! - `board9x9` (default): boards up to 9x9
//! - `board13x13`: boards up to 13x13
//! - `board19x19`: boards up to 19x19
//!
//! Smaller boards can always be played at runtime; the feature only fixes the
//! capacity of the board arrays.
//!
//! ```sh
//! cargo build                                                # 9x9 (default)
//! cargo build --no-default-features --features board19x19    # 19x19
//! ```

// =============================================================================
// Board Geometry
// =============================================================================

/// Maximum board size (NxN) this build can play.
#[cfg(feature = "board9x9")]
pub const BOARD_SIZE: usize = 9;

#[cfg(feature = "board13x13")]
pub const BOARD_SIZE: usize = 13;

#[cfg(feature = "board19x19")]
pub const BOARD_SIZE: usize = 19;

#[cfg(any(
    all(feature = "board9x9", feature = "board13x13"),
    all(feature = "board9x9", feature = "board19x19"),
    all(feature = "board13x13", feature = "board19x19"),
))]
compile_error!("Enable only one of 'board9x9', 'board13x13' or 'board19x19'");

#[cfg(not(any(feature = "board9x9", feature = "board13x13", feature = "board19x19")))]
compile_error!("Must enable one board size feature: 'board9x9', 'board13x13' or 'board19x19'");

/// Number of playable intersections at maximum size.
pub const NUM_INTERSECTIONS: usize = BOARD_SIZE * BOARD_SIZE;

/// Number of policy entries: one per intersection plus pass.
pub const POTENTIAL_MOVES: usize = NUM_INTERSECTIONS + 1;

/// Side length of the letterboxed array at maximum size.
pub const MAX_SIDE: usize = BOARD_SIZE + 2;

/// Total number of vertices, border included.
pub const NUM_VERTICES: usize = MAX_SIDE * MAX_SIDE;

/// Smallest board size accepted at runtime.
pub const MIN_BOARD_SIZE: usize = 2;

// =============================================================================
// Vertices
// =============================================================================

/// A vertex index into the letterboxed board array, or one of the sentinels.
pub type Vertex = i32;

/// "No vertex": used for "no ko point" and for unparseable move text.
/// Index 0 is always a border vertex, so it can never be a real move.
pub const NO_VERTEX: Vertex = 0;

/// The pass move.
pub const PASS: Vertex = -1;

/// The resign move.
pub const RESIGN: Vertex = -2;

/// Consecutive passes are tracked up to this count.
pub const MAX_PASSES: usize = 4;

// =============================================================================
// Game Defaults
// =============================================================================

/// Default komi.
pub const DEFAULT_KOMI: f32 = 7.5;

/// Default main time: one hour, in centiseconds.
pub const DEFAULT_MAIN_TIME_CS: i32 = 60 * 60 * 100;

// =============================================================================
// Search Limits and Memory
// =============================================================================

/// Sentinel for "no playout or visit limit". Kept well below `i32::MAX` so
/// arithmetic on it cannot overflow.
pub const UNLIMITED_PLAYOUTS: i32 = i32::MAX / 2;

/// Default total memory budget for tree plus cache, in bytes.
#[cfg(target_pointer_width = "64")]
pub const DEFAULT_MAX_MEMORY: usize = 5_200_000_000;

#[cfg(not(target_pointer_width = "64"))]
pub const DEFAULT_MAX_MEMORY: usize = 1_600_000_000;

/// Smallest tree budget accepted by the memory configuration, in bytes.
pub const MIN_TREE_SPACE: usize = 100_000_000;

/// Default share of the memory budget given to the evaluation cache, in percent.
pub const DEFAULT_CACHE_RATIO_PERCENT: usize = 10;

/// Hard ceiling on evaluation cache entries.
pub const MAX_CACHE_COUNT: usize = 150_000;

/// Smallest useful evaluation cache.
pub const MIN_CACHE_COUNT: usize = 6_000;

/// Number of pessimistic visits a thread adds to a node while its
/// simulation is in flight below it.
pub const VIRTUAL_LOSS_COUNT: u32 = 3;

/// Progress log period for a running search, in centiseconds.
pub const PROGRESS_INTERVAL_CS: i32 = 250;

/// Estimated playouts are only trusted after this much elapsed time.
pub const MIN_ESTIMATE_TIME_CS: i32 = 100;

/// Estimated playouts are only trusted after this many playouts.
pub const MIN_ESTIMATE_PLAYOUTS: i32 = 100;
