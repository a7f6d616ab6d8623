//! Search configuration.
//!
//! A [`SearchConfig`] is built once (from the command line or a test) and
//! shared immutably by the search and the tree nodes. Values that need
//! checking go through [`SearchConfig::validate`] and
//! [`MemoryBudget::new`], which report problems as [`ConfigError`]s rather
//! than failing later during a search.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::constants::{
    DEFAULT_CACHE_RATIO_PERCENT, DEFAULT_MAX_MEMORY, MIN_CACHE_COUNT, MIN_TREE_SPACE,
    UNLIMITED_PLAYOUTS,
};

/// Rough memory footprint of one evaluation cache entry at maximum board size.
pub const CACHE_ENTRY_SIZE: usize = std::mem::size_of::<crate::cache::CacheEntry>()
    + crate::constants::POTENTIAL_MOVES * std::mem::size_of::<f32>()
    + 2 * std::mem::size_of::<u64>();

/// Configuration problems detected before a search starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("not enough memory for the evaluator: {available} bytes available, {required} required")]
    EvaluatorMemory { available: usize, required: usize },
    #[error("not enough memory for the cache: room for {entries} entries, at least {minimum} needed")]
    CacheMemory { entries: usize, minimum: usize },
    #[error("not enough memory for the search tree: {available} bytes, at least {minimum} needed")]
    TreeMemory { available: usize, minimum: usize },
    #[error("cache ratio must be between 1 and 99 percent, got {0}")]
    CacheRatio(usize),
    #[error("thread count must be at least 1")]
    NoThreads,
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f32 },
    #[error("unknown time management mode: {0}")]
    TimeManagement(String),
}

/// How aggressively the search saves time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeManagement {
    /// Stop early when the best move cannot change, unless time cannot be saved.
    #[default]
    Auto,
    /// Always use the full budget.
    Off,
    /// Same as `Auto`.
    On,
    /// Stop early even when the saved time cannot be used later.
    Fast,
    /// Stop early but never deactivate root children.
    NoPruning,
}

impl FromStr for TimeManagement {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(TimeManagement::Auto),
            "off" => Ok(TimeManagement::Off),
            "on" => Ok(TimeManagement::On),
            "fast" => Ok(TimeManagement::Fast),
            "no_pruning" | "no-pruning" => Ok(TimeManagement::NoPruning),
            other => Err(ConfigError::TimeManagement(other.to_string())),
        }
    }
}

impl fmt::Display for TimeManagement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeManagement::Auto => "auto",
            TimeManagement::Off => "off",
            TimeManagement::On => "on",
            TimeManagement::Fast => "fast",
            TimeManagement::NoPruning => "no_pruning",
        };
        f.write_str(name)
    }
}

/// Tunable parameters of the tree search.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Threads running simulations, the calling thread included.
    pub threads: usize,
    /// Playouts per `think` call.
    pub max_playouts: i32,
    /// Root visits per `think` call, reused visits included.
    pub max_visits: i32,
    /// Tree memory budget in bytes.
    pub max_tree_size: usize,
    pub time_manage: TimeManagement,
    /// Safety margin subtracted from every time budget, in centiseconds.
    pub lag_buffer_cs: i32,

    pub puct: f32,
    pub log_puct: f32,
    pub log_const: f32,
    /// First play urgency reduction in score points.
    pub fpu_reduction: f32,
    pub fpu_root_reduction: f32,

    /// Confidence level of the lower confidence bound is `1 - ci_alpha`.
    pub ci_alpha: f32,
    /// Children need this fraction of the top visit count before their
    /// lower confidence bound is trusted for ordering.
    pub lcb_min_visit_ratio: f32,

    /// Randomize the chosen move for this many moves of the game.
    pub random_cnt: usize,
    pub random_min_visits: u32,
    pub random_temp: f32,

    /// Pass whenever the search likes passing, without the score checks.
    pub dumb_pass: bool,
    /// Whether the evaluator is randomized (disables symmetric cache lookups).
    pub noise: bool,
    pub quiet: bool,
    /// Analysis report period in centiseconds, 0 for none. Analysis tags
    /// given with a command take precedence.
    pub analysis_interval_cs: i32,
    /// Seed for move randomization.
    pub seed: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            max_playouts: UNLIMITED_PLAYOUTS,
            max_visits: UNLIMITED_PLAYOUTS,
            max_tree_size: DEFAULT_MAX_MEMORY,
            time_manage: TimeManagement::Auto,
            lag_buffer_cs: 100,
            puct: 1.5,
            log_puct: 0.015,
            log_const: 1.7,
            fpu_reduction: 10.0,
            fpu_root_reduction: 10.0,
            ci_alpha: 1e-5,
            lcb_min_visit_ratio: 0.10,
            random_cnt: 0,
            random_min_visits: 1,
            random_temp: 1.0,
            dumb_pass: false,
            noise: false,
            quiet: false,
            analysis_interval_cs: 0,
            seed: 0x5EED,
        }
    }
}

impl SearchConfig {
    /// Small, deterministic settings for tests.
    pub fn for_testing() -> Self {
        Self {
            threads: 1,
            max_playouts: 200,
            time_manage: TimeManagement::Off,
            lag_buffer_cs: 0,
            quiet: true,
            ..Self::default()
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_playouts(mut self, playouts: i32) -> Self {
        self.max_playouts = playouts.min(UNLIMITED_PLAYOUTS);
        self
    }

    pub fn with_visits(mut self, visits: i32) -> Self {
        self.max_visits = visits.min(UNLIMITED_PLAYOUTS);
        self
    }

    pub fn with_tree_size(mut self, bytes: usize) -> Self {
        self.max_tree_size = bytes;
        self
    }

    pub fn with_time_manage(mut self, time_manage: TimeManagement) -> Self {
        self.time_manage = time_manage;
        self
    }

    pub fn with_random_cnt(mut self, random_cnt: usize) -> Self {
        self.random_cnt = random_cnt;
        self
    }

    pub fn with_dumb_pass(mut self, dumb_pass: bool) -> Self {
        self.dumb_pass = dumb_pass;
        self
    }

    pub fn with_analysis_interval(mut self, centiseconds: i32) -> Self {
        self.analysis_interval_cs = centiseconds.max(0);
        self
    }

    /// Check values that would make the search misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::NoThreads);
        }
        for (name, value) in [
            ("puct", self.puct),
            ("log_const", self.log_const),
            ("ci_alpha", self.ci_alpha),
            ("random_temp", self.random_temp),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::NotPositive { name, value });
            }
        }
        Ok(())
    }
}

/// A total memory budget split between the search tree and the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBudget {
    /// Bytes available to the search tree.
    pub tree_bytes: usize,
    /// Entries available to the evaluation cache.
    pub cache_entries: usize,
}

impl MemoryBudget {
    /// Split `max_memory` bytes (0 for the default) after reserving
    /// `base_memory` for the evaluator, giving `cache_ratio_percent` of the
    /// rest to the cache.
    pub fn new(
        max_memory: usize,
        cache_ratio_percent: usize,
        base_memory: usize,
    ) -> Result<Self, ConfigError> {
        if !(1..=99).contains(&cache_ratio_percent) {
            return Err(ConfigError::CacheRatio(cache_ratio_percent));
        }
        let max_memory = if max_memory == 0 {
            DEFAULT_MAX_MEMORY
        } else {
            max_memory
        };
        if max_memory < base_memory {
            return Err(ConfigError::EvaluatorMemory {
                available: max_memory,
                required: base_memory,
            });
        }

        let available = max_memory - base_memory;
        let cache_bytes = available / 100 * cache_ratio_percent;
        let cache_entries = cache_bytes / CACHE_ENTRY_SIZE;
        if cache_entries < MIN_CACHE_COUNT {
            return Err(ConfigError::CacheMemory {
                entries: cache_entries,
                minimum: MIN_CACHE_COUNT,
            });
        }

        let tree_bytes = available - cache_bytes;
        if tree_bytes < MIN_TREE_SPACE {
            return Err(ConfigError::TreeMemory {
                available: tree_bytes,
                minimum: MIN_TREE_SPACE,
            });
        }

        Ok(MemoryBudget {
            tree_bytes,
            cache_entries,
        })
    }
}

impl Default for MemoryBudget {
    fn default() -> Self {
        let available = DEFAULT_MAX_MEMORY;
        let cache_bytes = available / 100 * DEFAULT_CACHE_RATIO_PERCENT;
        MemoryBudget {
            tree_bytes: available - cache_bytes,
            cache_entries: cache_bytes / CACHE_ENTRY_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SearchConfig::default().validate().is_ok());
        assert!(SearchConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_zero_threads_rejected() {
        let cfg = SearchConfig::default().with_threads(0);
        assert_eq!(cfg.validate(), Err(ConfigError::NoThreads));
    }

    #[test]
    fn test_playout_limit_clamped() {
        let cfg = SearchConfig::default().with_playouts(i32::MAX);
        assert_eq!(cfg.max_playouts, UNLIMITED_PLAYOUTS);
    }

    #[test]
    fn test_time_management_parse() {
        assert_eq!("fast".parse::<TimeManagement>(), Ok(TimeManagement::Fast));
        assert_eq!("NO_PRUNING".parse::<TimeManagement>(), Ok(TimeManagement::NoPruning));
        assert!("sometimes".parse::<TimeManagement>().is_err());
    }

    #[test]
    fn test_memory_budget_split() {
        let budget = MemoryBudget::new(2_000_000_000, 10, 0).unwrap();
        assert_eq!(budget.tree_bytes, 1_800_000_000);
        assert_eq!(budget.cache_entries, 200_000_000 / CACHE_ENTRY_SIZE);
    }

    #[test]
    fn test_memory_budget_too_small() {
        assert!(matches!(
            MemoryBudget::new(1_000, 10, 5_000),
            Err(ConfigError::EvaluatorMemory { .. })
        ));
        assert!(matches!(
            MemoryBudget::new(110_000_000, 1, 0),
            Err(ConfigError::CacheMemory { .. })
        ));
        assert!(matches!(
            MemoryBudget::new(150_000_000, 50, 0),
            Err(ConfigError::TreeMemory { .. })
        ));
        assert!(matches!(
            MemoryBudget::new(1_000_000_000, 0, 0),
            Err(ConfigError::CacheRatio(0))
        ));
    }
}
