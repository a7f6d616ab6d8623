//! Michi-Zero: a parallel UCT Go engine.
//!
//! The engine searches with a PUCT-style Monte Carlo tree shared by several
//! threads. Positions are evaluated by a pluggable [`evaluator::Evaluator`]
//! (a policy over moves plus a value), with results cached by position hash.
//! The tree is kept between moves and detached subtrees are freed on a
//! background thread.
//!
//! ## Modules
//!
//! - [`constants`] - Board dimensions, vertex sentinels and search defaults
//! - [`zobrist`] - Zobrist hashing tables
//! - [`board`] - Incremental board with union-find strings, captures and scoring
//! - [`position`] - Rules layer and positional superko tracking
//! - [`game`] - Game record with undo, handicap and clocks
//! - [`timecontrol`] - Main time and byo-yomi clocks, per-move time budget
//! - [`evaluator`] - The evaluator interface and board symmetries
//! - [`playout`] - Evaluator built on random playouts
//! - [`cache`] - Bounded evaluation cache
//! - [`network`] - Cached evaluation front end and score mapping
//! - [`config`] - Search configuration and memory budget
//! - [`analysis`] - Move restrictions and analysis output
//! - [`node`] - Concurrent tree nodes and tree size accounting
//! - [`reclaim`] - Background teardown of detached subtrees
//! - [`search`] - Parallel search, tree reuse and move selection
//! - [`gtp`] - Go Text Protocol front end
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use michi_zero::config::SearchConfig;
//! use michi_zero::game::GameState;
//! use michi_zero::network::Network;
//! use michi_zero::playout::PlayoutEvaluator;
//! use michi_zero::search::{PassFlags, UctSearch};
//!
//! let network = Arc::new(Network::new(PlayoutEvaluator::default(), 10_000));
//! let cfg = SearchConfig::for_testing().with_playouts(50);
//! let mut search = UctSearch::new(network, cfg).unwrap();
//!
//! let mut game = GameState::new(9, 7.5);
//! let color = game.to_move();
//! let best = search.think(&mut game, color, PassFlags::NORMAL);
//! game.play_move(best);
//! println!("Best move: {}", game.position().move_to_text(best));
//! ```

pub mod analysis;
pub mod board;
pub mod cache;
pub mod config;
pub mod constants;
pub mod evaluator;
pub mod game;
pub mod gtp;
pub mod network;
pub mod node;
pub mod playout;
pub mod position;
pub mod reclaim;
pub mod search;
pub mod timecontrol;
pub mod zobrist;
