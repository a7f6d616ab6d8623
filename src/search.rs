//! Parallel UCT search.
//!
//! [`UctSearch`] owns the tree and runs simulations on it from several
//! threads at once. Each simulation works on its own clone of the root
//! [`KoState`]; the only shared mutable data is the tree, whose statistics
//! are atomics and whose child lists are written only by the thread that
//! won the node's expansion.
//!
//! Between moves the tree is reused: the subtree reached by the moves
//! played since the last search becomes the new root and the rest is handed
//! to the [`Reclaimer`].

use std::ops::BitOr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::Instant;

use rayon::{ThreadPool, ThreadPoolBuilder};
use thiserror::Error;
use tracing::{debug, info};

use crate::analysis::{AnalysisLine, AnalyzeTags, format_analysis};
use crate::board::Color;
use crate::config::{ConfigError, SearchConfig, TimeManagement};
use crate::constants::{
    MIN_ESTIMATE_PLAYOUTS, MIN_ESTIMATE_TIME_CS, PASS, PROGRESS_INTERVAL_CS, UNLIMITED_PLAYOUTS,
    Vertex,
};
use crate::evaluator::Evaluator;
use crate::game::GameState;
use crate::network::{Network, max_score};
use crate::node::{UctNode, UctParams, min_psa_ratio, tree_size};
use crate::position::{KoState, Position};
use crate::reclaim::Reclaimer;
use crate::timecontrol::elapsed_centiseconds;

// ============================================================================
// Errors and Flags
// ============================================================================

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid search configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to build the search thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("failed to start the tree reclaimer: {0}")]
    Reclaimer(#[from] std::io::Error),
}

/// Restrictions on the move [`UctSearch::think`] may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassFlags(u8);

impl PassFlags {
    pub const NORMAL: PassFlags = PassFlags(0);
    /// Only pass when nothing else is reasonable.
    pub const NO_PASS: PassFlags = PassFlags(1);
    pub const NO_RESIGN: PassFlags = PassFlags(1 << 1);

    pub fn contains(self, other: PassFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for PassFlags {
    type Output = PassFlags;

    fn bitor(self, rhs: PassFlags) -> PassFlags {
        PassFlags(self.0 | rhs.0)
    }
}

/// Receives analysis reports while a search runs.
pub type AnalysisSink = Box<dyn Fn(&str) + Send + Sync>;

/// Shape of a search tree, as logged after each search.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TreeStats {
    pub nodes: usize,
    pub non_leaf_nodes: usize,
    pub depth_sum: usize,
    pub max_depth: usize,
    pub children_count: usize,
}

impl TreeStats {
    fn traverse(&mut self, node: &UctNode, depth: usize) {
        self.nodes += 1;
        if node.visits() > 1 {
            self.non_leaf_nodes += 1;
        }
        self.depth_sum += depth;
        self.max_depth = self.max_depth.max(depth);

        for child in node.children().iter() {
            match child.node() {
                Some(child) if child.visits() > 0 => {
                    self.children_count += 1;
                    self.traverse(child, depth + 1);
                }
                _ => {
                    self.nodes += 1;
                    self.depth_sum += depth + 1;
                    self.max_depth = self.max_depth.max(depth + 1);
                }
            }
        }
    }

    pub fn average_depth(&self) -> f32 {
        self.depth_sum as f32 / self.nodes.max(1) as f32
    }

    pub fn average_children(&self) -> f32 {
        self.children_count as f32 / self.non_leaf_nodes.max(1) as f32
    }
}

/// Walk the visited part of the tree below `node` and log its shape.
pub fn tree_stats(node: &UctNode) -> TreeStats {
    let mut stats = TreeStats::default();
    stats.traverse(node, 0);
    if stats.nodes > 0 {
        info!(
            "{:.1} average depth, {} max depth",
            stats.average_depth(),
            stats.max_depth
        );
        info!(
            "{} non leaf nodes, {:.2} average children",
            stats.non_leaf_nodes,
            stats.average_children()
        );
    }
    stats
}

// ============================================================================
// Search
// ============================================================================

pub struct UctSearch<E> {
    network: Arc<Network<E>>,
    params: UctParams,
    root: Box<UctNode>,
    /// Game as it was at the end of the previous search, for tree reuse.
    last_root_state: Option<GameState>,
    nodes: usize,
    playouts: AtomicI32,
    run: AtomicBool,
    max_playouts: i32,
    max_visits: i32,
    tags: AnalyzeTags,
    think_output: String,
    analysis_sink: Option<AnalysisSink>,
    rng: fastrand::Rng,
    pool: ThreadPool,
    reclaimer: Reclaimer,
}

impl<E: Evaluator> UctSearch<E> {
    pub fn new(network: Arc<Network<E>>, cfg: SearchConfig) -> Result<Self, SearchError> {
        cfg.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(cfg.threads.saturating_sub(1).max(1))
            .thread_name(|i| format!("uct-worker-{i}"))
            .build()?;
        let reclaimer = Reclaimer::new()?;

        Ok(UctSearch {
            network,
            max_playouts: cfg.max_playouts.min(UNLIMITED_PLAYOUTS),
            max_visits: cfg.max_visits.min(UNLIMITED_PLAYOUTS),
            rng: fastrand::Rng::with_seed(cfg.seed),
            params: UctParams::new(Arc::new(cfg)),
            root: Box::new(UctNode::new_root()),
            last_root_state: None,
            nodes: 0,
            playouts: AtomicI32::new(0),
            run: AtomicBool::new(false),
            tags: AnalyzeTags::default(),
            think_output: String::new(),
            analysis_sink: None,
            pool,
            reclaimer,
        })
    }

    // =========================================================================
    // Settings and Accessors
    // =========================================================================

    pub fn config(&self) -> &SearchConfig {
        &self.params.cfg
    }

    pub fn network(&self) -> &Network<E> {
        &self.network
    }

    pub fn root(&self) -> &UctNode {
        &self.root
    }

    /// Playouts completed by the current or last search.
    pub fn playouts(&self) -> i32 {
        self.playouts.load(Ordering::Relaxed)
    }

    /// Child slots in the tree after the last search.
    pub fn nodes(&self) -> usize {
        self.nodes
    }

    pub fn set_playout_limit(&mut self, playouts: i32) {
        self.max_playouts = playouts.min(UNLIMITED_PLAYOUTS);
    }

    pub fn set_visit_limit(&mut self, visits: i32) {
        self.max_visits = visits.min(UNLIMITED_PLAYOUTS);
    }

    pub fn set_analyze_tags(&mut self, tags: AnalyzeTags) {
        self.tags = tags;
    }

    pub fn analyze_tags(&self) -> &AnalyzeTags {
        &self.tags
    }

    /// Send analysis reports to `sink` instead of the log.
    pub fn set_analysis_sink(&mut self, sink: AnalysisSink) {
        self.analysis_sink = Some(sink);
    }

    pub fn clear_analysis_sink(&mut self) {
        self.analysis_sink = None;
    }

    /// Summary of the last [`UctSearch::think`] call.
    pub fn explain_last_think(&self) -> &str {
        &self.think_output
    }

    /// Forget the tree so the next search starts from scratch.
    pub fn clear_tree(&mut self) {
        self.last_root_state = None;
        let old_root = std::mem::replace(&mut self.root, Box::new(UctNode::new_root()));
        self.reclaimer.reclaim(old_root);
    }

    /// Block until detached subtrees are freed and [`tree_size`] is exact.
    pub fn wait_for_reclaim(&self) {
        self.reclaimer.wait_idle();
    }

    fn increment_playouts(&self) {
        self.playouts.fetch_add(1, Ordering::Relaxed);
    }

    fn is_running(&self) -> bool {
        self.run.load(Ordering::Relaxed) && tree_size() < self.params.cfg.max_tree_size
    }

    fn analysis_interval(&self) -> i32 {
        match self.tags.interval_centiseconds() {
            0 => self.params.cfg.analysis_interval_cs,
            interval => interval,
        }
    }

    // =========================================================================
    // Simulation
    // =========================================================================

    /// One descent from `node` to a leaf and back. Returns the backed up
    /// score (Black's point of view), or `None` when nothing was learned.
    pub fn play_simulation(&self, state: &mut KoState, node: &UctNode) -> Option<f32> {
        let cfg = &*self.params.cfg;
        let color = state.position().to_move();
        let mut result = None;

        node.virtual_loss();

        if node.expandable(0.0) {
            if state.position().passes() >= 2 {
                result = Some(state.position().final_score());
            } else {
                let had_children = node.has_children();
                let eval = node.create_children(
                    &self.network,
                    state,
                    min_psa_ratio(tree_size(), cfg.max_tree_size),
                    &self.tags,
                    cfg,
                );
                if !had_children {
                    result = eval;
                }
            }
        }

        if node.has_children() && result.is_none() {
            let is_root = std::ptr::eq(node, &*self.root);
            let position = state.position();
            let loss_score = max_score(position.size(), position.komi());
            if let Some(next) = node.uct_select_child(color, is_root, loss_score, &self.params) {
                let vertex = next.vertex();
                state.play_move(vertex);
                if vertex != PASS && state.super_ko() {
                    next.invalidate();
                } else {
                    result = self.play_simulation(state, &next);
                }
            }
        }

        if let Some(eval) = result {
            node.update(eval);
        }
        node.virtual_loss_undo();
        result
    }

    fn worker_loop(&self, root_state: &KoState) {
        loop {
            let mut state = root_state.clone();
            if self.play_simulation(&mut state, &self.root).is_some() {
                self.increment_playouts();
            }
            if !self.is_running() {
                break;
            }
        }
    }

    /// Run simulations on every thread until a stop condition holds. With a
    /// time budget the search may stop early under time management;
    /// without one it runs until `interrupt` is raised or a limit is hit.
    fn run_simulations(
        &self,
        game: &GameState,
        time_for_move: Option<i32>,
        interrupt: Option<&AtomicBool>,
    ) {
        let threads = self.params.cfg.threads;
        let quiet = self.params.cfg.quiet;
        let root_state = game.state();
        let interval = self.analysis_interval();
        let start = Instant::now();

        self.pool.in_place_scope(|scope| {
            for _ in 1..threads {
                scope.spawn(move |_| self.worker_loop(root_state));
            }

            let mut last_update = 0;
            let mut last_output = 0;
            loop {
                let mut state = root_state.clone();
                if self.play_simulation(&mut state, &self.root).is_some() {
                    self.increment_playouts();
                }

                let elapsed = elapsed_centiseconds(start);
                if interval > 0 && elapsed - last_output > interval {
                    last_output = elapsed;
                    self.output_analysis(game.position());
                }

                let keep_running = match time_for_move {
                    Some(time_for_move) => {
                        if !quiet && elapsed - last_update > PROGRESS_INTERVAL_CS {
                            last_update = elapsed;
                            info!("{}", self.get_analysis(game.position(), self.playouts()));
                        }
                        self.is_running()
                            && !self.stop_thinking(elapsed, time_for_move)
                            && self.have_alternate_moves(game, elapsed, time_for_move)
                    }
                    None => {
                        self.is_running()
                            && !self.stop_thinking(0, 1)
                            && !interrupt.is_some_and(|flag| flag.load(Ordering::Relaxed))
                    }
                };
                if !keep_running {
                    break;
                }
            }

            if interval > 0 && last_output == 0 {
                self.output_analysis(game.position());
            }
            self.run.store(false, Ordering::Relaxed);
        });
    }

    // =========================================================================
    // Entry Points
    // =========================================================================

    /// Search the position in `game` for `color` and return the chosen move.
    pub fn think(&mut self, game: &mut GameState, color: Color, flags: PassFlags) -> Vertex {
        game.start_clock(color);
        let start = Instant::now();

        self.update_root(game);
        game.set_to_move(color);

        let cfg = Arc::clone(&self.params.cfg);
        let time_for_move = game.time_control().max_time_for_move(
            game.board().size(),
            color,
            game.move_number(),
            cfg.time_manage,
            cfg.lag_buffer_cs,
        );
        info!("Thinking at most {:.1} seconds...", time_for_move as f32 / 100.0);

        let root_eval = self
            .root
            .prepare_root_node(&self.network, game.state(), &self.tags, &cfg);
        debug!("NN eval={root_eval:.6}");

        self.run.store(true, Ordering::Relaxed);
        self.run_simulations(game, Some(time_for_move), None);

        self.root.activate_children();
        game.stop_clock(color);

        if !self.root.has_children() || self.root.children().is_empty() {
            return PASS;
        }

        self.dump_stats(game.position(), &self.root);
        self.nodes = self.root.count_nodes();
        let elapsed = elapsed_centiseconds(start);
        info!(
            "{} visits, {} nodes, {} playouts, {:.0} n/s",
            self.root.visits(),
            self.nodes,
            self.playouts(),
            f64::from(self.playouts()) * 100.0 / f64::from(elapsed + 1)
        );

        let best_move = self.get_best_move(game, flags);
        self.think_output = format!(
            "move {}, {} => {}\n{}",
            game.move_number(),
            if color == Color::Black { 'B' } else { 'W' },
            game.position().move_to_text(best_move),
            self.get_analysis(game.position(), self.root.visits() as i32)
        );
        self.last_root_state = Some(game.clone());
        best_move
    }

    /// Search without a time limit until `interrupt` is raised or a playout
    /// or visit limit is reached.
    pub fn ponder(&mut self, game: &GameState, interrupt: &AtomicBool) {
        let disable_reuse = self.tags.has_move_restrictions();
        if disable_reuse {
            self.last_root_state = None;
        }

        self.update_root(game);
        let cfg = Arc::clone(&self.params.cfg);
        self.root
            .prepare_root_node(&self.network, game.state(), &self.tags, &cfg);

        self.run.store(true, Ordering::Relaxed);
        self.run_simulations(game, None, Some(interrupt));

        self.dump_stats(game.position(), &self.root);
        self.nodes = self.root.count_nodes();
        info!("{} visits, {} nodes", self.root.visits(), self.nodes);

        if !disable_reuse {
            self.last_root_state = Some(game.clone());
        }
    }

    // =========================================================================
    // Tree Reuse
    // =========================================================================

    /// Make the subtree for the position in `game` the new root, if the
    /// previous search was on an earlier position of the same game.
    fn advance_to_new_root_state(&mut self, game: &GameState) -> bool {
        let Some(last) = self.last_root_state.as_mut() else {
            return false;
        };
        if game.komi() != last.komi() {
            return false;
        }
        let Some(depth) = game.move_number().checked_sub(last.move_number()) else {
            return false;
        };

        let mut test = game.clone();
        for _ in 0..depth {
            test.undo_move();
        }
        if last.hash() != test.hash() {
            return false;
        }

        // Older subtrees must be gone before the counter drives this search.
        self.reclaimer.wait_idle();

        for _ in 0..depth {
            test.forward_move();
            let vertex = test.last_move();
            let next = self.root.find_child(vertex);
            let found = next.is_some();
            let old_root = std::mem::replace(
                &mut self.root,
                next.unwrap_or_else(|| Box::new(UctNode::new_root())),
            );
            self.reclaimer.reclaim(old_root);
            if !found {
                return false;
            }
            last.play_move(vertex);
        }

        debug_assert_eq!(game.move_number(), last.move_number());
        last.hash() == test.hash()
    }

    fn update_root(&mut self, game: &GameState) {
        self.playouts.store(0, Ordering::Relaxed);
        let start_nodes = self.root.count_nodes();

        if !self.advance_to_new_root_state(game) {
            let old_root = std::mem::replace(&mut self.root, Box::new(UctNode::new_root()));
            self.reclaimer.reclaim(old_root);
        }
        self.last_root_state = None;

        self.nodes = self.root.count_nodes_and_clear_expand_state();
        if self.nodes > 0 {
            debug!(
                "update_root, {} -> {} nodes ({:.1}% reused)",
                start_nodes,
                self.nodes,
                100.0 * self.nodes as f64 / start_nodes.max(1) as f64
            );
        }
    }

    // =========================================================================
    // Stopping Rules
    // =========================================================================

    fn stop_thinking(&self, elapsed_centiseconds: i32, time_for_move: i32) -> bool {
        self.playouts() >= self.max_playouts
            || self.root.visits() as i32 >= self.max_visits
            || elapsed_centiseconds >= time_for_move
    }

    /// Playouts still to come, from the limits and, once enough has been
    /// seen to trust it, the current playout rate.
    fn est_playouts_left(&self, elapsed_centiseconds: i32, time_for_move: i32) -> i32 {
        let playouts = self.playouts();
        let playouts_left = (self.max_playouts - playouts)
            .min(self.max_visits - self.root.visits() as i32)
            .max(0);
        if elapsed_centiseconds < MIN_ESTIMATE_TIME_CS || playouts < MIN_ESTIMATE_PLAYOUTS {
            return playouts_left;
        }
        let playout_rate = playouts as f32 / elapsed_centiseconds as f32;
        let time_left = (time_for_move - elapsed_centiseconds).max(0);
        playouts_left.min((playout_rate * time_left as f32).ceil() as i32)
    }

    /// Count root children that cannot catch up with the most visited one
    /// in the playouts left and do not already score above the best lower
    /// confidence bound. With `prune`, deactivate exactly those.
    fn prune_non_contenders(
        &self,
        color: Color,
        elapsed_centiseconds: i32,
        time_for_move: i32,
        prune: bool,
    ) -> usize {
        let playouts_left = self.est_playouts_left(elapsed_centiseconds, time_for_move);
        let children = self.root.children();

        let mut lcb_max = f32::NEG_INFINITY;
        let mut n_first = 0;
        for child in children.iter().filter(|c| c.valid()) {
            let visits = child.visits();
            if visits > 0 {
                lcb_max = lcb_max.max(child.get_eval_lcb(color, &self.params));
            }
            n_first = n_first.max(visits);
        }

        let min_required_visits = i64::from(n_first) - i64::from(playouts_left);
        let mut pruned_nodes = 0;
        for child in children.iter().filter(|c| c.valid()) {
            let visits = child.visits();
            let has_enough_visits = i64::from(visits) >= min_required_visits;
            let high_score = visits > 0 && child.get_eval(color) >= lcb_max;
            let prune_this_node = !(has_enough_visits || high_score);
            if prune {
                child.inflate().set_active(!prune_this_node);
            }
            if prune_this_node {
                pruned_nodes += 1;
            }
        }

        debug_assert!(children.is_empty() || pruned_nodes < children.len());
        pruned_nodes
    }

    fn have_alternate_moves(
        &self,
        game: &GameState,
        elapsed_centiseconds: i32,
        time_for_move: i32,
    ) -> bool {
        let time_manage = self.params.cfg.time_manage;
        if time_manage == TimeManagement::Off {
            return true;
        }

        let color = game.to_move();
        let prune = time_manage != TimeManagement::NoPruning;
        let pruned =
            self.prune_non_contenders(color, elapsed_centiseconds, time_for_move, prune);
        if pruned + 1 < self.root.children().len() {
            return true;
        }

        // Stopping early only pays off if the saved time can be used later.
        if (!game.time_control().can_accumulate_time(color)
            || self.max_playouts < UNLIMITED_PLAYOUTS)
            && time_manage != TimeManagement::Fast
        {
            return true;
        }

        let time_left = time_for_move - elapsed_centiseconds;
        if time_left > 50 {
            info!("{:.1}s left, stopping early.", time_left as f32 / 100.0);
        }
        false
    }

    // =========================================================================
    // Move Selection
    // =========================================================================

    /// Best root child that is not a pass or an own-eye fill, with its mean
    /// score when visited.
    fn no_pass_child(&self, position: &Position) -> Option<(Vertex, Option<f32>)> {
        let index = self.root.get_no_pass_child(position)?;
        let color = position.to_move();
        let children = self.root.children();
        let child = &children[index];
        let eval = (!child.first_visit()).then(|| child.get_eval(color));
        Some((child.vertex(), eval))
    }

    fn get_best_move(&mut self, game: &GameState, flags: PassFlags) -> Vertex {
        let cfg = Arc::clone(&self.params.cfg);
        let position = game.position();
        let color = position.to_move();

        let lcb_min_visits = cfg.lcb_min_visit_ratio * self.root.max_child_visits() as f32;
        self.root.sort_children(color, lcb_min_visits, &self.params);

        if game.move_number() < cfg.random_cnt {
            self.root.randomize_first_proportionally(
                cfg.random_temp,
                cfg.random_min_visits,
                &mut self.rng,
            );
        }

        let (mut best_move, mut best_eval) = {
            let children = self.root.children();
            let Some(first) = children.first() else {
                return PASS;
            };
            let eval = if first.first_visit() {
                0.0
            } else {
                first.get_eval(color)
            };
            (first.vertex(), eval)
        };
        let unvisited_eval = max_score(position.size(), position.komi());

        if flags.contains(PassFlags::NO_PASS) {
            if best_move == PASS {
                match self.no_pass_child(position) {
                    Some((vertex, eval)) => {
                        info!("Preferring not to pass.");
                        best_move = vertex;
                        best_eval = eval.unwrap_or(unvisited_eval);
                    }
                    None => info!("Pass is the only acceptable move."),
                }
            }
        } else if !cfg.dumb_pass {
            let relative_score = match color {
                Color::Black => game.final_score(),
                Color::White => -game.final_score(),
            };

            if best_move == PASS {
                if relative_score < 0.0 {
                    info!("Passing loses :-(");
                    match self.no_pass_child(position) {
                        Some((vertex, eval)) => {
                            info!("Avoiding pass because it loses.");
                            best_move = vertex;
                            best_eval = eval.unwrap_or(unvisited_eval);
                        }
                        None => info!("No alternative to passing."),
                    }
                } else if relative_score > 0.0 {
                    info!("Passing wins :-)");
                    if let Some((vertex, Some(eval))) = self.no_pass_child(position) {
                        if eval > relative_score {
                            info!("Avoiding pass because there could be a better alternative.");
                            best_move = vertex;
                            best_eval = eval;
                        }
                    }
                    if best_move == PASS {
                        info!("No seemingly better alternative to passing.");
                    }
                } else {
                    info!("Passing draws :-|");
                    if let Some((vertex, Some(eval))) = self.no_pass_child(position) {
                        if eval > 0.0 {
                            info!("Avoiding pass because there could be a winning alternative.");
                            best_move = vertex;
                            best_eval = eval;
                        }
                    }
                    if best_move == PASS {
                        info!("No seemingly better alternative to passing.");
                    }
                }
            } else if game.last_move() == PASS {
                if !position.is_move_allowed(color, PASS, &self.tags) {
                    info!("Passing is forbidden, I'll play on.");
                } else if relative_score < 0.0 {
                    info!("Passing loses, I'll play on.");
                } else if relative_score > 0.0 {
                    info!("Passing wins, I'll pass out unless there is a better alternative.");
                    match self.no_pass_child(position) {
                        Some((vertex, Some(eval))) if eval > relative_score => {
                            info!("Avoiding pass because there could be a better alternative.");
                            best_move = vertex;
                            best_eval = eval;
                        }
                        _ => {
                            best_move = PASS;
                            best_eval = relative_score;
                        }
                    }
                } else {
                    info!("Passing draws, make it depend on evaluation.");
                    if best_eval < 0.0 {
                        best_move = PASS;
                    }
                }
            }
        }

        debug!(best_eval, "selected {}", position.move_to_text(best_move));
        best_move
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    /// Principal variation below `parent`, following the best child at
    /// every level. Plays the moves on `position`.
    pub fn get_pv(&self, position: &mut Position, parent: &UctNode) -> String {
        if !parent.has_children() || parent.expandable(0.0) {
            return String::new();
        }
        let Some(index) = parent.get_best_root_child(position.to_move(), &self.params) else {
            return String::new();
        };
        let children = parent.children();
        let Some(best) = children[index].node() else {
            return String::new();
        };
        if best.first_visit() {
            return String::new();
        }

        let vertex = best.vertex();
        let mut result = position.move_to_text(vertex);
        position.play_move(vertex);
        let next = self.get_pv(position, best);
        if !next.is_empty() {
            result.push(' ');
            result.push_str(&next);
        }
        result
    }

    /// One-line progress report: playouts, root score and PV.
    pub fn get_analysis(&self, position: &Position, playouts: i32) -> String {
        let color = position.to_move();
        let mut temp = position.clone();
        let pv = self.get_pv(&mut temp, &self.root);
        let score = if self.root.visits() > 0 {
            self.root.get_eval(color)
        } else {
            0.0
        };
        format!("Playouts: {playouts}, Score: {score:5.2}, PV: {pv}")
    }

    /// Log the statistics of the best children of `parent`. Sorts the
    /// children, so only call with no simulations running.
    fn dump_stats(&self, position: &Position, parent: &UctNode) {
        if self.params.cfg.quiet || !parent.has_children() {
            return;
        }
        let color = position.to_move();
        let lcb_min_visits = self.params.cfg.lcb_min_visit_ratio * parent.max_child_visits() as f32;
        parent.sort_children(color, lcb_min_visits, &self.params);

        let children = parent.children();
        if children.first().is_none_or(|c| c.first_visit()) {
            return;
        }

        let min_score = -((position.size() * position.size()) as f32);
        for (i, child) in children.iter().enumerate() {
            if i >= 2 && child.first_visit() {
                break;
            }
            let vertex = child.vertex();
            let mv = position.move_to_text(vertex);
            let mut temp = position.clone();
            temp.play_move(vertex);
            let rest = child
                .node()
                .map(|node| self.get_pv(&mut temp, node))
                .unwrap_or_default();
            let eval = if child.first_visit() {
                0.0
            } else {
                child.get_eval(color)
            };
            info!(
                "{:>4} -> {:>7} (V: {:5.2}) (LCB: {:5.2}) (N: {:5.2}%) PV: {} {}",
                mv,
                child.visits(),
                eval,
                child.get_eval_lcb(color, &self.params).max(min_score),
                child.policy() * 100.0,
                mv,
                rest
            );
        }
        drop(children);

        tree_stats(parent);
    }

    /// Build the `info move ...` report for the root and hand it to the
    /// analysis sink.
    fn output_analysis(&self, position: &Position) {
        let parent = &*self.root;
        if !parent.has_children() {
            return;
        }
        let color = position.to_move();
        let max_visits = parent.max_child_visits() as f32;
        let lcb_ratio = self.params.cfg.lcb_min_visit_ratio;

        let mut lines = Vec::new();
        for child in parent.children().iter() {
            let visits = child.visits();
            if visits == 0 && lines.len() >= self.tags.post_move_count() {
                continue;
            }
            let vertex = child.vertex();
            let mv = position.move_to_text(vertex);
            let mut temp = position.clone();
            temp.play_move(vertex);
            let rest = child
                .node()
                .map(|node| self.get_pv(&mut temp, node))
                .unwrap_or_default();
            let pv = if rest.is_empty() {
                mv.clone()
            } else {
                format!("{mv} {rest}")
            };
            lines.push(AnalysisLine {
                mv,
                visits,
                score: if visits > 0 { child.get_eval(color) } else { 0.0 },
                prior: child.policy(),
                pv,
                lcb: child.get_eval_lcb(color, &self.params),
                lcb_ratio_exceeded: visits > 2 && visits as f32 > max_visits * lcb_ratio,
            });
        }

        let report = format_analysis(&mut lines);
        match &self.analysis_sink {
            Some(sink) => sink(&report),
            None => info!("{report}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::UniformEvaluator;
    use crate::playout::PlayoutEvaluator;
    use parking_lot::Mutex;

    fn search_with(cfg: SearchConfig) -> UctSearch<UniformEvaluator> {
        let network = Arc::new(Network::new(UniformEvaluator::new(), 10_000));
        UctSearch::new(network, cfg).unwrap()
    }

    #[test]
    fn test_pass_flags() {
        let flags = PassFlags::NO_PASS | PassFlags::NO_RESIGN;
        assert!(flags.contains(PassFlags::NO_PASS));
        assert!(flags.contains(PassFlags::NO_RESIGN));
        assert!(!PassFlags::NORMAL.contains(PassFlags::NO_PASS));
        assert!(PassFlags::default().contains(PassFlags::NORMAL));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let network = Arc::new(Network::new(UniformEvaluator::new(), 100));
        let result = UctSearch::new(network, SearchConfig::for_testing().with_threads(0));
        assert!(matches!(result, Err(SearchError::Config(ConfigError::NoThreads))));
    }

    #[test]
    fn test_think_returns_legal_move() {
        let mut search = search_with(SearchConfig::for_testing().with_playouts(100));
        let mut game = GameState::new(9, 7.5);
        let mv = search.think(&mut game, Color::Black, PassFlags::NORMAL);
        assert!(game.position().is_move_legal(Color::Black, mv));
        assert!(search.playouts() >= 100);
        assert!(search.root().visits() >= 100);
        assert!(search.explain_last_think().contains("=>"));
    }

    #[test]
    fn test_visit_limit_stops_search() {
        let mut search = search_with(SearchConfig::for_testing().with_playouts(UNLIMITED_PLAYOUTS));
        search.set_visit_limit(50);
        let mut game = GameState::new(9, 7.5);
        search.think(&mut game, Color::Black, PassFlags::NORMAL);
        let visits = search.root().visits();
        assert!((50..60).contains(&visits));
    }

    #[test]
    fn test_multithreaded_search() {
        let cfg = SearchConfig::for_testing().with_threads(4).with_playouts(400);
        let mut search = search_with(cfg);
        let mut game = GameState::new(9, 7.5);
        let mv = search.think(&mut game, Color::Black, PassFlags::NORMAL);
        assert!(game.position().is_move_legal(Color::Black, mv));
        // Each finished playout is one root visit; the first one expands
        // the root during preparation.
        assert!(search.root().visits() as i32 >= search.playouts());
        let children: u32 = search.root().children().iter().map(|c| c.visits()).sum();
        assert_eq!(children + 1, search.root().visits());
    }

    #[test]
    fn test_tree_reused_after_move() {
        let mut search = search_with(SearchConfig::for_testing().with_playouts(200));
        let mut game = GameState::new(9, 7.5);
        let mv = search.think(&mut game, Color::Black, PassFlags::NORMAL);
        let child_visits = search
            .root()
            .children()
            .iter()
            .find(|c| c.vertex() == mv)
            .map(|c| c.visits())
            .unwrap();
        assert!(child_visits > 0);

        game.play_move(mv);
        search.update_root(&game);
        assert_eq!(search.root().vertex(), mv);
        assert_eq!(search.root().visits(), child_visits);
    }

    #[test]
    fn test_komi_change_discards_tree() {
        let mut search = search_with(SearchConfig::for_testing().with_playouts(50));
        let mut game = GameState::new(9, 7.5);
        search.think(&mut game, Color::Black, PassFlags::NORMAL);
        game.set_komi(0.5);
        search.update_root(&game);
        assert_eq!(search.root().visits(), 0);
        assert!(!search.root().has_children());
    }

    #[test]
    fn test_analysis_reports_reach_sink() {
        let cfg = SearchConfig::for_testing()
            .with_playouts(60)
            .with_analysis_interval(1);
        let mut search = search_with(cfg);
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink_reports = Arc::clone(&reports);
        search.set_analysis_sink(Box::new(move |line: &str| {
            sink_reports.lock().push(line.to_string());
        }));

        let mut game = GameState::new(9, 7.5);
        search.think(&mut game, Color::Black, PassFlags::NORMAL);
        let reports = reports.lock();
        assert!(!reports.is_empty());
        assert!(reports.iter().all(|r| r.starts_with("info move ")));
    }

    #[test]
    fn test_ponder_stops_on_interrupt() {
        let mut search = search_with(SearchConfig::for_testing().with_playouts(UNLIMITED_PLAYOUTS));
        let game = GameState::new(9, 7.5);
        // Raised before the search: exactly one simulation runs.
        let interrupt = AtomicBool::new(true);
        search.ponder(&game, &interrupt);
        assert!(search.playouts() <= 1);
    }

    #[test]
    fn test_no_pass_flag_avoids_pass() {
        // Dumb pass puts pass among the root children.
        let cfg = SearchConfig::for_testing().with_playouts(50).with_dumb_pass(true);
        let network = Arc::new(Network::new(PlayoutEvaluator::new(2), 10_000));
        let mut search = UctSearch::new(network, cfg).unwrap();
        let mut game = GameState::new(5, 0.5);
        let mv = search.think(&mut game, Color::Black, PassFlags::NO_PASS);
        assert_ne!(mv, PASS);
    }

    fn play_sequence(game: &mut GameState, moves: &[(Color, &str)]) {
        for &(color, text) in moves {
            let vertex = game.board().text_to_move(text);
            game.play_move_color(color, vertex);
        }
    }

    #[test]
    fn test_passes_out_when_won_and_nothing_scores_higher() {
        // Black owns the whole 5x5 board and white has just passed. No
        // board move can score above passing, so the engine passes even
        // though its first child is a board move.
        let mut search = search_with(SearchConfig::for_testing().with_playouts(60));
        let mut game = GameState::new(5, 0.5);
        play_sequence(
            &mut game,
            &[
                (Color::Black, "C1"),
                (Color::White, "pass"),
                (Color::Black, "C2"),
                (Color::White, "pass"),
                (Color::Black, "C3"),
                (Color::White, "pass"),
                (Color::Black, "C4"),
                (Color::White, "pass"),
                (Color::Black, "C5"),
                (Color::White, "pass"),
            ],
        );
        assert_eq!(game.final_score(), 24.5);

        let mv = search.think(&mut game, Color::Black, PassFlags::NORMAL);
        assert_eq!(mv, PASS);
        assert!(search.root().children().iter().any(|c| c.vertex() != PASS));
    }

    #[test]
    fn test_plays_on_after_pass_when_passing_loses() {
        let mut search = search_with(SearchConfig::for_testing().with_playouts(60));
        let mut game = GameState::new(5, 0.5);
        play_sequence(
            &mut game,
            &[
                (Color::White, "C1"),
                (Color::Black, "pass"),
                (Color::White, "C2"),
                (Color::Black, "pass"),
                (Color::White, "C3"),
                (Color::Black, "pass"),
                (Color::White, "C4"),
                (Color::Black, "pass"),
                (Color::White, "C5"),
                (Color::Black, "A1"),
                (Color::White, "pass"),
            ],
        );
        assert!(game.final_score() < 0.0);

        let mv = search.think(&mut game, Color::Black, PassFlags::NORMAL);
        assert_ne!(mv, PASS);
        assert!(game.position().is_move_legal(Color::Black, mv));
    }

    #[test]
    fn test_tree_stats_counts_leaves() {
        let mut search = search_with(SearchConfig::for_testing().with_playouts(30));
        let mut game = GameState::new(5, 7.5);
        search.think(&mut game, Color::Black, PassFlags::NORMAL);
        let stats = tree_stats(search.root());
        assert!(stats.nodes > search.root().children().len());
        assert!(stats.max_depth >= 1);
    }
}
