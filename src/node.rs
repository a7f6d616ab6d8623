//! Search tree nodes and lazily inflated child slots.
//!
//! A node's children are [`ChildSlot`]s. An unvisited slot is just a move
//! and its prior; the full [`UctNode`] is only allocated when a simulation
//! first descends into it. Two threads may race to inflate the same slot:
//! both allocate, exactly one allocation is installed and the other is
//! dropped.
//!
//! Node statistics are atomics and are always kept from Black's point of
//! view; `get_eval(color)` flips the sign for White. A node's child list is
//! written only by the thread that won its expansion (see [`ExpandState`]).
//!
//! Every live node and slot is counted in a process-wide byte counter,
//! [`tree_size`], which drives [`min_psa_ratio`].

use std::cmp::Ordering;
use std::mem;
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, OnceLock};

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};

use crate::analysis::AnalyzeTags;
use crate::board::Color;
use crate::config::SearchConfig;
use crate::constants::{PASS, VIRTUAL_LOSS_COUNT, Vertex};
use crate::evaluator::Evaluator;
use crate::network::{Ensemble, Network};
use crate::position::{KoState, Position};

// ============================================================================
// Tree Size Accounting
// ============================================================================

static TREE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Memory held by all live nodes and child slots, in bytes.
pub fn tree_size() -> usize {
    TREE_SIZE.load(AtomicOrdering::Relaxed)
}

fn increment_tree_size(bytes: usize) {
    TREE_SIZE.fetch_add(bytes, AtomicOrdering::Relaxed);
}

fn decrement_tree_size(bytes: usize) {
    let previous = TREE_SIZE.fetch_sub(bytes, AtomicOrdering::Relaxed);
    debug_assert!(previous >= bytes);
}

/// Bytes counted for one node.
pub const NODE_SIZE: usize = mem::size_of::<UctNode>();

/// Bytes counted for one child slot.
pub const SLOT_SIZE: usize = mem::size_of::<ChildSlot>();

/// Smallest prior, relative to the best sibling, a move needs to get a child
/// slot when the tree holds `tree_size` of `max_tree_size` bytes.
///
/// Returns a value above 1.0 (no prior qualifies) once the budget is spent.
pub fn min_psa_ratio(tree_size: usize, max_tree_size: usize) -> f32 {
    let mem_full = tree_size as f64 / max_tree_size.max(1) as f64;
    if mem_full >= 1.0 {
        2.0
    } else if mem_full > 0.95 {
        0.01
    } else if mem_full > 0.5 {
        0.001
    } else {
        0.0
    }
}

// ============================================================================
// Atomic Floats
// ============================================================================

struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(AtomicOrdering::Relaxed))
    }

    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), AtomicOrdering::Relaxed);
    }

    fn fetch_add(&self, delta: f32) {
        let _ = self
            .0
            .fetch_update(AtomicOrdering::Relaxed, AtomicOrdering::Relaxed, |bits| {
                Some((f32::from_bits(bits) + delta).to_bits())
            });
    }
}

struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(AtomicOrdering::Relaxed))
    }

    fn fetch_add(&self, delta: f64) {
        let _ = self
            .0
            .fetch_update(AtomicOrdering::Relaxed, AtomicOrdering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + delta).to_bits())
            });
    }
}

// ============================================================================
// Student-t Quantiles
// ============================================================================

/// Degrees of freedom covered by the quantile table; beyond this the
/// quantile is flat enough to reuse the last entry.
const T_QUANTILE_ENTRIES: usize = 1000;

/// Search configuration plus constants derived from it once per search.
pub struct UctParams {
    pub cfg: Arc<SearchConfig>,
    t_quantiles: Vec<f32>,
}

impl UctParams {
    pub fn new(cfg: Arc<SearchConfig>) -> Self {
        let p = 1.0 - f64::from(cfg.ci_alpha);
        let t_quantiles = (1..=T_QUANTILE_ENTRIES)
            .map(|dof| student_t_quantile(p, dof as f64) as f32)
            .collect();
        Self { cfg, t_quantiles }
    }

    /// Upper `1 - ci_alpha` quantile of Student's t with `dof` degrees of freedom.
    pub fn t_quantile(&self, dof: u32) -> f32 {
        let i = (dof.max(1) as usize).min(T_QUANTILE_ENTRIES) - 1;
        self.t_quantiles[i]
    }
}

fn ln_gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEF: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let t = x + G + 0.5;
    let mut a = COEF[0];
    for (i, c) in COEF.iter().enumerate().skip(1) {
        a += c / (x + i as f64);
    }
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

/// Continued fraction for the regularized incomplete beta function.
fn beta_cf(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 300;
    const EPS: f64 = 1e-15;
    const TINY: f64 = 1e-300;

    let clamp = |v: f64| if v.abs() < TINY { TINY } else { v };
    let (qab, qap, qam) = (a + b, a + 1.0, a - 1.0);
    let mut c = 1.0;
    let mut d = 1.0 / clamp(1.0 - qab * x / qap);
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;
        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / clamp(1.0 + aa * d);
        c = clamp(1.0 + aa / c);
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / clamp(1.0 + aa * d);
        c = clamp(1.0 + aa / c);
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let front =
        (ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln()).exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_cf(a, b, x) / a
    } else {
        1.0 - front * beta_cf(b, a, 1.0 - x) / b
    }
}

/// `P(T > t)` for `t >= 0`.
fn student_t_upper_tail(t: f64, dof: f64) -> f64 {
    0.5 * incomplete_beta(dof / 2.0, 0.5, dof / (dof + t * t))
}

/// Quantile `p` (above one half) of Student's t distribution.
pub fn student_t_quantile(p: f64, dof: f64) -> f64 {
    debug_assert!(p > 0.5 && p < 1.0);
    let alpha = 1.0 - p;

    let mut hi = 1.0;
    while student_t_upper_tail(hi, dof) > alpha && hi < 1e12 {
        hi *= 2.0;
    }
    let mut lo = 0.0;
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if student_t_upper_tail(mid, dof) > alpha {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

// ============================================================================
// Node State
// ============================================================================

/// Whether a node takes part in the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeStatus {
    /// Leads to a superko repetition or is otherwise forbidden. Permanent.
    Invalid = 0,
    /// Temporarily excluded by time management.
    Pruned = 1,
    Active = 2,
}

impl NodeStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => NodeStatus::Invalid,
            1 => NodeStatus::Pruned,
            _ => NodeStatus::Active,
        }
    }
}

/// Who may write a node's child list.
///
/// `Initial -> Expanding` is claimed by exactly one thread with a
/// compare-and-swap; that thread ends in `Expanded`, or goes back to
/// `Initial` if it gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExpandState {
    Initial = 0,
    Expanding = 1,
    Expanded = 2,
}

impl ExpandState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ExpandState::Initial,
            1 => ExpandState::Expanding,
            _ => ExpandState::Expanded,
        }
    }
}

// ============================================================================
// Child Slots
// ============================================================================

/// Read-only view of a child slot.
#[derive(Clone, Copy)]
pub enum Child<'a> {
    /// Not visited yet: only the move and its prior exist.
    Pending { vertex: Vertex, policy: f32 },
    Node(&'a UctNode),
}

/// A child of a node: a move with its prior, inflated into a full node on
/// first visit.
pub struct ChildSlot {
    vertex: Vertex,
    policy: f32,
    node: OnceLock<Box<UctNode>>,
}

impl ChildSlot {
    fn new(vertex: Vertex, policy: f32) -> Self {
        increment_tree_size(SLOT_SIZE);
        ChildSlot {
            vertex,
            policy,
            node: OnceLock::new(),
        }
    }

    pub fn get(&self) -> Child<'_> {
        match self.node.get() {
            Some(node) => Child::Node(node),
            None => Child::Pending {
                vertex: self.vertex,
                policy: self.policy,
            },
        }
    }

    /// The inflated node, if any.
    pub fn node(&self) -> Option<&UctNode> {
        self.node.get().map(|b| &**b)
    }

    pub fn is_inflated(&self) -> bool {
        self.node.get().is_some()
    }

    /// The node for this slot, allocating it on first use.
    pub fn inflate(&self) -> &UctNode {
        if self.node.get().is_none() {
            // When another thread wins the race our node is handed back and dropped.
            let _ = self
                .node
                .set(Box::new(UctNode::new(self.vertex, self.policy)));
        }
        self.node
            .get_or_init(|| Box::new(UctNode::new(self.vertex, self.policy)))
    }

    /// Detach the inflated node, leaving the slot uninflated.
    pub fn take(&mut self) -> Option<Box<UctNode>> {
        self.node.take()
    }

    pub fn vertex(&self) -> Vertex {
        self.vertex
    }

    pub fn policy(&self) -> f32 {
        self.policy
    }

    pub fn visits(&self) -> u32 {
        self.node().map_or(0, UctNode::visits)
    }

    pub fn first_visit(&self) -> bool {
        self.visits() == 0
    }

    pub fn valid(&self) -> bool {
        self.node().is_none_or(UctNode::valid)
    }

    pub fn active(&self) -> bool {
        self.node().is_none_or(UctNode::active)
    }

    /// Mean score for `color`; only meaningful once visited.
    pub fn get_eval(&self, color: Color) -> f32 {
        self.node().map_or(0.0, |n| n.get_eval(color))
    }

    pub fn get_eval_lcb(&self, color: Color, params: &UctParams) -> f32 {
        self.node()
            .map_or(UNVISITED_LCB, |n| n.get_eval_lcb(color, params))
    }
}

impl Drop for ChildSlot {
    fn drop(&mut self) {
        decrement_tree_size(SLOT_SIZE);
    }
}

/// Lower confidence bound reported for nodes with too few visits.
const UNVISITED_LCB: f32 = -1e6;

/// Ordering of children, best first: children with more than
/// `lcb_min_visits` visits by lower confidence bound, then by visits, then
/// by prior for unvisited children or mean score for visited ones.
///
/// A child over the visit threshold always has more visits than one under
/// it, so ranking trusted children first agrees with ranking by visits.
pub fn compare_children(
    a: &ChildSlot,
    b: &ChildSlot,
    color: Color,
    lcb_min_visits: f32,
    params: &UctParams,
) -> Ordering {
    let threshold = lcb_min_visits.max(2.0);
    let (a_visits, b_visits) = (a.visits(), b.visits());
    let by_visits = || {
        b_visits.cmp(&a_visits).then_with(|| {
            if a_visits == 0 {
                b.policy().total_cmp(&a.policy())
            } else {
                b.get_eval(color).total_cmp(&a.get_eval(color))
            }
        })
    };

    match (a_visits as f32 > threshold, b_visits as f32 > threshold) {
        (true, true) => b
            .get_eval_lcb(color, params)
            .total_cmp(&a.get_eval_lcb(color, params))
            .then_with(by_visits),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => by_visits(),
    }
}

// ============================================================================
// Nodes
// ============================================================================

pub struct UctNode {
    vertex: Vertex,
    policy: f32,

    visits: AtomicU32,
    virtual_loss: AtomicU32,
    /// Sum of backed up scores, Black's point of view.
    black_evals: AtomicF64,
    /// Welford running sum of squared deviations.
    squared_eval_diff: AtomicF32,
    /// Evaluator score at expansion, Black's point of view.
    net_eval: AtomicF32,
    /// Prior ratio below which moves were left out of the child list. 2.0
    /// before the first expansion, 0.0 once every legal move has a slot.
    min_psa_ratio_children: AtomicF32,
    status: AtomicU8,
    expand_state: AtomicU8,

    children: RwLock<Vec<ChildSlot>>,
}

impl Drop for UctNode {
    fn drop(&mut self) {
        decrement_tree_size(NODE_SIZE);
    }
}

impl UctNode {
    pub fn new(vertex: Vertex, policy: f32) -> Self {
        increment_tree_size(NODE_SIZE);
        UctNode {
            vertex,
            policy,
            visits: AtomicU32::new(0),
            virtual_loss: AtomicU32::new(0),
            black_evals: AtomicF64::new(0.0),
            squared_eval_diff: AtomicF32::new(0.0),
            net_eval: AtomicF32::new(0.0),
            min_psa_ratio_children: AtomicF32::new(2.0),
            status: AtomicU8::new(NodeStatus::Active as u8),
            expand_state: AtomicU8::new(ExpandState::Initial as u8),
            children: RwLock::new(Vec::new()),
        }
    }

    /// A fresh search root.
    pub fn new_root() -> Self {
        Self::new(PASS, 0.0)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn vertex(&self) -> Vertex {
        self.vertex
    }

    pub fn policy(&self) -> f32 {
        self.policy
    }

    pub fn visits(&self) -> u32 {
        self.visits.load(AtomicOrdering::Relaxed)
    }

    pub fn virtual_losses(&self) -> u32 {
        self.virtual_loss.load(AtomicOrdering::Relaxed)
    }

    pub fn first_visit(&self) -> bool {
        self.visits() == 0
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus::from_u8(self.status.load(AtomicOrdering::Relaxed))
    }

    pub fn valid(&self) -> bool {
        self.status() != NodeStatus::Invalid
    }

    pub fn active(&self) -> bool {
        self.status() == NodeStatus::Active
    }

    /// Remove this node from the search for good.
    pub fn invalidate(&self) {
        self.status
            .store(NodeStatus::Invalid as u8, AtomicOrdering::Relaxed);
    }

    /// Prune or restore a valid node. Invalid nodes stay invalid.
    pub fn set_active(&self, active: bool) {
        if self.valid() {
            let status = if active {
                NodeStatus::Active
            } else {
                NodeStatus::Pruned
            };
            self.status.store(status as u8, AtomicOrdering::Relaxed);
        }
    }

    pub fn expand_state(&self) -> ExpandState {
        ExpandState::from_u8(self.expand_state.load(AtomicOrdering::Acquire))
    }

    /// Shared access to the child list.
    pub fn children(&self) -> RwLockReadGuard<'_, Vec<ChildSlot>> {
        self.children.read()
    }

    pub fn children_mut(&mut self) -> &mut Vec<ChildSlot> {
        self.children.get_mut()
    }

    /// Whether a child list exists (possibly partial).
    pub fn has_children(&self) -> bool {
        self.min_psa_ratio_children.load() <= 1.0
    }

    /// Whether expanding with threshold `min_psa_ratio` would add children.
    pub fn expandable(&self, min_psa_ratio: f32) -> bool {
        min_psa_ratio < self.min_psa_ratio_children.load()
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Back up one simulation result (Black's point of view).
    pub fn update(&self, eval: f32) {
        let old_eval = self.black_evals.load() as f32;
        let old_visits = self.visits();
        let old_delta = if old_visits > 0 {
            eval - old_eval / old_visits as f32
        } else {
            0.0
        };
        self.visits.fetch_add(1, AtomicOrdering::Relaxed);
        self.black_evals.fetch_add(f64::from(eval));
        let new_delta = eval - (old_eval + eval) / (old_visits + 1) as f32;
        self.squared_eval_diff.fetch_add(old_delta * new_delta);
    }

    /// Mark a simulation in flight below this node.
    pub fn virtual_loss(&self) {
        self.virtual_loss
            .fetch_add(VIRTUAL_LOSS_COUNT, AtomicOrdering::Relaxed);
    }

    pub fn virtual_loss_undo(&self) {
        self.virtual_loss
            .fetch_sub(VIRTUAL_LOSS_COUNT, AtomicOrdering::Relaxed);
    }

    /// Mean backed up score for `color`.
    pub fn get_eval(&self, color: Color) -> f32 {
        let visits = self.visits();
        debug_assert!(visits > 0);
        let eval = (self.black_evals.load() / f64::from(visits.max(1))) as f32;
        if color == Color::White { -eval } else { eval }
    }

    /// Mean score for `color` with every pending virtual visit counted as a
    /// loss of `loss_score` points.
    pub fn get_eval_with_virtual_loss(&self, color: Color, loss_score: f32) -> f32 {
        let in_flight = f64::from(self.virtual_losses());
        let total = f64::from(self.visits()) + in_flight;
        if total == 0.0 {
            return 0.0;
        }
        let black = self.black_evals.load();
        let own = if color == Color::White { -black } else { black };
        ((own - in_flight * f64::from(loss_score)) / total) as f32
    }

    /// Evaluator score at expansion, for `color`.
    pub fn get_net_eval(&self, color: Color) -> f32 {
        let eval = self.net_eval.load();
        if color == Color::White { -eval } else { eval }
    }

    pub fn get_eval_variance(&self, default_var: f32) -> f32 {
        let visits = self.visits();
        if visits > 1 {
            self.squared_eval_diff.load() / (visits - 1) as f32
        } else {
            default_var
        }
    }

    /// Lower confidence bound of the mean score for `color`.
    pub fn get_eval_lcb(&self, color: Color, params: &UctParams) -> f32 {
        let visits = self.visits();
        if visits < 2 {
            return UNVISITED_LCB + visits as f32;
        }
        let mean = self.get_eval(color);
        let stddev = (self.get_eval_variance(1.0) / visits as f32).sqrt();
        mean - params.t_quantile(visits - 1) * stddev
    }

    // =========================================================================
    // Expansion
    // =========================================================================

    fn acquire_expanding(&self) -> bool {
        self.expand_state
            .compare_exchange(
                ExpandState::Initial as u8,
                ExpandState::Expanding as u8,
                AtomicOrdering::AcqRel,
                AtomicOrdering::Acquire,
            )
            .is_ok()
    }

    fn expand_done(&self) {
        let previous = self
            .expand_state
            .swap(ExpandState::Expanded as u8, AtomicOrdering::Release);
        debug_assert_eq!(previous, ExpandState::Expanding as u8);
    }

    fn expand_cancel(&self) {
        let previous = self
            .expand_state
            .swap(ExpandState::Initial as u8, AtomicOrdering::Release);
        debug_assert_eq!(previous, ExpandState::Expanding as u8);
    }

    /// Evaluate `state` and link children for its legal moves. Returns the
    /// evaluator score (Black's point of view) when this call did the
    /// expansion; `None` if another thread owns it or nothing can be added.
    pub fn create_children<E: Evaluator>(
        &self,
        network: &Network<E>,
        state: &KoState,
        min_psa_ratio: f32,
        tags: &AnalyzeTags,
        cfg: &SearchConfig,
    ) -> Option<f32> {
        let position = state.position();
        if position.passes() >= 2 {
            return None;
        }
        if !self.acquire_expanding() {
            return None;
        }
        if !self.expandable(min_psa_ratio) {
            self.expand_done();
            return None;
        }

        let raw = network.get_output(position, Ensemble::RandomSymmetry, true, true);
        let to_move = position.to_move();
        let stm_eval = raw.score;
        let black_eval = if to_move == Color::White {
            -stm_eval
        } else {
            stm_eval
        };
        self.net_eval.store(black_eval);

        let nodelist = legal_priors(position, &raw.policy, raw.policy_pass, stm_eval, tags, cfg);
        if nodelist.is_empty() {
            // Every move is restricted; leave the node for another attempt.
            self.expand_cancel();
            return None;
        }
        self.link_nodelist(nodelist, min_psa_ratio);
        self.expand_done();
        Some(black_eval)
    }

    /// Append children whose relative prior falls between the new and the
    /// previous threshold, best first.
    fn link_nodelist(&self, mut nodelist: Vec<(f32, Vertex)>, min_psa_ratio: f32) {
        debug_assert!(min_psa_ratio < self.min_psa_ratio_children.load());
        nodelist.sort_by(|a, b| b.0.total_cmp(&a.0));

        let max_psa = nodelist[0].0;
        let old_min_psa = max_psa * self.min_psa_ratio_children.load();
        let new_min_psa = max_psa * min_psa_ratio;

        let mut children = self.children.write();
        let mut skipped = false;
        for (psa, vertex) in nodelist {
            if psa < new_min_psa {
                skipped = true;
            } else if psa < old_min_psa {
                children.push(ChildSlot::new(vertex, psa));
            }
        }
        self.min_psa_ratio_children
            .store(if skipped { min_psa_ratio } else { 0.0 });
    }

    /// Child slots in this subtree.
    pub fn count_nodes(&self) -> usize {
        let children = self.children.read();
        children.len()
            + children
                .iter()
                .filter_map(ChildSlot::node)
                .map(UctNode::count_nodes)
                .sum::<usize>()
    }

    /// Allow nodes whose child list was cut short by the memory threshold to
    /// be expanded again, and count the slots in this subtree.
    pub fn count_nodes_and_clear_expand_state(&self) -> usize {
        let children = self.children.read();
        let mut count = children.len();
        if self.expandable(0.0) {
            self.expand_state
                .store(ExpandState::Initial as u8, AtomicOrdering::Release);
        }
        for child in children.iter() {
            if let Some(node) = child.node() {
                count += node.count_nodes_and_clear_expand_state();
            }
        }
        count
    }

    // =========================================================================
    // Selection
    // =========================================================================

    /// Pick the child to descend into, inflating it if needed.
    pub fn uct_select_child(
        &self,
        color: Color,
        is_root: bool,
        loss_score: f32,
        params: &UctParams,
    ) -> Option<MappedRwLockReadGuard<'_, UctNode>> {
        let cfg = &*params.cfg;
        let children = self.children.read();

        let mut parent_visits = 0u64;
        let mut total_visited_policy = 0.0f32;
        for child in children.iter().filter(|c| c.valid()) {
            let visits = child.visits();
            parent_visits += u64::from(visits);
            if visits > 0 {
                total_visited_policy += child.policy();
            }
        }

        let parent_visits = parent_visits as f64;
        let numerator = (parent_visits
            * (f64::from(cfg.log_puct) * parent_visits + f64::from(cfg.log_const)).ln())
        .sqrt();
        let reduction = if is_root {
            cfg.fpu_root_reduction
        } else {
            cfg.fpu_reduction
        };
        let fpu_reduction = reduction * total_visited_policy.sqrt();
        let fpu_eval = self.get_net_eval(color) - fpu_reduction;

        let mut best = None;
        let mut best_value = f64::MIN;
        for (i, child) in children.iter().enumerate() {
            if !child.active() {
                continue;
            }
            let mut in_flight = 0;
            let eval = match child.get() {
                // Descending into a node being expanded would block on it.
                Child::Node(node) if node.expand_state() == ExpandState::Expanding => {
                    UNVISITED_LCB - fpu_reduction
                }
                Child::Node(node) if node.visits() > 0 => {
                    in_flight = node.virtual_losses();
                    node.get_eval_with_virtual_loss(color, loss_score)
                }
                Child::Node(node) => {
                    in_flight = node.virtual_losses();
                    fpu_eval
                }
                Child::Pending { .. } => fpu_eval,
            };
            let denom = 1.0 + f64::from(child.visits()) + f64::from(in_flight);
            let puct = f64::from(cfg.puct) * f64::from(child.policy()) * (numerator / denom);
            let value = f64::from(eval) + puct;
            if value > best_value {
                best_value = value;
                best = Some(i);
            }
        }

        let best = best?;
        Some(RwLockReadGuard::map(children, |c| c[best].inflate()))
    }

    /// Index of the best child under [`compare_children`], trusting the
    /// bound of children with `lcb_min_visit_ratio` of the top visit count.
    pub fn get_best_root_child(&self, color: Color, params: &UctParams) -> Option<usize> {
        let lcb_min_visits = params.cfg.lcb_min_visit_ratio * self.max_child_visits() as f32;
        let children = self.children.read();
        children
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| compare_children(a, b, color, lcb_min_visits, params))
            .map(|(i, _)| i)
    }

    /// Most visits among the children.
    pub fn max_child_visits(&self) -> u32 {
        self.children
            .read()
            .iter()
            .map(ChildSlot::visits)
            .max()
            .unwrap_or(0)
    }

    /// Sort children best first. Only call with no simulations running.
    pub fn sort_children(&self, color: Color, lcb_min_visits: f32, params: &UctParams) {
        let mut children = self.children.write();
        children.sort_by(|a, b| compare_children(a, b, color, lcb_min_visits, params));
    }

    /// Swap a random child into first place, with probability proportional
    /// to `visits ^ (1 / temperature)` among children with more than
    /// `min_visits` visits. Assumes children are sorted by visits.
    pub fn randomize_first_proportionally(
        &mut self,
        temperature: f32,
        min_visits: u32,
        rng: &mut fastrand::Rng,
    ) {
        let children = self.children.get_mut();
        let Some(first) = children.first() else {
            return;
        };
        let norm = f64::from(first.visits());
        if first.visits() <= min_visits {
            return;
        }

        let mut accum = 0.0;
        let mut accum_vector = Vec::with_capacity(children.len());
        for child in children.iter() {
            let visits = child.visits();
            if visits > min_visits {
                accum += (f64::from(visits) / norm).powf(1.0 / f64::from(temperature));
            }
            accum_vector.push(accum);
        }

        let pick = rng.f64() * accum;
        let index = accum_vector
            .iter()
            .position(|&a| pick < a)
            .unwrap_or(0);
        if index > 0 {
            children.swap(0, index);
        }
    }

    /// First child that is neither pass nor an eye fill for the side to move.
    pub fn get_no_pass_child(&self, position: &Position) -> Option<usize> {
        let to_move = position.to_move();
        self.children.read().iter().position(|child| {
            child.valid()
                && child.vertex() != PASS
                && !position.board.is_eye(child.vertex(), to_move)
        })
    }

    /// Detach the subtree reached by `vertex`, inflating it if needed.
    pub fn find_child(&mut self, vertex: Vertex) -> Option<Box<UctNode>> {
        let children = self.children.get_mut();
        let slot = children.iter_mut().find(|c| c.vertex() == vertex)?;
        slot.inflate();
        slot.take()
    }

    pub fn inflate_all_children(&self) {
        for child in self.children.read().iter() {
            child.inflate();
        }
    }

    /// Drop children whose move recreates an earlier position, and pass when
    /// it is restricted and other moves remain.
    pub fn kill_superkos(&mut self, state: &KoState, tags: &AnalyzeTags) {
        let position = state.position();
        let to_move = position.to_move();
        let children = self.children.get_mut();

        let mut valid_count = 0;
        let mut pass_index = None;
        for (i, child) in children.iter().enumerate() {
            if child.vertex() == PASS {
                pass_index = Some(i);
                continue;
            }
            let mut next = state.clone();
            next.play_move(child.vertex());
            if next.super_ko() {
                child.inflate().invalidate();
            } else {
                valid_count += 1;
            }
        }
        if let Some(i) = pass_index {
            if valid_count > 1 && !position.is_move_allowed(to_move, PASS, tags) {
                children[i].inflate().invalidate();
            }
        }

        children.retain(|child| child.valid());
    }

    /// Get the root ready for a search: expand it, inflate its children and
    /// drop superko moves. Returns the root score for the side to move.
    pub fn prepare_root_node<E: Evaluator>(
        &mut self,
        network: &Network<E>,
        state: &KoState,
        tags: &AnalyzeTags,
        cfg: &SearchConfig,
    ) -> f32 {
        let color = state.position().to_move();
        let had_children = self.has_children();
        let mut root_eval = None;
        if self.expandable(0.0) {
            root_eval = self.create_children(network, state, 0.0, tags, cfg);
        }

        let eval = match root_eval {
            Some(black_eval) if !had_children => {
                self.update(black_eval);
                if color == Color::Black {
                    black_eval
                } else {
                    -black_eval
                }
            }
            _ => self.get_net_eval(color),
        };

        self.inflate_all_children();
        self.kill_superkos(state, tags);
        eval
    }

    /// Reactivate every root child pruned by time management.
    pub fn activate_children(&self) {
        for child in self.children.read().iter() {
            if let Some(node) = child.node() {
                node.set_active(true);
            }
        }
    }
}

/// Priors of the moves `position`'s side to move may play, renormalized
/// over the legal set. Pass is included only when it is reasonable to
/// consider.
fn legal_priors(
    position: &Position,
    policy: &[f32],
    policy_pass: f32,
    stm_eval: f32,
    tags: &AnalyzeTags,
    cfg: &SearchConfig,
) -> Vec<(f32, Vertex)> {
    let board = &position.board;
    let size = board.size();
    let to_move = position.to_move();

    let mut nodelist = Vec::new();
    let mut legal_sum = 0.0f32;
    for y in 0..size {
        for x in 0..size {
            let vertex = board.get_vertex(x, y);
            if position.is_move_allowed(to_move, vertex, tags) {
                let prior = policy[y * size + x];
                nodelist.push((prior, vertex));
                legal_sum += prior;
            }
        }
    }

    let mut allow_pass = cfg.dumb_pass || nodelist.len() <= size.max(5);
    if !allow_pass && stm_eval > 0.0 {
        let relative_score = match to_move {
            Color::Black => position.final_score(),
            Color::White => -position.final_score(),
        };
        allow_pass = relative_score >= 0.0;
    }
    if allow_pass && position.is_move_allowed(to_move, PASS, tags) {
        nodelist.push((policy_pass, PASS));
        legal_sum += policy_pass;
    }

    if legal_sum > f32::MIN_POSITIVE {
        for node in &mut nodelist {
            node.0 /= legal_sum;
        }
    } else if !nodelist.is_empty() {
        let uniform = 1.0 / nodelist.len() as f32;
        for node in &mut nodelist {
            node.0 = uniform;
        }
    }
    nodelist
}
