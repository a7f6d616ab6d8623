//! Tree size accounting.
//!
//! The tree size counter is process-wide, so this binary holds a single
//! test and nothing else allocates nodes while it runs.

use std::sync::Arc;
use std::thread;

use michi_zero::analysis::AnalyzeTags;
use michi_zero::board::Color;
use michi_zero::config::SearchConfig;
use michi_zero::evaluator::UniformEvaluator;
use michi_zero::game::GameState;
use michi_zero::network::Network;
use michi_zero::node::{NODE_SIZE, SLOT_SIZE, UctNode, tree_size};
use michi_zero::position::KoState;
use michi_zero::reclaim::Reclaimer;
use michi_zero::search::{PassFlags, UctSearch};

#[test]
fn test_tree_size_tracks_nodes_and_slots() {
    let baseline = tree_size();
    let network = Network::new(UniformEvaluator::new(), 100);
    let cfg = SearchConfig::for_testing();
    let tags = AnalyzeTags::default();

    // A root and its slots.
    let root = UctNode::new_root();
    assert_eq!(tree_size(), baseline + NODE_SIZE);

    let state = KoState::new(5, 7.5);
    root.create_children(&network, &state, 0.0, &tags, &cfg);
    let slots = root.children().len();
    assert_eq!(slots, 25);
    assert_eq!(tree_size(), baseline + NODE_SIZE + slots * SLOT_SIZE);

    // Inflating a slot adds a node, once.
    root.children()[3].inflate();
    root.children()[3].inflate();
    assert_eq!(tree_size(), baseline + 2 * NODE_SIZE + slots * SLOT_SIZE);

    drop(root);
    assert_eq!(tree_size(), baseline);

    // Racing inflations: the losers' nodes are dropped and uncounted.
    let root = UctNode::new_root();
    root.create_children(&network, &state, 0.0, &tags, &cfg);
    let children = root.children();
    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| children[7].inflate().update(1.0));
        }
    });
    assert_eq!(children[7].visits(), 8);
    assert_eq!(tree_size(), baseline + 2 * NODE_SIZE + slots * SLOT_SIZE);
    drop(children);
    drop(root);
    assert_eq!(tree_size(), baseline);

    // Subtrees handed to the reclaimer are counted until it is idle.
    let reclaimer = Reclaimer::new().unwrap();
    let root = UctNode::new_root();
    root.create_children(&network, &state, 0.0, &tags, &cfg);
    root.inflate_all_children();
    assert_eq!(tree_size(), baseline + 26 * NODE_SIZE + 25 * SLOT_SIZE);
    reclaimer.reclaim(Box::new(root));
    reclaimer.wait_idle();
    assert_eq!(tree_size(), baseline);

    // A whole search, then clearing its tree.
    let network = Arc::new(Network::new(UniformEvaluator::new(), 1_000));
    let mut search = UctSearch::new(network, SearchConfig::for_testing().with_playouts(50)).unwrap();
    let mut game = GameState::new(5, 7.5);
    search.think(&mut game, Color::Black, PassFlags::NORMAL);
    assert!(tree_size() > baseline + NODE_SIZE);
    assert_eq!(search.nodes(), search.root().count_nodes());

    search.clear_tree();
    search.wait_for_reclaim();
    assert_eq!(tree_size(), baseline + NODE_SIZE);

    drop(search);
    assert_eq!(tree_size(), baseline);
}
