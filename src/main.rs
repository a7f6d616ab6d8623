//! Michi-Zero: a parallel UCT Go engine.
//!
//! ## Usage
//!
//! - `michi-zero` - Run a short self-play demo
//! - `michi-zero gtp` - Start GTP server for GUI integration
//! - `michi-zero gtp --ponder` - Same, searching on the opponent's time
//! - `michi-zero demo --moves 20` - Self-play a number of moves and show the result
//!
//! Logs go to stderr and are filtered by `RUST_LOG` (default `info`,
//! `warn` with `--quiet`), so stdout stays a clean GTP channel.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use michi_zero::config::{MemoryBudget, SearchConfig, TimeManagement};
use michi_zero::constants::{
    BOARD_SIZE, DEFAULT_CACHE_RATIO_PERCENT, DEFAULT_KOMI, MIN_BOARD_SIZE, UNLIMITED_PLAYOUTS,
};
use michi_zero::evaluator::Evaluator;
use michi_zero::game::GameState;
use michi_zero::gtp::GtpEngine;
use michi_zero::network::Network;
use michi_zero::playout::{DEFAULT_PLAYOUTS, PlayoutEvaluator};
use michi_zero::search::{PassFlags, UctSearch};

const MIB: usize = 1024 * 1024;

/// Michi-Zero: a parallel UCT Go engine
#[derive(Parser)]
#[command(name = "michi-zero")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the GTP (Go Text Protocol) server for use with GUI applications
    Gtp,
    /// Let the engine play against itself and print the final board
    Demo {
        /// Number of moves to play
        #[arg(long, default_value_t = 20)]
        moves: usize,
    },
}

#[derive(Args)]
struct EngineArgs {
    /// Search threads, the main thread included
    #[arg(short, long, global = true, default_value_t = 1)]
    threads: usize,

    /// Playouts per move (0 for unlimited)
    #[arg(short, long, global = true, default_value_t = 0)]
    playouts: i32,

    /// Root visits per move (0 for unlimited)
    #[arg(short, long, global = true, default_value_t = 0)]
    visits: i32,

    /// Memory budget for the tree and the cache in MiB (0 for the default)
    #[arg(long, global = true, default_value_t = 0)]
    max_memory: usize,

    /// Percentage of the memory budget given to the evaluation cache
    #[arg(long, global = true, default_value_t = DEFAULT_CACHE_RATIO_PERCENT)]
    cache_ratio: usize,

    /// Time management: auto, on, off, fast or no_pruning
    #[arg(long, global = true, default_value_t = TimeManagement::Auto)]
    time_manage: TimeManagement,

    /// Pick moves proportionally to visits for this many moves
    #[arg(long, global = true, default_value_t = 0)]
    random_cnt: usize,

    #[arg(long, global = true, default_value_t = DEFAULT_KOMI)]
    komi: f32,

    /// Board size
    #[arg(long, global = true, default_value_t = BOARD_SIZE)]
    size: usize,

    /// Pass whenever the search prefers it, without checking the score
    #[arg(long, global = true)]
    dumb_pass: bool,

    /// Random playouts per position evaluation
    #[arg(long, global = true, default_value_t = DEFAULT_PLAYOUTS)]
    eval_playouts: usize,

    /// Keep searching on the opponent's time until the next GTP command
    #[arg(long, global = true)]
    ponder: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

impl EngineArgs {
    fn search_config(&self, tree_bytes: usize) -> SearchConfig {
        let limit = |value: i32| if value <= 0 { UNLIMITED_PLAYOUTS } else { value };
        let mut cfg = SearchConfig::default()
            .with_threads(self.threads)
            .with_playouts(limit(self.playouts))
            .with_visits(limit(self.visits))
            .with_tree_size(tree_bytes)
            .with_time_manage(self.time_manage)
            .with_random_cnt(self.random_cnt)
            .with_dumb_pass(self.dumb_pass);
        cfg.quiet = self.quiet;
        cfg
    }
}

fn init_tracing(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_search<E: Evaluator>(args: &EngineArgs, evaluator: E) -> Result<UctSearch<E>> {
    let budget = MemoryBudget::new(
        args.max_memory * MIB,
        args.cache_ratio,
        evaluator.memory_usage(),
    )
    .context("invalid memory settings")?;

    let cfg = args.search_config(budget.tree_bytes);
    let network = Network::new(evaluator, budget.cache_entries).with_symmetric_lookups(!cfg.noise);
    if cfg.max_playouts < UNLIMITED_PLAYOUTS {
        network.cache().set_size_from_playouts(cfg.max_playouts);
    }
    info!(
        tree_mib = budget.tree_bytes / MIB,
        cache_entries = network.cache().capacity(),
        threads = cfg.threads,
        "engine configured"
    );

    UctSearch::new(Arc::new(network), cfg).context("failed to start the search")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.engine.quiet);

    let args = &cli.engine;
    if !(MIN_BOARD_SIZE..=BOARD_SIZE).contains(&args.size) {
        anyhow::bail!(
            "board size {} is outside {MIN_BOARD_SIZE}..={BOARD_SIZE}; rebuild with a larger board feature",
            args.size
        );
    }

    let search = build_search(args, PlayoutEvaluator::new(args.eval_playouts))?;
    let game = GameState::new(args.size, args.komi);

    match cli.command {
        Some(Commands::Gtp) => {
            let mut engine = GtpEngine::new(search, game).with_pondering(args.ponder);
            engine.run()
        }
        Some(Commands::Demo { moves }) => run_demo(search, game, moves),
        None => run_demo(search, game, 20),
    }
}

fn run_demo<E: Evaluator>(mut search: UctSearch<E>, mut game: GameState, moves: usize) -> Result<()> {
    println!("Michi-Zero: parallel UCT Go engine\n");

    for _ in 0..moves {
        let color = game.to_move();
        let best = search.think(&mut game, color, PassFlags::NORMAL);
        game.play_move(best);
        println!("{}", search.explain_last_think());

        if game.has_resigned() || game.both_passed() {
            break;
        }
    }

    println!("{game}");
    let score = game.final_score();
    println!("Final score (Black's view): {score:+.1}");
    Ok(())
}
