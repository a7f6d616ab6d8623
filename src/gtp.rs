//! Go Text Protocol (GTP) front end.
//!
//! GTP is a text-based protocol for communicating with Go-playing programs.
//! This module implements GTP version 2 on top of a [`GameState`] and a
//! [`UctSearch`], so the engine can be driven by GUIs such as Sabaki or
//! GoGui, or by tournament tools such as gogui-twogtp.
//!
//! ## Supported Commands
//!
//! - `name`, `version`, `protocol_version`, `list_commands`, `known_command`
//! - `quit`
//! - `boardsize <size>`, `clear_board`, `komi <value>`
//! - `play <color> <vertex>`, `genmove <color>`, `kgs-genmove_cleanup <color>`
//! - `undo`, `showboard`, `final_score`
//! - `fixed_handicap <stones>`, `place_free_handicap <stones>`
//! - `time_settings <main> <byo-yomi time> <byo-yomi stones>`
//! - `time_left <color> <time> <stones>`
//! - `lz-analyze [color] [interval] [avoid|allow ...] [minmoves n]`
//! - `lz-genmove_analyze [color] [interval] [avoid|allow ...] [minmoves n]`
//! - `lz-memory_report`
//!
//! The two analysis commands stream: the status line is followed by
//! `info move ...` reports while the engine searches, and a blank line ends
//! the response. `lz-analyze` searches until the next command arrives.
//!
//! ## Example
//!
//! ```ignore
//! use michi_zero::gtp::GtpEngine;
//! let mut engine = GtpEngine::new(search, GameState::new(9, 7.5));
//! engine.run()?;
//! ```

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, anyhow};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::analysis::AnalyzeTags;
use crate::board::Color;
use crate::constants::{BOARD_SIZE, MIN_BOARD_SIZE, PASS};
use crate::evaluator::Evaluator;
use crate::game::{FIXED_HANDICAP_MAX, GameState};
use crate::node::tree_size;
use crate::search::{PassFlags, UctSearch};
use crate::timecontrol::TimeControl;

const MIB: usize = 1024 * 1024;

/// The list of known GTP commands.
const KNOWN_COMMANDS: &[&str] = &[
    "boardsize",
    "clear_board",
    "final_score",
    "fixed_handicap",
    "genmove",
    "kgs-genmove_cleanup",
    "known_command",
    "komi",
    "list_commands",
    "lz-analyze",
    "lz-genmove_analyze",
    "lz-memory_report",
    "name",
    "place_free_handicap",
    "play",
    "protocol_version",
    "quit",
    "showboard",
    "time_left",
    "time_settings",
    "undo",
    "version",
];

/// Commands read by a background thread, so a search can run until the
/// next one arrives.
struct Inbox {
    lines: Receiver<io::Result<String>>,
    buffered: VecDeque<io::Result<String>>,
    /// Raised by the reader after every line and at end of input.
    input_pending: Arc<AtomicBool>,
    closed: bool,
}

impl Inbox {
    fn spawn<R: BufRead + Send + 'static>(input: R) -> io::Result<Self> {
        let (sender, lines) = mpsc::channel();
        let input_pending = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&input_pending);
        thread::Builder::new()
            .name("gtp-input".to_string())
            .spawn(move || {
                for line in input.lines() {
                    let failed = line.is_err();
                    if sender.send(line).is_err() {
                        break;
                    }
                    flag.store(true, Ordering::SeqCst);
                    if failed {
                        break;
                    }
                }
                // Disconnect before the last raise, see `arm`.
                drop(sender);
                flag.store(true, Ordering::SeqCst);
            })?;

        Ok(Inbox {
            lines,
            buffered: VecDeque::new(),
            input_pending,
            closed: false,
        })
    }

    fn next_line(&mut self) -> Option<io::Result<String>> {
        self.buffered
            .pop_front()
            .or_else(|| self.lines.recv().ok())
    }

    fn drain(&mut self) {
        loop {
            match self.lines.try_recv() {
                Ok(line) => self.buffered.push_back(line),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
    }

    /// Lower the pending flag unless input is already waiting. Returns
    /// whether the engine is idle, that is the flag is now down and will
    /// be raised by the next line or by end of input.
    fn arm(&mut self) -> bool {
        self.drain();
        if self.buffered.is_empty() && !self.closed {
            self.input_pending.store(false, Ordering::SeqCst);
            // A line sent between the drain and the store would go unnoticed.
            self.drain();
        }
        let idle = self.buffered.is_empty() && !self.closed;
        if !idle {
            self.input_pending.store(true, Ordering::SeqCst);
        }
        idle
    }

    fn interrupt(&self) -> &AtomicBool {
        &self.input_pending
    }
}

fn write_out<W: Write>(output: &Mutex<W>, text: &str) -> Result<()> {
    let mut out = output.lock();
    out.write_all(text.as_bytes())
        .and_then(|()| out.flush())
        .context("failed to write GTP response")
}

/// GTP engine state.
pub struct GtpEngine<E> {
    game: GameState,
    search: UctSearch<E>,
    ponder: bool,
}

impl<E: Evaluator> GtpEngine<E> {
    pub fn new(search: UctSearch<E>, game: GameState) -> Self {
        Self {
            game,
            search,
            ponder: false,
        }
    }

    /// Search on the opponent's time after each generated move, until the
    /// next command arrives.
    pub fn with_pondering(mut self, enabled: bool) -> Self {
        self.ponder = enabled;
        self
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    pub fn search(&self) -> &UctSearch<E> {
        &self.search
    }

    /// Run the GTP command loop on stdin and stdout.
    pub fn run(&mut self) -> Result<()> {
        self.run_with(BufReader::new(io::stdin()), io::stdout())
            .map(drop)
    }

    /// Run the GTP command loop until `quit` or end of input, and hand the
    /// output back.
    pub fn run_with<R, W>(&mut self, input: R, output: W) -> Result<W>
    where
        R: BufRead + Send + 'static,
        W: Write + Send + 'static,
    {
        let output = Arc::new(Mutex::new(output));
        let mut inbox = Inbox::spawn(input).context("failed to start the GTP reader")?;

        while let Some(line) = inbox.next_line() {
            let line = line.context("failed to read GTP command")?;

            // Skip empty lines and comments
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (id, command_line) = Self::parse_id(line);
            let parts: Vec<&str> = command_line.split_whitespace().collect();
            if parts.is_empty() {
                continue;
            }

            let command = parts[0].to_lowercase();
            let args = &parts[1..];
            let id_str = id.map(|i| i.to_string()).unwrap_or_default();
            debug!(command = %command_line, "gtp");

            if command == "lz-analyze" || command == "lz-genmove_analyze" {
                self.analyze(&command, args, &id_str, &output, &mut inbox)?;
                continue;
            }

            let (success, message) = self.execute(&command, args);
            let prefix = if success { '=' } else { '?' };
            write_out(&output, &format!("{prefix}{id_str} {message}\n\n"))?;

            if command == "quit" {
                break;
            }
            let generated = command == "genmove" || command == "kgs-genmove_cleanup";
            if generated && success && self.ponder && !self.game.has_resigned() && inbox.arm() {
                self.search.ponder(&self.game, inbox.interrupt());
            }
        }

        Arc::try_unwrap(output)
            .map(Mutex::into_inner)
            .map_err(|_| anyhow!("GTP output is still shared"))
    }

    /// Run `lz-analyze` or `lz-genmove_analyze`, streaming reports to
    /// `output` while the search runs.
    fn analyze<W: Write + Send + 'static>(
        &mut self,
        command: &str,
        args: &[&str],
        id: &str,
        output: &Arc<Mutex<W>>,
        inbox: &mut Inbox,
    ) -> Result<()> {
        let tags = match AnalyzeTags::parse(args, self.game.position()) {
            Ok(tags) => tags,
            Err(err) => {
                debug!(%err, "rejected analyze tags");
                return write_out(output, &format!("?{id} cannot parse analyze tags\n\n"));
            }
        };
        if self.game.has_resigned() {
            return write_out(output, &format!("?{id} game is over\n\n"));
        }

        write_out(output, &format!("={id}\n"))?;
        let who = tags.who().unwrap_or(self.game.to_move());
        self.game.set_to_move(who);
        self.search.set_analyze_tags(tags);
        let sink_output = Arc::clone(output);
        self.search.set_analysis_sink(Box::new(move |report: &str| {
            if report.is_empty() {
                return;
            }
            let mut out = sink_output.lock();
            if let Err(err) = writeln!(out, "{report}").and_then(|()| out.flush()) {
                warn!(%err, "failed to write analysis");
            }
        }));

        let result = if command == "lz-genmove_analyze" {
            let best = self.search.think(&mut self.game, who, PassFlags::NORMAL);
            self.game.play_move(best);
            let mv = self.game.position().move_to_text(best);
            let written = write_out(output, &format!("play {mv}\n"));
            if written.is_ok() && self.ponder && !self.game.has_resigned() && inbox.arm() {
                self.search.ponder(&self.game, inbox.interrupt());
            }
            written
        } else {
            inbox.arm();
            self.search.ponder(&self.game, inbox.interrupt());
            Ok(())
        };

        self.search.clear_analysis_sink();
        self.search.set_analyze_tags(AnalyzeTags::default());
        result?;
        write_out(output, "\n")
    }

    /// Parse an optional numeric command ID from the beginning of the line.
    fn parse_id(line: &str) -> (Option<u32>, &str) {
        let trimmed = line.trim();
        let end = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        if end > 0 {
            if let Ok(id) = trimmed[..end].parse::<u32>() {
                return (Some(id), trimmed[end..].trim());
            }
        }
        (None, trimmed)
    }

    /// Execute a GTP command and return (success, response).
    ///
    /// The streaming analysis commands only run inside [`GtpEngine::run_with`].
    pub fn execute(&mut self, command: &str, args: &[&str]) -> (bool, String) {
        match command {
            "name" => (true, env!("CARGO_PKG_NAME").to_string()),

            "version" => (true, env!("CARGO_PKG_VERSION").to_string()),

            "protocol_version" => (true, "2".to_string()),

            "list_commands" => (true, KNOWN_COMMANDS.join("\n")),

            "known_command" => {
                let Some(name) = args.first() else {
                    return (false, "missing argument".to_string());
                };
                let known = KNOWN_COMMANDS.contains(&name.to_lowercase().as_str());
                (true, known.to_string())
            }

            "quit" => (true, String::new()),

            "boardsize" => match args.first().map(|a| a.parse::<usize>()) {
                Some(Ok(size)) if (MIN_BOARD_SIZE..=BOARD_SIZE).contains(&size) => {
                    let komi = self.game.komi();
                    self.game.init_game(size, komi);
                    self.search.clear_tree();
                    (true, String::new())
                }
                Some(Ok(_)) => (false, "unacceptable size".to_string()),
                _ => (false, "syntax not understood: boardsize".to_string()),
            },

            "clear_board" => {
                self.game.reset_game();
                self.search.clear_tree();
                (true, String::new())
            }

            "komi" => match args.first().map(|a| a.parse::<f32>()) {
                Some(Ok(komi)) => {
                    if komi != self.game.komi() {
                        self.game.set_komi(komi);
                    }
                    (true, String::new())
                }
                _ => (false, "syntax not understood: komi".to_string()),
            },

            "play" => {
                let [color, vertex, ..] = args else {
                    return (false, "syntax not understood: play".to_string());
                };
                let tags = self.search.analyze_tags();
                match self.game.play_text_with_tags(color, vertex, tags) {
                    Ok(()) => (true, String::new()),
                    Err(err) => {
                        debug!(%err, "rejected move");
                        (false, "illegal move".to_string())
                    }
                }
            }

            "genmove" => self.genmove(args, PassFlags::NORMAL),

            "kgs-genmove_cleanup" => self.genmove(args, PassFlags::NO_PASS),

            "undo" => {
                if self.game.undo_move() {
                    (true, String::new())
                } else {
                    (false, "cannot undo".to_string())
                }
            }

            "showboard" => {
                // Blank lines would end the response early.
                let board = self.game.to_string();
                let lines: Vec<&str> = board.lines().filter(|l| !l.trim().is_empty()).collect();
                (true, format!("\n{}", lines.join("\n")))
            }

            "final_score" => {
                let score = self.game.final_score();
                let text = if score < -0.1 {
                    format!("W+{:3.1}", -score)
                } else if score > 0.1 {
                    format!("B+{score:3.1}")
                } else {
                    "0".to_string()
                };
                (true, text)
            }

            "fixed_handicap" => {
                let Some(stones) = args.first().and_then(|a| a.parse::<usize>().ok()) else {
                    return (false, "syntax not understood: fixed_handicap".to_string());
                };
                if !self.game.is_board_empty() {
                    return (false, "board not empty".to_string());
                }
                if self.game.place_fixed_handicap(stones) {
                    self.search.clear_tree();
                    (true, self.game.board().get_stone_list())
                } else {
                    (false, "Not a valid number of handicap stones".to_string())
                }
            }

            "place_free_handicap" => {
                let Some(stones) = args.first().and_then(|a| a.parse::<usize>().ok()) else {
                    return (false, "syntax not understood: place_free_handicap".to_string());
                };
                if !self.game.is_board_empty() {
                    return (false, "board not empty".to_string());
                }
                if stones < 2 {
                    return (false, "invalid number of stones".to_string());
                }
                self.place_free_handicap(stones);
                (true, self.game.board().get_stone_list())
            }

            "time_settings" => {
                let numbers: Option<Vec<i32>> = args.iter().map(|a| a.parse().ok()).collect();
                match numbers.as_deref() {
                    Some(&[main_time, byo_time, byo_stones]) => {
                        match (main_time.checked_mul(100), byo_time.checked_mul(100)) {
                            (Some(main_time), Some(byo_time)) => {
                                let time_control =
                                    TimeControl::new(main_time, byo_time, byo_stones, 0);
                                self.game.set_time_control(time_control);
                                (true, String::new())
                            }
                            _ => (false, "time out of range".to_string()),
                        }
                    }
                    _ => (false, "syntax not understood: time_settings".to_string()),
                }
            }

            "time_left" => {
                let [color, time, stones, ..] = args else {
                    return (false, "syntax not understood: time_left".to_string());
                };
                let Some(color) = Color::parse(color) else {
                    return (false, "Color in time adjust not understood.".to_string());
                };
                match (time.parse::<i32>(), stones.parse::<i32>()) {
                    (Ok(time), Ok(stones)) => match time.checked_mul(100) {
                        Some(time) => {
                            self.game.adjust_time(color, time, stones);
                            (true, String::new())
                        }
                        None => (false, "time out of range".to_string()),
                    },
                    _ => (false, "syntax not understood: time_left".to_string()),
                }
            }

            "lz-memory_report" => (true, self.memory_report()),

            _ => (false, "unknown command".to_string()),
        }
    }

    fn genmove(&mut self, args: &[&str], flags: PassFlags) -> (bool, String) {
        let Some(color) = args.first().and_then(|a| Color::parse(a)) else {
            return (false, "syntax error".to_string());
        };
        if self.game.has_resigned() {
            warn!("genmove after resignation");
            return (false, "game is over".to_string());
        }

        self.game.set_to_move(color);
        let best = self.search.think(&mut self.game, color, flags);
        self.game.play_move(best);
        (true, self.game.position().move_to_text(best))
    }

    /// Traditional star points first, then a spaced grid, then moves the
    /// search picks for Black. At most half the board is filled.
    fn place_free_handicap(&mut self, stones: usize) {
        let size = self.game.board().size();
        let stones = stones.min(size * size / 2);

        let fixed = stones.min(FIXED_HANDICAP_MAX);
        let mut remaining = stones;
        if self.game.place_fixed_handicap(fixed) {
            remaining -= fixed;
        }
        remaining -= self.game.place_scripted_handicap(remaining);

        for _ in 0..remaining {
            let flags = PassFlags::NO_PASS | PassFlags::NO_RESIGN;
            let best = self.search.think(&mut self.game, Color::Black, flags);
            if best == PASS {
                break;
            }
            self.game.play_move_color(Color::Black, best);
        }

        self.game.start_handicap_game(stones);
        self.search.clear_tree();
    }

    fn memory_report(&self) -> String {
        let network = self.search.network();
        let base = network.evaluator().memory_usage();
        let tree = tree_size();
        let cache = network.cache().estimated_size();
        format!(
            "Estimated total memory consumption: {} MiB.\n\
             Evaluator: {} MiB / Search tree: {} MiB / Evaluation cache: {} MiB",
            (base + tree + cache) / MIB,
            base / MIB,
            tree / MIB,
            cache / MIB
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::SearchConfig;
    use crate::constants::PASS;
    use crate::evaluator::UniformEvaluator;
    use crate::network::Network;

    fn engine(size: usize) -> GtpEngine<UniformEvaluator> {
        let network = Arc::new(Network::new(UniformEvaluator::new(), 1000));
        let cfg = SearchConfig::for_testing().with_playouts(40);
        let search = UctSearch::new(network, cfg).unwrap();
        GtpEngine::new(search, GameState::new(size, 7.5))
    }

    #[test]
    fn test_parse_id_with_id() {
        let (id, cmd) = GtpEngine::<UniformEvaluator>::parse_id("123 name");
        assert_eq!(id, Some(123));
        assert_eq!(cmd, "name");
    }

    #[test]
    fn test_parse_id_without_id() {
        let (id, cmd) = GtpEngine::<UniformEvaluator>::parse_id("name");
        assert_eq!(id, None);
        assert_eq!(cmd, "name");
    }

    #[test]
    fn test_name_command() {
        let mut engine = engine(5);
        let (success, response) = engine.execute("name", &[]);
        assert!(success);
        assert_eq!(response, "michi-zero");
    }

    #[test]
    fn test_protocol_version() {
        let mut engine = engine(5);
        let (success, response) = engine.execute("protocol_version", &[]);
        assert!(success);
        assert_eq!(response, "2");
    }

    #[test]
    fn test_known_command() {
        let mut engine = engine(5);

        let (success, response) = engine.execute("known_command", &["kgs-genmove_cleanup"]);
        assert!(success);
        assert_eq!(response, "true");

        let (success, response) = engine.execute("known_command", &["unknown_cmd"]);
        assert!(success);
        assert_eq!(response, "false");
    }

    #[test]
    fn test_boardsize() {
        let mut engine = engine(5);

        let (success, _) = engine.execute("boardsize", &["7"]);
        assert!(success);
        assert_eq!(engine.game().board().size(), 7);
        assert_eq!(engine.game().komi(), 7.5);

        let (success, response) = engine.execute("boardsize", &["99"]);
        assert!(!success);
        assert_eq!(response, "unacceptable size");

        let (success, _) = engine.execute("boardsize", &["x"]);
        assert!(!success);
    }

    #[test]
    fn test_play_and_clear() {
        let mut engine = engine(5);

        let (success, _) = engine.execute("play", &["black", "C3"]);
        assert!(success);
        assert_eq!(engine.game().move_number(), 1);

        let (success, response) = engine.execute("play", &["white", "C3"]);
        assert!(!success);
        assert_eq!(response, "illegal move");

        let (success, _) = engine.execute("play", &["b"]);
        assert!(!success);

        let (success, _) = engine.execute("clear_board", &[]);
        assert!(success);
        assert_eq!(engine.game().move_number(), 0);
        assert_eq!(engine.game().board().empty_count(), 25);
    }

    #[test]
    fn test_undo() {
        let mut engine = engine(5);
        let (success, response) = engine.execute("undo", &[]);
        assert!(!success);
        assert_eq!(response, "cannot undo");

        engine.execute("play", &["b", "B2"]);
        let (success, _) = engine.execute("undo", &[]);
        assert!(success);
        assert_eq!(engine.game().move_number(), 0);
    }

    #[test]
    fn test_genmove_plays_for_color() {
        let mut engine = engine(5);
        let (success, response) = engine.execute("genmove", &["w"]);
        assert!(success);
        assert_eq!(engine.game().move_number(), 1);
        assert_eq!(engine.game().to_move(), Color::Black);
        assert_ne!(response, "resign");

        let (success, response) = engine.execute("genmove", &["purple"]);
        assert!(!success);
        assert_eq!(response, "syntax error");
    }

    #[test]
    fn test_cleanup_genmove_does_not_pass() {
        let mut engine = engine(5);
        let (success, response) = engine.execute("kgs-genmove_cleanup", &["b"]);
        assert!(success);
        assert_ne!(engine.game().last_move(), PASS);
        assert_ne!(response, "pass");
    }

    #[test]
    fn test_final_score() {
        let mut engine = engine(5);
        let (_, response) = engine.execute("final_score", &[]);
        assert_eq!(response, "W+7.5");

        engine.execute("komi", &["0"]);
        let (_, response) = engine.execute("final_score", &[]);
        assert_eq!(response, "0");

        engine.execute("play", &["b", "C3"]);
        let (_, response) = engine.execute("final_score", &[]);
        assert_eq!(response, "B+25.0");
    }

    #[test]
    fn test_fixed_handicap() {
        let mut engine = engine(9);
        let (success, response) = engine.execute("fixed_handicap", &["2"]);
        assert!(success);
        assert_eq!(response.split_whitespace().count(), 2);
        assert_eq!(engine.game().to_move(), Color::White);

        let (success, response) = engine.execute("fixed_handicap", &["12"]);
        assert!(!success);
        assert_eq!(response, "board not empty");

        let mut engine = self::engine(9);
        let (success, response) = engine.execute("fixed_handicap", &["12"]);
        assert!(!success);
        assert_eq!(response, "Not a valid number of handicap stones");
    }

    #[test]
    fn test_time_commands() {
        let mut engine = engine(5);
        let (success, _) = engine.execute("time_settings", &["60", "10", "5"]);
        assert!(success);
        assert_eq!(engine.game().time_control().remaining_time(Color::Black), 6000);

        let (success, _) = engine.execute("time_settings", &["60", "10"]);
        assert!(!success);

        let (success, _) = engine.execute("time_left", &["w", "30", "0"]);
        assert!(success);
        assert_eq!(engine.game().time_control().remaining_time(Color::White), 3000);

        let (success, response) = engine.execute("time_left", &["x", "30", "0"]);
        assert!(!success);
        assert_eq!(response, "Color in time adjust not understood.");
    }

    #[test]
    fn test_run_with_ids_and_quit() {
        let mut engine = engine(5);
        let input = "1 name\n# comment\n\nbogus\n2 quit\n3 name\n";
        let output = engine.run_with(input.as_bytes(), Vec::new()).unwrap();

        let text = String::from_utf8(output).unwrap();
        assert_eq!(text, "=1 michi-zero\n\n? unknown command\n\n=2 \n\n");
    }

    fn session(engine: &mut GtpEngine<UniformEvaluator>, input: &'static str) -> String {
        let output = engine.run_with(input.as_bytes(), Vec::new()).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_lz_analyze_streams_until_next_command() {
        let mut engine = engine(5);
        let text = session(&mut engine, "1 lz-analyze 1\n2 name\n");

        assert!(text.starts_with("=1\n"), "{text}");
        let (analysis, rest) = text.split_once("\n\n").unwrap();
        assert!(
            analysis.lines().skip(1).all(|l| l.starts_with("info move ")),
            "{text}"
        );
        assert!(analysis.lines().count() >= 2, "{text}");
        assert_eq!(rest, "=2 michi-zero\n\n");
        // Analysis does not play.
        assert_eq!(engine.game().move_number(), 0);
        assert!(!engine.search().analyze_tags().has_move_restrictions());
    }

    #[test]
    fn test_lz_analyze_with_restrictions() {
        let mut engine = engine(5);
        let text = session(&mut engine, "1 lz-analyze b 1 avoid b C3 1\n");
        assert!(text.starts_with("=1\n"), "{text}");
        let reports: Vec<&str> = text.lines().filter(|l| l.starts_with("info")).collect();
        assert!(!reports.is_empty(), "{text}");
        assert!(reports.iter().all(|l| !l.contains("info move C3 ")), "{text}");
        assert!(text.ends_with("\n\n"));
        // Restrictions end with the command.
        let (success, _) = engine.execute("play", &["b", "C3"]);
        assert!(success);
    }

    #[test]
    fn test_lz_analyze_rejects_bad_tags() {
        let mut engine = engine(5);
        let text = session(&mut engine, "7 lz-analyze avoid b\n8 lz-analyze frobnicate\n");
        assert_eq!(
            text,
            "?7 cannot parse analyze tags\n\n?8 cannot parse analyze tags\n\n"
        );
    }

    #[test]
    fn test_lz_genmove_analyze_plays_move() {
        let mut engine = engine(5);
        let text = session(&mut engine, "1 lz-genmove_analyze w 1\n2 quit\n");

        assert!(text.starts_with("=1\n"), "{text}");
        let (analysis, rest) = text.split_once("\n\n").unwrap();
        let last = analysis.lines().last().unwrap();
        assert!(last.starts_with("play "), "{text}");
        assert!(analysis.lines().any(|l| l.starts_with("info move ")), "{text}");
        assert_eq!(rest, "=2 \n\n");
        assert_eq!(engine.game().move_number(), 1);
        assert_eq!(engine.game().to_move(), Color::Black);
    }

    #[test]
    fn test_pondering_after_genmove_keeps_framing() {
        let mut engine = engine(5).with_pondering(true);
        let text = session(&mut engine, "1 genmove b\n2 name\n3 quit\n");
        let statuses: Vec<&str> = text.split("\n\n").filter(|r| !r.is_empty()).collect();
        assert_eq!(statuses.len(), 3, "{text}");
        assert!(statuses[0].starts_with("=1 "));
        assert_eq!(statuses[1], "=2 michi-zero");
        assert_eq!(statuses[2], "=3 ");
        assert_eq!(engine.game().move_number(), 1);
    }

    #[test]
    fn test_time_values_out_of_range() {
        let mut engine = engine(5);
        engine.execute("time_settings", &["60", "10", "5"]);

        let (success, response) = engine.execute("time_settings", &["30000000", "0", "0"]);
        assert!(!success);
        assert_eq!(response, "time out of range");
        let (success, _) = engine.execute("time_settings", &["0", "30000000", "1"]);
        assert!(!success);
        assert_eq!(engine.game().time_control().remaining_time(Color::Black), 6000);

        let (success, response) = engine.execute("time_left", &["b", "-30000000", "0"]);
        assert!(!success);
        assert_eq!(response, "time out of range");
        assert_eq!(engine.game().time_control().remaining_time(Color::Black), 6000);
    }

    #[test]
    fn test_fixed_handicap_on_occupied_board() {
        let mut engine = engine(9);
        let (success, _) = engine.execute("play", &["w", "G7"]);
        assert!(success);
        let hash = engine.game().hash();

        let (success, response) = engine.execute("fixed_handicap", &["2"]);
        assert!(!success);
        assert_eq!(response, "board not empty");
        assert_eq!(engine.game().hash(), hash);
        assert_eq!(engine.game().board().empty_count(), 80);
        assert_eq!(engine.game().handicap(), 0);

        let (success, _) = engine.execute("fixed_handicap", &["two"]);
        assert!(!success);
    }

    #[test]
    fn test_place_free_handicap() {
        let mut engine = engine(9);
        let (success, response) = engine.execute("place_free_handicap", &["1"]);
        assert!(!success);
        assert_eq!(response, "invalid number of stones");

        // Nine star points, then three moves from the search.
        let (success, response) = engine.execute("place_free_handicap", &["12"]);
        assert!(success);
        assert_eq!(response.split_whitespace().count(), 12, "{response}");
        assert_eq!(engine.game().board().empty_count(), 81 - 12);
        assert_eq!(engine.game().handicap(), 12);
        assert_eq!(engine.game().move_number(), 0);
        assert_eq!(engine.game().to_move(), Color::White);

        let (success, response) = engine.execute("place_free_handicap", &["2"]);
        assert!(!success);
        assert_eq!(response, "board not empty");
    }

    #[test]
    fn test_play_rejects_superko() {
        let mut engine = engine(9);
        for (color, point) in [
            ("b", "D4"),
            ("w", "E4"),
            ("b", "C5"),
            ("w", "F5"),
            ("b", "D6"),
            ("w", "E6"),
            ("b", "A1"),
            ("w", "D5"),
            ("b", "E5"),
            ("w", "pass"),
            ("b", "pass"),
        ] {
            let (success, _) = engine.execute("play", &[color, point]);
            assert!(success, "{color} {point}");
        }
        let (success, response) = engine.execute("play", &["w", "D5"]);
        assert!(!success);
        assert_eq!(response, "illegal move");
        assert_eq!(engine.game().move_number(), 11);
    }

    #[test]
    fn test_play_honors_active_restrictions() {
        let mut engine = engine(5);
        let c3 = engine.game().board().text_to_move("C3");
        let mut tags = AnalyzeTags::default();
        tags.add_move_to_avoid(Color::Black, c3, 5);
        engine.search.set_analyze_tags(tags);

        let (success, response) = engine.execute("play", &["b", "C3"]);
        assert!(!success);
        assert_eq!(response, "illegal move");
        let (success, _) = engine.execute("play", &["b", "B2"]);
        assert!(success);
    }

    #[test]
    fn test_memory_report() {
        let mut engine = engine(5);
        let (success, response) = engine.execute("lz-memory_report", &[]);
        assert!(success);
        assert!(response.starts_with("Estimated total memory consumption"));
    }
}
