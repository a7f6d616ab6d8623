//! Game clocks: main time followed by byo-yomi.
//!
//! Byo-yomi is either Canadian (`byo_stones` moves per `byo_time` period) or
//! Japanese (`byo_periods` periods of `byo_time` each). All times are in
//! centiseconds. The search only needs [`TimeControl::max_time_for_move`];
//! the rest is bookkeeping for the protocol layer.

use std::fmt;
use std::time::Instant;

use crate::board::Color;
use crate::config::TimeManagement;
use crate::constants::DEFAULT_MAIN_TIME_CS;

/// Byo-yomi time with no stones and no periods means "no time limit".
const INFINITE_TIME_CS: i32 = 31 * 24 * 60 * 60 * 100;

/// Centiseconds elapsed since `start`.
pub fn elapsed_centiseconds(start: Instant) -> i32 {
    (start.elapsed().as_millis() / 10).min(i32::MAX as u128) as i32
}

#[derive(Debug, Clone)]
pub struct TimeControl {
    main_time: i32,
    byo_time: i32,
    byo_stones: i32,
    byo_periods: i32,

    remaining_time: [i32; 2],
    stones_left: [i32; 2],
    periods_left: [i32; 2],
    in_byo_yomi: [bool; 2],
    started: [Option<Instant>; 2],
}

impl Default for TimeControl {
    fn default() -> Self {
        Self::new(DEFAULT_MAIN_TIME_CS, 0, 0, 0)
    }
}

impl TimeControl {
    pub fn new(main_time: i32, byo_time: i32, byo_stones: i32, byo_periods: i32) -> Self {
        let mut tc = TimeControl {
            main_time,
            byo_time,
            byo_stones,
            byo_periods,
            remaining_time: [0; 2],
            stones_left: [0; 2],
            periods_left: [0; 2],
            in_byo_yomi: [false; 2],
            started: [None; 2],
        };
        tc.reset_clocks();
        tc
    }

    /// Give both players their full main time again.
    pub fn reset_clocks(&mut self) {
        let in_byo = self.main_time <= 0;
        self.remaining_time = [self.main_time; 2];
        self.stones_left = [self.byo_stones; 2];
        self.periods_left = [self.byo_periods; 2];
        self.in_byo_yomi = [in_byo; 2];
        if in_byo {
            self.remaining_time = [self.byo_time; 2];
        }
    }

    pub fn remaining_time(&self, color: Color) -> i32 {
        self.remaining_time[color.index()]
    }

    pub fn in_byo_yomi(&self, color: Color) -> bool {
        self.in_byo_yomi[color.index()]
    }

    /// Start `color`'s clock.
    pub fn start(&mut self, color: Color) {
        self.started[color.index()] = Some(Instant::now());
    }

    /// Stop `color`'s clock and charge the elapsed time.
    pub fn stop(&mut self, color: Color) {
        let elapsed = self.started[color.index()]
            .take()
            .map(elapsed_centiseconds)
            .unwrap_or(0);
        self.charge(color, elapsed);
    }

    /// Charge `elapsed` centiseconds to `color`, handling byo-yomi transitions.
    pub fn charge(&mut self, color: Color, elapsed: i32) {
        let c = color.index();
        self.remaining_time[c] -= elapsed;

        if self.in_byo_yomi[c] {
            if self.byo_stones != 0 {
                self.stones_left[c] -= 1;
            } else if self.byo_periods != 0 && elapsed > self.byo_time {
                self.periods_left[c] -= 1;
            }
        }

        if !self.in_byo_yomi[c] && self.remaining_time[c] <= 0 {
            self.remaining_time[c] = self.byo_time;
            self.stones_left[c] = self.byo_stones;
            self.periods_left[c] = self.byo_periods;
            self.in_byo_yomi[c] = true;
        } else if self.in_byo_yomi[c] && self.byo_stones != 0 && self.stones_left[c] <= 0 {
            self.remaining_time[c] = self.byo_time;
            self.stones_left[c] = self.byo_stones;
        } else if self.in_byo_yomi[c] && self.byo_periods != 0 {
            self.remaining_time[c] = self.byo_time;
        }
    }

    /// Overwrite `color`'s clock from a `time_left` report.
    pub fn adjust_time(&mut self, color: Color, time: i32, stones: i32) {
        let c = color.index();
        self.remaining_time[c] = time;

        // "0 0" marks the end of main time.
        if time == 0 && stones == 0 {
            self.in_byo_yomi[c] = true;
            self.remaining_time[c] = self.byo_time;
            self.stones_left[c] = self.byo_stones;
            self.periods_left[c] = self.byo_periods;
        }

        if stones != 0 {
            self.in_byo_yomi[c] = true;
        }

        if self.in_byo_yomi[c] {
            if self.byo_stones != 0 {
                self.stones_left[c] = stones;
            } else if self.byo_periods != 0 {
                self.periods_left[c] = stones;
            }
        }
    }

    /// Whether time saved now can be spent on later moves.
    pub fn can_accumulate_time(&self, color: Color) -> bool {
        let c = color.index();
        if self.in_byo_yomi[c] {
            if self.byo_periods != 0 {
                return false;
            }
            if self.byo_stones != 0 && self.stones_left[c] == 1 {
                return false;
            }
        }
        true
    }

    /// Time budget for the next move of `color`, in centiseconds, keeping
    /// `lag_buffer_cs` in reserve.
    pub fn max_time_for_move(
        &self,
        board_size: usize,
        color: Color,
        move_number: usize,
        time_manage: TimeManagement,
        lag_buffer_cs: i32,
    ) -> i32 {
        let c = color.index();
        let mut time_remaining = self.remaining_time[c];
        let mut moves_remaining = get_moves_expected(board_size, move_number, time_manage) as i32;
        let mut extra_time_per_move = 0;

        if self.byo_time != 0 {
            if self.byo_stones == 0 && self.byo_periods == 0 {
                return INFINITE_TIME_CS;
            }

            if self.in_byo_yomi[c] {
                if self.byo_stones != 0 {
                    moves_remaining = self.stones_left[c];
                } else {
                    time_remaining = 0;
                    extra_time_per_move = self.byo_time;
                }
            } else if self.byo_stones != 0 {
                let byo_extra = self.byo_time / self.byo_stones;
                time_remaining = self.remaining_time[c] + byo_extra;
                extra_time_per_move = byo_extra;
            } else {
                let byo_extra = self.byo_time * (self.periods_left[c] - 1);
                time_remaining = self.remaining_time[c] + byo_extra;
                extra_time_per_move = self.byo_time;
            }
        }

        let base_time = (time_remaining - lag_buffer_cs).max(0) / moves_remaining.max(1);
        let inc_time = (extra_time_per_move - lag_buffer_cs).max(0);
        base_time + inc_time
    }
}

/// Number of moves at the start of a game that are played faster.
pub fn opening_moves(board_size: usize) -> usize {
    board_size * board_size / 6
}

/// Rough number of moves the player still has to make.
pub fn get_moves_expected(board_size: usize, move_number: usize, time_manage: TimeManagement) -> usize {
    // Early exits under time management make a larger base affordable.
    let board_div = if time_manage == TimeManagement::Off { 5 } else { 9 };
    let base_remaining = board_size * board_size / board_div;
    let fast_moves = opening_moves(board_size);
    if move_number < fast_moves {
        base_remaining + fast_moves - move_number
    } else {
        base_remaining
    }
}

impl fmt::Display for TimeControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for color in [Color::Black, Color::White] {
            let c = color.index();
            let secs = self.remaining_time[c] / 100;
            let name = if color == Color::Black { "Black" } else { "White" };
            write!(
                f,
                "{name} time: {:02}:{:02}:{:02}",
                secs / 3600,
                (secs / 60) % 60,
                secs % 60
            )?;
            if self.in_byo_yomi[c] {
                if self.byo_stones != 0 {
                    write!(f, ", {} stones left", self.stones_left[c])?;
                } else if self.byo_periods != 0 {
                    write!(
                        f,
                        ", {} period(s) of {} seconds left",
                        self.periods_left[c],
                        self.byo_time / 100
                    )?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
