//! Analysis tags and analysis output lines.
//!
//! Tags come from the arguments of an analyze-style command:
//!
//! ```text
//! [b|w] [interval] [avoid <color> <moves> <until>] [allow <color> <moves> <until>] [minmoves <n>]
//! ```
//!
//! `<moves>` is a comma separated list of vertices or `A1:C3` rectangles and
//! `<until>` counts moves from the current one. A bare number is the
//! reporting interval in centiseconds.

use std::cmp::Ordering;

use thiserror::Error;

use crate::board::Color;
use crate::constants::{NO_VERTEX, PASS, RESIGN, Vertex};
use crate::position::Position;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    #[error("unknown tag: {0}")]
    UnknownTag(String),
    #[error("missing or malformed argument for {0}")]
    BadArgument(&'static str),
    #[error("bad move list: {0}")]
    BadMoves(String),
    #[error("cannot combine allow with avoiding board moves for the same color")]
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Restriction {
    color: Color,
    vertex: Vertex,
    until_move: usize,
}

/// Move restrictions and reporting options for one search.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeTags {
    avoid: Vec<Restriction>,
    allow: Vec<Restriction>,
    interval_centiseconds: i32,
    min_moves: usize,
    who: Option<Color>,
}

impl AnalyzeTags {
    /// Parse `args` against `position`.
    pub fn parse(args: &[&str], position: &Position) -> Result<Self, TagError> {
        let mut tags = AnalyzeTags {
            who: Some(position.to_move()),
            ..Self::default()
        };
        let mut avoids_board_move = [false; 2];
        let mut allows = [false; 2];

        let mut it = args.iter().copied();
        while let Some(tag) = it.next() {
            if tag.starts_with(|c: char| c.is_ascii_digit()) {
                tags.interval_centiseconds =
                    tag.parse().map_err(|_| TagError::BadArgument("interval"))?;
                continue;
            }
            match tag {
                "avoid" | "allow" => {
                    let name = if tag == "avoid" { "avoid" } else { "allow" };
                    let (Some(color), Some(moves), Some(until)) = (it.next(), it.next(), it.next())
                    else {
                        return Err(TagError::BadArgument(name));
                    };
                    let color = match color {
                        "b" | "black" => Color::Black,
                        "w" | "white" => Color::White,
                        _ => return Err(TagError::BadArgument(name)),
                    };
                    let until: usize = until.parse().map_err(|_| TagError::BadArgument(name))?;
                    if until < 1 {
                        return Err(TagError::BadArgument(name));
                    }
                    let until_move = until + position.move_number() - 1;

                    for vertex in parse_move_list(moves, position)? {
                        let entry = Restriction {
                            color,
                            vertex,
                            until_move,
                        };
                        if name == "avoid" {
                            tags.avoid.push(entry);
                            if vertex != PASS && vertex != RESIGN {
                                avoids_board_move[color.index()] = true;
                            }
                        } else {
                            tags.allow.push(entry);
                            allows[color.index()] = true;
                        }
                    }
                    if (0..2).any(|c| allows[c] && avoids_board_move[c]) {
                        return Err(TagError::Conflict);
                    }
                }
                "b" | "black" => tags.who = Some(Color::Black),
                "w" | "white" => tags.who = Some(Color::White),
                "interval" => {
                    tags.interval_centiseconds = it
                        .next()
                        .and_then(|s| s.parse().ok())
                        .ok_or(TagError::BadArgument("interval"))?;
                }
                "minmoves" => {
                    tags.min_moves = it
                        .next()
                        .and_then(|s| s.parse().ok())
                        .ok_or(TagError::BadArgument("minmoves"))?;
                }
                other => return Err(TagError::UnknownTag(other.to_string())),
            }
        }
        Ok(tags)
    }

    pub fn add_move_to_avoid(&mut self, color: Color, vertex: Vertex, until_move: usize) {
        self.avoid.push(Restriction {
            color,
            vertex,
            until_move,
        });
    }

    pub fn add_move_to_allow(&mut self, color: Color, vertex: Vertex, until_move: usize) {
        self.allow.push(Restriction {
            color,
            vertex,
            until_move,
        });
    }

    /// Whether `color` must not play `vertex` at move `move_number`.
    pub fn is_to_avoid(&self, color: Color, vertex: Vertex, move_number: usize) -> bool {
        if self
            .avoid
            .iter()
            .any(|m| m.color == color && m.vertex == vertex && move_number <= m.until_move)
        {
            return true;
        }

        if vertex != PASS && vertex != RESIGN {
            let mut active_allow = false;
            for m in &self.allow {
                if m.color == color && move_number <= m.until_move {
                    active_allow = true;
                    if m.vertex == vertex {
                        return false;
                    }
                }
            }
            return active_allow;
        }
        false
    }

    pub fn has_move_restrictions(&self) -> bool {
        !self.avoid.is_empty() || !self.allow.is_empty()
    }

    pub fn interval_centiseconds(&self) -> i32 {
        self.interval_centiseconds
    }

    /// Minimum number of moves to report, visited or not.
    pub fn post_move_count(&self) -> usize {
        self.min_moves
    }

    /// Side to analyze, if one was given.
    pub fn who(&self) -> Option<Color> {
        self.who
    }
}

fn parse_move_list(text: &str, position: &Position) -> Result<Vec<Vertex>, TagError> {
    let board = &position.board;
    let bad = || TagError::BadMoves(text.to_string());
    let mut moves = Vec::new();

    for item in text.split(',') {
        if let Some((from, to)) = item.split_once(':') {
            let a = board.text_to_move(from);
            let b = board.text_to_move(to);
            if [a, b].iter().any(|&v| v == NO_VERTEX || v == PASS || v == RESIGN) {
                return Err(bad());
            }
            let (ax, ay) = board.get_xy(a);
            let (bx, by) = board.get_xy(b);
            for x in ax.min(bx)..=ax.max(bx) {
                for y in ay.min(by)..=ay.max(by) {
                    moves.push(board.get_vertex(x, y));
                }
            }
        } else {
            let v = board.text_to_move(item);
            if v == NO_VERTEX {
                return Err(bad());
            }
            moves.push(v);
        }
    }

    if moves.is_empty() {
        return Err(bad());
    }
    Ok(moves)
}

// ============================================================================
// Analysis Lines
// ============================================================================

/// One candidate move as reported during analysis.
#[derive(Debug, Clone)]
pub struct AnalysisLine {
    pub mv: String,
    pub visits: u32,
    /// Mean score for the mover, in points.
    pub score: f32,
    pub prior: f32,
    pub pv: String,
    pub lcb: f32,
    /// Whether the move has enough visits for its LCB to be trusted.
    pub lcb_ratio_exceeded: bool,
}

impl AnalysisLine {
    /// The `info move ...` fragment for this line at position `order`.
    pub fn info_string(&self, order: usize) -> String {
        let mut out = format!(
            "info move {} visits {} score {} prior {} lcb {}",
            self.mv,
            self.visits,
            (self.score * 10000.0) as i64,
            (self.prior * 10000.0) as i64,
            (self.lcb.max(0.0) * 10000.0) as i64,
        );
        out.push_str(&format!(" order {order} pv "));
        out.push_str(&self.pv);
        out
    }

    /// Best first: trusted lines by LCB, then by visits, then by score.
    ///
    /// A trusted line always has more visits than an untrusted one, so
    /// putting trusted lines first agrees with ordering by visits.
    pub fn compare(&self, other: &Self) -> Ordering {
        let by_visits = || {
            other
                .visits
                .cmp(&self.visits)
                .then_with(|| other.score.total_cmp(&self.score))
        };
        match (self.lcb_ratio_exceeded, other.lcb_ratio_exceeded) {
            (true, true) => other.lcb.total_cmp(&self.lcb).then_with(by_visits),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => by_visits(),
        }
    }
}

/// Sort `lines` best first and join them into one analysis report.
pub fn format_analysis(lines: &mut [AnalysisLine]) -> String {
    lines.sort_by(|a, b| a.compare(b));
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| line.info_string(i))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position() -> Position {
        Position::new(9, 7.5)
    }

    fn line(mv: &str, visits: u32, score: f32, lcb: f32, exceeded: bool) -> AnalysisLine {
        AnalysisLine {
            mv: mv.to_string(),
            visits,
            score,
            prior: 0.1,
            pv: mv.to_string(),
            lcb,
            lcb_ratio_exceeded: exceeded,
        }
    }

    #[test]
    fn test_parse_interval_and_who() {
        let pos = position();
        let tags = AnalyzeTags::parse(&["w", "50"], &pos).unwrap();
        assert_eq!(tags.who(), Some(Color::White));
        assert_eq!(tags.interval_centiseconds(), 50);
        assert!(!tags.has_move_restrictions());

        let tags = AnalyzeTags::parse(&["interval", "25", "minmoves", "3"], &pos).unwrap();
        assert_eq!(tags.interval_centiseconds(), 25);
        assert_eq!(tags.post_move_count(), 3);
    }

    #[test]
    fn test_avoid_expires() {
        let pos = position();
        let tags = AnalyzeTags::parse(&["avoid", "b", "D4,pass", "2"], &pos).unwrap();
        let d4 = pos.board.text_to_move("D4");
        assert!(tags.is_to_avoid(Color::Black, d4, 0));
        assert!(tags.is_to_avoid(Color::Black, PASS, 1));
        assert!(!tags.is_to_avoid(Color::Black, d4, 2));
        assert!(!tags.is_to_avoid(Color::White, d4, 0));
    }

    #[test]
    fn test_allow_rectangle() {
        let pos = position();
        let tags = AnalyzeTags::parse(&["allow", "white", "A1:B2", "1"], &pos).unwrap();
        let b2 = pos.board.text_to_move("B2");
        let c3 = pos.board.text_to_move("C3");
        assert!(!tags.is_to_avoid(Color::White, b2, 0));
        assert!(tags.is_to_avoid(Color::White, c3, 0));
        // Pass stays available under allow.
        assert!(!tags.is_to_avoid(Color::White, PASS, 0));
        assert!(!tags.is_to_avoid(Color::Black, c3, 0));
    }

    #[test]
    fn test_parse_errors() {
        let pos = position();
        assert_eq!(
            AnalyzeTags::parse(&["sideways"], &pos).unwrap_err(),
            TagError::UnknownTag("sideways".to_string())
        );
        assert!(AnalyzeTags::parse(&["avoid", "b", "Z99", "1"], &pos).is_err());
        assert!(AnalyzeTags::parse(&["avoid", "b", "D4", "0"], &pos).is_err());
        assert_eq!(
            AnalyzeTags::parse(&["allow", "b", "D4", "1", "avoid", "b", "E5", "1"], &pos)
                .unwrap_err(),
            TagError::Conflict
        );
        assert!(AnalyzeTags::parse(&["allow", "b", "D4", "1", "avoid", "b", "pass", "1"], &pos).is_ok());
    }

    #[test]
    fn test_restrictions_apply_to_legality() {
        let pos = position();
        let tags = AnalyzeTags::parse(&["avoid", "b", "E5", "1"], &pos).unwrap();
        let e5 = pos.board.text_to_move("E5");
        assert!(pos.is_move_legal(Color::Black, e5));
        assert!(!pos.is_move_allowed(Color::Black, e5, &tags));
    }

    #[test]
    fn test_info_string_format() {
        let l = line("D4", 12, 0.25, -0.5, false);
        assert_eq!(
            l.info_string(0),
            "info move D4 visits 12 score 2500 prior 1000 lcb 0 order 0 pv D4"
        );
    }

    #[test]
    fn test_ordering() {
        let mut lines = vec![
            line("A1", 10, 5.0, 1.0, false),
            line("B1", 20, 1.0, 0.5, true),
            line("C1", 15, 2.0, 0.9, true),
            line("D1", 10, 6.0, 1.0, false),
        ];
        lines.sort_by(|a, b| a.compare(b));
        let order: Vec<_> = lines.iter().map(|l| l.mv.as_str()).collect();
        assert_eq!(order, ["C1", "B1", "D1", "A1"]);
    }
}
