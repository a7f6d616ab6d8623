//! Incrementally updated Go board.
//!
//! The board is a 1D letterboxed array: a ring of border vertices surrounds
//! the playable area so that every playable vertex has four neighbors.
//! Strings of connected stones are tracked with a union-find structure:
//!
//! - `parent[v]` names the representative stone of the string containing `v`
//! - `next[v]` links the stones of a string into a cyclic ring
//! - `libs[parent]` and `stones[parent]` hold the string's liberty and stone
//!   counts, valid only at the representative
//!
//! A per-vertex neighbor tally packs the number of black, white and empty
//! neighbors into 4-bit fields. Border neighbors count as both black and white,
//! which makes eye and liberty checks a single mask test.
//!
//! The board also maintains two Zobrist hashes incrementally: the full hash
//! (contents, prisoners, side to move, ko point, passes) and the ko hash
//! (contents only) used for positional superko.

use std::collections::VecDeque;
use std::fmt;

use crate::constants::{NO_VERTEX, NUM_VERTICES, PASS, RESIGN, Vertex};
use crate::evaluator::get_symmetry;
use crate::zobrist::{ZOBRIST, ZOBRIST_BLACK_TO_MOVE, ZOBRIST_EMPTY};

/// Width of each field in the neighbor tally.
const NEIGHBOR_SHIFT: u32 = 4;
const NEIGHBOR_MASK: u32 = (1 << NEIGHBOR_SHIFT) - 1;

/// Parent index shared by every empty and border vertex.
const SENTINEL: usize = NUM_VERTICES;

/// Liberties of the sentinel string. Large enough that decrements never reach zero.
const SENTINEL_LIBERTIES: u16 = 16384;

/// A player color.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Color {
    Black,
    White,
}

impl Color {
    /// The other color.
    #[inline]
    pub fn opponent(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    /// Index into per-color tables (black = 0, white = 1).
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Parse a protocol color such as `b`, `black`, `W` or `white`.
    pub fn parse(text: &str) -> Option<Color> {
        match text.to_ascii_lowercase().as_str() {
            "b" | "black" => Some(Color::Black),
            "w" | "white" => Some(Color::White),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Black => write!(f, "black"),
            Color::White => write!(f, "white"),
        }
    }
}

/// Contents of a single vertex.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Square {
    Black = 0,
    White = 1,
    Empty = 2,
    Invalid = 3,
}

impl Square {
    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

impl From<Color> for Square {
    fn from(color: Color) -> Self {
        match color {
            Color::Black => Square::Black,
            Color::White => Square::White,
        }
    }
}

/// Neighbor tally mask that is set when all four neighbors are `color` or border.
#[inline]
fn eye_mask(color: Color) -> u32 {
    4 << (NEIGHBOR_SHIFT * color.index() as u32)
}

#[inline]
fn tally_unit(square: Square) -> u32 {
    1 << (NEIGHBOR_SHIFT * square.index() as u32)
}

/// Go board with union-find strings and incremental hashing.
#[derive(Clone)]
pub struct Board {
    size: usize,
    side: usize,
    num_vertices: usize,
    directions: [isize; 4],
    state: [Square; NUM_VERTICES],
    neighbors: [u32; NUM_VERTICES],
    parent: [u16; NUM_VERTICES + 1],
    next: [u16; NUM_VERTICES + 1],
    libs: [u16; NUM_VERTICES + 1],
    stones: [u16; NUM_VERTICES + 1],
    empty: [u16; NUM_VERTICES],
    empty_idx: [u16; NUM_VERTICES],
    empty_count: usize,
    prisoners: [usize; 2],
    to_move: Color,
    hash: u64,
    ko_hash: u64,
}

impl Board {
    /// Create an empty board of the given size.
    pub fn new(size: usize) -> Self {
        let mut board = Board {
            size: 0,
            side: 0,
            num_vertices: 0,
            directions: [0; 4],
            state: [Square::Invalid; NUM_VERTICES],
            neighbors: [0; NUM_VERTICES],
            parent: [SENTINEL as u16; NUM_VERTICES + 1],
            next: [SENTINEL as u16; NUM_VERTICES + 1],
            libs: [0; NUM_VERTICES + 1],
            stones: [0; NUM_VERTICES + 1],
            empty: [0; NUM_VERTICES],
            empty_idx: [0; NUM_VERTICES],
            empty_count: 0,
            prisoners: [0; 2],
            to_move: Color::Black,
            hash: 0,
            ko_hash: 0,
        };
        board.reset_board(size);
        board
    }

    /// Clear the board and resize it.
    pub fn reset_board(&mut self, size: usize) {
        debug_assert!(size + 2 <= crate::constants::MAX_SIDE, "board size {size} too large");
        self.size = size;
        self.side = size + 2;
        self.num_vertices = self.side * self.side;
        let side = self.side as isize;
        self.directions = [-side, 1, side, -1];

        self.to_move = Color::Black;
        self.prisoners = [0; 2];
        self.empty_count = 0;

        self.state.fill(Square::Invalid);
        self.neighbors.fill(0);
        self.parent.fill(SENTINEL as u16);

        let border = tally_unit(Square::Black) | tally_unit(Square::White);
        for i in 0..size {
            for j in 0..size {
                let v = self.index(i, j);
                self.state[v] = Square::Empty;
                self.empty_idx[v] = self.empty_count as u16;
                self.empty[self.empty_count] = v as u16;
                self.empty_count += 1;

                for edge in [i == 0 || i == size - 1, j == 0 || j == size - 1] {
                    self.neighbors[v] += if edge {
                        border + tally_unit(Square::Empty)
                    } else {
                        2 * tally_unit(Square::Empty)
                    };
                }
            }
        }

        self.parent[SENTINEL] = SENTINEL as u16;
        self.next[SENTINEL] = SENTINEL as u16;
        self.libs[SENTINEL] = SENTINEL_LIBERTIES;
        self.stones[SENTINEL] = 0;

        self.hash = self.compute_hash(NO_VERTEX);
        self.ko_hash = self.compute_hash_ko();
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        (y + 1) * self.side + (x + 1)
    }

    #[inline]
    fn neighbor(&self, v: usize, k: usize) -> usize {
        v.wrapping_add_signed(self.directions[k])
    }

    /// Vertex of intersection `(x, y)`, with `(0, 0)` the lower-left corner.
    pub fn get_vertex(&self, x: usize, y: usize) -> Vertex {
        debug_assert!(x < self.size && y < self.size);
        self.index(x, y) as Vertex
    }

    /// Coordinates of an on-board vertex.
    pub fn get_xy(&self, vertex: Vertex) -> (usize, usize) {
        let v = vertex as usize;
        let x = v % self.side - 1;
        let y = v / self.side - 1;
        debug_assert!(x < self.size && y < self.size);
        (x, y)
    }

    /// Whether `vertex` is a playable intersection of this board.
    pub fn is_on_board(&self, vertex: Vertex) -> bool {
        vertex > 0
            && (vertex as usize) < self.num_vertices
            && self.state[vertex as usize] != Square::Invalid
    }

    /// Iterator over all playable vertices, row by row from the bottom.
    pub fn vertices(&self) -> impl Iterator<Item = Vertex> + '_ {
        (0..self.size)
            .flat_map(move |y| (0..self.size).map(move |x| self.index(x, y) as Vertex))
    }

    // =========================================================================
    // State Queries
    // =========================================================================

    #[inline]
    pub fn get_state(&self, vertex: Vertex) -> Square {
        self.state[vertex as usize]
    }

    pub fn get_state_xy(&self, x: usize, y: usize) -> Square {
        self.state[self.index(x, y)]
    }

    #[inline]
    pub fn to_move(&self) -> Color {
        self.to_move
    }

    /// Change the side to move, keeping the full hash in step.
    pub fn set_to_move(&mut self, color: Color) {
        if self.to_move != color {
            self.hash ^= ZOBRIST_BLACK_TO_MOVE;
        }
        self.to_move = color;
    }

    /// Hand the turn over without touching the hash; the caller has
    /// already accounted for the black-to-move key.
    #[inline]
    pub(crate) fn force_to_move(&mut self, color: Color) {
        self.to_move = color;
    }

    /// Stones captured by `color` so far.
    pub fn prisoners(&self, color: Color) -> usize {
        self.prisoners[color.index()]
    }

    /// Incrementally maintained full hash.
    #[inline]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Incrementally maintained ko (contents only) hash.
    #[inline]
    pub fn ko_hash(&self) -> u64 {
        self.ko_hash
    }

    /// Mix an extra key into the full hash. Used by the rules layer for the
    /// ko point and pass count, which the board does not own.
    #[inline]
    pub(crate) fn xor_hash(&mut self, key: u64) {
        self.hash ^= key;
    }

    #[inline]
    fn count_neighbors(&self, square: Square, v: usize) -> u32 {
        (self.neighbors[v] >> (NEIGHBOR_SHIFT * square.index() as u32)) & NEIGHBOR_MASK
    }

    /// Number of empty points orthogonally adjacent to `vertex`.
    pub fn count_liberties(&self, vertex: Vertex) -> usize {
        self.count_neighbors(Square::Empty, vertex as usize) as usize
    }

    /// Liberties of the string containing the stone at `vertex`.
    pub fn string_liberties(&self, vertex: Vertex) -> usize {
        self.libs[self.parent[vertex as usize] as usize] as usize
    }

    /// Stones in the string containing the stone at `vertex`.
    pub fn string_stones(&self, vertex: Vertex) -> usize {
        self.stones[self.parent[vertex as usize] as usize] as usize
    }

    /// Empty intersections, in no particular order.
    pub fn empty_intersections(&self) -> impl Iterator<Item = Vertex> + '_ {
        self.empty[..self.empty_count].iter().map(|&v| v as Vertex)
    }

    pub fn empty_count(&self) -> usize {
        self.empty_count
    }

    /// Whether playing `color` at empty `vertex` would leave its string with
    /// no liberties and capture nothing. This is the single suicide rule used
    /// both for legality checks and when the stone is actually placed.
    pub fn is_suicide(&self, vertex: Vertex, color: Color) -> bool {
        let v = vertex as usize;
        if self.count_neighbors(Square::Empty, v) > 0 {
            return false;
        }
        let own = Square::from(color);
        let other = Square::from(color.opponent());
        for k in 0..4 {
            let n = self.neighbor(v, k);
            let libs = self.libs[self.parent[n] as usize];
            if self.state[n] == own {
                if libs > 1 {
                    return false;
                }
            } else if self.state[n] == other && libs <= 1 {
                return false;
            }
        }
        true
    }

    /// Whether `vertex` is an eye of `color`: all four neighbors are `color`
    /// (or border), and the diagonals hold at most one enemy stone in the
    /// center or none at all on the edge.
    pub fn is_eye(&self, vertex: Vertex, color: Color) -> bool {
        let v = vertex as usize;
        if self.neighbors[v] & eye_mask(color) == 0 {
            return false;
        }

        let mut counts = [0usize; 4];
        let side = self.side;
        for d in [v - 1 - side, v + 1 - side, v - 1 + side, v + 1 + side] {
            counts[self.state[d].index()] += 1;
        }

        let enemy = counts[Square::from(color.opponent()).index()];
        if counts[Square::Invalid.index()] == 0 {
            enemy <= 1
        } else {
            enemy == 0
        }
    }

    // =========================================================================
    // Stone Placement
    // =========================================================================

    /// Place a stone of `color` at empty `vertex`, resolving captures, merges
    /// and suicide. Returns the new ko point, or `NO_VERTEX`.
    ///
    /// The caller checks legality first; this only asserts preconditions.
    pub fn update_board(&mut self, color: Color, vertex: Vertex) -> Vertex {
        debug_assert!(vertex != PASS && vertex != RESIGN);
        debug_assert!(self.get_state(vertex) == Square::Empty);

        let v = vertex as usize;
        let suicide = self.is_suicide(vertex, color);
        let zob = &*ZOBRIST;
        let own = Square::from(color);

        self.hash ^= zob.states[Square::Empty.index()][v];
        self.ko_hash ^= zob.states[Square::Empty.index()][v];

        self.state[v] = own;
        self.next[v] = v as u16;
        self.parent[v] = v as u16;
        self.libs[v] = self.count_neighbors(Square::Empty, v) as u16;
        self.stones[v] = 1;

        self.hash ^= zob.states[own.index()][v];
        self.ko_hash ^= zob.states[own.index()][v];

        self.add_neighbor(own, v);

        // Playing into an opponent eye is a ko candidate.
        let eye_play = self.neighbors[v] & eye_mask(color.opponent()) != 0;

        let other = Square::from(color.opponent());
        let mut captured_stones = 0;
        let mut captured_vtx = NO_VERTEX;

        for k in 0..4 {
            let n = self.neighbor(v, k);
            if self.state[n] == other {
                if self.libs[self.parent[n] as usize] == 0 {
                    captured_stones += self.remove_string(n);
                    captured_vtx = n as Vertex;
                }
            } else if self.state[n] == own {
                let ip = self.parent[v] as usize;
                let aip = self.parent[n] as usize;
                if ip != aip {
                    if self.stones[ip] >= self.stones[aip] {
                        self.merge_strings(ip, aip);
                    } else {
                        self.merge_strings(aip, ip);
                    }
                }
            }
        }

        let ci = color.index();
        self.hash ^= zob.prisoner_key(ci, self.prisoners[ci]);
        self.prisoners[ci] += captured_stones;
        self.hash ^= zob.prisoner_key(ci, self.prisoners[ci]);

        self.remove_from_empty(v);

        let alive = self.libs[self.parent[v] as usize] > 0;
        debug_assert_eq!(suicide, !alive, "suicide rule disagrees with liberty count");
        if suicide {
            debug_assert_eq!(captured_stones, 0);
            self.remove_string(v);
        }

        if captured_stones == 1 && eye_play {
            debug_assert!(self.get_state(captured_vtx) == Square::Empty);
            return captured_vtx;
        }
        NO_VERTEX
    }

    fn remove_from_empty(&mut self, v: usize) {
        self.empty_count -= 1;
        let last = self.empty[self.empty_count];
        let slot = self.empty_idx[v];
        self.empty_idx[last as usize] = slot;
        self.empty[slot as usize] = last;
    }

    /// Remove the string containing `v`, returning the number of stones removed.
    fn remove_string(&mut self, v: usize) -> usize {
        let zob = &*ZOBRIST;
        let color = self.state[v];
        let mut pos = v;
        let mut removed = 0;
        loop {
            self.hash ^= zob.states[color.index()][pos];
            self.ko_hash ^= zob.states[color.index()][pos];

            self.state[pos] = Square::Empty;
            self.parent[pos] = SENTINEL as u16;
            self.remove_neighbor(color, pos);

            self.empty_idx[pos] = self.empty_count as u16;
            self.empty[self.empty_count] = pos as u16;
            self.empty_count += 1;

            self.hash ^= zob.states[Square::Empty.index()][pos];
            self.ko_hash ^= zob.states[Square::Empty.index()][pos];

            removed += 1;
            pos = self.next[pos] as usize;
            if pos == v {
                break;
            }
        }
        removed
    }

    /// Merge string `aip` into string `ip`.
    fn merge_strings(&mut self, ip: usize, aip: usize) {
        debug_assert!(ip != SENTINEL && aip != SENTINEL);
        self.stones[ip] += self.stones[aip];

        let mut pos = aip;
        loop {
            for k in 0..4 {
                let lib = self.neighbor(pos, k);
                if self.state[lib] != Square::Empty {
                    continue;
                }
                // Only count liberties not already adjacent to `ip`.
                let shared = (0..4).any(|kk| self.parent[self.neighbor(lib, kk)] as usize == ip);
                if !shared {
                    self.libs[ip] += 1;
                }
            }
            self.parent[pos] = ip as u16;
            pos = self.next[pos] as usize;
            if pos == aip {
                break;
            }
        }
        self.next.swap(aip, ip);
    }

    fn add_neighbor(&mut self, square: Square, v: usize) {
        let mut seen = [SENTINEL + 1; 4];
        for k in 0..4 {
            let n = self.neighbor(v, k);
            self.neighbors[n] = self.neighbors[n]
                .wrapping_add(tally_unit(square))
                .wrapping_sub(tally_unit(Square::Empty));

            let p = self.parent[n] as usize;
            if !seen[..k].contains(&p) {
                self.libs[p] -= 1;
            }
            seen[k] = p;
        }
    }

    fn remove_neighbor(&mut self, square: Square, v: usize) {
        let mut seen = [SENTINEL + 1; 4];
        for k in 0..4 {
            let n = self.neighbor(v, k);
            self.neighbors[n] = self.neighbors[n]
                .wrapping_add(tally_unit(Square::Empty))
                .wrapping_sub(tally_unit(square));

            let p = self.parent[n] as usize;
            if !seen[..k].contains(&p) {
                self.libs[p] += 1;
            }
            seen[k] = p;
        }
    }

    // =========================================================================
    // Hashing
    // =========================================================================

    /// Recompute the full hash from scratch (without the pass count, which
    /// belongs to the rules layer).
    pub fn compute_hash(&self, ko_move: Vertex) -> u64 {
        self.compute_hash_with(ko_move, |v| v)
    }

    /// Full hash of the board transformed by one of the eight symmetries.
    pub fn compute_hash_symmetry(&self, ko_move: Vertex, symmetry: usize) -> u64 {
        self.compute_hash_with(ko_move, |v| {
            if v == NO_VERTEX as usize || self.state[v] == Square::Invalid {
                return v;
            }
            let (x, y) = self.get_xy(v as Vertex);
            let (sx, sy) = get_symmetry((x, y), symmetry, self.size);
            self.index(sx, sy)
        })
    }

    fn compute_hash_with(&self, ko_move: Vertex, transform: impl Fn(usize) -> usize) -> u64 {
        let zob = &*ZOBRIST;
        let mut res = ZOBRIST_EMPTY;
        for v in 0..self.num_vertices {
            if self.state[v] != Square::Invalid {
                res ^= zob.states[self.state[v].index()][transform(v)];
            }
        }
        res ^= zob.prisoner_key(0, self.prisoners[0]);
        res ^= zob.prisoner_key(1, self.prisoners[1]);
        if self.to_move == Color::Black {
            res ^= ZOBRIST_BLACK_TO_MOVE;
        }
        res ^ zob.ko_move[transform(ko_move as usize)]
    }

    /// Recompute the ko hash from scratch.
    pub fn compute_hash_ko(&self) -> u64 {
        let zob = &*ZOBRIST;
        (0..self.num_vertices)
            .filter(|&v| self.state[v] != Square::Invalid)
            .fold(ZOBRIST_EMPTY, |acc, v| acc ^ zob.states[self.state[v].index()][v])
    }

    // =========================================================================
    // Scoring
    // =========================================================================

    /// Count the stones of `color` plus every empty point reachable from them
    /// through empty points.
    pub fn compute_reach_color(&self, color: Color) -> usize {
        let target = Square::from(color);
        let mut counted = vec![false; self.num_vertices];
        let mut queue = VecDeque::new();

        for v in self.vertices() {
            let v = v as usize;
            if self.state[v] == target {
                counted[v] = true;
                queue.push_back(v);
            }
        }
        let mut reachable = queue.len();

        while let Some(v) = queue.pop_front() {
            for k in 0..4 {
                let n = self.neighbor(v, k);
                if !counted[n] && self.state[n] == Square::Empty {
                    counted[n] = true;
                    reachable += 1;
                    queue.push_back(n);
                }
            }
        }
        reachable
    }

    /// Tromp-Taylor area score from Black's point of view.
    pub fn area_score(&self, komi: f32) -> f32 {
        let black = self.compute_reach_color(Color::Black) as f32;
        let white = self.compute_reach_color(Color::White) as f32;
        black - white - komi
    }

    // =========================================================================
    // Text Conversion
    // =========================================================================

    /// Standard coordinate text (`D4`, `pass`, `resign`). Column letters skip `I`.
    pub fn move_to_text(&self, vertex: Vertex) -> String {
        match vertex {
            PASS => "pass".to_string(),
            RESIGN => "resign".to_string(),
            v if self.is_on_board(v) => {
                let (x, y) = self.get_xy(v);
                format!("{}{}", column_letter(x), y + 1)
            }
            _ => "error".to_string(),
        }
    }

    /// Parse standard coordinate text. Returns `NO_VERTEX` on malformed or
    /// off-board input.
    pub fn text_to_move(&self, text: &str) -> Vertex {
        let text = text.trim().to_ascii_lowercase();
        match text.as_str() {
            "pass" => return PASS,
            "resign" => return RESIGN,
            _ => {}
        }

        let bytes = text.as_bytes();
        if bytes.len() < 2 || !bytes[0].is_ascii_alphabetic() || bytes[0] == b'i' {
            return NO_VERTEX;
        }
        let mut column = (bytes[0] - b'a') as usize;
        if bytes[0] > b'i' {
            column -= 1;
        }
        let row = match text[1..].parse::<usize>() {
            Ok(row) if row >= 1 => row - 1,
            _ => return NO_VERTEX,
        };
        if column >= self.size || row >= self.size {
            return NO_VERTEX;
        }
        self.get_vertex(column, row)
    }

    /// SGF coordinate text. Rows are counted from the top; pass and resign
    /// are both written as `tt`.
    pub fn move_to_text_sgf(&self, vertex: Vertex) -> String {
        match vertex {
            PASS | RESIGN => "tt".to_string(),
            v if self.is_on_board(v) => {
                let (x, y) = self.get_xy(v);
                let row = self.size - y - 1;
                format!("{}{}", sgf_letter(x), sgf_letter(row))
            }
            _ => "error".to_string(),
        }
    }

    /// Parse SGF coordinate text. `tt` (on boards up to 19x19) and the empty
    /// string are passes.
    pub fn text_to_move_sgf(&self, text: &str) -> Vertex {
        if text.is_empty() || (text == "tt" && self.size <= 19) {
            return PASS;
        }
        let bytes = text.as_bytes();
        if bytes.len() != 2 {
            return NO_VERTEX;
        }
        match (sgf_index(bytes[0]), sgf_index(bytes[1])) {
            (Some(x), Some(row)) if x < self.size && row < self.size => {
                self.get_vertex(x, self.size - row - 1)
            }
            _ => NO_VERTEX,
        }
    }

    /// Space separated text of every stone in the string at `vertex`.
    pub fn get_string(&self, vertex: Vertex) -> String {
        let start = self.parent[vertex as usize] as usize;
        let mut stones = Vec::new();
        let mut pos = start;
        loop {
            stones.push(self.move_to_text(pos as Vertex));
            pos = self.next[pos] as usize;
            if pos == start {
                break;
            }
        }
        stones.join(" ")
    }

    /// Space separated text of every stone on the board.
    pub fn get_stone_list(&self) -> String {
        self.vertices()
            .filter(|&v| self.get_state(v) != Square::Empty)
            .map(|v| self.move_to_text(v))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Text diagram of the board, marking `last_move` with parentheses.
    pub fn render(&self, last_move: Vertex) -> String {
        let mut out = String::new();
        let columns: String = (0..self.size).map(|x| format!("{} ", column_letter(x))).collect();

        out.push_str(&format!("\n   {columns}\n"));
        for y in (0..self.size).rev() {
            out.push_str(&format!("{:2}", y + 1));
            out.push(if last_move == self.get_vertex(0, y) { '(' } else { ' ' });
            for x in 0..self.size {
                let v = self.get_vertex(x, y);
                out.push(match self.get_state(v) {
                    Square::White => 'O',
                    Square::Black => 'X',
                    _ if star_point(self.size, x, y) => '+',
                    _ => '.',
                });
                if last_move == v {
                    out.push(')');
                } else if x != self.size - 1 && last_move == v + 1 {
                    out.push('(');
                } else {
                    out.push(' ');
                }
            }
            out.push_str(&format!("{:2}\n", y + 1));
        }
        out.push_str(&format!("   {columns}\n"));
        out.push_str(&format!(
            "Hash: {:X} Ko-Hash: {:X}\n",
            self.hash, self.ko_hash
        ));
        out
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(NO_VERTEX))
    }
}

/// Whether `(x, y)` is a handicap star point on a board of `size`.
pub fn star_point(size: usize, x: usize, y: usize) -> bool {
    if size % 2 == 0 || size < 9 {
        return false;
    }
    let low = if size >= 13 { 3 } else { 2 };
    let stars = [low, size / 2, size - 1 - low];
    stars.contains(&x) && stars.contains(&y)
}

fn column_letter(x: usize) -> char {
    let offset = if x < 8 { x } else { x + 1 };
    (b'A' + offset as u8) as char
}

fn sgf_letter(i: usize) -> char {
    if i <= 25 {
        (b'a' + i as u8) as char
    } else {
        (b'A' + (i - 26) as u8) as char
    }
}

fn sgf_index(c: u8) -> Option<usize> {
    match c {
        b'a'..=b'z' => Some((c - b'a') as usize),
        b'A'..=b'Z' => Some((c - b'A') as usize + 26),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(board: &Board, text: &str) -> Vertex {
        board.text_to_move(text)
    }

    fn place(board: &mut Board, color: Color, stones: &[&str]) {
        for s in stones {
            let v = at(board, s);
            board.update_board(color, v);
        }
    }

    #[test]
    fn test_empty_board() {
        let board = Board::new(9);
        assert_eq!(board.empty_count(), 81);
        assert_eq!(board.count_liberties(at(&board, "A1")), 2);
        assert_eq!(board.count_liberties(at(&board, "A5")), 3);
        assert_eq!(board.count_liberties(at(&board, "E5")), 4);
        assert_eq!(board.hash(), board.compute_hash(NO_VERTEX));
        assert_eq!(board.ko_hash(), board.compute_hash_ko());
    }

    #[test]
    fn test_single_stone_liberties() {
        let mut board = Board::new(9);
        place(&mut board, Color::Black, &["E5"]);
        assert_eq!(board.string_liberties(at(&board, "E5")), 4);
        place(&mut board, Color::White, &["E6"]);
        assert_eq!(board.string_liberties(at(&board, "E5")), 3);
        assert_eq!(board.string_liberties(at(&board, "E6")), 3);
    }

    #[test]
    fn test_merge_counts_shared_liberties_once() {
        let mut board = Board::new(9);
        place(&mut board, Color::Black, &["D4", "F4", "E4"]);
        let e4 = at(&board, "E4");
        assert_eq!(board.string_stones(e4), 3);
        // Three in a row in open space: 8 liberties.
        assert_eq!(board.string_liberties(e4), 8);
        assert_eq!(board.string_liberties(at(&board, "D4")), 8);

        place(&mut board, Color::Black, &["E5", "D5"]);
        assert_eq!(board.string_stones(e4), 5);
        assert_eq!(board.string_liberties(e4), 9);
    }

    #[test]
    fn test_capture_updates_prisoners_and_liberties() {
        let mut board = Board::new(9);
        place(&mut board, Color::White, &["E5"]);
        place(&mut board, Color::Black, &["E4", "E6", "D5"]);
        assert_eq!(board.string_liberties(at(&board, "E5")), 1);
        place(&mut board, Color::Black, &["F5"]);
        assert_eq!(board.get_state(at(&board, "E5")), Square::Empty);
        assert_eq!(board.prisoners(Color::Black), 1);
        assert_eq!(board.string_liberties(at(&board, "F5")), 4);
        assert_eq!(board.string_liberties(at(&board, "E4")), 4);
        assert_eq!(board.hash(), board.compute_hash(NO_VERTEX));
        assert_eq!(board.ko_hash(), board.compute_hash_ko());
    }

    #[test]
    fn test_is_suicide() {
        let mut board = Board::new(9);
        place(&mut board, Color::Black, &["B1", "A2"]);
        let a1 = at(&board, "A1");
        assert!(board.is_suicide(a1, Color::White));
        assert!(!board.is_suicide(a1, Color::Black));

        // White can play there if it captures.
        place(&mut board, Color::White, &["C1", "B2", "A3"]);
        assert!(!board.is_suicide(a1, Color::White));
    }

    #[test]
    fn test_is_eye_center_and_edge() {
        let mut board = Board::new(9);
        place(&mut board, Color::Black, &["D5", "F5", "E4", "E6"]);
        let e5 = at(&board, "E5");
        assert!(board.is_eye(e5, Color::Black));
        assert!(!board.is_eye(e5, Color::White));

        place(&mut board, Color::White, &["D4"]);
        assert!(board.is_eye(e5, Color::Black));
        place(&mut board, Color::White, &["F6"]);
        assert!(!board.is_eye(e5, Color::Black));

        // On the edge one enemy diagonal already spoils the eye.
        let mut board = Board::new(9);
        place(&mut board, Color::Black, &["D1", "F1", "E2"]);
        let e1 = at(&board, "E1");
        assert!(board.is_eye(e1, Color::Black));
        place(&mut board, Color::White, &["D2"]);
        assert!(!board.is_eye(e1, Color::Black));
    }

    #[test]
    fn test_simple_ko_detection() {
        let mut board = Board::new(9);
        // Black: D5 E4 E6, White: F4 F6 G5 E5; black F5 captures E5.
        place(&mut board, Color::Black, &["D5", "E4", "E6"]);
        place(&mut board, Color::White, &["F4", "F6", "G5", "E5"]);
        let ko = board.update_board(Color::Black, at(&board, "F5"));
        assert_eq!(ko, at(&board, "E5"));
        assert_eq!(board.prisoners(Color::Black), 1);
        assert!(!board.is_suicide(ko, Color::White));
    }

    #[test]
    fn test_reach_color_partition() {
        let mut board = Board::new(5);
        // Black wall on column B, white wall on column D.
        place(&mut board, Color::Black, &["B1", "B2", "B3", "B4", "B5"]);
        place(&mut board, Color::White, &["D1", "D2", "D3", "D4", "D5"]);
        let black = board.compute_reach_color(Color::Black);
        let white = board.compute_reach_color(Color::White);
        // Column C is reachable by both.
        assert_eq!(black, 15);
        assert_eq!(white, 15);
        assert_eq!(board.area_score(0.5), -0.5);

        place(&mut board, Color::Black, &["C1", "C2", "C3", "C4", "C5"]);
        let black = board.compute_reach_color(Color::Black);
        let white = board.compute_reach_color(Color::White);
        assert_eq!(black + white, 25);
        assert_eq!(board.area_score(7.5), 15.0 - 10.0 - 7.5);
    }

    #[test]
    fn test_text_round_trip() {
        let board = Board::new(9);
        for v in board.vertices() {
            assert_eq!(board.text_to_move(&board.move_to_text(v)), v);
            assert_eq!(board.text_to_move_sgf(&board.move_to_text_sgf(v)), v);
        }
        assert_eq!(board.text_to_move("pass"), PASS);
        assert_eq!(board.text_to_move("RESIGN"), RESIGN);
        assert_eq!(board.move_to_text(PASS), "pass");
        assert_eq!(board.move_to_text(RESIGN), "resign");
        assert_eq!(board.move_to_text_sgf(PASS), "tt");
    }

    #[test]
    fn test_text_skips_i() {
        let board = Board::new(9);
        assert_eq!(board.move_to_text(board.get_vertex(8, 0)), "J1");
        assert_eq!(board.text_to_move("i5"), NO_VERTEX);
        assert_eq!(board.text_to_move("j1"), board.get_vertex(8, 0));
        assert_eq!(board.text_to_move("k1"), NO_VERTEX);
        assert_eq!(board.text_to_move("a0"), NO_VERTEX);
        assert_eq!(board.text_to_move("a10"), NO_VERTEX);
        assert_eq!(board.text_to_move("4d"), NO_VERTEX);
        assert_eq!(board.move_to_text_sgf(board.get_vertex(0, 8)), "aa");
    }

    #[test]
    fn test_star_points() {
        assert!(star_point(9, 2, 2));
        assert!(star_point(9, 4, 4));
        assert!(!star_point(9, 3, 3));
        assert!(star_point(19, 3, 15));
        assert!(!star_point(8, 2, 2));
    }

    #[test]
    fn test_get_string() {
        let mut board = Board::new(9);
        place(&mut board, Color::Black, &["A1", "A2"]);
        let mut stones: Vec<String> = board
            .get_string(at(&board, "A1"))
            .split(' ')
            .map(String::from)
            .collect();
        stones.sort();
        assert_eq!(stones, vec!["A1", "A2"]);
        assert_eq!(board.get_stone_list(), "A1 A2");
    }
}
