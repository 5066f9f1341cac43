//! Reference scrollback store.
//!
//! Raw (unwrapped) lines are grouped into blocks. A block is the unit of work for one
//! search slice, so blocks are kept small: [`LineBuffer::seal`] forces the next append
//! into a fresh block, and a block that reaches `block_capacity` characters seals itself.
//!
//! Cloning a buffer shares every block; mutation copies only the block it touches.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::position::{AbsCoord, GridCoord, LinePosition};

pub const DEFAULT_BLOCK_CAPACITY: usize = 8192;
/// Popped line ids remembered for rebasing searches.
const POP_LOG_LEN: usize = 64;

#[derive(Debug, Clone)]
struct RawLine {
	text: String,
	chars: usize,
}

#[derive(Debug, Clone)]
struct LineBlock {
	first_line: i64,
	lines: VecDeque<RawLine>,
	chars: usize,
	rows: usize,
}

impl LineBlock {
	fn new(first_line: i64) -> Self {
		Self {
			first_line,
			lines: VecDeque::new(),
			chars: 0,
			rows: 0,
		}
	}

	fn end_line(&self) -> i64 {
		self.first_line + self.lines.len() as i64
	}
}

#[derive(Debug, Clone)]
pub struct LineBuffer {
	blocks: VecDeque<Arc<LineBlock>>,
	width: usize,
	max_rows: Option<usize>,
	block_capacity: usize,
	sealed: bool,
	next_line: i64,
	rows: usize,
	overflow: i64,
	pops: u64,
	pop_log: VecDeque<i64>,
}

impl LineBuffer {
	/// Creates an empty buffer that wraps lines at `width` cells.
	pub fn new(width: usize) -> Self {
		Self {
			blocks: VecDeque::new(),
			width: width.max(1),
			max_rows: None,
			block_capacity: DEFAULT_BLOCK_CAPACITY,
			sealed: false,
			next_line: 0,
			rows: 0,
			overflow: 0,
			pops: 0,
			pop_log: VecDeque::new(),
		}
	}

	pub fn with_block_capacity(mut self, chars: usize) -> Self {
		self.block_capacity = chars.max(1);
		self
	}

	/// Caps the buffer at `rows` wrapped rows; older lines are evicted from the front.
	pub fn set_max_rows(&mut self, rows: Option<usize>) {
		self.max_rows = rows;
		self.evict();
	}

	pub fn width(&self) -> usize {
		self.width
	}

	/// Rows evicted from the front since the buffer was created.
	pub fn cumulative_overflow(&self) -> i64 {
		self.overflow
	}

	pub fn num_rows(&self) -> usize {
		self.rows
	}

	pub fn num_lines(&self) -> usize {
		(self.next_line - self.first_line()) as usize
	}

	pub fn is_empty(&self) -> bool {
		self.num_lines() == 0
	}

	pub fn first_line(&self) -> i64 {
		self.blocks.front().map_or(self.next_line, |b| b.first_line)
	}

	/// One past the last line id.
	pub fn end_line(&self) -> i64 {
		self.next_line
	}

	pub fn first_position(&self) -> LinePosition {
		LinePosition::new(self.first_line(), 0)
	}

	/// The position just past the last line.
	pub fn last_position(&self) -> LinePosition {
		LinePosition::new(self.next_line, 0)
	}

	/// The position of the last character, or the first position when the buffer is empty.
	pub fn penultimate_position(&self) -> LinePosition {
		match self.line_len(self.next_line - 1) {
			Some(len) => LinePosition::new(self.next_line - 1, len.saturating_sub(1)),
			None => self.first_position(),
		}
	}

	/// Makes the next appended line start a new block.
	pub fn seal(&mut self) {
		self.sealed = true;
	}

	pub fn append_line(&mut self, text: impl Into<String>) {
		let text = text.into();
		let chars = text.chars().count();
		let rows = self.rows_for(chars);
		let start_new = self.sealed || self.blocks.back().is_none_or(|b| b.chars >= self.block_capacity);
		if start_new {
			self.blocks.push_back(Arc::new(LineBlock::new(self.next_line)));
			self.sealed = false;
		}
		if let Some(block) = self.blocks.back_mut() {
			let block = Arc::make_mut(block);
			block.lines.push_back(RawLine { text, chars });
			block.chars += chars;
			block.rows += rows;
		}
		self.next_line += 1;
		self.rows += rows;
		self.evict();
	}

	/// Removes the most recently appended line. Its id is handed out again by the next append.
	pub fn pop_last_line(&mut self) -> Option<String> {
		let width = self.width;
		let block = self.blocks.back_mut()?;
		let block = Arc::make_mut(block);
		let line = block.lines.pop_back()?;
		let rows = line.chars.div_ceil(width).max(1);
		block.chars -= line.chars;
		block.rows -= rows;
		if block.lines.is_empty() {
			self.blocks.pop_back();
		}
		self.next_line -= 1;
		self.rows -= rows;
		self.pops += 1;
		if self.pop_log.len() == POP_LOG_LEN {
			self.pop_log.pop_front();
		}
		self.pop_log.push_back(self.next_line);
		Some(line.text)
	}

	/// Lines popped since this buffer was created.
	pub fn pop_count(&self) -> u64 {
		self.pops
	}

	/// Ids of the lines popped after the buffer's pop count was `mark`, oldest first.
	/// `None` when the log no longer reaches back that far.
	pub fn popped_since(&self, mark: u64) -> Option<impl Iterator<Item = i64> + '_> {
		let count = usize::try_from(self.pops.checked_sub(mark)?).ok()?;
		if count > self.pop_log.len() {
			return None;
		}
		Some(self.pop_log.iter().skip(self.pop_log.len() - count).copied())
	}

	pub fn line(&self, id: i64) -> Option<&str> {
		self.raw_line(id).map(|l| l.text.as_str())
	}

	pub fn line_len(&self, id: i64) -> Option<usize> {
		self.raw_line(id).map(|l| l.chars)
	}

	/// Wrapped rows occupied by a line of `chars` characters. Empty lines take one row.
	pub fn rows_for(&self, chars: usize) -> usize {
		chars.div_ceil(self.width).max(1)
	}

	/// Rows held before `line`. Ids past the end count every row.
	pub fn rows_before(&self, line: i64) -> usize {
		let mut rows = 0;
		for block in &self.blocks {
			if block.end_line() <= line {
				rows += block.rows;
				continue;
			}
			for raw in block.lines.iter().take((line - block.first_line).max(0) as usize) {
				rows += self.rows_for(raw.chars);
			}
			break;
		}
		rows
	}

	/// Relative cell of `pos`; `None` when the line is not held.
	pub fn coordinate(&self, pos: LinePosition) -> Option<GridCoord> {
		if pos.line == self.next_line && pos.col == 0 {
			return Some(GridCoord::new(0, self.rows as i64));
		}
		let len = self.line_len(pos.line)?;
		let line_rows = self.rows_for(len);
		let row = (pos.col / self.width).min(line_rows - 1);
		let x = pos.col - row * self.width;
		Some(GridCoord::new(x as i32, (self.rows_before(pos.line) + row) as i64))
	}

	/// Absolute cell of `pos`, or [`AbsCoord::INVALID`] when the line is not held.
	pub fn abs_coord(&self, pos: LinePosition) -> AbsCoord {
		match self.coordinate(pos) {
			Some(c) => AbsCoord::new(c.x, c.y + self.overflow),
			None => AbsCoord::INVALID,
		}
	}

	/// Resolves a relative cell, then moves `offset` positions forward (or backward when
	/// negative). Columns past the end of a line clamp to the line end. Every line has
	/// `len + 1` positions so a move may cross line boundaries.
	pub fn position_for(&self, coord: GridCoord, offset: i64) -> Option<LinePosition> {
		if coord.y < 0 {
			return None;
		}
		let target = coord.y as usize;
		if target == self.rows && coord.x <= 0 {
			return self.advance(self.last_position(), offset);
		}
		let mut row = 0;
		for block in &self.blocks {
			if row + block.rows <= target {
				row += block.rows;
				continue;
			}
			for (i, raw) in block.lines.iter().enumerate() {
				let rows = self.rows_for(raw.chars);
				if row + rows > target {
					let col = (target - row) * self.width + coord.x.max(0) as usize;
					let pos = LinePosition::new(block.first_line + i as i64, col.min(raw.chars));
					return self.advance(pos, offset);
				}
				row += rows;
			}
		}
		None
	}

	/// Moves `delta` positions from `pos`; `None` when that leaves the buffer.
	pub fn advance(&self, pos: LinePosition, delta: i64) -> Option<LinePosition> {
		let mut pos = pos;
		if delta >= 0 {
			let mut left = delta as usize;
			while left > 0 {
				let len = self.line_len(pos.line)?;
				let room = len - pos.col.min(len);
				if left <= room {
					pos.col += left;
					return Some(pos);
				}
				left -= room + 1;
				pos = LinePosition::new(pos.line + 1, 0);
				if pos.line == self.next_line {
					return (left == 0).then_some(pos);
				}
			}
		} else {
			let mut left = delta.unsigned_abs() as usize;
			while left > 0 {
				if left <= pos.col {
					pos.col -= left;
					return Some(pos);
				}
				left -= pos.col + 1;
				let prev = pos.line - 1;
				pos = LinePosition::new(prev, self.line_len(prev)?);
			}
		}
		Some(pos)
	}

	pub(crate) fn block_count(&self) -> usize {
		self.blocks.len()
	}

	/// Index of the block holding `line`.
	pub(crate) fn block_index(&self, line: i64) -> Option<usize> {
		let idx = self.blocks.partition_point(|b| b.end_line() <= line);
		let block = self.blocks.get(idx)?;
		(block.first_line <= line).then_some(idx)
	}

	/// `(first_line, end_line)` of a block.
	pub(crate) fn block_bounds(&self, idx: usize) -> Option<(i64, i64)> {
		self.blocks.get(idx).map(|b| (b.first_line, b.end_line()))
	}

	/// Lines of a block with their ids, restricted to `lo..=hi`.
	pub(crate) fn block_lines(&self, idx: usize, lo: i64, hi: i64) -> impl Iterator<Item = (i64, &str)> {
		self.blocks.get(idx).into_iter().flat_map(move |b| {
			b.lines
				.iter()
				.enumerate()
				.map(move |(i, l)| (b.first_line + i as i64, l.text.as_str()))
				.filter(move |(id, _)| (lo..=hi).contains(id))
		})
	}

	fn raw_line(&self, id: i64) -> Option<&RawLine> {
		let block = &self.blocks[self.block_index(id)?];
		block.lines.get((id - block.first_line) as usize)
	}

	fn evict(&mut self) {
		let Some(max) = self.max_rows else {
			return;
		};
		while self.rows > max {
			let Some(front) = self.blocks.front_mut() else {
				break;
			};
			let block = Arc::make_mut(front);
			let Some(line) = block.lines.pop_front() else {
				self.blocks.pop_front();
				continue;
			};
			let rows = line.chars.div_ceil(self.width).max(1);
			block.first_line += 1;
			block.chars -= line.chars;
			block.rows -= rows;
			if block.lines.is_empty() {
				self.blocks.pop_front();
			}
			self.rows -= rows;
			self.overflow += rows as i64;
		}
	}
}
