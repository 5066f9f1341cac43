use std::fmt;
use std::ops::Range;

use crate::line_buffer::LineBuffer;
use crate::position::{AbsCoord, GridCoord, LinePosition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
	Forwards,
	Backwards,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseSensitivity {
	Sensitive,
	Insensitive,
	/// Sensitive iff the query contains an uppercase letter.
	Smart,
}

/// Everything that determines how a search behaves. Never mutated once a search begins.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
	/// If set, only these absolute line numbers are searched.
	pub abs_line_range: Option<Range<i64>>,
	pub direction: Direction,
	/// Treat `query` as a regular expression rather than a substring.
	pub regex: bool,
	pub query: String,
	pub case_sensitivity: CaseSensitivity,
	pub want_multiple_results: bool,
	/// At most one result per raw line; useful for filtering.
	pub limit_results_to_one_per_raw_line: bool,
	/// An empty query matches every line in full.
	pub empty_query_matches: bool,
	/// Allow matches to cross line boundaries within a block.
	pub span_lines: bool,
	pub cumulative_overflow: i64,
	pub force_main_screen: bool,
	/// Where to begin when `start_position` is not given.
	pub initial_start: AbsCoord,
	/// Positions to skip from `initial_start`, in search direction.
	pub offset: i32,
	/// Overrides `initial_start`.
	pub start_position: Option<LinePosition>,
	/// Bound on outstanding result batches before the producer stalls.
	pub max_queue_size: Option<usize>,
}

impl SearchRequest {
	/// A case-insensitive, multi-result substring search.
	pub fn new(query: impl Into<String>, direction: Direction, initial_start: AbsCoord) -> Self {
		Self {
			abs_line_range: None,
			direction,
			regex: false,
			query: query.into(),
			case_sensitivity: CaseSensitivity::Insensitive,
			want_multiple_results: true,
			limit_results_to_one_per_raw_line: false,
			empty_query_matches: false,
			span_lines: false,
			cumulative_overflow: 0,
			force_main_screen: false,
			initial_start,
			offset: 0,
			start_position: None,
			max_queue_size: None,
		}
	}

	fn line_range(&self) -> Option<&Range<i64>> {
		self.abs_line_range.as_ref().filter(|r| !r.is_empty())
	}

	/// Start of the second pass.
	pub fn wrapped_start_position(&self, buffer: &LineBuffer) -> LinePosition {
		let fallback = match self.direction {
			Direction::Forwards => buffer.first_position(),
			Direction::Backwards => buffer.last_position(),
		};
		let Some(range) = self.line_range() else {
			return fallback;
		};
		let abs_y = match self.direction {
			Direction::Forwards => range.start,
			Direction::Backwards => range.end,
		};
		let y = (abs_y - buffer.cumulative_overflow()).max(0);
		buffer.position_for(GridCoord::new(0, y), 0).unwrap_or(fallback)
	}

	/// Start of the first pass.
	pub fn start_position(&self, buffer: &LineBuffer) -> Option<LinePosition> {
		let overflow = buffer.cumulative_overflow();
		let mut coord = self.initial_start.relative_clamped(overflow);
		if let Some(range) = self.line_range() {
			let lo = (range.start - overflow).max(0);
			let hi = (range.end - overflow).max(0);
			if lo < hi {
				coord.y = coord.y.clamp(lo, hi - 1);
			}
		}
		let sign = match self.direction {
			Direction::Forwards => 1,
			Direction::Backwards => -1,
		};
		let Some(start) = buffer.position_for(coord, i64::from(self.offset) * sign) else {
			return Some(match self.direction {
				Direction::Forwards => buffer.first_position(),
				Direction::Backwards => buffer.last_position(),
			});
		};
		Some(start.min(buffer.last_position()))
	}

	/// Where the current pass ends. After wrapping this is the original start.
	pub fn stop_position(&self, buffer: &LineBuffer, has_wrapped: bool) -> Option<LinePosition> {
		if has_wrapped {
			// An evicted start means everything before it is gone too.
			let Some(coord) = self.initial_start.relative(buffer.cumulative_overflow()) else {
				return Some(buffer.first_position());
			};
			if let Some(initial) = buffer.position_for(coord, 0) {
				return Some(initial);
			}
		}
		let Some(range) = self.line_range() else {
			return Some(match self.direction {
				Direction::Forwards => buffer.last_position(),
				Direction::Backwards => buffer.first_position(),
			});
		};
		let overflow = buffer.cumulative_overflow();
		let (y, fallback) = match self.direction {
			Direction::Forwards => ((range.end - overflow).max(0), buffer.last_position()),
			Direction::Backwards => ((range.start - overflow).max(0), buffer.first_position()),
		};
		Some(buffer.position_for(GridCoord::new(0, y), 0).unwrap_or(fallback))
	}
}

impl fmt::Display for SearchRequest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "<SearchRequest {:?} query={:?}", self.direction, self.query)?;
		if let Some(range) = &self.abs_line_range {
			write!(f, " abs_line_range={range:?}")?;
		}
		if self.regex {
			f.write_str(" regex")?;
		}
		if self.case_sensitivity != CaseSensitivity::Smart {
			write!(f, " {:?}", self.case_sensitivity)?;
		}
		if !self.want_multiple_results {
			f.write_str(" single")?;
		}
		if self.limit_results_to_one_per_raw_line {
			f.write_str(" one_per_raw_line")?;
		}
		if self.empty_query_matches {
			f.write_str(" empty_query_matches")?;
		}
		if self.span_lines {
			f.write_str(" span_lines")?;
		}
		write!(f, " initial_start={}", self.initial_start)?;
		if self.offset != 0 {
			write!(f, " offset={}", self.offset)?;
		}
		if let Some(pos) = self.start_position {
			write!(f, " start_position={pos}")?;
		}
		if let Some(max) = self.max_queue_size {
			write!(f, " max_queue_size={max}")?;
		}
		f.write_str(">")
	}
}
