use std::ops::Range;

use regex::{Regex, RegexBuilder};

use crate::error::SearchError;
use crate::line_buffer::LineBuffer;
use crate::position::LinePosition;
use crate::request::{CaseSensitivity, Direction, SearchRequest};

/// A match in line-buffer positions. `end` is the last matched character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawMatch {
	pub start: LinePosition,
	pub end: LinePosition,
}

/// Compiled form of a request's query.
#[derive(Debug)]
pub(crate) struct Matcher {
	regex: Option<Regex>,
	direction: Direction,
	whole_line_when_empty: bool,
	one_per_line: bool,
	span_lines: bool,
}

impl Matcher {
	pub fn new(request: &SearchRequest) -> Result<Self, SearchError> {
		let regex = if request.query.is_empty() {
			None
		} else {
			let pattern = if request.regex {
				request.query.clone()
			} else {
				regex::escape(&request.query)
			};
			let sensitive = match request.case_sensitivity {
				CaseSensitivity::Sensitive => true,
				CaseSensitivity::Insensitive => false,
				CaseSensitivity::Smart => request.query.chars().any(char::is_uppercase),
			};
			Some(RegexBuilder::new(&pattern).case_insensitive(!sensitive).multi_line(true).build()?)
		};
		Ok(Self {
			regex,
			direction: request.direction,
			whole_line_when_empty: request.query.is_empty() && request.empty_query_matches,
			one_per_line: request.limit_results_to_one_per_raw_line,
			span_lines: request.span_lines,
		})
	}

	/// Matches in one block whose start lies in `region`, ordered in search direction.
	pub fn find(&self, buffer: &LineBuffer, block: usize, region: Range<LinePosition>) -> Vec<RawMatch> {
		if region.start >= region.end {
			return Vec::new();
		}
		let lines: Vec<(i64, &str)> = buffer.block_lines(block, region.start.line, region.end.line).collect();
		let mut found = if self.whole_line_when_empty {
			lines
				.iter()
				.map(|&(id, text)| RawMatch {
					start: LinePosition::new(id, 0),
					end: LinePosition::new(id, text.chars().count().max(1) - 1),
				})
				.collect()
		} else if self.span_lines {
			self.find_spanning(&lines)
		} else {
			self.find_per_line(&lines)
		};
		found.retain(|m| region.contains(&m.start));
		if self.direction == Direction::Backwards {
			found.reverse();
		}
		if self.one_per_line {
			found.dedup_by_key(|m| m.start.line);
		}
		found
	}

	fn find_per_line(&self, lines: &[(i64, &str)]) -> Vec<RawMatch> {
		let Some(regex) = &self.regex else {
			return Vec::new();
		};
		let mut out = Vec::new();
		for &(id, text) in lines {
			for m in regex.find_iter(text) {
				if m.is_empty() {
					continue;
				}
				let start = char_col(text, m.start());
				let end = start + text[m.range()].chars().count() - 1;
				out.push(RawMatch {
					start: LinePosition::new(id, start),
					end: LinePosition::new(id, end),
				});
			}
		}
		out
	}

	fn find_spanning(&self, lines: &[(i64, &str)]) -> Vec<RawMatch> {
		let Some(regex) = &self.regex else {
			return Vec::new();
		};
		let mut joined = String::new();
		let mut starts = Vec::with_capacity(lines.len());
		for (i, &(id, text)) in lines.iter().enumerate() {
			if i > 0 {
				joined.push('\n');
			}
			starts.push((joined.len(), id));
			joined.push_str(text);
		}
		let locate = |byte: usize| -> LinePosition {
			let idx = starts.partition_point(|&(offset, _)| offset <= byte).saturating_sub(1);
			let (offset, id) = starts[idx];
			LinePosition::new(id, char_col(&joined[offset..], byte - offset))
		};
		let mut out = Vec::new();
		for m in regex.find_iter(&joined) {
			if m.is_empty() {
				continue;
			}
			let last = joined[..m.end()].char_indices().next_back().map_or(m.start(), |(i, _)| i);
			out.push(RawMatch {
				start: locate(m.start()),
				end: locate(last),
			});
		}
		out
	}
}

fn char_col(text: &str, byte: usize) -> usize {
	text[..byte].chars().count()
}
