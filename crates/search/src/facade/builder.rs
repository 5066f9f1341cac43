use std::ops::Range;

use bitflags::bitflags;

use super::SearchDataSource;
use crate::position::{AbsCoord, GridCoord, LinePosition};
use crate::request::{CaseSensitivity, Direction, SearchRequest};

/// Query interpretation as picked in a find panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindMode {
	CaseSensitiveSubstring,
	CaseInsensitiveSubstring,
	CaseSensitiveRegex,
	CaseInsensitiveRegex,
	#[default]
	SmartCase,
}

impl FindMode {
	pub fn is_regex(self) -> bool {
		matches!(self, Self::CaseSensitiveRegex | Self::CaseInsensitiveRegex)
	}

	pub fn from_request(request: &SearchRequest) -> Self {
		match (request.case_sensitivity, request.regex) {
			(CaseSensitivity::Insensitive, true) => Self::CaseInsensitiveRegex,
			(CaseSensitivity::Insensitive, false) => Self::CaseInsensitiveSubstring,
			(CaseSensitivity::Sensitive, true) => Self::CaseSensitiveRegex,
			(CaseSensitivity::Sensitive, false) => Self::CaseSensitiveSubstring,
			(CaseSensitivity::Smart, _) => Self::SmartCase,
		}
	}
}

bitflags! {
	/// Search behavior switches.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct FindOptions: u8 {
		const BACKWARDS = 1 << 0;
		const MULTIPLE_RESULTS = 1 << 1;
		const ONE_RESULT_PER_RAW_LINE = 1 << 2;
		const EMPTY_QUERY_MATCHES = 1 << 3;
		const MULTI_LINE = 1 << 4;
	}
}

impl FindOptions {
	pub fn from_request(request: &SearchRequest) -> Self {
		let mut options = Self::empty();
		options.set(Self::BACKWARDS, request.direction == Direction::Backwards);
		options.set(Self::MULTIPLE_RESULTS, request.want_multiple_results);
		options.set(Self::ONE_RESULT_PER_RAW_LINE, request.limit_results_to_one_per_raw_line);
		options.set(Self::EMPTY_QUERY_MATCHES, request.empty_query_matches);
		options.set(Self::MULTI_LINE, request.span_lines);
		options
	}
}

/// A search described in screen terms, turned into a [`SearchRequest`] against the
/// current contents of a data source.
#[derive(Debug, Clone)]
pub struct SearchRequestBuilder {
	query: String,
	mode: FindMode,
	start_coord: GridCoord,
	offset: i32,
	options: FindOptions,
	force_main_screen: bool,
	start_position: Option<LinePosition>,
	abs_line_range: Option<Range<i64>>,
	max_queue_size: Option<usize>,
}

impl SearchRequestBuilder {
	pub fn new(query: impl Into<String>, mode: FindMode, start_coord: GridCoord, options: FindOptions) -> Self {
		Self {
			query: query.into(),
			mode,
			start_coord,
			offset: 0,
			options,
			force_main_screen: false,
			start_position: None,
			abs_line_range: None,
			max_queue_size: None,
		}
	}

	pub fn offset(mut self, offset: i32) -> Self {
		self.offset = offset;
		self
	}

	pub fn force_main_screen(mut self, force: bool) -> Self {
		self.force_main_screen = force;
		self
	}

	pub fn start_position(mut self, position: Option<LinePosition>) -> Self {
		self.start_position = position;
		self
	}

	pub fn abs_line_range(mut self, range: Option<Range<i64>>) -> Self {
		self.abs_line_range = range;
		self
	}

	pub fn max_queue_size(mut self, max: Option<usize>) -> Self {
		self.max_queue_size = max;
		self
	}

	pub fn realize(&self, data_source: &dyn SearchDataSource) -> SearchRequest {
		let snapshot = data_source.snapshot(self.force_main_screen);
		let overflow = data_source.total_scrollback_overflow();
		let y = self.constrained_line(overflow);

		let case_sensitivity = match self.mode {
			FindMode::CaseInsensitiveRegex | FindMode::CaseInsensitiveSubstring => CaseSensitivity::Insensitive,
			FindMode::CaseSensitiveRegex | FindMode::CaseSensitiveSubstring => CaseSensitivity::Sensitive,
			FindMode::SmartCase if self.query.chars().any(char::is_uppercase) => CaseSensitivity::Sensitive,
			FindMode::SmartCase => CaseSensitivity::Insensitive,
		};

		let candidate = AbsCoord::new(self.start_coord.x, overflow + y);
		let initial_start = if snapshot.position_for(self.start_coord, 0).is_some() {
			candidate
		} else if self.start_coord.y < 0 {
			AbsCoord::new(0, overflow)
		} else {
			match snapshot.coordinate(snapshot.penultimate_position()) {
				Some(c) => AbsCoord::new(c.x, c.y + overflow),
				None => candidate,
			}
		};

		let direction = if self.options.contains(FindOptions::BACKWARDS) {
			Direction::Backwards
		} else {
			Direction::Forwards
		};
		// A forward tail search must not begin before the first held position.
		let start_position = match self.start_position {
			Some(pos) if direction == Direction::Forwards && snapshot.first_position() > pos => Some(snapshot.first_position()),
			other => other,
		};

		SearchRequest {
			abs_line_range: self.abs_line_range.clone(),
			direction,
			regex: self.mode.is_regex(),
			query: self.query.clone(),
			case_sensitivity,
			want_multiple_results: self.options.contains(FindOptions::MULTIPLE_RESULTS),
			limit_results_to_one_per_raw_line: self.options.contains(FindOptions::ONE_RESULT_PER_RAW_LINE),
			empty_query_matches: self.options.contains(FindOptions::EMPTY_QUERY_MATCHES),
			span_lines: self.options.contains(FindOptions::MULTI_LINE),
			cumulative_overflow: overflow,
			force_main_screen: self.force_main_screen,
			initial_start,
			offset: self.offset,
			start_position,
			max_queue_size: self.max_queue_size,
		}
	}

	fn constrained_line(&self, overflow: i64) -> i64 {
		match &self.abs_line_range {
			Some(range) if !range.is_empty() => ((self.start_coord.y + overflow).clamp(range.start, range.end - 1) - overflow).max(0),
			_ => self.start_coord.y,
		}
	}
}
