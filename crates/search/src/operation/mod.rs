//! The incremental search cursor.
//!
//! A [`SearchOperation`] searches one block per [`SearchOperation::search_once`] call and
//! pushes each batch of matches onto its result queue. Scheduling the next slice is the
//! caller's job; [`SearchOperation::should_reschedule`] says whether one is wanted.
//!
//! All mutating methods must be called from a single thread at a time. Only the result
//! queue is shared with consumers.

use std::ops::Range;
use std::sync::Arc;

use crate::error::{Result, SearchError};
use crate::line_buffer::LineBuffer;
use crate::matcher::{Matcher, RawMatch};
use crate::position::{AbsCoordRange, LinePosition, SearchResult};
use crate::queue::ResultQueue;
use crate::request::{Direction, SearchRequest};

#[cfg(test)]
mod tests;

/// One batch of results and the ground it covered.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchEngineOutput {
	pub results: Vec<SearchResult>,
	/// Absolute rows known to be searched in this pass.
	pub line_range: Range<i64>,
	/// Cells covered by the slice. Invalid in the final output.
	pub coord_range: AbsCoordRange,
	/// 0..=1
	pub progress: f64,
	pub last_location_searched: Option<LinePosition>,
	pub finished: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
	/// Constructed, no slice run yet.
	Ready,
	Searching,
	Finished,
	/// Stopped before all results were found. Produces no output.
	Canceled,
}

impl OperationState {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Ready => "ready",
			Self::Searching => "searching",
			Self::Finished => "finished",
			Self::Canceled => "canceled",
		}
	}
}

/// Bounds of the current pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Positions {
	pub start: LinePosition,
	pub stop: LinePosition,
	pub wrapped: bool,
}

impl Positions {
	fn resolve(snapshot: &LineBuffer, request: &SearchRequest, wrapped: bool) -> Option<Self> {
		let start = if wrapped {
			request.wrapped_start_position(snapshot)
		} else {
			match request.start_position {
				Some(pos) => pos,
				None => request.start_position(snapshot)?,
			}
		};
		let stop = request.stop_position(snapshot, wrapped)?;
		Some(Self { start, stop, wrapped })
	}

	fn refresh_stop(&mut self, snapshot: &LineBuffer, request: &SearchRequest) {
		match request.stop_position(snapshot, self.wrapped) {
			Some(stop) => self.stop = stop,
			None => tracing::debug!(stop = %self.stop, "search.stop_unresolved"),
		}
	}
}

enum SliceStatus {
	Matched(Vec<RawMatch>),
	NotFound,
	Searching,
}

pub struct SearchOperation {
	snapshot: LineBuffer,
	request: SearchRequest,
	matcher: Matcher,
	cursor: LinePosition,
	positions: Positions,
	results: Arc<ResultQueue<SearchEngineOutput>>,
	state: OperationState,
	pause_count: usize,
	oversize: bool,
	last_location_searched: Option<LinePosition>,
}

impl SearchOperation {
	pub fn new(snapshot: LineBuffer, request: SearchRequest) -> Result<Self> {
		let positions = Positions::resolve(&snapshot, &request, false).ok_or(SearchError::Unresolvable)?;
		let matcher = Matcher::new(&request)?;
		tracing::debug!(
			query = %request.query,
			direction = ?request.direction,
			start = %positions.start,
			stop = %positions.stop,
			"search.begin"
		);
		Ok(Self {
			cursor: positions.start,
			snapshot,
			request,
			matcher,
			positions,
			results: Arc::new(ResultQueue::new()),
			state: OperationState::Ready,
			pause_count: 0,
			oversize: false,
			last_location_searched: None,
		})
	}

	pub fn request(&self) -> &SearchRequest {
		&self.request
	}

	pub fn positions(&self) -> Positions {
		self.positions
	}

	pub fn state(&self) -> OperationState {
		self.state
	}

	pub fn is_paused(&self) -> bool {
		self.pause_count > 0
	}

	pub fn is_oversize(&self) -> bool {
		self.oversize
	}

	/// Shared handle to the result queue; consumers never need the operation itself.
	pub fn results(&self) -> Arc<ResultQueue<SearchEngineOutput>> {
		Arc::clone(&self.results)
	}

	pub fn has_pending_results(&self) -> bool {
		!self.results.is_empty()
	}

	pub fn try_consume(&self) -> Option<SearchEngineOutput> {
		self.results.try_consume()
	}

	pub fn blocking_consume(&self) -> SearchEngineOutput {
		self.results.blocking_consume()
	}

	pub fn peek(&self) -> Option<SearchEngineOutput> {
		self.results.peek()
	}

	/// Runs one slice unless paused.
	pub fn search(&mut self) {
		if self.is_paused() {
			tracing::trace!("search.paused");
			return;
		}
		self.search_once();
	}

	/// Whether the caller should schedule another slice. Marks the operation oversize
	/// when the result queue has grown past its bound.
	pub fn should_reschedule(&mut self) -> bool {
		if self.state != OperationState::Searching || self.is_paused() {
			return false;
		}
		if self.queue_too_big() {
			tracing::trace!(queued = self.results.len(), "search.oversize");
			self.oversize = true;
			return false;
		}
		true
	}

	fn queue_too_big(&self) -> bool {
		self.request.max_queue_size.is_some_and(|max| self.results.len() > max)
	}

	pub fn search_once(&mut self) {
		match self.state {
			OperationState::Ready => self.state = OperationState::Searching,
			OperationState::Searching => {}
			OperationState::Finished | OperationState::Canceled => return,
		}

		self.positions.refresh_stop(&self.snapshot, &self.request);
		let before = self.snapshot.abs_coord(self.cursor);
		let status = self.search_slice();
		let coord_range = AbsCoordRange {
			start: before,
			end: self.snapshot.abs_coord(self.cursor),
		};

		match status {
			SliceStatus::Matched(matches) => {
				self.last_location_searched = Some(self.cursor);
				self.handle_matches(matches, coord_range);
			}
			SliceStatus::NotFound => {
				if self.positions.wrapped {
					self.finish();
				} else {
					self.wrap();
				}
			}
			SliceStatus::Searching => {
				self.last_location_searched = Some(self.cursor);
			}
		}
	}

	fn search_slice(&mut self) -> SliceStatus {
		let buffer = &self.snapshot;
		let stop = self.positions.stop;
		match self.request.direction {
			Direction::Forwards => {
				if self.cursor >= stop || self.cursor.line >= buffer.end_line() {
					return SliceStatus::NotFound;
				}
				let probe = self.cursor.line.max(buffer.first_line());
				let Some((block, (_, end))) = buffer.block_index(probe).and_then(|b| Some((b, buffer.block_bounds(b)?))) else {
					return SliceStatus::NotFound;
				};
				let region = self.cursor..stop.min(LinePosition::new(end, 0));
				let found = self.matcher.find(buffer, block, region);
				tracing::trace!(block, found = found.len(), "search.slice");
				self.cursor = LinePosition::new(end, 0);
				if found.is_empty() { SliceStatus::Searching } else { SliceStatus::Matched(found) }
			}
			Direction::Backwards => {
				if self.cursor <= stop || self.cursor <= buffer.first_position() {
					return SliceStatus::NotFound;
				}
				let probe = if self.cursor.col > 0 { self.cursor.line } else { self.cursor.line - 1 };
				let probe = probe.min(buffer.end_line() - 1);
				let Some((block, (first, end))) = buffer.block_index(probe).and_then(|b| Some((b, buffer.block_bounds(b)?))) else {
					return SliceStatus::NotFound;
				};
				let region = stop.max(LinePosition::new(first, 0))..self.cursor.min(LinePosition::new(end, 0));
				let found = self.matcher.find(buffer, block, region);
				tracing::trace!(block, found = found.len(), "search.slice");
				self.cursor = LinePosition::new(first, 0);
				if found.is_empty() { SliceStatus::Searching } else { SliceStatus::Matched(found) }
			}
		}
	}

	fn progress(&self) -> f64 {
		let first = self.snapshot.first_line();
		let total = (self.snapshot.end_line() - first).max(1) as f64;
		let done = match self.request.direction {
			Direction::Forwards => self.cursor.line - first,
			Direction::Backwards => self.snapshot.end_line() - self.cursor.line,
		};
		(done as f64 / total).clamp(0.0, 1.0)
	}

	fn line_range(&self) -> Range<i64> {
		let overflow = self.snapshot.cumulative_overflow();
		let row = overflow + self.snapshot.rows_before(self.cursor.line) as i64;
		match self.request.direction {
			Direction::Forwards => overflow..row,
			Direction::Backwards => row..overflow + self.snapshot.num_rows() as i64,
		}
	}

	fn handle_matches(&mut self, mut matches: Vec<RawMatch>, coord_range: AbsCoordRange) {
		if !self.request.want_multiple_results {
			matches.truncate(1);
			self.state = OperationState::Finished;
			tracing::debug!(state = self.state.as_str(), "search.single_result");
		}
		let results: Vec<SearchResult> = matches
			.iter()
			.map(|m| SearchResult::from_coords(self.snapshot.abs_coord(m.start), self.snapshot.abs_coord(m.end)))
			.collect();
		self.results.produce(SearchEngineOutput {
			results,
			line_range: self.line_range(),
			coord_range,
			progress: self.progress(),
			last_location_searched: self.last_location_searched,
			finished: self.state == OperationState::Finished,
		});
	}

	/// Emits the final output. Only a searching operation can finish.
	fn finish(&mut self) {
		if self.state != OperationState::Searching {
			tracing::trace!(state = self.state.as_str(), "search.finish_declined");
			return;
		}
		self.state = OperationState::Finished;
		tracing::debug!(query = %self.request.query, "search.finished");
		self.results.produce(SearchEngineOutput {
			results: Vec::new(),
			line_range: 0..0,
			coord_range: AbsCoordRange::INVALID,
			progress: 1.0,
			last_location_searched: self.last_location_searched,
			finished: true,
		});
	}

	fn wrap(&mut self) {
		debug_assert!(!self.positions.wrapped);
		let Some(updated) = Positions::resolve(&self.snapshot, &self.request, true) else {
			tracing::warn!("search.wrap_unresolved");
			self.finish();
			return;
		};
		tracing::debug!(start = %updated.start, stop = %updated.stop, "search.wrap");
		self.positions = updated;
		self.cursor = updated.start;
	}

	/// One-way and idempotent. No output is produced.
	pub fn cancel(&mut self) {
		if matches!(self.state, OperationState::Ready | OperationState::Searching) {
			self.state = OperationState::Canceled;
			tracing::debug!(query = %self.request.query, "search.canceled");
		}
	}

	/// Returns false when there is nothing to pause.
	pub fn pause(&mut self) -> bool {
		if self.state != OperationState::Searching {
			return false;
		}
		self.pause_count += 1;
		true
	}

	pub fn unpause(&mut self) {
		self.pause_count = self.pause_count.saturating_sub(1);
	}

	/// Clears the oversize flag once the queue has drained below its bound. Returns
	/// whether searching should resume.
	pub fn resume_if_oversize(&mut self) -> bool {
		let Some(max) = self.request.max_queue_size else {
			return false;
		};
		if self.oversize && self.results.len() < max {
			tracing::trace!("search.resume");
			self.oversize = false;
			return self.should_reschedule();
		}
		false
	}

	/// Swaps in a newer snapshot of the same buffer and continues from the cursor.
	///
	/// # Panics
	///
	/// Panics unless the operation is searching or finished.
	pub fn update_snapshot(&mut self, snapshot: LineBuffer) {
		match self.state {
			OperationState::Ready | OperationState::Canceled => {
				panic!("snapshot update on a {} search operation", self.state.as_str())
			}
			OperationState::Searching => {}
			OperationState::Finished => return,
		}
		let mark = self.snapshot.pop_count();
		self.snapshot = snapshot;
		self.shift_past_pops(mark);
		let Some(positions) = Positions::resolve(&self.snapshot, &self.request, self.positions.wrapped) else {
			tracing::debug!("search.update_unresolved");
			self.state = OperationState::Canceled;
			return;
		};
		self.positions = positions;

		let (passed_stop, before_start) = match self.request.direction {
			Direction::Forwards => (self.cursor >= positions.stop, self.cursor < positions.start),
			Direction::Backwards => (self.cursor <= positions.stop, self.cursor > positions.start),
		};
		if passed_stop {
			tracing::debug!(cursor = %self.cursor, stop = %positions.stop, "search.passed_stop");
			if positions.wrapped {
				self.finish();
			} else {
				self.wrap();
			}
		} else if before_start {
			tracing::debug!(cursor = %self.cursor, start = %positions.start, "search.skip_to_start");
			self.cursor = positions.start;
		}
	}

	/// A popped line below the cursor moves every later line down one id, including the
	/// ones already searched. A popped cursor line leaves the cursor at its start.
	fn shift_past_pops(&mut self, mark: u64) {
		let Some(popped) = self.snapshot.popped_since(mark) else {
			tracing::debug!(mark, "search.pop_log_exhausted");
			return;
		};
		let mut cursor = self.cursor;
		for line in popped {
			if line < cursor.line {
				cursor = LinePosition::new(cursor.line - 1, cursor.col);
			} else if line == cursor.line {
				cursor = LinePosition::new(line, 0);
			}
		}
		if cursor != self.cursor {
			tracing::debug!(from = %self.cursor, to = %cursor, "search.shift_past_pops");
			self.cursor = cursor;
		}
	}
}

impl std::fmt::Debug for SearchOperation {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SearchOperation")
			.field("request", &format_args!("{}", self.request))
			.field("state", &self.state)
			.field("cursor", &self.cursor)
			.field("positions", &self.positions)
			.field("paused", &self.is_paused())
			.finish_non_exhaustive()
	}
}
