use pretty_assertions::assert_eq;

use super::*;
use crate::position::AbsCoord;
use crate::request::CaseSensitivity;

fn numbered() -> LineBuffer {
	let mut buffer = LineBuffer::new(80);
	for i in 0..10 {
		buffer.append_line(format!("Test {i}"));
		buffer.seal();
	}
	buffer
}

fn mixed_case() -> LineBuffer {
	let mut buffer = LineBuffer::new(80);
	for i in 0..10 {
		if i == 5 || i == 6 {
			buffer.append_line(format!("test {i}"));
		} else {
			buffer.append_line(format!("Test {i}"));
		}
		buffer.seal();
	}
	buffer
}

fn request(direction: Direction, x: i32, y: i64) -> SearchRequest {
	SearchRequest::new("test", direction, AbsCoord::new(x, y))
}

fn rows(ys: impl IntoIterator<Item = i64>, end_x: i32) -> Vec<SearchResult> {
	ys.into_iter().map(|y| SearchResult::new(0, y, end_x, y)).collect()
}

fn run_to_end(op: &mut SearchOperation) {
	while matches!(op.state(), OperationState::Ready | OperationState::Searching) {
		op.search_once();
	}
}

fn drain(op: &SearchOperation) -> Vec<SearchResult> {
	let mut out = Vec::new();
	while let Some(output) = op.try_consume() {
		out.extend(output.results);
		if output.finished {
			break;
		}
	}
	out
}

fn search(buffer: LineBuffer, request: SearchRequest) -> Vec<SearchResult> {
	let mut op = SearchOperation::new(buffer, request).unwrap();
	run_to_end(&mut op);
	drain(&op)
}

// ── A. Direction and wrap ──

#[test]
fn forwards() {
	assert_eq!(search(numbered(), request(Direction::Forwards, 0, 0)), rows(0..10, 3));
}

#[test]
fn backwards() {
	assert_eq!(search(numbered(), request(Direction::Backwards, 5, 9)), rows((0..10).rev(), 3));
}

#[test]
fn forwards_from_cursor_wraps_once() {
	let expected = rows((5..10).chain(0..5), 3);
	assert_eq!(search(numbered(), request(Direction::Forwards, 0, 5)), expected);
}

#[test]
fn backwards_from_cursor_wraps_once() {
	let expected = rows([5, 4, 3, 2, 1, 0, 9, 8, 7, 6], 3);
	assert_eq!(search(numbered(), request(Direction::Backwards, 5, 5)), expected);
}

// ── B. Line range ──

#[test]
fn forwards_with_line_range() {
	let mut req = request(Direction::Forwards, 0, 5);
	req.abs_line_range = Some(3..8);
	assert_eq!(search(numbered(), req), rows([5, 6, 7, 3, 4], 3));
}

#[test]
fn backwards_with_line_range() {
	let mut req = request(Direction::Backwards, 5, 5);
	req.abs_line_range = Some(3..8);
	assert_eq!(search(numbered(), req), rows([5, 4, 3, 7, 6], 3));
}

#[test]
fn forwards_with_cursor_outside_line_range() {
	let mut req = request(Direction::Forwards, 0, 0);
	req.abs_line_range = Some(3..8);
	assert_eq!(search(numbered(), req), rows(3..8, 3));
}

// ── C. Matching modes ──

#[test]
fn regex_insensitive() {
	let mut req = request(Direction::Forwards, 0, 0);
	req.regex = true;
	req.query = "t[es][es]t".into();
	assert_eq!(search(numbered(), req), rows(0..10, 3));
}

#[test]
fn case_sensitive_substring() {
	let mut req = request(Direction::Forwards, 0, 0);
	req.case_sensitivity = CaseSensitivity::Sensitive;
	assert_eq!(search(mixed_case(), req), rows(5..7, 3));
}

#[test]
fn case_sensitive_regex() {
	let mut req = request(Direction::Forwards, 0, 0);
	req.regex = true;
	req.query = "[te][es][es]t".into();
	req.case_sensitivity = CaseSensitivity::Sensitive;
	assert_eq!(search(mixed_case(), req), rows(5..7, 3));
}

#[test]
fn single_result_stops_at_first_hit() {
	let mut req = request(Direction::Forwards, 0, 0);
	req.query = "t".into();
	req.want_multiple_results = false;
	let mut op = SearchOperation::new(numbered(), req).unwrap();
	op.search_once();
	assert_eq!(op.state(), OperationState::Finished);
	let output = op.try_consume().unwrap();
	assert!(output.finished);
	assert_eq!(output.results, vec![SearchResult::new(0, 0, 0, 0)]);
	assert!(op.try_consume().is_none());
}

#[test]
fn one_per_raw_line() {
	let mut req = request(Direction::Forwards, 0, 0);
	req.query = "t".into();
	req.limit_results_to_one_per_raw_line = true;
	assert_eq!(search(numbered(), req), rows(0..10, 0));
}

#[test]
fn empty_query_matches_whole_lines() {
	let mut req = request(Direction::Forwards, 0, 0);
	req.query.clear();
	req.limit_results_to_one_per_raw_line = true;
	req.empty_query_matches = true;
	assert_eq!(search(numbered(), req), rows(0..10, 5));
}

#[test]
fn span_lines_within_a_block() {
	let mut buffer = LineBuffer::new(80);
	for i in 0..10 {
		buffer.append_line(format!("Test {i}"));
	}
	let mut req = request(Direction::Forwards, 0, 0);
	req.query = "test 2\ntest 3".into();
	req.span_lines = true;
	assert_eq!(search(buffer, req), vec![SearchResult::new(0, 2, 5, 3)]);
}

#[test]
fn wrapped_rows_use_absolute_coordinates() {
	let mut buffer = LineBuffer::new(4);
	buffer.append_line("xxxxxxtest");
	let results = search(buffer, request(Direction::Forwards, 0, 0));
	assert_eq!(results, vec![SearchResult::new(2, 1, 1, 2)]);
}

// ── D. Snapshot updates ──

#[test]
fn update_snapshot_after_front_eviction() {
	let mut buffer = numbered();
	buffer.set_max_rows(Some(10));
	let mut op = SearchOperation::new(buffer.clone(), request(Direction::Backwards, 5, 9)).unwrap();
	op.search_once();
	assert_eq!(op.blocking_consume().results, rows([9], 3));

	assert!(op.pause());
	for _ in 0..5 {
		buffer.append_line("no match here");
	}
	op.update_snapshot(buffer.clone());
	op.unpause();

	run_to_end(&mut op);
	assert_eq!(drain(&op), rows([8, 7, 6, 5], 3));
}

/// Scrollback plus a one-row grid. Snapshots append the grid row as the last line.
struct Screen {
	scrollback: LineBuffer,
	grid: String,
}

impl Screen {
	fn numbered(max_rows: usize) -> Self {
		let mut scrollback = LineBuffer::new(80);
		scrollback.set_max_rows(Some(max_rows));
		for i in 0..9 {
			scrollback.append_line(format!("Test {i}"));
			scrollback.seal();
		}
		Self {
			scrollback,
			grid: "Test 9".into(),
		}
	}

	fn snapshot(&self) -> LineBuffer {
		let mut snapshot = self.scrollback.clone();
		snapshot.append_line(self.grid.clone());
		snapshot.seal();
		snapshot
	}

	/// Scrolls the grid row into the scrollback and shows `text` in its place.
	fn append_ln(&mut self, text: &str) {
		let scrolled = std::mem::replace(&mut self.grid, text.to_string());
		self.scrollback.append_line(scrolled);
		self.scrollback.seal();
	}
}

#[test]
fn update_snapshot_after_popping_below_the_grid() {
	let mut screen = Screen::numbered(10);
	let mut op = SearchOperation::new(screen.snapshot(), request(Direction::Backwards, 5, 9)).unwrap();
	op.search_once();
	let mut results = op.blocking_consume().results;

	assert_eq!(screen.scrollback.pop_last_line().as_deref(), Some("Test 8"));
	assert!(op.pause());
	screen.append_ln("test a");
	screen.append_ln("test b");
	screen.append_ln("test c");
	op.update_snapshot(screen.snapshot());
	op.unpause();

	run_to_end(&mut op);
	results.extend(drain(&op));
	assert_eq!(results, rows([9, 7, 6, 5, 4, 3, 2, 11, 10], 3));
}

#[test]
fn popping_a_searched_line_keeps_unsearched_ones() {
	let mut buffer = numbered();
	buffer.set_max_rows(Some(10));
	let mut op = SearchOperation::new(buffer.clone(), request(Direction::Backwards, 5, 9)).unwrap();
	op.search_once();
	let mut results = op.blocking_consume().results;

	assert_eq!(buffer.pop_last_line().as_deref(), Some("Test 9"));
	assert!(op.pause());
	buffer.append_line("test a");
	buffer.append_line("test b");
	buffer.append_line("test c");
	op.update_snapshot(buffer.clone());
	op.unpause();

	run_to_end(&mut op);
	results.extend(drain(&op));
	assert_eq!(results, rows([9, 8, 7, 6, 5, 4, 3, 2, 11, 10], 3));
}

#[test]
fn forward_cursor_follows_a_popped_searched_line() {
	let mut screen = Screen::numbered(100);
	let mut op = SearchOperation::new(screen.snapshot(), request(Direction::Forwards, 0, 0)).unwrap();
	for _ in 0..9 {
		op.search_once();
	}
	assert_eq!(drain(&op), rows(0..9, 3));

	screen.scrollback.pop_last_line();
	op.update_snapshot(screen.snapshot());
	run_to_end(&mut op);
	assert_eq!(drain(&op), rows([8], 3));
}

#[test]
fn forward_search_sees_appended_lines() {
	let mut buffer = numbered();
	let mut op = SearchOperation::new(buffer.clone(), request(Direction::Forwards, 0, 0)).unwrap();
	for _ in 0..3 {
		op.search_once();
	}
	buffer.append_line("Test 10");
	op.update_snapshot(buffer.clone());
	run_to_end(&mut op);
	assert_eq!(drain(&op), rows(0..11, 3));
}

#[test]
fn cursor_in_evicted_lines_skips_to_new_start() {
	let mut buffer = numbered();
	buffer.set_max_rows(Some(10));
	let mut op = SearchOperation::new(buffer.clone(), request(Direction::Forwards, 0, 0)).unwrap();
	op.search_once();
	assert_eq!(op.blocking_consume().results, rows([0], 3));
	for i in 10..13 {
		buffer.append_line(format!("Test {i}"));
		buffer.seal();
	}
	op.update_snapshot(buffer.clone());
	run_to_end(&mut op);
	assert_eq!(drain(&op), rows(3..13, 3));
}

#[test]
fn update_after_finish_is_a_no_op() {
	let buffer = numbered();
	let mut op = SearchOperation::new(buffer.clone(), request(Direction::Forwards, 0, 0)).unwrap();
	run_to_end(&mut op);
	op.update_snapshot(buffer);
	assert_eq!(op.state(), OperationState::Finished);
}

#[test]
#[should_panic(expected = "snapshot update on a ready search operation")]
fn update_before_first_slice_panics() {
	let buffer = numbered();
	let mut op = SearchOperation::new(buffer.clone(), request(Direction::Forwards, 0, 0)).unwrap();
	op.update_snapshot(buffer);
}

// ── E. Flow control ──

#[test]
fn cancel_is_idempotent_and_silent() {
	let mut op = SearchOperation::new(numbered(), request(Direction::Forwards, 0, 0)).unwrap();
	op.search_once();
	let _ = op.try_consume();
	op.cancel();
	op.cancel();
	op.search_once();
	assert_eq!(op.state(), OperationState::Canceled);
	assert!(op.try_consume().is_none());
	assert!(!op.pause());
}

#[test]
fn oversize_stalls_until_resumed() {
	let mut req = request(Direction::Forwards, 0, 0);
	req.max_queue_size = Some(1);
	let mut op = SearchOperation::new(numbered(), req).unwrap();
	op.search();
	while op.should_reschedule() {
		op.search();
	}
	assert!(op.is_oversize());
	assert_eq!(op.results().len(), 2);
	assert!(!op.resume_if_oversize());

	assert_eq!(drain_n(&op, 2), rows([0, 1], 3));
	assert!(op.resume_if_oversize());
	assert!(!op.is_oversize());
}

fn drain_n(op: &SearchOperation, n: usize) -> Vec<SearchResult> {
	(0..n).filter_map(|_| op.try_consume()).flat_map(|o| o.results).collect()
}

#[test]
fn paused_operation_does_not_search() {
	let mut op = SearchOperation::new(numbered(), request(Direction::Forwards, 0, 0)).unwrap();
	op.search();
	let _ = op.try_consume();
	assert!(op.pause());
	op.search();
	assert!(!op.should_reschedule());
	assert!(op.try_consume().is_none());
	op.unpause();
	assert!(op.should_reschedule());
}

#[test]
fn invalid_pattern_fails_construction() {
	let mut req = request(Direction::Forwards, 0, 0);
	req.regex = true;
	req.query = "[".into();
	assert!(matches!(SearchOperation::new(numbered(), req), Err(SearchError::InvalidPattern(_))));
}
