use std::sync::atomic::{AtomicUsize, Ordering};

use pretty_assertions::assert_eq;

use super::*;
use crate::position::AbsCoord;
use crate::request::CaseSensitivity;
use crate::shared::SharedScrollback;

fn numbered() -> LineBuffer {
	let mut buffer = LineBuffer::new(80);
	for i in 0..10 {
		buffer.append_line(format!("Test {i}"));
		buffer.seal();
	}
	buffer
}

fn queue(name: &str) -> Arc<SerialQueue> {
	Arc::new(SerialQueue::new(tether_worker::TaskClass::Search, name).unwrap())
}

fn attached(name: &str, scrollback: &Arc<SharedScrollback>) -> Arc<TerminalSearchEngine> {
	let source: Arc<dyn SearchDataSource> = scrollback.clone();
	TerminalSearchEngine::new(queue(name), &SearchConfig::default(), Some(&source), None)
}

fn backwards_from(x: i32, y: i64) -> SearchRequestBuilder {
	SearchRequestBuilder::new("test", FindMode::CaseInsensitiveSubstring, GridCoord::new(x, y), FindOptions::BACKWARDS | FindOptions::MULTIPLE_RESULTS)
}

/// Blocks until the search finishes, one result at a time.
fn collect(engine: &TerminalSearchEngine) -> Vec<i64> {
	let mut ys = Vec::new();
	loop {
		let output = engine.consume(true).unwrap();
		ys.extend(output.results.iter().map(|r| r.start_y));
		if output.finished {
			return ys;
		}
	}
}

#[derive(Default)]
struct CountingDelegate {
	calls: AtomicUsize,
}

impl SearchEngineDelegate for CountingDelegate {
	fn search_engine_will_pause(&self, _engine: &TerminalSearchEngine) {
		self.calls.fetch_add(1, Ordering::SeqCst);
	}
}

// ── A. Searching a data source ──

#[test]
fn search_reports_start_and_buffer_end() {
	let scrollback = SharedScrollback::new(numbered());
	let engine = attached("facade-start", &scrollback);
	engine.search(&backwards_from(5, 9));
	assert_eq!(engine.last_start_position(), Some(LinePosition::new(9, 5)));
	assert_eq!(engine.last_end_of_buffer_position(), Some(LinePosition::new(10, 0)));
	assert_eq!(engine.query().as_deref(), Some("test"));
	assert_eq!(engine.mode(), FindMode::CaseInsensitiveSubstring);
	assert!(engine.options().contains(FindOptions::BACKWARDS));
	assert_eq!(collect(&engine), (0..10).rev().collect::<Vec<_>>());
	assert_eq!(engine.progress(), 1.0);
}

#[test]
fn search_without_data_source_does_nothing() {
	let engine = TerminalSearchEngine::new(queue("facade-none"), &SearchConfig::default(), None, None);
	engine.search(&backwards_from(0, 0));
	assert!(!engine.has_request());
	assert!(engine.consume(false).is_none());
	let mut results = Vec::new();
	assert_eq!(engine.continue_find_all_results(&mut results), None);
}

#[test]
fn set_find_runs_a_forward_search() {
	let scrollback = SharedScrollback::new(numbered());
	let engine = attached("facade-set-find", &scrollback);
	engine.set_find("test", true, FindMode::SmartCase, 0, 0, 0, true, None, false, None);
	assert_eq!(engine.options() & FindOptions::BACKWARDS, FindOptions::empty());
	assert_eq!(collect(&engine), (0..10).collect::<Vec<_>>());
}

#[test]
fn find_all_accumulates_until_finished() {
	let scrollback = SharedScrollback::new(numbered());
	let engine = attached("facade-find-all", &scrollback);
	engine.set_find("test", true, FindMode::SmartCase, 0, 0, 0, true, None, false, None);
	let mut results = Vec::new();
	while let Some(step) = engine.continue_find_all_results(&mut results) {
		if !step.more {
			break;
		}
		std::thread::yield_now();
	}
	let ys: Vec<i64> = results.iter().map(|r| r.start_y).collect();
	assert_eq!(ys, (0..10).collect::<Vec<_>>());
}

#[test]
fn cancel_drops_the_search() {
	let scrollback = SharedScrollback::new(numbered());
	let engine = attached("facade-cancel", &scrollback);
	engine.search(&backwards_from(5, 9));
	engine.cancel();
	assert!(!engine.has_request());
	assert!(engine.consume(false).is_none());
}

#[test]
fn grouped_output_keeps_results_of_the_finishing_output() {
	let first = SearchEngineOutput {
		results: vec![SearchResult::new(0, 9, 3, 9)],
		line_range: 9..10,
		coord_range: AbsCoordRange::INVALID,
		progress: 0.1,
		last_location_searched: None,
		finished: false,
	};
	let last = SearchEngineOutput {
		results: vec![SearchResult::new(0, 8, 3, 8)],
		finished: true,
		..first.clone()
	};
	let mut grouped = GroupedSearchEngineOutput::from(first);
	grouped.combine(last);
	assert!(grouped.finished);
	assert_eq!(grouped.results.len(), 2);
}

// ── B. Automatic synchronization ──

#[test]
fn mutation_pauses_and_rebases_the_search() {
	let mut buffer = numbered();
	buffer.set_max_rows(Some(10));
	let scrollback = SharedScrollback::new(buffer);
	let engine = attached("facade-rebase", &scrollback);
	engine.set_max_consume_count(1);
	let delegate = Arc::new(CountingDelegate::default());
	let as_delegate: Arc<dyn SearchEngineDelegate> = delegate.clone();
	engine.set_delegate(&as_delegate);

	engine.search(&backwards_from(5, 9).max_queue_size(Some(1)));
	scrollback.mutate(|buffer| {
		for _ in 0..5 {
			buffer.append_line("no match here");
		}
	});

	assert_eq!(delegate.calls.load(Ordering::SeqCst), 1);
	assert_eq!(engine.last_end_of_buffer_position(), Some(LinePosition::new(15, 0)));
	assert_eq!(collect(&engine), vec![9, 8, 7, 6, 5]);
}

#[test]
fn pause_drains_through_the_pump() {
	let mut buffer = numbered();
	buffer.set_max_rows(Some(10));
	let scrollback = SharedScrollback::new(buffer);
	let engine = attached("facade-pump", &scrollback);
	engine.set_max_consume_count(1);

	let pumped = Arc::new(Mutex::new(Vec::new()));
	let pump: Pump = {
		let weak = Arc::downgrade(&engine);
		let pumped = Arc::clone(&pumped);
		Arc::new(move || {
			if let Some(engine) = weak.upgrade()
				&& let Some(output) = engine.consume(false)
			{
				pumped.lock().extend(output.results.iter().map(|r| r.start_y));
			}
		})
	};
	engine.set_pump(Some(pump));

	engine.search(&backwards_from(5, 9).max_queue_size(Some(1)));
	scrollback.mutate(|buffer| {
		for _ in 0..5 {
			buffer.append_line("no match here");
		}
	});
	assert!(!pumped.lock().is_empty());
	engine.set_pump(None);

	let mut ys = pumped.lock().clone();
	ys.extend(collect(&engine));
	assert_eq!(ys, vec![9, 8, 7, 6, 5]);
}

#[test]
fn eviction_past_the_cursor_wraps_onto_new_lines() {
	let mut buffer = numbered();
	buffer.set_max_rows(Some(10));
	let scrollback = SharedScrollback::new(buffer);
	let engine = attached("facade-evict-cursor", &scrollback);
	engine.set_max_consume_count(1);

	engine.search(&backwards_from(5, 9).max_queue_size(Some(1)));
	let first = scrollback.mutate(|buffer| {
		for i in 10..20 {
			buffer.append_line(format!("retest {i}"));
			buffer.seal();
		}
		buffer.cumulative_overflow()
	});
	assert_eq!(first, 10);
	assert_eq!(engine.last_end_of_buffer_position(), Some(LinePosition::new(20, 0)));

	let ys = collect(&engine);
	assert_eq!(ys, [9, 8].into_iter().chain((10..20).rev()).collect::<Vec<_>>());
	assert!(ys[2..].iter().all(|&y| y >= first));
}

#[test]
fn popping_the_last_line_during_a_search() {
	let mut buffer = numbered();
	buffer.set_max_rows(Some(10));
	let scrollback = SharedScrollback::new(buffer);
	let engine = attached("facade-pop", &scrollback);
	engine.set_max_consume_count(1);

	engine.search(&backwards_from(5, 9).max_queue_size(Some(1)));
	let popped = scrollback.mutate(|buffer| {
		let popped = buffer.pop_last_line();
		buffer.append_line("test a");
		buffer.append_line("test b");
		buffer.append_line("test c");
		popped
	});
	assert_eq!(popped.as_deref(), Some("Test 9"));
	assert_eq!(collect(&engine), vec![9, 8, 7, 6, 5, 4, 3, 2, 11, 10]);
}

#[test]
fn repeated_eviction_never_reports_lines_gone_before_the_step() {
	let mut buffer = LineBuffer::new(80);
	for i in 0..200 {
		buffer.append_line(format!("Test {i}"));
		buffer.seal();
	}
	buffer.set_max_rows(Some(200));
	let scrollback = SharedScrollback::new(buffer);
	let engine = attached("facade-evict-live", &scrollback);
	engine.set_max_consume_count(1);
	engine.search(&backwards_from(5, 199).max_queue_size(Some(1)));

	// Outputs taken while paused were all produced after the previous rebase.
	let take_available = |ys: &mut Vec<i64>| {
		let mut finished = false;
		while let Some(output) = engine.consume(false) {
			ys.extend(output.results.iter().map(|r| r.start_y));
			finished |= output.finished;
		}
		finished
	};

	let mut all = Vec::new();
	let mut first = 0;
	let mut finished = false;
	for _ in 0..30 {
		let (ys, done, now_first) = scrollback.mutate(|buffer| {
			let mut ys = Vec::new();
			let done = take_available(&mut ys);
			for _ in 0..5 {
				buffer.append_line("no match here");
				buffer.seal();
			}
			(ys, done, buffer.cumulative_overflow())
		});
		assert!(ys.iter().all(|&y| y >= first), "{ys:?} below first line {first}");
		all.extend(ys);
		first = now_first;
		if done {
			finished = true;
			break;
		}
	}
	if !finished {
		let ys = collect(&engine);
		assert!(ys.iter().all(|&y| y >= first), "{ys:?} below first line {first}");
		all.extend(ys);
	}

	assert!(!all.is_empty());
	assert!(all.windows(2).all(|w| w[0] > w[1]), "{all:?}");
	assert!(all.iter().all(|&y| y < 200));
}

#[test]
fn opting_out_skips_registration() {
	let scrollback = SharedScrollback::new(numbered());
	let engine = TerminalSearchEngine::new(queue("facade-opt-out"), &SearchConfig::default(), None, None);
	engine.set_automatically_synchronize(false);
	let source: Arc<dyn SearchDataSource> = scrollback.clone();
	engine.set_data_source(&source);
	assert!(scrollback.distributor().is_empty());

	let other = attached("facade-opt-in", &scrollback);
	assert_eq!(scrollback.distributor().len(), 1);
	drop(other);
}

#[test]
fn manual_update_snapshot_without_synchronization() {
	let scrollback = SharedScrollback::new(numbered());
	let engine = TerminalSearchEngine::new(queue("facade-manual"), &SearchConfig::default(), None, None);
	engine.set_automatically_synchronize(false);
	let source: Arc<dyn SearchDataSource> = scrollback.clone();
	engine.set_data_source(&source);
	engine.set_max_consume_count(1);

	engine.search(&backwards_from(5, 9).max_queue_size(Some(1)));
	scrollback.mutate(|buffer| {
		buffer.append_line("retest a");
		buffer.seal();
		buffer.append_line("retest b");
		buffer.seal();
	});
	assert_eq!(engine.last_end_of_buffer_position(), Some(LinePosition::new(10, 0)));

	engine.update_snapshot();
	assert_eq!(engine.last_end_of_buffer_position(), Some(LinePosition::new(12, 0)));
	assert_eq!(collect(&engine), vec![9, 8, 7, 6, 5, 4, 3, 2, 1, 0, 11, 10]);
}

// ── C. Request realization ──

#[test]
fn smart_case_is_sensitive_with_uppercase() {
	let scrollback = SharedScrollback::new(numbered());
	let upper = SearchRequestBuilder::new("Test", FindMode::SmartCase, GridCoord::new(0, 0), FindOptions::MULTIPLE_RESULTS);
	let lower = SearchRequestBuilder::new("test", FindMode::SmartCase, GridCoord::new(0, 0), FindOptions::MULTIPLE_RESULTS);
	assert_eq!(upper.realize(&*scrollback).case_sensitivity, CaseSensitivity::Sensitive);
	assert_eq!(lower.realize(&*scrollback).case_sensitivity, CaseSensitivity::Insensitive);
}

#[test]
fn start_is_clamped_into_line_range() {
	let scrollback = SharedScrollback::new(numbered());
	let builder = SearchRequestBuilder::new("x", FindMode::SmartCase, GridCoord::new(0, 9), FindOptions::empty()).abs_line_range(Some(2..5));
	assert_eq!(builder.realize(&*scrollback).initial_start, AbsCoord::new(0, 4));
}

#[test]
fn start_outside_the_buffer_falls_back() {
	let scrollback = SharedScrollback::new(numbered());
	let above = SearchRequestBuilder::new("x", FindMode::SmartCase, GridCoord::new(3, -4), FindOptions::empty());
	assert_eq!(above.realize(&*scrollback).initial_start, AbsCoord::new(0, 0));
	let below = SearchRequestBuilder::new("x", FindMode::SmartCase, GridCoord::new(3, 40), FindOptions::empty());
	assert_eq!(below.realize(&*scrollback).initial_start, AbsCoord::new(5, 9));
}

#[test]
fn forward_tail_start_is_not_before_first_position() {
	let mut buffer = numbered();
	buffer.set_max_rows(Some(5));
	let scrollback = SharedScrollback::new(buffer);
	let builder =
		SearchRequestBuilder::new("x", FindMode::SmartCase, GridCoord::new(0, 0), FindOptions::empty()).start_position(Some(LinePosition::new(1, 0)));
	assert_eq!(builder.realize(&*scrollback).start_position, Some(LinePosition::new(5, 0)));
}
