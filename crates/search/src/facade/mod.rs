//! Client-facing search engine for a terminal session.
//!
//! Wraps [`SearchEngine`] with automatic pause coordination: the engine registers itself
//! with its data source's [`SyncDistributor`] so buffer mutations pause it, drain its
//! pending output through the client's pump, and rebase it on the new snapshot.

mod builder;
#[cfg(test)]
mod tests;

use std::ops::Range;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tether_worker::SerialQueue;

pub use self::builder::{FindMode, FindOptions, SearchRequestBuilder};
use crate::config::SearchConfig;
use crate::engine::SearchEngine;
use crate::line_buffer::LineBuffer;
use crate::operation::SearchEngineOutput;
use crate::position::{AbsCoordRange, GridCoord, LinePosition, SearchResult};
use crate::request::SearchRequest;
use crate::sync::{Pausable, SyncDistributor, SyncRegistration, Unpauser};

/// Supplies content to search.
pub trait SearchDataSource: Send + Sync {
	fn snapshot(&self, force_main_screen: bool) -> LineBuffer;
	fn total_scrollback_overflow(&self) -> i64;
	fn width(&self) -> usize;
	/// Return `None` to opt out of automatic synchronization.
	fn sync_distributor(&self) -> Option<Arc<SyncDistributor>>;
}

pub trait SearchEngineDelegate: Send + Sync {
	/// Called when a buffer mutation pauses the engine. Clients without a pump should
	/// drain pending results here.
	fn search_engine_will_pause(&self, engine: &TerminalSearchEngine);
}

/// Several outputs merged into one.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedSearchEngineOutput {
	pub results: Vec<SearchResult>,
	pub line_range: Range<i64>,
	pub coord_range: AbsCoordRange,
	pub finished: bool,
	pub last_location_searched: Option<LinePosition>,
}

impl From<SearchEngineOutput> for GroupedSearchEngineOutput {
	fn from(output: SearchEngineOutput) -> Self {
		Self {
			results: output.results,
			line_range: output.line_range,
			coord_range: output.coord_range,
			finished: output.finished,
			last_location_searched: output.last_location_searched,
		}
	}
}

impl GroupedSearchEngineOutput {
	/// Appends `other`. A finished output only contributes its results and the flag.
	pub fn combine(&mut self, other: SearchEngineOutput) {
		self.results.extend(other.results);
		if other.finished {
			self.finished = true;
			return;
		}
		self.line_range = other.line_range;
		self.coord_range.end = other.coord_range.end;
		self.last_location_searched = other.last_location_searched;
	}
}

/// One step of an incremental find-all.
#[derive(Debug, Clone, PartialEq)]
pub struct FindAllStep {
	pub more: bool,
	pub line_range: Range<i64>,
	pub range_searched: AbsCoordRange,
}

type Pump = Arc<dyn Fn() + Send + Sync>;

struct State {
	engine: Option<SearchEngine>,
	data_source: Option<Weak<dyn SearchDataSource>>,
	delegate: Option<Weak<dyn SearchEngineDelegate>>,
	pump: Option<Pump>,
	registrations: Vec<SyncRegistration>,
	automatically_synchronize: bool,
	max_consume_count: usize,
	progress: f64,
	last_location_searched: Option<LinePosition>,
	last_start_position: Option<LinePosition>,
	last_end_of_buffer_position: Option<LinePosition>,
}

pub struct TerminalSearchEngine {
	this: Weak<TerminalSearchEngine>,
	queue: Arc<SerialQueue>,
	state: Mutex<State>,
}

impl TerminalSearchEngine {
	pub fn new(
		queue: Arc<SerialQueue>,
		config: &SearchConfig,
		data_source: Option<&Arc<dyn SearchDataSource>>,
		sync_distributor: Option<&Arc<SyncDistributor>>,
	) -> Arc<Self> {
		let engine = Arc::new_cyclic(|this| Self {
			this: this.clone(),
			queue,
			state: Mutex::new(State {
				engine: None,
				data_source: None,
				delegate: None,
				pump: None,
				registrations: Vec::new(),
				automatically_synchronize: true,
				max_consume_count: config.max_consume_count,
				progress: 0.0,
				last_location_searched: None,
				last_start_position: None,
				last_end_of_buffer_position: None,
			}),
		});
		if let Some(distributor) = sync_distributor {
			engine.register_with(distributor);
		}
		if let Some(data_source) = data_source {
			engine.set_data_source(data_source);
		}
		engine
	}

	fn register_with(&self, distributor: &Arc<SyncDistributor>) {
		let target: Weak<dyn Pausable> = self.this.clone();
		let registration = distributor.register(target);
		self.state.lock().registrations.push(registration);
	}

	/// Set to false before attaching a data source to skip registering with its distributor.
	pub fn set_automatically_synchronize(&self, enabled: bool) {
		self.state.lock().automatically_synchronize = enabled;
	}

	pub fn set_max_consume_count(&self, count: usize) {
		self.state.lock().max_consume_count = count.max(1);
	}

	pub fn set_data_source(&self, data_source: &Arc<dyn SearchDataSource>) {
		let auto = {
			let mut state = self.state.lock();
			state.data_source = Some(Arc::downgrade(data_source));
			state.automatically_synchronize
		};
		if auto && let Some(distributor) = data_source.sync_distributor() {
			self.register_with(&distributor);
		}
	}

	pub fn set_delegate(&self, delegate: &Arc<dyn SearchEngineDelegate>) {
		self.state.lock().delegate = Some(Arc::downgrade(delegate));
	}

	/// The client's periodic result handler. [`Self::drain`] calls it until the queue is empty,
	/// so it must consume.
	pub fn set_pump(&self, pump: Option<Pump>) {
		self.state.lock().pump = pump;
	}

	fn data_source(&self) -> Option<Arc<dyn SearchDataSource>> {
		self.state.lock().data_source.as_ref()?.upgrade()
	}

	fn request(&self) -> Option<SearchRequest> {
		self.state.lock().engine.as_ref()?.request().cloned()
	}

	pub fn query(&self) -> Option<String> {
		self.request().map(|r| r.query)
	}

	pub fn has_request(&self) -> bool {
		self.state.lock().engine.as_ref().is_some_and(SearchEngine::has_operation)
	}

	pub fn mode(&self) -> FindMode {
		self.request().map_or(FindMode::SmartCase, |r| FindMode::from_request(&r))
	}

	pub fn options(&self) -> FindOptions {
		self.request().map_or(FindOptions::empty(), |r| FindOptions::from_request(&r))
	}

	pub fn has_pending_results(&self) -> bool {
		self.state.lock().engine.as_ref().is_some_and(SearchEngine::has_pending_results)
	}

	pub fn progress(&self) -> f64 {
		self.state.lock().progress
	}

	pub fn last_location_searched(&self) -> Option<LinePosition> {
		self.state.lock().last_location_searched
	}

	/// Where the most recent search began. Clients use it to resume tail find.
	pub fn last_start_position(&self) -> Option<LinePosition> {
		self.state.lock().last_start_position
	}

	pub fn set_last_start_position(&self, position: Option<LinePosition>) {
		self.state.lock().last_start_position = position;
	}

	pub fn invalidate_last_start_position(&self) {
		self.set_last_start_position(None);
	}

	/// End of the buffer when a search last began or was rebased.
	pub fn last_end_of_buffer_position(&self) -> Option<LinePosition> {
		self.state.lock().last_end_of_buffer_position
	}

	/// Runs the pump until no results are pending.
	pub fn drain(&self) {
		loop {
			let pump = self.state.lock().pump.clone();
			let Some(pump) = pump else {
				return;
			};
			if !self.has_pending_results() {
				return;
			}
			tracing::trace!("search.drain_pump");
			pump();
		}
	}

	/// Cancels any search in progress and begins `request` on `snapshot`.
	pub fn search_request(&self, request: SearchRequest, snapshot: LineBuffer) -> Option<LinePosition> {
		self.cancel();
		let mut engine = SearchEngine::new(Arc::clone(&self.queue));
		let start = engine.begin_search(snapshot, request);
		self.state.lock().engine = Some(engine);
		start
	}

	pub fn search(&self, builder: &SearchRequestBuilder) {
		let Some(data_source) = self.data_source() else {
			return;
		};
		let request = builder.realize(&*data_source);
		let snapshot = data_source.snapshot(request.force_main_screen);
		let end = snapshot.last_position();
		let start = self.search_request(request, snapshot);
		let mut state = self.state.lock();
		state.last_end_of_buffer_position = Some(end);
		state.last_start_position = start;
	}

	/// Merges available outputs, up to `max_consume_count` results. With `block`, waits
	/// for each output. `None` when nothing was consumed.
	pub fn consume(&self, block: bool) -> Option<GroupedSearchEngineOutput> {
		let (results, max) = {
			let state = self.state.lock();
			(state.engine.as_ref()?.results()?, state.max_consume_count)
		};
		let mut combined: Option<GroupedSearchEngineOutput> = None;
		let mut progress = None;
		let mut last_location = None;
		while !combined.as_ref().is_some_and(|c| c.finished || c.results.len() >= max) {
			let output = if block {
				results.blocking_consume()
			} else {
				match results.try_consume() {
					Some(output) => output,
					None => break,
				}
			};
			progress = Some(output.progress);
			if output.finished {
				last_location = Some(output.last_location_searched);
			}
			match &mut combined {
				Some(grouped) => grouped.combine(output),
				None => combined = Some(output.into()),
			}
		}
		let combined = combined?;

		let state = &mut *self.state.lock();
		if let Some(progress) = progress {
			state.progress = progress;
		}
		if let Some(last) = last_location {
			state.last_location_searched = last;
		}
		if let Some(engine) = &state.engine {
			engine.resume_if_oversize();
		}
		Some(combined)
	}

	pub fn cancel(&self) {
		let engine = self.state.lock().engine.take();
		if let Some(engine) = engine {
			tracing::debug!("search.cancel");
			engine.cancel();
		}
	}

	/// Rebases the current search on a fresh snapshot. Pause and drain first; with a pump
	/// and automatic synchronization this happens on every buffer mutation.
	pub fn update_snapshot(&self) {
		let Some(data_source) = self.data_source() else {
			return;
		};
		let Some(request) = self.request() else {
			return;
		};
		let snapshot = data_source.snapshot(request.force_main_screen);
		let end = snapshot.last_position();
		let mut state = self.state.lock();
		if let Some(engine) = &mut state.engine {
			tracing::trace!("search.update_snapshot");
			engine.update_snapshot(snapshot);
			state.last_end_of_buffer_position = Some(end);
		}
	}

	/// Takes a fresh snapshot for the paused operation and records it as current.
	fn rebase_snapshot(&self) -> Option<LineBuffer> {
		let data_source = self.data_source()?;
		let request = self.request()?;
		let snapshot = data_source.snapshot(request.force_main_screen);
		let end = snapshot.last_position();
		let mut state = self.state.lock();
		state.engine.as_mut()?.note_snapshot(snapshot.clone());
		state.last_end_of_buffer_position = Some(end);
		tracing::trace!("search.rebase_snapshot");
		Some(snapshot)
	}

	/// Positional entry point kept for older callers.
	#[allow(clippy::too_many_arguments)]
	pub fn set_find(
		&self,
		query: &str,
		forward: bool,
		mode: FindMode,
		start_x: i32,
		start_y: i64,
		offset: i32,
		multiple_results: bool,
		abs_line_range: Option<Range<i64>>,
		force_main_screen: bool,
		start_position: Option<LinePosition>,
	) {
		if self.data_source().is_none() {
			let mut state = self.state.lock();
			state.last_start_position = None;
			state.last_end_of_buffer_position = None;
			return;
		}
		let mut options = FindOptions::empty();
		options.set(FindOptions::BACKWARDS, !forward);
		options.set(FindOptions::MULTIPLE_RESULTS, multiple_results);
		options.set(FindOptions::MULTI_LINE, query.contains('\n'));
		let builder = SearchRequestBuilder::new(query, mode, GridCoord::new(start_x, start_y), options)
			.offset(offset)
			.force_main_screen(force_main_screen)
			.start_position(start_position)
			.abs_line_range(abs_line_range.filter(|r| !r.is_empty()));
		self.search(&builder);
	}

	/// Appends whatever results are available. `None` when no search is active.
	pub fn continue_find_all_results(&self, results: &mut Vec<SearchResult>) -> Option<FindAllStep> {
		if self.data_source().is_none() || !self.has_request() {
			return None;
		}
		let Some(output) = self.consume(false) else {
			return Some(FindAllStep {
				more: true,
				line_range: 0..0,
				range_searched: AbsCoordRange::INVALID,
			});
		};
		results.extend(output.results);
		Some(FindAllStep {
			more: !output.finished,
			line_range: output.line_range,
			range_searched: output.coord_range,
		})
	}
}

impl Pausable for TerminalSearchEngine {
	fn pause(&self) -> Option<Unpauser> {
		let this = self.this.clone();
		let unpauser = self.state.lock().engine.as_ref()?.pause_with(move || this.upgrade()?.rebase_snapshot())?;
		let delegate = self.state.lock().delegate.as_ref().and_then(Weak::upgrade);
		if let Some(delegate) = delegate {
			delegate.search_engine_will_pause(self);
		}
		self.drain();
		Some(unpauser)
	}
}

impl std::fmt::Debug for TerminalSearchEngine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TerminalSearchEngine")
			.field("query", &self.query())
			.field("has_pending_results", &self.has_pending_results())
			.finish_non_exhaustive()
	}
}
