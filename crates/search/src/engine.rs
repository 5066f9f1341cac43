//! Thread-safe driver for a [`SearchOperation`].
//!
//! The operation lives behind a mutex and is only advanced by jobs on a [`SerialQueue`].
//! Each job runs one slice and, if more work remains, enqueues the next job.

use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tether_worker::{SerialQueue, TaskClass};

use crate::line_buffer::LineBuffer;
use crate::operation::{OperationState, SearchEngineOutput, SearchOperation};
use crate::position::LinePosition;
use crate::queue::ResultQueue;
use crate::request::SearchRequest;
use crate::sync::Unpauser;

type SharedOperation = Arc<Mutex<SearchOperation>>;

/// The process-wide search queue, started on first use.
pub fn default_queue() -> std::io::Result<Arc<SerialQueue>> {
	static QUEUE: OnceLock<Arc<SerialQueue>> = OnceLock::new();
	if let Some(queue) = QUEUE.get() {
		return Ok(Arc::clone(queue));
	}
	let queue = Arc::new(SerialQueue::new(TaskClass::Search, "search")?);
	Ok(Arc::clone(QUEUE.get_or_init(|| queue)))
}

pub struct SearchEngine {
	queue: Arc<SerialQueue>,
	operation: Option<SharedOperation>,
	results: Option<Arc<ResultQueue<SearchEngineOutput>>>,
	request: Option<SearchRequest>,
	snapshot: Option<LineBuffer>,
}

impl SearchEngine {
	pub fn new(queue: Arc<SerialQueue>) -> Self {
		Self {
			queue,
			operation: None,
			results: None,
			request: None,
			snapshot: None,
		}
	}

	pub fn request(&self) -> Option<&SearchRequest> {
		self.request.as_ref()
	}

	pub fn snapshot(&self) -> Option<&LineBuffer> {
		self.snapshot.as_ref()
	}

	pub fn has_operation(&self) -> bool {
		self.operation.is_some()
	}

	pub fn has_pending_results(&self) -> bool {
		self.results.as_ref().is_some_and(|r| !r.is_empty())
	}

	/// Cancels any previous search and starts a new one. The first slice runs on the
	/// calling thread. Returns where the search began, or `None` if it could not start.
	pub fn begin_search(&mut self, snapshot: LineBuffer, request: SearchRequest) -> Option<LinePosition> {
		tracing::debug!(request = %request, "search.begin_search");
		self.cancel();
		let operation = match SearchOperation::new(snapshot.clone(), request.clone()) {
			Ok(operation) => operation,
			Err(error) => {
				tracing::debug!(%error, "search.begin_failed");
				return None;
			}
		};
		let start = operation.positions().start;
		self.results = Some(operation.results());
		self.request = Some(request);
		self.snapshot = Some(snapshot);
		let operation = Arc::new(Mutex::new(operation));
		self.operation = Some(Arc::clone(&operation));
		step(&operation, &self.queue);
		Some(start)
	}

	pub fn results(&self) -> Option<Arc<ResultQueue<SearchEngineOutput>>> {
		self.results.clone()
	}

	pub fn try_consume(&self) -> Option<SearchEngineOutput> {
		self.results.as_ref()?.try_consume()
	}

	/// Waits for the next output. `None` when no search has begun.
	pub fn blocking_consume(&self) -> Option<SearchEngineOutput> {
		Some(self.results.as_ref()?.blocking_consume())
	}

	pub fn peek(&self) -> Option<SearchEngineOutput> {
		self.results.as_ref()?.peek()
	}

	/// Rebases the operation on `snapshot`. Runs on the search queue, ahead of any slice
	/// enqueued later.
	pub fn update_snapshot(&mut self, snapshot: LineBuffer) {
		let Some(operation) = &self.operation else {
			return;
		};
		self.snapshot = Some(snapshot.clone());
		let operation = Arc::clone(operation);
		self.submit(move || rebase_operation(&mut operation.lock(), snapshot));
	}

	pub fn cancel(&self) {
		if let Some(operation) = &self.operation {
			let operation = Arc::clone(operation);
			self.submit(move || operation.lock().cancel());
		}
	}

	/// Stops scheduling slices until the returned unpauser runs.
	pub fn pause(&self) -> Option<Unpauser> {
		self.pause_with(|| None)
	}

	/// Like [`Self::pause`], but unpausing first rebases the operation on the snapshot
	/// `rebase` returns. The rebase and the resume run as one queue job, so no slice
	/// sees the old snapshot after the unpauser runs.
	pub fn pause_with(&self, rebase: impl FnOnce() -> Option<LineBuffer> + Send + 'static) -> Option<Unpauser> {
		let operation = Arc::clone(self.operation.as_ref()?);
		let paused = self.queue.dispatch_sync({
			let operation = Arc::clone(&operation);
			move || operation.lock().pause()
		});
		if !matches!(paused, Ok(true)) {
			return None;
		}
		let weak = Arc::downgrade(&operation);
		let queue = Arc::clone(&self.queue);
		Some(Unpauser::new(move || {
			let snapshot = rebase();
			let job_queue = Arc::clone(&queue);
			let submitted = queue.dispatch(move || {
				let Some(operation) = weak.upgrade() else {
					return;
				};
				let again = {
					let mut op = operation.lock();
					if let Some(snapshot) = snapshot {
						rebase_operation(&mut op, snapshot);
					}
					op.unpause();
					op.should_reschedule()
				};
				if again {
					schedule(&operation, &job_queue);
				}
			});
			if submitted.is_err() {
				tracing::warn!("search.queue_closed");
			}
		}))
	}

	/// Records `snapshot` as the one the running operation is about to be rebased on.
	pub(crate) fn note_snapshot(&mut self, snapshot: LineBuffer) {
		self.snapshot = Some(snapshot);
	}

	pub fn resume_if_oversize(&self) {
		let Some(operation) = &self.operation else {
			return;
		};
		let weak = Arc::downgrade(operation);
		let queue = Arc::clone(&self.queue);
		self.submit(move || {
			if let Some(operation) = weak.upgrade() {
				let resume = operation.lock().resume_if_oversize();
				if resume {
					schedule(&operation, &queue);
				}
			}
		});
	}

	fn submit(&self, job: impl FnOnce() + Send + 'static) {
		if self.queue.dispatch(job).is_err() {
			tracing::warn!("search.queue_closed");
		}
	}
}

/// A search canceled while paused is left alone.
fn rebase_operation(op: &mut SearchOperation, snapshot: LineBuffer) {
	if matches!(op.state(), OperationState::Searching | OperationState::Finished) {
		op.update_snapshot(snapshot);
	}
}

fn step(operation: &SharedOperation, queue: &Arc<SerialQueue>) {
	let again = {
		let mut op = operation.lock();
		if op.is_paused() {
			return;
		}
		op.search();
		op.should_reschedule()
	};
	if again {
		schedule(operation, queue);
	}
}

fn schedule(operation: &SharedOperation, queue: &Arc<SerialQueue>) {
	let weak: Weak<Mutex<SearchOperation>> = Arc::downgrade(operation);
	let job_queue = Arc::clone(queue);
	let submitted = queue.dispatch(move || {
		if let Some(operation) = weak.upgrade() {
			step(&operation, &job_queue);
		}
	});
	if submitted.is_err() {
		tracing::warn!("search.queue_closed");
	}
}

impl std::fmt::Debug for SearchEngine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SearchEngine")
			.field("queue", &self.queue.name())
			.field("request", &self.request.as_ref().map(|r| r.to_string()))
			.finish_non_exhaustive()
	}
}
