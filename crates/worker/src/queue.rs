use std::sync::mpsc as std_mpsc;
use std::thread::ThreadId;

use tokio::sync::{mpsc, oneshot};

use crate::{TaskClass, spawn_named_thread};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Returned when a job is submitted to a queue whose thread has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("serial queue is closed")]
pub struct QueueClosed;

/// A dedicated thread that runs submitted jobs one at a time, in submission order.
///
/// Dropping the last handle closes the channel; the thread drains what is
/// already queued and exits.
pub struct SerialQueue {
	name: String,
	tx: mpsc::UnboundedSender<Job>,
	thread_id: ThreadId,
}

impl SerialQueue {
	/// Starts the queue thread.
	pub fn new(class: TaskClass, name: impl Into<String>) -> std::io::Result<Self> {
		let name = name.into();
		let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
		let thread_name = name.clone();
		let handle = spawn_named_thread(class, name.clone(), move || {
			while let Some(job) = rx.blocking_recv() {
				job();
			}
			tracing::trace!(queue = %thread_name, "serial_queue.stopped");
		})?;
		Ok(Self {
			thread_id: handle.thread().id(),
			name,
			tx,
		})
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Whether the calling thread is this queue's thread.
	pub fn is_current(&self) -> bool {
		std::thread::current().id() == self.thread_id
	}

	/// Enqueues `job` without waiting for it.
	pub fn dispatch<F>(&self, job: F) -> Result<(), QueueClosed>
	where
		F: FnOnce() + Send + 'static,
	{
		self.tx.send(Box::new(job)).map_err(|_| QueueClosed)
	}

	/// Runs `job` on the queue and blocks until it returns.
	///
	/// Called from the queue's own thread, the job runs inline.
	pub fn dispatch_sync<F, R>(&self, job: F) -> Result<R, QueueClosed>
	where
		F: FnOnce() -> R + Send + 'static,
		R: Send + 'static,
	{
		if self.is_current() {
			return Ok(job());
		}
		let (reply_tx, reply_rx) = std_mpsc::sync_channel(1);
		self.dispatch(move || {
			let _ = reply_tx.send(job());
		})?;
		reply_rx.recv().map_err(|_| QueueClosed)
	}

	/// Runs `job` on the queue and resolves with its result.
	pub async fn run<F, R>(&self, job: F) -> Result<R, QueueClosed>
	where
		F: FnOnce() -> R + Send + 'static,
		R: Send + 'static,
	{
		let (reply_tx, reply_rx) = oneshot::channel();
		self.dispatch(move || {
			let _ = reply_tx.send(job());
		})?;
		reply_rx.await.map_err(|_| QueueClosed)
	}
}

impl std::fmt::Debug for SerialQueue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SerialQueue").field("name", &self.name).finish_non_exhaustive()
	}
}
