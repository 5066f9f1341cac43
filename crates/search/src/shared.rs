use std::sync::Arc;

use parking_lot::Mutex;

use crate::facade::SearchDataSource;
use crate::line_buffer::LineBuffer;
use crate::sync::SyncDistributor;

/// A line buffer shared between a producer thread and searches.
///
/// Every mutation goes through [`SharedScrollback::mutate`], which pauses registered
/// searches for its duration.
#[derive(Debug)]
pub struct SharedScrollback {
	buffer: Mutex<LineBuffer>,
	distributor: Arc<SyncDistributor>,
}

impl SharedScrollback {
	pub fn new(buffer: LineBuffer) -> Arc<Self> {
		Arc::new(Self {
			buffer: Mutex::new(buffer),
			distributor: SyncDistributor::new(),
		})
	}

	pub fn distributor(&self) -> &Arc<SyncDistributor> {
		&self.distributor
	}

	/// Pauses searches, applies `f`, then unpauses. Unpausing rebases every search on
	/// the mutated buffer before it takes another step.
	pub fn mutate<R>(&self, f: impl FnOnce(&mut LineBuffer) -> R) -> R {
		let unpauser = self.distributor.pause();
		let out = f(&mut self.buffer.lock());
		unpauser.unpause();
		out
	}

	pub fn snapshot(&self) -> LineBuffer {
		self.buffer.lock().clone()
	}
}

impl SearchDataSource for SharedScrollback {
	fn snapshot(&self, _force_main_screen: bool) -> LineBuffer {
		SharedScrollback::snapshot(self)
	}

	fn total_scrollback_overflow(&self) -> i64 {
		self.buffer.lock().cumulative_overflow()
	}

	fn width(&self) -> usize {
		self.buffer.lock().width()
	}

	fn sync_distributor(&self) -> Option<Arc<SyncDistributor>> {
		Some(Arc::clone(&self.distributor))
	}
}
