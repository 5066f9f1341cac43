use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

/// FIFO shared between one producer and any number of consumers.
///
/// The only structure in the search stack that is touched from several threads without
/// going through the search queue.
#[derive(Debug)]
pub struct ResultQueue<T> {
	items: Mutex<VecDeque<T>>,
	available: Condvar,
}

impl<T> Default for ResultQueue<T> {
	fn default() -> Self {
		Self {
			items: Mutex::new(VecDeque::new()),
			available: Condvar::new(),
		}
	}
}

impl<T> ResultQueue<T> {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn produce(&self, item: T) {
		self.items.lock().push_back(item);
		self.available.notify_one();
	}

	pub fn try_consume(&self) -> Option<T> {
		self.items.lock().pop_front()
	}

	/// Waits until an item is available.
	pub fn blocking_consume(&self) -> T {
		let mut items = self.items.lock();
		loop {
			if let Some(item) = items.pop_front() {
				return item;
			}
			self.available.wait(&mut items);
		}
	}

	pub fn len(&self) -> usize {
		self.items.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.lock().is_empty()
	}
}

impl<T: Clone> ResultQueue<T> {
	pub fn peek(&self) -> Option<T> {
		self.items.lock().front().cloned()
	}
}
