//! Pause coordination between buffer mutation and in-flight searches.
//!
//! Searches never run against a buffer that is being mutated. Before mutating, the owner
//! calls [`SyncDistributor::pause`]; every registered [`Pausable`] stops scheduling work
//! and hands back an [`Unpauser`]. After the mutation, unpausing rebases each search on
//! the new snapshot before its next step runs.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slab::Slab;

/// Resumes something that was paused. Runs on [`Unpauser::unpause`] or on drop, once.
#[must_use = "dropping an Unpauser resumes immediately"]
pub struct Unpauser(Option<Box<dyn FnOnce() + Send>>);

impl Unpauser {
	pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
		Self(Some(Box::new(f)))
	}

	pub fn unpause(mut self) {
		self.run();
	}

	fn run(&mut self) {
		if let Some(f) = self.0.take() {
			f();
		}
	}
}

impl Drop for Unpauser {
	fn drop(&mut self) {
		self.run();
	}
}

impl std::fmt::Debug for Unpauser {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_tuple("Unpauser").field(&self.0.is_some()).finish()
	}
}

pub trait Pausable: Send + Sync {
	/// Stops scheduling work. `None` when there is nothing to pause.
	fn pause(&self) -> Option<Unpauser>;
}

struct Member {
	target: Weak<dyn Pausable>,
	tokens: usize,
}

/// Registry of pausables. Membership lasts as long as the [`SyncRegistration`] token.
#[derive(Default)]
pub struct SyncDistributor {
	members: Mutex<Slab<Member>>,
}

impl SyncDistributor {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Adds `target`. Registering the same object twice shares one membership.
	pub fn register(self: &Arc<Self>, target: Weak<dyn Pausable>) -> SyncRegistration {
		let mut members = self.members.lock();
		let existing = members
			.iter()
			.find(|(_, m)| std::ptr::addr_eq(m.target.as_ptr(), target.as_ptr()))
			.map(|(key, _)| key);
		let key = match existing {
			Some(key) => {
				members[key].tokens += 1;
				key
			}
			None => members.insert(Member { target, tokens: 1 }),
		};
		tracing::trace!(key, "sync.register");
		SyncRegistration {
			distributor: Arc::downgrade(self),
			key,
		}
	}

	pub fn len(&self) -> usize {
		self.members.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Pauses every live member. Members are called without the registry lock held.
	pub fn pause(&self) -> Unpauser {
		let live: Vec<Arc<dyn Pausable>> = self.members.lock().iter().filter_map(|(_, m)| m.target.upgrade()).collect();
		let unpausers: Vec<Unpauser> = live.iter().filter_map(|p| p.pause()).collect();
		tracing::trace!(members = live.len(), paused = unpausers.len(), "sync.pause");
		Unpauser::new(move || {
			for unpauser in unpausers {
				unpauser.unpause();
			}
		})
	}

	fn release(&self, key: usize) {
		let mut members = self.members.lock();
		let Some(member) = members.get_mut(key) else {
			return;
		};
		member.tokens -= 1;
		if member.tokens == 0 {
			members.remove(key);
			tracing::trace!(key, "sync.unregister");
		}
	}
}

impl std::fmt::Debug for SyncDistributor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SyncDistributor").field("members", &self.len()).finish()
	}
}

/// Keeps a pausable registered. Dropping it unregisters.
#[derive(Debug)]
pub struct SyncRegistration {
	distributor: Weak<SyncDistributor>,
	key: usize,
}

impl Drop for SyncRegistration {
	fn drop(&mut self) {
		if let Some(distributor) = self.distributor.upgrade() {
			distributor.release(self.key);
		}
	}
}
