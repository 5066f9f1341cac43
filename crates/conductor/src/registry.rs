//! Framed conductors indexed by the host they are connected to.

use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

use crate::chain::{ConductorChain, NodeId};
use crate::endpoint::ConductorHandle;
use crate::ssh::SshIdentity;

struct Entry {
	identity: SshIdentity,
	chain: Weak<Mutex<ConductorChain>>,
	node: NodeId,
}

impl Entry {
	fn is(&self, chain: &Weak<Mutex<ConductorChain>>, node: NodeId) -> bool {
		self.node == node && Weak::ptr_eq(&self.chain, chain)
	}
}

#[derive(Default)]
pub struct ConductorRegistry {
	entries: Mutex<Vec<Entry>>,
}

impl std::fmt::Debug for ConductorRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ConductorRegistry").field("entries", &self.entries.lock().len()).finish()
	}
}

impl ConductorRegistry {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// The process-wide registry.
	pub fn global() -> Arc<Self> {
		static GLOBAL: OnceLock<Arc<ConductorRegistry>> = OnceLock::new();
		Arc::clone(GLOBAL.get_or_init(ConductorRegistry::new))
	}

	pub(crate) fn add(&self, identity: SshIdentity, chain: Weak<Mutex<ConductorChain>>, node: NodeId) {
		let mut entries = self.entries.lock();
		if entries.iter().any(|e| e.is(&chain, node)) {
			return;
		}
		tracing::debug!(%identity, "conductor.registry.add");
		entries.push(Entry { identity, chain, node });
	}

	pub(crate) fn remove(&self, chain: &Weak<Mutex<ConductorChain>>, node: NodeId) {
		self.entries.lock().retain(|e| !e.is(chain, node));
	}

	/// Hosts with at least one live framed conductor, sorted and without duplicates.
	pub fn connected_hosts(&self) -> Vec<SshIdentity> {
		let mut entries = self.entries.lock();
		entries.retain(|e| e.chain.strong_count() > 0);
		let mut hosts: Vec<SshIdentity> = entries.iter().map(|e| e.identity.clone()).collect();
		hosts.sort();
		hosts.dedup();
		hosts
	}

	/// Handles for every live conductor connected as `identity`.
	pub fn lookup(&self, identity: &SshIdentity) -> Vec<ConductorHandle> {
		self.entries
			.lock()
			.iter()
			.filter(|e| &e.identity == identity)
			.filter_map(|e| e.chain.upgrade().map(|chain| ConductorHandle::new(chain, e.node)))
			.collect()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}
}
