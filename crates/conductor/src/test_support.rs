use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::chain::{ChainOptions, ConductorChain, ConductorParams, NodeId, SharedChain};
use crate::config::ConductorConfig;
use crate::delegate::{ConductorDelegate, ConductorEvent};
use crate::registry::ConductorRegistry;

pub(crate) fn options() -> ChainOptions {
	ChainOptions::new(ConductorConfig::default()).with_registry(ConductorRegistry::new())
}

/// A chain whose events land in the returned receiver.
pub(crate) fn recording_chain(options: ChainOptions) -> (SharedChain, UnboundedReceiver<ConductorEvent>) {
	let (tx, rx) = mpsc::unbounded_channel();
	let delegate: Arc<dyn ConductorDelegate> = Arc::new(tx);
	(ConductorChain::new(options, Some(delegate)), rx)
}

pub(crate) fn params(sshargs: &str) -> ConductorParams {
	ConductorParams {
		sshargs: sshargs.into(),
		dcs_id: "dcs".into(),
		client_unique_id: "client".into(),
		..ConductorParams::default()
	}
}

/// Adds a root node that is already framing as `pid`.
pub(crate) fn framed_root(chain: &SharedChain, pid: i32) -> NodeId {
	let mut chain = chain.lock();
	let id = chain.add_conductor(params("user@example.com"), None).unwrap();
	chain.set_framed_pid(id, pid);
	id
}

pub(crate) fn drain(rx: &mut UnboundedReceiver<ConductorEvent>) -> Vec<ConductorEvent> {
	std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

/// The text of every `Write` event received so far.
pub(crate) fn writes(rx: &mut UnboundedReceiver<ConductorEvent>) -> Vec<String> {
	drain(rx)
		.into_iter()
		.filter_map(|event| match event {
			ConductorEvent::Write { text, .. } => Some(text),
			_ => None,
		})
		.collect()
}

/// Feeds the reply to the command `id` is executing: its output lines, then its end.
pub(crate) fn reply(chain: &SharedChain, id: NodeId, lines: &[&str], status: u8) {
	let mut chain = chain.lock();
	let depth = chain.depth(id);
	for line in lines {
		chain.handle_line(id, line, depth);
	}
	let kind = if chain.framing(id) { "f" } else { "r" };
	chain.handle_command_end(id, "id", kind, status, depth);
}
