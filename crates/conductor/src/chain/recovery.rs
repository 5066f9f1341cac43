//! Reattaching to framers that survived a restart of the local side.
//!
//! The framer answers `recover` with `:begin-recovery`, a `:recovery: key value` line
//! for every value saved before login, and `:end-recovery`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{ConductorChain, ConductorParams, Node, NodeId, State};
use crate::command::b64;
use crate::delegate::ConductorEvent;
use crate::error::SshArgsError;
use crate::ssh::ParsedSshArguments;

const RECOVERY_PREFIX: &str = ":recovery: ";

/// One framed hop: its framer's PID and the DCS ID of its session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nesting {
	pub pid: i32,
	#[serde(rename = "dcsID")]
	pub dcs_id: String,
}

/// Nests hops outermost first as `{pid: [dcsID, {child...}]}`.
pub fn nesting_tree(hops: &[Nesting]) -> Value {
	match hops.split_first() {
		Some((first, rest)) => json!({ first.pid.to_string(): [first.dcs_id, nesting_tree(rest)] }),
		None => Value::Object(Map::new()),
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RecoveryInfo {
	login: Option<i32>,
	dcs_id: Option<String>,
	sshargs: Option<String>,
	bool_args: Option<String>,
	client_unique_id: Option<String>,
}

impl RecoveryInfo {
	/// Records `value` under `key`. Unknown keys and malformed PIDs are ignored.
	fn set(&mut self, key: &str, value: &str) {
		match key {
			"login" => {
				if let Ok(pid) = value.parse() {
					self.login = Some(pid);
				}
			}
			"dcsID" => self.dcs_id = Some(value.to_string()),
			"sshargs" => self.sshargs = Some(value.to_string()),
			"boolArgs" => self.bool_args = Some(value.to_string()),
			"clientUniqueID" => self.client_unique_id = Some(value.to_string()),
			_ => {}
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RecoveryState {
	Ground,
	Building(RecoveryInfo),
}

/// A framer found during recovery, ready to be adopted with [`ConductorChain::adopt_recovery`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConductorRecovery {
	pub pid: i32,
	pub dcs_id: String,
	pub tree: Value,
	pub sshargs: String,
	pub bool_args: String,
	pub client_unique_id: String,
	pub parent: Option<NodeId>,
}

impl ConductorChain {
	/// Asks the framer to describe itself.
	pub fn start_recovery(&mut self, id: NodeId) {
		tracing::debug!(node = %id, "conductor.recovery.start");
		self.write(id, &format!("\n{}\n", b64(b"recover")));
		self.node_mut(id).state = State::Recovery(RecoveryState::Ground);
		self.emit(ConductorEvent::StateChanged { node: id });
	}

	pub fn recovery_did_finish(&mut self, id: NodeId) {
		if matches!(self.node(id).state, State::Recovered) {
			tracing::debug!(node = %id, "conductor.recovery.finish");
			self.emit(ConductorEvent::StateChanged { node: id });
			self.node_mut(id).state = State::Ground;
		}
	}

	/// Consumes one line of the recovery handshake.
	///
	/// Returns the recovered framer once `:end-recovery` arrives with every key present.
	/// An incomplete handshake quits the node.
	pub fn handle_recovery_line(&mut self, id: NodeId, raw: &str) -> Option<ConductorRecovery> {
		let line = raw.trim_end_matches(['\r', '\n']);
		if !line.starts_with(':') {
			return None;
		}
		if line == ":begin-recovery" {
			self.node_mut(id).state = State::Recovery(RecoveryState::Building(RecoveryInfo::default()));
		}
		if line.starts_with(":recovery: process ") {
			return None;
		}
		let State::Recovery(RecoveryState::Building(info)) = &mut self.node_mut(id).state else {
			return None;
		};
		if line.starts_with(":end-recovery") {
			let info = info.clone();
			return self.finish_recovery(id, info);
		}
		let (key, value) = line.strip_prefix(RECOVERY_PREFIX)?.split_once(' ')?;
		info.set(key, value);
		None
	}

	fn finish_recovery(&mut self, id: NodeId, info: RecoveryInfo) -> Option<ConductorRecovery> {
		let (pid, dcs_id, sshargs, bool_args, client_unique_id) = match info {
			RecoveryInfo {
				login: Some(pid),
				dcs_id: Some(dcs_id),
				sshargs: Some(sshargs),
				bool_args: Some(bool_args),
				client_unique_id: Some(client_unique_id),
			} => (pid, dcs_id, sshargs, bool_args, client_unique_id),
			incomplete => {
				tracing::warn!(node = %id, info = ?incomplete, "conductor.recovery.incomplete");
				self.quit(id);
				return None;
			}
		};
		let parent = self.parent(id);
		let mut hops = parent.map(|p| self.nesting(p)).unwrap_or_default();
		hops.push(Nesting { pid, dcs_id: dcs_id.clone() });
		let node = self.node_mut(id);
		node.framed_pid = Some(pid);
		node.state = State::Ground;
		tracing::info!(node = %id, pid, "conductor.recovery.complete");
		Some(ConductorRecovery {
			pid,
			dcs_id,
			tree: nesting_tree(&hops),
			sshargs,
			bool_args,
			client_unique_id,
			parent,
		})
	}

	/// Creates a node for a recovered framer. It stays `Recovered` until
	/// [`Self::recovery_did_finish`].
	pub fn adopt_recovery(&mut self, recovery: &ConductorRecovery) -> Result<NodeId, SshArgsError> {
		let parsed = ParsedSshArguments::parse(&recovery.sshargs, &recovery.bool_args)?;
		let params = ConductorParams {
			sshargs: recovery.sshargs.clone(),
			bool_args: recovery.bool_args.clone(),
			dcs_id: recovery.dcs_id.clone(),
			client_unique_id: recovery.client_unique_id.clone(),
			..ConductorParams::default()
		};
		let depth = self.child_depth(recovery.parent);
		let mut node = Node::new(params, parsed, depth, recovery.parent, self.options.config.autopoll);
		node.state = State::Recovered;
		let id = self.push_node(node);
		self.set_framed_pid(id, recovery.pid);
		Ok(id)
	}

	/// Framed hops from the outermost framed ancestor down to `id`. Stops at the first
	/// unframed node walking up.
	pub fn nesting(&self, id: NodeId) -> Vec<Nesting> {
		let mut hops: Vec<Nesting> = self
			.ancestry(id)
			.map(|n| self.node(n))
			.map_while(|node| node.framed_pid.map(|pid| Nesting { pid, dcs_id: node.dcs_id.clone() }))
			.collect();
		hops.reverse();
		hops
	}

	/// The whole chain down to `id` as `{pid: [dcsID, child]}`. Unframed ancestors use PID 0;
	/// an unframed `id` contributes an empty object.
	pub fn tree(&self, id: NodeId) -> Value {
		let node = self.node(id);
		let mut tree = match node.framed_pid {
			Some(pid) => json!({ pid.to_string(): [node.dcs_id, {}] }),
			None => Value::Object(Map::new()),
		};
		for ancestor in self.ancestry(id).skip(1) {
			let node = self.node(ancestor);
			let pid = node.framed_pid.unwrap_or(0);
			tree = json!({ pid.to_string(): [node.dcs_id, tree] });
		}
		tree
	}
}
