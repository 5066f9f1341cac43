//! JSON persistence of a conductor and its ancestors.
//!
//! Commands cannot survive a change of transport, so a record always carries an empty
//! queue and the ground state. Background jobs are not recorded.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::chain::{ChainOptions, ConductorChain, Node, NodeId, SharedChain};
use crate::delegate::ConductorDelegate;
use crate::error::RecordError;
use crate::injection::Environment;
use crate::payload::Payload;
use crate::ssh::ParsedSshArguments;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordedState {
	#[default]
	Ground,
}

/// One conductor as persisted, its parent nested inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConductorRecord {
	pub sshargs: String,
	pub vars_to_send: Environment,
	pub client_vars: Environment,
	pub payloads: Vec<Payload>,
	pub initial_directory: Option<String>,
	pub should_inject_shell_integration: bool,
	#[serde(rename = "parsedSSHArguments")]
	pub parsed_ssh_arguments: ParsedSshArguments,
	pub depth: i32,
	pub parent: Option<Box<ConductorRecord>>,
	#[serde(rename = "framedPID")]
	pub framed_pid: Option<i32>,
	#[serde(default)]
	pub state: RecordedState,
	#[serde(default)]
	pub queue: Vec<serde_json::Value>,
	pub bool_args: String,
	#[serde(rename = "dcsID")]
	pub dcs_id: String,
	#[serde(rename = "clientUniqueID")]
	pub client_unique_id: String,
	pub modified_vars: Option<Environment>,
	pub modified_command_args: Option<Vec<String>>,
	#[serde(default)]
	pub home_directory: Option<String>,
	#[serde(default)]
	pub shell: Option<String>,
	#[serde(default)]
	pub uname: Option<String>,
	/// Base64 of the opaque terminal configuration blob.
	#[serde(default)]
	pub terminal_configuration: Option<String>,
}

impl ConductorChain {
	/// The record of `id` with its ancestors nested inside.
	pub fn record(&self, id: NodeId) -> ConductorRecord {
		let node = self.node(id);
		ConductorRecord {
			sshargs: node.sshargs.clone(),
			vars_to_send: node.vars_to_send.clone(),
			client_vars: node.client_vars.clone(),
			payloads: node.payloads.clone(),
			initial_directory: node.initial_directory.clone(),
			should_inject_shell_integration: node.should_inject_shell_integration,
			parsed_ssh_arguments: node.parsed.clone(),
			depth: node.depth,
			parent: node.parent.map(|parent| Box::new(self.record(parent))),
			framed_pid: node.framed_pid,
			state: RecordedState::Ground,
			queue: Vec::new(),
			bool_args: node.bool_args.clone(),
			dcs_id: node.dcs_id.clone(),
			client_unique_id: node.client_unique_id.clone(),
			modified_vars: node.modified_vars.clone(),
			modified_command_args: node.modified_command_args.clone(),
			home_directory: node.home_directory.clone(),
			shell: node.shell.clone(),
			uname: node.uname.clone(),
			terminal_configuration: node.terminal_configuration.as_deref().map(|bytes| STANDARD.encode(bytes)),
		}
	}

	pub fn to_json(&self, id: NodeId) -> Result<String, RecordError> {
		if id.index() >= self.len() {
			return Err(RecordError::UnknownNode);
		}
		Ok(serde_json::to_string(&self.record(id))?)
	}

	/// Rebuilds a chain from [`Self::to_json`] output and resets every framer in it.
	///
	/// Returns the chain and the restored leaf.
	pub fn create(json: &str, options: ChainOptions, delegate: Option<Arc<dyn ConductorDelegate>>) -> Result<(SharedChain, NodeId), RecordError> {
		let leaf: ConductorRecord = serde_json::from_str(json)?;
		let mut records = Vec::new();
		let mut current = Some(leaf);
		while let Some(mut record) = current {
			current = record.parent.take().map(|parent| *parent);
			records.push(record);
		}
		records.reverse();

		let autopoll = options.config.autopoll;
		let shared = ConductorChain::new(options, delegate);
		let leaf = {
			let mut chain = shared.lock();
			let mut parent = None;
			for record in records {
				let framed_pid = record.framed_pid;
				let node = Node::restore(record, parent, autopoll)?;
				let id = chain.push_node(node);
				if let Some(pid) = framed_pid {
					chain.set_framed_pid(id, pid);
				}
				parent = Some(id);
			}
			let Some(leaf) = parent else {
				return Err(RecordError::UnknownNode);
			};
			tracing::debug!(nodes = chain.len(), "conductor.restore");
			chain.reset_transitively(leaf);
			leaf
		};
		Ok((shared, leaf))
	}
}

impl Node {
	fn restore(record: ConductorRecord, parent: Option<NodeId>, autopoll: bool) -> Result<Self, RecordError> {
		let terminal_configuration = record.terminal_configuration.map(|encoded| STANDARD.decode(encoded)).transpose()?;
		let params = crate::chain::ConductorParams {
			sshargs: record.sshargs,
			bool_args: record.bool_args,
			dcs_id: record.dcs_id,
			client_unique_id: record.client_unique_id,
			vars_to_send: record.vars_to_send,
			client_vars: record.client_vars,
			initial_directory: record.initial_directory,
			should_inject_shell_integration: record.should_inject_shell_integration,
		};
		let mut node = Node::new(params, record.parsed_ssh_arguments, record.depth, parent, autopoll);
		node.payloads = record.payloads;
		node.modified_vars = record.modified_vars;
		node.modified_command_args = record.modified_command_args;
		node.home_directory = record.home_directory;
		node.shell = record.shell;
		node.uname = record.uname;
		node.terminal_configuration = terminal_configuration;
		Ok(node)
	}
}
