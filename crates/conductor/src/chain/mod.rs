//! Conductor nodes and the command queue that drives each of them.
//!
//! A chain is an arena of nodes, one per SSH hop. Node 0 talks to the transport
//! through the delegate; every other node writes through its parent. Protocol
//! events enter at the innermost node and walk up the parent links until they
//! reach the node whose depth they carry.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::command::{Command, FileSubcommand, SuggestionInputs};
use crate::config::ConductorConfig;
use crate::context::{ExecutionContext, FileReply, Followup, Handler, JobCompletion, PartialResult, PollCallback};
use crate::delegate::{ConductorDelegate, ConductorEvent};
use crate::error::SshArgsError;
use crate::injection::{DefaultInjector, Environment, ShellIntegrationInjector};
use crate::payload::{Payload, PayloadPacker, RawFilePacker, normalize_destination};
use crate::registry::ConductorRegistry;
use crate::ssh::{ParsedSshArguments, SshIdentity};

mod events;
mod framing;
mod recovery;
#[cfg(test)]
mod tests;

pub use recovery::{ConductorRecovery, Nesting, nesting_tree};

/// Side-channel pseudo-PID carrying autopoll snapshots.
pub const AUTOPOLL_PID: i32 = -1000;
/// Side-channel pseudo-PID carrying terminal-mode notifications.
pub const NOTIF_PID: i32 = -1001;

pub type SharedChain = Arc<Mutex<ConductorChain>>;

/// Index of a node within its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
	pub fn index(self) -> usize {
		self.0
	}

	#[cfg(test)]
	pub(crate) fn from_index(index: usize) -> Self {
		Self(index)
	}
}

impl fmt::Display for NodeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Everything needed to start a conductor for one hop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConductorParams {
	pub sshargs: String,
	/// Option letters that take no value.
	pub bool_args: String,
	pub dcs_id: String,
	pub client_unique_id: String,
	pub vars_to_send: Environment,
	pub client_vars: Environment,
	pub initial_directory: Option<String>,
	pub should_inject_shell_integration: bool,
}

/// How to reach a hop again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectionInfo {
	pub sshargs: String,
	pub initial_directory: Option<String>,
	pub boolargs: String,
}

/// Terminal modes last reported by the remote tty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtyState {
	pub echo: bool,
	pub icanon: bool,
}

impl Default for TtyState {
	fn default() -> Self {
		Self { echo: true, icanon: true }
	}
}

impl TtyState {
	pub fn at_password_prompt(self) -> bool {
		!self.echo && self.icanon
	}
}

/// Coarse protocol state, for callers that only need to know where a node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
	Ground,
	WillExecute,
	Executing,
	Unhooked,
	Recovery,
	Recovered,
}

pub(crate) enum State {
	Ground,
	WillExecute(ExecutionContext),
	Executing(ExecutionContext),
	Unhooked,
	Recovery(recovery::RecoveryState),
	Recovered,
}

impl State {
	fn kind(&self) -> StateKind {
		match self {
			Self::Ground => StateKind::Ground,
			Self::WillExecute(_) => StateKind::WillExecute,
			Self::Executing(_) => StateKind::Executing,
			Self::Unhooked => StateKind::Unhooked,
			Self::Recovery(_) => StateKind::Recovery,
			Self::Recovered => StateKind::Recovered,
		}
	}

	fn current(&self) -> Option<&ExecutionContext> {
		match self {
			Self::WillExecute(ctx) | Self::Executing(ctx) => Some(ctx),
			_ => None,
		}
	}
}

pub(crate) struct Node {
	pub sshargs: String,
	pub bool_args: String,
	pub dcs_id: String,
	pub client_unique_id: String,
	pub vars_to_send: Environment,
	pub client_vars: Environment,
	pub initial_directory: Option<String>,
	pub should_inject_shell_integration: bool,
	pub parsed: ParsedSshArguments,
	pub depth: i32,
	pub parent: Option<NodeId>,

	pub state: State,
	pub queue: VecDeque<ExecutionContext>,
	pub background_jobs: HashMap<i32, ExecutionContext>,
	pub framed_pid: Option<i32>,
	pub payloads: Vec<Payload>,
	pub modified_vars: Option<Environment>,
	pub modified_command_args: Option<Vec<String>>,
	pub home_directory: Option<String>,
	pub uname: Option<String>,
	pub shell: Option<String>,
	pub terminal_configuration: Option<Vec<u8>>,
	pub environment_variables: BTreeMap<String, String>,
	pub current_directory: Option<String>,
	pub autopoll_enabled: bool,
	pub queue_writes_enabled: bool,
	pub autopoll_buffer: String,
	pub my_jump: Option<ReconnectionInfo>,
	pub subsequent_jumps: Vec<ReconnectionInfo>,
	pub suggestion_cache: HashMap<SuggestionInputs, Vec<String>>,
	pub tty: TtyState,
}

impl Node {
	pub(crate) fn new(params: ConductorParams, parsed: ParsedSshArguments, depth: i32, parent: Option<NodeId>, autopoll: bool) -> Self {
		Self {
			sshargs: params.sshargs,
			bool_args: params.bool_args,
			dcs_id: params.dcs_id,
			client_unique_id: params.client_unique_id,
			vars_to_send: params.vars_to_send,
			client_vars: params.client_vars,
			initial_directory: params.initial_directory,
			should_inject_shell_integration: params.should_inject_shell_integration,
			parsed,
			depth,
			parent,
			state: State::Ground,
			queue: VecDeque::new(),
			background_jobs: HashMap::new(),
			framed_pid: None,
			payloads: Vec::new(),
			modified_vars: None,
			modified_command_args: None,
			home_directory: None,
			uname: None,
			shell: None,
			terminal_configuration: None,
			environment_variables: BTreeMap::new(),
			current_directory: None,
			autopoll_enabled: autopoll,
			queue_writes_enabled: true,
			autopoll_buffer: String::new(),
			my_jump: None,
			subsequent_jumps: Vec::new(),
			suggestion_cache: HashMap::new(),
			tty: TtyState::default(),
		}
	}

	fn framing(&self) -> bool {
		self.framed_pid.is_some()
	}
}

/// Collaborators shared by every node of a chain.
#[derive(Clone)]
pub struct ChainOptions {
	pub config: Arc<ConductorConfig>,
	pub injector: Arc<dyn ShellIntegrationInjector>,
	pub packer: Arc<dyn PayloadPacker>,
	pub registry: Arc<ConductorRegistry>,
}

impl ChainOptions {
	pub fn new(config: ConductorConfig) -> Self {
		Self {
			injector: Arc::new(DefaultInjector::new(config.shell_integration_dir.clone())),
			packer: Arc::new(RawFilePacker),
			registry: ConductorRegistry::global(),
			config: Arc::new(config),
		}
	}

	pub fn with_injector(mut self, injector: Arc<dyn ShellIntegrationInjector>) -> Self {
		self.injector = injector;
		self
	}

	pub fn with_packer(mut self, packer: Arc<dyn PayloadPacker>) -> Self {
		self.packer = packer;
		self
	}

	pub fn with_registry(mut self, registry: Arc<ConductorRegistry>) -> Self {
		self.registry = registry;
		self
	}
}

impl Default for ChainOptions {
	fn default() -> Self {
		Self::new(ConductorConfig::default())
	}
}

/// The conductors of one session, innermost hop last.
///
/// All methods run synchronously under the chain's lock. Completion callbacks are
/// invoked with the lock held and must not lock the chain again.
pub struct ConductorChain {
	this: Weak<Mutex<ConductorChain>>,
	nodes: Vec<Node>,
	delegate: Option<Arc<dyn ConductorDelegate>>,
	options: ChainOptions,
}

impl fmt::Debug for ConductorChain {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut list = f.debug_list();
		for node in &self.nodes {
			list.entry(&format_args!("depth={} pid={:?} state={:?}", node.depth, node.framed_pid, node.state.kind()));
		}
		list.finish()
	}
}

impl ConductorChain {
	pub fn new(options: ChainOptions, delegate: Option<Arc<dyn ConductorDelegate>>) -> SharedChain {
		Arc::new_cyclic(|this| {
			Mutex::new(Self {
				this: this.clone(),
				nodes: Vec::new(),
				delegate,
				options,
			})
		})
	}

	/// Adds a conductor for a new hop. A hop below a framing parent is one level deeper.
	pub fn add_conductor(&mut self, params: ConductorParams, parent: Option<NodeId>) -> Result<NodeId, SshArgsError> {
		let parsed = ParsedSshArguments::parse(&params.sshargs, &params.bool_args)?;
		let depth = self.child_depth(parent);
		let id = NodeId(self.nodes.len());
		self.nodes.push(Node::new(params, parsed, depth, parent, self.options.config.autopoll));
		tracing::debug!(node = %id, depth, "conductor.create");
		Ok(id)
	}

	fn child_depth(&self, parent: Option<NodeId>) -> i32 {
		match parent.map(|p| &self.nodes[p.0]) {
			Some(parent) if parent.framing() => parent.depth + 1,
			Some(parent) => parent.depth,
			None => 0,
		}
	}

	pub(crate) fn push_node(&mut self, node: Node) -> NodeId {
		self.nodes.push(node);
		NodeId(self.nodes.len() - 1)
	}

	pub fn set_delegate(&mut self, delegate: Option<Arc<dyn ConductorDelegate>>) {
		self.delegate = delegate;
	}

	pub fn options(&self) -> &ChainOptions {
		&self.options
	}

	pub fn config(&self) -> &ConductorConfig {
		&self.options.config
	}

	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
		(0..self.nodes.len()).map(NodeId)
	}

	pub(crate) fn node(&self, id: NodeId) -> &Node {
		&self.nodes[id.0]
	}

	pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
		&mut self.nodes[id.0]
	}

	pub(crate) fn shared(&self) -> Weak<Mutex<ConductorChain>> {
		self.this.clone()
	}

	// ── Accessors ──

	pub fn parent(&self, id: NodeId) -> Option<NodeId> {
		self.node(id).parent
	}

	pub fn depth(&self, id: NodeId) -> i32 {
		self.node(id).depth
	}

	pub fn framed_pid(&self, id: NodeId) -> Option<i32> {
		self.node(id).framed_pid
	}

	pub fn framing(&self, id: NodeId) -> bool {
		self.node(id).framing()
	}

	pub fn state(&self, id: NodeId) -> StateKind {
		self.node(id).state.kind()
	}

	pub fn sshargs(&self, id: NodeId) -> &str {
		&self.node(id).sshargs
	}

	pub fn identity(&self, id: NodeId) -> &SshIdentity {
		&self.node(id).parsed.identity
	}

	pub fn home_directory(&self, id: NodeId) -> Option<&str> {
		self.node(id).home_directory.as_deref()
	}

	pub fn uname(&self, id: NodeId) -> Option<&str> {
		self.node(id).uname.as_deref()
	}

	pub fn shell(&self, id: NodeId) -> Option<&str> {
		self.node(id).shell.as_deref()
	}

	pub fn environment_variable(&self, id: NodeId, name: &str) -> Option<&str> {
		self.node(id).environment_variables.get(name).map(String::as_str)
	}

	pub fn modified_vars(&self, id: NodeId) -> Option<&Environment> {
		self.node(id).modified_vars.as_ref()
	}

	pub fn modified_command_args(&self, id: NodeId) -> Option<&[String]> {
		self.node(id).modified_command_args.as_deref()
	}

	pub fn payloads(&self, id: NodeId) -> &[Payload] {
		&self.node(id).payloads
	}

	pub fn subsequent_jumps(&self, id: NodeId) -> &[ReconnectionInfo] {
		&self.node(id).subsequent_jumps
	}

	pub fn tty_state(&self, id: NodeId) -> TtyState {
		self.node(id).tty
	}

	pub fn at_password_prompt(&self, id: NodeId) -> bool {
		self.node(id).tty.at_password_prompt()
	}

	pub fn terminal_configuration(&self, id: NodeId) -> Option<&[u8]> {
		self.node(id).terminal_configuration.as_deref()
	}

	pub fn set_terminal_configuration(&mut self, id: NodeId, configuration: Option<Vec<u8>>) {
		self.node_mut(id).terminal_configuration = configuration;
	}

	pub fn set_current_directory(&mut self, id: NodeId, directory: Option<String>) {
		self.node_mut(id).current_directory = directory;
	}

	pub fn set_autopoll_enabled(&mut self, id: NodeId, enabled: bool) {
		self.node_mut(id).autopoll_enabled = enabled;
	}

	pub fn set_queue_writes_enabled(&mut self, id: NodeId, enabled: bool) {
		self.node_mut(id).queue_writes_enabled = enabled;
	}

	/// Commands waiting behind the current one, in send order.
	pub fn queued_commands(&self, id: NodeId) -> Vec<Command> {
		self.node(id).queue.iter().map(|ctx| ctx.command.clone()).collect()
	}

	pub fn current_command(&self, id: NodeId) -> Option<&Command> {
		self.node(id).state.current().map(|ctx| &ctx.command)
	}

	pub fn background_job_pids(&self, id: NodeId) -> Vec<i32> {
		let mut pids: Vec<i32> = self.node(id).background_jobs.keys().copied().collect();
		pids.sort_unstable();
		pids
	}

	pub fn current_operation_description(&self, id: NodeId) -> String {
		match &self.node(id).state {
			State::Ground => "waiting".to_string(),
			State::Executing(ctx) => ctx.command.operation_description(),
			State::WillExecute(ctx) => format!("{} (preparation stage)", ctx.command.operation_description()),
			State::Unhooked => "unhooked".to_string(),
			State::Recovery(_) => "recovery".to_string(),
			State::Recovered => "recovered".to_string(),
		}
	}

	/// Whether this node and every ancestor still buffer input while a command runs.
	pub fn queue_writes(&self, id: NodeId) -> bool {
		self.ancestry(id).all(|n| {
			let node = self.node(n);
			node.queue_writes_enabled && !matches!(node.state, State::Unhooked)
		})
	}

	/// Whether keystrokes should be routed through [`Self::send_keys`].
	pub fn handles_keystrokes(&self, id: NodeId) -> bool {
		self.framing(id) && self.queue_writes(id)
	}

	pub fn ancestry_contains(&self, id: NodeId, client_unique_id: &str) -> bool {
		self.ancestry(id).any(|n| self.node(n).client_unique_id == client_unique_id)
	}

	/// `id` followed by each of its ancestors.
	pub fn ancestry(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
		std::iter::successors(Some(id), move |n| self.node(*n).parent)
	}

	pub fn reconnection_info(&self, id: NodeId) -> ReconnectionInfo {
		let node = self.node(id);
		ReconnectionInfo {
			sshargs: node.sshargs.clone(),
			initial_directory: node.current_directory.clone().or_else(|| node.initial_directory.clone()),
			boolargs: node.bool_args.clone(),
		}
	}

	pub fn can_transfer_files_to(&self, id: NodeId, host: &str, user: Option<&str>) -> bool {
		self.framing(id) && self.identity(id).matches(host, user)
	}

	/// Queues a local file for upload before the remote shell starts.
	pub fn add_payload(&mut self, id: NodeId, path: impl Into<String>, destination: &str) {
		let payload = Payload {
			path: path.into(),
			destination: normalize_destination(destination),
		};
		self.node_mut(id).payloads.push(payload);
	}

	// ── Queue ──

	pub(crate) fn emit(&self, event: ConductorEvent) {
		if let Some(delegate) = &self.delegate {
			delegate.conductor_event(event);
		}
	}

	pub(crate) fn send(&mut self, id: NodeId, command: Command, handler: Handler) {
		self.enqueue(id, ExecutionContext::new(command, handler), false);
	}

	pub(crate) fn enqueue(&mut self, id: NodeId, context: ExecutionContext, high_priority: bool) {
		let node = self.node_mut(id);
		tracing::trace!(depth = node.depth, command = %context.command.operation_description(), high_priority, "conductor.send");
		if high_priority {
			node.queue.push_front(context);
		} else {
			node.queue.push_back(context);
		}
		if matches!(node.state, State::Ground | State::Recovery(_)) {
			self.dequeue(id);
		}
	}

	fn dequeue(&mut self, id: NodeId) {
		if self.delegate.is_none() {
			tracing::debug!(node = %id, "conductor.dequeue_without_delegate");
			let node = self.node_mut(id);
			let aborted: Vec<ExecutionContext> = node.queue.drain(..).collect();
			node.state = State::Ground;
			self.abort_contexts(id, aborted);
			return;
		}
		let width = self.options.config.wire_chunk_width;
		let mut followups = Vec::new();
		let node = self.node_mut(id);
		while node.queue.front().is_some_and(|ctx| ctx.canceled) {
			if let Some(mut ctx) = node.queue.pop_front() {
				tracing::trace!(command = %ctx.command.operation_description(), "conductor.skip_canceled");
				followups.extend(ctx.update(PartialResult::Canceled));
			}
		}
		if let Some(ctx) = node.queue.pop_front() {
			let text = ctx.command.serialize(width);
			tracing::trace!(depth = node.depth, command = %ctx.command.operation_description(), "conductor.dequeue");
			node.state = State::WillExecute(ctx);
			self.write(id, &text);
		}
		self.apply(id, followups);
	}

	/// Marks every queued command matching `predicate` canceled. Returns how many were newly canceled.
	pub(crate) fn cancel_enqueued(&mut self, id: NodeId, mut predicate: impl FnMut(&Command) -> bool) -> usize {
		let mut count = 0;
		for ctx in self.node_mut(id).queue.iter_mut() {
			if !ctx.canceled && predicate(&ctx.command) {
				tracing::trace!(command = %ctx.command.operation_description(), "conductor.cancel");
				ctx.cancel();
				count += 1;
			}
		}
		count
	}

	/// Feeds `Abort` to contexts being thrown away. Only completions they produce are delivered.
	fn abort_contexts(&mut self, id: NodeId, contexts: impl IntoIterator<Item = ExecutionContext>) {
		let mut completions = Vec::new();
		for mut ctx in contexts {
			completions.extend(
				ctx.update(PartialResult::Abort)
					.into_iter()
					.filter(|f| matches!(f, Followup::RemoteCommandFinished { .. })),
			);
		}
		self.apply(id, completions);
	}

	// ── Output ──

	pub(crate) fn write(&mut self, id: NodeId, text: &str) {
		self.write_with_end(id, text, "\n");
	}

	fn write_with_end(&mut self, id: NodeId, text: &str, end: &str) {
		let mut payload = String::with_capacity(text.len() + end.len());
		payload.push_str(text);
		payload.push_str(end);
		match self.node(id).parent {
			Some(parent) => self.send_keys(parent, payload.as_bytes()),
			None => self.emit(ConductorEvent::Write { node: id, text: payload }),
		}
	}

	/// Sends keystrokes to the node's remote process, wrapped for the framer when framing.
	pub fn send_keys(&mut self, id: NodeId, data: &[u8]) {
		match self.node(id).framed_pid {
			Some(pid) => self.send(id, Command::FramerSend { data: data.to_vec(), pid }, Handler::FireAndForget),
			None => {
				let text: String = data.iter().map(|&b| char::from(b)).collect();
				self.emit(ConductorEvent::Write { node: id, text });
			}
		}
	}

	// ── Follow-ups ──

	pub(crate) fn apply(&mut self, id: NodeId, followups: Vec<Followup>) {
		for followup in followups {
			match followup {
				Followup::Fail(reason) => self.fail(id, &reason),
				Followup::SendInitialText => self.emit(ConductorEvent::SendInitialText { node: id }),
				Followup::ExecLoginShell => self.exec_login_shell(id),
				Followup::PythonChecked(version) => self.python_checked(id, version),
				Followup::FinalizeFraming { status, text } => self.finalize_framing(id, status, &text),
				Followup::StoreEnvironment { name, value } => {
					self.node_mut(id).environment_variables.insert(name, value);
				}
				Followup::Write(text) => self.write(id, &text),
				Followup::AddBackgroundJob { pid, command, completion } => {
					tracing::trace!(pid, "conductor.background_job");
					let job = ExecutionContext::new(
						command,
						Handler::BackgroundJob {
							lines: Vec::new(),
							completion: Some(completion),
						},
					);
					self.node_mut(id).background_jobs.insert(pid, job);
				}
				Followup::ShellReported(text) => self.handle_shell_report(id, &text),
				Followup::RemoteCommandFinished { completion, output, status } => self.finish_remote_command(id, completion, output, status),
			}
		}
	}

	pub(crate) fn finish_remote_command(&mut self, id: NodeId, completion: JobCompletion, output: Vec<u8>, status: i32) {
		let value = || String::from_utf8_lossy(&output).trim().to_string();
		match completion {
			JobCompletion::Callback(callback) => callback(output, status),
			JobCompletion::StoreUname if status == 0 => {
				self.node_mut(id).uname = Some(value());
				self.emit(ConductorEvent::StateChanged { node: id });
			}
			JobCompletion::StoreHome if status == 0 => {
				self.node_mut(id).home_directory = Some(value());
				self.emit(ConductorEvent::StateChanged { node: id });
			}
			JobCompletion::StoreUname | JobCompletion::StoreHome => {}
		}
	}

	// ── Failure and teardown ──

	/// Drops all pending work on this node and its ancestors and returns them to ground.
	pub(crate) fn force_return_to_ground(&mut self, id: NodeId) {
		let ids: Vec<NodeId> = self.ancestry(id).collect();
		for n in ids {
			let node = self.node_mut(n);
			node.state = State::Ground;
			let aborted: Vec<ExecutionContext> = node.queue.drain(..).collect();
			self.abort_contexts(n, aborted);
		}
	}

	/// Gives up on framing: clears all pending work, asks for a login shell, and tells the delegate why.
	pub fn fail(&mut self, id: NodeId, reason: &str) {
		tracing::warn!(node = %id, depth = self.depth(id), reason, "conductor.fail");
		self.force_return_to_ground(id);
		self.unregister(id);
		let mut text = Command::ExecLoginShell(Vec::new()).wire_text();
		text.push('\n');
		self.emit(ConductorEvent::Write { node: id, text });
		self.emit(ConductorEvent::Abort {
			node: id,
			reason: reason.to_string(),
		});
	}

	pub fn quit(&mut self, id: NodeId) {
		tracing::debug!(node = %id, "conductor.quit");
		let node = self.node_mut(id);
		for ctx in node.queue.iter_mut() {
			ctx.cancel();
		}
		if let State::WillExecute(ctx) | State::Executing(ctx) = &mut node.state {
			ctx.cancel();
		}
		node.queue.clear();
		node.state = State::Ground;
		self.send(id, Command::Quit, Handler::FireAndForget);
		self.unregister(id);
		self.emit(ConductorEvent::Quit { node: id });
		self.emit(ConductorEvent::StateChanged { node: id });
	}

	pub(crate) fn set_framed_pid(&mut self, id: NodeId, pid: i32) {
		self.node_mut(id).framed_pid = Some(pid);
		let identity = self.identity(id).clone();
		self.options.registry.add(identity, self.this.clone(), id);
	}

	fn unregister(&self, id: NodeId) {
		self.options.registry.remove(&self.this, id);
	}

	// ── Simple commands ──

	pub fn eval(&mut self, id: NodeId, code: &str) {
		let encoded = crate::command::b64(code.as_bytes());
		self.send(id, Command::Eval(encoded), Handler::FireAndForget);
	}

	pub fn register_process(&mut self, id: NodeId, pid: i32) {
		self.send(id, Command::FramerRegister(pid), Handler::FireAndForget);
	}

	pub fn deregister_process(&mut self, id: NodeId, pid: i32) {
		self.send(id, Command::FramerDeregister(pid), Handler::FireAndForget);
	}

	/// Asks the framer for a process snapshot. Returns false when a poll is already queued.
	pub fn poll(&mut self, id: NodeId, completion: PollCallback) -> bool {
		if self.node(id).queue.iter().any(|ctx| ctx.command == Command::FramerPoll) {
			tracing::debug!(node = %id, "conductor.poll_declined");
			return false;
		}
		self.send(
			id,
			Command::FramerPoll,
			Handler::Poll {
				lines: Vec::new(),
				completion: Some(completion),
			},
		);
		true
	}

	pub fn reset(&mut self, id: NodeId) {
		self.send(id, Command::FramerReset, Handler::FireAndForget);
		if self.node(id).autopoll_enabled {
			self.send(id, Command::FramerAutopoll, Handler::FireAndForget);
		}
	}

	/// Resets the parent, then this node.
	pub fn reset_transitively(&mut self, id: NodeId) {
		if let Some(parent) = self.parent(id) {
			self.reset(parent);
		}
		self.reset(id);
	}

	pub fn did_resynchronize(&mut self, id: NodeId) {
		tracing::debug!(node = %id, "conductor.resynchronize");
		self.force_return_to_ground(id);
		self.reset_transitively(id);
	}

	/// Sends a file operation and returns the receiver of its reply.
	pub(crate) fn framer_file(&mut self, id: NodeId, subcommand: FileSubcommand, high_priority: bool) -> oneshot::Receiver<FileReply> {
		let (tx, rx) = oneshot::channel();
		let context = ExecutionContext::new(
			Command::FramerFile(subcommand),
			Handler::File {
				lines: Vec::new(),
				completion: Some(tx),
			},
		);
		self.enqueue(id, context, high_priority);
		rx
	}

	pub(crate) fn cached_suggestions(&self, id: NodeId, inputs: &SuggestionInputs) -> Option<Vec<String>> {
		self.node(id).suggestion_cache.get(inputs).cloned()
	}

	pub(crate) fn cache_suggestions(&mut self, id: NodeId, inputs: SuggestionInputs, suggestions: Vec<String>) {
		self.node_mut(id).suggestion_cache.insert(inputs, suggestions);
	}
}
