//! Bootstrapping a remote host: shell discovery, environment, payloads, and the
//! switch from a plain shell to the framer.

use std::collections::BTreeMap;

use super::{ConductorChain, NodeId, ReconnectionInfo};
use crate::command::{Command, b64};
use crate::config::PythonVersion;
use crate::context::{Handler, JobCallback, JobCompletion};
use crate::delegate::ConductorEvent;
use crate::injection::{REMOTE_INTEGRATION_DIR, shell_supports_injection};
use crate::payload::Payload;

impl ConductorChain {
	/// Begins bootstrapping by asking the remote side for its shell.
	pub fn start(&mut self, id: NodeId) {
		tracing::debug!(node = %id, sshargs = %self.node(id).sshargs, "conductor.start");
		self.send(id, Command::GetShell, Handler::GetShell(Vec::new()));
	}

	/// Starts a node that will hop on through `jumps` instead of logging in.
	pub fn start_jumping(&mut self, id: NodeId, jumps: Vec<ReconnectionInfo>) {
		let mut jumps = jumps.into_iter();
		let Some(first) = jumps.next() else {
			tracing::warn!(node = %id, "conductor.jump_without_targets");
			return;
		};
		let node = self.node_mut(id);
		node.my_jump = Some(first);
		node.subsequent_jumps = jumps.collect();
		self.start(id);
	}

	pub fn child_did_begin_jumping(&mut self, id: NodeId) {
		self.node_mut(id).my_jump = None;
	}

	/// Interprets the reply to `getshell`: shell path, home directory, then version text.
	pub(crate) fn handle_shell_report(&mut self, id: NodeId, report: &str) {
		let parts: Vec<&str> = report.split('\n').map(|p| p.trim_matches([' ', '\t'])).collect();
		let node = self.node(id);
		let shell = node
			.parsed
			.command_args
			.first()
			.cloned()
			.unwrap_or_else(|| parts.first().copied().unwrap_or_default().to_string());
		let home = parts.get(1).copied().unwrap_or_default();
		let version = parts.get(2..).map(|rest| rest.join("\n")).unwrap_or_default();
		let shell_name = shell.rsplit('/').next().unwrap_or(&shell);

		if !shell.is_empty() && !home.is_empty() && node.should_inject_shell_integration && shell_supports_injection(shell_name, &version) {
			let integration_dir = format!("{home}/{REMOTE_INTEGRATION_DIR}");
			let argv: Vec<String> = node.parsed.command_args.iter().skip(1).cloned().collect();
			let injector = self.options.injector.clone();
			let (vars, mut args) = injector.modify_remote_environment(&integration_dir, &node.vars_to_send, &shell, &argv);
			args.insert(0, node.parsed.command_args.first().cloned().unwrap_or_else(|| shell.clone()));
			let files: Vec<Payload> = injector.files(&format!("/$HOME/{REMOTE_INTEGRATION_DIR}"));
			tracing::debug!(node = %id, shell = %shell, files = files.len(), "conductor.inject");
			let node = self.node_mut(id);
			node.modified_vars = Some(vars);
			node.modified_command_args = Some(args);
			node.payloads.extend(files);
		}
		self.node_mut(id).shell = Some(shell);
		self.emit(ConductorEvent::StateChanged { node: id });
		self.did_finish_get_shell(id);
	}

	fn did_finish_get_shell(&mut self, id: NodeId) {
		let node = self.node(id);
		let vars = node.modified_vars.clone().unwrap_or_else(|| node.vars_to_send.clone());
		for (key, value) in vars {
			self.send(id, Command::SetEnv { key, value }, Handler::FailIfNonzeroStatus);
		}
		let uploads = self.options.packer.pack(&self.node(id).payloads);
		for (data, dest) in uploads {
			self.send(id, Command::Write { data, dest }, Handler::FailIfNonzeroStatus);
		}
		if let Some(dir) = self.node(id).initial_directory.clone() {
			self.send(id, Command::Cd(dir), Handler::FailIfNonzeroStatus);
		}
		self.send(id, Command::PythonVersion, Handler::CheckForPython(Vec::new()));
	}

	pub(crate) fn python_checked(&mut self, id: NodeId, version: PythonVersion) {
		tracing::debug!(node = %id, %version, "conductor.python");
		if version >= self.options.config.minimum_python {
			self.do_framing(id);
		} else if let Some(script) = self.take_jump_script(id) {
			self.send(id, Command::Eval(b64(script.as_bytes())), Handler::FireAndForget);
		} else {
			self.exec_login_shell(id);
		}
	}

	fn do_framing(&mut self, id: NodeId) {
		let source = self.options.config.framer_source(self.depth(id));
		self.send(id, Command::RunPython(source.clone()), Handler::WriteOnSuccess(source));

		let node = self.node(id);
		let saved: BTreeMap<String, String> = [
			("dcsID", node.dcs_id.clone()),
			("sshargs", node.sshargs.clone()),
			("boolArgs", node.bool_args.clone()),
			("clientUniqueID", node.client_unique_id.clone()),
		]
		.into_iter()
		.map(|(k, v)| (k.to_string(), v))
		.collect();
		self.send(id, Command::FramerSave(saved), Handler::FireAndForget);

		let uname = self.options.config.uname_command.clone();
		self.queue_remote_command(id, uname, JobCompletion::StoreUname);
		self.queue_remote_command(id, "echo $HOME".to_string(), JobCompletion::StoreHome);
		self.send(
			id,
			Command::FramerGetenv("PATH".to_string()),
			Handler::Getenv {
				name: "PATH".to_string(),
				lines: Vec::new(),
			},
		);

		if let Some(script) = self.take_jump_script(id) {
			self.send(id, Command::FramerEval(script), Handler::Jump(Vec::new()));
		} else {
			let node = self.node(id);
			let cwd = node.initial_directory.clone().unwrap_or_else(|| "$HOME".to_string());
			let args = node.modified_command_args.clone().unwrap_or_else(|| node.parsed.command_args.clone());
			self.send(id, Command::FramerLogin { cwd, args }, Handler::FramerLogin(Vec::new()));
		}
		if self.node(id).autopoll_enabled {
			self.send(id, Command::FramerAutopoll, Handler::FireAndForget);
		}
		self.emit(ConductorEvent::StateChanged { node: id });
	}

	/// Builds the script that continues to the next hop. Consumes the pending jump.
	fn take_jump_script(&mut self, id: NodeId) -> Option<String> {
		let jump = self.node_mut(id).my_jump.take()?;
		Some(format!(
			"#!/usr/bin/env bash\nrm $SELF\nunset SELF\nit2ssh_wrapper() {{\n{}\n}}\nit2ssh_wrapper {}",
			self.options.config.jump_script, jump.sshargs
		))
	}

	pub(crate) fn exec_login_shell(&mut self, id: NodeId) {
		self.emit(ConductorEvent::StopQueueingInput { node: id });
		let node = self.node(id);
		let explicit_empty = node.modified_command_args.as_ref().is_some_and(Vec::is_empty);
		if explicit_empty || node.parsed.command_args.is_empty() {
			self.send(id, Command::ExecLoginShell(Vec::new()), Handler::NonFramerLogin);
		} else {
			let command = node.parsed.command_args.join(" ");
			self.send(id, Command::Run(command), Handler::FailIfNonzeroStatus);
		}
	}

	pub(crate) fn finalize_framing(&mut self, id: NodeId, status: u8, text: &str) {
		if status != 0 {
			self.fail(id, text);
			return;
		}
		let Ok(pid) = text.trim().parse::<i32>() else {
			self.fail(id, &format!("Invalid process ID from remote: {text}"));
			return;
		};
		tracing::info!(node = %id, pid, depth = self.depth(id), "conductor.framing");
		self.set_framed_pid(id, pid);
		self.emit(ConductorEvent::SendInitialText { node: id });
		self.emit(ConductorEvent::StateChanged { node: id });
		self.emit(ConductorEvent::StopQueueingInput { node: id });
	}

	/// Runs `command_line` in the background on a framed host.
	///
	/// `completion` receives the command's standard output and exit status once it
	/// terminates, or an empty output and `-2` if the node gives up on it first.
	pub fn run_remote_command(&mut self, id: NodeId, command_line: impl Into<String>, completion: JobCallback) {
		self.queue_remote_command(id, command_line.into(), JobCompletion::Callback(completion));
	}

	fn queue_remote_command(&mut self, id: NodeId, command_line: String, completion: JobCompletion) {
		if self.node(id).framed_pid == Some(0) {
			self.finish_remote_command(id, completion, Vec::new(), -1);
			return;
		}
		self.send(
			id,
			Command::FramerRun(command_line.clone()),
			Handler::RunRemoteCommand {
				command_line,
				completion: Some(completion),
			},
		);
	}
}
