//! Protocol events reported by the transport's parser.
//!
//! Every event carries the depth of the framer that produced it. A framing node
//! hands events for other depths to its parent.

use super::{AUTOPOLL_PID, ConductorChain, NOTIF_PID, NodeId, State};
use crate::command::Command;
use crate::context::{ExecutionContext, Handler, PartialResult};
use crate::delegate::ConductorEvent;

const TTY_NOTIFICATION: &str = "%notif tty ";

impl ConductorChain {
	/// Routes an event for `depth` to the node that owns it: the first node, walking up
	/// from `id`, whose depth matches or that is not framing.
	fn route(&self, id: NodeId, depth: i32) -> Option<NodeId> {
		self.ancestry(id).find(|n| {
			let node = self.node(*n);
			node.depth == depth || !node.framing()
		})
	}

	pub fn handle_line(&mut self, id: NodeId, line: &str, depth: i32) {
		let Some(id) = self.route(id, depth) else {
			return;
		};
		tracing::trace!(node = %id, depth, line, "conductor.line");
		let node = self.node_mut(id);
		let state = std::mem::replace(&mut node.state, State::Ground);
		let mut ctx = match state {
			State::WillExecute(ctx) | State::Executing(ctx) => ctx,
			other => {
				node.state = other;
				tracing::debug!(node = %id, line, "conductor.unexpected_line");
				return;
			}
		};
		let followups = ctx.update(PartialResult::Line(line.to_string()));
		self.node_mut(id).state = State::Executing(ctx);
		self.apply(id, followups);
	}

	/// Logged only.
	pub fn handle_command_begin(&self, id: NodeId, identifier: &str, depth: i32) {
		tracing::trace!(node = %id, identifier, depth, "conductor.command_begin");
	}

	/// Handles the end of a command. `kind` is `"f"` for framer commands and `"r"` otherwise.
	pub fn handle_command_end(&mut self, id: NodeId, identifier: &str, kind: &str, status: u8, depth: i32) {
		let node = self.node(id);
		let framing = node.framing();
		let expect_framing = framing || matches!(&node.state, State::Executing(ctx) if ctx.command.is_framer());
		if (!expect_framing && kind == "f") || (framing && depth != node.depth) {
			if let Some(parent) = node.parent {
				self.handle_command_end(parent, identifier, kind, status, depth);
			}
			return;
		}
		tracing::trace!(node = %id, identifier, status, "conductor.command_end");
		let node = self.node_mut(id);
		let state = std::mem::replace(&mut node.state, State::Ground);
		let mut ctx = match state {
			State::WillExecute(ctx) | State::Executing(ctx) => ctx,
			other => {
				node.state = other;
				tracing::debug!(node = %id, identifier, "conductor.unexpected_end");
				return;
			}
		};
		let followups = ctx.update(PartialResult::End(status));
		self.apply(id, followups);
		if matches!(self.node(id).state, State::Ground) {
			self.dequeue(id);
		}
	}

	/// The transport lost the framer. Pending commands are aborted and the node stops queueing.
	pub fn handle_unhook(&mut self, id: NodeId) {
		tracing::debug!(node = %id, "conductor.unhook");
		let node = self.node_mut(id);
		let current = match std::mem::replace(&mut node.state, State::Unhooked) {
			State::WillExecute(ctx) | State::Executing(ctx) => Some(ctx),
			_ => None,
		};
		let pending: Vec<ExecutionContext> = node.queue.drain(..).collect();
		self.abort_contexts(id, current.into_iter().chain(pending));
		self.node_mut(id).state = State::Unhooked;
		self.unregister(id);
	}

	pub fn handle_terminate(&mut self, id: NodeId, pid: i32, code: i32, depth: i32) {
		let Some(id) = self.ancestry(id).find(|n| self.node(*n).depth == depth) else {
			return;
		};
		tracing::trace!(node = %id, pid, code, "conductor.terminate");
		if self.node(id).framed_pid == Some(pid) {
			self.send(id, Command::Quit, Handler::FireAndForget);
			return;
		}
		if let Some(mut job) = self.node_mut(id).background_jobs.remove(&pid) {
			let followups = job.update(PartialResult::End(code as u8));
			self.apply(id, followups);
		}
	}

	pub fn handle_side_channel_output(&mut self, id: NodeId, output: &str, pid: i32, channel: u8, depth: i32) {
		let Some(id) = self.ancestry(id).find(|n| self.node(*n).depth == depth) else {
			return;
		};
		match pid {
			AUTOPOLL_PID => {
				if output == "EOF" {
					let snapshot = std::mem::take(&mut self.node_mut(id).autopoll_buffer);
					self.emit(ConductorEvent::Autopoll { node: id, output: snapshot });
					self.send(id, Command::FramerAutopoll, Handler::FireAndForget);
				} else {
					self.node_mut(id).autopoll_buffer.push_str(output);
				}
				return;
			}
			NOTIF_PID => self.handle_notification(id, output),
			_ => {}
		}
		let Some(job) = self.node_mut(id).background_jobs.get_mut(&pid) else {
			return;
		};
		let followups = job.update(PartialResult::SideChannelLine {
			line: output.to_string(),
			channel,
			pid,
		});
		self.apply(id, followups);
	}

	fn handle_notification(&mut self, id: NodeId, message: &str) {
		let Some(flags) = message.strip_prefix(TTY_NOTIFICATION) else {
			return;
		};
		tracing::trace!(node = %id, flags, "conductor.tty");
		let tty = &mut self.node_mut(id).tty;
		for flag in flags.split(' ').filter(|f| f.len() > 1) {
			let (enabled, name) = if let Some(name) = flag.strip_prefix('+') {
				(true, name)
			} else if let Some(name) = flag.strip_prefix('-') {
				(false, name)
			} else {
				continue;
			};
			match name {
				"echo" => tty.echo = enabled,
				"icanon" => tty.icanon = enabled,
				_ => {}
			}
		}
	}
}
