//! In-flight commands and the handlers that interpret their output.
//!
//! Handlers never touch the conductor. [`ExecutionContext::update`] returns
//! [`Followup`]s that the owning node applies, so a handler can be driven while
//! the node is borrowed elsewhere.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tokio::sync::oneshot;

use crate::command::Command;
use crate::config::PythonVersion;

/// Called with a background job's combined output and exit status.
pub type JobCallback = Box<dyn FnOnce(Vec<u8>, i32) + Send>;
/// Called with the output of a `poll`.
pub type PollCallback = Box<dyn FnOnce(Vec<u8>) + Send>;

/// Reply of a file operation: accumulated text and exit status.
pub(crate) type FileReply = (String, i32);

/// A fragment of a command's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialResult {
	SideChannelLine { line: String, channel: u8, pid: i32 },
	Line(String),
	End(u8),
	Abort,
	Canceled,
}

/// Where the output of a remote command goes once it ends.
pub enum JobCompletion {
	Callback(JobCallback),
	/// Cache the output as the remote `uname`.
	StoreUname,
	/// Cache the output as the remote home directory.
	StoreHome,
}

impl fmt::Debug for JobCompletion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Callback(_) => f.write_str("Callback"),
			Self::StoreUname => f.write_str("StoreUname"),
			Self::StoreHome => f.write_str("StoreHome"),
		}
	}
}

pub(crate) enum Handler {
	NonFramerLogin,
	/// Fails the conductor when the command exits nonzero.
	FailIfNonzeroStatus,
	CheckForPython(Vec<String>),
	FireAndForget,
	FramerLogin(Vec<String>),
	Jump(Vec<String>),
	Getenv { name: String, lines: Vec<String> },
	WriteOnSuccess(String),
	RunRemoteCommand { command_line: String, completion: Option<JobCompletion> },
	File { lines: Vec<String>, completion: Option<oneshot::Sender<FileReply>> },
	Poll { lines: Vec<String>, completion: Option<PollCallback> },
	GetShell(Vec<String>),
	BackgroundJob { lines: Vec<String>, completion: Option<JobCompletion> },
}

impl fmt::Debug for Handler {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::NonFramerLogin => f.write_str("handleNonFramerLogin"),
			Self::FailIfNonzeroStatus => f.write_str("failIfNonzeroStatus"),
			Self::CheckForPython(_) => f.write_str("handleCheckForPython"),
			Self::FireAndForget => f.write_str("fireAndForget"),
			Self::FramerLogin(lines) => write!(f, "handleFramerLogin({})", lines.concat()),
			Self::Jump(_) => f.write_str("handleJump"),
			Self::Getenv { name, .. } => write!(f, "handleGetenv({name})"),
			Self::WriteOnSuccess(code) => write!(f, "writeOnSuccess({} chars)", code.len()),
			Self::RunRemoteCommand { command_line, .. } => write!(f, "handleRunRemoteCommand({command_line})"),
			Self::File { .. } => f.write_str("handleFile"),
			Self::Poll { .. } => f.write_str("handlePoll"),
			Self::GetShell(lines) => write!(f, "handleGetShell({})", lines.concat()),
			Self::BackgroundJob { lines, .. } => write!(f, "handleBackgroundJob({} lines)", lines.len()),
		}
	}
}

/// Work the owning node performs after a handler consumed a result.
#[derive(Debug)]
pub(crate) enum Followup {
	Fail(String),
	SendInitialText,
	ExecLoginShell,
	/// The remote Python version, when one was reported.
	PythonChecked(PythonVersion),
	FinalizeFraming { status: u8, text: String },
	StoreEnvironment { name: String, value: String },
	Write(String),
	AddBackgroundJob { pid: i32, command: Command, completion: JobCompletion },
	ShellReported(String),
	RemoteCommandFinished { completion: JobCompletion, output: Vec<u8>, status: i32 },
}

/// A command paired with the handler for its output.
#[derive(Debug)]
pub(crate) struct ExecutionContext {
	pub command: Command,
	pub handler: Handler,
	pub canceled: bool,
}

static PYTHON_VERSION: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^Python ([0-9]\.[0-9][0-9]*)").ok());

fn parse_python_version(output: &str) -> Option<PythonVersion> {
	let version = PYTHON_VERSION.as_ref()?.captures(output)?.get(1)?.as_str();
	let (major, minor) = version.split_once('.').unwrap_or((version, "0"));
	Some(PythonVersion::new(major.parse().unwrap_or(0), minor.parse().unwrap_or(0)))
}

impl ExecutionContext {
	pub fn new(command: Command, handler: Handler) -> Self {
		Self { command, handler, canceled: false }
	}

	/// Marks the context canceled. Anyone awaiting a file reply is told the
	/// connection closed. Calling this again has no effect.
	pub fn cancel(&mut self) {
		if self.canceled {
			return;
		}
		self.canceled = true;
		if let Handler::File { completion, .. } = &mut self.handler
			&& let Some(tx) = completion.take()
		{
			let _ = tx.send((String::new(), -1));
		}
	}

	pub fn is_file_fetch_with_id(&self, unique_id: &str) -> bool {
		matches!(&self.command, Command::FramerFile(sub) if sub.unique_id() == Some(unique_id))
	}

	pub fn update(&mut self, result: PartialResult) -> Vec<Followup> {
		let wire = || self.command.wire_text();
		match &mut self.handler {
			Handler::NonFramerLogin => match result {
				PartialResult::End(0) => vec![Followup::SendInitialText],
				PartialResult::End(status) => vec![Followup::Fail(format!("{}: Unexpected status {status}", wire()))],
				_ => Vec::new(),
			},
			Handler::FailIfNonzeroStatus => match result {
				PartialResult::End(status) if status != 0 => vec![Followup::Fail(format!("{}: Unexpected status {status}", wire()))],
				_ => Vec::new(),
			},
			Handler::CheckForPython(lines) => match result {
				PartialResult::Line(line) | PartialResult::SideChannelLine { line, channel: 1, .. } => {
					lines.push(line);
					Vec::new()
				}
				PartialResult::Abort | PartialResult::SideChannelLine { .. } | PartialResult::Canceled | PartialResult::End(1..) => {
					vec![Followup::ExecLoginShell]
				}
				PartialResult::End(0) => match parse_python_version(&lines.join("\n")) {
					Some(version) => vec![Followup::PythonChecked(version)],
					None => vec![Followup::ExecLoginShell],
				},
			},
			Handler::FireAndForget => Vec::new(),
			Handler::FramerLogin(lines) | Handler::Jump(lines) => match result {
				PartialResult::Line(line) => {
					lines.push(line);
					Vec::new()
				}
				PartialResult::End(status) => vec![Followup::FinalizeFraming { status, text: lines.concat() }],
				_ => Vec::new(),
			},
			Handler::Getenv { name, lines } => match result {
				PartialResult::Line(line) => {
					lines.push(line);
					Vec::new()
				}
				PartialResult::End(_) => lines
					.first()
					.map(|value| Followup::StoreEnvironment { name: name.clone(), value: value.clone() })
					.into_iter()
					.collect(),
				_ => Vec::new(),
			},
			Handler::WriteOnSuccess(code) => match result {
				PartialResult::End(0) => vec![Followup::Write(format!("{code}\nEOF\n"))],
				PartialResult::End(status) => vec![Followup::Fail(format!("Status {status} when running python code"))],
				_ => Vec::new(),
			},
			Handler::RunRemoteCommand { command_line, completion } => match result {
				PartialResult::Line(line) => match (line.parse::<i32>(), completion.take()) {
					(Ok(pid), Some(completion)) => vec![Followup::AddBackgroundJob {
						pid,
						command: Command::FramerRun(command_line.clone()),
						completion,
					}],
					(_, taken) => {
						*completion = taken;
						Vec::new()
					}
				},
				_ => Vec::new(),
			},
			Handler::File { lines, completion } => {
				let reply = match result {
					PartialResult::Line(line) => {
						lines.push(line);
						None
					}
					PartialResult::Abort | PartialResult::Canceled => Some((String::new(), -1)),
					PartialResult::SideChannelLine { .. } => None,
					PartialResult::End(status) => Some((lines.concat(), i32::from(status))),
				};
				if let Some(reply) = reply
					&& let Some(tx) = completion.take()
				{
					let _ = tx.send(reply);
				}
				Vec::new()
			}
			Handler::Poll { lines, completion } => match result {
				PartialResult::Line(line) => {
					lines.push(line);
					Vec::new()
				}
				PartialResult::End(_) => {
					if let Some(completion) = completion.take() {
						completion(lines.join("\n").into_bytes());
					}
					Vec::new()
				}
				_ => Vec::new(),
			},
			Handler::GetShell(lines) => match result {
				PartialResult::Line(line) | PartialResult::SideChannelLine { line, channel: 1, .. } => {
					lines.push(line);
					Vec::new()
				}
				PartialResult::End(0) => vec![Followup::ShellReported(lines.concat())],
				PartialResult::End(status) => {
					tracing::debug!(status, "conductor.getshell_failed");
					Vec::new()
				}
				_ => Vec::new(),
			},
			Handler::BackgroundJob { lines, completion } => match result {
				PartialResult::Line(_) => vec![Followup::Fail(format!("Unexpected output from {}", wire()))],
				PartialResult::SideChannelLine { line, channel: 1, .. } => {
					lines.push(line);
					Vec::new()
				}
				PartialResult::Abort | PartialResult::SideChannelLine { .. } | PartialResult::Canceled => completion
					.take()
					.map(|completion| Followup::RemoteCommandFinished { completion, output: Vec::new(), status: -2 })
					.into_iter()
					.collect(),
				PartialResult::End(status) => completion
					.take()
					.map(|completion| Followup::RemoteCommandFinished {
						completion,
						output: lines.concat().into_bytes(),
						status: i32::from(status),
					})
					.into_iter()
					.collect(),
			},
		}
	}
}
