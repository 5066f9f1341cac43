//! Commands sent to the remote side and their line-oriented wire encoding.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

mod file;

pub use file::{DownloadChunk, FileSorting, FileSubcommand, SuggestionInputs};

pub(crate) fn b64(bytes: &[u8]) -> String {
	STANDARD.encode(bytes)
}

/// Base64 that never produces an empty field.
pub(crate) fn nonempty_b64(bytes: &[u8]) -> String {
	if bytes.is_empty() { "=".to_string() } else { b64(bytes) }
}

pub(crate) fn string_or_hex(bytes: &[u8]) -> Cow<'_, str> {
	match std::str::from_utf8(bytes) {
		Ok(s) => Cow::Borrowed(s),
		Err(_) => Cow::Owned(bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
			let _ = write!(out, "{b:02x}");
			out
		})),
	}
}

/// One operation for the remote side.
///
/// Variants prefixed `Framer` are only understood once the framer runs and
/// produce multi-line wire text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
	ExecLoginShell(Vec<String>),
	SetEnv { key: String, value: String },
	/// Replaces the conductor with this command.
	Run(String),
	/// Reads the Python program that follows and executes it.
	RunPython(String),
	/// Shells out to this command, then returns to the conductor.
	Shell(String),
	PythonVersion,
	GetShell,
	Write { data: Vec<u8>, dest: String },
	Cd(String),
	Quit,
	/// Base64-encoded bash code.
	Eval(String),

	FramerRun(String),
	FramerLogin { cwd: String, args: Vec<String> },
	FramerEval(String),
	FramerSend { data: Vec<u8>, pid: i32 },
	FramerKill(i32),
	FramerQuit,
	FramerRegister(i32),
	FramerDeregister(i32),
	FramerPoll,
	FramerReset,
	FramerAutopoll,
	FramerSave(BTreeMap<String, String>),
	FramerFile(FileSubcommand),
	FramerGetenv(String),
}

impl Command {
	pub fn is_framer(&self) -> bool {
		!matches!(
			self,
			Self::ExecLoginShell(_)
				| Self::SetEnv { .. }
				| Self::Run(_)
				| Self::RunPython(_)
				| Self::Shell(_)
				| Self::PythonVersion
				| Self::GetShell
				| Self::Write { .. }
				| Self::Cd(_)
				| Self::Quit
				| Self::Eval(_)
		)
	}

	/// The command as the remote side reads it, before line encoding.
	pub fn wire_text(&self) -> String {
		match self {
			Self::ExecLoginShell(args) => std::iter::once("exec_login_shell").chain(args.iter().map(String::as_str)).collect::<Vec<_>>().join("\n"),
			Self::SetEnv { key, value } => format!("setenv {key} {}", bash_quote(value)),
			Self::Run(cmd) => format!("run {cmd}"),
			Self::RunPython(_) => "runpython".to_string(),
			Self::Shell(cmd) => format!("shell {cmd}"),
			Self::PythonVersion => "pythonversion".to_string(),
			Self::GetShell => "getshell".to_string(),
			Self::Write { data, dest } => format!("write {} {dest}", b64(data)),
			Self::Cd(dir) => format!("cd {dir}"),
			Self::Quit | Self::FramerQuit => "quit".to_string(),
			Self::Eval(code) => format!("eval {code}"),

			Self::FramerRun(cmd) => format!("run\n{cmd}"),
			Self::FramerLogin { cwd, args } => std::iter::once("login")
				.chain(std::iter::once(cwd.as_str()))
				.chain(args.iter().map(String::as_str))
				.collect::<Vec<_>>()
				.join("\n"),
			Self::FramerEval(script) => format!("eval\n{}", b64(script.as_bytes())),
			Self::FramerSend { data, pid } => format!("send\n{pid}\n{}", b64(data)),
			Self::FramerKill(pid) => format!("kill\n{pid}"),
			Self::FramerGetenv(name) => format!("getenv\n{name}"),
			Self::FramerRegister(pid) => format!("register\n{pid}"),
			// The framer's keyword really is misspelled.
			Self::FramerDeregister(pid) => format!("dereigster\n{pid}"),
			Self::FramerPoll => "poll".to_string(),
			Self::FramerReset => "reset".to_string(),
			Self::FramerAutopoll => "autopoll".to_string(),
			Self::FramerSave(values) => std::iter::once("save".to_string())
				.chain(values.iter().map(|(k, v)| format!("{k}={v}")))
				.collect::<Vec<_>>()
				.join("\n"),
			Self::FramerFile(sub) => format!("file\n{}", sub.wire_text()),
		}
	}

	pub fn operation_description(&self) -> String {
		match self {
			Self::ExecLoginShell(args) => format!("starting login shell with args {}", args.join(" ")),
			Self::SetEnv { key, value } => format!("setting {key}={value}"),
			Self::Run(cmd) => format!("running “{cmd}”"),
			Self::Shell(cmd) => format!("running in shell “{cmd}”"),
			Self::PythonVersion => "running pythonversion".to_string(),
			Self::RunPython(_) => "running Python code".to_string(),
			Self::Write { dest, .. } => format!("copying files to {dest}"),
			Self::Cd(dir) => format!("changing directory to {dir}"),
			Self::Quit => "quitting".to_string(),
			Self::Eval(_) => "evaling".to_string(),
			Self::GetShell => "getshell".to_string(),
			Self::FramerRun(cmd) => format!("run “{cmd}”"),
			Self::FramerLogin { cwd, args } => format!("login cwd={cwd} args={args:?}"),
			Self::FramerEval(_) => "eval".to_string(),
			Self::FramerSave(values) => format!("save {}", values.keys().map(String::as_str).collect::<Vec<_>>().join(", ")),
			Self::FramerSend { data, pid } => format!("send {} bytes to {pid}", data.len()),
			Self::FramerKill(pid) => format!("kill {pid}"),
			Self::FramerGetenv(name) => format!("getenv {name}"),
			Self::FramerQuit => "quit".to_string(),
			Self::FramerRegister(pid) => format!("register {pid}"),
			Self::FramerDeregister(pid) => format!("dereigster {pid}"),
			Self::FramerPoll => "poll".to_string(),
			Self::FramerReset => "reset".to_string(),
			Self::FramerAutopoll => "autopoll".to_string(),
			Self::FramerFile(sub) => format!("file {}", sub.operation_description()),
		}
	}

	/// Encodes the command for transmission.
	///
	/// Every line of [`Self::wire_text`] is base64-encoded and the result is split into
	/// `width`-character chunks. Framer commands mark every chunk but the last with a
	/// trailing backslash. The returned text ends with a newline.
	pub fn serialize(&self, width: usize) -> String {
		let encoded = self.wire_text().split('\n').map(|line| b64(line.as_bytes())).collect::<Vec<_>>().join("\n");
		let continuation = if self.is_framer() { "\\" } else { "" };
		let mut out = chunk(&encoded, width.max(1), continuation).join("\n");
		out.push('\n');
		out
	}
}

fn bash_quote(value: &str) -> Cow<'_, str> {
	let cleaned: Cow<'_, str> = if value.contains('\0') { Cow::Owned(value.replace('\0', "")) } else { Cow::Borrowed(value) };
	match shlex::try_quote(&cleaned) {
		Ok(quoted) => Cow::Owned(quoted.into_owned()),
		Err(_) => Cow::Borrowed("''"),
	}
}

/// Splits `text` into pieces of at most `width` characters, appending `continuation`
/// to every piece except the last.
pub(crate) fn chunk(text: &str, width: usize, continuation: &str) -> Vec<String> {
	let chars: Vec<char> = text.chars().collect();
	let mut parts = Vec::new();
	let mut start = 0;
	while start < chars.len() {
		let end = (start + width).min(chars.len());
		let mut part: String = chars[start..end].iter().collect();
		if end < chars.len() {
			part.push_str(continuation);
		}
		if !part.is_empty() {
			parts.push(part);
		}
		start = end;
	}
	parts
}
