//! `tether wire`: show how a conductor command travels to the remote side.

use anyhow::Context;
use serde_json::Value;
use tether_conductor::Command;

use crate::cli::WireArgs;

/// Parses JSON such as `{"cd":"/tmp"}`. Text that is not JSON is taken as a unit
/// variant name, so `quit` and `"quit"` are equivalent.
pub fn parse_command(text: &str) -> anyhow::Result<Command> {
	let value = serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.trim().to_string()));
	serde_json::from_value(value).with_context(|| format!("not a conductor command: {text}"))
}

pub fn render(args: &WireArgs, width: usize) -> anyhow::Result<String> {
	let command = parse_command(&args.command)?;
	tracing::debug!(command = %command.operation_description(), framer = command.is_framer(), "cli.wire.parsed");
	Ok(if args.raw {
		let mut text = command.wire_text();
		text.push('\n');
		text
	} else {
		command.serialize(width)
	})
}
