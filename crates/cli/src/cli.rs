use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tether_search::CaseSensitivity;

#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(about = "Scrollback search and remote-conductor wire tools")]
#[command(version)]
pub struct Cli {
	/// Configuration file (defaults to $TETHER_CONFIG, then ./tether.toml)
	#[arg(long, short = 'c', value_name = "PATH", global = true)]
	pub config: Option<PathBuf>,

	/// Log everything at trace level
	#[arg(long, short = 'v', global = true)]
	pub verbose: bool,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Search a text file as if it were terminal scrollback and print each match as y:x-y:x
	Search(SearchArgs),
	/// Print the wire encoding of a conductor command
	Wire(WireArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct SearchArgs {
	/// File whose lines fill the scrollback
	pub file: PathBuf,

	pub query: String,

	/// Search from the end of the buffer towards the start
	#[arg(long)]
	pub backwards: bool,

	/// Treat the query as a regular expression
	#[arg(long)]
	pub regex: bool,

	/// Overrides the case handling of `search.default_mode`
	#[arg(long, value_enum)]
	pub case: Option<CaseArg>,

	/// Report at most one match per line
	#[arg(long)]
	pub one_per_line: bool,

	/// Keep only the last N rows of scrollback
	#[arg(long, value_name = "N")]
	pub max_lines: Option<usize>,

	/// Terminal width used to wrap long lines
	#[arg(long, default_value_t = 80)]
	pub width: usize,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseArg {
	Sensitive,
	Insensitive,
	/// Sensitive only when the query has an uppercase letter
	Smart,
}

impl From<CaseArg> for CaseSensitivity {
	fn from(case: CaseArg) -> Self {
		match case {
			CaseArg::Sensitive => Self::Sensitive,
			CaseArg::Insensitive => Self::Insensitive,
			CaseArg::Smart => Self::Smart,
		}
	}
}

#[derive(clap::Args, Debug, Clone)]
pub struct WireArgs {
	/// Command as JSON, e.g. '{"cd":"/tmp"}' or '"get_shell"'. A bare word names a command without fields.
	pub command: String,

	/// Print the plain command text instead of the encoded lines
	#[arg(long)]
	pub raw: bool,
}
