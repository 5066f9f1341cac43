//! `tether`: command-line access to the scrollback search engine and the conductor wire format.

mod cli;
mod config;
mod search;
mod wire;

use std::io::Write;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::{Cli, Command};
use crate::config::TetherConfig;

/// Filter directives come from `TETHER_LOG`; `--verbose` raises the default to trace.
fn setup_tracing(verbose: bool) {
	let default = if verbose {
		"trace"
	} else {
		"tether=info,tether_conductor=info,tether_search=info,tether_worker=info"
	};
	let filter = EnvFilter::try_from_env("TETHER_LOG").unwrap_or_else(|_| EnvFilter::new(default));
	tracing_subscriber::registry()
		.with(filter)
		.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
		.init();
}

fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	setup_tracing(cli.verbose);

	let path = TetherConfig::resolve_path(cli.config);
	let config = TetherConfig::load(&path)?;

	let mut stdout = std::io::stdout().lock();
	match cli.command {
		Command::Search(args) => {
			let buffer = search::load_buffer(&args.file, args.width, args.max_lines)?;
			let request = search::build_request(&args, &config.search, &buffer);
			tracing::info!(query = %args.query, file = %args.file.display(), "cli.search.start");
			for result in search::run(buffer, request, &config.search)? {
				writeln!(stdout, "{result}")?;
			}
		}
		Command::Wire(args) => {
			let text = wire::render(&args, config.conductor.wire_chunk_width)?;
			stdout.write_all(text.as_bytes())?;
		}
	}
	Ok(())
}
