//! `tether search`: load a file into a scrollback buffer and run one search to completion.

use std::path::Path;

use anyhow::Context;
use tether_search::{
	CaseSensitivity, Direction, FindMode, LineBuffer, SearchConfig, SearchEngine, SearchOperation, SearchRequest, SearchResult,
};

use crate::cli::SearchArgs;

/// Reads `path` into a buffer of the given width, keeping at most `max_rows` rows.
pub fn load_buffer(path: &Path, width: usize, max_rows: Option<usize>) -> anyhow::Result<LineBuffer> {
	let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
	let mut buffer = LineBuffer::new(width.max(1));
	buffer.set_max_rows(max_rows);
	for line in text.lines() {
		buffer.append_line(line);
	}
	tracing::debug!(path = %path.display(), lines = buffer.num_lines(), rows = buffer.num_rows(), "cli.search.loaded");
	Ok(buffer)
}

/// The request `args` describes against `buffer`. The whole buffer is covered in one pass.
pub fn build_request(args: &SearchArgs, config: &SearchConfig, buffer: &LineBuffer) -> SearchRequest {
	let (direction, start) = if args.backwards {
		(Direction::Backwards, buffer.last_position())
	} else {
		(Direction::Forwards, buffer.first_position())
	};
	let mut request = SearchRequest::new(args.query.clone(), direction, buffer.abs_coord(start));
	request.start_position = Some(start);
	request.max_queue_size = config.max_queue_size;
	request.limit_results_to_one_per_raw_line = args.one_per_line;
	let (case, regex) = mode_parts(config.default_mode);
	request.regex = args.regex || regex;
	request.case_sensitivity = args.case.map_or(case, CaseSensitivity::from);
	request
}

fn mode_parts(mode: FindMode) -> (CaseSensitivity, bool) {
	match mode {
		FindMode::CaseSensitiveSubstring => (CaseSensitivity::Sensitive, false),
		FindMode::CaseInsensitiveSubstring => (CaseSensitivity::Insensitive, false),
		FindMode::CaseSensitiveRegex => (CaseSensitivity::Sensitive, true),
		FindMode::CaseInsensitiveRegex => (CaseSensitivity::Insensitive, true),
		FindMode::SmartCase => (CaseSensitivity::Smart, false),
	}
}

/// Runs `request` on a fresh queue and collects every result in the order found.
pub fn run(buffer: LineBuffer, request: SearchRequest, config: &SearchConfig) -> anyhow::Result<Vec<SearchResult>> {
	let queue = config.spawn_queue().context("failed to start the search queue")?;
	let mut engine = SearchEngine::new(queue);
	if engine.begin_search(buffer.clone(), request.clone()).is_none() {
		return match SearchOperation::new(buffer, request) {
			Err(error) => Err(error.into()),
			Ok(_) => Err(anyhow::anyhow!("search could not start")),
		};
	}
	let mut results = Vec::new();
	while let Some(output) = engine.blocking_consume() {
		results.extend(output.results);
		if output.finished {
			break;
		}
		engine.resume_if_oversize();
	}
	tracing::debug!(count = results.len(), "cli.search.finished");
	Ok(results)
}
