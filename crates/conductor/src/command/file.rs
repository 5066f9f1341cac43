use std::fmt;

use serde::{Deserialize, Serialize};

use super::{b64, nonempty_b64, string_or_hex};

/// Listing order requested from `ls`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSorting {
	ByDate,
	ByName,
}

impl FileSorting {
	fn wire(self) -> &'static str {
		match self {
			Self::ByDate => "d",
			Self::ByName => "n",
		}
	}
}

impl fmt::Display for FileSorting {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::ByDate => "byDate",
			Self::ByName => "byName",
		})
	}
}

/// A byte range of a remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DownloadChunk {
	pub offset: u64,
	pub size: u64,
}

/// What a completion-suggestion request asks the remote side for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SuggestionInputs {
	pub prefix: String,
	pub directories: Vec<String>,
	pub working_directory: Option<String>,
	/// Only suggest executables.
	pub executable: bool,
	pub limit: usize,
}

/// Operations understood by the framer's `file` command.
///
/// Paths and contents are raw bytes; they are base64-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSubcommand {
	Ls { path: Vec<u8>, sorting: FileSorting },
	/// `unique_id` only identifies the request for cancellation and never reaches the wire.
	Fetch { path: Vec<u8>, chunk: Option<DownloadChunk>, unique_id: Option<String> },
	Stat { path: Vec<u8> },
	FetchSuggestions { inputs: SuggestionInputs },
	Rm { path: Vec<u8>, recursive: bool },
	Ln { source: Vec<u8>, symlink: Vec<u8> },
	Mv { source: Vec<u8>, dest: Vec<u8> },
	Mkdir { path: Vec<u8> },
	Create { path: Vec<u8>, content: Vec<u8> },
	Append { path: Vec<u8>, content: Vec<u8> },
	/// `date` is seconds since the Unix epoch.
	Utime { path: Vec<u8>, date: f64 },
	Chmod { path: Vec<u8>, r: bool, w: bool, x: bool },
	Zip { path: Vec<u8> },
}

impl FileSubcommand {
	pub fn wire_text(&self) -> String {
		match self {
			Self::Ls { path, sorting } => format!("ls\n{}\n{}", nonempty_b64(path), sorting.wire()),
			Self::Fetch { path, chunk: Some(chunk), .. } => {
				format!("fetch\n{}\n{}\n{}", nonempty_b64(path), chunk.offset, chunk.size)
			}
			Self::Fetch { path, chunk: None, .. } => format!("fetch\n{}", nonempty_b64(path)),
			Self::Zip { path } => format!("zip\n{}", nonempty_b64(path)),
			Self::Stat { path } => format!("stat\n{}", nonempty_b64(path)),
			Self::FetchSuggestions { inputs } => {
				let mut dirs = inputs.directories.iter().map(|d| b64(d.as_bytes())).collect::<Vec<_>>().join(" ");
				if dirs.is_empty() {
					dirs = " ".to_string();
				}
				[
					"suggest".to_string(),
					nonempty_b64(inputs.prefix.as_bytes()),
					dirs,
					nonempty_b64(inputs.working_directory.as_deref().unwrap_or("//").as_bytes()),
					if inputs.executable { "rx" } else { "r" }.to_string(),
					inputs.limit.to_string(),
				]
				.join("\n")
			}
			Self::Rm { path, recursive } => {
				let mut args = vec!["rm".to_string()];
				if *recursive {
					args.push("-r".to_string());
				}
				args.push(nonempty_b64(path));
				args.join("\n")
			}
			Self::Ln { source, symlink } => format!("ln\n{}\n{}", nonempty_b64(source), nonempty_b64(symlink)),
			Self::Mv { source, dest } => format!("mv\n{}\n{}", nonempty_b64(source), nonempty_b64(dest)),
			Self::Mkdir { path } => format!("mkdir\n{}", nonempty_b64(path)),
			Self::Create { path, content } => format!("create\n{}\n{}", nonempty_b64(path), nonempty_b64(content)),
			Self::Append { path, content } => format!("append\n{}\n{}", nonempty_b64(path), nonempty_b64(content)),
			Self::Utime { path, date } => format!("utime\n{}\n{date:?}", nonempty_b64(path)),
			Self::Chmod { path, r, w, x } => {
				let mode: String = [(*r, 'r'), (*w, 'w'), (*x, 'x')].iter().map(|&(on, c)| if on { c } else { '-' }).collect();
				format!("chmod-u\n{}\n{mode}", nonempty_b64(path))
			}
		}
	}

	pub fn operation_description(&self) -> String {
		match self {
			Self::Ls { path, sorting } => format!("ls {} {sorting}", string_or_hex(path)),
			Self::Fetch { path, chunk: Some(chunk), .. } => {
				format!("fetch {} offset={} size={}", string_or_hex(path), chunk.offset, chunk.size)
			}
			Self::Fetch { path, chunk: None, .. } => format!("fetch {}", string_or_hex(path)),
			Self::Zip { path } => format!("zip {}", string_or_hex(path)),
			Self::Stat { path } => format!("stat {}", string_or_hex(path)),
			Self::FetchSuggestions { inputs } => format!("fetchSuggestions {inputs:?}"),
			Self::Rm { path, recursive } => format!("rm {}{}", if *recursive { "-r " } else { "" }, string_or_hex(path)),
			Self::Ln { source, symlink } => format!("ln -s {} {}", string_or_hex(source), string_or_hex(symlink)),
			Self::Mv { source, dest } => format!("mv {} {}", string_or_hex(source), string_or_hex(dest)),
			Self::Mkdir { path } => format!("mkdir {}", string_or_hex(path)),
			Self::Create { path, content } => format!("create {} length={} bytes", string_or_hex(path), content.len()),
			Self::Append { path, content } => format!("append {} length={} bytes", string_or_hex(path), content.len()),
			Self::Utime { path, date } => format!("utime {} {date}", string_or_hex(path)),
			Self::Chmod { path, r, w, x } => format!("chmod {} r={r} w={w} x={x}", string_or_hex(path)),
		}
	}

	/// The cancellation key of a fetch.
	pub fn unique_id(&self) -> Option<&str> {
		match self {
			Self::Fetch { unique_id, .. } => unique_id.as_deref(),
			_ => None,
		}
	}
}
