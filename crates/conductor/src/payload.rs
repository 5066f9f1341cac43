use serde::{Deserialize, Serialize};

/// A local file to copy to the remote host before the shell starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
	pub path: String,
	pub destination: String,
}

/// Rewrites a destination so the remote side resolves it under `$HOME`.
///
/// `~` and `~/` become `/$HOME`, a relative `~/x` becomes `/$HOME/x`, and trailing
/// slashes are dropped from anything but `/`.
pub fn normalize_destination(destination: &str) -> String {
	let mut tweaked = if destination == "~/" || destination == "~" {
		"/$HOME".to_string()
	} else if !destination.starts_with('/') {
		let rest: String = destination.chars().skip(2).collect();
		format!("/$HOME/{rest}")
	} else {
		destination.to_string()
	};
	while tweaked != "/" && tweaked.ends_with('/') {
		tweaked.pop();
	}
	tweaked
}

/// Turns payloads into `(bytes, destination)` uploads.
pub trait PayloadPacker: Send + Sync {
	fn pack(&self, payloads: &[Payload]) -> Vec<(Vec<u8>, String)>;
}

/// Sends every file's bytes as they are. Unreadable files are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawFilePacker;

impl PayloadPacker for RawFilePacker {
	fn pack(&self, payloads: &[Payload]) -> Vec<(Vec<u8>, String)> {
		payloads
			.iter()
			.filter_map(|payload| match std::fs::read(&payload.path) {
				Ok(data) => Some((data, payload.destination.clone())),
				Err(error) => {
					tracing::warn!(path = %payload.path, %error, "conductor.payload_unreadable");
					None
				}
			})
			.collect()
	}
}
