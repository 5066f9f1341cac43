use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Placeholder in [`ConductorConfig::framer_script`] replaced by per-node settings.
pub const SUBSTITUTION_MARKER: &str = "#{SUB}";

/// A `major.minor` interpreter version, ordered numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PythonVersion {
	pub major: u32,
	pub minor: u32,
}

impl PythonVersion {
	pub const fn new(major: u32, minor: u32) -> Self {
		Self { major, minor }
	}
}

impl fmt::Display for PythonVersion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.major, self.minor)
	}
}

impl TryFrom<String> for PythonVersion {
	type Error = ConfigError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		let invalid = || ConfigError::InvalidPythonVersion(value.clone());
		let (major, minor) = value.split_once('.').ok_or_else(invalid)?;
		Ok(Self {
			major: major.parse().map_err(|_| invalid())?,
			minor: minor.parse().map_err(|_| invalid())?,
		})
	}
}

impl From<PythonVersion> for String {
	fn from(version: PythonVersion) -> Self {
		version.to_string()
	}
}

/// The `[conductor]` table of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConductorConfig {
	/// Oldest remote Python that can host the framer.
	pub minimum_python: PythonVersion,
	/// Characters per line of an encoded outbound command.
	pub wire_chunk_width: usize,
	/// Bytes per chunk when uploading or downloading.
	pub transfer_chunk_size: usize,
	/// Alternative names tried before an upload gives up.
	pub max_name_probes: usize,
	/// Ask the framer to push process output without being polled.
	pub autopoll: bool,
	pub uname_command: String,
	/// Framer source. Must contain [`SUBSTITUTION_MARKER`].
	pub framer_script: String,
	/// Body of the wrapper function that performs an SSH jump.
	pub jump_script: String,
	/// Local directory holding shell-integration scripts to upload.
	pub shell_integration_dir: Option<PathBuf>,
	/// Start the framer with verbose logging.
	pub verbose_framer: bool,
}

impl Default for ConductorConfig {
	fn default() -> Self {
		Self {
			minimum_python: PythonVersion::new(3, 7),
			wire_chunk_width: 128,
			transfer_chunk_size: 1024,
			max_name_probes: 100,
			autopoll: true,
			uname_command: "uname -a".to_string(),
			framer_script: format!("#!/usr/bin/env python3\n{SUBSTITUTION_MARKER}\n"),
			jump_script: "exec ssh \"$@\"".to_string(),
			shell_integration_dir: None,
			verbose_framer: false,
		}
	}
}

impl ConductorConfig {
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.wire_chunk_width == 0 {
			return Err(ConfigError::Zero("wire_chunk_width"));
		}
		if self.transfer_chunk_size == 0 {
			return Err(ConfigError::Zero("transfer_chunk_size"));
		}
		if self.max_name_probes == 0 {
			return Err(ConfigError::Zero("max_name_probes"));
		}
		if !self.framer_script.contains(SUBSTITUTION_MARKER) {
			return Err(ConfigError::MissingSubstitution);
		}
		Ok(())
	}

	/// The framer source with per-node settings substituted in.
	pub fn framer_source(&self, depth: i32) -> String {
		let mut custom = format!("DEPTH={depth}");
		if self.verbose_framer {
			custom.push_str("\nVERBOSE=1\n");
		}
		self.framer_script.replace(SUBSTITUTION_MARKER, &custom)
	}
}
