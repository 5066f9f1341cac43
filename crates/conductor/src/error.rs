//! Error types for remote file access, transfers, and persisted conductors.

use thiserror::Error;

/// Failure of a single remote file operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FileError {
	/// The command was aborted, canceled, or the session went away.
	#[error("connection to the remote host was closed")]
	ConnectionClosed,

	/// The remote side reported a nonzero status.
	#[error("remote file not found")]
	FileNotFound,

	/// The reply could not be decoded.
	#[error("internal error: {0}")]
	Internal(String),

	/// A transfer was stopped by its owner.
	#[error("transfer canceled")]
	TransferCanceled,
}

impl FileError {
	/// Maps a negative status to a closed connection and a positive one to a missing file.
	pub fn from_status(status: i32) -> Option<Self> {
		match status {
			0 => None,
			s if s < 0 => Some(Self::ConnectionClosed),
			_ => Some(Self::FileNotFound),
		}
	}
}

/// Failure of an upload or download.
#[derive(Debug, Error)]
pub enum TransferError {
	#[error(transparent)]
	File(#[from] FileError),

	/// Every candidate destination name was already taken.
	#[error("no free destination name after {0} attempts")]
	TooManyProbes(usize),

	/// The local side of the transfer failed.
	#[error("local I/O error: {0}")]
	Io(#[from] std::io::Error),
}

/// Failure to encode or restore a persisted conductor chain.
#[derive(Debug, Error)]
pub enum RecordError {
	#[error("record is not valid JSON: {0}")]
	Json(#[from] serde_json::Error),

	#[error("terminal configuration is not valid base64: {0}")]
	Base64(#[from] base64::DecodeError),

	/// The node identifier does not belong to the chain.
	#[error("unknown conductor node")]
	UnknownNode,
}

/// An `ssh` argument string that cannot be interpreted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SshArgsError {
	/// Quotes were not balanced.
	#[error("unbalanced quotes in ssh arguments")]
	Unbalanced,

	/// No destination host was given.
	#[error("ssh arguments name no destination")]
	MissingDestination,

	/// An option that takes a value was last.
	#[error("option -{0} requires an argument")]
	MissingValue(char),

	#[error("invalid port: {0}")]
	InvalidPort(String),
}

/// Invalid `[conductor]` settings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
	/// A Python version did not look like `major.minor`.
	#[error("invalid python version: {0:?} (expected e.g. \"3.7\")")]
	InvalidPythonVersion(String),

	/// A size or width was zero.
	#[error("{0} must be greater than zero")]
	Zero(&'static str),

	/// The framer script has no `#{{SUB}}` marker.
	#[error("framer script lacks the #{{SUB}} substitution marker")]
	MissingSubstitution,
}

pub type Result<T> = std::result::Result<T, FileError>;
