//! Error types for search setup.

use thiserror::Error;

/// Errors that prevent a search operation from being constructed.
#[derive(Debug, Error)]
pub enum SearchError {
	/// Start or stop positions do not exist in the snapshot.
	#[error("search positions cannot be resolved in this snapshot")]
	Unresolvable,

	/// The query is not a valid regular expression.
	#[error("invalid search pattern: {0}")]
	InvalidPattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, SearchError>;
