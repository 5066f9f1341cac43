//! The TOML configuration file.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tether_conductor::{ConductorConfig, ConfigError};
use tether_search::SearchConfig;
use thiserror::Error;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "TETHER_CONFIG";
const DEFAULT_PATH: &str = "tether.toml";

#[derive(Debug, Error)]
pub enum LoadError {
	#[error("failed to read {}: {source}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse {}: {source}", path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("invalid [conductor] table: {0}")]
	Conductor(#[from] ConfigError),
}

/// `[conductor]` and `[search]` tables. Missing tables and keys take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TetherConfig {
	pub conductor: ConductorConfig,
	pub search: SearchConfig,
}

impl TetherConfig {
	/// `explicit`, else `$TETHER_CONFIG`, else `tether.toml` in the working directory.
	pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
		explicit
			.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
			.unwrap_or_else(|| PathBuf::from(DEFAULT_PATH))
	}

	/// Loads and validates `path`. A missing file yields the defaults.
	pub fn load(path: &Path) -> Result<Self, LoadError> {
		let text = match std::fs::read_to_string(path) {
			Ok(text) => text,
			Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
				tracing::debug!(path = %path.display(), "config.missing");
				return Ok(Self::default());
			}
			Err(source) => {
				return Err(LoadError::Read {
					path: path.to_path_buf(),
					source,
				});
			}
		};
		let config: Self = toml::from_str(&text).map_err(|source| LoadError::Parse {
			path: path.to_path_buf(),
			source,
		})?;
		config.conductor.validate()?;
		tracing::debug!(path = %path.display(), "config.loaded");
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use tether_conductor::PythonVersion;

	use super::*;

	fn write(text: &str) -> (tempfile::TempDir, PathBuf) {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("tether.toml");
		std::fs::write(&path, text).unwrap();
		(dir, path)
	}

	#[test]
	fn missing_file_is_default() {
		let dir = tempfile::tempdir().unwrap();
		let config = TetherConfig::load(&dir.path().join("absent.toml")).unwrap();
		assert_eq!(config, TetherConfig::default());
	}

	#[test]
	fn tables_override_defaults() {
		let (_dir, path) = write(
			r#"
[conductor]
minimum_python = "3.9"
autopoll = false

[search]
max_queue_size = 4
queue_name = "find"
"#,
		);
		let config = TetherConfig::load(&path).unwrap();
		assert_eq!(config.conductor.minimum_python, PythonVersion::new(3, 9));
		assert!(!config.conductor.autopoll);
		assert_eq!(config.conductor.wire_chunk_width, 128);
		assert_eq!(config.search.max_queue_size, Some(4));
		assert_eq!(config.search.queue_name, "find");
	}

	#[test]
	fn unknown_keys_are_rejected() {
		let (_dir, path) = write("[search]\nqueue = \"x\"\n");
		assert!(matches!(TetherConfig::load(&path), Err(LoadError::Parse { .. })));
	}

	#[test]
	fn invalid_conductor_settings_are_rejected() {
		let (_dir, path) = write("[conductor]\nwire_chunk_width = 0\n");
		assert!(matches!(TetherConfig::load(&path), Err(LoadError::Conductor(ConfigError::Zero("wire_chunk_width")))));
	}

	#[test]
	fn explicit_path_wins() {
		assert_eq!(TetherConfig::resolve_path(Some("a.toml".into())), PathBuf::from("a.toml"));
	}
}
