//! Async remote file access through a framed conductor.
//!
//! Each operation queues a framer `file` command under the chain's lock, releases
//! the lock, and awaits the reply. A negative reply status means the command was
//! aborted or canceled; a positive one is reported as a missing file.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::chain::{ConductorChain, NodeId, SharedChain};
use crate::command::{Command, DownloadChunk, FileSorting, FileSubcommand, SuggestionInputs};
use crate::error::{FileError, Result};
use crate::remote_file::{Permissions, RemoteFile};
use crate::ssh::SshIdentity;

/// One conductor of a chain, usable from async code.
#[derive(Debug, Clone)]
pub struct ConductorHandle {
	chain: SharedChain,
	node: NodeId,
}

impl ConductorHandle {
	pub fn new(chain: SharedChain, node: NodeId) -> Self {
		Self { chain, node }
	}

	pub fn chain(&self) -> &SharedChain {
		&self.chain
	}

	pub fn node(&self) -> NodeId {
		self.node
	}

	/// Runs `f` with the chain locked.
	pub fn with<R>(&self, f: impl FnOnce(&mut ConductorChain, NodeId) -> R) -> R {
		f(&mut self.chain.lock(), self.node)
	}

	pub fn identity(&self) -> SshIdentity {
		self.with(|chain, id| chain.identity(id).clone())
	}

	pub fn framing(&self) -> bool {
		self.with(|chain, id| chain.framing(id))
	}

	pub fn same_as(&self, other: &ConductorHandle) -> bool {
		self.node == other.node && Arc::ptr_eq(&self.chain, &other.chain)
	}

	async fn perform(&self, subcommand: FileSubcommand, high_priority: bool) -> Result<String> {
		tracing::trace!(node = %self.node, operation = %subcommand.operation_description(), "conductor.file");
		let reply = self.chain.lock().framer_file(self.node, subcommand, high_priority);
		let (output, status) = reply.await.map_err(|_| FileError::ConnectionClosed)?;
		match FileError::from_status(status) {
			Some(error) => {
				tracing::debug!(node = %self.node, status, "conductor.file_failed");
				Err(error)
			}
			None => Ok(output),
		}
	}

	async fn perform_stat_reply(&self, subcommand: FileSubcommand, high_priority: bool) -> Result<RemoteFile> {
		let json = self.perform(subcommand, high_priority).await?;
		decode(&json)
	}

	pub async fn list_files(&self, path: &str, sorting: FileSorting) -> Result<Vec<RemoteFile>> {
		let json = self.perform(FileSubcommand::Ls { path: path.into(), sorting }, false).await?;
		decode(&json)
	}

	/// Fetches a file or, with `chunk`, a byte range of it.
	pub async fn download(&self, path: &str, chunk: Option<DownloadChunk>, unique_id: Option<String>) -> Result<Vec<u8>> {
		let subcommand = FileSubcommand::Fetch {
			path: path.into(),
			chunk,
			unique_id,
		};
		let encoded = self.perform(subcommand, false).await?;
		STANDARD.decode(encoded.trim()).map_err(|error| FileError::Internal(error.to_string()))
	}

	/// Cancels queued fetches tagged `unique_id`. Their callers see [`FileError::ConnectionClosed`].
	pub fn cancel_download(&self, unique_id: &str) -> usize {
		self.with(|chain, id| {
			chain.cancel_enqueued(id, |command| match command {
				Command::FramerFile(sub) => sub.unique_id() == Some(unique_id),
				_ => false,
			})
		})
	}

	/// Archives a remote folder and returns the archive's path.
	pub async fn zip(&self, path: &str) -> Result<String> {
		self.perform(FileSubcommand::Zip { path: path.into() }, false).await
	}

	pub async fn stat(&self, path: &str, high_priority: bool) -> Result<RemoteFile> {
		self.perform_stat_reply(FileSubcommand::Stat { path: path.into() }, high_priority).await
	}

	/// Whether `path` exists. Any failure counts as absent.
	pub async fn exists(&self, path: &str) -> bool {
		self.stat(path, true).await.is_ok()
	}

	/// Asks for completions, canceling any suggestion request still queued.
	pub async fn suggestions(&self, inputs: SuggestionInputs) -> Result<Vec<String>> {
		self.with(|chain, id| {
			chain.cancel_enqueued(id, |command| {
				matches!(command, Command::FramerFile(FileSubcommand::FetchSuggestions { .. }))
			})
		});
		let json = self.perform(FileSubcommand::FetchSuggestions { inputs }, true).await?;
		decode(&json)
	}

	/// Cached suggestions for `inputs`. Errors are cached as no suggestions; an unframed
	/// conductor has none.
	pub async fn fetch_suggestions(&self, inputs: SuggestionInputs) -> Vec<String> {
		let cached = self.with(|chain, id| {
			if !chain.framing(id) {
				return Some(Vec::new());
			}
			chain.cached_suggestions(id, &inputs)
		});
		if let Some(suggestions) = cached {
			return suggestions;
		}
		let suggestions = match self.suggestions(inputs.clone()).await {
			Ok(suggestions) => suggestions,
			Err(error) => {
				tracing::debug!(node = %self.node, %error, "conductor.suggestions_failed");
				Vec::new()
			}
		};
		self.with(|chain, id| chain.cache_suggestions(id, inputs, suggestions.clone()));
		suggestions
	}

	pub async fn delete(&self, path: &str, recursive: bool) -> Result<()> {
		self.perform(FileSubcommand::Rm { path: path.into(), recursive }, false).await.map(drop)
	}

	/// Creates `symlink` pointing at `source`.
	pub async fn ln(&self, source: &str, symlink: &str) -> Result<RemoteFile> {
		let subcommand = FileSubcommand::Ln {
			source: source.into(),
			symlink: symlink.into(),
		};
		self.perform_stat_reply(subcommand, false).await
	}

	pub async fn mv(&self, source: &str, new_parent: &str, new_name: &str) -> Result<RemoteFile> {
		let dest = join_path(new_parent, new_name);
		let subcommand = FileSubcommand::Mv {
			source: source.into(),
			dest: dest.into_bytes(),
		};
		self.perform_stat_reply(subcommand, false).await
	}

	pub async fn mkdir(&self, path: &str) -> Result<()> {
		self.perform(FileSubcommand::Mkdir { path: path.into() }, false).await.map(drop)
	}

	pub async fn create(&self, path: &str, content: &[u8]) -> Result<()> {
		self.perform(create(path, content), false).await.map(drop)
	}

	pub async fn append(&self, path: &str, content: &[u8]) -> Result<()> {
		let subcommand = FileSubcommand::Append {
			path: path.into(),
			content: content.to_vec(),
		};
		self.perform(subcommand, false).await.map(drop)
	}

	/// Creates or truncates `path` with `content` and returns its new metadata.
	pub async fn replace(&self, path: &str, content: &[u8]) -> Result<RemoteFile> {
		self.perform_stat_reply(create(path, content), false).await
	}

	/// `date` is seconds since the Unix epoch.
	pub async fn set_modification_date(&self, path: &str, date: f64) -> Result<RemoteFile> {
		self.perform_stat_reply(FileSubcommand::Utime { path: path.into(), date }, false).await
	}

	pub async fn chmod(&self, path: &str, permissions: Permissions) -> Result<RemoteFile> {
		let Permissions { r, w, x } = permissions;
		self.perform_stat_reply(FileSubcommand::Chmod { path: path.into(), r, w, x }, false).await
	}
}

fn create(path: &str, content: &[u8]) -> FileSubcommand {
	FileSubcommand::Create {
		path: path.into(),
		content: content.to_vec(),
	}
}

fn decode<T: serde::de::DeserializeOwned>(json: &str) -> Result<T> {
	serde_json::from_str(json).map_err(|error| FileError::Internal(format!("server returned garbage: {error}")))
}

pub(crate) fn join_path(parent: &str, name: &str) -> String {
	match (parent, name) {
		("", name) => name.to_string(),
		(parent, name) if parent.ends_with('/') => format!("{parent}{name}"),
		(parent, name) => format!("{parent}/{name}"),
	}
}
