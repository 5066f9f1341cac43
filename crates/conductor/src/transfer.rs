//! Chunked uploads and downloads built from the remote file operations.
//!
//! Transfers move [`ConductorConfig::transfer_chunk_size`] bytes per command so a
//! large file never monopolizes the connection. A [`Transfer`] is shared with the
//! caller, who can watch its counters and stop it between chunks.
//!
//! [`ConductorConfig::transfer_chunk_size`]: crate::config::ConductorConfig::transfer_chunk_size

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::command::DownloadChunk;
use crate::endpoint::ConductorHandle;
use crate::error::{FileError, TransferError};

/// Progress and cancellation of one transfer.
#[derive(Debug, Clone, Default)]
pub struct Transfer {
	inner: Arc<TransferState>,
}

#[derive(Debug, Default)]
struct TransferState {
	stop: CancellationToken,
	file_size: AtomicU64,
	transferred: AtomicU64,
}

impl Transfer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Stops the transfer before its next chunk.
	pub fn stop(&self) {
		self.inner.stop.cancel();
	}

	pub fn is_stopped(&self) -> bool {
		self.inner.stop.is_cancelled()
	}

	/// Total bytes expected. Grows as data arrives when the remote size is unknown.
	pub fn file_size(&self) -> u64 {
		self.inner.file_size.load(Ordering::Acquire)
	}

	pub fn transferred(&self) -> u64 {
		self.inner.transferred.load(Ordering::Acquire)
	}

	fn set_file_size(&self, size: u64) {
		self.inner.file_size.store(size, Ordering::Release);
	}

	fn did_transfer(&self, bytes: u64, grow: bool) {
		if grow {
			self.inner.file_size.fetch_add(bytes, Ordering::AcqRel);
		}
		let total = self.inner.transferred.fetch_add(bytes, Ordering::AcqRel) + bytes;
		tracing::trace!(total, size = self.file_size(), "conductor.transfer.progress");
	}

	fn check(&self) -> Result<(), FileError> {
		if self.is_stopped() {
			return Err(FileError::TransferCanceled);
		}
		Ok(())
	}
}

/// Splits a remote path into its parent and last component.
fn split_path(path: &str) -> (&str, &str) {
	match path.rfind('/') {
		Some(0) => ("/", &path[1..]),
		Some(i) => (&path[..i], &path[i + 1..]),
		None => ("", path),
	}
}

impl ConductorHandle {
	fn transfer_limits(&self) -> (usize, usize) {
		self.with(|chain, _| {
			let config = chain.config();
			(config.transfer_chunk_size, config.max_name_probes)
		})
	}

	/// Uploads `data` to `remote_path`, or to `remote_path (N)` when that name is taken.
	///
	/// The bytes go to a temporary sibling first, which is renamed once complete and
	/// removed if anything fails. Returns the name the file ended up with.
	pub async fn upload(&self, data: &[u8], remote_path: &str, transfer: &Transfer) -> Result<String, TransferError> {
		let temp = format!("{remote_path}.uploading-{}", Uuid::new_v4());
		tracing::debug!(path = remote_path, size = data.len(), "conductor.upload");
		let result = self.upload_through(&temp, data, remote_path, transfer).await;
		if let Err(error) = &result {
			tracing::debug!(path = remote_path, %error, "conductor.upload_failed");
			if let Err(error) = self.delete(&temp, false).await {
				tracing::debug!(path = %temp, %error, "conductor.upload_cleanup_failed");
			}
		}
		result
	}

	/// Reads `local` and uploads it like [`Self::upload`].
	pub async fn upload_file(&self, local: &Path, remote_path: &str, transfer: &Transfer) -> Result<String, TransferError> {
		let data = tokio::fs::read(local).await?;
		self.upload(&data, remote_path, transfer).await
	}

	async fn upload_through(&self, temp: &str, data: &[u8], remote_path: &str, transfer: &Transfer) -> Result<String, TransferError> {
		let (chunk_size, max_probes) = self.transfer_limits();
		self.create(temp, &[]).await?;
		transfer.set_file_size(data.len() as u64);
		for chunk in data.chunks(chunk_size) {
			transfer.check()?;
			self.append(temp, chunk).await?;
			transfer.did_transfer(chunk.len() as u64, false);
		}
		let name = self.free_name(remote_path, max_probes).await?;
		let (parent, last) = split_path(&name);
		self.mv(temp, parent, last).await?;
		Ok(name)
	}

	/// First of `path`, `path (2)`, `path (3)`, ... that does not exist yet.
	async fn free_name(&self, path: &str, max_probes: usize) -> Result<String, TransferError> {
		for attempt in 0..max_probes {
			let candidate = match attempt {
				0 => path.to_string(),
				n => format!("{path} ({})", n + 1),
			};
			if self.stat(&candidate, false).await.is_err() {
				return Ok(candidate);
			}
		}
		Err(TransferError::TooManyProbes(max_probes))
	}

	/// Downloads `remote_path` into `local` and returns the number of bytes written.
	///
	/// A folder is archived remotely, the archive downloaded in its place, and the
	/// remote archive removed afterwards.
	pub async fn download_to(&self, remote_path: &str, local: &Path, transfer: &Transfer) -> Result<u64, TransferError> {
		let info = self.stat(remote_path, false).await?;
		if !info.is_folder() {
			return self.fetch_chunks(remote_path, info.size(), local, transfer).await;
		}
		let archive = self.zip(remote_path).await?;
		let archive = archive.trim();
		tracing::debug!(path = remote_path, archive, "conductor.download_folder");
		let result = match self.stat(archive, false).await {
			Ok(zipped) => self.fetch_chunks(archive, zipped.size(), local, transfer).await,
			Err(error) => Err(error.into()),
		};
		if let Err(error) = self.delete(archive, false).await {
			tracing::debug!(archive, %error, "conductor.download_cleanup_failed");
		}
		result
	}

	async fn fetch_chunks(&self, remote_path: &str, size: Option<u64>, local: &Path, transfer: &Transfer) -> Result<u64, TransferError> {
		let (chunk_size, _) = self.transfer_limits();
		transfer.set_file_size(size.unwrap_or(0));
		let mut file = tokio::fs::File::create(local).await?;
		let mut offset = 0;
		loop {
			transfer.check()?;
			let chunk = DownloadChunk {
				offset,
				size: chunk_size as u64,
			};
			let data = self.download(remote_path, Some(chunk), None).await?;
			if data.is_empty() {
				break;
			}
			file.write_all(&data).await?;
			let len = data.len() as u64;
			transfer.did_transfer(len, size.is_none());
			offset += len;
		}
		file.flush().await?;
		tracing::debug!(path = remote_path, bytes = offset, "conductor.download");
		Ok(offset)
	}
}
