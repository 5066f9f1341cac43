use serde::{Deserialize, Serialize};

/// Seconds between the Unix epoch and 2001-01-01, the epoch of remote timestamps.
pub const REFERENCE_EPOCH_OFFSET: f64 = 978_307_200.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
	pub size: Option<u64>,
}

/// Access bits for the connected user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
	pub r: bool,
	pub w: bool,
	pub x: bool,
}

impl Default for Permissions {
	fn default() -> Self {
		Self { r: true, w: false, x: true }
	}
}

/// Enum payloads are wrapped as `{"_0": value}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Wrapped<T> {
	#[serde(rename = "_0")]
	inner: T,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
enum KindRepr {
	File(Wrapped<FileInfo>),
	Folder {},
	Host {},
	Symlink(Wrapped<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "KindRepr", into = "KindRepr")]
pub enum FileKind {
	File(FileInfo),
	Folder,
	Host,
	/// Target of the link.
	Symlink(String),
}

impl From<KindRepr> for FileKind {
	fn from(repr: KindRepr) -> Self {
		match repr {
			KindRepr::File(info) => Self::File(info.inner),
			KindRepr::Folder {} => Self::Folder,
			KindRepr::Host {} => Self::Host,
			KindRepr::Symlink(target) => Self::Symlink(target.inner),
		}
	}
}

impl From<FileKind> for KindRepr {
	fn from(kind: FileKind) -> Self {
		match kind {
			FileKind::File(inner) => Self::File(Wrapped { inner }),
			FileKind::Folder => Self::Folder {},
			FileKind::Host => Self::Host {},
			FileKind::Symlink(inner) => Self::Symlink(Wrapped { inner }),
		}
	}
}

/// A remote directory entry as reported by the framer.
///
/// `ctime` and `mtime` count seconds from 2001-01-01 UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
	pub kind: FileKind,
	pub absolute_path: String,
	#[serde(default)]
	pub permissions: Option<Permissions>,
	#[serde(default)]
	pub parent_permissions: Option<Permissions>,
	#[serde(default)]
	pub ctime: Option<f64>,
	#[serde(default)]
	pub mtime: Option<f64>,
}

impl RemoteFile {
	pub fn name(&self) -> &str {
		let trimmed = self.absolute_path.trim_end_matches('/');
		trimmed.rsplit('/').next().filter(|name| !name.is_empty()).unwrap_or("/")
	}

	pub fn parent_absolute_path(&self) -> Option<&str> {
		if self.absolute_path == "/" {
			return None;
		}
		let trimmed = self.absolute_path.trim_end_matches('/');
		match trimmed.rfind('/') {
			Some(0) => Some("/"),
			Some(i) => Some(&trimmed[..i]),
			None => Some(""),
		}
	}

	pub fn size(&self) -> Option<u64> {
		match &self.kind {
			FileKind::File(info) => info.size,
			_ => None,
		}
	}

	pub fn is_folder(&self) -> bool {
		matches!(self.kind, FileKind::Folder)
	}

	/// Modification time as seconds since the Unix epoch.
	pub fn mtime_unix(&self) -> Option<f64> {
		self.mtime.map(|t| t + REFERENCE_EPOCH_OFFSET)
	}
}
