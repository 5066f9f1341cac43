//! Drives a remote shell through an in-band line protocol.
//!
//! A [`ConductorChain`] holds one conductor per SSH hop. Each conductor owns a
//! command queue with a single command in flight: it bootstraps the remote side
//! (shell discovery, environment, payloads, Python check), starts the framer, and
//! from then on multiplexes logins, background jobs, polls and file operations over
//! the same connection. Hops nested inside a framed parent write through the
//! parent's framer, so the whole chain shares one transport.
//!
//! The transport itself is not part of this crate. Its owner feeds parsed protocol
//! events in (`handle_line`, `handle_command_end`, `handle_side_channel_output`, ...)
//! and receives [`ConductorEvent`]s back through a [`ConductorDelegate`].
//! [`ConductorHandle`] exposes the file operations as async functions.

pub mod chain;
pub mod command;
pub mod config;
mod context;
pub mod delegate;
pub mod endpoint;
pub mod error;
pub mod injection;
pub mod payload;
pub mod record;
pub mod registry;
pub mod remote_file;
pub mod ssh;
#[cfg(test)]
mod test_support;
pub mod transfer;

pub use chain::{
	AUTOPOLL_PID, ChainOptions, ConductorChain, ConductorParams, ConductorRecovery, NOTIF_PID, Nesting, NodeId, ReconnectionInfo, SharedChain,
	StateKind, TtyState, nesting_tree,
};
pub use command::{Command, DownloadChunk, FileSorting, FileSubcommand, SuggestionInputs};
pub use config::{ConductorConfig, PythonVersion};
pub use context::{JobCallback, PollCallback};
pub use delegate::{ConductorDelegate, ConductorEvent};
pub use endpoint::ConductorHandle;
pub use error::{ConfigError, FileError, RecordError, Result, SshArgsError, TransferError};
pub use injection::{DefaultInjector, ShellIntegrationInjector};
pub use payload::{Payload, PayloadPacker, RawFilePacker};
pub use record::ConductorRecord;
pub use registry::ConductorRegistry;
pub use remote_file::{FileKind, Permissions, RemoteFile};
pub use ssh::{ParsedSshArguments, SshIdentity};
pub use transfer::Transfer;
