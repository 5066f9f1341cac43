//! Incremental search over a scrollback buffer that keeps changing underneath it.
//!
//! A [`SearchOperation`] advances one block of lines per step and emits matches as it
//! goes. [`SearchEngine`] drives operations on a serial queue. [`TerminalSearchEngine`]
//! is the client-facing layer: it realizes requests against a [`SearchDataSource`] and
//! rebases the running search whenever the source pauses it for a mutation.

pub mod config;
pub mod engine;
pub mod error;
pub mod facade;
pub mod line_buffer;
mod matcher;
pub mod operation;
pub mod position;
pub mod queue;
pub mod request;
pub mod shared;
pub mod sync;

pub use config::SearchConfig;
pub use engine::{SearchEngine, default_queue};
pub use error::{Result, SearchError};
pub use facade::{
	FindAllStep, FindMode, FindOptions, GroupedSearchEngineOutput, SearchDataSource, SearchEngineDelegate, SearchRequestBuilder,
	TerminalSearchEngine,
};
pub use line_buffer::LineBuffer;
pub use operation::{OperationState, SearchEngineOutput, SearchOperation};
pub use position::{AbsCoord, AbsCoordRange, GridCoord, LinePosition, SearchResult};
pub use request::{CaseSensitivity, Direction, SearchRequest};
pub use shared::SharedScrollback;
pub use sync::{Pausable, SyncDistributor, SyncRegistration, Unpauser};
