use std::sync::Arc;

use serde::Deserialize;
use tether_worker::{SerialQueue, TaskClass};

use crate::facade::FindMode;

/// The `[search]` table of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
	/// Outstanding output batches allowed before a search stalls. Unbounded when unset.
	pub max_queue_size: Option<usize>,
	/// Results merged into one consumed output.
	pub max_consume_count: usize,
	pub queue_name: String,
	pub default_mode: FindMode,
}

impl Default for SearchConfig {
	fn default() -> Self {
		Self {
			max_queue_size: None,
			max_consume_count: usize::MAX,
			queue_name: "search".to_string(),
			default_mode: FindMode::SmartCase,
		}
	}
}

impl SearchConfig {
	/// Starts a dedicated search queue. Most callers share [`crate::engine::default_queue`].
	pub fn spawn_queue(&self) -> std::io::Result<Arc<SerialQueue>> {
		SerialQueue::new(TaskClass::Search, &self.queue_name).map(Arc::new)
	}
}
