/// Execution classes used for worker scheduling and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Protocol bookkeeping driven by a terminal session.
	Protocol,
	/// Incremental search slices over a buffer snapshot.
	Search,
	/// Anything else that may be delayed under pressure.
	Background,
}

impl TaskClass {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Protocol => "protocol",
			Self::Search => "search",
			Self::Background => "background",
		}
	}
}
