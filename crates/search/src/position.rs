use std::fmt;

/// A location in a line buffer: an absolute raw-line id and a character column.
///
/// Line ids are never reused while the line is live, so a position taken from one
/// snapshot stays meaningful in a later snapshot of the same buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LinePosition {
	pub line: i64,
	pub col: usize,
}

impl LinePosition {
	pub const fn new(line: i64, col: usize) -> Self {
		Self { line, col }
	}
}

impl fmt::Display for LinePosition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}@{}", self.line, self.col)
	}
}

/// A cell coordinate relative to the first row currently held by the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct GridCoord {
	pub y: i64,
	pub x: i32,
}

impl GridCoord {
	pub const fn new(x: i32, y: i64) -> Self {
		Self { y, x }
	}
}

/// A cell coordinate that counts rows evicted from the top of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct AbsCoord {
	pub y: i64,
	pub x: i32,
}

impl AbsCoord {
	pub const INVALID: Self = Self { y: -1, x: -1 };

	pub const fn new(x: i32, y: i64) -> Self {
		Self { y, x }
	}

	/// Converts to a buffer-relative coordinate; `None` when the row has been evicted.
	pub fn relative(self, overflow: i64) -> Option<GridCoord> {
		let y = self.y - overflow;
		(y >= 0).then_some(GridCoord::new(self.x, y))
	}

	/// Like [`Self::relative`], but evicted rows snap to the top-left cell.
	pub fn relative_clamped(self, overflow: i64) -> GridCoord {
		self.relative(overflow).unwrap_or(GridCoord::new(0, 0))
	}
}

impl fmt::Display for AbsCoord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.y, self.x)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AbsCoordRange {
	pub start: AbsCoord,
	pub end: AbsCoord,
}

impl AbsCoordRange {
	pub const INVALID: Self = Self {
		start: AbsCoord::INVALID,
		end: AbsCoord::INVALID,
	};
}

/// One match, in absolute wrapped-row coordinates. Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SearchResult {
	pub start_x: i32,
	pub start_y: i64,
	pub end_x: i32,
	pub end_y: i64,
}

impl SearchResult {
	pub const fn new(start_x: i32, start_y: i64, end_x: i32, end_y: i64) -> Self {
		Self {
			start_x,
			start_y,
			end_x,
			end_y,
		}
	}

	pub fn from_coords(start: AbsCoord, end: AbsCoord) -> Self {
		Self::new(start.x, start.y, end.x, end.y)
	}
}

impl fmt::Display for SearchResult {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}-{}:{}", self.start_y, self.start_x, self.end_y, self.end_x)
	}
}
