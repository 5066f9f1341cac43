//! Shared worker primitives.
//!
//! * [`TaskClass`]: scheduling/observability class attached to every spawn
//! * [`spawn_named_thread`]: classified thread spawn
//! * [`SerialQueue`]: a dedicated thread executing submitted jobs strictly in order

mod class;
mod queue;
mod spawn;

pub use class::TaskClass;
pub use queue::{QueueClosed, SerialQueue};
pub use spawn::spawn_named_thread;
