//! The poll loop and its scheduler.
//!
//! A [`Monitor`] owns the stats source, the sink, and the table of last observed counts. Once
//! [`start`](Monitor::start)ed it moves onto a single background task, so cycles can never overlap
//! and the counts need no locking.

mod counts;
mod cycle;
mod scheduler;

#[cfg(test)]
pub(crate) mod fakes;

pub use counts::{ChangeEvent, LastObservedCounts, Observation};
pub use cycle::{CHANNEL_DELAY, CycleReport, Monitor, Variant};
pub use scheduler::{MonitorHandle, SHUTDOWN_GRACE};
