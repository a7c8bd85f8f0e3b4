//! Monotonic-time timer scheduling.
//!
//! The [`TimerDaemon`] keeps a binary heap of pending firings ordered on the
//! monotonic clock and pumps it from a background thread. Regular timers are
//! packaged as jobs and run on the dispatcher thread; *low-level* timers run
//! inline on the daemon thread. Rescheduling never edits the heap: it bumps a
//! per-item stamp and inserts a fresh entry, leaving the stale one to be
//! discarded when it surfaces.

pub mod daemon;

pub use daemon::{TimerCallback, TimerDaemon, TimerItem, MS_PER_DAY, MS_PER_HOUR, MS_PER_WEEK};
