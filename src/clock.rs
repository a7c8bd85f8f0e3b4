//! Coarse clocks used for scheduling.
//!
//! Timers are ordered on a process-local monotonic clock; wall-clock time is
//! consulted only when computing the first firing of calendar-aligned timers.

use chrono::{Local, Utc};
use once_cell::sync::Lazy;
use std::time::Instant;

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Milliseconds since a process-local epoch captured at first use.
///
/// Non-decreasing across calls from the same thread or across threads.
/// Millisecond granularity is all the scheduler needs.
pub fn now_ms() -> u64 {
    EPOCH.elapsed().as_millis() as u64
}

/// Wall-clock milliseconds since the Unix epoch.
///
/// With `utc == false` the value is shifted by the local UTC offset, i.e. it
/// is the local wall-clock reading expressed as epoch milliseconds. Clamped
/// to zero for pre-epoch system clocks.
pub fn wall_time_ms(utc: bool) -> u64 {
    let millis = if utc {
        Utc::now().timestamp_millis()
    } else {
        Local::now().naive_local().and_utc().timestamp_millis()
    };
    millis.max(0) as u64
}
