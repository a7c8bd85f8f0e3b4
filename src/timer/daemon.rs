//! The timer daemon thread and its heap.

use crate::clock;
use crate::job::{CategoryRef, Job, JobCategory, JobDispatcher, JobError};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const MS_PER_HOUR: u64 = 3_600_000;
pub const MS_PER_DAY: u64 = MS_PER_HOUR * 24;
pub const MS_PER_WEEK: u64 = MS_PER_DAY * 7;

/// Idle back-off ceiling for the pump thread, in milliseconds.
const MAX_IDLE_WAIT_MS: u64 = 100;

/// Signature of a timer callback: the fired item, the pump's clock reading,
/// and the item's period at fire time.
pub type TimerCallback = Arc<dyn Fn(&Arc<TimerItem>, u64, u64) + Send + Sync>;

/// A registered timer.
///
/// Returned from the `register_*` methods; dropping the last strong handle
/// cancels the timer (an already-popped in-flight firing may still run once).
/// `period` and `stamp` are only written under the daemon mutex; the atomics
/// exist so the item can be shared without interior-mutability gymnastics.
pub struct TimerItem {
    period_ms: AtomicU64,
    stamp: AtomicU32,
    low_level: bool,
    callback: TimerCallback,
}

impl TimerItem {
    fn new(period_ms: u64, callback: TimerCallback, low_level: bool) -> Arc<Self> {
        debug!(period_ms, low_level, "created timer");
        Arc::new(Self {
            period_ms: AtomicU64::new(period_ms),
            stamp: AtomicU32::new(0),
            low_level,
            callback,
        })
    }

    /// Current period; zero for one-shot timers.
    pub fn period_ms(&self) -> u64 {
        self.period_ms.load(Ordering::Relaxed)
    }
}

/// Timer items gate their own jobs; nothing to tear down on failure.
impl JobCategory for TimerItem {}

/// One pending firing. The `stamp` snapshots the item's stamp at insertion;
/// a mismatch on pop means the entry was superseded by `set_time`.
struct QueueElement {
    next_ms: u64,
    item: Weak<TimerItem>,
    stamp: u32,
}

impl PartialEq for QueueElement {
    fn eq(&self, other: &Self) -> bool {
        self.next_ms == other.next_ms
    }
}

impl Eq for QueueElement {}

impl PartialOrd for QueueElement {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueElement {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Inverted so the earliest firing sits on top of the max-heap.
        other.next_ms.cmp(&self.next_ms)
    }
}

struct DaemonShared {
    heap: Mutex<BinaryHeap<QueueElement>>,
    wakeup: Condvar,
    running: AtomicBool,
    dispatcher: Arc<JobDispatcher>,
}

impl DaemonShared {
    fn lock_heap(&self) -> MutexGuard<'_, BinaryHeap<QueueElement>> {
        match self.heap.lock() {
            Ok(guard) => guard,
            Err(_) => {
                error!("timer heap mutex poisoned, aborting");
                std::process::abort();
            }
        }
    }
}

/// The timer service.
///
/// Construct with [`TimerDaemon::start`]; timers registered through the
/// returned handle fire until they are dropped, rescheduled away, or the
/// daemon is stopped.
pub struct TimerDaemon {
    shared: Arc<DaemonShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TimerDaemon {
    /// Spawn the pump thread. Regular timers are posted to `dispatcher`.
    pub fn start(dispatcher: Arc<JobDispatcher>) -> Self {
        let shared = Arc::new(DaemonShared {
            heap: Mutex::new(BinaryHeap::new()),
            wakeup: Condvar::new(),
            running: AtomicBool::new(true),
            dispatcher,
        });
        info!("starting timer daemon");
        let pump_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name("timer-daemon".to_string())
            .spawn(move || pump_loop(pump_shared))
            .unwrap_or_else(|err| {
                error!(error = %err, "failed to spawn timer daemon thread, aborting");
                std::process::abort();
            });
        Self {
            shared,
            thread: Mutex::new(Some(handle)),
        }
    }

    /// Stop the pump thread and discard all pending entries. Idempotent.
    pub fn stop(&self) {
        if self.shared.running.swap(false, Ordering::AcqRel) {
            info!("stopping timer daemon");
            // Taking the heap lock orders the flag store before the pump's
            // next check-then-wait, so the notification cannot be missed.
            drop(self.shared.lock_heap());
            self.shared.wakeup.notify_all();
            if let Some(handle) = self.thread.lock().expect("daemon thread slot").take() {
                if handle.join().is_err() {
                    error!("timer daemon thread panicked");
                }
            }
            self.shared.lock_heap().clear();
        }
    }

    fn insert(
        &self,
        first_ms: u64,
        period_ms: u64,
        callback: TimerCallback,
        low_level: bool,
    ) -> Arc<TimerItem> {
        let item = TimerItem::new(period_ms, callback, low_level);
        {
            let mut heap = self.shared.lock_heap();
            heap.push(QueueElement {
                next_ms: first_ms,
                item: Arc::downgrade(&item),
                stamp: 0,
            });
        }
        self.shared.wakeup.notify_one();
        debug!(
            in_ms = first_ms.saturating_sub(clock::now_ms()),
            period_ms, low_level, "registered timer"
        );
        item
    }

    /// Register a timer firing at an absolute monotonic time.
    /// `period_ms == 0` makes it one-shot.
    pub fn register_absolute(
        &self,
        first_ms: u64,
        period_ms: u64,
        callback: TimerCallback,
    ) -> Arc<TimerItem> {
        self.insert(first_ms, period_ms, callback, false)
    }

    /// Register a timer firing `delta_ms` from now.
    pub fn register_relative(
        &self,
        delta_ms: u64,
        period_ms: u64,
        callback: TimerCallback,
    ) -> Arc<TimerItem> {
        self.register_absolute(clock::now_ms().saturating_add(delta_ms), period_ms, callback)
    }

    /// Register a timer firing every hour at `minute:second` past the hour.
    pub fn register_hourly(
        &self,
        minute: u32,
        second: u32,
        callback: TimerCallback,
        utc: bool,
    ) -> Arc<TimerItem> {
        let offset = (u64::from(minute) * 60 + u64::from(second)) * 1000;
        let delta = clock::wall_time_ms(utc).saturating_sub(offset);
        self.register_relative(MS_PER_HOUR - delta % MS_PER_HOUR, MS_PER_HOUR, callback)
    }

    /// Register a timer firing every day at `hour:minute:second`.
    pub fn register_daily(
        &self,
        hour: u32,
        minute: u32,
        second: u32,
        callback: TimerCallback,
        utc: bool,
    ) -> Arc<TimerItem> {
        let offset =
            (u64::from(hour) * 3600 + u64::from(minute) * 60 + u64::from(second)) * 1000;
        let delta = clock::wall_time_ms(utc).saturating_sub(offset);
        self.register_relative(MS_PER_DAY - delta % MS_PER_DAY, MS_PER_DAY, callback)
    }

    /// Register a timer firing every week at the given weekday and time.
    /// `day_of_week` counts from Sunday = 0.
    pub fn register_weekly(
        &self,
        day_of_week: u32,
        hour: u32,
        minute: u32,
        second: u32,
        callback: TimerCallback,
        utc: bool,
    ) -> Arc<TimerItem> {
        // The epoch fell on a Thursday, hence the +3 in the day reduction.
        let offset = (u64::from(day_of_week + 3) * 86_400
            + u64::from(hour) * 3600
            + u64::from(minute) * 60
            + u64::from(second))
            * 1000;
        let delta = clock::wall_time_ms(utc).saturating_sub(offset);
        self.register_relative(MS_PER_WEEK - delta % MS_PER_WEEK, MS_PER_WEEK, callback)
    }

    /// Like [`register_absolute`](Self::register_absolute), but the callback
    /// runs inline on the daemon thread instead of via the dispatcher.
    pub fn register_low_level_absolute(
        &self,
        first_ms: u64,
        period_ms: u64,
        callback: TimerCallback,
    ) -> Arc<TimerItem> {
        self.insert(first_ms, period_ms, callback, true)
    }

    /// Like [`register_relative`](Self::register_relative), but low-level.
    pub fn register_low_level_relative(
        &self,
        delta_ms: u64,
        period_ms: u64,
        callback: TimerCallback,
    ) -> Arc<TimerItem> {
        self.register_low_level_absolute(
            clock::now_ms().saturating_add(delta_ms),
            period_ms,
            callback,
        )
    }

    /// Reschedule `item` to fire at an absolute monotonic time, optionally
    /// replacing its period.
    ///
    /// The item's stamp is bumped and a fresh heap entry inserted; whatever
    /// firing was previously scheduled becomes stale and is discarded when it
    /// reaches the top of the heap.
    pub fn set_absolute_time(&self, item: &Arc<TimerItem>, first_ms: u64, period_ms: Option<u64>) {
        {
            let mut heap = self.shared.lock_heap();
            if let Some(period) = period_ms {
                item.period_ms.store(period, Ordering::Relaxed);
            }
            let stamp = item.stamp.fetch_add(1, Ordering::Relaxed) + 1;
            heap.push(QueueElement {
                next_ms: first_ms,
                item: Arc::downgrade(item),
                stamp,
            });
        }
        self.shared.wakeup.notify_one();
    }

    /// Reschedule `item` to fire `delta_ms` from now; see
    /// [`set_absolute_time`](Self::set_absolute_time).
    pub fn set_time(&self, item: &Arc<TimerItem>, delta_ms: u64, period_ms: Option<u64>) {
        self.set_absolute_time(
            item,
            clock::now_ms().saturating_add(delta_ms),
            period_ms,
        );
    }
}

impl Drop for TimerDaemon {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A regular timer firing, routed through the job dispatcher. The weak item
/// reference doubles as the job's category, so firings of one timer are
/// serialized and a dropped timer cancels queued firings.
struct TimerJob {
    item: Weak<TimerItem>,
    now: u64,
}

impl Job for TimerJob {
    fn category(&self) -> Option<CategoryRef> {
        let weak: CategoryRef = self.item.clone();
        Some(weak)
    }

    fn perform(&mut self) -> Result<(), JobError> {
        let Some(item) = self.item.upgrade() else {
            return Ok(());
        };
        (item.callback)(&item, self.now, item.period_ms());
        Ok(())
    }
}

/// Pop and dispatch one due element. Returns false when nothing is due.
fn pump_one_element(shared: &DaemonShared) -> bool {
    let now = clock::now_ms();

    let fired: Option<(Arc<TimerItem>, u64)> = {
        let mut heap = shared.lock_heap();
        loop {
            match heap.peek() {
                None => return false,
                Some(top) if top.next_ms > now => return false,
                Some(_) => {}
            }
            let elem = heap.pop().expect("peeked element");
            let Some(item) = elem.item.upgrade() else {
                continue;
            };
            if item.stamp.load(Ordering::Relaxed) != elem.stamp {
                continue;
            }
            let period = item.period_ms();
            if period != 0 {
                heap.push(QueueElement {
                    next_ms: elem.next_ms.saturating_add(period),
                    item: elem.item,
                    stamp: elem.stamp,
                });
            }
            break Some((item, period));
        }
    };

    // The heap lock is released before any callback or enqueue runs.
    if let Some((item, period)) = fired {
        if item.low_level {
            let guard = catch_unwind(AssertUnwindSafe(|| {
                (item.callback)(&item, now, period);
            }));
            if guard.is_err() {
                warn!("low-level timer callback panicked; daemon continues");
            }
        } else {
            shared.dispatcher.enqueue(Box::new(TimerJob {
                item: Arc::downgrade(&item),
                now,
            }));
        }
        true
    } else {
        false
    }
}

fn pump_loop(shared: Arc<DaemonShared>) {
    info!("timer daemon started");
    let mut timeout_ms = 0u64;
    loop {
        loop {
            let busy = pump_one_element(&shared);
            timeout_ms = if busy {
                0
            } else {
                (timeout_ms * 2 + 1).min(MAX_IDLE_WAIT_MS)
            };
            if !busy {
                break;
            }
        }

        let guard = shared.lock_heap();
        if !shared.running.load(Ordering::Acquire) {
            break;
        }
        match shared
            .wakeup
            .wait_timeout(guard, Duration::from_millis(timeout_ms))
        {
            Ok(_) => {}
            Err(_) => {
                error!("timer heap mutex poisoned, aborting");
                std::process::abort();
            }
        }
    }
    info!("timer daemon stopped");
}
