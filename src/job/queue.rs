//! Pending-work store with per-category FIFO lanes.

use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, Weak};
use tracing::{debug, error, warn};

/// An object whose liveness gates pending jobs.
///
/// Sessions and timer items implement this. `force_shutdown` is invoked by
/// the dispatcher when a job belonging to this category fails terminally; the
/// default does nothing, which is right for objects with no connection to
/// tear down.
pub trait JobCategory: Send + Sync {
    fn force_shutdown(&self) {}
}

/// Weak handle identifying a job's category.
pub type CategoryRef = Weak<dyn JobCategory>;

/// How a job run ended, when it did not end cleanly.
pub enum JobError {
    /// Transient condition; re-queue the job at the head of its category.
    TryAgain,
    /// Terminal failure; the category is force-shut and the error logged.
    Fatal(anyhow::Error),
}

/// A unit of pending work.
///
/// `perform` runs on a dispatcher worker thread. Implementations that hold a
/// weak reference to their owner should upgrade it first and return `Ok(())`
/// when the owner is gone.
pub trait Job: Send {
    /// The category this job is ordered under. `None` means the job is
    /// unordered and gated by nothing.
    fn category(&self) -> Option<CategoryRef> {
        None
    }

    fn perform(&mut self) -> Result<(), JobError>;
}

struct Lane {
    category: CategoryRef,
    jobs: VecDeque<Box<dyn Job>>,
    /// A worker is currently running a job from this lane.
    busy: bool,
}

struct QueueState {
    lanes: HashMap<usize, Lane>,
    /// Lane keys with queued work and no busy worker. A lane appears here at
    /// most once.
    ready: VecDeque<usize>,
    /// Jobs with no category; unordered with respect to everything.
    anon: VecDeque<Box<dyn Job>>,
    closed: bool,
}

/// A job popped from the queue, together with the lane it must release.
pub struct ClaimedJob {
    pub job: Box<dyn Job>,
    pub(crate) lane: Option<usize>,
}

/// Thread-safe pending-work store.
///
/// One mutex guards all lanes; the condition variable wakes dispatcher
/// workers when work arrives or the queue closes.
pub struct JobQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

fn category_key(category: &CategoryRef) -> usize {
    category.as_ptr() as *const () as usize
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                lanes: HashMap::new(),
                ready: VecDeque::new(),
                anon: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => {
                error!("job queue mutex poisoned, aborting");
                std::process::abort();
            }
        }
    }

    /// Append a job and wake one worker.
    ///
    /// Jobs enqueued after [`close`](Self::close) are dropped.
    pub fn enqueue(&self, job: Box<dyn Job>) {
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            if state.closed {
                warn!("job enqueued after queue close, dropping");
                return;
            }
            match job.category() {
                Some(category) => {
                    let key = category_key(&category);
                    let lane = state.lanes.entry(key).or_insert_with(|| Lane {
                        category,
                        jobs: VecDeque::new(),
                        busy: false,
                    });
                    lane.jobs.push_back(job);
                    if !lane.busy && lane.jobs.len() == 1 {
                        state.ready.push_back(key);
                    }
                }
                None => state.anon.push_back(job),
            }
        }
        self.available.notify_one();
    }

    /// Block until a job is available or the queue is closed and drained.
    ///
    /// Claiming a job from a lane marks the lane busy; the caller must hand
    /// the claim back through [`finish`](Self::finish). Lanes whose category
    /// has died are discarded wholesale, cancelling their queued jobs.
    pub fn take(&self) -> Option<ClaimedJob> {
        let mut state = self.lock();
        loop {
            while let Some(key) = state.ready.pop_front() {
                let lane = match state.lanes.get_mut(&key) {
                    Some(lane) => lane,
                    None => continue,
                };
                if lane.category.upgrade().is_none() {
                    let dropped = lane.jobs.len();
                    state.lanes.remove(&key);
                    debug!(dropped, "category died, cancelling its pending jobs");
                    continue;
                }
                let job = lane.jobs.pop_front().expect("ready lane has a job");
                lane.busy = true;
                return Some(ClaimedJob {
                    job,
                    lane: Some(key),
                });
            }
            if let Some(job) = state.anon.pop_front() {
                return Some(ClaimedJob { job, lane: None });
            }
            if state.closed {
                return None;
            }
            state = match self.available.wait(state) {
                Ok(guard) => guard,
                Err(_) => {
                    error!("job queue mutex poisoned, aborting");
                    std::process::abort();
                }
            };
        }
    }

    /// Release a claimed lane, optionally re-queuing a job at its head.
    pub fn finish(&self, lane: Option<usize>, retry: Option<Box<dyn Job>>) {
        let Some(key) = lane else { return };
        let mut state = self.lock();
        let Some(entry) = state.lanes.get_mut(&key) else {
            return;
        };
        entry.busy = false;
        if let Some(job) = retry {
            entry.jobs.push_front(job);
        }
        if entry.jobs.is_empty() {
            state.lanes.remove(&key);
        } else {
            state.ready.push_back(key);
            drop(state);
            self.available.notify_one();
        }
    }

    /// Stop accepting work and wake every worker. Already-queued jobs are
    /// still drained.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        drop(state);
        self.available.notify_all();
    }

    /// Number of queued (not in-flight) jobs, across all lanes.
    pub fn len(&self) -> usize {
        let state = self.lock();
        state.anon.len() + state.lanes.values().map(|lane| lane.jobs.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}
