//! The dispatch thread that drains the job queue.

use super::queue::{ClaimedJob, Job, JobError, JobQueue};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, error, info};

/// Owns the worker thread(s) that run jobs.
///
/// The default single worker gives global FIFO-ish behavior; additional
/// workers only interleave jobs of *different* categories, because a claimed
/// lane stays locked until its job finishes. Stopping the dispatcher closes
/// the queue, drains what is already queued, and joins the workers.
pub struct JobDispatcher {
    queue: Arc<JobQueue>,
    running: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobDispatcher {
    /// Spawn `workers` dispatch threads and return the service handle.
    pub fn start(workers: usize) -> Arc<Self> {
        let dispatcher = Arc::new(Self {
            queue: Arc::new(JobQueue::new()),
            running: AtomicBool::new(true),
            workers: Mutex::new(Vec::new()),
        });
        info!(workers, "starting job dispatcher");
        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let queue = dispatcher.queue.clone();
            let handle = std::thread::Builder::new()
                .name(format!("job-dispatch-{index}"))
                .spawn(move || worker_loop(queue))
                .unwrap_or_else(|err| {
                    error!(error = %err, "failed to spawn dispatcher worker, aborting");
                    std::process::abort();
                });
            handles.push(handle);
        }
        *dispatcher.workers.lock().expect("worker list") = handles;
        dispatcher
    }

    /// Forward a job to the queue and wake a worker.
    pub fn enqueue(&self, job: Box<dyn Job>) {
        self.queue.enqueue(job);
    }

    /// Number of jobs queued and not yet claimed.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Close the queue, drain already-queued work, and join the workers.
    ///
    /// Idempotent; also invoked on drop.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            info!("stopping job dispatcher");
            self.queue.close();
            let handles = std::mem::take(&mut *self.workers.lock().expect("worker list"));
            for handle in handles {
                if handle.join().is_err() {
                    error!("dispatcher worker panicked outside a job");
                }
            }
        }
    }
}

impl Drop for JobDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(queue: Arc<JobQueue>) {
    debug!("dispatcher worker started");
    while let Some(claim) = queue.take() {
        run_one(&queue, claim);
    }
    debug!("dispatcher worker stopped");
}

fn run_one(queue: &JobQueue, claim: ClaimedJob) {
    let ClaimedJob { mut job, lane } = claim;
    let category = job.category();
    let outcome = catch_unwind(AssertUnwindSafe(|| job.perform()));
    match outcome {
        Ok(Ok(())) => queue.finish(lane, None),
        Ok(Err(JobError::TryAgain)) => {
            debug!("job asked to be retried, re-queuing at category head");
            queue.finish(lane, Some(job));
        }
        Ok(Err(JobError::Fatal(err))) => {
            info!(error = %err, "job failed, shutting its category down");
            shut_category(category.as_ref());
            queue.finish(lane, None);
        }
        Err(panic) => {
            info!(panic = ?panic_message(&panic), "job panicked, shutting its category down");
            shut_category(category.as_ref());
            queue.finish(lane, None);
        }
    }
}

fn shut_category(category: Option<&super::queue::CategoryRef>) {
    if let Some(live) = category.and_then(|weak| weak.upgrade()) {
        live.force_shutdown();
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
