//! Category-ordered job dispatch.
//!
//! A [`Job`] is an opaque unit of work tagged with a *category*: a weak
//! back-reference to the object the work belongs to (a session, a timer
//! item). The [`JobQueue`] guarantees that jobs sharing a live category run
//! in enqueue order and never overlap, while jobs of different categories are
//! free to interleave. A dead category silently cancels everything still
//! queued under it.
//!
//! The [`JobDispatcher`] owns the worker thread(s) that drain the queue and
//! apply the failure policy: `TryAgain` re-queues at the head of the
//! category, anything else force-shuts the category down. The dispatcher
//! itself never dies on a job failure.

pub mod dispatcher;
pub mod queue;

pub use dispatcher::JobDispatcher;
pub use queue::{CategoryRef, Job, JobCategory, JobError, JobQueue};
