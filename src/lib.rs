//! # breakwater
//!
//! A server application framework built around three cooperating subsystems:
//!
//! - [`job`] — a category-ordered job queue drained by a dedicated dispatch
//!   thread. Jobs carry a weak back-reference to the object they belong to;
//!   when that object dies, its pending jobs are cancelled implicitly.
//! - [`timer`] — a monotonic-time priority scheduler with periodic,
//!   calendar-aligned, and low-level (inline) timers. Rescheduling is
//!   stamp-based: stale heap entries are culled lazily instead of erased.
//! - [`http`] — an incremental HTTP/1.0 / HTTP/1.1 request parser that turns
//!   socket bytes into request jobs, plus servlet lookup and response
//!   serialization.
//!
//! ```text
//! socket bytes → HttpSession (per connection) → HttpRequestJob
//!              → JobQueue → JobDispatcher thread → servlet callback
//!
//! TimerDaemon thread → low-level callbacks inline / TimerJob → JobDispatcher
//! ```
//!
//! The [`server`] module supplies a thin TCP accept loop so the crate is
//! runnable end to end; everything above it is transport-agnostic.

pub mod client;
pub mod clock;
mod error;
pub mod http;
pub mod job;
pub mod runtime_config;
pub mod server;
pub mod session;
pub mod timer;

pub use error::{Error, Result};
pub use http::servlet::{ProtocolError, Servlet, ServletRegistry};
pub use http::session::HttpSession;
pub use job::{Job, JobCategory, JobDispatcher, JobError};
pub use session::{SessionId, TcpSession};
pub use timer::{TimerDaemon, TimerItem};
