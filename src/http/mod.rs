//! HTTP/1.x request handling.
//!
//! [`session::HttpSession`] is the incremental parser: it consumes socket
//! bytes, enforces the request-size budget, and turns each complete request
//! into a job on the dispatcher. The remaining modules are the primitives it
//! is built from: the closed verb set, the status table, the URL-encoded
//! multimap, response serialization, and the servlet registry.

pub mod query;
pub mod response;
pub mod servlet;
pub mod session;
pub mod status;
pub mod verb;

pub use query::ParamMap;
pub use response::render_response;
pub use servlet::{ProtocolError, Servlet, ServletRegistry};
pub use session::{HttpSession, SessionTransport, MAX_REQUEST_LENGTH};
pub use status::HttpStatus;
pub use verb::Verb;
