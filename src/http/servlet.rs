//! URI-keyed servlet lookup.

use super::query::ParamMap;
use super::status::HttpStatus;
use super::verb::Verb;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::info;

/// A protocol-level failure raised by a servlet.
///
/// A positive `code` is sent to the client as the response status; a zero
/// code means the failure is logged and the request dropped.
#[derive(Debug, Error)]
#[error("protocol error {code}: {message}")]
pub struct ProtocolError {
    pub code: u16,
    pub message: String,
}

impl ProtocolError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A request handler bound to a URI.
///
/// The servlet fills `out_headers` and `out_body` and returns the response
/// status, or raises a [`ProtocolError`].
pub trait Servlet: Send + Sync {
    fn handle(
        &self,
        out_headers: &mut ParamMap,
        out_body: &mut Vec<u8>,
        verb: Verb,
        query: &ParamMap,
        in_headers: &ParamMap,
        in_body: &[u8],
    ) -> Result<HttpStatus, ProtocolError>;
}

impl<F> Servlet for F
where
    F: Fn(
            &mut ParamMap,
            &mut Vec<u8>,
            Verb,
            &ParamMap,
            &ParamMap,
            &[u8],
        ) -> Result<HttpStatus, ProtocolError>
        + Send
        + Sync,
{
    fn handle(
        &self,
        out_headers: &mut ParamMap,
        out_body: &mut Vec<u8>,
        verb: Verb,
        query: &ParamMap,
        in_headers: &ParamMap,
        in_body: &[u8],
    ) -> Result<HttpStatus, ProtocolError> {
        self(out_headers, out_body, verb, query, in_headers, in_body)
    }
}

/// Maps request URIs to servlets.
///
/// Lookup hands out the registered `Arc`, which keeps the servlet alive for
/// the duration of the invocation even if it is unregistered concurrently.
#[derive(Default)]
pub struct ServletRegistry {
    servlets: RwLock<HashMap<String, Arc<dyn Servlet>>>,
}

impl ServletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `servlet` to `uri`, replacing any previous binding.
    pub fn register(&self, uri: impl Into<String>, servlet: Arc<dyn Servlet>) {
        let uri = uri.into();
        info!(%uri, "registering servlet");
        self.servlets.write().unwrap().insert(uri, servlet);
    }

    /// Remove the binding for `uri`. In-flight invocations keep running on
    /// the `Arc` they already hold.
    pub fn unregister(&self, uri: &str) {
        self.servlets.write().unwrap().remove(uri);
    }

    pub fn get(&self, uri: &str) -> Option<Arc<dyn Servlet>> {
        self.servlets.read().unwrap().get(uri).cloned()
    }
}
