//! HTTP client event plumbing.
//!
//! The low-level response parser (the I/O layer) produces four kinds of
//! events. Each is wrapped in a job holding a weak back-reference to the
//! client handler, so events for one client are delivered in order on the
//! dispatch thread and a dropped client cancels whatever is still queued.

use crate::http::query::ParamMap;
use crate::job::{CategoryRef, Job, JobCategory, JobDispatcher, JobError};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Status line and headers of a received response.
#[derive(Debug, Clone)]
pub struct ResponseHeaders {
    pub status: u16,
    pub reason: String,
    pub headers: ParamMap,
}

/// High-level hooks invoked on the dispatch thread.
///
/// Returning [`JobError::TryAgain`] re-queues the event at the head of this
/// client's lane; any other error logs and force-shuts the client. The
/// default implementations accept and discard everything.
pub trait HttpClientHandler: JobCategory + Send + Sync + 'static {
    fn on_response_headers(
        &self,
        headers: &ResponseHeaders,
        content_length: u64,
    ) -> Result<(), JobError> {
        let _ = (headers, content_length);
        Ok(())
    }

    fn on_entity(&self, content_offset: u64, data: &[u8]) -> Result<(), JobError> {
        let _ = (content_offset, data);
        Ok(())
    }

    fn on_chunked_trailer(
        &self,
        real_content_length: u64,
        headers: &ParamMap,
    ) -> Result<(), JobError> {
        let _ = (real_content_length, headers);
        Ok(())
    }

    fn on_content_eof(&self, real_content_length: u64) -> Result<(), JobError> {
        let _ = real_content_length;
        Ok(())
    }
}

enum ClientEvent {
    ResponseHeaders {
        headers: ResponseHeaders,
        content_length: u64,
    },
    Entity {
        content_offset: u64,
        data: Vec<u8>,
    },
    ChunkedTrailer {
        real_content_length: u64,
        headers: ParamMap,
    },
    ContentEof {
        real_content_length: u64,
    },
}

struct ClientEventJob<H: HttpClientHandler> {
    client: Weak<H>,
    event: ClientEvent,
}

impl<H: HttpClientHandler> Job for ClientEventJob<H> {
    fn category(&self) -> Option<CategoryRef> {
        let weak: CategoryRef = self.client.clone();
        Some(weak)
    }

    fn perform(&mut self) -> Result<(), JobError> {
        let Some(client) = self.client.upgrade() else {
            debug!("client expired before its event was delivered");
            return Ok(());
        };
        // A `Fatal` outcome propagates to the dispatcher, which logs it and
        // force-shuts the category (this client); `TryAgain` re-queues.
        match &self.event {
            ClientEvent::ResponseHeaders {
                headers,
                content_length,
            } => client.on_response_headers(headers, *content_length),
            ClientEvent::Entity {
                content_offset,
                data,
            } => client.on_entity(*content_offset, data),
            ClientEvent::ChunkedTrailer {
                real_content_length,
                headers,
            } => client.on_chunked_trailer(*real_content_length, headers),
            ClientEvent::ContentEof {
                real_content_length,
            } => client.on_content_eof(*real_content_length),
        }
    }
}

/// Bridges the low-level parser to the dispatcher for one client.
///
/// The I/O layer calls the `on_low_level_*` methods from its own thread;
/// each call becomes one ordered job.
pub struct HttpClient<H: HttpClientHandler> {
    handler: Weak<H>,
    dispatcher: Arc<JobDispatcher>,
}

impl<H: HttpClientHandler> HttpClient<H> {
    pub fn new(handler: &Arc<H>, dispatcher: Arc<JobDispatcher>) -> Self {
        Self {
            handler: Arc::downgrade(handler),
            dispatcher,
        }
    }

    fn post(&self, event: ClientEvent) {
        self.dispatcher.enqueue(Box::new(ClientEventJob {
            client: self.handler.clone(),
            event,
        }));
    }

    pub fn on_low_level_response_headers(&self, headers: ResponseHeaders, content_length: u64) {
        debug!(status = headers.status, "queuing response headers event");
        self.post(ClientEvent::ResponseHeaders {
            headers,
            content_length,
        });
    }

    pub fn on_low_level_entity(&self, content_offset: u64, data: Vec<u8>) {
        debug!(content_offset, size = data.len(), "queuing entity event");
        self.post(ClientEvent::Entity {
            content_offset,
            data,
        });
    }

    pub fn on_low_level_chunked_trailer(&self, real_content_length: u64, headers: ParamMap) {
        debug!(real_content_length, "queuing chunked trailer event");
        self.post(ClientEvent::ChunkedTrailer {
            real_content_length,
            headers,
        });
    }

    pub fn on_low_level_content_eof(&self, real_content_length: u64) {
        debug!(real_content_length, "queuing content eof event");
        self.post(ClientEvent::ContentEof {
            real_content_length,
        });
    }
}
