//! Incremental HTTP/1.x request parsing and request-job dispatch.

use super::query::ParamMap;
use super::response::render_response;
use super::servlet::ServletRegistry;
use super::status::HttpStatus;
use super::verb::Verb;
use crate::job::{CategoryRef, Job, JobCategory, JobDispatcher, JobError};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Combined limit on headers plus body, per request.
pub const MAX_REQUEST_LENGTH: usize = 0x4000;

/// What the parser needs from the connection: a way to write responses, a
/// way to stop reading, and a liveness identity for jobs.
pub trait SessionTransport: JobCategory + Send + Sync + 'static {
    fn send(&self, bytes: &[u8]) -> io::Result<()>;
    fn shutdown_read(&self);
}

/// Render a response and write it out; send failures are logged, not
/// surfaced, because the connection is already dying when they happen.
pub(crate) fn respond<T: SessionTransport + ?Sized>(
    transport: &T,
    status: HttpStatus,
    headers: ParamMap,
    body: Vec<u8>,
) {
    debug!(status = status.0, "sending http response");
    let bytes = render_response(status, headers, body);
    if let Err(err) = transport.send(&bytes) {
        debug!(error = %err, "failed to write response");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FirstHeader,
    Headers,
    Contents,
}

/// Per-connection incremental request parser.
///
/// Owned by the reader; feeds complete requests to the dispatcher as jobs
/// carrying a weak reference to the transport. The
/// buffer named `line` accumulates header lines while parsing and body bytes
/// once in `Contents`, exactly one of which is in progress at a time.
pub struct HttpSession<T: SessionTransport> {
    transport: Arc<T>,
    dispatcher: Arc<JobDispatcher>,
    servlets: Arc<ServletRegistry>,
    state: State,
    total_len: usize,
    content_len: usize,
    line: Vec<u8>,
    verb: Verb,
    uri: String,
    get_params: ParamMap,
    headers: ParamMap,
    pending: Arc<AtomicUsize>,
}

/// Decrements the owning session's pending-request count when the request
/// job finishes, is skipped, or is discarded with the queue.
struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<T: SessionTransport> HttpSession<T> {
    pub fn new(
        transport: Arc<T>,
        dispatcher: Arc<JobDispatcher>,
        servlets: Arc<ServletRegistry>,
    ) -> Self {
        Self {
            transport,
            dispatcher,
            servlets,
            state: State::FirstHeader,
            total_len: 0,
            content_len: 0,
            line: Vec::new(),
            verb: Verb::Get,
            uri: String::new(),
            get_params: ParamMap::new(),
            headers: ParamMap::new(),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Requests handed to the dispatcher whose response has not been written
    /// yet. The reactor keeps the connection object alive while this is
    /// non-zero; dropping it earlier would cancel the owed responses.
    pub fn pending_requests(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Consume one chunk of socket bytes.
    ///
    /// May emit zero or more complete request jobs (pipelined requests in a
    /// single chunk are all processed) and, on protocol errors, a response
    /// followed by a read shutdown.
    pub fn on_read_avail(&mut self, data: &[u8]) {
        if self.total_len + data.len() >= MAX_REQUEST_LENGTH {
            warn!(
                total = self.total_len + data.len(),
                limit = MAX_REQUEST_LENGTH,
                "request exceeds size budget"
            );
            self.refuse(HttpStatus::REQUEST_TOO_LARGE);
            return;
        }
        self.total_len += data.len();

        let mut index = 0;
        while index < data.len() {
            if self.state != State::Contents {
                let byte = data[index];
                index += 1;
                if byte != b'\n' {
                    self.line.push(byte);
                    continue;
                }
                if self.line.last() == Some(&b'\r') {
                    self.line.pop();
                }
                if !self.handle_line() {
                    return;
                }
                if self.state != State::Contents {
                    continue;
                }
            }

            let available = data.len() - index;
            let remaining = self.content_len - self.line.len();
            if available < remaining {
                self.line.extend_from_slice(&data[index..]);
                return;
            }
            self.line.extend_from_slice(&data[index..index + remaining]);
            index += remaining;
            self.finish_request();
        }
    }

    /// Process the line accumulated in `self.line`, leaving it empty.
    /// Returns false when the request was refused and parsing must stop.
    fn handle_line(&mut self) -> bool {
        let line = std::mem::take(&mut self.line);
        match self.state {
            State::FirstHeader => {
                // Blank lines before the request line are tolerated.
                if line.is_empty() {
                    return true;
                }
                let Ok(text) = std::str::from_utf8(&line) else {
                    warn!("request line is not valid utf-8");
                    return self.refuse(HttpStatus::BAD_REQUEST);
                };
                let parts: Vec<&str> = text.splitn(3, ' ').collect();
                if parts.len() != 3 {
                    warn!(line = text, "malformed request line");
                    return self.refuse(HttpStatus::BAD_REQUEST);
                }
                let Some(verb) = Verb::parse(parts[0]) else {
                    warn!(verb = parts[0], "unknown request verb");
                    return self.refuse(HttpStatus::METHOD_NOT_ALLOWED);
                };
                self.verb = verb;
                if !parts[1].starts_with('/') {
                    warn!(uri = parts[1], "request uri must be absolute");
                    return self.refuse(HttpStatus::BAD_REQUEST);
                }
                match parts[1].split_once('?') {
                    Some((uri, query)) => {
                        self.uri = uri.to_string();
                        self.get_params = ParamMap::from_url_encoded(query);
                    }
                    None => {
                        self.uri = parts[1].to_string();
                        self.get_params.clear();
                    }
                }
                if parts[2] != "HTTP/1.0" && parts[2] != "HTTP/1.1" {
                    warn!(version = parts[2], "unsupported http version");
                    return self.refuse(HttpStatus::VERSION_NOT_SUPPORTED);
                }
                self.state = State::Headers;
            }
            State::Headers if !line.is_empty() => {
                let Ok(text) = std::str::from_utf8(&line) else {
                    warn!("header line is not valid utf-8");
                    return self.refuse(HttpStatus::BAD_REQUEST);
                };
                let Some((name, value)) = text.split_once(':') else {
                    warn!(line = text, "header line without a colon");
                    return self.refuse(HttpStatus::BAD_REQUEST);
                };
                let value = value.strip_prefix(' ').unwrap_or(value);
                self.headers.add(name, value);
            }
            State::Headers => {
                self.content_len = self
                    .headers
                    .get_ignore_ascii_case("Content-Length")
                    .and_then(|value| value.trim().parse().ok())
                    .unwrap_or(0);
                self.state = State::Contents;
            }
            State::Contents => unreachable!("lines are not assembled in Contents"),
        }
        true
    }

    /// Send an error response, stop reading, and abandon the request.
    fn refuse(&mut self, status: HttpStatus) -> bool {
        respond(self.transport.as_ref(), status, ParamMap::new(), Vec::new());
        self.transport.shutdown_read();
        false
    }

    /// Package the completed request as a job and reset for the next one.
    fn finish_request(&mut self) {
        debug!(verb = %self.verb, uri = %self.uri, "request complete");
        self.pending.fetch_add(1, Ordering::AcqRel);
        let job = HttpRequestJob {
            session: Arc::downgrade(&self.transport),
            servlets: self.servlets.clone(),
            verb: self.verb,
            uri: std::mem::take(&mut self.uri),
            get_params: std::mem::take(&mut self.get_params),
            headers: std::mem::take(&mut self.headers),
            body: std::mem::take(&mut self.line),
            _pending: PendingGuard(self.pending.clone()),
        };
        self.dispatcher.enqueue(Box::new(job));

        self.state = State::FirstHeader;
        self.total_len = 0;
        self.content_len = 0;
    }
}

impl<T: SessionTransport> Drop for HttpSession<T> {
    fn drop(&mut self) {
        if self.state != State::FirstHeader {
            warn!("discarding a partially received request");
        }
    }
}

/// A fully parsed request on its way to a servlet.
///
/// The weak session reference is also the job's category: responses for one
/// connection go out in request order, and a closed connection cancels its
/// queued requests.
struct HttpRequestJob<T: SessionTransport> {
    session: Weak<T>,
    servlets: Arc<ServletRegistry>,
    verb: Verb,
    uri: String,
    get_params: ParamMap,
    headers: ParamMap,
    body: Vec<u8>,
    _pending: PendingGuard,
}

impl<T: SessionTransport> Job for HttpRequestJob<T> {
    fn category(&self) -> Option<CategoryRef> {
        let weak: CategoryRef = self.session.clone();
        Some(weak)
    }

    fn perform(&mut self) -> Result<(), JobError> {
        let Some(session) = self.session.upgrade() else {
            debug!(uri = %self.uri, "session expired before its request ran");
            return Ok(());
        };
        let Some(servlet) = self.servlets.get(&self.uri) else {
            warn!(uri = %self.uri, "no servlet for uri");
            respond(
                session.as_ref(),
                HttpStatus::NOT_FOUND,
                ParamMap::new(),
                Vec::new(),
            );
            return Ok(());
        };
        debug!(verb = %self.verb, uri = %self.uri, "dispatching request to servlet");
        let mut out_headers = ParamMap::new();
        let mut out_body = Vec::new();
        match servlet.handle(
            &mut out_headers,
            &mut out_body,
            self.verb,
            &self.get_params,
            &self.headers,
            &self.body,
        ) {
            Ok(status) => respond(session.as_ref(), status, out_headers, out_body),
            Err(err) => {
                warn!(code = err.code, message = %err.message, "servlet raised a protocol error");
                if err.code > 0 {
                    respond(
                        session.as_ref(),
                        HttpStatus(err.code),
                        ParamMap::new(),
                        Vec::new(),
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct MockTransport {
        sent: Mutex<Vec<u8>>,
        read_shutdown: AtomicBool,
    }

    impl MockTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                read_shutdown: AtomicBool::new(false),
            })
        }
        fn sent_text(&self) -> String {
            String::from_utf8_lossy(&self.sent.lock().unwrap()).into_owned()
        }
    }

    impl JobCategory for MockTransport {}

    impl SessionTransport for MockTransport {
        fn send(&self, bytes: &[u8]) -> io::Result<()> {
            self.sent.lock().unwrap().extend_from_slice(bytes);
            Ok(())
        }
        fn shutdown_read(&self) {
            self.read_shutdown.store(true, Ordering::SeqCst);
        }
    }

    fn session(
        transport: Arc<MockTransport>,
    ) -> (HttpSession<MockTransport>, Arc<JobDispatcher>) {
        let dispatcher = JobDispatcher::start(1);
        let servlets = Arc::new(ServletRegistry::new());
        (
            HttpSession::new(transport, dispatcher.clone(), servlets),
            dispatcher,
        )
    }

    #[test]
    fn leading_blank_lines_are_tolerated() {
        let transport = MockTransport::new();
        let (mut parser, dispatcher) = session(transport.clone());
        parser.on_read_avail(b"\r\n\r\nGET /x HTTP/1.1\r\n\r\n");
        dispatcher.stop();
        // The request reached the dispatcher: with no servlet registered the
        // job responded 404 rather than failing at the parse stage.
        assert!(transport.sent_text().starts_with("HTTP/1.1 404"));
        assert!(!transport.read_shutdown.load(Ordering::SeqCst));
    }

    #[test]
    fn malformed_request_line_is_refused() {
        let transport = MockTransport::new();
        let (mut parser, dispatcher) = session(transport.clone());
        parser.on_read_avail(b"GET-ONLY\r\n");
        dispatcher.stop();
        assert!(transport.sent_text().starts_with("HTTP/1.1 400"));
        assert!(transport.read_shutdown.load(Ordering::SeqCst));
    }

    #[test]
    fn header_without_colon_is_refused() {
        let transport = MockTransport::new();
        let (mut parser, dispatcher) = session(transport.clone());
        parser.on_read_avail(b"GET / HTTP/1.1\r\nBadHeader\r\n");
        dispatcher.stop();
        assert!(transport.sent_text().starts_with("HTTP/1.1 400"));
    }

    #[test]
    fn relative_uri_is_refused() {
        let transport = MockTransport::new();
        let (mut parser, dispatcher) = session(transport.clone());
        parser.on_read_avail(b"GET x HTTP/1.1\r\n\r\n");
        dispatcher.stop();
        assert!(transport.sent_text().starts_with("HTTP/1.1 400"));
    }

    #[test]
    fn byte_at_a_time_feeding_works() {
        let transport = MockTransport::new();
        let (mut parser, dispatcher) = session(transport.clone());
        for byte in b"GET /slow HTTP/1.1\r\n\r\n" {
            parser.on_read_avail(std::slice::from_ref(byte));
        }
        dispatcher.stop();
        assert!(transport.sent_text().starts_with("HTTP/1.1 404"));
    }

    #[test]
    fn oversized_request_gets_413_and_read_shutdown() {
        let transport = MockTransport::new();
        let (mut parser, dispatcher) = session(transport.clone());
        let huge = vec![b'a'; MAX_REQUEST_LENGTH];
        parser.on_read_avail(&huge);
        dispatcher.stop();
        assert!(transport.sent_text().starts_with("HTTP/1.1 413"));
        assert!(transport.read_shutdown.load(Ordering::SeqCst));
    }
}
