//! Per-connection lifetime anchor.

use crate::http::session::SessionTransport;
use crate::job::JobCategory;
use std::fmt;
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use ulid::Ulid;

/// Opaque session identifier, used only for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Ulid);

impl SessionId {
    fn new() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One accepted (or dialed) TCP connection.
///
/// The session is the *category* of every job produced on its behalf: jobs
/// hold a `Weak` to it, so dropping the session cancels its pending work, and
/// a terminal job failure tears the socket down through `force_shutdown`.
///
/// The reader thread owns the read half; this object keeps a cloned handle
/// for writing, serialized by a mutex so dispatcher workers and the reactor
/// never interleave partial responses.
pub struct TcpSession {
    id: SessionId,
    peer: SocketAddr,
    writer: Mutex<TcpStream>,
    read_shutdown: AtomicBool,
}

impl TcpSession {
    pub fn new(stream: &TcpStream) -> io::Result<Arc<Self>> {
        let peer = stream.peer_addr()?;
        let writer = stream.try_clone()?;
        let session = Arc::new(Self {
            id: SessionId::new(),
            peer,
            writer: Mutex::new(writer),
            read_shutdown: AtomicBool::new(false),
        });
        debug!(session = %session.id, %peer, "session created");
        Ok(session)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Write a full buffer to the peer.
    pub fn send(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|poisoned| {
            // A poisoned writer only means another thread died mid-write;
            // the stream itself is still usable for a best-effort response.
            poisoned.into_inner()
        });
        writer.write_all(bytes)?;
        writer.flush()
    }

    /// Stop reading from the peer; queued responses can still be written.
    pub fn shutdown_read(&self) {
        if !self.read_shutdown.swap(true, Ordering::AcqRel) {
            debug!(session = %self.id, "shutting down read side");
            if let Ok(writer) = self.writer.lock() {
                let _ = writer.shutdown(Shutdown::Read);
            }
        }
    }

    pub fn is_read_shutdown(&self) -> bool {
        self.read_shutdown.load(Ordering::Acquire)
    }
}

impl JobCategory for TcpSession {
    fn force_shutdown(&self) {
        info!(session = %self.id, peer = %self.peer, "forcing session shutdown");
        self.read_shutdown.store(true, Ordering::Release);
        match self.writer.lock() {
            Ok(writer) => {
                let _ = writer.shutdown(Shutdown::Both);
            }
            Err(_) => warn!(session = %self.id, "writer poisoned during forced shutdown"),
        }
    }
}

impl SessionTransport for TcpSession {
    fn send(&self, bytes: &[u8]) -> io::Result<()> {
        TcpSession::send(self, bytes)
    }

    fn shutdown_read(&self) {
        TcpSession::shutdown_read(self);
    }
}

impl Drop for TcpSession {
    fn drop(&mut self) {
        debug!(session = %self.id, "session destroyed");
    }
}
