//! Thin TCP accept loop feeding the HTTP parser.
//!
//! One reader thread per connection keeps the core simple: all interesting
//! concurrency lives in the dispatcher and the timer daemon, and the reader
//! does nothing but shovel bytes into [`HttpSession::on_read_avail`].

use crate::http::servlet::ServletRegistry;
use crate::http::session::HttpSession;
use crate::job::JobDispatcher;
use crate::session::TcpSession;
use crate::{Error, Result};
use std::io::Read;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const READ_BUFFER_SIZE: usize = 4096;

/// Handle to a running HTTP server.
pub struct ServerHandle {
    addr: SocketAddr,
    stopping: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// The address the listener actually bound, useful with port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Block until the listener accepts connections.
    pub fn wait_ready(&self) -> Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "server not ready",
        )))
    }

    /// Stop accepting connections and join the accept thread. Connections
    /// already being read continue until their peers close.
    pub fn stop(mut self) {
        info!(addr = %self.addr, "stopping http server");
        self.stopping.store(true, Ordering::Release);
        // Poke the blocking accept so the loop observes the flag.
        let _ = TcpStream::connect(self.addr);
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
    }

    /// Park the caller on the accept thread, serving until process exit.
    pub fn join(mut self) {
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Bind `addr` (e.g. `"127.0.0.1:8080"`) and start serving HTTP.
///
/// Parsed requests are dispatched through `dispatcher` against `servlets`.
pub fn start_http_server(
    addr: &str,
    dispatcher: Arc<JobDispatcher>,
    servlets: Arc<ServletRegistry>,
) -> Result<ServerHandle> {
    let resolved = addr
        .to_socket_addrs()
        .map_err(|_| Error::InvalidAddress(addr.to_string()))?
        .next()
        .ok_or_else(|| Error::InvalidAddress(addr.to_string()))?;
    let listener = TcpListener::bind(resolved)?;
    let addr = listener.local_addr()?;
    let stopping = Arc::new(AtomicBool::new(false));
    info!(%addr, "http server listening");

    let accept_stopping = stopping.clone();
    let accept_thread = std::thread::Builder::new()
        .name("http-accept".to_string())
        .spawn(move || accept_loop(listener, accept_stopping, dispatcher, servlets))
        .map_err(Error::Io)?;

    Ok(ServerHandle {
        addr,
        stopping,
        accept_thread: Some(accept_thread),
    })
}

fn accept_loop(
    listener: TcpListener,
    stopping: Arc<AtomicBool>,
    dispatcher: Arc<JobDispatcher>,
    servlets: Arc<ServletRegistry>,
) {
    loop {
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(err) => {
                if stopping.load(Ordering::Acquire) {
                    break;
                }
                warn!(error = %err, "accept failed");
                continue;
            }
        };
        if stopping.load(Ordering::Acquire) {
            break;
        }
        debug!(%peer, "accepted connection");
        let dispatcher = dispatcher.clone();
        let servlets = servlets.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("http-conn-{peer}"))
            .spawn(move || connection_loop(stream, dispatcher, servlets));
        if let Err(err) = spawned {
            warn!(error = %err, %peer, "failed to spawn connection reader");
        }
    }
    debug!("accept loop exited");
}

fn connection_loop(
    mut stream: TcpStream,
    dispatcher: Arc<JobDispatcher>,
    servlets: Arc<ServletRegistry>,
) {
    let session = match TcpSession::new(&stream) {
        Ok(session) => session,
        Err(err) => {
            warn!(error = %err, "failed to set up session");
            return;
        }
    };
    let mut parser = HttpSession::new(session.clone(), dispatcher, servlets);
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    loop {
        match stream.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                parser.on_read_avail(&buffer[..n]);
                if session.is_read_shutdown() {
                    break;
                }
            }
            Err(err) => {
                debug!(session = %session.id(), error = %err, "read failed");
                break;
            }
        }
    }
    // Responses for already-parsed requests are still owed; the session must
    // outlive them or their jobs are cancelled by the weak upgrade.
    let deadline = Instant::now() + Duration::from_secs(5);
    while parser.pending_requests() > 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    debug!(session = %session.id(), "connection reader exiting");
}

/// Dial `host:port` and return the session for the established connection.
///
/// The caller drives reads on the returned stream; the session owns the
/// write half, exactly as for accepted connections.
pub fn connect_session(host: &str, port: u16) -> Result<(Arc<TcpSession>, TcpStream)> {
    let stream = TcpStream::connect((host, port))?;
    let session = TcpSession::new(&stream)?;
    info!(peer = %session.peer(), "outbound connection established");
    Ok((session, stream))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolvable_address_is_reported() {
        let dispatcher = JobDispatcher::start(1);
        let servlets = Arc::new(ServletRegistry::new());
        let result = start_http_server("256.256.256.256:0", dispatcher.clone(), servlets);
        assert!(matches!(result, Err(Error::InvalidAddress(_))));
        dispatcher.stop();
    }
}
