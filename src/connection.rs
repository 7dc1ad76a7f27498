use crate::numbers::NumbersTracker;
use crate::record::RECORD_DIGITS;
use crate::server::Lifecycle;
use crate::NumlogError;
use std::io::{self, BufRead, BufReader, Cursor, ErrorKind, Read};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Line that asks the whole server to stop, matched case-insensitively
pub const TERMINATE_COMMAND: &str = "terminate";

/// Longest line worth reading: a record plus `\r\n`
pub const MAX_LINE_BYTES: usize = RECORD_DIGITS + 2;

/// A client's byte stream, closed in both directions when its worker is done
pub trait ClientStream: Read {
    fn close(&self) -> io::Result<()> {
        Ok(())
    }
}

impl ClientStream for TcpStream {
    fn close(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

impl<T: AsRef<[u8]>> ClientStream for Cursor<T> {}

/// Why a connection's worker stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// The server was already stopping when the worker got to run
    Skipped,
    BlankLine,
    EndOfStream,
    /// A malformed line, or one longer than `MAX_LINE_BYTES`
    InvalidRecord,
    /// The record store failed; server shutdown has been requested
    StoreFailure,
    ReadFailure,
}

/// Reads one client's lines and feeds them to the tracker
pub struct ConnectionWorker<S> {
    tracker: Arc<NumbersTracker>,
    lifecycle: Arc<Lifecycle>,
    stream: S,
    peer: Option<SocketAddr>,
}

impl<S: ClientStream> ConnectionWorker<S> {
    pub fn new(tracker: Arc<NumbersTracker>, lifecycle: Arc<Lifecycle>, stream: S) -> Self {
        Self {
            tracker,
            lifecycle,
            stream,
            peer: None,
        }
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Process the connection until a blank line, end of stream, or an error.
    ///
    /// The stream is shut down in both directions on every exit path.
    pub fn run(mut self) -> ConnectionOutcome {
        let peer = self.peer;
        let outcome = if self.lifecycle.is_running() {
            self.read_lines()
        } else {
            debug!(?peer, "server stopping, dropping connection unread");
            ConnectionOutcome::Skipped
        };

        match self.stream.close() {
            Ok(()) => {}
            // The peer may already have gone
            Err(e) if e.kind() == ErrorKind::NotConnected => {}
            Err(e) => debug!(?peer, "closing connection failed: {}", e),
        }
        debug!(?peer, ?outcome, "connection closed");
        outcome
    }

    fn read_lines(&mut self) -> ConnectionOutcome {
        let peer = self.peer;
        let mut reader = BufReader::new(&mut self.stream);
        let mut buf = Vec::with_capacity(MAX_LINE_BYTES);

        loop {
            buf.clear();
            match (&mut reader).take(MAX_LINE_BYTES as u64).read_until(b'\n', &mut buf) {
                Ok(0) => return ConnectionOutcome::EndOfStream,
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(?peer, "socket read failed: {}", e);
                    return ConnectionOutcome::ReadFailure;
                }
            }

            if buf.len() == MAX_LINE_BYTES && buf.last() != Some(&b'\n') {
                debug!(?peer, "line longer than {} bytes, closing connection", MAX_LINE_BYTES);
                return ConnectionOutcome::InvalidRecord;
            }

            let line = strip_line_ending(&buf);
            if line.is_empty() {
                return ConnectionOutcome::BlankLine;
            }
            let text = String::from_utf8_lossy(line);

            if text.eq_ignore_ascii_case(TERMINATE_COMMAND) {
                info!(?peer, "terminate received");
                self.lifecycle.request_shutdown();
                continue;
            }

            match self.tracker.add_number(&text) {
                Ok(_) => {}
                Err(NumlogError::InvalidRecord(record)) => {
                    debug!(?peer, "invalid record {:?}, closing connection", record);
                    return ConnectionOutcome::InvalidRecord;
                }
                Err(e) => {
                    error!("IO error while adding number. Shutting down server: {}", e);
                    self.lifecycle.request_shutdown();
                    return ConnectionOutcome::StoreFailure;
                }
            }
        }
    }
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
