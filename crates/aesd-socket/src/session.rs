//! Per-connection session
//!
//! A session handles exactly one exchange:
//!
//! ```text
//! Reading -> Classifying -> Mutating -> Responding -> Closed
//! ```
//!
//! The record is read before the store lock is taken, so a slow sender
//! never blocks anyone else. From Mutating through the end of Responding the
//! lock is held, so the client sees a snapshot consistent with its own
//! mutation. A slow reader therefore stalls every other writer for the
//! length of its read-back.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument, warn};

use aesd_core::seek::{self, Command};
use aesd_core::{INITIAL_BUFFER_SIZE, LineFramer, SharedStore};

use crate::backing::BackingFile;
use crate::error::ServerResult;

/// Framing settings for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Starting size of the framing buffer
    pub initial_buffer_size: usize,
    /// Optional cap on a single record's size
    pub max_record_len: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            initial_buffer_size: INITIAL_BUFFER_SIZE,
            max_record_len: None,
        }
    }
}

impl SessionConfig {
    fn framer(&self) -> LineFramer {
        let framer = LineFramer::with_initial_capacity(self.initial_buffer_size);
        match self.max_record_len {
            Some(max) => framer.with_max_record_len(max),
            None => framer,
        }
    }
}

/// Where a session is in its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Reading,
    Classifying,
    Mutating,
    Responding,
    Closed,
}

/// What a completed session did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// A payload record was appended and the whole log sent back
    Appended { evicted: bool, bytes_sent: usize },
    /// A seek directive was resolved and the log tail sent back
    Seeked { offset: usize, bytes_sent: usize },
    /// The peer closed before a terminator; nothing was stored
    Replayed { bytes_sent: usize },
}

impl SessionOutcome {
    fn with_bytes_sent(self, sent: usize) -> Self {
        match self {
            Self::Appended { evicted, .. } => Self::Appended {
                evicted,
                bytes_sent: sent,
            },
            Self::Seeked { offset, .. } => Self::Seeked {
                offset,
                bytes_sent: sent,
            },
            Self::Replayed { .. } => Self::Replayed { bytes_sent: sent },
        }
    }

    /// Bytes streamed back to the client
    pub fn bytes_sent(&self) -> usize {
        match self {
            Self::Appended { bytes_sent, .. }
            | Self::Seeked { bytes_sent, .. }
            | Self::Replayed { bytes_sent } => *bytes_sent,
        }
    }
}

/// One client exchange over a bidirectional stream
pub struct ConnectionSession<S> {
    stream: S,
    peer: SocketAddr,
    store: SharedStore,
    framer: LineFramer,
    mirror: Option<Arc<BackingFile>>,
    state: SessionState,
}

impl<S> ConnectionSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        peer: SocketAddr,
        store: SharedStore,
        config: &SessionConfig,
        mirror: Option<Arc<BackingFile>>,
    ) -> Self {
        Self {
            stream,
            peer,
            store,
            framer: config.framer(),
            mirror,
            state: SessionState::Reading,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the exchange to completion and close the stream
    ///
    /// On error the connection is closed without a response body.
    #[instrument(skip(self), fields(peer = %self.peer))]
    pub async fn run(mut self) -> ServerResult<SessionOutcome> {
        let result = self.serve().await;
        self.transition(SessionState::Closed);
        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "Stream shutdown failed");
        }
        result
    }

    async fn serve(&mut self) -> ServerResult<SessionOutcome> {
        let frame = self.framer.read_record(&mut self.stream).await?;

        self.transition(SessionState::Classifying);
        let command = if frame.complete {
            Some(seek::classify(frame.bytes))
        } else {
            debug!(len = frame.bytes.len(), "Discarding unterminated record");
            None
        };

        self.transition(SessionState::Mutating);
        let shared = self.store.clone();
        let mut store = shared.lock().await?;

        let (offset, outcome) = match command {
            Some(Command::Append(record)) => {
                let evicted = store.append(record.clone());
                if let Some(mirror) = &self.mirror {
                    if let Err(e) = mirror.append(&record).await {
                        warn!(error = %e, "Failed to mirror record to backing file");
                    }
                }
                debug!(len = record.len(), evicted, records = store.len(), "Appended record");
                (0, SessionOutcome::Appended { evicted, bytes_sent: 0 })
            }
            Some(Command::Seek(directive)) => {
                let offset = store.resolve(
                    directive.record_index as usize,
                    directive.intra_offset as usize,
                )?;
                debug!(%directive, offset, "Resolved seek");
                (offset, SessionOutcome::Seeked { offset, bytes_sent: 0 })
            }
            None => (0, SessionOutcome::Replayed { bytes_sent: 0 }),
        };

        self.transition(SessionState::Responding);
        let body = store.read_from(offset);
        self.stream.write_all(&body).await?;
        self.stream.flush().await?;
        drop(store);

        Ok(outcome.with_bytes_sent(body.len()))
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "Session state change");
        self.state = next;
    }
}
