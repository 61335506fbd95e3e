//! Accept loop and worker supervision
//!
//! Each accepted connection runs as its own task. Handles are kept so that
//! shutdown can wait for in-flight sessions (up to a grace period) and abort
//! whatever is still running after it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use aesd_core::{AesdError, SharedStore};

use crate::backing::BackingFile;
use crate::error::{ServerError, ServerResult};
use crate::session::{ConnectionSession, SessionConfig, SessionOutcome};

/// Default time in-flight sessions get to finish on shutdown
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Pause after a failed accept so a persistent error (e.g. fd exhaustion)
/// does not spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Accepts connections and spawns a [`ConnectionSession`] for each
pub struct Dispatcher {
    listener: TcpListener,
    store: SharedStore,
    session_config: SessionConfig,
    mirror: Option<Arc<BackingFile>>,
    shutdown_grace: Duration,
}

impl Dispatcher {
    pub fn new(
        listener: TcpListener,
        store: SharedStore,
        session_config: SessionConfig,
        mirror: Option<Arc<BackingFile>>,
    ) -> Self {
        Self {
            listener,
            store,
            session_config,
            mirror,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Set how long in-flight sessions may run after shutdown is signalled
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown_rx` fires, then drain workers
    ///
    /// Returns the number of connections accepted.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> usize {
        let mut workers: Vec<JoinHandle<()>> = Vec::new();
        let mut accepted = 0usize;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Dispatcher shutting down");
                    break;
                }
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            accepted += 1;
                            workers.retain(|w| !w.is_finished());
                            workers.push(self.spawn_session(stream, peer));
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                    }
                }
            }
        }

        let Self {
            listener,
            shutdown_grace,
            ..
        } = self;
        drop(listener);

        drain(workers, shutdown_grace).await;
        accepted
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) -> JoinHandle<()> {
        info!(peer = %peer, "Accepted connection");

        let session = ConnectionSession::new(
            stream,
            peer,
            self.store.clone(),
            &self.session_config,
            self.mirror.clone(),
        );

        tokio::spawn(async move {
            log_outcome(peer, session.run().await);
            info!(peer = %peer, "Closed connection");
        })
    }
}

fn log_outcome(peer: SocketAddr, result: ServerResult<SessionOutcome>) {
    match result {
        Ok(outcome) => debug!(peer = %peer, ?outcome, "Session complete"),
        Err(ServerError::Core(AesdError::OutOfRange {
            record_index,
            intra_offset,
        })) => {
            debug!(
                peer = %peer,
                record_index,
                intra_offset,
                "Seek out of range, closed without response"
            );
        }
        Err(ServerError::Core(e)) if e.is_retryable() => {
            warn!(peer = %peer, error = %e, "Session gave up waiting for the store");
        }
        Err(e) => warn!(peer = %peer, error = %e, "Session failed"),
    }
}

/// Wait for workers until `grace` elapses, then abort the rest
async fn drain(workers: Vec<JoinHandle<()>>, grace: Duration) {
    let deadline = Instant::now() + grace;
    let mut aborted = 0usize;

    for mut worker in workers {
        if tokio::time::timeout_at(deadline, &mut worker).await.is_err() {
            worker.abort();
            aborted += 1;
        }
    }

    if aborted > 0 {
        warn!(aborted, "Aborted sessions still running after shutdown grace");
    }
}
