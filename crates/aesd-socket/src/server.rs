//! Server assembly and lifecycle
//!
//! [`AesdServer`] owns every piece of process-wide state: the store, the
//! listener, the optional backing file and the shutdown fan-out. `run`
//! serves until shutdown, then tears everything down in order: stop
//! accepting, drain sessions, stop the timer, clear the store, remove the
//! backing file.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use aesd_core::SharedStore;

use crate::backing::BackingFile;
use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{ServerError, ServerResult};
use crate::timestamp::TimestampAppender;

/// A bound, not yet running, command log server
pub struct AesdServer {
    config: ServerConfig,
    store: SharedStore,
    listener: TcpListener,
    mirror: Option<Arc<BackingFile>>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
}

/// Cloneable trigger for a running server's shutdown
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: broadcast::Sender<()>,
}

impl ShutdownHandle {
    /// Ask the server to stop; repeated calls are harmless
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl AesdServer {
    /// Validate the configuration, create the store, and bind the listener
    #[instrument(skip(config), fields(bind_addr = %config.bind_addr))]
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;
        let addr = config.socket_addr()?;

        let store = SharedStore::with_capacity(config.capacity)?
            .with_lock_timeout(config.lock_timeout());

        let mirror = match &config.backing_file {
            Some(path) => Some(Arc::new(BackingFile::create(path).await?)),
            None => None,
        };

        let listener = TcpListener::bind(addr).await.map_err(|e| ServerError::Bind {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;

        // Subscribed here so a trigger that arrives before `run` is not lost
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        info!(
            local_addr = %listener.local_addr()?,
            capacity = config.capacity,
            lock_timeout_ms = store.lock_timeout().as_millis() as u64,
            "Server bound"
        );

        Ok(Self {
            config,
            store,
            listener,
            mirror,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle to the live store
    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Serve until a [`ShutdownHandle`] fires, then tear down
    #[instrument(skip(self))]
    pub async fn run(self) -> ServerResult<()> {
        let Self {
            config,
            store,
            listener,
            mirror,
            shutdown_tx,
            shutdown_rx,
        } = self;

        let timer = config.timestamp_interval().map(|interval| {
            TimestampAppender::new(store.clone(), interval, mirror.clone())
                .spawn(shutdown_tx.subscribe())
        });

        let accepted = Dispatcher::new(listener, store.clone(), config.session(), mirror.clone())
            .with_shutdown_grace(config.shutdown_grace())
            .run(shutdown_rx)
            .await;

        // The timer subscribes late and misses a trigger sent before `run`
        let _ = shutdown_tx.send(());
        if let Some(timer) = timer {
            if let Err(e) = timer.await {
                warn!(error = %e, "Timestamp task ended abnormally");
            }
        }

        store.lock_unbounded().await.clear();

        if let Some(mirror) = mirror {
            if let Err(e) = mirror.remove().await {
                warn!(path = %mirror.path().display(), error = %e, "Failed to remove backing file");
            }
        }

        info!(accepted, "Server stopped");
        Ok(())
    }

    /// Serve until `signal` resolves
    pub async fn run_until<F>(self, signal: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = self.shutdown_handle();
        tokio::spawn(async move {
            signal.await;
            info!("Shutdown requested");
            handle.trigger();
        });
        self.run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config() -> ServerConfig {
        ServerConfig::default()
            .with_bind_addr("127.0.0.1:0")
            .with_timestamp_interval_secs(0)
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = AesdServer::bind(test_config()).await.unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
        assert_eq!(server.config().capacity, 10);
    }

    #[tokio::test]
    async fn test_store_uses_configured_lock_timeout() {
        let config = test_config().with_lock_timeout(Duration::from_millis(250));
        let server = AesdServer::bind(config).await.unwrap();
        assert_eq!(server.store().lock_timeout(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let result = AesdServer::bind(test_config().with_capacity(0)).await;
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let first = AesdServer::bind(test_config()).await.unwrap();
        let taken = first.local_addr().unwrap().to_string();
        let result = AesdServer::bind(test_config().with_bind_addr(taken)).await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_shutdown_before_run_still_stops() {
        let server = AesdServer::bind(test_config()).await.unwrap();
        let store = server.store();
        store.append(&b"one\n"[..]).await.unwrap();

        server.shutdown_handle().trigger();
        tokio::time::timeout(Duration::from_secs(5), server.run())
            .await
            .unwrap()
            .unwrap();

        assert!(store.snapshot().await.unwrap().is_empty());
    }
}
