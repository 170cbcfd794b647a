//! RTMP ingest listener
//!
//! Accepts TCP connections and spawns one [`Connection`] task per peer.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::error::Result;
use crate::registry::StreamRegistry;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::store::MetadataStore;

/// RTMP ingest server
pub struct IngestServer<S: MetadataStore> {
    config: ServerConfig,
    registry: Arc<StreamRegistry<S>>,
    next_connection_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl<S: MetadataStore> IngestServer<S> {
    pub fn new(config: ServerConfig, registry: Arc<StreamRegistry<S>>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            registry,
            next_connection_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    pub fn registry(&self) -> &Arc<StreamRegistry<S>> {
        &self.registry
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run until the process exits
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run until `shutdown` completes
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Accept on an already bound listener until `shutdown` completes
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tracing::info!(addr = %listener.local_addr()?, "RTMP ingest listening");

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Ingest listener shutting down");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        }
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => self.handle_connection(socket, peer_addr),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        let permit = match &self.connection_semaphore {
            Some(sem) => match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            },
            None => None,
        };

        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(connection_id, peer = %peer_addr, "New connection");

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::warn!(connection_id, error = %e, "Failed to set TCP_NODELAY");
            }
        }

        let config = self.config.clone();
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            let _permit = permit;
            let mut connection = Connection::new(connection_id, socket, peer_addr, config, registry);

            match connection.run().await {
                Ok(()) => tracing::debug!(connection_id, "Connection closed"),
                Err(e) if e.is_rejection() => {
                    tracing::info!(connection_id, peer = %peer_addr, reason = %e, "Publisher rejected");
                }
                Err(e) => tracing::debug!(connection_id, error = %e, "Connection error"),
            }
        });
    }
}
