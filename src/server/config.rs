//! Ingest listener configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::protocol::constants::*;

/// RTMP ingest options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Chunk size announced after `connect`
    pub chunk_size: u32,

    pub window_ack_size: u32,

    pub peer_bandwidth: u32,

    /// Handshake must complete within this time
    pub connection_timeout: Duration,

    /// Disconnect if nothing is received for this long
    pub idle_timeout: Duration,

    /// Disable Nagle's algorithm
    pub tcp_nodelay: bool,

    /// Initial read buffer capacity
    pub read_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 1935)),
            max_connections: 0,
            chunk_size: RECOMMENDED_CHUNK_SIZE,
            window_ack_size: DEFAULT_WINDOW_ACK_SIZE,
            peer_bandwidth: DEFAULT_PEER_BANDWIDTH,
            connection_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
            tcp_nodelay: true,
            read_buffer_size: 64 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Clamped to the protocol's valid range
    pub fn chunk_size(mut self, size: u32) -> Self {
        self.chunk_size = size.clamp(DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE);
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 1935);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.chunk_size, RECOMMENDED_CHUNK_SIZE);
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_chunk_size_clamped() {
        assert_eq!(
            ServerConfig::default().chunk_size(u32::MAX).chunk_size,
            MAX_CHUNK_SIZE
        );
        assert_eq!(
            ServerConfig::default().chunk_size(1).chunk_size,
            DEFAULT_CHUNK_SIZE
        );
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:1935".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .max_connections(50)
            .chunk_size(8192)
            .connection_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(30))
            .tcp_nodelay(false);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.chunk_size, 8192);
        assert_eq!(config.connection_timeout, Duration::from_secs(5));
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert!(!config.tcp_nodelay);
    }
}
