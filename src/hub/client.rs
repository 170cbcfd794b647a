//! Client connection handle

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;

use super::error::CapacityError;

/// Outbound queue capacity used when none is configured
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one connection instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    fn next() -> Self {
        Self(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Write side of one live connection
///
/// Owned by the hub it is registered with. Dropping it closes the queue,
/// which ends the connection's writer task.
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    remote_addr: SocketAddr,
    tx: mpsc::Sender<Bytes>,
}

/// Drained by the connection's writer task
pub type ClientReceiver = mpsc::Receiver<Bytes>;

impl Client {
    pub fn new(remote_addr: SocketAddr) -> (Self, ClientReceiver) {
        Self::with_capacity(remote_addr, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(remote_addr: SocketAddr, capacity: usize) -> (Self, ClientReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let client = Self {
            id: ClientId::next(),
            remote_addr,
            tx,
        };
        (client, rx)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Non-blocking enqueue
    pub fn try_send(&self, data: Bytes) -> Result<(), CapacityError> {
        self.tx.try_send(data).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => CapacityError::Full,
            mpsc::error::TrySendError::Closed(_) => CapacityError::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn test_ids_are_unique() {
        let (a, _rx_a) = Client::new(addr());
        let (b, _rx_b) = Client::new(addr());

        assert_ne!(a.id(), b.id());
        assert!(a.id().to_string().starts_with("client-"));
    }

    #[test]
    fn test_full_queue() {
        let (client, mut rx) = Client::with_capacity(addr(), 2);

        assert_eq!(client.try_send(Bytes::from_static(b"1")), Ok(()));
        assert_eq!(client.try_send(Bytes::from_static(b"2")), Ok(()));
        assert_eq!(
            client.try_send(Bytes::from_static(b"3")),
            Err(CapacityError::Full)
        );

        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"1"));
        assert_eq!(client.try_send(Bytes::from_static(b"3")), Ok(()));
    }

    #[test]
    fn test_closed_queue() {
        let (client, rx) = Client::new(addr());
        drop(rx);

        assert_eq!(
            client.try_send(Bytes::from_static(b"x")),
            Err(CapacityError::Closed)
        );
    }

    #[test]
    fn test_drop_closes_receiver() {
        let (client, mut rx) = Client::new(addr());
        drop(client);

        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
