//! WebSocket client transport
//!
//! Each upgraded socket becomes one hub [`Client`]. A writer task drains the
//! client's queue into the socket; the upgrade task itself reads frames and
//! submits them to the hub's inbound path. Whichever side finishes first
//! tears the other down.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use thiserror::Error;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};

use crate::hub::{Client, ClientId, ClientReceiver, HubHandle, Message, DEFAULT_QUEUE_CAPACITY};

/// Per-connection settings shared by both hubs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Outbound queue depth before a viewer is considered slow
    pub queue_capacity: usize,

    /// Keepalive ping period
    #[serde(with = "secs")]
    pub ping_interval: Duration,

    /// Longest a single frame write may block before the socket is dropped
    #[serde(with = "secs")]
    pub write_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            ping_interval: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
        }
    }
}

impl HubConfig {
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Zero is ignored; the interval timer requires a non-zero period
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.ping_interval = interval;
        }
        self
    }

    pub fn write_timeout(mut self, limit: Duration) -> Self {
        self.write_timeout = limit;
        self
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Serve one upgraded socket until either side goes away
pub async fn serve_client(socket: WebSocket, addr: SocketAddr, hub: HubHandle, config: HubConfig) {
    let (sink, stream) = socket.split();
    serve_split(sink, stream, addr, hub, config).await;
}

/// [`serve_client`] over an already split socket
pub async fn serve_split<W, R, E>(
    sink: W,
    mut stream: R,
    addr: SocketAddr,
    hub: HubHandle,
    config: HubConfig,
) where
    W: Sink<WsMessage> + Unpin + Send + 'static,
    W::Error: std::error::Error + Send + 'static,
    R: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: fmt::Display,
{
    let (client, rx) = Client::with_capacity(addr, config.queue_capacity);
    let client_id = client.id();
    hub.register(client);
    tracing::debug!(client_id = %client_id, peer = %addr, "WebSocket client connected");

    let mut writer = tokio::spawn(async move {
        if let Err(e) = write_loop(sink, rx, config).await {
            tracing::debug!(client_id = %client_id, error = %e, "WebSocket write failed");
        }
    });

    // The writer ends when the hub drops the queue or the socket stops
    // accepting frames; the read half is dropped with it on return.
    tokio::select! {
        _ = read_loop(&mut stream, client_id, addr, &hub) => writer.abort(),
        _ = &mut writer => {}
    }

    hub.unregister(client_id);
    tracing::debug!(client_id = %client_id, peer = %addr, "WebSocket client disconnected");
}

#[derive(Debug, Error)]
enum WriteError<E: std::error::Error + 'static> {
    #[error("socket write failed: {0}")]
    Sink(#[source] E),

    #[error("socket write blocked for {0:?}")]
    Timeout(Duration),
}

async fn write_loop<W>(mut sink: W, mut rx: ClientReceiver, config: HubConfig) -> Result<(), WriteError<W::Error>>
where
    W: Sink<WsMessage> + Unpin,
    W::Error: std::error::Error + 'static,
{
    let mut ping = interval_at(Instant::now() + config.ping_interval, config.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let outgoing = tokio::select! {
            payload = rx.recv() => match payload {
                Some(data) => frame(data),
                None => {
                    // Hub dropped us: unregistered or too slow
                    let _ = timeout(config.write_timeout, sink.send(WsMessage::Close(None))).await;
                    return Ok(());
                }
            },
            _ = ping.tick() => WsMessage::Ping(Bytes::new()),
        };

        timeout(config.write_timeout, sink.send(outgoing))
            .await
            .map_err(|_| WriteError::Timeout(config.write_timeout))?
            .map_err(WriteError::Sink)?;
    }
}

async fn read_loop<R, E>(stream: &mut R, client_id: ClientId, addr: SocketAddr, hub: &HubHandle)
where
    R: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: fmt::Display,
{
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => {
                hub.submit_inbound(Message::new(Bytes::copy_from_slice(text.as_str().as_bytes()), addr));
            }
            Ok(WsMessage::Binary(data)) => hub.submit_inbound(Message::new(data, addr)),
            Ok(WsMessage::Close(_)) => break,
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {}
            Err(e) => {
                tracing::debug!(client_id = %client_id, error = %e, "WebSocket read failed");
                break;
            }
        }
    }
}

/// Text frame for UTF-8 payloads, binary otherwise
fn frame(data: Bytes) -> WsMessage {
    match std::str::from_utf8(&data) {
        Ok(text) => WsMessage::Text(text.to_owned().into()),
        Err(_) => WsMessage::Binary(data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use tokio::sync::mpsc;

    use crate::hub::{Hub, InboundHandler};

    type TestSink = Pin<Box<dyn Sink<WsMessage, Error = axum::Error> + Send>>;
    type TestStream = Pin<Box<dyn Stream<Item = Result<WsMessage, axum::Error>> + Send>>;

    fn addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    /// In-memory socket halves: frames written by the server, frames to feed it
    fn socket() -> (TestSink, mpsc::UnboundedReceiver<WsMessage>, TestStream, mpsc::UnboundedSender<WsMessage>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel::<WsMessage>();
        let sink = futures_util::sink::unfold(out_tx, |tx, msg: WsMessage| async move {
            tx.send(msg).map_err(axum::Error::new)?;
            Ok::<_, axum::Error>(tx)
        });

        let (in_tx, in_rx) = mpsc::unbounded_channel::<WsMessage>();
        let stream = futures_util::stream::unfold(in_rx, |mut rx| async move {
            rx.recv().await.map(|msg| (Ok::<_, axum::Error>(msg), rx))
        });

        (Box::pin(sink), out_rx, Box::pin(stream), in_tx)
    }

    /// Peer that stopped reading: the socket never accepts another frame
    struct Stalled;

    impl Sink<WsMessage> for Stalled {
        type Error = axum::Error;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _item: WsMessage) -> Result<(), Self::Error> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    fn silent_stream() -> TestStream {
        Box::pin(futures_util::stream::pending())
    }

    async fn wait_registered(handle: &HubHandle) {
        while handle.stats().await.unwrap().clients == 0 {
            tokio::task::yield_now().await;
        }
    }

    struct Forward(mpsc::UnboundedSender<Message>);

    impl InboundHandler for Forward {
        fn on_inbound(&mut self, message: Message) {
            let _ = self.0.send(message);
        }
    }

    #[test]
    fn test_frame_kind() {
        assert!(matches!(frame(Bytes::from_static(b"{\"kind\":\"started\"}")), WsMessage::Text(_)));
        assert!(matches!(frame(Bytes::from_static(&[0xff, 0x00])), WsMessage::Binary(_)));
    }

    #[tokio::test]
    async fn test_broadcast_written_to_socket() {
        let (hub, handle) = Hub::new("updates");
        hub.spawn();

        let (sink, mut written, stream, feed) = socket();
        let task = tokio::spawn(serve_split(sink, stream, addr(), handle.clone(), HubConfig::default()));

        // Wait until registered
        while handle.stats().await.unwrap().clients == 0 {
            tokio::task::yield_now().await;
        }

        handle.broadcast("hello");
        match written.recv().await.unwrap() {
            WsMessage::Text(text) => assert_eq!(text.as_str(), "hello"),
            other => panic!("unexpected frame {other:?}"),
        }

        feed.send(WsMessage::Close(None)).unwrap();
        task.await.unwrap();
        assert_eq!(handle.stats().await.unwrap().clients, 0);
    }

    #[tokio::test]
    async fn test_inbound_frames_submitted() {
        let (seen_tx, mut seen) = mpsc::unbounded_channel();
        let (hub, handle) = Hub::with_handler("status", Forward(seen_tx));
        hub.spawn();

        let (sink, _written, stream, feed) = socket();
        tokio::spawn(serve_split(sink, stream, addr(), handle, HubConfig::default()));

        feed.send(WsMessage::Text("status".into())).unwrap();
        feed.send(WsMessage::Binary(Bytes::from_static(&[1, 2, 3]))).unwrap();

        let first = seen.recv().await.unwrap();
        assert_eq!(first.data, "status");
        assert_eq!(first.origin, Some(addr()));
        assert_eq!(seen.recv().await.unwrap().data, Bytes::from_static(&[1, 2, 3]));
    }

    #[tokio::test]
    async fn test_closed_queue_sends_close_frame() {
        let (client, rx) = Client::new(addr());
        let (sink, mut written, _stream, _feed) = socket();

        client.try_send(Bytes::from_static(b"last")).unwrap();
        drop(client);

        write_loop(sink, rx, HubConfig::default()).await.unwrap();
        assert!(matches!(written.recv().await.unwrap(), WsMessage::Text(_)));
        assert!(matches!(written.recv().await.unwrap(), WsMessage::Close(None)));
    }

    #[tokio::test]
    async fn test_ping_sent_when_idle() {
        let (hub, handle) = Hub::new("updates");
        hub.spawn();

        let (sink, mut written, stream, _feed) = socket();
        let config = HubConfig::default().ping_interval(Duration::from_millis(10));
        tokio::spawn(serve_split(sink, stream, addr(), handle, config));

        assert!(matches!(written.recv().await.unwrap(), WsMessage::Ping(_)));
    }

    #[tokio::test]
    async fn test_stalled_peer_torn_down() {
        let (hub, handle) = Hub::new("updates");
        hub.spawn();

        let config = HubConfig::default()
            .queue_capacity(1)
            .write_timeout(Duration::from_millis(50));
        let task = tokio::spawn(serve_split(Stalled, silent_stream(), addr(), handle.clone(), config));
        wait_registered(&handle).await;

        for _ in 0..4 {
            handle.broadcast("frame");
        }

        // Peer neither reads nor closes; the connection must still end
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("stalled connection was not torn down")
            .unwrap();
        assert_eq!(handle.stats().await.unwrap().clients, 0);
    }

    #[tokio::test]
    async fn test_write_error_ends_connection() {
        let (hub, handle) = Hub::new("updates");
        hub.spawn();

        let sink: TestSink = Box::pin(futures_util::sink::unfold((), |(), _msg: WsMessage| async move {
            Err::<(), _>(axum::Error::new(std::io::Error::from(std::io::ErrorKind::BrokenPipe)))
        }));
        let task = tokio::spawn(serve_split(sink, silent_stream(), addr(), handle.clone(), HubConfig::default()));
        wait_registered(&handle).await;

        handle.broadcast("frame");

        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert_eq!(handle.stats().await.unwrap().clients, 0);
    }

    #[tokio::test]
    async fn test_write_error_carries_source() {
        let (client, rx) = Client::new(addr());
        let sink = futures_util::sink::unfold((), |(), _msg: WsMessage| async move {
            Err::<(), _>(axum::Error::new(std::io::Error::from(std::io::ErrorKind::BrokenPipe)))
        });

        client.try_send(Bytes::from_static(b"frame")).unwrap();
        let err = write_loop(Box::pin(sink), rx, HubConfig::default()).await.unwrap_err();

        assert!(matches!(err, WriteError::Sink(_)));
        assert!(std::error::Error::source(&err).is_some());
        drop(client);
    }

    #[test]
    fn test_zero_ping_interval_ignored() {
        let config = HubConfig::default().ping_interval(Duration::ZERO);
        assert_eq!(config.ping_interval, HubConfig::default().ping_interval);
    }

    #[test]
    fn test_config_from_toml() {
        let config: HubConfig =
            toml::from_str("queue_capacity = 16\nping_interval = 5\nwrite_timeout = 3").unwrap();
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.ping_interval, Duration::from_secs(5));
        assert_eq!(config.write_timeout, Duration::from_secs(3));

        let config: HubConfig = toml::from_str("").unwrap();
        assert_eq!(config, HubConfig::default());
    }
}
