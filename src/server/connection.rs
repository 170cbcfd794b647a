//! Per-connection RTMP handling
//!
//! Drives one publisher from handshake to teardown:
//!
//! ```text
//! handshake ─► connect ─► releaseStream/FCPublish ─► createStream ─► publish
//!                                                                      │
//!                                  authenticate + open_session ◄───────┘
//!                                                                      │
//!            audio/video/onMetaData ◄── Publishing ──► FCUnpublish/deleteStream/EOF
//! ```
//!
//! Whatever ends the connection (EOF, error, idle timeout, shutdown), the
//! publish session is released through `close_owned`.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::amf::AmfValue;
use crate::error::{Error, HandshakeError, ProtocolError, Result};
use crate::media::codec::{CodecParams, StreamMetadata};
use crate::media::flv::VideoTagHeader;
use crate::protocol::chunk::{ChunkDecoder, ChunkEncoder, OutgoingMessage};
use crate::protocol::constants::{BANDWIDTH_LIMIT_DYNAMIC, PUBLISH_STREAM_ID};
use crate::protocol::handshake::Handshake;
use crate::protocol::message::{
    Command, ConnectParams, DataMessage, PublishParams, RtmpMessage, UserControlEvent,
};
use crate::registry::StreamRegistry;
use crate::server::config::ServerConfig;
use crate::session::SessionState;
use crate::stats::MediaKind;
use crate::store::MetadataStore;

/// One ingest connection
pub struct Connection<IO, S: MetadataStore> {
    io: IO,
    config: ServerConfig,
    registry: Arc<StreamRegistry<S>>,
    state: SessionState,
    read_buf: BytesMut,
    write_buf: BytesMut,
    decoder: ChunkDecoder,
    encoder: ChunkEncoder,
}

impl<IO, S> Connection<IO, S>
where
    IO: AsyncRead + AsyncWrite + Unpin,
    S: MetadataStore,
{
    pub fn new(
        connection_id: u64,
        io: IO,
        peer_addr: SocketAddr,
        config: ServerConfig,
        registry: Arc<StreamRegistry<S>>,
    ) -> Self {
        Self {
            io,
            state: SessionState::new(connection_id, peer_addr, config.window_ack_size),
            read_buf: BytesMut::with_capacity(config.read_buffer_size),
            write_buf: BytesMut::with_capacity(4096),
            config,
            registry,
            decoder: ChunkDecoder::new(),
            encoder: ChunkEncoder::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Serve the connection until it ends; the session is always released
    pub async fn run(&mut self) -> Result<()> {
        let result = self.serve().await;
        self.release();
        result
    }

    async fn serve(&mut self) -> Result<()> {
        match tokio::time::timeout(self.config.connection_timeout, self.handshake()).await {
            Ok(result) => result?,
            Err(_) => return Err(HandshakeError::Timeout.into()),
        }
        tracing::debug!(
            connection_id = self.state.connection_id,
            "Handshake complete"
        );

        loop {
            self.process_buffered().await?;
            self.flush().await?;

            let read = tokio::time::timeout(
                self.config.idle_timeout,
                self.io.read_buf(&mut self.read_buf),
            )
            .await;

            let n = match read {
                Ok(result) => result?,
                Err(_) => return Err(Error::IdleTimeout(self.config.idle_timeout)),
            };
            if n == 0 {
                tracing::debug!(connection_id = self.state.connection_id, "Peer closed connection");
                return Ok(());
            }

            if self.state.add_bytes_received(n as u64) {
                let sequence = self.state.mark_ack_sent();
                self.send(RtmpMessage::Acknowledgement { sequence });
            }
        }
    }

    async fn handshake(&mut self) -> Result<()> {
        let mut handshake = Handshake::new();

        while !handshake.is_done() {
            if let Some(response) = handshake.process(&mut self.read_buf)? {
                self.io.write_all(&response).await?;
                self.io.flush().await?;
                continue;
            }
            if handshake.is_done() {
                break;
            }
            if self.io.read_buf(&mut self.read_buf).await? == 0 {
                return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
            }
        }

        Ok(())
    }

    /// Decode and handle every complete message in the read buffer
    async fn process_buffered(&mut self) -> Result<()> {
        loop {
            let before = self.read_buf.len();
            match self.decoder.decode(&mut self.read_buf)? {
                Some(raw) => {
                    let message = RtmpMessage::from_raw(&raw)?;
                    self.handle_message(message).await?;
                }
                None if self.read_buf.len() == before => return Ok(()),
                None => {}
            }
        }
    }

    async fn handle_message(&mut self, message: RtmpMessage) -> Result<()> {
        match message {
            RtmpMessage::SetChunkSize(size) => {
                self.decoder.set_chunk_size(size)?;
                tracing::debug!(connection_id = self.state.connection_id, size, "Peer chunk size");
            }
            RtmpMessage::Abort { csid } => self.decoder.abort(csid),
            RtmpMessage::UserControl(UserControlEvent::PingRequest(ts)) => {
                self.send(RtmpMessage::UserControl(UserControlEvent::PingResponse(ts)));
            }
            RtmpMessage::Command(cmd) => self.handle_command(cmd).await?,
            RtmpMessage::Data(data) => self.handle_data(data),
            RtmpMessage::Video { timestamp, data } => {
                let Some(session) = self.state.session.as_ref() else {
                    return Ok(());
                };
                let keyframe = VideoTagHeader::parse(&data).is_some_and(|h| h.keyframe);
                self.registry
                    .record_media(session, MediaKind::Video { keyframe }, data.len(), timestamp);

                if let Some(params) = CodecParams::from_video(&data)? {
                    self.registry.open_session(session, vec![params])?;
                }
            }
            RtmpMessage::Audio { timestamp, data } => {
                let Some(session) = self.state.session.as_ref() else {
                    return Ok(());
                };
                self.registry
                    .record_media(session, MediaKind::Audio, data.len(), timestamp);

                if let Some(params) = CodecParams::from_audio(&data)? {
                    self.registry.open_session(session, vec![params])?;
                }
            }
            other => {
                tracing::trace!(
                    connection_id = self.state.connection_id,
                    type_id = other.type_id(),
                    "Ignoring message"
                );
            }
        }
        Ok(())
    }

    async fn handle_command(&mut self, cmd: Command) -> Result<()> {
        tracing::debug!(
            connection_id = self.state.connection_id,
            command = %cmd.name,
            transaction_id = cmd.transaction_id,
            "Command"
        );

        match cmd.name.as_str() {
            "connect" => self.on_connect(&cmd),
            "releaseStream" | "FCPublish" => {
                self.send_result(&cmd, vec![AmfValue::Undefined]);
            }
            "createStream" => {
                self.send_result(&cmd, vec![AmfValue::from(PUBLISH_STREAM_ID)]);
            }
            "publish" => return self.on_publish(&cmd).await,
            "FCUnpublish" | "closeStream" | "deleteStream" => {
                if self.end_publish() {
                    self.send(RtmpMessage::Command(Command::on_status(
                        PUBLISH_STREAM_ID,
                        "status",
                        "NetStream.Unpublish.Success",
                        "Stream unpublished.",
                    )));
                }
                if cmd.name == "FCUnpublish" {
                    self.send_result(&cmd, vec![AmfValue::Undefined]);
                }
            }
            "play" => {
                self.send(RtmpMessage::Command(Command::error(
                    cmd.transaction_id,
                    "NetStream.Play.Failed",
                    "Playback is not served over RTMP.",
                )));
            }
            _ => {
                if cmd.transaction_id > 0.0 {
                    self.send_result(&cmd, vec![]);
                }
            }
        }
        Ok(())
    }

    fn on_connect(&mut self, cmd: &Command) {
        let params = ConnectParams::from_command(cmd);
        tracing::info!(
            connection_id = self.state.connection_id,
            peer = %self.state.peer_addr,
            app = %params.app,
            encoder = %params.flash_ver,
            "Publisher connected"
        );
        self.state.on_connect(params);

        self.send(RtmpMessage::WindowAckSize(self.config.window_ack_size));
        self.send(RtmpMessage::SetPeerBandwidth {
            size: self.config.peer_bandwidth,
            limit_type: BANDWIDTH_LIMIT_DYNAMIC,
        });
        self.send(RtmpMessage::SetChunkSize(self.config.chunk_size));
        self.encoder.set_chunk_size(self.config.chunk_size);

        let properties = AmfValue::object([
            ("fmsVer", AmfValue::from("FMS/3,0,1,123")),
            ("capabilities", AmfValue::from(31.0)),
        ]);
        let information = AmfValue::object([
            ("level", AmfValue::from("status")),
            ("code", AmfValue::from("NetConnection.Connect.Success")),
            ("description", AmfValue::from("Connection succeeded.")),
            ("objectEncoding", AmfValue::from(0.0)),
        ]);
        self.send(RtmpMessage::Command(Command::result(
            cmd.transaction_id,
            properties,
            vec![information],
        )));
    }

    async fn on_publish(&mut self, cmd: &Command) -> Result<()> {
        if !self.state.is_connected() {
            return Err(ProtocolError::NotConnected.into());
        }

        let params = PublishParams::from_command(cmd)?;
        let key = params
            .stream_key
            .clone()
            .or_else(|| self.state.connect_params.as_ref().and_then(|p| p.query_key()))
            .unwrap_or_default();

        if !self.state.begin_auth(&params.stream_name) {
            return Err(ProtocolError::InvalidCommand(format!(
                "publish {:?} in phase {:?}",
                params.stream_name, self.state.phase
            ))
            .into());
        }

        let session = match self.registry.authenticate(&params.stream_name, &key).await {
            Ok(session) => session.with_peer(self.state.peer_addr),
            Err(e) => {
                self.state.on_rejected();
                self.reject(cmd, "NetStream.Publish.Unauthorized", "Invalid stream key.")
                    .await;
                return Err(e.into());
            }
        };

        if let Err(e) = self.registry.open_session(&session, Vec::new()) {
            self.state.on_rejected();
            self.reject(cmd, "NetStream.Publish.BadName", "Stream is already live.")
                .await;
            return Err(e.into());
        }

        tracing::info!(
            connection_id = self.state.connection_id,
            stream = %params.stream_name,
            session_id = %session.id(),
            publish_type = %params.publish_type,
            encoder = %self.state.encoder_type,
            "Publishing"
        );
        self.state.on_published(session);

        self.send(RtmpMessage::UserControl(UserControlEvent::StreamBegin(
            PUBLISH_STREAM_ID,
        )));
        self.send(RtmpMessage::Command(Command::on_status(
            cmd.stream_id,
            "status",
            "NetStream.Publish.Start",
            "Publishing started.",
        )));
        Ok(())
    }

    /// Tell the publisher why it was refused before the connection closes
    async fn reject(&mut self, cmd: &Command, code: &str, description: &str) {
        self.send(RtmpMessage::Command(Command::on_status(
            cmd.stream_id,
            "error",
            code,
            description,
        )));
        if let Err(e) = self.flush().await {
            tracing::debug!(connection_id = self.state.connection_id, error = %e, "Failed to send rejection");
        }
    }

    fn handle_data(&mut self, data: DataMessage) {
        let Some(session) = self.state.session.as_ref() else {
            return;
        };
        if let Some(value) = data.metadata() {
            let metadata = StreamMetadata::from_amf(value);
            self.registry.update_metadata(session, metadata);
        }
    }

    /// Stop publishing without closing the connection
    fn end_publish(&mut self) -> bool {
        match self.state.close() {
            Some(session) => self.registry.close_owned(&session),
            None => false,
        }
    }

    fn release(&mut self) {
        if self.end_publish() {
            tracing::debug!(
                connection_id = self.state.connection_id,
                "Publish session released on disconnect"
            );
        }
    }

    fn send_result(&mut self, cmd: &Command, arguments: Vec<AmfValue>) {
        self.send(RtmpMessage::Command(Command::result(
            cmd.transaction_id,
            AmfValue::Null,
            arguments,
        )));
    }

    /// Queue a message; written on the next flush
    fn send(&mut self, message: RtmpMessage) {
        let payload = message.encode_payload();
        self.encoder.encode(
            message.csid(),
            &OutgoingMessage {
                timestamp: message.timestamp(),
                type_id: message.type_id(),
                stream_id: message.stream_id(),
                payload: &payload,
            },
            &mut self.write_buf,
        );
    }

    async fn flush(&mut self) -> Result<()> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        let data = self.write_buf.split();
        self.io.write_all(&data).await?;
        self.io.flush().await?;
        Ok(())
    }
}

impl<IO, S: MetadataStore> Drop for Connection<IO, S> {
    fn drop(&mut self) {
        // Cancelled before `run` returned (shutdown, aborted task)
        if let Some(session) = self.state.close() {
            self.registry.close_owned(&session);
        }
    }
}
