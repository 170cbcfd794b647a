//! RTMP message types
//!
//! Parses reassembled chunk payloads into typed messages and encodes the
//! messages a server sends back. Media payloads are kept as `Bytes` so the
//! codec layer can inspect them without copying.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::amf::{decode_all, encode_all, AmfValue};
use crate::error::{ProtocolError, Result};
use crate::protocol::chunk::RawMessage;
use crate::protocol::constants::*;

/// A parsed RTMP message
#[derive(Debug, Clone, PartialEq)]
pub enum RtmpMessage {
    SetChunkSize(u32),
    Abort { csid: u32 },
    Acknowledgement { sequence: u32 },
    UserControl(UserControlEvent),
    WindowAckSize(u32),
    SetPeerBandwidth { size: u32, limit_type: u8 },
    Audio { timestamp: u32, data: Bytes },
    Video { timestamp: u32, data: Bytes },
    Data(DataMessage),
    Command(Command),
    Unknown { type_id: u8, data: Bytes },
}

/// User control event (message type 4)
#[derive(Debug, Clone, PartialEq)]
pub enum UserControlEvent {
    StreamBegin(u32),
    StreamEof(u32),
    PingRequest(u32),
    PingResponse(u32),
    Other { event_type: u16, data: Bytes },
}

/// AMF command (`connect`, `publish`, `_result`, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub transaction_id: f64,
    pub command_object: AmfValue,
    pub arguments: Vec<AmfValue>,
    /// Message stream the command arrived on or is sent to
    pub stream_id: u32,
}

/// AMF data message (`@setDataFrame`, `onMetaData`)
#[derive(Debug, Clone, PartialEq)]
pub struct DataMessage {
    pub name: String,
    pub values: Vec<AmfValue>,
    pub stream_id: u32,
}

impl RtmpMessage {
    /// Parse a reassembled message
    pub fn from_raw(raw: &RawMessage) -> Result<Self> {
        let mut payload = raw.payload.clone();

        let message = match raw.type_id {
            MSG_SET_CHUNK_SIZE => {
                let size = read_u32(&mut payload, "set chunk size")?;
                // The most significant bit is reserved and must be zero
                RtmpMessage::SetChunkSize(size & 0x7FFF_FFFF)
            }
            MSG_ABORT => RtmpMessage::Abort {
                csid: read_u32(&mut payload, "abort")?,
            },
            MSG_ACKNOWLEDGEMENT => RtmpMessage::Acknowledgement {
                sequence: read_u32(&mut payload, "acknowledgement")?,
            },
            MSG_USER_CONTROL => RtmpMessage::UserControl(parse_user_control(payload)?),
            MSG_WINDOW_ACK_SIZE => {
                RtmpMessage::WindowAckSize(read_u32(&mut payload, "window ack size")?)
            }
            MSG_SET_PEER_BANDWIDTH => {
                let size = read_u32(&mut payload, "set peer bandwidth")?;
                if !payload.has_remaining() {
                    return Err(ProtocolError::MalformedMessage("set peer bandwidth").into());
                }
                RtmpMessage::SetPeerBandwidth {
                    size,
                    limit_type: payload.get_u8(),
                }
            }
            MSG_AUDIO => RtmpMessage::Audio {
                timestamp: raw.timestamp,
                data: payload,
            },
            MSG_VIDEO => RtmpMessage::Video {
                timestamp: raw.timestamp,
                data: payload,
            },
            MSG_DATA_AMF0 | MSG_DATA_AMF3 => {
                if raw.type_id == MSG_DATA_AMF3 && payload.has_remaining() {
                    payload.advance(1);
                }
                let mut values = decode_all(payload)?.into_iter();
                let name = match values.next() {
                    Some(AmfValue::String(name)) => name,
                    _ => return Err(ProtocolError::MalformedMessage("data").into()),
                };
                RtmpMessage::Data(DataMessage {
                    name,
                    values: values.collect(),
                    stream_id: raw.stream_id,
                })
            }
            MSG_COMMAND_AMF0 | MSG_COMMAND_AMF3 => {
                // AMF3 commands carry a format byte, then AMF0 values
                if raw.type_id == MSG_COMMAND_AMF3 && payload.has_remaining() {
                    payload.advance(1);
                }
                RtmpMessage::Command(Command::decode(payload, raw.stream_id)?)
            }
            type_id => RtmpMessage::Unknown {
                type_id,
                data: payload,
            },
        };

        Ok(message)
    }

    pub fn type_id(&self) -> u8 {
        match self {
            RtmpMessage::SetChunkSize(_) => MSG_SET_CHUNK_SIZE,
            RtmpMessage::Abort { .. } => MSG_ABORT,
            RtmpMessage::Acknowledgement { .. } => MSG_ACKNOWLEDGEMENT,
            RtmpMessage::UserControl(_) => MSG_USER_CONTROL,
            RtmpMessage::WindowAckSize(_) => MSG_WINDOW_ACK_SIZE,
            RtmpMessage::SetPeerBandwidth { .. } => MSG_SET_PEER_BANDWIDTH,
            RtmpMessage::Audio { .. } => MSG_AUDIO,
            RtmpMessage::Video { .. } => MSG_VIDEO,
            RtmpMessage::Data(_) => MSG_DATA_AMF0,
            RtmpMessage::Command(_) => MSG_COMMAND_AMF0,
            RtmpMessage::Unknown { type_id, .. } => *type_id,
        }
    }

    /// Chunk stream the message is conventionally sent on
    pub fn csid(&self) -> u32 {
        match self {
            RtmpMessage::SetChunkSize(_)
            | RtmpMessage::Abort { .. }
            | RtmpMessage::Acknowledgement { .. }
            | RtmpMessage::UserControl(_)
            | RtmpMessage::WindowAckSize(_)
            | RtmpMessage::SetPeerBandwidth { .. } => CSID_PROTOCOL_CONTROL,
            RtmpMessage::Audio { .. } => CSID_AUDIO,
            RtmpMessage::Video { .. } => CSID_VIDEO,
            RtmpMessage::Data(_) | RtmpMessage::Unknown { .. } => CSID_DATA,
            RtmpMessage::Command(_) => CSID_COMMAND,
        }
    }

    /// Message stream ID
    pub fn stream_id(&self) -> u32 {
        match self {
            RtmpMessage::Command(cmd) => cmd.stream_id,
            RtmpMessage::Data(data) => data.stream_id,
            RtmpMessage::Audio { .. } | RtmpMessage::Video { .. } => PUBLISH_STREAM_ID,
            _ => 0,
        }
    }

    pub fn timestamp(&self) -> u32 {
        match self {
            RtmpMessage::Audio { timestamp, .. } | RtmpMessage::Video { timestamp, .. } => {
                *timestamp
            }
            _ => 0,
        }
    }

    /// Encode the message body
    pub fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            RtmpMessage::SetChunkSize(size) => buf.put_u32(*size & 0x7FFF_FFFF),
            RtmpMessage::Abort { csid } => buf.put_u32(*csid),
            RtmpMessage::Acknowledgement { sequence } => buf.put_u32(*sequence),
            RtmpMessage::WindowAckSize(size) => buf.put_u32(*size),
            RtmpMessage::SetPeerBandwidth { size, limit_type } => {
                buf.put_u32(*size);
                buf.put_u8(*limit_type);
            }
            RtmpMessage::UserControl(event) => match event {
                UserControlEvent::StreamBegin(id) => {
                    buf.put_u16(UC_STREAM_BEGIN);
                    buf.put_u32(*id);
                }
                UserControlEvent::StreamEof(id) => {
                    buf.put_u16(UC_STREAM_EOF);
                    buf.put_u32(*id);
                }
                UserControlEvent::PingRequest(ts) => {
                    buf.put_u16(UC_PING_REQUEST);
                    buf.put_u32(*ts);
                }
                UserControlEvent::PingResponse(ts) => {
                    buf.put_u16(UC_PING_RESPONSE);
                    buf.put_u32(*ts);
                }
                UserControlEvent::Other { event_type, data } => {
                    buf.put_u16(*event_type);
                    buf.put_slice(data);
                }
            },
            RtmpMessage::Audio { data, .. }
            | RtmpMessage::Video { data, .. }
            | RtmpMessage::Unknown { data, .. } => return data.clone(),
            RtmpMessage::Data(data) => {
                let mut values = Vec::with_capacity(data.values.len() + 1);
                values.push(AmfValue::String(data.name.clone()));
                values.extend(data.values.iter().cloned());
                return encode_all(&values);
            }
            RtmpMessage::Command(cmd) => return cmd.encode(),
        }
        buf.freeze()
    }
}

impl Command {
    pub fn new(
        name: impl Into<String>,
        transaction_id: f64,
        command_object: AmfValue,
        arguments: Vec<AmfValue>,
    ) -> Self {
        Self {
            name: name.into(),
            transaction_id,
            command_object,
            arguments,
            stream_id: 0,
        }
    }

    /// `_result` for a command
    pub fn result(transaction_id: f64, command_object: AmfValue, arguments: Vec<AmfValue>) -> Self {
        Self::new("_result", transaction_id, command_object, arguments)
    }

    /// `_error` for a command
    pub fn error(transaction_id: f64, code: &str, description: &str) -> Self {
        Self::new(
            "_error",
            transaction_id,
            AmfValue::Null,
            vec![status_object("error", code, description)],
        )
    }

    /// `onStatus` on a message stream
    pub fn on_status(stream_id: u32, level: &str, code: &str, description: &str) -> Self {
        Self {
            stream_id,
            ..Self::new(
                "onStatus",
                0.0,
                AmfValue::Null,
                vec![status_object(level, code, description)],
            )
        }
    }

    pub fn with_stream_id(mut self, stream_id: u32) -> Self {
        self.stream_id = stream_id;
        self
    }

    /// First positional argument as a string
    pub fn first_string_arg(&self) -> Option<&str> {
        self.arguments.iter().find_map(|v| v.as_str())
    }

    fn decode(payload: Bytes, stream_id: u32) -> Result<Self> {
        let mut values = decode_all(payload)?.into_iter();

        let name = match values.next() {
            Some(AmfValue::String(name)) => name,
            _ => return Err(ProtocolError::MalformedMessage("command").into()),
        };
        let transaction_id = values.next().and_then(|v| v.as_number()).unwrap_or(0.0);
        let command_object = values.next().unwrap_or_default();

        Ok(Command {
            name,
            transaction_id,
            command_object,
            arguments: values.collect(),
            stream_id,
        })
    }

    fn encode(&self) -> Bytes {
        let mut values = Vec::with_capacity(self.arguments.len() + 3);
        values.push(AmfValue::String(self.name.clone()));
        values.push(AmfValue::Number(self.transaction_id));
        values.push(self.command_object.clone());
        values.extend(self.arguments.iter().cloned());
        encode_all(&values)
    }
}

impl DataMessage {
    /// Metadata object of an `onMetaData` message
    ///
    /// OBS and ffmpeg send `@setDataFrame("onMetaData", {...})`; older
    /// encoders send `onMetaData({...})` directly.
    pub fn metadata(&self) -> Option<&AmfValue> {
        let mut values = self.values.iter();
        match self.name.as_str() {
            "@setDataFrame" => match values.next()?.as_str()? {
                "onMetaData" => values.find(|v| v.properties().is_some()),
                _ => None,
            },
            "onMetaData" => values.find(|v| v.properties().is_some()),
            _ => None,
        }
    }
}

/// Parameters of the `connect` command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectParams {
    pub app: String,
    pub flash_ver: String,
    pub tc_url: String,
    pub object_encoding: f64,
}

impl ConnectParams {
    pub fn from_command(cmd: &Command) -> Self {
        let obj = &cmd.command_object;
        Self {
            app: obj.get_string("app").unwrap_or_default().to_string(),
            flash_ver: obj.get_string("flashVer").unwrap_or_default().to_string(),
            tc_url: obj.get_string("tcUrl").unwrap_or_default().to_string(),
            object_encoding: obj.get_number("objectEncoding").unwrap_or(0.0),
        }
    }

    /// `key` query parameter on the tcUrl, if any
    pub fn query_key(&self) -> Option<String> {
        let url = url::Url::parse(&self.tc_url).ok()?;
        for (name, value) in url.query_pairs() {
            if name == "key" {
                return Some(value.into_owned());
            }
        }
        None
    }
}

/// Parameters of the `publish` command
///
/// The publishing name carries the stream key as a query parameter:
/// `alpha?key=secret1`.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishParams {
    pub stream_name: String,
    pub stream_key: Option<String>,
    pub publish_type: String,
}

impl PublishParams {
    pub fn from_command(cmd: &Command) -> std::result::Result<Self, ProtocolError> {
        let raw = cmd
            .first_string_arg()
            .ok_or_else(|| ProtocolError::InvalidCommand("publish without a name".into()))?;
        let publish_type = cmd
            .arguments
            .iter()
            .filter_map(|v| v.as_str())
            .nth(1)
            .unwrap_or("live")
            .to_string();

        let (stream_name, stream_key) = parse_publish_name(raw);
        if stream_name.is_empty() {
            return Err(ProtocolError::InvalidCommand("empty publish name".into()));
        }

        Ok(Self {
            stream_name,
            stream_key,
            publish_type,
        })
    }
}

/// Split `name?key=value&...` into the stream name and its key
pub fn parse_publish_name(raw: &str) -> (String, Option<String>) {
    let (name, query) = match raw.split_once('?') {
        Some((name, query)) => (name, Some(query)),
        None => (raw, None),
    };

    let key = query.and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(k, _)| k == "key")
            .map(|(_, v)| v.into_owned())
    });

    (name.trim_matches('/').to_string(), key)
}

fn status_object(level: &str, code: &str, description: &str) -> AmfValue {
    AmfValue::object([
        ("level", AmfValue::from(level)),
        ("code", AmfValue::from(code)),
        ("description", AmfValue::from(description)),
    ])
}

fn parse_user_control(mut payload: Bytes) -> Result<UserControlEvent> {
    if payload.remaining() < 2 {
        return Err(ProtocolError::MalformedMessage("user control").into());
    }
    let event_type = payload.get_u16();
    let event = match event_type {
        UC_STREAM_BEGIN => UserControlEvent::StreamBegin(read_u32(&mut payload, "user control")?),
        UC_STREAM_EOF => UserControlEvent::StreamEof(read_u32(&mut payload, "user control")?),
        UC_PING_REQUEST => UserControlEvent::PingRequest(read_u32(&mut payload, "user control")?),
        UC_PING_RESPONSE => {
            UserControlEvent::PingResponse(read_u32(&mut payload, "user control")?)
        }
        _ => UserControlEvent::Other {
            event_type,
            data: payload,
        },
    };
    Ok(event)
}

fn read_u32(payload: &mut Bytes, what: &'static str) -> std::result::Result<u32, ProtocolError> {
    if payload.remaining() < 4 {
        return Err(ProtocolError::MalformedMessage(what));
    }
    Ok(payload.get_u32())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(type_id: u8, payload: Bytes) -> RawMessage {
        RawMessage {
            csid: 3,
            timestamp: 0,
            type_id,
            stream_id: 0,
            payload,
        }
    }

    #[test]
    fn test_command_roundtrip() {
        let cmd = Command::new(
            "connect",
            1.0,
            AmfValue::object([("app", "live"), ("flashVer", "OBS-Studio/30.0")]),
            vec![],
        );
        let msg = RtmpMessage::Command(cmd.clone());
        let parsed = RtmpMessage::from_raw(&raw(MSG_COMMAND_AMF0, msg.encode_payload())).unwrap();

        assert_eq!(parsed, RtmpMessage::Command(cmd));
    }

    #[test]
    fn test_amf3_command_skips_format_byte() {
        let body = RtmpMessage::Command(Command::new("createStream", 4.0, AmfValue::Null, vec![]))
            .encode_payload();
        let mut payload = BytesMut::new();
        payload.put_u8(0);
        payload.put_slice(&body);

        match RtmpMessage::from_raw(&raw(MSG_COMMAND_AMF3, payload.freeze())).unwrap() {
            RtmpMessage::Command(cmd) => {
                assert_eq!(cmd.name, "createStream");
                assert_eq!(cmd.transaction_id, 4.0);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_control_messages() {
        let msg = RtmpMessage::from_raw(&raw(
            MSG_SET_CHUNK_SIZE,
            Bytes::from_static(&[0x00, 0x00, 0x10, 0x00]),
        ))
        .unwrap();
        assert_eq!(msg, RtmpMessage::SetChunkSize(4096));

        let short = RtmpMessage::from_raw(&raw(MSG_WINDOW_ACK_SIZE, Bytes::from_static(&[0, 1])));
        assert!(short.is_err());

        let ping = RtmpMessage::UserControl(UserControlEvent::PingRequest(99));
        let parsed = RtmpMessage::from_raw(&raw(MSG_USER_CONTROL, ping.encode_payload())).unwrap();
        assert_eq!(parsed, ping);
    }

    #[test]
    fn test_publish_params() {
        let cmd = Command::new(
            "publish",
            5.0,
            AmfValue::Null,
            vec!["alpha?key=secret1".into(), "live".into()],
        );
        let params = PublishParams::from_command(&cmd).unwrap();

        assert_eq!(params.stream_name, "alpha");
        assert_eq!(params.stream_key.as_deref(), Some("secret1"));
        assert_eq!(params.publish_type, "live");
    }

    #[test]
    fn test_publish_name_parsing() {
        assert_eq!(parse_publish_name("alpha"), ("alpha".to_string(), None));
        assert_eq!(
            parse_publish_name("alpha?foo=1&key=a%20b"),
            ("alpha".to_string(), Some("a b".to_string()))
        );
        assert_eq!(parse_publish_name("alpha?other=1").1, None);

        let empty = Command::new("publish", 5.0, AmfValue::Null, vec!["?key=x".into()]);
        assert!(PublishParams::from_command(&empty).is_err());
    }

    #[test]
    fn test_connect_params() {
        let cmd = Command::new(
            "connect",
            1.0,
            AmfValue::object([
                ("app", "live"),
                ("flashVer", "FMLE/3.0"),
                ("tcUrl", "rtmp://localhost/live?key=abc"),
            ]),
            vec![],
        );
        let params = ConnectParams::from_command(&cmd);

        assert_eq!(params.app, "live");
        assert_eq!(params.query_key().as_deref(), Some("abc"));
    }

    #[test]
    fn test_query_key_lookup() {
        let params = |tc_url: &str| {
            let cmd = Command::new("connect", 1.0, AmfValue::object([("tcUrl", tc_url)]), vec![]);
            ConnectParams::from_command(&cmd)
        };

        assert_eq!(params("rtmp://h/live?a=1&key=x%20y").query_key().as_deref(), Some("x y"));
        assert_eq!(params("rtmp://h/live?keys=1").query_key(), None);
        assert_eq!(params("rtmp://h/live").query_key(), None);
        assert_eq!(params("not a url").query_key(), None);
    }

    #[test]
    fn test_set_data_frame_metadata() {
        let data = DataMessage {
            name: "@setDataFrame".into(),
            values: vec![
                "onMetaData".into(),
                AmfValue::EcmaArray(vec![("width".into(), AmfValue::Number(1280.0))]),
            ],
            stream_id: 1,
        };
        let meta = data.metadata().unwrap();
        assert_eq!(meta.get_number("width"), Some(1280.0));

        let other = DataMessage {
            name: "|RtmpSampleAccess".into(),
            values: vec![],
            stream_id: 1,
        };
        assert!(other.metadata().is_none());
    }
}
