//! Push frames
//!
//! Messages reach clients as `PushPacket{header, body}`. The packet is
//! protobuf on the wire (binary frames); a client that connects with
//! `?encoding=json` receives the same packet as a JSON text frame instead.

use bytes::Bytes;
use chrono::Utc;
use prost::Message as _;
use relay_core::{Message, MessageCommittedEvent};
use serde::{Deserialize, Serialize, Serializer};

/// Version stamped on every push header
pub const PUSH_PROTOCOL_VERSION: u32 = 1;

/// Wire encoding chosen by the client at connect time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    #[serde(alias = "proto")]
    Protobuf,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PushCommand {
    Unspecified = 0,
    /// A message for a recipient
    MsgPush = 1,
    /// Self-echo to the sender's own session
    MsgAck = 2,
    /// A message replayed from the offline queue
    OfflinePush = 3,
}

#[derive(Clone, PartialEq, Serialize, prost::Message)]
#[serde(rename_all = "camelCase")]
pub struct PushHeader {
    #[prost(enumeration = "PushCommand", tag = "1")]
    pub command: i32,
    #[prost(uint32, tag = "2")]
    pub version: u32,
    /// Milliseconds since the Unix epoch
    #[prost(int64, tag = "3")]
    pub timestamp: i64,
}

#[derive(Clone, PartialEq, Serialize, prost::Message)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    #[prost(int64, tag = "1")]
    #[serde(serialize_with = "id_as_string")]
    pub message_id: i64,
    #[prost(int64, tag = "2")]
    #[serde(serialize_with = "id_as_string")]
    pub channel_id: i64,
    #[prost(int64, tag = "3")]
    #[serde(serialize_with = "id_as_string")]
    pub sender_id: i64,
    #[prost(int64, tag = "4")]
    pub seq_id: i64,
    #[prost(int32, tag = "5")]
    pub msg_type: i32,
    /// The message content as JSON
    #[prost(string, tag = "6")]
    pub content: String,
    #[prost(int64, repeated, tag = "7")]
    #[serde(serialize_with = "ids_as_strings")]
    pub mentioned_user_ids: Vec<i64>,
    #[prost(bool, tag = "8")]
    pub mention_all: bool,
    /// Milliseconds since the Unix epoch
    #[prost(int64, tag = "9")]
    pub created_at: i64,
    /// Offline queue entry being replayed; zero for live pushes
    #[prost(int64, tag = "10")]
    pub entry_id: i64,
}

#[derive(Clone, PartialEq, Serialize, prost::Message)]
pub struct PushPacket {
    #[prost(message, optional, tag = "1")]
    pub header: Option<PushHeader>,
    #[prost(message, optional, tag = "2")]
    pub body: Option<PushMessage>,
}

impl PushMessage {
    pub fn from_event(event: &MessageCommittedEvent) -> Self {
        Self {
            message_id: event.message_id.into_inner(),
            channel_id: event.channel_id.into_inner(),
            sender_id: event.sender_id.into_inner(),
            seq_id: event.seq_id,
            msg_type: i32::from(event.msg_type.as_i16()),
            content: serde_json::to_string(&event.content).unwrap_or_default(),
            mentioned_user_ids: event
                .mentioned_user_ids
                .iter()
                .map(|id| id.into_inner())
                .collect(),
            mention_all: event.mention_all,
            created_at: event.created_at.timestamp_millis(),
            entry_id: 0,
        }
    }

    pub fn from_message(message: &Message) -> Self {
        Self::from_event(&MessageCommittedEvent::new(message, None))
    }

    #[must_use]
    pub fn with_entry_id(mut self, entry_id: i64) -> Self {
        self.entry_id = entry_id;
        self
    }
}

impl PushPacket {
    pub fn new(command: PushCommand, body: PushMessage) -> Self {
        Self {
            header: Some(PushHeader {
                command: command as i32,
                version: PUSH_PROTOCOL_VERSION,
                timestamp: Utc::now().timestamp_millis(),
            }),
            body: Some(body),
        }
    }

    /// Command from the header; `Unspecified` if missing or unknown
    pub fn command(&self) -> PushCommand {
        self.header
            .as_ref()
            .map_or(PushCommand::Unspecified, PushHeader::command)
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.encode_to_vec())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn id_as_string<S: Serializer>(id: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&id.to_string())
}

fn ids_as_strings<S: Serializer>(ids: &[i64], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(ids.iter().map(ToString::to_string))
}
