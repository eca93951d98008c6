//! Control frame format
//!
//! Every JSON text frame exchanged outside of pushes has the shape
//! `{"op": <code>, "d": <payload?>}`.

use super::{CloseCode, HelloPayload, IdentifyPayload, OfflineAckPayload, OpCode, ReadyPayload};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A control frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayMessage {
    pub op: OpCode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<Value>,
}

impl GatewayMessage {
    fn with_payload<T: Serialize>(op: OpCode, payload: &T) -> Self {
        Self {
            op,
            d: serde_json::to_value(payload).ok(),
        }
    }

    #[must_use]
    pub fn hello(payload: HelloPayload) -> Self {
        Self::with_payload(OpCode::Hello, &payload)
    }

    #[must_use]
    pub fn ready(payload: &ReadyPayload) -> Self {
        Self::with_payload(OpCode::Ready, payload)
    }

    #[must_use]
    pub fn heartbeat_ack() -> Self {
        Self {
            op: OpCode::HeartbeatAck,
            d: None,
        }
    }

    /// Parse the payload of an IDENTIFY frame
    pub fn as_identify(&self) -> Option<IdentifyPayload> {
        if self.op != OpCode::Identify {
            return None;
        }
        self.d
            .as_ref()
            .and_then(|d| IdentifyPayload::deserialize(d).ok())
    }

    /// Parse the payload of an OFFLINE_ACK frame
    pub fn as_offline_ack(&self) -> Option<OfflineAckPayload> {
        if self.op != OpCode::OfflineAck {
            return None;
        }
        self.d
            .as_ref()
            .and_then(|d| OfflineAckPayload::deserialize(d).ok())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub fn close_frame(code: CloseCode) -> (u16, String) {
        (code.as_u16(), code.description().to_string())
    }
}

impl std::fmt::Display for GatewayMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GatewayMessage(op={})", self.op)
    }
}
