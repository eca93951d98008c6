//! Gateway protocol definitions
//!
//! JSON control frames (op codes, payloads, close codes) and the push
//! packet that carries messages to clients.

mod close_codes;
mod messages;
mod opcodes;
mod payloads;
mod push;

pub use close_codes::CloseCode;
pub use messages::GatewayMessage;
pub use opcodes::OpCode;
pub use payloads::{HelloPayload, IdentifyPayload, OfflineAckPayload, ReadyPayload};
pub use push::{Encoding, PushCommand, PushHeader, PushMessage, PushPacket, PUSH_PROTOCOL_VERSION};
