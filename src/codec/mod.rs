//! Hub protocol codecs: JSON (mandatory) and MessagePack (optional, behind
//! the `messagepack` feature). Both share the same `HubProtocol` interface.

pub mod json;
#[cfg(feature = "messagepack")]
pub mod msgpack;
pub mod varint;

use crate::error::ProtocolError;
use crate::hub::message::HubMessage;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferFormat {
    Text,
    Binary,
}

pub trait HubProtocol: Send + Sync {
    fn name(&self) -> &'static str;
    fn version(&self) -> i32;
    fn transfer_format(&self) -> TransferFormat;
    fn write_message(&self, message: &HubMessage) -> Vec<u8>;
    /// Returns zero or more parsed messages. A [`HubMessage::Unknown`] entry
    /// signals an unrecognized tag; the dispatcher closes the connection on
    /// receipt of one.
    fn parse_messages(&self, data: &[u8]) -> Result<Vec<HubMessage>, ProtocolError>;
}
