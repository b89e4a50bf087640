//! Hub Protocol message types. Numeric tags are fixed by the wire format.

use crate::value::Value;

pub const TYPE_INVOCATION: i64 = 1;
pub const TYPE_STREAM_ITEM: i64 = 2;
pub const TYPE_COMPLETION: i64 = 3;
pub const TYPE_STREAM_INVOCATION: i64 = 4;
pub const TYPE_CANCEL_INVOCATION: i64 = 5;
pub const TYPE_PING: i64 = 6;
pub const TYPE_CLOSE: i64 = 7;

#[derive(Clone, Debug, PartialEq)]
pub enum HubMessage {
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
        stream_ids: Vec<String>,
    },
    /// Parsed but never delivered to a handler (streaming is out of scope).
    StreamItem {
        invocation_id: String,
        item: Value,
    },
    Completion {
        invocation_id: String,
        error: Option<String>,
        result: Option<Value>,
        has_result: bool,
    },
    /// Client-to-server only; receiving one is a protocol error.
    StreamInvocation,
    /// Client-to-server only; receiving one is a protocol error.
    CancelInvocation,
    Ping,
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    /// Unknown tag: the dispatcher closes the connection on receipt of this.
    /// Carries the wire tag so the resulting protocol error names it.
    Unknown(i64),
}

impl HubMessage {
    pub fn invocation(
        invocation_id: Option<String>,
        target: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Self {
        HubMessage::Invocation {
            invocation_id,
            target: target.into(),
            arguments,
            stream_ids: Vec::new(),
        }
    }
}
