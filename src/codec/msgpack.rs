//! Optional binary hub protocol, enabled by the `messagepack` feature.
//!
//! Ported from `messagepack_hub_protocol.cpp`: each frame is a varint
//! length-prefixed MessagePack array whose first element is the numeric
//! type tag. The same "integral double packs as an integer" workaround as
//! the JSON codec applies, since the server compares some fields (protocol
//! version) as integers.

use rmpv::Value as Rmp;

use crate::error::ProtocolError;
use crate::hub::message::{self, HubMessage};
use crate::value::Value;

use super::varint::{try_parse_message, write_length_prefix};
use super::{HubProtocol, TransferFormat};

pub struct MessagePackHubProtocol;

impl HubProtocol for MessagePackHubProtocol {
    fn name(&self) -> &'static str {
        "messagepack"
    }

    fn version(&self) -> i32 {
        1
    }

    fn transfer_format(&self) -> TransferFormat {
        TransferFormat::Binary
    }

    fn write_message(&self, message: &HubMessage) -> Vec<u8> {
        let body = encode_message(message);
        let mut out = Vec::new();
        // `write_length_prefix` only fails above 2GB, which a single hub
        // message never reaches in practice; the original swallows this the
        // same way by constructing the prefix unconditionally.
        write_length_prefix(body.len(), &mut out).expect("hub message body never exceeds 2GB");
        out.extend_from_slice(&body);
        out
    }

    fn parse_messages(&self, data: &[u8]) -> Result<Vec<HubMessage>, ProtocolError> {
        let mut messages = Vec::new();
        let mut offset = 0usize;
        while offset < data.len() {
            let remaining = &data[offset..];
            let Some((prefix_len, body_len)) = try_parse_message(remaining)? else {
                break;
            };
            let body = &remaining[prefix_len..prefix_len + body_len];
            messages.push(decode_message(body)?);
            offset += prefix_len + body_len;
        }
        Ok(messages)
    }
}

fn value_to_rmp(value: &Value) -> Rmp {
    match value {
        Value::Null => Rmp::Nil,
        Value::Bool(b) => Rmp::Boolean(*b),
        Value::Number(n) => number_to_rmp(*n),
        Value::String(s) => Rmp::String(s.clone().into()),
        Value::Array(items) => Rmp::Array(items.iter().map(value_to_rmp).collect()),
        Value::Map(map) => Rmp::Map(
            map.iter()
                .map(|(k, v)| (Rmp::String(k.clone().into()), value_to_rmp(v)))
                .collect(),
        ),
        Value::Binary(bytes) => Rmp::Binary(bytes.clone()),
    }
}

fn number_to_rmp(value: f64) -> Rmp {
    if value.fract() == 0.0 {
        if value < 0.0 {
            if value >= i64::MIN as f64 {
                return Rmp::from(value as i64);
            }
        } else if value <= u64::MAX as f64 {
            return Rmp::from(value as u64);
        }
    }
    Rmp::F64(value)
}

fn rmp_to_value(value: &Rmp) -> Value {
    match value {
        Rmp::Nil => Value::Null,
        Rmp::Boolean(b) => Value::Bool(*b),
        Rmp::F64(f) => Value::Number(*f),
        Rmp::F32(f) => Value::Number(*f as f64),
        Rmp::Integer(i) => Value::Number(i.as_f64().unwrap_or_default()),
        Rmp::String(s) => Value::String(s.as_str().unwrap_or_default().to_string()),
        Rmp::Array(items) => Value::Array(items.iter().map(rmp_to_value).collect()),
        Rmp::Map(entries) => {
            let mut map = std::collections::BTreeMap::new();
            for (k, v) in entries {
                if let Some(key) = k.as_str() {
                    map.insert(key.to_string(), rmp_to_value(v));
                }
            }
            Value::Map(map)
        }
        Rmp::Binary(bytes) => Value::Binary(bytes.clone()),
        Rmp::Ext(_, _) => Value::Null,
    }
}

fn encode_message(message: &HubMessage) -> Vec<u8> {
    let array = match message {
        HubMessage::Invocation {
            invocation_id,
            target,
            arguments,
            ..
        } => Rmp::Array(vec![
            Rmp::from(message::TYPE_INVOCATION),
            Rmp::Map(Vec::new()), // headers
            invocation_id
                .as_ref()
                .map(|id| Rmp::String(id.clone().into()))
                .unwrap_or(Rmp::Nil),
            Rmp::String(target.clone().into()),
            Rmp::Array(arguments.iter().map(value_to_rmp).collect()),
            Rmp::Array(Vec::new()), // stream ids
        ]),
        HubMessage::Completion {
            invocation_id,
            error,
            result,
            has_result,
        } => {
            let (result_kind, extra): (i64, Option<Rmp>) = if let Some(e) = error {
                (1, Some(Rmp::String(e.clone().into())))
            } else if *has_result {
                (3, Some(result.as_ref().map(value_to_rmp).unwrap_or(Rmp::Nil)))
            } else {
                (2, None)
            };
            let mut items = vec![
                Rmp::from(message::TYPE_COMPLETION),
                Rmp::Map(Vec::new()),
                Rmp::String(invocation_id.clone().into()),
                Rmp::from(result_kind),
            ];
            if let Some(extra) = extra {
                items.push(extra);
            }
            Rmp::Array(items)
        }
        HubMessage::Ping => Rmp::Array(vec![Rmp::from(message::TYPE_PING)]),
        _ => Rmp::Array(vec![Rmp::from(message::TYPE_PING)]),
    };

    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &array).expect("encoding to an in-memory buffer never fails");
    buf
}

fn decode_message(body: &[u8]) -> Result<HubMessage, ProtocolError> {
    let value = rmpv::decode::read_value(&mut std::io::Cursor::new(body))
        .map_err(|e| ProtocolError::Codec(e.to_string()))?;
    let items = value.as_array().ok_or_else(|| ProtocolError::Codec("message was not an array".into()))?;
    if items.is_empty() {
        return Err(ProtocolError::Codec("message was an empty array".into()));
    }
    let ty = items[0]
        .as_i64()
        .ok_or_else(|| ProtocolError::Codec("reading 'type' as int failed".into()))?;

    match ty {
        message::TYPE_INVOCATION => {
            if items.len() < 5 {
                return Err(ProtocolError::Codec("invocation message has too few properties".into()));
            }
            let invocation_id = items[2].as_str().map(|s| s.to_string());
            let target = items[3]
                .as_str()
                .ok_or_else(|| ProtocolError::Codec("reading 'target' as string failed".into()))?
                .to_string();
            let arguments = items[4]
                .as_array()
                .ok_or_else(|| ProtocolError::Codec("reading 'arguments' as array failed".into()))?
                .iter()
                .map(rmp_to_value)
                .collect();
            Ok(HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
                stream_ids: Vec::new(),
            })
        }
        message::TYPE_COMPLETION => {
            if items.len() < 4 {
                return Err(ProtocolError::Codec("completion message has too few properties".into()));
            }
            let invocation_id = items[2]
                .as_str()
                .ok_or_else(|| ProtocolError::Codec("reading 'invocationId' as string failed".into()))?
                .to_string();
            let result_kind = items[3]
                .as_i64()
                .ok_or_else(|| ProtocolError::Codec("reading 'result_kind' as int failed".into()))?;

            if items.len() < 5 && result_kind != 2 {
                return Err(ProtocolError::Codec("completion message has too few properties".into()));
            }

            let (error, result, has_result) = match result_kind {
                1 => {
                    let err = items[4]
                        .as_str()
                        .ok_or_else(|| ProtocolError::Codec("reading 'error' as string failed".into()))?
                        .to_string();
                    (Some(err), None, false)
                }
                3 => (None, Some(rmp_to_value(&items[4])), true),
                _ => (None, None, false),
            };

            Ok(HubMessage::Completion {
                invocation_id,
                error,
                result,
                has_result,
            })
        }
        message::TYPE_PING => Ok(HubMessage::Ping),
        _ => Ok(HubMessage::Unknown(ty)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protocol() -> MessagePackHubProtocol {
        MessagePackHubProtocol
    }

    #[test]
    fn invocation_round_trip() {
        let msg = HubMessage::invocation(Some("0".into()), "Echo", vec![Value::from("hi")]);
        let bytes = protocol().write_message(&msg);
        let parsed = protocol().parse_messages(&bytes).unwrap();
        assert_eq!(parsed, vec![msg]);
    }

    #[test]
    fn completion_with_result_round_trips() {
        let msg = HubMessage::Completion {
            invocation_id: "3".into(),
            error: None,
            result: Some(Value::Number(42.0)),
            has_result: true,
        };
        let bytes = protocol().write_message(&msg);
        let parsed = protocol().parse_messages(&bytes).unwrap();
        assert_eq!(parsed, vec![msg]);
    }

    #[test]
    fn completion_with_error_round_trips() {
        let msg = HubMessage::Completion {
            invocation_id: "3".into(),
            error: Some("boom".into()),
            result: None,
            has_result: false,
        };
        let bytes = protocol().write_message(&msg);
        let parsed = protocol().parse_messages(&bytes).unwrap();
        assert_eq!(parsed, vec![msg]);
    }

    #[test]
    fn ping_round_trips() {
        let bytes = protocol().write_message(&HubMessage::Ping);
        let parsed = protocol().parse_messages(&bytes).unwrap();
        assert_eq!(parsed, vec![HubMessage::Ping]);
    }

    #[test]
    fn multiple_frames_concatenated_parse_individually() {
        let mut bytes = protocol().write_message(&HubMessage::Ping);
        bytes.extend(protocol().write_message(&HubMessage::Ping));
        let parsed = protocol().parse_messages(&bytes).unwrap();
        assert_eq!(parsed, vec![HubMessage::Ping, HubMessage::Ping]);
    }
}
