//! The mandatory JSON hub protocol.
//!
//! Frames are record-separator (`0x1E`) terminated JSON objects. Ported from
//! `json_hub_protocol.cpp` / `json_helpers.cpp`, including the
//! integral-double number-emission rule and the silent drop of a trailing
//! frame with no terminating separator (an open question in the
//! distillation, confirmed as the original's actual behaviour).

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Map, Number, json};

use crate::error::ProtocolError;
use crate::hub::message::{self, HubMessage};
use crate::value::Value;

use super::{HubProtocol, TransferFormat};

pub const RECORD_SEPARATOR: u8 = 0x1E;

pub struct JsonHubProtocol;

impl HubProtocol for JsonHubProtocol {
    fn name(&self) -> &'static str {
        "json"
    }

    fn version(&self) -> i32 {
        1
    }

    fn transfer_format(&self) -> TransferFormat {
        TransferFormat::Text
    }

    fn write_message(&self, message: &HubMessage) -> Vec<u8> {
        let value = message_to_json(message);
        let mut bytes = serde_json::to_vec(&value).expect("hub message always serializes");
        bytes.push(RECORD_SEPARATOR);
        bytes
    }

    fn parse_messages(&self, data: &[u8]) -> Result<Vec<HubMessage>, ProtocolError> {
        let mut messages = Vec::new();
        let mut start = 0usize;
        while let Some(offset) = data[start..].iter().position(|&b| b == RECORD_SEPARATOR) {
            let end = start + offset;
            let slice = &data[start..end];
            let parsed: serde_json::Value = serde_json::from_slice(slice)
                .map_err(|e| ProtocolError::Codec(e.to_string()))?;
            messages.push(parse_message(parsed)?);
            start = end + 1;
        }
        // A trailing slice with no terminating separator is silently
        // dropped; it will be re-delivered once the rest of the frame
        // arrives in a later WebSocket message.
        Ok(messages)
    }
}

pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => number_to_json(*n),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => {
            let mut obj = Map::new();
            for (k, v) in map {
                obj.insert(k.clone(), value_to_json(v));
            }
            serde_json::Value::Object(obj)
        }
        Value::Binary(bytes) => serde_json::Value::String(BASE64.encode(bytes)),
    }
}

/// Integral doubles are emitted as signed/unsigned 64-bit literals when they
/// fit, matching the server's expectation that fields such as the protocol
/// version compare as integers rather than as `1.0`.
fn number_to_json(value: f64) -> serde_json::Value {
    if value.fract() == 0.0 {
        if value < 0.0 {
            if value >= i64::MIN as f64 {
                return Number::from(value as i64).into();
            }
        } else if value <= u64::MAX as f64 {
            return Number::from(value as u64).into();
        }
    }
    Number::from_f64(value)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

pub fn json_to_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or_default()),
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => Value::Array(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(obj) => {
            let mut map = std::collections::BTreeMap::new();
            for (k, v) in obj {
                map.insert(k.clone(), json_to_value(v));
            }
            Value::Map(map)
        }
    }
}

fn message_to_json(message: &HubMessage) -> serde_json::Value {
    match message {
        HubMessage::Invocation {
            invocation_id,
            target,
            arguments,
            stream_ids,
        } => {
            let mut obj = json!({
                "type": message::TYPE_INVOCATION,
                "target": target,
                "arguments": arguments.iter().map(value_to_json).collect::<Vec<_>>(),
            });
            if let Some(id) = invocation_id {
                obj["invocationId"] = json!(id);
            }
            if !stream_ids.is_empty() {
                obj["streamIds"] = json!(stream_ids);
            }
            obj
        }
        HubMessage::Completion {
            invocation_id,
            error,
            result,
            ..
        } => {
            let mut obj = json!({
                "type": message::TYPE_COMPLETION,
                "invocationId": invocation_id,
            });
            if let Some(e) = error {
                obj["error"] = json!(e);
            } else if let Some(r) = result {
                obj["result"] = value_to_json(r);
            }
            obj
        }
        HubMessage::Ping => json!({ "type": message::TYPE_PING }),
        HubMessage::Close {
            error,
            allow_reconnect,
        } => {
            let mut obj = json!({ "type": message::TYPE_CLOSE });
            if let Some(e) = error {
                obj["error"] = json!(e);
            }
            if *allow_reconnect {
                obj["allowReconnect"] = json!(true);
            }
            obj
        }
        HubMessage::StreamItem { invocation_id, item } => json!({
            "type": message::TYPE_STREAM_ITEM,
            "invocationId": invocation_id,
            "item": value_to_json(item),
        }),
        HubMessage::StreamInvocation | HubMessage::CancelInvocation | HubMessage::Unknown(_) => {
            json!({ "type": serde_json::Value::Null })
        }
    }
}

fn parse_message(value: serde_json::Value) -> Result<HubMessage, ProtocolError> {
    let obj = value.as_object().ok_or(ProtocolError::NotAMap)?;
    let ty = obj.get("type").and_then(|v| v.as_i64()).ok_or(ProtocolError::MissingType)?;

    match ty {
        message::TYPE_INVOCATION => {
            let target = obj
                .get("target")
                .and_then(|v| v.as_str())
                .ok_or(ProtocolError::MissingTarget)?
                .to_string();
            let arguments = obj
                .get("arguments")
                .and_then(|v| v.as_array())
                .ok_or(ProtocolError::MissingArguments)?
                .iter()
                .map(json_to_value)
                .collect();
            let invocation_id = obj
                .get("invocationId")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            let stream_ids = obj
                .get("streamIds")
                .and_then(|v| v.as_array())
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str().map(|s| s.to_string()))
                        .collect()
                })
                .unwrap_or_default();
            Ok(HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
                stream_ids,
            })
        }
        message::TYPE_COMPLETION => {
            let invocation_id = obj
                .get("invocationId")
                .and_then(|v| v.as_str())
                .ok_or(ProtocolError::MissingInvocationId)?
                .to_string();
            let error = obj.get("error").and_then(|v| v.as_str()).map(|s| s.to_string());
            let result = obj.get("result").cloned();
            if error.is_some() && result.is_some() {
                return Err(ProtocolError::ErrorAndResultBothPresent);
            }
            let has_result = result.is_some();
            Ok(HubMessage::Completion {
                invocation_id,
                error,
                result: result.map(|r| json_to_value(&r)),
                has_result,
            })
        }
        message::TYPE_STREAM_ITEM => {
            let invocation_id = obj
                .get("invocationId")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let item = obj.get("item").cloned().map(|v| json_to_value(&v)).unwrap_or(Value::Null);
            Ok(HubMessage::StreamItem { invocation_id, item })
        }
        message::TYPE_STREAM_INVOCATION => Ok(HubMessage::StreamInvocation),
        message::TYPE_CANCEL_INVOCATION => Ok(HubMessage::CancelInvocation),
        message::TYPE_PING => Ok(HubMessage::Ping),
        message::TYPE_CLOSE => {
            let error = obj.get("error").and_then(|v| v.as_str()).map(|s| s.to_string());
            let allow_reconnect = obj
                .get("allowReconnect")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            Ok(HubMessage::Close {
                error,
                allow_reconnect,
            })
        }
        _ => Ok(HubMessage::Unknown(ty)),
    }
}
