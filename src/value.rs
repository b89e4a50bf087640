//! The dynamic value tree exchanged as hub-method arguments and results.
//!
//! A native sum type replaces the hand-rolled tagged union of the original
//! implementation; accessors on the wrong variant fail with [`ValueTypeError`]
//! instead of invoking undefined behaviour.

use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Binary(Vec<u8>),
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("expected {expected}, found {actual}")]
pub struct ValueTypeError {
    expected: &'static str,
    actual: &'static str,
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "float64",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Binary(_) => "binary",
        }
    }

    fn mismatch(&self, expected: &'static str) -> ValueTypeError {
        ValueTypeError {
            expected,
            actual: self.kind(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Result<bool, ValueTypeError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(other.mismatch("bool")),
        }
    }

    pub fn as_f64(&self) -> Result<f64, ValueTypeError> {
        match self {
            Value::Number(n) => Ok(*n),
            other => Err(other.mismatch("float64")),
        }
    }

    pub fn as_str(&self) -> Result<&str, ValueTypeError> {
        match self {
            Value::String(s) => Ok(s.as_str()),
            other => Err(other.mismatch("string")),
        }
    }

    pub fn as_array(&self) -> Result<&[Value], ValueTypeError> {
        match self {
            Value::Array(v) => Ok(v.as_slice()),
            other => Err(other.mismatch("array")),
        }
    }

    pub fn as_map(&self) -> Result<&BTreeMap<String, Value>, ValueTypeError> {
        match self {
            Value::Map(m) => Ok(m),
            other => Err(other.mismatch("map")),
        }
    }

    pub fn as_binary(&self) -> Result<&[u8], ValueTypeError> {
        match self {
            Value::Binary(b) => Ok(b.as_slice()),
            other => Err(other.mismatch("binary")),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessor_on_matching_variant_succeeds() {
        assert_eq!(Value::Bool(true).as_bool(), Ok(true));
        assert_eq!(Value::Number(1.5).as_f64(), Ok(1.5));
        assert_eq!(Value::from("hi").as_str(), Ok("hi"));
    }

    #[test]
    fn accessor_on_mismatched_variant_errors_with_both_kinds() {
        let err = Value::Number(1.0).as_bool().unwrap_err();
        assert_eq!(err.expected, "bool");
        assert_eq!(err.actual, "float64");
    }

    #[test]
    fn array_and_map_accessors() {
        let arr = Value::Array(vec![Value::Null, Value::Bool(false)]);
        assert_eq!(arr.as_array().unwrap().len(), 2);

        let mut map = BTreeMap::new();
        map.insert("k".to_string(), Value::Null);
        let v = Value::Map(map);
        assert!(v.as_map().unwrap().contains_key("k"));
    }
}
