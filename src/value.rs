//! Structured XVIZ message tree.
//!
//! [`Value`] mirrors the JSON data model with one extra leaf,
//! [`Value::Binary`], for raw buffers that only the GLB container can carry.
//! Objects use a sorted map so every JSON serialization of a tree is stable.

use std::collections::BTreeMap;

use serde_json::Number;

use crate::error::{Result, XvizError};

pub type Map = BTreeMap<String, Value>;

/// Deepest array/object nesting accepted by every format. A binary leaf
/// counts as one level since the container stores it as a placeholder object.
pub const MAX_DEPTH: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Value>),
    Object(Map),
    /// Raw bytes, stored as a binary chunk when encoded to GLB.
    Binary(Vec<u8>),
}

impl Value {
    /// Build an object from key/value pairs.
    pub fn object<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Binary(bytes.into())
    }

    /// Finite floats only; JSON has no encoding for NaN or infinities.
    pub fn float(f: f64) -> Option<Self> {
        Number::from_f64(f).map(Value::Number)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Look up a key when `self` is an object.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|m| m.get(key))
    }

    /// Number of binary leaves anywhere in the tree.
    pub fn buffer_count(&self) -> usize {
        match self {
            Value::Binary(_) => 1,
            Value::Array(items) => items.iter().map(Value::buffer_count).sum(),
            Value::Object(map) => map.values().map(Value::buffer_count).sum(),
            _ => 0,
        }
    }

    /// Container nesting depth; scalars are 0.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 0usize)];
        while let Some((value, level)) = pending.pop() {
            match value {
                Value::Array(items) => pending.extend(items.iter().map(|v| (v, level + 1))),
                Value::Object(map) => pending.extend(map.values().map(|v| (v, level + 1))),
                Value::Binary(_) => {}
                _ => {
                    deepest = deepest.max(level);
                    continue;
                }
            }
            deepest = deepest.max(level + 1);
        }
        deepest
    }

    /// Fails with `ConversionUnsupported` above [`MAX_DEPTH`].
    pub(crate) fn check_depth(&self) -> Result<()> {
        let depth = self.depth();
        if depth > MAX_DEPTH {
            return Err(XvizError::unsupported(format!(
                "nesting depth {depth} exceeds the limit of {MAX_DEPTH}"
            )));
        }
        Ok(())
    }

    /// Convert to a plain JSON tree. Fails on binary leaves, which have no
    /// lossless JSON form.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => serde_json::Value::Array(
                items.iter().map(Value::to_json).collect::<Result<_>>()?,
            ),
            Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (k, v) in map {
                    out.insert(k.clone(), v.to_json()?);
                }
                serde_json::Value::Object(out)
            }
            Value::Binary(b) => {
                return Err(XvizError::unsupported(format!(
                    "binary buffer of {} bytes cannot be represented as JSON",
                    b.len()
                )))
            }
        })
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl TryFrom<&Value> for serde_json::Value {
    type Error = XvizError;

    fn try_from(v: &Value) -> Result<Self> {
        v.to_json()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_conversion_is_lossless_without_buffers() {
        let src = json!({"a": [1, 2.5, "x", null, true], "b": {"c": -7}});
        let value = Value::from(src.clone());
        assert_eq!(value.to_json().unwrap(), src);
    }

    #[test]
    fn binary_leaf_refuses_json() {
        let v = Value::object([("points", Value::binary(vec![1u8, 2, 3]))]);
        assert!(matches!(v.to_json(), Err(XvizError::ConversionUnsupported(_))));
    }

    #[test]
    fn buffer_count_walks_nested_containers() {
        let v = Value::object([
            ("a", Value::binary(vec![0u8])),
            ("b", Value::Array(vec![Value::binary(vec![1u8]), Value::Null])),
            ("c", Value::object([("d", Value::binary(Vec::<u8>::new()))])),
        ]);
        assert_eq!(v.buffer_count(), 3);
    }

    #[test]
    fn depth_counts_containers_and_buffers() {
        assert_eq!(Value::from(3i64).depth(), 0);
        assert_eq!(Value::binary(vec![1u8]).depth(), 1);
        let v = Value::object([
            ("flat", Value::Null),
            ("deep", Value::Array(vec![Value::Array(vec![Value::binary(vec![0u8])])])),
        ]);
        assert_eq!(v.depth(), 4);
        assert!(v.check_depth().is_ok());

        let too_deep = (0..=MAX_DEPTH).fold(Value::Null, |v, _| Value::Array(vec![v]));
        assert!(matches!(too_deep.check_depth(), Err(XvizError::ConversionUnsupported(_))));
    }

    #[test]
    fn accessors() {
        let v = Value::object([
            ("type", Value::from("xviz/state_update")),
            ("points", Value::binary(vec![7u8, 8])),
            ("none", Value::Null),
        ]);
        assert_eq!(v.get("type").and_then(Value::as_str), Some("xviz/state_update"));
        assert_eq!(v.get("points").and_then(Value::as_binary), Some(&[7u8, 8][..]));
        assert!(v.get("none").is_some_and(Value::is_null));
        assert!(v.get("missing").is_none());
        assert!(Value::Null.get("type").is_none());
        assert_eq!(Value::from(1i64).as_str(), None);
    }

    #[test]
    fn non_finite_float_rejected() {
        assert!(Value::float(f64::NAN).is_none());
        assert!(Value::float(1.5).is_some());
    }
}
