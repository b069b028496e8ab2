//! [`XvizData`]: a read-only view over one raw message.
//!
//! The input format is detected once at construction. The structured
//! [`Value`] is only materialized when a conversion needs it, and then kept
//! for the lifetime of the instance.

use std::cell::OnceCell;

use crate::error::{Result, XvizError};
use crate::format::{detect, Blob, Format};
use crate::glb;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct XvizData {
    blob:   Blob,
    format: Format,
    value:  OnceCell<Value>,
}

impl XvizData {
    /// Wrap a raw input. Fails with `MalformedInput` if detection rejects it.
    pub fn new(input: impl Into<Blob>) -> Result<Self> {
        let blob = input.into();
        let format = detect(&blob)?;
        Ok(Self { blob, format, value: OnceCell::new() })
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// The input exactly as supplied.
    pub fn blob(&self) -> &Blob {
        &self.blob
    }

    pub fn into_blob(self) -> Blob {
        self.blob
    }

    /// Whether the structured view has been built yet.
    pub fn is_materialized(&self) -> bool {
        matches!(self.blob, Blob::Object(_)) || self.value.get().is_some()
    }

    /// Structured view, decoded on first use.
    pub fn value(&self) -> Result<&Value> {
        if let Blob::Object(v) = &self.blob {
            return Ok(v);
        }
        if let Some(v) = self.value.get() {
            return Ok(v);
        }
        let decoded = materialize(&self.blob, self.format)?;
        Ok(self.value.get_or_init(|| decoded))
    }

    pub fn into_value(self) -> Result<Value> {
        match self.blob {
            Blob::Object(v) => Ok(v),
            blob => match self.value.into_inner() {
                Some(v) => Ok(v),
                None => materialize(&blob, self.format),
            },
        }
    }

    /// Convert to `target`. Same-format requests return the input unchanged.
    pub fn convert(&self, target: Format) -> Result<Blob> {
        if target == self.format {
            return Ok(self.blob.clone());
        }
        encode_as(self.value()?, target)
    }

    /// Consuming [`convert`](Self::convert); the identity case moves the
    /// input without copying.
    pub fn into_format(self, target: Format) -> Result<Blob> {
        if target == self.format {
            return Ok(self.blob);
        }
        let value = self.into_value()?;
        match target {
            Format::Object => Ok(Blob::Object(value)),
            _ => encode_as(&value, target),
        }
    }
}

/// Serialize a structured value into `target`. Every serialized target
/// refuses values nested deeper than [`MAX_DEPTH`](crate::value::MAX_DEPTH).
pub fn encode_as(value: &Value, target: Format) -> Result<Blob> {
    if target != Format::Object {
        value.check_depth()?;
    }
    Ok(match target {
        Format::Object     => Blob::Object(value.clone()),
        Format::JsonString => Blob::Text(
            serde_json::to_string(&value.to_json()?)
                .map_err(|e| XvizError::unsupported(e.to_string()))?,
        ),
        Format::JsonBuffer => Blob::Bytes(
            serde_json::to_vec(&value.to_json()?)
                .map_err(|e| XvizError::unsupported(e.to_string()))?,
        ),
        Format::BinaryGlb  => Blob::Bytes(glb::encode(value)?),
    })
}

fn materialize(blob: &Blob, format: Format) -> Result<Value> {
    match (blob, format) {
        (Blob::Object(v), _) => Ok(v.clone()),
        (Blob::Text(s), _) => serde_json::from_str::<serde_json::Value>(s)
            .map(Value::from)
            .map_err(|e| XvizError::malformed(format!("invalid JSON: {e}"))),
        (Blob::Bytes(b), Format::BinaryGlb) => glb::decode(b),
        (Blob::Bytes(b), _) => serde_json::from_slice::<serde_json::Value>(b)
            .map(Value::from)
            .map_err(|e| XvizError::malformed(format!("invalid JSON: {e}"))),
    }
}
