//! Wire formats and format detection.
//!
//! Every raw input is one of three shapes ([`Blob`]): an in-process
//! [`Value`], text, or bytes. [`detect`] maps each shape onto exactly one
//! [`Format`]:
//!
//! | Input | Check                           | Format       |
//! |-------|---------------------------------|--------------|
//! | Value | none                            | `Object`     |
//! | text  | strict JSON                     | `JsonString` |
//! | bytes | starts with container magic     | `BinaryGlb`  |
//! | bytes | UTF-8 and strict JSON           | `JsonBuffer` |
//!
//! Anything else is [`XvizError::MalformedInput`], including JSON nested
//! deeper than [`MAX_DEPTH`]. JSON is validated with `IgnoredAny`, so
//! detection never builds the message tree.

use serde::de::IgnoredAny;

use crate::error::{Result, XvizError};
use crate::glb::{GLB_HEADER_SIZE, GLB_MAGIC};
use crate::value::{Value, MAX_DEPTH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// In-process structured value, never serialized.
    Object,
    JsonString,
    JsonBuffer,
    BinaryGlb,
}

impl Format {
    pub const ALL: [Format; 4] = [
        Format::Object,
        Format::JsonString,
        Format::JsonBuffer,
        Format::BinaryGlb,
    ];

    /// Formats that can be written to a sink.
    pub const SERIALIZED: [Format; 3] = [Format::BinaryGlb, Format::JsonBuffer, Format::JsonString];

    pub fn name(self) -> &'static str {
        match self {
            Format::Object     => "object",
            Format::JsonString => "json_string",
            Format::JsonBuffer => "json_buffer",
            Format::BinaryGlb  => "binary_glb",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "object"                 => Some(Format::Object),
            "json_string" | "string" => Some(Format::JsonString),
            "json_buffer" | "json"   => Some(Format::JsonBuffer),
            "binary_glb" | "glb"     => Some(Format::BinaryGlb),
            _                        => None,
        }
    }

    /// File extension used in entry keys. `Object` has none.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            Format::Object                          => None,
            Format::JsonString | Format::JsonBuffer => Some("json"),
            Format::BinaryGlb                       => Some("glb"),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.name())
    }
}

/// A raw message in one of its three possible shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Blob {
    Object(Value),
    Text(String),
    Bytes(Vec<u8>),
}

impl Blob {
    /// Serialized byte view. `None` for `Object`.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Blob::Object(_) => None,
            Blob::Text(s)   => Some(s.as_bytes()),
            Blob::Bytes(b)  => Some(b),
        }
    }
}

impl From<Value> for Blob {
    fn from(v: Value) -> Self { Blob::Object(v) }
}

impl From<String> for Blob {
    fn from(s: String) -> Self { Blob::Text(s) }
}

impl From<&str> for Blob {
    fn from(s: &str) -> Self { Blob::Text(s.to_owned()) }
}

impl From<Vec<u8>> for Blob {
    fn from(b: Vec<u8>) -> Self { Blob::Bytes(b) }
}

impl From<&[u8]> for Blob {
    fn from(b: &[u8]) -> Self { Blob::Bytes(b.to_vec()) }
}

/// Classify a raw input. Pure; never mutates or fully parses the input.
pub fn detect(blob: &Blob) -> Result<Format> {
    match blob {
        Blob::Object(_) => Ok(Format::Object),
        Blob::Text(s)   => detect_text(s),
        Blob::Bytes(b)  => detect_bytes(b),
    }
}

pub fn detect_text(s: &str) -> Result<Format> {
    validate_json(s)?;
    Ok(Format::JsonString)
}

pub fn detect_bytes(bytes: &[u8]) -> Result<Format> {
    if bytes.is_empty() {
        return Err(XvizError::malformed("empty byte sequence"));
    }
    if bytes.starts_with(GLB_MAGIC) {
        if bytes.len() < GLB_HEADER_SIZE {
            return Err(XvizError::malformed(format!(
                "container header truncated: {} of {GLB_HEADER_SIZE} bytes",
                bytes.len()
            )));
        }
        return Ok(Format::BinaryGlb);
    }
    let text = std::str::from_utf8(bytes)
        .map_err(|e| XvizError::malformed(format!("neither container nor UTF-8: {e}")))?;
    validate_json(text)?;
    Ok(Format::JsonBuffer)
}

fn validate_json(s: &str) -> Result<()> {
    if s.trim().is_empty() {
        return Err(XvizError::malformed("empty JSON text"));
    }
    let depth = json_depth(s.as_bytes());
    if depth > MAX_DEPTH {
        return Err(XvizError::malformed(format!(
            "JSON nesting depth {depth} exceeds the limit of {MAX_DEPTH}"
        )));
    }
    serde_json::from_str::<IgnoredAny>(s)
        .map(|_| ())
        .map_err(|e| XvizError::malformed(format!("invalid JSON: {e}")))
}

/// Deepest bracket nesting in JSON text, ignoring brackets inside strings.
/// Only meaningful for text that is otherwise valid JSON.
pub(crate) fn json_depth(text: &[u8]) -> usize {
    let mut depth = 0usize;
    let mut deepest = 0;
    let mut in_string = false;
    let mut escaped = false;
    for &b in text {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}
