//! Sequenced multi-format writer.
//!
//! [`XvizFormatWriter`] converts every message to one target [`Format`] and
//! writes it to a [`Sink`] under a key `"{sequence}-{kind}.{extension}"`.
//!
//! # Sequencing
//! The writer owns a counter that alone decides sequence numbers; the
//! caller's logical index is only recorded in the index entry.
//!
//! | Call                      | Entries                                  |
//! |---------------------------|------------------------------------------|
//! | first `write_message`     | `1-metadata.<ext>`, `2-frame.<ext>`      |
//! | Nth `write_message`       | `{N+1}-frame.<ext>`                      |
//! | `close`                   | `0-index.json`                           |
//!
//! Sequence 0 is reserved for the index. The counter only advances once an
//! entry is in the sink, so no key is ever written twice.
//!
//! # No partial writes
//! A message is fully converted before anything touches the sink; a
//! conversion error leaves the writer and the sink unchanged.

use serde::Serialize;

use crate::data::{encode_as, XvizData};
use crate::error::{Result, XvizError};
use crate::format::{Blob, Format};
use crate::sink::{EntryData, Sink};
use crate::value::Value;

pub const METADATA_KIND: &str = "metadata";
pub const FRAME_KIND: &str = "frame";
pub const INDEX_KIND: &str = "index";
pub const INDEX_SEQUENCE: u64 = 0;
/// XVIZ protocol version announced by the built-in metadata message.
pub const XVIZ_VERSION: &str = "2.0.0";

/// Build an entry key.
pub fn entry_key(sequence: u64, kind: &str, extension: &str) -> String {
    format!("{sequence}-{kind}.{extension}")
}

/// Split a key into `(sequence, kind, extension)`.
pub fn parse_entry_key(key: &str) -> Option<(u64, &str, &str)> {
    let (sequence, rest) = key.split_once('-')?;
    let (kind, extension) = rest.split_once('.')?;
    Some((sequence.parse().ok()?, kind, extension))
}

/// Metadata written when the caller supplies none.
pub fn default_metadata() -> Value {
    Value::object([
        ("type", Value::from("xviz/metadata")),
        ("data", Value::object([("version", Value::from(XVIZ_VERSION))])),
    ])
}

// ── WriterOptions ────────────────────────────────────────────────────────────

/// Configuration for [`XvizFormatWriter::with_options`].
#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub format:      Format,
    /// Replaces [`default_metadata`] as the implicit metadata entry.
    pub metadata:    Option<Value>,
    /// Write `0-index.json` on [`close`](XvizFormatWriter::close).
    pub write_index: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            format:      Format::BinaryGlb,
            metadata:    None,
            write_index: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    AwaitingFirstMessage,
    Streaming,
    Closed,
}

/// One written frame, as listed in the index entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameRecord {
    pub key:           String,
    pub sequence:      u64,
    pub logical_index: u64,
    pub byte_length:   usize,
    /// BLAKE3 of the entry bytes, hex encoded.
    pub blake3:        String,
}

#[derive(Serialize)]
struct IndexDocument<'a> {
    format:   &'static str,
    metadata: Option<&'a str>,
    frames:   &'a [FrameRecord],
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct XvizFormatWriter<S: Sink> {
    sink:         S,
    format:       Format,
    extension:    &'static str,
    metadata:     Option<Value>,
    write_index:  bool,
    state:        WriterState,
    /// Last sequence number written; 0 before the first entry.
    sequence:     u64,
    metadata_key: Option<String>,
    frames:       Vec<FrameRecord>,
}

impl<S: Sink> XvizFormatWriter<S> {
    pub fn new(sink: S, format: Format) -> Result<Self> {
        Self::with_options(sink, WriterOptions { format, ..WriterOptions::default() })
    }

    /// Fails with `ConversionUnsupported` for [`Format::Object`], which has
    /// no byte representation.
    pub fn with_options(sink: S, opts: WriterOptions) -> Result<Self> {
        let extension = opts.format.extension().ok_or_else(|| {
            XvizError::unsupported(format!("format {} cannot be written to a sink", opts.format))
        })?;
        Ok(Self {
            sink,
            format: opts.format,
            extension,
            metadata: opts.metadata,
            write_index: opts.write_index,
            state: WriterState::AwaitingFirstMessage,
            sequence: 0,
            metadata_key: None,
            frames: Vec::new(),
        })
    }

    pub fn format(&self) -> Format { self.format }
    pub fn state(&self) -> WriterState { self.state }
    pub fn frame_count(&self) -> usize { self.frames.len() }
    pub fn frames(&self) -> &[FrameRecord] { &self.frames }
    pub fn metadata_key(&self) -> Option<&str> { self.metadata_key.as_deref() }
    pub fn sink(&self) -> &S { &self.sink }
    pub fn into_sink(self) -> S { self.sink }

    /// Write an explicit metadata entry. Only legal before the first frame.
    pub fn write_metadata(&mut self, metadata: &XvizData) -> Result<String> {
        match self.state {
            WriterState::AwaitingFirstMessage => {}
            WriterState::Streaming => return Err(XvizError::InvalidState("metadata already written")),
            WriterState::Closed    => return Err(XvizError::InvalidState("writer is closed")),
        }
        let data = self.convert(metadata)?;
        self.emit_metadata(data)
    }

    /// Convert `message` and write it as the next frame. Returns the key.
    ///
    /// `logical_index` is recorded in the index entry but never decides the
    /// sequence number.
    pub fn write_message(&mut self, logical_index: u64, message: &XvizData) -> Result<String> {
        if self.state == WriterState::Closed {
            return Err(XvizError::InvalidState("writer is closed"));
        }
        let data = self.convert(message)?;
        if self.state == WriterState::AwaitingFirstMessage {
            let metadata = self.implicit_metadata()?;
            self.emit_metadata(metadata)?;
        }

        let sequence = self.sequence + 1;
        let key = entry_key(sequence, FRAME_KIND, self.extension);
        let record = FrameRecord {
            key:           key.clone(),
            sequence,
            logical_index,
            byte_length:   data.len(),
            blake3:        blake3::hash(data.as_bytes()).to_hex().to_string(),
        };
        self.sink.write(&key, data)?;
        self.sequence = sequence;
        tracing::debug!(key = %key, logical_index, bytes = record.byte_length, "wrote frame entry");
        self.frames.push(record);
        Ok(key)
    }

    /// Wrap a raw input and write it as the next frame.
    pub fn write_raw(&mut self, logical_index: u64, raw: impl Into<Blob>) -> Result<String> {
        let message = XvizData::new(raw)?;
        self.write_message(logical_index, &message)
    }

    /// Finish the stream: ensure the metadata entry exists, then write the
    /// index entry if enabled. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        match self.state {
            WriterState::Closed => return Ok(()),
            WriterState::AwaitingFirstMessage => {
                let metadata = self.implicit_metadata()?;
                self.emit_metadata(metadata)?;
            }
            WriterState::Streaming => {}
        }

        if self.write_index {
            let doc = IndexDocument {
                format:   self.format.name(),
                metadata: self.metadata_key.as_deref(),
                frames:   &self.frames,
            };
            let data = match self.format {
                Format::JsonString => EntryData::Text(
                    serde_json::to_string_pretty(&doc).map_err(|e| XvizError::unsupported(e.to_string()))?,
                ),
                _ => EntryData::Bytes(
                    serde_json::to_vec_pretty(&doc).map_err(|e| XvizError::unsupported(e.to_string()))?,
                ),
            };
            let key = entry_key(INDEX_SEQUENCE, INDEX_KIND, "json");
            self.sink.write(&key, data)?;
            tracing::debug!(key = %key, frames = self.frames.len(), "wrote index entry");
        }

        self.state = WriterState::Closed;
        Ok(())
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn convert(&self, message: &XvizData) -> Result<EntryData> {
        EntryData::try_from(message.convert(self.format)?)
    }

    fn implicit_metadata(&self) -> Result<EntryData> {
        let blob = match &self.metadata {
            Some(m) => encode_as(m, self.format)?,
            None    => encode_as(&default_metadata(), self.format)?,
        };
        EntryData::try_from(blob)
    }

    fn emit_metadata(&mut self, data: EntryData) -> Result<String> {
        let sequence = self.sequence + 1;
        let key = entry_key(sequence, METADATA_KIND, self.extension);
        let len = data.len();
        self.sink.write(&key, data)?;
        self.sequence = sequence;
        self.state = WriterState::Streaming;
        self.metadata_key = Some(key.clone());
        tracing::debug!(key = %key, bytes = len, "wrote metadata entry");
        Ok(key)
    }
}
