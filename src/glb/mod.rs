//! GLB-style binary container: one JSON chunk plus zero or more binary chunks.
//!
//! # Layout
//! ```text
//! offset  size  field
//! 0       4     magic "XVIZ"
//! 4       4     version (u32)
//! 8       4     total length of the container, padding included (u32)
//! 12      ...   chunks
//!
//! chunk:
//! 0       4     logical data length, padding excluded (u32)
//! 4       4     chunk type: JSON = 0x4E4F534A, BIN = 0x004E4942
//! 8       n     data, then zero bytes up to the next 4-byte boundary
//! ```
//! The first chunk is always JSON; every following chunk is BIN.
//!
//! # Buffers
//! Every [`Value::Binary`] leaf is replaced in the JSON chunk by a
//! placeholder `{"bufferIndex": i, "byteLength": n}` and its bytes are
//! stored as BIN chunk `i`, in depth-first encounter order. On decode every
//! BIN chunk must be claimed by exactly one placeholder with a matching
//! length.
//!
//! # Endianness
//! All integers are little-endian.

use std::io::{self, Read, Write};
use std::ops::Range;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use crate::error::{Result, XvizError};
use crate::format::json_depth;
use crate::value::{Map, Value, MAX_DEPTH};

pub const GLB_MAGIC: &[u8; 4] = b"XVIZ";
pub const GLB_VERSION: u32 = 1;
pub const GLB_HEADER_SIZE: usize = 12;
pub const CHUNK_HEADER_SIZE: usize = 8;
pub const CHUNK_ALIGNMENT: usize = 4;

pub const CHUNK_TYPE_JSON: u32 = 0x4E4F_534A;
pub const CHUNK_TYPE_BIN: u32 = 0x004E_4942;

pub const KEY_BUFFER_INDEX: &str = "bufferIndex";
pub const KEY_BYTE_LENGTH: &str = "byteLength";

const PADDING: [u8; CHUNK_ALIGNMENT] = [0; CHUNK_ALIGNMENT];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Json,
    Bin,
}

impl ChunkKind {
    pub fn tag(self) -> u32 {
        match self {
            ChunkKind::Json => CHUNK_TYPE_JSON,
            ChunkKind::Bin  => CHUNK_TYPE_BIN,
        }
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            CHUNK_TYPE_JSON => Some(ChunkKind::Json),
            CHUNK_TYPE_BIN  => Some(ChunkKind::Bin),
            _               => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChunkKind::Json => "JSON",
            ChunkKind::Bin  => "BIN",
        }
    }
}

/// Round `len` up to the chunk alignment.
#[inline]
pub fn padded_len(len: usize) -> usize {
    len.div_ceil(CHUNK_ALIGNMENT) * CHUNK_ALIGNMENT
}

/// Bytes a chunk with `len` data bytes occupies on the wire.
#[inline]
pub fn chunk_physical_size(len: usize) -> usize {
    CHUNK_HEADER_SIZE + padded_len(len)
}

// ── Header ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlbHeader {
    pub magic:        [u8; 4],
    pub version:      u32,
    pub total_length: u32,
}

impl GlbHeader {
    pub fn new(total_length: u32) -> Self {
        Self {
            magic: *GLB_MAGIC,
            version: GLB_VERSION,
            total_length,
        }
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.magic)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_u32::<LittleEndian>(self.total_length)?;
        Ok(())
    }

    /// Read and validate magic and version, in that order.
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let truncated = |_: io::Error| XvizError::corrupt("container header truncated");
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(|_| {
            XvizError::malformed("input too short to carry a container magic")
        })?;
        if &magic != GLB_MAGIC {
            return Err(XvizError::malformed(format!(
                "invalid container magic {}",
                hex::encode(magic)
            )));
        }
        let version = reader.read_u32::<LittleEndian>().map_err(truncated)?;
        if version != GLB_VERSION {
            return Err(XvizError::UnsupportedFormatVersion(version));
        }
        let total_length = reader.read_u32::<LittleEndian>().map_err(truncated)?;
        Ok(Self { magic, version, total_length })
    }
}

// ── Layout ───────────────────────────────────────────────────────────────────

/// One chunk as found on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    pub kind:          ChunkKind,
    /// Absolute offset of the chunk data (past the chunk header).
    pub data_offset:   usize,
    /// Logical data length, padding excluded.
    pub length:        usize,
    /// Chunk header plus padded data.
    pub physical_size: usize,
}

impl ChunkInfo {
    pub fn data_range(&self) -> Range<usize> {
        self.data_offset..self.data_offset + self.length
    }
}

/// Parsed header and chunk table of a container.
#[derive(Debug, Clone)]
pub struct ContainerLayout {
    pub header: GlbHeader,
    pub chunks: Vec<ChunkInfo>,
}

impl ContainerLayout {
    pub fn json_chunk(&self) -> &ChunkInfo {
        &self.chunks[0]
    }

    pub fn bin_chunks(&self) -> &[ChunkInfo] {
        &self.chunks[1..]
    }

    /// Header size plus the physical size of every chunk.
    pub fn physical_size(&self) -> usize {
        GLB_HEADER_SIZE + self.chunks.iter().map(|c| c.physical_size).sum::<usize>()
    }
}

/// Parse and validate the header and chunk table without touching the JSON.
///
/// Never reads past the declared total length, and requires the declared
/// total to equal `bytes.len()`.
pub fn inspect(bytes: &[u8]) -> Result<ContainerLayout> {
    let header = GlbHeader::read(bytes)?;
    let total = header.total_length as usize;
    if total != bytes.len() {
        return Err(XvizError::corrupt(format!(
            "declared total length {total} but container holds {} bytes",
            bytes.len()
        )));
    }

    let mut chunks = Vec::new();
    let mut pos = GLB_HEADER_SIZE;
    while pos < total {
        if total - pos < CHUNK_HEADER_SIZE {
            return Err(XvizError::corrupt(format!("truncated chunk header at offset {pos}")));
        }
        let length = LittleEndian::read_u32(&bytes[pos..pos + 4]) as usize;
        let tag = LittleEndian::read_u32(&bytes[pos + 4..pos + 8]);
        let kind = ChunkKind::from_tag(tag)
            .ok_or_else(|| XvizError::corrupt(format!("unknown chunk type {tag:#010x} at offset {pos}")))?;

        let data_offset = pos + CHUNK_HEADER_SIZE;
        let remaining = total - data_offset;
        let padded = padded_len(length);
        if padded > remaining {
            return Err(XvizError::corrupt(format!(
                "{} chunk at offset {pos} declares {length} bytes but only {remaining} remain",
                kind.name()
            )));
        }
        if bytes[data_offset + length..data_offset + padded].iter().any(|b| *b != 0) {
            return Err(XvizError::corrupt(format!("non-zero padding in chunk at offset {pos}")));
        }

        chunks.push(ChunkInfo {
            kind,
            data_offset,
            length,
            physical_size: CHUNK_HEADER_SIZE + padded,
        });
        pos = data_offset + padded;
    }

    match chunks.first() {
        Some(c) if c.kind == ChunkKind::Json => {}
        _ => return Err(XvizError::corrupt("container must start with a JSON chunk")),
    }
    if chunks[1..].iter().any(|c| c.kind != ChunkKind::Bin) {
        return Err(XvizError::corrupt("JSON chunk may only appear first"));
    }

    Ok(ContainerLayout { header, chunks })
}

// ── Encode ───────────────────────────────────────────────────────────────────

/// Encode a message into a container.
///
/// Fails with `ConversionUnsupported` when the message contains an object
/// that is indistinguishable from a buffer placeholder, nests deeper than
/// [`MAX_DEPTH`], or would not fit the 32-bit length fields.
pub fn encode(message: &Value) -> Result<Vec<u8>> {
    message.check_depth()?;
    let mut buffers: Vec<&[u8]> = Vec::new();
    let json = extract_buffers(message, &mut buffers)?;
    let json_bytes = serde_json::to_vec(&json)
        .map_err(|e| XvizError::unsupported(format!("JSON serialization failed: {e}")))?;

    let total = GLB_HEADER_SIZE
        + chunk_physical_size(json_bytes.len())
        + buffers.iter().map(|b| chunk_physical_size(b.len())).sum::<usize>();
    let total_length = u32::try_from(total)
        .map_err(|_| XvizError::unsupported(format!("container of {total} bytes exceeds 4 GiB")))?;

    let mut out = Vec::with_capacity(total);
    GlbHeader::new(total_length).write(&mut out)?;
    write_chunk(&mut out, ChunkKind::Json, &json_bytes)?;
    for buffer in &buffers {
        write_chunk(&mut out, ChunkKind::Bin, buffer)?;
    }
    debug_assert_eq!(out.len(), total);

    tracing::debug!(
        total,
        json_len = json_bytes.len(),
        buffers = buffers.len(),
        "encoded container"
    );
    Ok(out)
}

fn write_chunk<W: Write>(writer: &mut W, kind: ChunkKind, data: &[u8]) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(data.len() as u32)?;
    writer.write_u32::<LittleEndian>(kind.tag())?;
    writer.write_all(data)?;
    writer.write_all(&PADDING[..padded_len(data.len()) - data.len()])?;
    Ok(())
}

/// Depth-first walk replacing binary leaves with placeholders.
fn extract_buffers<'a>(value: &'a Value, buffers: &mut Vec<&'a [u8]>) -> Result<serde_json::Value> {
    Ok(match value {
        Value::Binary(bytes) => {
            let index = buffers.len();
            buffers.push(bytes);
            let mut reference = serde_json::Map::new();
            reference.insert(KEY_BUFFER_INDEX.to_owned(), index.into());
            reference.insert(KEY_BYTE_LENGTH.to_owned(), bytes.len().into());
            serde_json::Value::Object(reference)
        }
        Value::Array(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|item| extract_buffers(item, buffers))
                .collect::<Result<_>>()?,
        ),
        Value::Object(map) => {
            if looks_like_placeholder(map) {
                return Err(XvizError::unsupported(
                    "object shaped like a buffer placeholder cannot round-trip through the container",
                ));
            }
            let mut out = serde_json::Map::new();
            for (key, item) in map {
                out.insert(key.clone(), extract_buffers(item, buffers)?);
            }
            serde_json::Value::Object(out)
        }
        scalar => scalar.to_json()?,
    })
}

fn looks_like_placeholder(map: &Map) -> bool {
    let is_index = |v: Option<&Value>| matches!(v, Some(Value::Number(n)) if n.is_u64());
    map.len() == 2 && is_index(map.get(KEY_BUFFER_INDEX)) && is_index(map.get(KEY_BYTE_LENGTH))
}

// ── Decode ───────────────────────────────────────────────────────────────────

/// Decode a container back into a message, restoring every binary leaf.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    let layout = inspect(bytes)?;

    let json_bytes = &bytes[layout.json_chunk().data_range()];
    let depth = json_depth(json_bytes);
    if depth > MAX_DEPTH {
        return Err(XvizError::MalformedContainer(format!(
            "JSON chunk nests {depth} levels, limit is {MAX_DEPTH}"
        )));
    }
    let json: serde_json::Value = serde_json::from_slice(json_bytes)
        .map_err(|e| XvizError::MalformedContainer(e.to_string()))?;

    let buffers: Vec<&[u8]> = layout
        .bin_chunks()
        .iter()
        .map(|c| &bytes[c.data_range()])
        .collect();
    let mut claimed = vec![false; buffers.len()];
    let message = restore_buffers(json, &buffers, &mut claimed)?;

    if let Some(index) = claimed.iter().position(|c| !c) {
        return Err(XvizError::corrupt(format!("binary chunk {index} is not referenced")));
    }

    tracing::debug!(total = bytes.len(), buffers = buffers.len(), "decoded container");
    Ok(message)
}

fn restore_buffers(json: serde_json::Value, buffers: &[&[u8]], claimed: &mut [bool]) -> Result<Value> {
    Ok(match json {
        serde_json::Value::Object(map) => {
            if let Some((index, byte_length)) = placeholder(&map) {
                let buffer = buffers.get(index).ok_or_else(|| {
                    XvizError::corrupt(format!(
                        "buffer reference {index} out of range ({} binary chunks)",
                        buffers.len()
                    ))
                })?;
                if claimed[index] {
                    return Err(XvizError::corrupt(format!("binary chunk {index} referenced twice")));
                }
                if buffer.len() != byte_length {
                    return Err(XvizError::corrupt(format!(
                        "buffer reference {index} declares {byte_length} bytes, chunk holds {}",
                        buffer.len()
                    )));
                }
                claimed[index] = true;
                Value::Binary(buffer.to_vec())
            } else {
                let mut out = Map::new();
                for (key, item) in map {
                    out.insert(key, restore_buffers(item, buffers, claimed)?);
                }
                Value::Object(out)
            }
        }
        serde_json::Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| restore_buffers(item, buffers, claimed))
                .collect::<Result<_>>()?,
        ),
        scalar => Value::from(scalar),
    })
}

fn placeholder(map: &serde_json::Map<String, serde_json::Value>) -> Option<(usize, usize)> {
    if map.len() != 2 {
        return None;
    }
    let index = map.get(KEY_BUFFER_INDEX)?.as_u64()?;
    let length = map.get(KEY_BYTE_LENGTH)?.as_u64()?;
    Some((usize::try_from(index).ok()?, usize::try_from(length).ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        Value::object([
            ("type", Value::from("xviz/state_update")),
            (
                "data",
                Value::object([
                    ("timestamp", Value::float(1001.3).unwrap()),
                    ("points", Value::binary(vec![1u8, 2, 3, 4, 5])),
                    (
                        "nested",
                        Value::Array(vec![
                            Value::binary(vec![9u8; 7]),
                            Value::object([("colors", Value::binary(Vec::<u8>::new()))]),
                        ]),
                    ),
                ]),
            ),
        ])
    }

    /// Assemble a container by hand from raw chunk payloads.
    fn raw_container(chunks: &[(ChunkKind, &[u8])]) -> Vec<u8> {
        let total = GLB_HEADER_SIZE
            + chunks.iter().map(|(_, d)| chunk_physical_size(d.len())).sum::<usize>();
        let mut out = Vec::new();
        GlbHeader::new(total as u32).write(&mut out).unwrap();
        for (kind, data) in chunks {
            write_chunk(&mut out, *kind, data).unwrap();
        }
        out
    }

    fn nested(levels: usize, leaf: Value) -> Value {
        (0..levels).fold(leaf, |v, _| Value::Array(vec![v]))
    }

    #[test]
    fn roundtrip_at_depth_limit() {
        // The buffer placeholder is the deepest level.
        let msg = nested(MAX_DEPTH - 1, Value::binary(vec![1u8, 2, 3]));
        assert_eq!(msg.depth(), MAX_DEPTH);
        assert_eq!(decode(&encode(&msg).unwrap()).unwrap(), msg);
    }

    #[test]
    fn too_deep_message_is_not_encoded() {
        let msg = nested(200, Value::Null);
        assert!(matches!(encode(&msg), Err(XvizError::ConversionUnsupported(_))));
        let msg = nested(MAX_DEPTH, Value::binary(vec![0u8]));
        assert!(matches!(encode(&msg), Err(XvizError::ConversionUnsupported(_))));
    }

    #[test]
    fn too_deep_json_chunk_is_malformed() {
        let json = format!("{}{}", "[".repeat(200), "]".repeat(200));
        let bytes = raw_container(&[(ChunkKind::Json, json.as_bytes())]);
        assert!(matches!(decode(&bytes), Err(XvizError::MalformedContainer(_))));
    }

    #[test]
    fn roundtrip_nested_buffers() {
        let msg = sample();
        let bytes = encode(&msg).unwrap();
        assert_eq!(decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn reencode_is_byte_exact() {
        let bytes = encode(&sample()).unwrap();
        let again = encode(&decode(&bytes).unwrap()).unwrap();
        assert_eq!(bytes, again);
    }

    #[test]
    fn layout_accounts_for_every_byte() {
        let bytes = encode(&sample()).unwrap();
        let layout = inspect(&bytes).unwrap();
        assert_eq!(layout.header.total_length as usize, bytes.len());
        assert_eq!(layout.physical_size(), bytes.len());
        assert_eq!(layout.bin_chunks().len(), 3);
        assert_eq!(bytes.len() % CHUNK_ALIGNMENT, 0);
        for chunk in &layout.chunks {
            assert_eq!(chunk.data_offset % CHUNK_ALIGNMENT, 0);
        }
        // Encounter order: data.nested[0], data.nested[1].colors, data.points
        let lengths: Vec<usize> = layout.bin_chunks().iter().map(|c| c.length).collect();
        assert_eq!(lengths, vec![7, 0, 5]);
    }

    #[test]
    fn message_without_buffers_has_single_chunk() {
        let bytes = encode(&Value::from("hello")).unwrap();
        let layout = inspect(&bytes).unwrap();
        assert_eq!(layout.chunks.len(), 1);
        assert_eq!(decode(&bytes).unwrap(), Value::from("hello"));
    }

    #[test]
    fn json_length_past_end_is_corrupt() {
        let mut bytes = encode(&sample()).unwrap();
        LittleEndian::write_u32(&mut bytes[GLB_HEADER_SIZE..GLB_HEADER_SIZE + 4], 1 << 20);
        assert!(matches!(decode(&bytes), Err(XvizError::CorruptContainer(_))));
    }

    #[test]
    fn unknown_version_rejected_before_anything_else() {
        let mut bytes = encode(&sample()).unwrap();
        LittleEndian::write_u32(&mut bytes[4..8], 7);
        bytes.truncate(20);
        assert!(matches!(decode(&bytes), Err(XvizError::UnsupportedFormatVersion(7))));
    }

    #[test]
    fn total_length_mismatch_is_corrupt() {
        let mut bytes = encode(&sample()).unwrap();
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        assert!(matches!(decode(&bytes), Err(XvizError::CorruptContainer(_))));
        bytes.truncate(bytes.len() - 8);
        assert!(matches!(decode(&bytes), Err(XvizError::CorruptContainer(_))));
    }

    #[test]
    fn bad_magic_is_malformed() {
        let mut bytes = encode(&sample()).unwrap();
        bytes[0] = b'Y';
        assert!(matches!(decode(&bytes), Err(XvizError::MalformedInput(_))));
    }

    #[test]
    fn invalid_json_chunk_is_malformed_container() {
        let bytes = raw_container(&[(ChunkKind::Json, &b"{not json"[..])]);
        assert!(matches!(decode(&bytes), Err(XvizError::MalformedContainer(_))));
    }

    #[test]
    fn out_of_range_reference_is_corrupt() {
        let json = br#"{"bufferIndex":1,"byteLength":2}"#;
        let bytes = raw_container(&[(ChunkKind::Json, &json[..]), (ChunkKind::Bin, &b"ab"[..])]);
        assert!(matches!(decode(&bytes), Err(XvizError::CorruptContainer(_))));
    }

    #[test]
    fn duplicate_reference_is_corrupt() {
        let json = br#"[{"bufferIndex":0,"byteLength":2},{"bufferIndex":0,"byteLength":2}]"#;
        let bytes = raw_container(&[(ChunkKind::Json, &json[..]), (ChunkKind::Bin, &b"ab"[..])]);
        assert!(matches!(decode(&bytes), Err(XvizError::CorruptContainer(_))));
    }

    #[test]
    fn length_mismatch_is_corrupt() {
        let json = br#"{"bufferIndex":0,"byteLength":3}"#;
        let bytes = raw_container(&[(ChunkKind::Json, &json[..]), (ChunkKind::Bin, &b"ab"[..])]);
        assert!(matches!(decode(&bytes), Err(XvizError::CorruptContainer(_))));
    }

    #[test]
    fn unreferenced_chunk_is_corrupt() {
        let bytes = raw_container(&[(ChunkKind::Json, &b"{}"[..]), (ChunkKind::Bin, &b"ab"[..])]);
        assert!(matches!(decode(&bytes), Err(XvizError::CorruptContainer(_))));
    }

    #[test]
    fn bin_before_json_is_corrupt() {
        let bytes = raw_container(&[(ChunkKind::Bin, &b"ab"[..]), (ChunkKind::Json, &b"{}"[..])]);
        assert!(matches!(decode(&bytes), Err(XvizError::CorruptContainer(_))));
    }

    #[test]
    fn nonzero_padding_is_corrupt() {
        let mut bytes = raw_container(&[(ChunkKind::Json, &b"{}"[..])]);
        let last = bytes.len() - 1;
        bytes[last] = 0x20;
        assert!(matches!(decode(&bytes), Err(XvizError::CorruptContainer(_))));
    }

    #[test]
    fn placeholder_shaped_object_is_unsupported() {
        let msg = Value::object([
            (KEY_BUFFER_INDEX, Value::from(0u64)),
            (KEY_BYTE_LENGTH, Value::from(4u64)),
        ]);
        assert!(matches!(encode(&msg), Err(XvizError::ConversionUnsupported(_))));

        // A third key makes it ordinary data.
        let mut map = msg.as_object().unwrap().clone();
        map.insert("extra".into(), Value::Null);
        let ordinary = Value::Object(map);
        assert_eq!(decode(&encode(&ordinary).unwrap()).unwrap(), ordinary);
    }
}
