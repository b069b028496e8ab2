//! Key/value write targets for converted entries.
//!
//! A [`Sink`] only has to honour three operations. Keys handed to it by the
//! writers are always fresh; both provided sinks refuse to overwrite an
//! existing key rather than silently replacing it.

mod directory;

pub use directory::DirectorySink;

use std::collections::BTreeMap;
use std::io;

use crate::error::{Result, XvizError};
use crate::format::Blob;

/// Payload of one entry. JSON-string entries stay text so a reader can tell
/// them apart from JSON bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryData {
    Text(String),
    Bytes(Vec<u8>),
}

impl EntryData {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            EntryData::Text(s)  => s.as_bytes(),
            EntryData::Bytes(b) => b,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            EntryData::Text(s)  => s.into_bytes(),
            EntryData::Bytes(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TryFrom<Blob> for EntryData {
    type Error = XvizError;

    fn try_from(blob: Blob) -> Result<Self> {
        match blob {
            Blob::Text(s)   => Ok(EntryData::Text(s)),
            Blob::Bytes(b)  => Ok(EntryData::Bytes(b)),
            Blob::Object(_) => Err(XvizError::unsupported(
                "structured objects must be serialized before they can be written",
            )),
        }
    }
}

impl From<EntryData> for Blob {
    fn from(data: EntryData) -> Self {
        match data {
            EntryData::Text(s)  => Blob::Text(s),
            EntryData::Bytes(b) => Blob::Bytes(b),
        }
    }
}

pub trait Sink {
    /// Store `data` under `key`. Must be atomic per key.
    fn write(&mut self, key: &str, data: EntryData) -> io::Result<()>;
    fn has(&self, key: &str) -> bool;
    /// Every entry, in a stable order.
    fn entries(&self) -> io::Result<Vec<(String, EntryData)>>;
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn write(&mut self, key: &str, data: EntryData) -> io::Result<()> {
        (**self).write(key, data)
    }

    fn has(&self, key: &str) -> bool {
        (**self).has(key)
    }

    fn entries(&self) -> io::Result<Vec<(String, EntryData)>> {
        (**self).entries()
    }
}

/// In-memory sink ordered by key.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    entries: BTreeMap<String, EntryData>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&EntryData> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Sink for MemorySink {
    fn write(&mut self, key: &str, data: EntryData) -> io::Result<()> {
        if self.entries.contains_key(key) {
            return Err(already_exists(key));
        }
        self.entries.insert(key.to_owned(), data);
        Ok(())
    }

    fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn entries(&self) -> io::Result<Vec<(String, EntryData)>> {
        Ok(self.entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

fn already_exists(key: &str) -> io::Error {
    io::Error::new(io::ErrorKind::AlreadyExists, format!("entry already written: {key}"))
}
