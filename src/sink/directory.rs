use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::{already_exists, EntryData, Sink};

const PARTIAL_PREFIX: &str = ".partial-";

/// One file per key inside a directory.
///
/// Each entry is written to a hidden temporary file first and hard-linked
/// into place, so a key is either fully present or absent and an existing
/// file is never replaced.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    /// Open `root`, creating it if necessary.
    pub fn new<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let root = root.as_ref().to_owned();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> io::Result<PathBuf> {
        let plain = !key.is_empty()
            && !key.starts_with('.')
            && !key.contains(['/', '\\']);
        if !plain {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("entry key is not a plain file name: {key:?}"),
            ));
        }
        Ok(self.root.join(key))
    }
}

impl Sink for DirectorySink {
    fn write(&mut self, key: &str, data: EntryData) -> io::Result<()> {
        let path = self.entry_path(key)?;
        let partial = self.root.join(format!("{PARTIAL_PREFIX}{key}"));
        let published = write_partial(&partial, data.as_bytes())
            .and_then(|()| fs::hard_link(&partial, &path));
        let cleanup = fs::remove_file(&partial);
        match published {
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(already_exists(key)),
            Err(e) => Err(e),
            Ok(()) => cleanup,
        }
    }

    fn has(&self, key: &str) -> bool {
        self.entry_path(key).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Every entry as bytes, sorted by key. Partial files are skipped.
    fn entries(&self) -> io::Result<Vec<(String, EntryData)>> {
        let mut out = Vec::new();
        for dirent in fs::read_dir(&self.root)? {
            let dirent = dirent?;
            if !dirent.file_type()?.is_file() {
                continue;
            }
            let name = dirent.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let bytes = fs::read(dirent.path())?;
            out.push((name, EntryData::Bytes(bytes)));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

fn write_partial(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut f = File::create(path)?;
    f.write_all(bytes)?;
    f.sync_all()
}
