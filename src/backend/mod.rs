//! Storage backends for crate payloads
//!
//! A crate lives either in a plain directory or in a zip archive. Both
//! expose the same contract: named byte streams addressed by a relative,
//! '/'-separated entry path, with `ro-crate-metadata.json` at the root.
//!
//! [`Storage`] is the strategy a [`CrateWriter`](crate::writer::CrateWriter)
//! or [`CrateReader`](crate::reader::CrateReader) is constructed with. It
//! binds a location to a [`StorageWriter`] (write side) or a
//! [`StorageReader`] (read side).

pub mod archive;
pub mod folder;

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use walkdir::WalkDir;

use crate::error::CrateError;
use crate::id::join_entry;

pub use archive::{ZipReader, ZipStorage, ZipWriter};
pub use folder::{FolderReader, FolderStorage, FolderWriter};

/// What [`StorageWriter::put_tree`] copied
#[derive(Debug, Default)]
pub struct TreeCopy {
    /// Entry paths written
    pub written: Vec<String>,
    /// Source files that could not be read, with the reason
    pub unreadable: Vec<(String, String)>,
}

/// Binds locations on disk to a storage backend
pub trait Storage {
    /// Prepare `destination` to receive a new crate
    fn create(&self, destination: &Path) -> Result<Box<dyn StorageWriter>, CrateError>;

    /// Open an existing crate at `source`
    fn open(&self, source: &Path) -> Result<Arc<dyn StorageReader>, CrateError>;
}

/// Write side of a backend
///
/// Nothing written is guaranteed to be visible at the destination until
/// [`finish`](StorageWriter::finish) returns.
pub trait StorageWriter {
    /// Write a byte stream to `path`, replacing any previous entry there.
    /// Returns the number of bytes written.
    fn put_entry(&mut self, path: &str, source: &mut dyn Read) -> Result<u64, CrateError>;

    /// Record a (possibly empty) directory at `path`
    fn put_directory(&mut self, path: &str) -> Result<(), CrateError>;

    /// Copy every file below `dir` into entries rooted at `prefix`,
    /// keeping the nested layout. Entries for which `skip` returns true are
    /// left alone.
    ///
    /// Source files that cannot be read are collected in the result; only
    /// failures at the destination are returned as errors.
    fn put_tree(
        &mut self,
        prefix: &str,
        dir: &Path,
        skip: &dyn Fn(&str) -> bool,
    ) -> Result<TreeCopy, CrateError> {
        let mut copy = TreeCopy::default();
        self.put_directory(prefix)?;

        for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                    copy.unreadable.push((path, e.to_string()));
                    continue;
                }
            };
            let relative = match relative_entry(dir, entry.path()) {
                Ok(relative) => relative,
                Err(e) => {
                    copy.unreadable
                        .push((entry.path().display().to_string(), e.to_string()));
                    continue;
                }
            };
            let path = join_entry(prefix, &relative);

            if entry.file_type().is_dir() {
                self.put_directory(&path)?;
            } else if entry.file_type().is_file() && !skip(&path) {
                let mut file = match File::open(entry.path()) {
                    Ok(file) => file,
                    Err(e) => {
                        copy.unreadable.push((relative, e.to_string()));
                        continue;
                    }
                };
                self.put_entry(&path, &mut file)?;
                copy.written.push(path);
            }
        }

        Ok(copy)
    }

    /// Make everything written so far visible at the destination
    fn finish(self: Box<Self>) -> Result<(), CrateError>;

    /// Give up on the write, leaving no artifact that passes for a crate
    fn abort(self: Box<Self>);
}

/// Read side of a backend
///
/// Readers are shared by every payload bound to them, so they are cheap
/// handles that acquire file or archive handles per call.
pub trait StorageReader: Send + Sync {
    /// Human-readable location for messages
    fn location(&self) -> String;

    /// All file entries below the crate root, sorted, metadata included
    fn list_entries(&self) -> Result<Vec<String>, CrateError>;

    /// Open an entry for reading from its first byte
    fn open_entry(&self, path: &str) -> Result<Box<dyn Read + Send>, CrateError>;

    /// File entries strictly below the directory `prefix`
    fn entries_under(&self, prefix: &str) -> Result<Vec<String>, CrateError> {
        let dir = format!("{}/", prefix.trim_end_matches('/'));
        Ok(self
            .list_entries()?
            .into_iter()
            .filter(|e| e.starts_with(&dir))
            .collect())
    }
}

/// Entry path of `path` relative to `root`, with '/' separators
pub(crate) fn relative_entry(root: &Path, path: &Path) -> Result<String, CrateError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| CrateError::InvalidPath(path.to_path_buf()))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component.as_os_str().to_str() {
            Some(part) => parts.push(part),
            None => return Err(CrateError::InvalidPath(path.to_path_buf())),
        }
    }
    Ok(parts.join("/"))
}
