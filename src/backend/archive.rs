//! Zip archive backend

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};
use ulid::Ulid;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive};

use super::{Storage, StorageReader, StorageWriter};
use crate::error::CrateError;
use crate::vocab::METADATA_DESCRIPTOR_ID;

/// Crates stored as a single zip archive
#[derive(Debug, Clone, Copy)]
pub struct ZipStorage {
    compression: CompressionMethod,
}

impl Default for ZipStorage {
    fn default() -> Self {
        Self {
            compression: CompressionMethod::Deflated,
        }
    }
}

impl ZipStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compression method used for new entries
    pub fn with_compression(mut self, compression: CompressionMethod) -> Self {
        self.compression = compression;
        self
    }
}

impl Storage for ZipStorage {
    fn create(&self, destination: &Path) -> Result<Box<dyn StorageWriter>, CrateError> {
        Ok(Box::new(ZipWriter::create(destination, self.compression)?))
    }

    fn open(&self, source: &Path) -> Result<Arc<dyn StorageReader>, CrateError> {
        Ok(Arc::new(ZipReader::open(source)?))
    }
}

/// Builds a crate archive
///
/// Entries go to a sibling `.partial` file which only replaces the
/// destination once [`finish`](StorageWriter::finish) succeeds.
pub struct ZipWriter {
    destination: PathBuf,
    partial: PathBuf,
    archive: zip::ZipWriter<File>,
    options: SimpleFileOptions,
    names: HashSet<String>,
}

impl ZipWriter {
    pub fn create(destination: &Path, compression: CompressionMethod) -> Result<Self, CrateError> {
        if destination.is_dir() {
            return Err(CrateError::InvalidPath(destination.to_path_buf()));
        }
        let file_name = destination
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CrateError::InvalidPath(destination.to_path_buf()))?;

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let partial = destination.with_file_name(format!("{}.{}.partial", file_name, Ulid::new()));
        let archive = zip::ZipWriter::new(File::create(&partial)?);

        Ok(Self {
            destination: destination.to_path_buf(),
            partial,
            archive,
            options: SimpleFileOptions::default().compression_method(compression),
            names: HashSet::new(),
        })
    }

    fn finalize(self) -> Result<(), CrateError> {
        let file = self.archive.finish()?;
        file.sync_all()?;
        drop(file);
        fs::rename(&self.partial, &self.destination)?;
        Ok(())
    }
}

impl StorageWriter for ZipWriter {
    fn put_entry(&mut self, path: &str, source: &mut dyn Read) -> Result<u64, CrateError> {
        // Archive entries cannot be rewritten once their data is streamed.
        if !self.names.insert(path.to_string()) {
            return Err(CrateError::DuplicateEntry(path.to_string()));
        }
        self.archive.start_file(path, self.options)?;
        let written = io::copy(source, &mut self.archive)?;
        debug!(entry = path, bytes = written, "wrote zip entry");
        Ok(written)
    }

    fn put_directory(&mut self, path: &str) -> Result<(), CrateError> {
        let name = format!("{}/", path.trim_end_matches('/'));
        if name == "/" || !self.names.insert(name.clone()) {
            return Ok(());
        }
        self.archive.add_directory(name, self.options)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), CrateError> {
        let partial = self.partial.clone();
        let result = (*self).finalize();
        if result.is_err() {
            let _ = fs::remove_file(&partial);
        }
        result
    }

    fn abort(self: Box<Self>) {
        let ZipWriter {
            partial, archive, ..
        } = *self;
        drop(archive);
        if let Err(e) = fs::remove_file(&partial) {
            warn!(path = %partial.display(), error = %e, "could not remove partial archive");
        }
    }
}

/// Reads a crate archive
///
/// The archive is reopened for every call, so no handle outlives the call
/// that needed it.
#[derive(Debug, Clone)]
pub struct ZipReader {
    path: PathBuf,
    /// Directory inside the archive holding the crate ("" or "name/")
    prefix: String,
}

impl ZipReader {
    pub fn open(source: &Path) -> Result<Self, CrateError> {
        if !source.is_file() {
            return Err(CrateError::InvalidPath(source.to_path_buf()));
        }
        let archive = ZipArchive::new(File::open(source)?)?;
        let names: Vec<String> = archive.file_names().map(String::from).collect();

        Ok(Self {
            path: source.to_path_buf(),
            prefix: find_crate_root(&names),
        })
    }

    /// Directory inside the archive the crate is rooted at
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn archive(&self) -> Result<ZipArchive<File>, CrateError> {
        Ok(ZipArchive::new(File::open(&self.path)?)?)
    }
}

impl StorageReader for ZipReader {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn list_entries(&self) -> Result<Vec<String>, CrateError> {
        let archive = self.archive()?;
        let mut entries: Vec<String> = archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .filter_map(|name| name.strip_prefix(self.prefix.as_str()))
            .map(String::from)
            .collect();
        entries.sort();
        Ok(entries)
    }

    fn open_entry(&self, path: &str) -> Result<Box<dyn Read + Send>, CrateError> {
        let mut archive = self.archive()?;
        let name = format!("{}{}", self.prefix, path);
        let mut entry = match archive.by_name(&name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Err(CrateError::EntryNotFound(path.to_string())),
            Err(e) => return Err(e.into()),
        };

        let mut content = Vec::with_capacity(initial_capacity(entry.size()));
        entry.read_to_end(&mut content)?;
        Ok(Box::new(Cursor::new(content)))
    }
}

/// Largest buffer reserved up front for one entry
const PREALLOC_LIMIT: u64 = 1 << 20;

/// Buffer size to reserve for an entry whose header claims `declared`
/// bytes. The header is not trusted beyond [`PREALLOC_LIMIT`].
fn initial_capacity(declared: u64) -> usize {
    usize::try_from(declared.min(PREALLOC_LIMIT)).unwrap_or(0)
}

/// Find the directory the crate is rooted at inside an archive
///
/// Either the archive root, or, for archives made by zipping a crate
/// folder, the single top-level directory that holds the metadata file.
fn find_crate_root(names: &[String]) -> String {
    if names.iter().any(|n| n == METADATA_DESCRIPTOR_ID) {
        return String::new();
    }

    let top_level_dirs: HashSet<&str> = names
        .iter()
        .filter_map(|n| n.split('/').next())
        .filter(|s| !s.is_empty())
        .collect();

    if top_level_dirs.len() == 1 {
        if let Some(dir) = top_level_dirs.into_iter().next() {
            let prefix = format!("{}/", dir);
            let expected = format!("{}{}", prefix, METADATA_DESCRIPTOR_ID);
            if names.iter().any(|n| *n == expected) {
                return prefix;
            }
        }
    }

    String::new()
}
