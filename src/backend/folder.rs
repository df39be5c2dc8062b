//! Plain directory backend

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;
use walkdir::WalkDir;

use super::{relative_entry, Storage, StorageReader, StorageWriter};
use crate::error::CrateError;
use crate::vocab::METADATA_DESCRIPTOR_ID;

/// Crates stored as a directory tree
#[derive(Debug, Clone, Copy, Default)]
pub struct FolderStorage;

impl Storage for FolderStorage {
    fn create(&self, destination: &Path) -> Result<Box<dyn StorageWriter>, CrateError> {
        Ok(Box::new(FolderWriter::create(destination)?))
    }

    fn open(&self, source: &Path) -> Result<Arc<dyn StorageReader>, CrateError> {
        Ok(Arc::new(FolderReader::open(source)?))
    }
}

/// Resolve an entry path below `root`, one component per '/' segment
fn entry_location(root: &Path, path: &str) -> Result<PathBuf, CrateError> {
    let mut location = root.to_path_buf();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." {
            return Err(CrateError::InvalidPath(PathBuf::from(path)));
        }
        location.push(segment);
    }
    Ok(location)
}

/// Populates a crate directory
#[derive(Debug)]
pub struct FolderWriter {
    root: PathBuf,
}

impl FolderWriter {
    /// The destination must be absent or an empty directory
    pub fn create(destination: &Path) -> Result<Self, CrateError> {
        if destination.exists() {
            if !destination.is_dir() {
                return Err(CrateError::InvalidPath(destination.to_path_buf()));
            }
            if fs::read_dir(destination)?.next().is_some() {
                return Err(CrateError::DestinationNotEmpty(destination.to_path_buf()));
            }
        } else {
            fs::create_dir_all(destination)?;
        }

        Ok(Self {
            root: destination.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl StorageWriter for FolderWriter {
    fn put_entry(&mut self, path: &str, source: &mut dyn Read) -> Result<u64, CrateError> {
        let target = entry_location(&self.root, path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&target)?;
        let written = io::copy(source, &mut file)?;
        debug!(entry = path, bytes = written, "wrote folder entry");
        Ok(written)
    }

    fn put_directory(&mut self, path: &str) -> Result<(), CrateError> {
        fs::create_dir_all(entry_location(&self.root, path)?)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), CrateError> {
        Ok(())
    }

    fn abort(self: Box<Self>) {
        // The metadata entry is written last, so an aborted folder never
        // contains one.
        debug!(root = %self.root.display(), "aborted folder write");
    }
}

/// Reads a crate directory
#[derive(Debug, Clone)]
pub struct FolderReader {
    root: PathBuf,
}

impl FolderReader {
    /// Accepts the crate directory or the path of its metadata file
    pub fn open(source: &Path) -> Result<Self, CrateError> {
        let root = if source.is_dir() {
            source.to_path_buf()
        } else if source.is_file()
            && source.file_name().and_then(|n| n.to_str()) == Some(METADATA_DESCRIPTOR_ID)
        {
            source
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        } else {
            return Err(CrateError::InvalidPath(source.to_path_buf()));
        };

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl StorageReader for FolderReader {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    fn list_entries(&self) -> Result<Vec<String>, CrateError> {
        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| CrateError::Io(e.into()))?;
            if entry.file_type().is_file() {
                entries.push(relative_entry(&self.root, entry.path())?);
            }
        }
        entries.sort();
        Ok(entries)
    }

    fn open_entry(&self, path: &str) -> Result<Box<dyn Read + Send>, CrateError> {
        let location = entry_location(&self.root, path)?;
        if !location.is_file() {
            return Err(CrateError::EntryNotFound(path.to_string()));
        }
        Ok(Box::new(File::open(location)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_open_entry() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("crate");

        let mut writer = FolderWriter::create(&root).unwrap();
        writer
            .put_entry("data/nested/a.txt", &mut "hello".as_bytes())
            .unwrap();
        writer.put_entry("b.txt", &mut "first".as_bytes()).unwrap();
        writer.put_entry("b.txt", &mut "second".as_bytes()).unwrap();
        Box::new(writer).finish().unwrap();

        let reader = FolderReader::open(&root).unwrap();
        assert_eq!(
            reader.list_entries().unwrap(),
            vec!["b.txt".to_string(), "data/nested/a.txt".to_string()]
        );

        let mut content = String::new();
        reader
            .open_entry("b.txt")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "second");

        assert!(matches!(
            reader.open_entry("missing.txt"),
            Err(CrateError::EntryNotFound(_))
        ));
        assert_eq!(reader.entries_under("data").unwrap().len(), 1);
    }

    #[test]
    fn test_destination_must_be_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("existing.txt"), "x").unwrap();

        assert!(matches!(
            FolderWriter::create(dir.path()),
            Err(CrateError::DestinationNotEmpty(_))
        ));
        assert!(matches!(
            FolderWriter::create(&dir.path().join("existing.txt")),
            Err(CrateError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_put_tree_keeps_layout() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        fs::create_dir_all(source.join("sub")).unwrap();
        fs::create_dir_all(source.join("empty")).unwrap();
        fs::write(source.join("first.txt"), "one").unwrap();
        fs::write(source.join("sub").join("second.txt"), "two").unwrap();

        let root = dir.path().join("crate");
        let mut writer = FolderWriter::create(&root).unwrap();
        let copy = writer
            .put_tree("files", &source, &|path| path == "files/first.txt")
            .unwrap();

        assert_eq!(copy.written, vec!["files/sub/second.txt".to_string()]);
        assert!(copy.unreadable.is_empty());
        assert!(!root.join("files").join("first.txt").exists());
        assert!(root.join("files").join("empty").is_dir());
        assert_eq!(
            fs::read_to_string(root.join("files").join("sub").join("second.txt")).unwrap(),
            "two"
        );
    }

    #[test]
    fn test_open_accepts_metadata_path() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = dir.path().join(METADATA_DESCRIPTOR_ID);
        fs::write(&metadata, "{}").unwrap();

        let reader = FolderReader::open(&metadata).unwrap();
        assert_eq!(reader.root(), dir.path());

        assert!(matches!(
            FolderReader::open(&dir.path().join("nope")),
            Err(CrateError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_entry_location_rejects_parent_segments() {
        assert!(entry_location(Path::new("/tmp"), "../escape.txt").is_err());
    }
}
