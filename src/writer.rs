//! Writing crates to a storage backend
//!
//! A save encodes the metadata first, copies every local payload to the
//! entry named by its entity's @id, and writes `ro-crate-metadata.json`
//! last. Payloads that cannot be read are skipped and reported; a failure
//! at the destination aborts the save without leaving a crate behind.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::{Storage, StorageWriter};
use crate::entity::{Entity, Payload, StoredPayload};
use crate::error::{CrateError, PayloadWarning};
use crate::id::{entry_path, is_contained, join_entry};
use crate::rocrate::RoCrate;
use crate::vocab::METADATA_DESCRIPTOR_ID;

/// Options for writing crates
#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// Pretty-print the metadata document
    pub pretty: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self { pretty: true }
    }
}

/// Outcome of a save that completed
#[derive(Debug, Clone, Serialize)]
pub struct SaveReport {
    pub destination: PathBuf,
    /// Every entry written, the metadata file last
    pub entries: Vec<String>,
    /// Data entities whose payload was skipped
    pub warnings: Vec<PayloadWarning>,
}

impl SaveReport {
    /// Whether every local payload made it into the destination
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Fail with the first skipped payload, if any. The destination has
    /// been written either way.
    pub fn into_result(mut self) -> Result<SaveReport, CrateError> {
        if self.warnings.is_empty() {
            Ok(self)
        } else {
            Err(self.warnings.swap_remove(0).into_error())
        }
    }
}

/// Writes crates through the storage strategy it was built with
///
/// ```ignore
/// let report = CrateWriter::new(ZipStorage::default()).save(&crate_, "out.zip")?;
/// for warning in &report.warnings {
///     eprintln!("{}", warning);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CrateWriter<S: Storage> {
    storage: S,
    options: SaveOptions,
}

impl<S: Storage> CrateWriter<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            options: SaveOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SaveOptions) -> Self {
        self.options = options;
        self
    }

    pub fn save(
        &self,
        crate_: &RoCrate,
        destination: impl AsRef<Path>,
    ) -> Result<SaveReport, CrateError> {
        let destination = destination.as_ref();
        let metadata = crate_.json_metadata_with(self.options.pretty)?;

        let mut sink = self.storage.create(destination)?;
        let mut report = SaveReport {
            destination: destination.to_path_buf(),
            entries: Vec::new(),
            warnings: Vec::new(),
        };

        if let Err(e) = write_entries(sink.as_mut(), crate_, &metadata, &mut report) {
            sink.abort();
            return Err(e);
        }
        sink.finish()?;

        info!(
            destination = %destination.display(),
            entries = report.entries.len(),
            skipped = report.warnings.len(),
            "saved crate"
        );
        Ok(report)
    }
}

/// Why a single payload was not copied
enum Skip {
    /// Recoverable: reported as a warning
    Unavailable(String),
    /// The destination failed; the save cannot continue
    Fatal(CrateError),
}

// Every error raised by the sink is a destination failure.
impl From<CrateError> for Skip {
    fn from(e: CrateError) -> Self {
        Skip::Fatal(e)
    }
}

/// Who put an entry into the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// The entity whose @id names the entry
    Entity,
    /// The expansion of a directory payload
    Tree,
}

/// What one payload contributed to the destination
#[derive(Debug, Default)]
struct Copied {
    written: Vec<String>,
    /// Files of a directory payload that were left out, with the reason
    unreadable: Vec<(String, String)>,
}

fn is_tree(payload: &Payload) -> bool {
    match payload {
        Payload::LocalDirectory(_) => true,
        Payload::Stored(stored) => stored.is_directory(),
        _ => false,
    }
}

fn write_entries(
    sink: &mut dyn StorageWriter,
    crate_: &RoCrate,
    metadata: &str,
    report: &mut SaveReport,
) -> Result<(), CrateError> {
    let mut claims: HashMap<String, Origin> =
        HashMap::from([(METADATA_DESCRIPTOR_ID.to_string(), Origin::Entity)]);

    for entity in crate_.data_entities() {
        let Some(payload) = entity.payload() else {
            continue;
        };
        if !payload.is_local() {
            continue;
        }

        let tree = is_tree(payload);
        let outcome = match entry_path(entity.id()) {
            None => Err(Skip::Unavailable(
                "@id does not name a path inside the crate".to_string(),
            )),
            Some(entry) => match claims.get(&entry) {
                Some(Origin::Tree) if !tree => {
                    debug!(id = entity.id(), "entry already written with its directory");
                    continue;
                }
                Some(_) => Err(Skip::Unavailable(format!(
                    "entry '{}' was already written by another entity",
                    entry
                ))),
                None => copy_payload(sink, payload, &entry, &claims),
            },
        };

        match outcome {
            Ok(copied) => {
                let origin = if tree { Origin::Tree } else { Origin::Entity };
                for path in &copied.written {
                    claims.insert(path.clone(), origin);
                }
                report.entries.extend(copied.written);

                if !copied.unreadable.is_empty() {
                    let files: Vec<String> = copied
                        .unreadable
                        .iter()
                        .map(|(file, reason)| format!("{} ({})", file, reason))
                        .collect();
                    let reason = format!("files not copied: {}", files.join("; "));
                    skip(report, entity, payload, reason);
                }
            }
            Err(Skip::Unavailable(reason)) => skip(report, entity, payload, reason),
            Err(Skip::Fatal(e)) => return Err(e),
        }
    }

    sink.put_entry(METADATA_DESCRIPTOR_ID, &mut metadata.as_bytes())?;
    report.entries.push(METADATA_DESCRIPTOR_ID.to_string());
    Ok(())
}

fn copy_payload(
    sink: &mut dyn StorageWriter,
    payload: &Payload,
    entry: &str,
    claims: &HashMap<String, Origin>,
) -> Result<Copied, Skip> {
    match payload {
        Payload::LocalFile(path) => {
            if !path.is_file() {
                return Err(Skip::Unavailable("not an existing file".to_string()));
            }
            let mut file = File::open(path).map_err(|e| Skip::Unavailable(e.to_string()))?;
            sink.put_entry(entry, &mut file)?;
            Ok(Copied {
                written: vec![entry.to_string()],
                ..Copied::default()
            })
        }
        Payload::LocalDirectory(path) => {
            if !path.is_dir() {
                return Err(Skip::Unavailable("not an existing directory".to_string()));
            }
            let copy = sink.put_tree(entry, path, &|target| claims.contains_key(target))?;
            Ok(Copied {
                written: copy.written,
                unreadable: copy.unreadable,
            })
        }
        Payload::Stored(stored) if stored.is_directory() => {
            copy_stored_tree(sink, stored, entry, claims)
        }
        Payload::Stored(stored) => {
            let mut source = stored
                .open()
                .map_err(|e| Skip::Unavailable(e.to_string()))?;
            sink.put_entry(entry, &mut source)?;
            Ok(Copied {
                written: vec![entry.to_string()],
                ..Copied::default()
            })
        }
        Payload::Remote(_) => Ok(Copied::default()),
    }
}

fn copy_stored_tree(
    sink: &mut dyn StorageWriter,
    stored: &StoredPayload,
    entry: &str,
    claims: &HashMap<String, Origin>,
) -> Result<Copied, Skip> {
    let files = stored
        .files()
        .map_err(|e| Skip::Unavailable(e.to_string()))?;
    let source_prefix = format!("{}/", stored.entry());

    sink.put_directory(entry)?;
    let mut copied = Copied::default();
    for file in files {
        let relative = file.strip_prefix(source_prefix.as_str()).unwrap_or(file.as_str());
        if !is_contained(relative) {
            copied
                .unreadable
                .push((file.clone(), "path leaves the directory".to_string()));
            continue;
        }
        let target = join_entry(entry, relative);
        if claims.contains_key(&target) {
            continue;
        }

        let mut source = match stored.storage().open_entry(&file) {
            Ok(source) => source,
            Err(e) => {
                copied.unreadable.push((file.clone(), e.to_string()));
                continue;
            }
        };
        sink.put_entry(&target, &mut source)?;
        copied.written.push(target);
    }
    Ok(copied)
}

fn skip(report: &mut SaveReport, entity: &Entity, payload: &Payload, reason: String) {
    let path = match payload {
        Payload::LocalFile(p) | Payload::LocalDirectory(p) => p.display().to_string(),
        Payload::Stored(s) => format!("{}!{}", s.storage().location(), s.entry()),
        Payload::Remote(url) => url.to_string(),
    };
    warn!(id = entity.id(), path = %path, reason = %reason, "skipping payload");
    report.warnings.push(PayloadWarning {
        id: entity.id().to_string(),
        path,
        reason,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FolderStorage, ZipStorage};
    use crate::entity::DataEntityBuilder;
    use crate::reader::CrateReader;
    use crate::rocrate::RoCrateBuilder;
    use std::fs;
    use std::io::Write;

    #[test]
    fn test_missing_payload_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.txt");
        fs::write(&present, "here").unwrap();

        let crate_ = RoCrateBuilder::new("partial", "one payload is missing")
            .add_data_entity(
                DataEntityBuilder::file()
                    .id("present.txt")
                    .source(&present)
                    .build()
                    .unwrap(),
            )
            .add_data_entity(
                DataEntityBuilder::file()
                    .id("absent.txt")
                    .source(dir.path().join("absent.txt"))
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();

        let out = dir.path().join("out");
        let report = CrateWriter::new(FolderStorage)
            .save(&crate_, &out)
            .unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].id, "absent.txt");
        assert_eq!(
            report.entries,
            vec!["present.txt".to_string(), "ro-crate-metadata.json".to_string()]
        );
        assert!(out.join("present.txt").is_file());
        assert!(!out.join("absent.txt").exists());
        assert!(out.join("ro-crate-metadata.json").is_file());
    }

    #[test]
    fn test_metadata_only_entities_write_no_entry() {
        let dir = tempfile::tempdir().unwrap();
        let crate_ = RoCrateBuilder::new("remote", "remote and unbound payloads")
            .add_data_entity(
                DataEntityBuilder::file()
                    .remote("https://example.org/big.csv")
                    .build()
                    .unwrap(),
            )
            .add_data_entity(DataEntityBuilder::file().id("unbound.csv").build().unwrap())
            .build()
            .unwrap();

        let out = dir.path().join("crate.zip");
        let report = CrateWriter::new(ZipStorage::default())
            .save(&crate_, &out)
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.entries, vec!["ro-crate-metadata.json".to_string()]);
    }

    #[test]
    fn test_colliding_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.txt");
        fs::write(&source, "a").unwrap();

        let crate_ = RoCrateBuilder::new("collide", "two ids, one path")
            .add_data_entity(
                DataEntityBuilder::file()
                    .id("a.txt")
                    .source(&source)
                    .build()
                    .unwrap(),
            )
            .add_data_entity(
                DataEntityBuilder::file()
                    .id("./a.txt")
                    .source(&source)
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();

        let report = CrateWriter::new(ZipStorage::default())
            .save(&crate_, dir.path().join("c.zip"))
            .unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].id, "./a.txt");
    }

    #[test]
    fn test_failed_save_leaves_no_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("taken");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("other.txt"), "x").unwrap();

        let crate_ = RoCrateBuilder::new("n", "d").build().unwrap();
        let result = CrateWriter::new(FolderStorage).save(&crate_, &out);

        assert!(matches!(result, Err(CrateError::DestinationNotEmpty(_))));
        assert!(!out.join("ro-crate-metadata.json").exists());
    }

    #[test]
    fn test_compact_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let crate_ = RoCrateBuilder::new("n", "d").build().unwrap();
        let out = dir.path().join("compact");

        CrateWriter::new(FolderStorage)
            .with_options(SaveOptions { pretty: false })
            .save(&crate_, &out)
            .unwrap();

        let written = fs::read_to_string(out.join("ro-crate-metadata.json")).unwrap();
        assert_eq!(written, crate_.json_metadata_with(false).unwrap());
        assert!(!written.contains('\n'));
    }

    #[test]
    fn test_file_inside_written_dataset_is_not_a_collision() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("a.txt"), "a").unwrap();
        fs::write(data.join("b.txt"), "b").unwrap();

        let crate_ = RoCrateBuilder::new("nested", "dataset listed before its file")
            .add_data_entity(
                DataEntityBuilder::dataset()
                    .id("data/")
                    .source(&data)
                    .build()
                    .unwrap(),
            )
            .add_data_entity(
                DataEntityBuilder::file()
                    .id("data/b.txt")
                    .source(data.join("b.txt"))
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();

        let report = CrateWriter::new(ZipStorage::default())
            .save(&crate_, dir.path().join("nested.zip"))
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(
            report.entries,
            vec![
                "data/a.txt".to_string(),
                "data/b.txt".to_string(),
                "ro-crate-metadata.json".to_string()
            ]
        );
    }

    #[test]
    fn test_stored_entry_outside_its_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("crafted.zip");
        let metadata = r##"{"@graph": [
            {"@id": "ro-crate-metadata.json", "about": {"@id": "./"}},
            {"@id": "./", "@type": "Dataset", "hasPart": [{"@id": "data/"}]},
            {"@id": "data/", "@type": "Dataset"}
        ]}"##;

        let mut zip = zip::ZipWriter::new(fs::File::create(&archive).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in [
            ("ro-crate-metadata.json", metadata),
            ("data/a.txt", "a"),
            ("data/../escape.txt", "x"),
        ] {
            zip.start_file(name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();

        let crate_ = CrateReader::new(ZipStorage::default())
            .read_crate(&archive)
            .unwrap();
        let out = dir.path().join("unpacked");
        let report = CrateWriter::new(FolderStorage).save(&crate_, &out).unwrap();

        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].id, "data/");
        assert!(out.join("data").join("a.txt").is_file());
        assert!(out.join("ro-crate-metadata.json").is_file());
        assert!(!out.join("escape.txt").exists());
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_destination_failure_in_tree_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let single = dir.path().join("z");
        fs::write(&single, "z").unwrap();
        let tree = dir.path().join("x");
        fs::create_dir_all(&tree).unwrap();
        fs::write(tree.join("y"), "y").unwrap();

        // "x/y/z" makes "x/y" a directory before the tree wants a file there
        let crate_ = RoCrateBuilder::new("blocked", "tree entry clashes with a directory")
            .add_data_entity(
                DataEntityBuilder::file()
                    .id("x/y/z")
                    .source(&single)
                    .build()
                    .unwrap(),
            )
            .add_data_entity(
                DataEntityBuilder::dataset()
                    .id("x/")
                    .source(&tree)
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();

        let out = dir.path().join("out");
        let result = CrateWriter::new(FolderStorage).save(&crate_, &out);

        assert!(matches!(result, Err(CrateError::Io(_))));
        assert!(!out.join("ro-crate-metadata.json").exists());
    }

    #[test]
    fn test_into_result_escalates_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let crate_ = RoCrateBuilder::new("strict", "missing payload")
            .add_data_entity(
                DataEntityBuilder::file()
                    .source(dir.path().join("absent.txt"))
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();

        let report = CrateWriter::new(FolderStorage)
            .save(&crate_, dir.path().join("out"))
            .unwrap();
        match report.into_result() {
            Err(CrateError::PayloadUnavailable { id, .. }) => assert_eq!(id, "absent.txt"),
            other => panic!("expected PayloadUnavailable, got {:?}", other),
        }

        let empty = RoCrateBuilder::new("n", "d").build().unwrap();
        let report = CrateWriter::new(FolderStorage)
            .save(&empty, dir.path().join("empty"))
            .unwrap();
        assert!(report.into_result().is_ok());
    }
}
