//! RO-Crate reading and writing
//!
//! An RO-Crate is a directory (or a zip archive of one) holding data
//! payloads plus a JSON-LD metadata file, `ro-crate-metadata.json`, that
//! describes them as a graph of entities.
//!
//! # Overview
//!
//! - [`RoCrate`] is the in-memory crate: an [`EntityGraph`] whose data
//!   entities may own a [`Payload`].
//! - [`RoCrateBuilder`], [`DataEntityBuilder`] and
//!   [`ContextualEntityBuilder`] assemble new crates.
//! - [`CrateWriter`] and [`CrateReader`] move crates to and from storage.
//!   Both are parameterized by a [`Storage`] strategy, either
//!   [`FolderStorage`] or [`ZipStorage`].
//!
//! # Usage
//!
//! ```ignore
//! use rocrate_io::{CrateReader, CrateWriter, DataEntityBuilder, FolderStorage, ZipStorage};
//!
//! let mut crate_ = CrateReader::new(ZipStorage::default()).read_crate("in.zip")?;
//! crate_.add_data_entity(
//!     DataEntityBuilder::file().source("results.csv").build()?,
//!     true,
//! )?;
//!
//! let report = CrateWriter::new(FolderStorage).save(&crate_, "out/")?;
//! assert!(report.is_complete());
//! ```

pub mod backend;
pub mod entity;
pub mod error;
pub mod graph;
pub mod id;
pub mod jsonld;
pub mod reader;
pub mod rocrate;
pub mod vocab;
pub mod writer;

pub use crate::backend::{FolderStorage, Storage, StorageReader, StorageWriter, TreeCopy, ZipStorage};
pub use crate::entity::{ContextualEntityBuilder, DataEntityBuilder, Entity, EntityKind, Payload};
pub use crate::error::{CrateError, PayloadWarning};
pub use crate::graph::EntityGraph;
pub use crate::reader::CrateReader;
pub use crate::rocrate::{RoCrate, RoCrateBuilder};
pub use crate::writer::{CrateWriter, SaveOptions, SaveReport};
