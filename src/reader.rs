//! Reading crates from a storage backend

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::{Storage, StorageReader};
use crate::entity::{Payload, StoredPayload};
use crate::error::CrateError;
use crate::graph::EntityGraph;
use crate::id::entry_path;
use crate::jsonld;
use crate::rocrate::RoCrate;
use crate::vocab::METADATA_DESCRIPTOR_ID;

/// Reads crates through the storage strategy it was built with
///
/// Payload bytes stay in the source; data entities whose @id names an
/// entry (or a directory of entries) are bound to it and fetched only when
/// opened or written elsewhere.
#[derive(Debug, Clone)]
pub struct CrateReader<S: Storage> {
    storage: S,
}

impl<S: Storage> CrateReader<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn read_crate(&self, source: impl AsRef<Path>) -> Result<RoCrate, CrateError> {
        let reader = self.storage.open(source.as_ref())?;
        let entries = reader.list_entries()?;

        if !entries.iter().any(|e| e == METADATA_DESCRIPTOR_ID) {
            return Err(CrateError::MissingMetadata(reader.location()));
        }

        let mut content = String::new();
        reader
            .open_entry(METADATA_DESCRIPTOR_ID)?
            .read_to_string(&mut content)?;
        let mut graph = jsonld::parse_document(&content)?;

        let bound = bind_payloads(&mut graph, &reader, &entries)?;
        info!(
            source = %reader.location(),
            entities = graph.len(),
            payloads = bound,
            "read crate"
        );
        Ok(RoCrate::from_graph(graph))
    }
}

/// Point data entities at the entries their ids name. Returns how many
/// were bound.
fn bind_payloads(
    graph: &mut EntityGraph,
    reader: &Arc<dyn StorageReader>,
    entries: &[String],
) -> Result<usize, CrateError> {
    let files: HashSet<&str> = entries.iter().map(String::as_str).collect();
    let ids: Vec<String> = graph
        .data_entities()
        .map(|e| e.id().to_string())
        .collect();

    let mut bound = 0;
    for id in ids {
        let Some(entry) = entry_path(&id) else {
            continue;
        };
        if entry == METADATA_DESCRIPTOR_ID {
            continue;
        }

        let dir_prefix = format!("{}/", entry);
        let payload = if files.contains(entry.as_str()) {
            StoredPayload::file(Arc::clone(reader), entry)
        } else if entries.iter().any(|e| e.starts_with(&dir_prefix)) {
            StoredPayload::directory(Arc::clone(reader), entry)
        } else {
            debug!(id = %id, "no entry for data entity");
            continue;
        };

        if let Some(entity) = graph.get_entity_mut(&id) {
            entity.set_payload(Payload::Stored(payload))?;
            bound += 1;
        }
    }
    Ok(bound)
}
