//! The crate aggregate and its builder

use std::io::Read;

use serde_json::{json, Value};

use crate::entity::{Entity, EntityKind};
use crate::error::CrateError;
use crate::graph::EntityGraph;
use crate::jsonld;
use crate::vocab::{
    default_context, id_ref, ABOUT, CONFORMS_TO, CREATIVE_WORK_TYPE, DESCRIPTION,
    METADATA_DESCRIPTOR_ID, NAME, ROCRATE_PROFILE, ROOT_ENTITY_ID,
};

/// An RO-Crate: one entity graph plus the payloads its data entities own
///
/// Mutation is not synchronized; share a crate across threads only behind
/// a lock.
#[derive(Debug, Clone, PartialEq)]
pub struct RoCrate {
    graph: EntityGraph,
}

impl RoCrate {
    pub fn from_graph(graph: EntityGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut EntityGraph {
        &mut self.graph
    }

    pub fn into_graph(self) -> EntityGraph {
        self.graph
    }

    pub fn root(&self) -> &Entity {
        self.graph.root()
    }

    pub fn descriptor(&self) -> &Entity {
        self.graph.descriptor()
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.graph.entities()
    }

    pub fn data_entities(&self) -> impl Iterator<Item = &Entity> {
        self.graph.data_entities()
    }

    pub fn get_entity_by_id(&self, id: &str) -> Option<&Entity> {
        self.graph.get_entity_by_id(id)
    }

    /// Add a File, Dataset or other data entity and list it in the root's
    /// `hasPart`
    pub fn add_data_entity(&mut self, entity: Entity, overwrite: bool) -> Result<(), CrateError> {
        if !entity.is_data_entity() {
            return Err(CrateError::InvalidEntity(format!(
                "'{}' is not a data entity",
                entity.id()
            )));
        }
        self.graph.add_entity(entity, overwrite)
    }

    pub fn add_contextual_entity(
        &mut self,
        entity: Entity,
        overwrite: bool,
    ) -> Result<(), CrateError> {
        if entity.is_data_entity() {
            return Err(CrateError::InvalidEntity(format!(
                "'{}' is a data entity",
                entity.id()
            )));
        }
        self.graph.add_entity(entity, overwrite)
    }

    pub fn delete_entity_by_id(&mut self, id: &str) -> Result<Entity, CrateError> {
        self.graph.delete_entity_by_id(id)
    }

    /// The metadata document as pretty-printed JSON
    pub fn json_metadata(&self) -> Result<String, CrateError> {
        self.json_metadata_with(true)
    }

    pub fn json_metadata_with(&self, pretty: bool) -> Result<String, CrateError> {
        jsonld::to_json_string(&self.graph, pretty)
    }

    /// The metadata document as a JSON value
    pub fn to_jsonld(&self) -> Value {
        jsonld::encode(&self.graph)
    }

    /// Read the bytes of a File entity's payload
    pub fn open_payload(&self, id: &str) -> Result<Box<dyn Read + Send>, CrateError> {
        self.graph
            .get_entity_by_id(id)
            .ok_or_else(|| CrateError::NotFound(id.to_string()))?
            .open_payload()
    }
}

/// Builds a new crate around a named root data entity
///
/// ```ignore
/// let crate_ = RoCrateBuilder::new("minimal", "minimal RO_crate")
///     .add_data_entity(DataEntityBuilder::file().id("data.csv").build()?)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct RoCrateBuilder {
    name: String,
    description: String,
    context: Value,
    entities: Vec<Entity>,
}

impl RoCrateBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            context: default_context(),
            entities: Vec::new(),
        }
    }

    /// Use a different `@context` than the RO-Crate 1.1 one
    pub fn context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn add_data_entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn add_contextual_entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }

    /// Fails on duplicate ids, in the order entities were added
    pub fn build(self) -> Result<RoCrate, CrateError> {
        let mut descriptor = Entity::new(EntityKind::Contextual, METADATA_DESCRIPTOR_ID)?;
        descriptor.add_type(CREATIVE_WORK_TYPE);
        descriptor.set_property(ABOUT, id_ref(ROOT_ENTITY_ID))?;
        descriptor.set_property(CONFORMS_TO, json!({ "@id": ROCRATE_PROFILE }))?;

        let mut root = Entity::new(EntityKind::Dataset, ROOT_ENTITY_ID)?;
        root.set_property(NAME, self.name)?;
        root.set_property(DESCRIPTION, self.description)?;

        let mut graph = EntityGraph::new(self.context, descriptor, root);
        for entity in self.entities {
            graph.add_entity(entity, false)?;
        }
        Ok(RoCrate::from_graph(graph))
    }
}
