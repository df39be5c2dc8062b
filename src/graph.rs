//! The entity graph of one crate
//!
//! Holds the metadata descriptor, the root data entity and every other
//! entity in insertion order, keyed by unique @id. The root's `hasPart`
//! list is kept in step with the data entities on every add and delete.
//!
//! A graph has no internal locking. Callers sharing one between threads
//! must serialize mutation themselves (e.g. behind a `Mutex`).

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::entity::{append_reference, Entity};
use crate::error::CrateError;
use crate::id::{references, strip_references};
use crate::vocab::{default_context, HAS_PART};

#[derive(Debug, Clone, PartialEq)]
pub struct EntityGraph {
    context: Value,
    descriptor: Entity,
    root: Entity,
    entities: Vec<Entity>,
    index: HashMap<String, usize>,
}

impl EntityGraph {
    /// A graph holding only the two distinguished entities
    pub(crate) fn new(context: Value, descriptor: Entity, root: Entity) -> Self {
        Self {
            context,
            descriptor,
            root,
            entities: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn context(&self) -> &Value {
        &self.context
    }

    pub fn set_context(&mut self, context: Value) {
        self.context = if context.is_null() {
            default_context()
        } else {
            context
        };
    }

    pub fn descriptor(&self) -> &Entity {
        &self.descriptor
    }

    pub fn root(&self) -> &Entity {
        &self.root
    }

    /// Mutable access to the root, e.g. to edit its name. Its `hasPart`
    /// is managed by the graph and rewritten on the next add or delete.
    pub fn root_mut(&mut self) -> &mut Entity {
        &mut self.root
    }

    /// Number of entities, the two distinguished ones included
    pub fn len(&self) -> usize {
        self.entities.len() + 2
    }

    /// Never true: the descriptor and root are always present
    pub fn is_empty(&self) -> bool {
        false
    }

    fn is_protected(&self, id: &str) -> bool {
        id == self.descriptor.id() || id == self.root.id()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.is_protected(id) || self.index.contains_key(id)
    }

    pub fn get_entity_by_id(&self, id: &str) -> Option<&Entity> {
        if id == self.descriptor.id() {
            Some(&self.descriptor)
        } else if id == self.root.id() {
            Some(&self.root)
        } else {
            self.index.get(id).map(|&i| &self.entities[i])
        }
    }

    /// Mutable access to a non-distinguished entity
    pub fn get_entity_mut(&mut self, id: &str) -> Option<&mut Entity> {
        match self.index.get(id) {
            Some(&i) => self.entities.get_mut(i),
            None => None,
        }
    }

    /// Descriptor, root, then the rest in insertion order
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        [&self.descriptor, &self.root]
            .into_iter()
            .chain(self.members())
    }

    /// Entities other than the descriptor and the root
    pub fn members(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn data_entities(&self) -> impl Iterator<Item = &Entity> {
        self.members().filter(|e| e.is_data_entity())
    }

    /// Add an entity, or replace the one with the same id when `overwrite`
    /// is set. A replaced entity keeps its position in the graph.
    ///
    /// The root and the descriptor always exist: reusing their id fails with
    /// `DuplicateId`, and with `ProtectedEntity` when `overwrite` is set.
    pub fn add_entity(&mut self, entity: Entity, overwrite: bool) -> Result<(), CrateError> {
        let id = entity.id().to_string();
        if self.is_protected(&id) {
            return Err(if overwrite {
                CrateError::ProtectedEntity(id)
            } else {
                CrateError::DuplicateId(id)
            });
        }

        let is_data = entity.is_data_entity();
        match self.index.get(&id).copied() {
            Some(_) if !overwrite => return Err(CrateError::DuplicateId(id)),
            Some(i) => self.entities[i] = entity,
            None => {
                self.index.insert(id.clone(), self.entities.len());
                self.entities.push(entity);
            }
        }

        if is_data {
            self.attach_to_root(&id);
        } else {
            self.detach_from_root(&id);
        }
        Ok(())
    }

    /// Insert a node as decoded, without touching the root's references
    pub(crate) fn insert_decoded(&mut self, entity: Entity) -> Result<(), CrateError> {
        if self.contains(entity.id()) {
            return Err(CrateError::MalformedMetadata(format!(
                "@id '{}' appears more than once in @graph",
                entity.id()
            )));
        }
        self.index
            .insert(entity.id().to_string(), self.entities.len());
        self.entities.push(entity);
        Ok(())
    }

    /// Remove an entity and every `{"@id": id}` reference to it
    pub fn delete_entity_by_id(&mut self, id: &str) -> Result<Entity, CrateError> {
        if self.is_protected(id) {
            return Err(CrateError::ProtectedEntity(id.to_string()));
        }
        let position = self
            .index
            .remove(id)
            .ok_or_else(|| CrateError::NotFound(id.to_string()))?;

        let removed = self.entities.remove(position);
        for (i, entity) in self.entities.iter().enumerate().skip(position) {
            self.index.insert(entity.id().to_string(), i);
        }

        strip_entity_references(self.descriptor.properties_mut(), id);
        strip_entity_references(self.root.properties_mut(), id);
        for entity in &mut self.entities {
            strip_entity_references(entity.properties_mut(), id);
        }

        Ok(removed)
    }

    fn attach_to_root(&mut self, id: &str) {
        append_reference(self.root.properties_mut(), HAS_PART.to_string(), id);
        // keep hasPart a list even with a single member
        if let Some(value) = self.root.properties_mut().get_mut(HAS_PART) {
            if !value.is_array() {
                let single = value.take();
                *value = Value::Array(vec![single]);
            }
        }
    }

    fn detach_from_root(&mut self, id: &str) {
        let properties = self.root.properties_mut();
        let Some(value) = properties.get_mut(HAS_PART) else {
            return;
        };
        match strip_references(value.take(), id) {
            Some(kept) => *value = kept,
            None => {
                properties.shift_remove(HAS_PART);
            }
        }
    }
}

fn strip_entity_references(properties: &mut Map<String, Value>, id: &str) {
    let names: Vec<String> = properties.keys().cloned().collect();
    for name in names {
        let Some(value) = properties.get_mut(&name) else {
            continue;
        };
        if !references(value, id) {
            continue;
        }
        match strip_references(value.take(), id) {
            Some(kept) => *value = kept,
            None => {
                properties.shift_remove(&name);
            }
        }
    }
}
