//! JSON-LD encoding of the entity graph
//!
//! The metadata document is `{"@context": ..., "@graph": [...]}` with the
//! descriptor first, the root second and every other entity in graph
//! order, so equal graphs always serialize to the same bytes.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::entity::{Entity, EntityKind};
use crate::error::CrateError;
use crate::graph::EntityGraph;
use crate::id::get_referenced_ids;
use crate::vocab::{
    default_context, ABOUT, CONTEXT_KEY, GRAPH_KEY, HAS_PART, ID_KEY, METADATA_DESCRIPTOR_ID,
    TYPE_KEY,
};

/// Encode a graph as a JSON-LD document
pub fn encode(graph: &EntityGraph) -> Value {
    let nodes: Vec<Value> = graph.entities().map(encode_entity).collect();

    let mut document = Map::new();
    document.insert(CONTEXT_KEY.to_string(), graph.context().clone());
    document.insert(GRAPH_KEY.to_string(), Value::Array(nodes));
    Value::Object(document)
}

/// A single node: `@id`, `@type`, then the properties in order
pub fn encode_entity(entity: &Entity) -> Value {
    let mut node = Map::new();
    node.insert(ID_KEY.to_string(), Value::String(entity.id().to_string()));

    match entity.types() {
        [] => {}
        [single] => {
            node.insert(TYPE_KEY.to_string(), Value::String(single.clone()));
        }
        many => {
            node.insert(
                TYPE_KEY.to_string(),
                Value::Array(many.iter().cloned().map(Value::String).collect()),
            );
        }
    }

    for (key, value) in entity.properties() {
        node.insert(key.clone(), value.clone());
    }
    Value::Object(node)
}

/// Serialize a graph to metadata file text
pub fn to_json_string(graph: &EntityGraph, pretty: bool) -> Result<String, CrateError> {
    let document = encode(graph);
    let output = if pretty {
        serde_json::to_string_pretty(&document)?
    } else {
        serde_json::to_string(&document)?
    };
    Ok(output)
}

/// Parse metadata file text into a graph
pub fn parse_document(content: &str) -> Result<EntityGraph, CrateError> {
    let document: Value = serde_json::from_str(content)?;
    decode(&document)
}

/// Decode a JSON-LD document into a graph
///
/// The descriptor is the node with id `ro-crate-metadata.json`; the root is
/// whatever its `about` references. Nodes whose types are not recognised
/// are kept as generic entities with all their properties.
pub fn decode(document: &Value) -> Result<EntityGraph, CrateError> {
    let nodes = document
        .get(GRAPH_KEY)
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("document has no @graph array"))?;
    let context = document
        .get(CONTEXT_KEY)
        .cloned()
        .unwrap_or_else(default_context);

    let mut parsed = Vec::with_capacity(nodes.len());
    for node in nodes {
        parsed.push(split_node(node)?);
    }

    let descriptor_pos = parsed
        .iter()
        .position(|(id, _, _)| id == METADATA_DESCRIPTOR_ID)
        .ok_or_else(|| malformed("no metadata descriptor node in @graph"))?;
    let root_id = parsed[descriptor_pos]
        .2
        .get(ABOUT)
        .and_then(|about| about.get(ID_KEY))
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| malformed("metadata descriptor has no about reference"))?;
    let root_pos = parsed
        .iter()
        .position(|(id, _, _)| *id == root_id)
        .ok_or_else(|| malformed(&format!("root data entity '{}' not in @graph", root_id)))?;

    let root_parts: HashSet<String> = parsed[root_pos]
        .2
        .get(HAS_PART)
        .map(get_referenced_ids)
        .unwrap_or_default();

    let mut descriptor = None;
    let mut root = None;
    let mut members = Vec::new();
    for (pos, (id, types, properties)) in parsed.into_iter().enumerate() {
        if pos == descriptor_pos {
            descriptor = Some(Entity::from_parts(id, EntityKind::Contextual, types, properties));
        } else if pos == root_pos {
            root = Some(Entity::from_parts(id, EntityKind::Dataset, types, properties));
        } else {
            let kind = dispatch_kind(&id, &types, &root_parts);
            members.push(Entity::from_parts(id, kind, types, properties));
        }
    }

    // about pointing back at the descriptor leaves no root
    let (Some(descriptor), Some(root)) = (descriptor, root) else {
        return Err(malformed("metadata descriptor is about itself"));
    };

    let mut graph = EntityGraph::new(context, descriptor, root);
    for entity in members {
        graph.insert_decoded(entity)?;
    }
    Ok(graph)
}

/// Pick the variant for a node from its types, falling back to a generic
/// data entity for ids the root lists as parts and a generic contextual
/// entity otherwise
fn dispatch_kind(id: &str, types: &[String], root_parts: &HashSet<String>) -> EntityKind {
    match EntityKind::from_types(types) {
        Some(kind) => kind,
        None if root_parts.contains(id) => EntityKind::Data,
        None => EntityKind::Contextual,
    }
}

type NodeParts = (String, Vec<String>, Map<String, Value>);

fn split_node(node: &Value) -> Result<NodeParts, CrateError> {
    let obj = node
        .as_object()
        .ok_or_else(|| malformed("@graph contains a non-object node"))?;

    let id = match obj.get(ID_KEY) {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        _ => return Err(malformed("@graph node without a string @id")),
    };

    let types = match obj.get(TYPE_KEY) {
        None => Vec::new(),
        Some(Value::String(t)) => vec![t.clone()],
        Some(Value::Array(arr)) => arr
            .iter()
            .map(|t| {
                t.as_str()
                    .map(String::from)
                    .ok_or_else(|| malformed(&format!("non-string @type on '{}'", id)))
            })
            .collect::<Result<_, _>>()?,
        Some(_) => return Err(malformed(&format!("invalid @type on '{}'", id))),
    };

    let properties: Map<String, Value> = obj
        .iter()
        .filter(|(k, _)| *k != ID_KEY && *k != TYPE_KEY)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok((id, types, properties))
}

fn malformed(reason: &str) -> CrateError {
    CrateError::MalformedMetadata(reason.to_string())
}
