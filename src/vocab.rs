//! Vocabulary definitions for RO-Crate metadata
//!
//! Well-known identifiers, types and property names used by the
//! metadata document and the entity graph.

/// Context of RO-Crate 1.1 documents
pub const ROCRATE_CONTEXT: &str = "https://w3id.org/ro/crate/1.1/context";

/// Profile the metadata descriptor conforms to
pub const ROCRATE_PROFILE: &str = "https://w3id.org/ro/crate/1.1";

/// Standard metadata descriptor filename, also its @id
pub const METADATA_DESCRIPTOR_ID: &str = "ro-crate-metadata.json";

/// Root entity ID
pub const ROOT_ENTITY_ID: &str = "./";

pub const CONTEXT_KEY: &str = "@context";
pub const GRAPH_KEY: &str = "@graph";
pub const ID_KEY: &str = "@id";
pub const TYPE_KEY: &str = "@type";

pub const FILE_TYPE: &str = "File";
/// schema.org name that `File` is mapped to by the RO-Crate context
pub const MEDIA_OBJECT_TYPE: &str = "MediaObject";
pub const DATASET_TYPE: &str = "Dataset";
pub const PERSON_TYPE: &str = "Person";
pub const PLACE_TYPE: &str = "Place";
pub const ORGANIZATION_TYPE: &str = "Organization";
pub const CREATIVE_WORK_TYPE: &str = "CreativeWork";

/// Root property listing the crate's data entities
pub const HAS_PART: &str = "hasPart";
pub const ABOUT: &str = "about";
pub const CONFORMS_TO: &str = "conformsTo";
pub const NAME: &str = "name";
pub const DESCRIPTION: &str = "description";
pub const ENCODING_FORMAT: &str = "encodingFormat";
pub const CONTENT_LOCATION: &str = "contentLocation";
pub const AUTHOR: &str = "author";

/// The `@context` written into freshly built crates
pub fn default_context() -> serde_json::Value {
    serde_json::Value::String(ROCRATE_CONTEXT.to_string())
}

/// A `{"@id": ...}` reference object
pub fn id_ref(id: &str) -> serde_json::Value {
    serde_json::json!({ ID_KEY: id })
}
