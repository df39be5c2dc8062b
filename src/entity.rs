//! Entities of the crate's linked-data graph
//!
//! Every entity is a shared core (id, types, ordered property bag) tagged
//! with an [`EntityKind`]. Data entities may additionally own a
//! [`Payload`]; contextual entities are pure metadata.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use url::Url;

use crate::backend::StorageReader;
use crate::error::CrateError;
use crate::vocab::{
    id_ref, AUTHOR, CONTENT_LOCATION, DATASET_TYPE, ENCODING_FORMAT, FILE_TYPE, ID_KEY,
    MEDIA_OBJECT_TYPE, ORGANIZATION_TYPE, PERSON_TYPE, PLACE_TYPE, TYPE_KEY,
};

/// The variant an entity is decoded into or built as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    File,
    Dataset,
    /// Data entity of some other type
    Data,
    Person,
    Place,
    Organization,
    /// Contextual entity of some other type
    Contextual,
}

impl EntityKind {
    /// Kinds that may carry a payload and are listed in the root's `hasPart`
    pub fn is_data(self) -> bool {
        matches!(self, EntityKind::File | EntityKind::Dataset | EntityKind::Data)
    }

    /// The kind a list of `@type` values names, if it is a known one
    pub fn from_types(types: &[String]) -> Option<Self> {
        let has = |name: &str| types.iter().any(|t| t == name);
        if has(FILE_TYPE) || has(MEDIA_OBJECT_TYPE) {
            Some(EntityKind::File)
        } else if has(DATASET_TYPE) {
            Some(EntityKind::Dataset)
        } else if has(PERSON_TYPE) {
            Some(EntityKind::Person)
        } else if has(PLACE_TYPE) {
            Some(EntityKind::Place)
        } else if has(ORGANIZATION_TYPE) {
            Some(EntityKind::Organization)
        } else {
            None
        }
    }

    fn default_type(self) -> Option<&'static str> {
        match self {
            EntityKind::File => Some(FILE_TYPE),
            EntityKind::Dataset => Some(DATASET_TYPE),
            EntityKind::Person => Some(PERSON_TYPE),
            EntityKind::Place => Some(PLACE_TYPE),
            EntityKind::Organization => Some(ORGANIZATION_TYPE),
            EntityKind::Data | EntityKind::Contextual => None,
        }
    }
}

/// Where a data entity's bytes come from
#[derive(Debug, Clone)]
pub enum Payload {
    /// A file on the local filesystem
    LocalFile(PathBuf),
    /// A local directory whose contents belong to the crate
    LocalDirectory(PathBuf),
    /// A web resource; never copied into the crate
    Remote(Url),
    /// An entry (or directory of entries) of a crate that was read
    Stored(StoredPayload),
}

impl Payload {
    /// Whether the payload contributes entries when the crate is written
    pub fn is_local(&self) -> bool {
        !matches!(self, Payload::Remote(_))
    }
}

/// Lazy reference into the storage a crate was read from
///
/// Bytes are only fetched when the payload is opened.
#[derive(Clone)]
pub struct StoredPayload {
    storage: Arc<dyn StorageReader>,
    entry: String,
    directory: bool,
}

impl StoredPayload {
    pub(crate) fn file(storage: Arc<dyn StorageReader>, entry: String) -> Self {
        Self {
            storage,
            entry,
            directory: false,
        }
    }

    pub(crate) fn directory(storage: Arc<dyn StorageReader>, entry: String) -> Self {
        Self {
            storage,
            entry,
            directory: true,
        }
    }

    /// Entry path inside the source storage
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn is_directory(&self) -> bool {
        self.directory
    }

    pub fn storage(&self) -> &Arc<dyn StorageReader> {
        &self.storage
    }

    /// Open a file payload
    pub fn open(&self) -> Result<Box<dyn Read + Send>, CrateError> {
        self.storage.open_entry(&self.entry)
    }

    /// File entries of a directory payload
    pub fn files(&self) -> Result<Vec<String>, CrateError> {
        self.storage.entries_under(&self.entry)
    }
}

impl fmt::Debug for StoredPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredPayload")
            .field("storage", &self.storage.location())
            .field("entry", &self.entry)
            .field("directory", &self.directory)
            .finish()
    }
}

/// A node of the crate's graph
///
/// Equality compares id, kind, types and properties. Payload bindings are
/// not part of the graph and are ignored.
#[derive(Debug, Clone)]
pub struct Entity {
    id: String,
    kind: EntityKind,
    types: Vec<String>,
    properties: Map<String, Value>,
    payload: Option<Payload>,
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.kind == other.kind
            && self.types == other.types
            && self.properties == other.properties
    }
}

impl Entity {
    /// An entity with no properties; `@type` defaults to the kind's type
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Result<Self, CrateError> {
        let id = id.into();
        if id.is_empty() {
            return Err(CrateError::InvalidEntity("@id must not be empty".to_string()));
        }
        Ok(Self {
            id,
            kind,
            types: kind.default_type().map(String::from).into_iter().collect(),
            properties: Map::new(),
            payload: None,
        })
    }

    /// Assemble a decoded node; the caller has already validated the id
    pub(crate) fn from_parts(
        id: String,
        kind: EntityKind,
        types: Vec<String>,
        properties: Map<String, Value>,
    ) -> Self {
        Self {
            id,
            kind,
            types,
            properties,
            payload: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn is_data_entity(&self) -> bool {
        self.kind.is_data()
    }

    pub fn types(&self) -> &[String] {
        &self.types
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.types.iter().any(|t| t == name)
    }

    pub fn add_type(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.has_type(&name) {
            self.types.push(name);
        }
    }

    /// All properties except `@id` and `@type`, in insertion order
    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub(crate) fn properties_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Set a property, replacing any previous value. `@id` and `@type` are
    /// not properties and are rejected.
    pub fn set_property(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), CrateError> {
        let name = name.into();
        if name == ID_KEY || name == TYPE_KEY {
            return Err(CrateError::InvalidEntity(format!(
                "{} cannot be set as a property",
                name
            )));
        }
        self.properties.insert(name, value.into());
        Ok(())
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Value> {
        self.properties.shift_remove(name)
    }

    /// Add a `{"@id": id}` reference under `name`
    ///
    /// An existing reference or list of references is extended, the same
    /// id is never listed twice.
    pub fn add_id_property(&mut self, name: impl Into<String>, id: &str) {
        append_reference(&mut self.properties, name.into(), id);
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Attach a payload; only data entities can own one
    pub fn set_payload(&mut self, payload: Payload) -> Result<(), CrateError> {
        if !self.kind.is_data() {
            return Err(CrateError::InvalidEntity(format!(
                "contextual entity '{}' cannot have a payload",
                self.id
            )));
        }
        self.payload = Some(payload);
        Ok(())
    }

    pub fn clear_payload(&mut self) -> Option<Payload> {
        self.payload.take()
    }

    /// Open the bytes of a file payload
    pub fn open_payload(&self) -> Result<Box<dyn Read + Send>, CrateError> {
        match &self.payload {
            Some(Payload::LocalFile(path)) => Ok(Box::new(File::open(path)?)),
            Some(Payload::Stored(stored)) if !stored.is_directory() => stored.open(),
            Some(_) => Err(CrateError::InvalidEntity(format!(
                "payload of '{}' is not a readable file",
                self.id
            ))),
            None => Err(CrateError::EntryNotFound(self.id.clone())),
        }
    }
}

/// Append an id reference to a property, promoting a single value to a list
pub(crate) fn append_reference(properties: &mut Map<String, Value>, name: String, id: &str) {
    let reference = id_ref(id);
    match properties.get_mut(&name) {
        Some(Value::Array(items)) => {
            if !items.contains(&reference) {
                items.push(reference);
            }
        }
        Some(existing) => {
            if *existing != reference {
                let previous = existing.take();
                *existing = Value::Array(vec![previous, reference]);
            }
        }
        None => {
            properties.insert(name, reference);
        }
    }
}

/// Shared state of the entity builders
#[derive(Debug, Clone)]
struct Draft {
    kind: EntityKind,
    id: Option<String>,
    types: Vec<String>,
    properties: Map<String, Value>,
}

impl Draft {
    fn new(kind: EntityKind, types: Vec<String>) -> Self {
        let types = if types.is_empty() {
            kind.default_type().map(String::from).into_iter().collect()
        } else {
            types
        };
        Self {
            kind,
            id: None,
            types,
            properties: Map::new(),
        }
    }

    fn add_type(&mut self, name: String) {
        if !self.types.contains(&name) {
            self.types.push(name);
        }
    }

    fn into_entity(self, id: String) -> Result<Entity, CrateError> {
        let mut entity = Entity::new(self.kind, id)?;
        entity.types = self.types;
        for (name, value) in self.properties {
            entity.set_property(name, value)?;
        }
        Ok(entity)
    }
}

/// Builds File, Dataset and other data entities
///
/// ```ignore
/// let file = DataEntityBuilder::file()
///     .id("survey-responses-2019.csv")
///     .add_property("name", "Survey responses")
///     .encoding_format("text/csv")
///     .source("/data/survey.csv")
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct DataEntityBuilder {
    draft: Draft,
    source: Option<PathBuf>,
    remote: Option<String>,
}

impl DataEntityBuilder {
    pub fn file() -> Self {
        Self::with_kind(EntityKind::File, Vec::new())
    }

    pub fn dataset() -> Self {
        Self::with_kind(EntityKind::Dataset, Vec::new())
    }

    /// A data entity with caller-chosen types
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let types: Vec<String> = types.into_iter().map(Into::into).collect();
        let kind = EntityKind::from_types(&types)
            .filter(|k| k.is_data())
            .unwrap_or(EntityKind::Data);
        Self::with_kind(kind, types)
    }

    fn with_kind(kind: EntityKind, types: Vec<String>) -> Self {
        Self {
            draft: Draft::new(kind, types),
            source: None,
            remote: None,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.draft.id = Some(id.into());
        self
    }

    pub fn add_type(mut self, name: impl Into<String>) -> Self {
        self.draft.add_type(name.into());
        self
    }

    pub fn add_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.draft.properties.insert(name.into(), value.into());
        self
    }

    pub fn add_id_property(mut self, name: impl Into<String>, id: &str) -> Self {
        append_reference(&mut self.draft.properties, name.into(), id);
        self
    }

    pub fn encoding_format(self, format: impl Into<String>) -> Self {
        self.add_property(ENCODING_FORMAT, format.into())
    }

    pub fn content_location(self, id: &str) -> Self {
        self.add_id_property(CONTENT_LOCATION, id)
    }

    pub fn author(self, id: &str) -> Self {
        self.add_id_property(AUTHOR, id)
    }

    /// Local file or directory whose bytes become the payload
    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// Web location of the payload; the entity stays metadata-only
    pub fn remote(mut self, url: impl Into<String>) -> Self {
        self.remote = Some(url.into());
        self
    }

    /// Without an explicit id, a File takes its source's file name, a
    /// Dataset `<dir name>/` and a remote payload its URL.
    pub fn build(self) -> Result<Entity, CrateError> {
        let payload = match (self.source, self.remote) {
            (Some(_), Some(_)) => {
                return Err(CrateError::InvalidEntity(
                    "a data entity has either a local source or a remote location".to_string(),
                ))
            }
            (Some(path), None) => Some(local_payload(self.draft.kind, path)),
            (None, Some(url)) => Some(Payload::Remote(Url::parse(&url).map_err(|e| {
                CrateError::InvalidEntity(format!("invalid remote location '{}': {}", url, e))
            })?)),
            (None, None) => None,
        };

        let id = match self.draft.id.clone() {
            Some(id) => id,
            None => payload
                .as_ref()
                .and_then(derive_id)
                .ok_or_else(|| CrateError::InvalidEntity("data entity has no @id".to_string()))?,
        };

        let mut entity = self.draft.into_entity(id)?;
        if let Some(payload) = payload {
            entity.set_payload(payload)?;
        }
        Ok(entity)
    }
}

fn local_payload(kind: EntityKind, path: PathBuf) -> Payload {
    match kind {
        EntityKind::Dataset => Payload::LocalDirectory(path),
        EntityKind::Data if path.is_dir() => Payload::LocalDirectory(path),
        _ => Payload::LocalFile(path),
    }
}

fn derive_id(payload: &Payload) -> Option<String> {
    let name = |path: &Path| path.file_name().and_then(|n| n.to_str()).map(String::from);
    match payload {
        Payload::LocalFile(path) => name(path),
        Payload::LocalDirectory(path) => name(path).map(|n| format!("{}/", n)),
        Payload::Remote(url) => Some(url.to_string()),
        Payload::Stored(_) => None,
    }
}

/// Builds Person, Place, Organization and other contextual entities
#[derive(Debug, Clone)]
pub struct ContextualEntityBuilder {
    draft: Draft,
}

impl ContextualEntityBuilder {
    pub fn person() -> Self {
        Self {
            draft: Draft::new(EntityKind::Person, Vec::new()),
        }
    }

    pub fn place() -> Self {
        Self {
            draft: Draft::new(EntityKind::Place, Vec::new()),
        }
    }

    pub fn organization() -> Self {
        Self {
            draft: Draft::new(EntityKind::Organization, Vec::new()),
        }
    }

    /// A contextual entity with caller-chosen types
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let types: Vec<String> = types.into_iter().map(Into::into).collect();
        let kind = EntityKind::from_types(&types)
            .filter(|k| !k.is_data())
            .unwrap_or(EntityKind::Contextual);
        Self {
            draft: Draft::new(kind, types),
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.draft.id = Some(id.into());
        self
    }

    pub fn add_type(mut self, name: impl Into<String>) -> Self {
        self.draft.add_type(name.into());
        self
    }

    pub fn add_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.draft.properties.insert(name.into(), value.into());
        self
    }

    pub fn add_id_property(mut self, name: impl Into<String>, id: &str) -> Self {
        append_reference(&mut self.draft.properties, name.into(), id);
        self
    }

    pub fn build(self) -> Result<Entity, CrateError> {
        let id = self
            .draft
            .id
            .clone()
            .ok_or_else(|| CrateError::InvalidEntity("contextual entity has no @id".to_string()))?;
        self.draft.into_entity(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_from_types() {
        let types = |t: &[&str]| t.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(EntityKind::from_types(&types(&["File"])), Some(EntityKind::File));
        assert_eq!(
            EntityKind::from_types(&types(&["MediaObject", "SoftwareSourceCode"])),
            Some(EntityKind::File)
        );
        assert_eq!(
            EntityKind::from_types(&types(&["Dataset"])),
            Some(EntityKind::Dataset)
        );
        assert_eq!(
            EntityKind::from_types(&types(&["Person"])),
            Some(EntityKind::Person)
        );
        assert_eq!(EntityKind::from_types(&types(&["Instrument"])), None);
    }

    #[test]
    fn test_file_builder() {
        let file = DataEntityBuilder::file()
            .id("survey-responses-2019.csv")
            .add_property("name", "Survey responses")
            .add_property("contentSize", "26452")
            .encoding_format("text/csv")
            .build()
            .unwrap();

        assert_eq!(file.id(), "survey-responses-2019.csv");
        assert_eq!(file.kind(), EntityKind::File);
        assert_eq!(file.types(), ["File".to_string()]);
        assert_eq!(
            Value::Object(file.properties().clone()),
            json!({
                "name": "Survey responses",
                "contentSize": "26452",
                "encodingFormat": "text/csv"
            })
        );
        assert!(file.payload().is_none());
    }

    #[test]
    fn test_id_derived_from_source() {
        let file = DataEntityBuilder::file()
            .source("/tmp/somewhere/data.csv")
            .build()
            .unwrap();
        assert_eq!(file.id(), "data.csv");
        assert!(matches!(file.payload(), Some(Payload::LocalFile(_))));

        let dataset = DataEntityBuilder::dataset()
            .source("/tmp/somewhere/images")
            .build()
            .unwrap();
        assert_eq!(dataset.id(), "images/");
        assert!(matches!(dataset.payload(), Some(Payload::LocalDirectory(_))));

        assert!(matches!(
            DataEntityBuilder::file().build(),
            Err(CrateError::InvalidEntity(_))
        ));
    }

    #[test]
    fn test_one_payload_kind() {
        let result = DataEntityBuilder::file()
            .id("x.csv")
            .source("/tmp/x.csv")
            .remote("https://example.org/x.csv")
            .build();
        assert!(matches!(result, Err(CrateError::InvalidEntity(_))));

        let remote = DataEntityBuilder::file()
            .remote("https://example.org/x.csv")
            .build()
            .unwrap();
        assert_eq!(remote.id(), "https://example.org/x.csv");
        assert!(!remote.payload().unwrap().is_local());

        assert!(DataEntityBuilder::file()
            .remote("not a url")
            .build()
            .is_err());
    }

    #[test]
    fn test_id_references_accumulate() {
        let file = DataEntityBuilder::file()
            .id("data1.txt")
            .author("#alice")
            .author("#alice")
            .content_location("http://sws.geonames.org/8152662/")
            .build()
            .unwrap();
        assert_eq!(file.property("author"), Some(&json!({"@id": "#alice"})));

        let mut file = file;
        file.add_id_property("author", "#bob");
        assert_eq!(
            file.property("author"),
            Some(&json!([{"@id": "#alice"}, {"@id": "#bob"}]))
        );
    }

    #[test]
    fn test_contextual_cannot_own_payload() {
        let mut person = ContextualEntityBuilder::person()
            .id("#alice")
            .add_property("name", "Alice")
            .build()
            .unwrap();
        assert_eq!(person.kind(), EntityKind::Person);
        assert!(person
            .set_payload(Payload::LocalFile(PathBuf::from("/tmp/a")))
            .is_err());

        assert!(ContextualEntityBuilder::place().build().is_err());
    }

    #[test]
    fn test_generic_builders() {
        let instrument = ContextualEntityBuilder::new(["Instrument"])
            .id("#microscope")
            .build()
            .unwrap();
        assert_eq!(instrument.kind(), EntityKind::Contextual);
        assert_eq!(instrument.types(), ["Instrument".to_string()]);

        let code = DataEntityBuilder::new(["File", "SoftwareSourceCode"])
            .id("main.py")
            .build()
            .unwrap();
        assert_eq!(code.kind(), EntityKind::File);

        let workflow = DataEntityBuilder::new(["ComputationalWorkflow"])
            .id("workflow.cwl")
            .build()
            .unwrap();
        assert_eq!(workflow.kind(), EntityKind::Data);
    }

    #[test]
    fn test_reserved_keys_are_not_properties() {
        let mut entity = Entity::new(EntityKind::Contextual, "#x").unwrap();
        assert!(entity.set_property("@id", "#y").is_err());
        assert!(Entity::new(EntityKind::File, "").is_err());

        let built = ContextualEntityBuilder::new(["Thing"])
            .id("#x")
            .add_property("@type", "Other")
            .build();
        assert!(built.is_err());
    }
}
