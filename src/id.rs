//! ID classification and reference handling
//!
//! Maps entity @ids to storage entry paths and finds or strips
//! `{"@id": ...}` references inside property values.

use std::collections::HashSet;
use std::path::{Component, Path};

use serde_json::Value;
use url::Url;

use crate::vocab::{ID_KEY, METADATA_DESCRIPTOR_ID, ROOT_ENTITY_ID};

/// What an entity @id points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    /// The crate itself, "./"
    Root,
    /// A path inside the crate, e.g. "data/a.csv" or "images/"
    Relative,
    /// A local node such as "#alice"
    Fragment,
    /// Anything a URL parser accepts: web resources, "urn:" names
    Absolute,
    /// The metadata file, "ro-crate-metadata.json"
    MetadataDescriptor,
}

/// Sort an @id into one of the [`IdKind`]s
pub fn classify_id(id: &str) -> IdKind {
    if id == ROOT_ENTITY_ID {
        IdKind::Root
    } else if id == METADATA_DESCRIPTOR_ID {
        IdKind::MetadataDescriptor
    } else if id.starts_with('#') {
        IdKind::Fragment
    } else if Url::parse(id).is_ok() {
        IdKind::Absolute
    } else {
        IdKind::Relative
    }
}

/// The storage entry path a data entity's payload lives at
///
/// Only relative ids have one. The id is url-decoded, a leading "./" and
/// trailing "/" are dropped, and ".." segments cannot climb above the
/// crate root.
///
/// "./data/raw%20file.csv" -> "data/raw file.csv"
/// "lots_of_little_files/" -> "lots_of_little_files"
pub fn entry_path(id: &str) -> Option<String> {
    if classify_id(id) != IdKind::Relative {
        return None;
    }
    let trimmed = id.strip_prefix("./").unwrap_or(id);

    let decoded = Url::parse("file:///")
        .and_then(|base| base.join(trimmed))
        .ok()
        .and_then(|url| url.to_file_path().ok());

    let parts: Vec<String> = match decoded {
        Some(path) => path_parts(&path),
        None => trimmed
            .split('/')
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
            .map(String::from)
            .collect(),
    };

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn path_parts(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str().map(String::from),
            _ => None,
        })
        .collect()
}

/// Whether a relative entry path stays below the directory it is joined to
pub fn is_contained(relative: &str) -> bool {
    !relative.starts_with('/')
        && relative
            .split('/')
            .all(|segment| segment != ".." && segment != ".")
}

/// Join storage entry path segments with '/'
pub fn join_entry(prefix: &str, rest: &str) -> String {
    match (prefix.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{}/{}", prefix.trim_end_matches('/'), rest),
    }
}

/// Check whether a value is exactly a `{"@id": target}` reference
pub fn is_reference_to(value: &Value, target: &str) -> bool {
    match value.as_object() {
        Some(obj) => obj.len() == 1 && obj.get(ID_KEY).and_then(Value::as_str) == Some(target),
        None => false,
    }
}

/// Check whether a value references `target` anywhere inside it
pub fn references(value: &Value, target: &str) -> bool {
    match value {
        Value::Object(obj) => {
            is_reference_to(value, target) || obj.values().any(|v| references(v, target))
        }
        Value::Array(arr) => arr.iter().any(|v| references(v, target)),
        _ => false,
    }
}

/// Remove every `{"@id": target}` reference from a property value
///
/// Array elements that are references are dropped. Returns `None` when the
/// whole value was a reference, or an array emptied by the removal, and the
/// property should go.
pub fn strip_references(value: Value, target: &str) -> Option<Value> {
    if is_reference_to(&value, target) {
        return None;
    }
    match value {
        Value::Array(arr) => {
            let before = arr.len();
            let kept: Vec<Value> = arr
                .into_iter()
                .filter_map(|v| strip_references(v, target))
                .collect();
            if kept.is_empty() && before > 0 {
                None
            } else {
                Some(Value::Array(kept))
            }
        }
        Value::Object(obj) => Some(Value::Object(
            obj.into_iter()
                .filter_map(|(k, v)| strip_references(v, target).map(|v| (k, v)))
                .collect(),
        )),
        other => Some(other),
    }
}

/// Get all @id values referenced within a property value
pub fn get_referenced_ids(value: &Value) -> HashSet<String> {
    let mut ids = HashSet::new();
    collect_referenced_ids(value, &mut ids);
    ids
}

fn collect_referenced_ids(value: &Value, ids: &mut HashSet<String>) {
    match value {
        Value::Object(obj) => {
            if let Some(Value::String(id)) = obj.get(ID_KEY) {
                if obj.len() == 1 {
                    ids.insert(id.clone());
                }
            }
            for (key, v) in obj {
                if key != ID_KEY {
                    collect_referenced_ids(v, ids);
                }
            }
        }
        Value::Array(arr) => {
            for item in arr {
                collect_referenced_ids(item, ids);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_contained() {
        assert!(is_contained("a.txt"));
        assert!(is_contained("sub/deeper/b.txt"));
        assert!(!is_contained("../escape.txt"));
        assert!(!is_contained("sub/../../escape.txt"));
        assert!(!is_contained("/etc/passwd"));
    }
    use serde_json::json;

    #[test]
    fn test_classify_id() {
        assert_eq!(classify_id("./"), IdKind::Root);
        assert_eq!(classify_id("./data.csv"), IdKind::Relative);
        assert_eq!(classify_id("lots_of_little_files/"), IdKind::Relative);
        assert_eq!(classify_id("data.csv"), IdKind::Relative);
        assert_eq!(classify_id("#alice"), IdKind::Fragment);
        assert_eq!(classify_id("https://orcid.org/0000-0001"), IdKind::Absolute);
        assert_eq!(
            classify_id("http://sws.geonames.org/8152662/"),
            IdKind::Absolute
        );
        assert_eq!(classify_id("urn:uuid:1234"), IdKind::Absolute);
        assert_eq!(
            classify_id("ro-crate-metadata.json"),
            IdKind::MetadataDescriptor
        );
    }

    #[test]
    fn test_entry_path() {
        assert_eq!(
            entry_path("survey-responses-2019.csv").as_deref(),
            Some("survey-responses-2019.csv")
        );
        assert_eq!(entry_path("./data/raw.csv").as_deref(), Some("data/raw.csv"));
        assert_eq!(
            entry_path("lots_of_little_files/").as_deref(),
            Some("lots_of_little_files")
        );
        assert_eq!(entry_path("#alice"), None);
        assert_eq!(entry_path("./"), None);
        assert_eq!(entry_path("https://example.org/x.csv"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_entry_path_decodes_and_stays_inside() {
        assert_eq!(
            entry_path("my%20data/file%231.txt").as_deref(),
            Some("my data/file#1.txt")
        );
        assert_eq!(entry_path("../../etc/passwd").as_deref(), Some("etc/passwd"));
    }

    #[test]
    fn test_join_entry() {
        assert_eq!(join_entry("", "a.txt"), "a.txt");
        assert_eq!(join_entry("dir", "a.txt"), "dir/a.txt");
        assert_eq!(join_entry("dir/", "sub/a.txt"), "dir/sub/a.txt");
        assert_eq!(join_entry("dir", ""), "dir");
    }

    #[test]
    fn test_references() {
        let value = json!({"author": [{"@id": "#alice"}, {"@id": "#bob"}]});
        assert!(references(&value, "#alice"));
        assert!(!references(&value, "#carol"));
        assert!(!references(&json!("#alice"), "#alice"));
    }

    #[test]
    fn test_strip_references() {
        assert_eq!(strip_references(json!({"@id": "#alice"}), "#alice"), None);

        let arr = json!([{"@id": "a.txt"}, {"@id": "b.txt"}]);
        assert_eq!(
            strip_references(arr, "a.txt"),
            Some(json!([{"@id": "b.txt"}]))
        );

        let arr = json!([{"@id": "a.txt"}, {"@id": "b.txt"}, {"@id": "c.txt"}]);
        assert_eq!(
            strip_references(arr, "b.txt"),
            Some(json!([{"@id": "a.txt"}, {"@id": "c.txt"}]))
        );

        assert_eq!(strip_references(json!([{"@id": "a.txt"}]), "a.txt"), None);
        assert_eq!(strip_references(json!([]), "a.txt"), Some(json!([])));

        // a richer object carrying @id is not a bare reference
        let nested = json!({"@id": "a.txt", "name": "A"});
        assert_eq!(strip_references(nested.clone(), "a.txt"), Some(nested));

        assert_eq!(strip_references(json!("a.txt"), "a.txt"), Some(json!("a.txt")));
    }

    #[test]
    fn test_get_referenced_ids() {
        let value = json!({
            "author": {"@id": "#person1"},
            "hasPart": [
                {"@id": "./file1.txt"},
                {"@id": "./file2.txt"}
            ]
        });

        let refs = get_referenced_ids(&value);
        assert!(refs.contains("#person1"));
        assert!(refs.contains("./file1.txt"));
        assert!(refs.contains("./file2.txt"));
        assert_eq!(refs.len(), 3);
    }
}
