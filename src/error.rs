//! Error types for reading, writing and editing RO-Crates

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrateError {
    #[error("Entity '{0}' already exists in the crate")]
    DuplicateId(String),

    #[error("No entity with id '{0}' in the crate")]
    NotFound(String),

    #[error("Entity '{0}' is the root or metadata descriptor and cannot be deleted")]
    ProtectedEntity(String),

    #[error("Malformed RO-Crate metadata: {0}")]
    MalformedMetadata(String),

    #[error("No ro-crate-metadata.json found in {0}")]
    MissingMetadata(String),

    #[error("Entry '{0}' not found in storage")]
    EntryNotFound(String),

    #[error("Entry '{0}' was already written")]
    DuplicateEntry(String),

    #[error("Payload of '{id}' at {path} is unavailable: {reason}")]
    PayloadUnavailable {
        id: String,
        path: String,
        reason: String,
    },

    #[error("Invalid entity: {0}")]
    InvalidEntity(String),

    #[error("Destination {0} exists and is not empty")]
    DestinationNotEmpty(PathBuf),

    #[error("Invalid path: {0}")]
    InvalidPath(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// A data entity whose payload was skipped during a save
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayloadWarning {
    /// The @id of the affected entity
    pub id: String,
    /// Where the payload was expected
    pub path: String,
    /// Why it could not be copied
    pub reason: String,
}

impl PayloadWarning {
    /// Turn the warning back into the error it was downgraded from
    pub fn into_error(self) -> CrateError {
        CrateError::PayloadUnavailable {
            id: self.id,
            path: self.path,
            reason: self.reason,
        }
    }
}

impl std::fmt::Display for PayloadWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "skipped payload of '{}' ({}): {}",
            self.id, self.path, self.reason
        )
    }
}
