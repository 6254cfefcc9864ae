//! Document-store semantics shared by every collection.
//!
//! Documents travel as JSON objects. Creation stamps the server-owned fields,
//! updates are shallow merges where `null` deletes a field, and every result
//! must deserialize into the entity type and pass its validation.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::Collection;

/// Fields owned by the server on every document.
pub const BASE_GUARDED_FIELDS: [&str; 3] = ["id", "created_at", "updated_at"];

/// Entity stored as a JSON document in a named collection.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> &str;

    /// Fields clients may not set through create or update bodies.
    fn guarded_fields() -> &'static [&'static str] {
        &BASE_GUARDED_FIELDS
    }

    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Adjusts server-maintained fields before the document is written.
    fn on_write(&mut self, _previous: Option<&Self>, _now: DateTime<Utc>) {}
}

/// Field level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new<S: Into<String>>(field: &'static str, message: S) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document body must be a JSON object")]
    NotAnObject,
    #[error("field '{0}' is managed by the server")]
    GuardedField(String),
    #[error("invalid document: {0}")]
    Invalid(#[from] serde_json::Error),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Builds a new document from a client body, assigning id and timestamps.
pub fn create_document<T: Document>(
    id: &str,
    body: Value,
    now: DateTime<Utc>,
) -> Result<T, DocumentError> {
    let mut object = into_object(body)?;
    reject_guarded::<T>(&object)?;
    object.retain(|_, value| !value.is_null());

    let timestamp = serde_json::to_value(now)?;
    object.insert("id".to_string(), Value::String(id.to_string()));
    object.insert("created_at".to_string(), timestamp.clone());
    object.insert("updated_at".to_string(), timestamp);

    let mut document: T = serde_json::from_value(Value::Object(object))?;
    document.on_write(None, now);
    document.validate()?;
    Ok(document)
}

/// Shallow-merges a patch into an existing document.
pub fn merge_document<T: Document>(
    current: &T,
    patch: Value,
    now: DateTime<Utc>,
) -> Result<T, DocumentError> {
    let patch = into_object(patch)?;
    reject_guarded::<T>(&patch)?;

    let mut object = into_object(serde_json::to_value(current)?)?;
    for (key, value) in patch {
        if value.is_null() {
            object.remove(&key);
        } else {
            object.insert(key, value);
        }
    }
    object.insert("updated_at".to_string(), serde_json::to_value(now)?);

    let mut document: T = serde_json::from_value(Value::Object(object))?;
    document.on_write(Some(current), now);
    document.validate()?;
    Ok(document)
}

fn into_object(value: Value) -> Result<Map<String, Value>, DocumentError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(DocumentError::NotAnObject),
    }
}

fn reject_guarded<T: Document>(object: &Map<String, Value>) -> Result<(), DocumentError> {
    match T::guarded_fields()
        .iter()
        .find(|field| object.contains_key(**field))
    {
        Some(field) => Err(DocumentError::GuardedField(field.to_string())),
        None => Ok(()),
    }
}
