use anyhow::{anyhow, Result};
use bson::{doc, oid::ObjectId, Bson, DateTime, Document};
use chrono::Utc;

use crate::StoreError;

pub const ID_FIELD: &str = "_id";
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";

/// Current UTC time as a BSON timestamp
pub fn now() -> DateTime {
    DateTime::from_chrono(Utc::now())
}

/// Set `createdAt`, replacing whatever the caller put there.
pub fn stamp_created(doc: &mut Document, at: DateTime) {
    doc.insert(CREATED_AT, at);
}

/// Set `updatedAt` on the fields of an update. `createdAt` is only ever
/// written on insert, so it is dropped from them.
pub fn stamp_updated(fields: &mut Document, at: DateTime) {
    fields.remove(CREATED_AT);
    fields.insert(UPDATED_AT, at);
}

/// Parse the hex string form of a document id
pub fn parse_id(id: &str) -> Result<ObjectId, StoreError> {
    ObjectId::parse_str(id.trim()).map_err(|_| StoreError::InvalidId(id.to_string()))
}

/// Identifier already present on a document, if any.
/// Only object ids are accepted as identifiers.
pub fn document_id(doc: &Document) -> Result<Option<ObjectId>, StoreError> {
    match doc.get(ID_FIELD) {
        None => Ok(None),
        Some(Bson::ObjectId(id)) => Ok(Some(*id)),
        Some(other) => Err(StoreError::InvalidId(other.to_string())),
    }
}

/// Filter selecting a single document by id
pub fn id_filter(id: ObjectId) -> Document {
    doc! { ID_FIELD: id }
}

/// Parse a document from (extended) JSON text
pub fn from_json(text: &str) -> Result<Document> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    match Bson::try_from(value)? {
        Bson::Document(doc) => Ok(doc),
        other => Err(anyhow!("expected a JSON object, got {}", other)),
    }
}

/// Parse a list of documents from a JSON array
pub fn from_json_array(text: &str) -> Result<Vec<Document>> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let serde_json::Value::Array(items) = value else {
        return Err(anyhow!("expected a JSON array of objects"));
    };
    items
        .into_iter()
        .map(|item| match Bson::try_from(item)? {
            Bson::Document(doc) => Ok(doc),
            other => Err(anyhow!("expected a JSON object, got {}", other)),
        })
        .collect()
}

/// Relaxed extended JSON rendering of a value
pub fn to_json(value: &Bson) -> serde_json::Value {
    value.clone().into_relaxed_extjson()
}
