// src/document.rs
use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::value_utils::get_path;

/// Reserved field carrying the document identifier
pub const ID_FIELD: &str = "_id";

/// Globally unique document identifier
///
/// Serialized as a plain string: `{"_id": "1718000000000000000-042917"}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        DocumentId(id.into())
    }

    /// Time-based id with a random disambiguator: `<unix nanos>-<6 digits>`
    pub fn generate() -> Self {
        let now = chrono::Utc::now();
        let nanos = now
            .timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000));
        let salt = (Uuid::new_v4().as_u128() % 1_000_000) as u32;
        DocumentId(format!("{}-{:06}", nanos, salt))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        DocumentId(id)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        DocumentId(id.to_string())
    }
}

impl Borrow<str> for DocumentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Schema-less JSON document
///
/// A stored document always carries its id in the `_id` field, so the
/// serialized form is exactly what the user sees from `find`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: Map<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Document::default()
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Document { fields }
    }

    /// Documents must be JSON objects; anything else is a malformed payload
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Document { fields }),
            other => Err(StoreError::MalformedPayload(format!(
                "document must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| StoreError::MalformedPayload(format!("invalid document JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// The `_id` value, when it is a string
    pub fn id(&self) -> Option<DocumentId> {
        self.fields
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .map(DocumentId::from)
    }

    pub fn set_id(&mut self, id: &DocumentId) {
        self.fields
            .insert(ID_FIELD.to_string(), Value::String(id.as_str().to_string()));
    }

    /// Field lookup with dot-notation support ("address.city")
    pub fn get(&self, field: &str) -> Option<&Value> {
        get_path(&self.fields, field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(field.into(), value)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "document",
    }
}
