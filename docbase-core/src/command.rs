// src/command.rs
//! Request/response layer shared by the CLI and network front ends
//!
//! Requests arrive already decoded. Every failure becomes an error
//! `Response` carrying the message; nothing here panics on bad input.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{json_type_name, Document, DocumentId};
use crate::error::{Result, StoreError};
use crate::log_debug;
use crate::manager::CollectionManager;
use crate::query::Query;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Insert,
    Find,
    Delete,
    CreateIndex,
}

impl Command {
    pub fn parse(name: &str) -> Result<Command> {
        match name {
            "insert" => Ok(Command::Insert),
            "find" => Ok(Command::Find),
            "delete" => Ok(Command::Delete),
            "create_index" => Ok(Command::CreateIndex),
            other => Err(StoreError::UnknownCommand(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Insert => "insert",
            Command::Find => "find",
            Command::Delete => "delete",
            Command::CreateIndex => "create_index",
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, Command::Find)
    }
}

/// A decoded request
///
/// `data` carries documents for insert; `query` carries the condition for
/// find/delete, or the field name for create_index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub database: String,
    pub command: String,
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub query: Value,
}

impl Request {
    pub fn new(database: impl Into<String>, command: impl Into<String>) -> Self {
        Request {
            database: database.into(),
            command: command.into(),
            data: Vec::new(),
            query: Value::Null,
        }
    }

    pub fn with_data(mut self, data: Vec<Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_query(mut self, query: Value) -> Self {
        self.query = query;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    pub message: String,
    /// Affected (or returned) document count
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<Document>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inserted_ids: Option<Vec<DocumentId>>,
}

impl Response {
    pub fn success(message: impl Into<String>, count: usize) -> Self {
        Response {
            status: Status::Success,
            message: message.into(),
            count,
            documents: None,
            inserted_ids: None,
        }
    }

    pub fn error(err: &StoreError) -> Self {
        Response {
            status: Status::Error,
            message: err.to_string(),
            count: 0,
            documents: None,
            inserted_ids: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

/// Run one request against the manager
pub fn execute(manager: &CollectionManager, request: Request) -> Response {
    let command = request.command.clone();
    match dispatch(manager, request) {
        Ok(response) => response,
        Err(e) => {
            log_debug!("command '{}' failed: {}", command, e);
            Response::error(&e)
        }
    }
}

fn dispatch(manager: &CollectionManager, request: Request) -> Result<Response> {
    let Request {
        database,
        command,
        data,
        query,
    } = request;

    match Command::parse(&command)? {
        Command::Insert => {
            if data.is_empty() {
                return Err(StoreError::Validation(
                    "insert requires at least one document".to_string(),
                ));
            }
            let documents = data
                .into_iter()
                .map(Document::from_value)
                .collect::<Result<Vec<_>>>()?;
            let result = manager.insert(&database, documents)?;
            let mut response = Response::success(result.message, result.inserted_ids.len());
            response.inserted_ids = Some(result.inserted_ids);
            Ok(response)
        }
        Command::Find => {
            let query = Query::parse(&query)?;
            let documents = manager.find(&database, &query)?;
            let mut response =
                Response::success(format!("found {} document(s)", documents.len()), documents.len());
            response.documents = Some(documents);
            Ok(response)
        }
        Command::Delete => {
            let query = Query::parse(&query)?;
            let result = manager.delete(&database, query)?;
            Ok(Response::success(result.message, result.deleted_count))
        }
        Command::CreateIndex => {
            let field = index_field(&query)?;
            let branching_factor = manager.config().default_branching_factor;
            let result = manager.create_index(&database, &field, branching_factor)?;
            Ok(Response::success(result.message, 0))
        }
    }
}

/// Field name for create_index: a string, or the first key of an object
fn index_field(query: &Value) -> Result<String> {
    let field = match query {
        Value::String(s) => s.trim().to_string(),
        Value::Object(map) => map.keys().next().cloned().unwrap_or_default(),
        Value::Null => String::new(),
        other => {
            return Err(StoreError::Validation(format!(
                "create_index expects a field name, got {}",
                json_type_name(other)
            )))
        }
    };
    if field.is_empty() {
        return Err(StoreError::Validation(
            "create_index requires a field name".to_string(),
        ));
    }
    Ok(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_parsing() {
        for name in ["insert", "find", "delete", "create_index"] {
            assert_eq!(Command::parse(name).unwrap().as_str(), name);
        }
        assert!(matches!(
            Command::parse("update"),
            Err(StoreError::UnknownCommand(_))
        ));
        assert!(!Command::Find.is_write());
        assert!(Command::CreateIndex.is_write());
    }

    #[test]
    fn test_index_field_shapes() {
        assert_eq!(index_field(&json!("age")).unwrap(), "age");
        assert_eq!(index_field(&json!({"address.city": 1})).unwrap(), "address.city");
        for bad in [json!(null), json!(""), json!({}), json!(42)] {
            assert!(matches!(index_field(&bad), Err(StoreError::Validation(_))), "{}", bad);
        }
    }

    #[test]
    fn test_request_deserialize_defaults() {
        let request: Request =
            serde_json::from_value(json!({"database": "users", "command": "find"})).unwrap();
        assert_eq!(request, Request::new("users", "find"));
    }

    #[test]
    fn test_response_wire_shape() {
        let response = Response::success("deleted 1 document(s)", 1);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"status": "success", "message": "deleted 1 document(s)", "count": 1})
        );
        let error = Response::error(&StoreError::UnknownCommand("drop".into()));
        assert_eq!(serde_json::to_value(&error).unwrap()["status"], json!("error"));
        assert!(!error.is_success());
    }
}
