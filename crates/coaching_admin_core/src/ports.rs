//! crates/coaching_admin_core/src/ports.rs
//!
//! Defines the service contracts (traits) the client core depends on.
//! The backend REST API and the durable token storage sit behind these ports,
//! so the session and collection logic never touches a concrete HTTP library
//! or storage medium.

use async_trait::async_trait;
use serde_json::Value;

use crate::payload::RequestBody;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
///
/// `Network` is reserved for failures where no response reached the client;
/// every other variant means the server answered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Cannot reach the server: {0}")]
    Network(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Server responded with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Failed to decode response: {0}")]
    Decode(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    /// Maps a non-success HTTP status and its body onto the error taxonomy.
    pub fn from_status(status: u16, body: &Value, path: &str) -> Self {
        match status {
            401 => PortError::Unauthorized,
            400 => PortError::BadRequest(error_detail(body)),
            404 => PortError::NotFound(path.to_string()),
            _ => PortError::Status {
                status,
                message: error_detail(body),
            },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, PortError::Unauthorized)
    }

    pub fn is_network(&self) -> bool {
        matches!(self, PortError::Network(_))
    }
}

/// Extracts a human readable message from an error body.
///
/// The backend usually answers `{"detail": "..."}`; field errors come back as
/// `{"field": ["msg", ...]}` and are passed through as compact JSON.
fn error_detail(body: &Value) -> String {
    match body {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Object(map) => match map.get("detail") {
            Some(Value::String(detail)) => detail.clone(),
            _ => body.to_string(),
        },
        other => other.to_string(),
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Request / Response Model
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single request against the backend, relative to its base address.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    /// Sent as `Authorization: Bearer <token>` when present.
    pub bearer: Option<String>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            bearer: None,
            body: RequestBody::Empty,
        }
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }
}

/// The status and decoded JSON body of a response that reached the client.
/// Empty bodies decode to `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Performs one request. Any response that arrives, whatever its status,
    /// is returned as `Ok`; only transport failures are errors.
    async fn execute(&self, request: ApiRequest) -> PortResult<ApiResponse>;
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> PortResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> PortResult<()>;

    /// Removes all of `keys` in one step. Missing keys are not an error.
    async fn remove(&self, keys: &[&str]) -> PortResult<()>;
}
