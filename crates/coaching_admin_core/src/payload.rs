//! crates/coaching_admin_core/src/payload.rs
//!
//! Request bodies sent to the backend: plain JSON, or multipart forms for
//! resources that carry a binary attachment (course icon, lesson file).

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use crate::ports::{PortError, PortResult};
use crate::validation::Validate;

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart(MultipartForm),
}

/// A file carried by a create or update payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartForm {
    pub fields: Vec<(String, String)>,
    pub files: Vec<(String, Attachment)>,
}

impl MultipartForm {
    /// Flattens a serializable struct into text parts.
    ///
    /// Strings go through as-is, numbers and booleans use their JSON spelling,
    /// nested values are sent as JSON text and `null`s are skipped.
    pub fn from_serialize<T: Serialize>(value: &T) -> PortResult<Self> {
        let object = match serde_json::to_value(value) {
            Ok(Value::Object(object)) => object,
            Ok(other) => {
                return Err(PortError::Unexpected(format!(
                    "multipart payload must be an object, got {}",
                    other
                )))
            }
            Err(e) => return Err(PortError::Unexpected(e.to_string())),
        };

        let fields = object
            .into_iter()
            .filter_map(|(name, value)| {
                let text = match value {
                    Value::Null => return None,
                    Value::String(text) => text,
                    Value::Bool(flag) => flag.to_string(),
                    Value::Number(number) => number.to_string(),
                    nested => nested.to_string(),
                };
                Some((name, text))
            })
            .collect();

        Ok(Self {
            fields,
            files: Vec::new(),
        })
    }

    pub fn with_file(mut self, field: impl Into<String>, attachment: Attachment) -> Self {
        self.files.push((field.into(), attachment));
        self
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn file(&self, name: &str) -> Option<&Attachment> {
        self.files
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, attachment)| attachment)
    }
}

/// A create or update payload for one resource type.
pub trait Payload: Validate + Send + Sync + 'static {
    fn to_body(&self) -> PortResult<RequestBody>;
}

/// Serializes `value` as a JSON body.
pub fn json_body<T: Serialize>(value: &T) -> PortResult<RequestBody> {
    serde_json::to_value(value)
        .map(RequestBody::Json)
        .map_err(|e| PortError::Unexpected(e.to_string()))
}

/// JSON when there is no attachment, otherwise a multipart form with the
/// attachment under `field`.
pub fn body_with_attachment<T: Serialize>(
    value: &T,
    field: &str,
    attachment: Option<&Attachment>,
) -> PortResult<RequestBody> {
    match attachment {
        Some(file) => Ok(RequestBody::Multipart(
            MultipartForm::from_serialize(value)?.with_file(field, file.clone()),
        )),
        None => json_body(value),
    }
}
