//! services/admin/src/adapters/http.rs
//!
//! The production `HttpTransport`: a `reqwest` client bound to one base
//! address with a fixed per-request timeout.

use async_trait::async_trait;
use coaching_admin_core::payload::{MultipartForm, RequestBody};
use coaching_admin_core::ports::{
    ApiRequest, ApiResponse, HttpMethod, HttpTransport, PortError, PortResult,
};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    /// Creates a transport for `base_url` (e.g. "http://127.0.0.1:8000").
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> PortResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Unexpected(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

fn method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

fn multipart_form(form: MultipartForm) -> PortResult<Form> {
    let mut multipart = Form::new();
    for (name, value) in form.fields {
        multipart = multipart.text(name, value);
    }
    for (name, attachment) in form.files {
        let mut part = Part::bytes(attachment.bytes.to_vec()).file_name(attachment.file_name);
        if let Some(content_type) = attachment.content_type {
            part = part
                .mime_str(&content_type)
                .map_err(|e| PortError::Unexpected(format!("Invalid content type: {}", e)))?;
        }
        multipart = multipart.part(name, part);
    }
    Ok(multipart)
}

/// Everything that fails before a response arrives is a network failure,
/// except requests that could not be built in the first place.
fn send_error(error: reqwest::Error) -> PortError {
    if error.is_builder() {
        PortError::Unexpected(error.to_string())
    } else if error.is_timeout() {
        PortError::Network(format!("request timed out: {}", error))
    } else {
        PortError::Network(error.to_string())
    }
}

/// Empty bodies become `Null`; bodies that are not JSON are kept as text.
fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

//=========================================================================================
// `HttpTransport` Trait Implementation
//=========================================================================================

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: ApiRequest) -> PortResult<ApiResponse> {
        let url = self.url(&request.path);
        debug!(method = %request.method, %url, "Sending request");

        let mut builder = self.client.request(method(request.method), &url);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(form) => builder.multipart(multipart_form(form)?),
        };

        let response = builder.send().await.map_err(send_error)?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(send_error)?;

        Ok(ApiResponse::new(status, decode_body(&bytes)))
    }
}
