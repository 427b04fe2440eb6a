//! services/admin/src/app/client.rs
//!
//! The shared request channel. One `ApiClient` is created at startup and
//! cloned into the session manager and every collection; clones share the
//! bearer slot and the unauthorized signal.

use coaching_admin_core::payload::RequestBody;
use coaching_admin_core::ports::{
    ApiRequest, HttpMethod, HttpTransport, PortError, PortResult,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::warn;

const EVENT_CAPACITY: usize = 16;

/// Signals raised by the client for the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// A request sent with the session's bearer token was rejected with 401.
    Unauthorized,
}

/// Which credentials a request is sent with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    /// The session's current bearer, if any. Only these requests raise
    /// `AuthEvent::Unauthorized`.
    Session,
    /// An explicit token, used while a session is being established.
    Token(String),
    Anonymous,
}

#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn HttpTransport>,
    bearer: RwLock<Option<String>>,
    events: broadcast::Sender<AuthEvent>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                transport,
                bearer: RwLock::new(None),
                events,
            }),
        }
    }

    /// The access token currently attached to session requests.
    pub fn bearer(&self) -> Option<String> {
        self.inner
            .bearer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn has_bearer(&self) -> bool {
        self.inner
            .bearer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Only the session manager writes the bearer.
    pub(crate) fn set_bearer(&self, token: Option<String>) {
        *self
            .inner
            .bearer
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    /// Sends one request and returns the JSON body of a successful response.
    pub async fn send(&self, mut request: ApiRequest, auth: Auth) -> PortResult<Value> {
        let on_session = auth == Auth::Session;
        request.bearer = match auth {
            Auth::Session => self.bearer(),
            Auth::Token(token) => Some(token),
            Auth::Anonymous => None,
        };
        let carried_bearer = request.bearer.is_some();
        let method = request.method;
        let path = request.path.clone();

        let response = match self.inner.transport.execute(request).await {
            Ok(response) => response,
            Err(error) => {
                warn!(%method, %path, %error, "Request failed before a response arrived");
                return Err(error);
            }
        };

        if response.is_success() {
            return Ok(response.body);
        }

        let error = PortError::from_status(response.status, &response.body, &path);
        warn!(%method, %path, status = response.status, %error, "Request rejected");
        if error.is_unauthorized() && on_session && carried_bearer {
            // No receiver just means nobody is watching the session.
            let _ = self.inner.events.send(AuthEvent::Unauthorized);
        }
        Err(error)
    }

    /// Like `send`, decoding the body into `T`.
    pub async fn send_as<T: DeserializeOwned>(&self, request: ApiRequest, auth: Auth) -> PortResult<T> {
        let path = request.path.clone();
        let body = self.send(request, auth).await?;
        decode(&path, body)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> PortResult<T> {
        self.send_as(ApiRequest::new(HttpMethod::Get, path), Auth::Session)
            .await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: RequestBody) -> PortResult<T> {
        self.send_as(ApiRequest::new(HttpMethod::Post, path).with_body(body), Auth::Session)
            .await
    }

    pub async fn put<T: DeserializeOwned>(&self, path: &str, body: RequestBody) -> PortResult<T> {
        self.send_as(ApiRequest::new(HttpMethod::Put, path).with_body(body), Auth::Session)
            .await
    }

    pub async fn patch<T: DeserializeOwned>(&self, path: &str, body: RequestBody) -> PortResult<T> {
        self.send_as(ApiRequest::new(HttpMethod::Patch, path).with_body(body), Auth::Session)
            .await
    }

    /// Any body returned with a successful delete is ignored.
    pub async fn delete(&self, path: &str) -> PortResult<()> {
        self.send(ApiRequest::new(HttpMethod::Delete, path), Auth::Session)
            .await
            .map(|_| ())
    }
}

pub fn decode<T: DeserializeOwned>(path: &str, body: Value) -> PortResult<T> {
    serde_json::from_value(body).map_err(|e| PortError::Decode(format!("{}: {}", path, e)))
}
