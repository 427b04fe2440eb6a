//! Fake backend lifecycle
//!
//! A small axum app speaking the token, profile and course endpoints. Each
//! test gets its own instance on an ephemeral port.

use super::constants::*;
use admin_lib::app::AppState;
use admin_lib::config::Config;
use axum::extract::{Multipart, Path, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::Level;

type Reply = (StatusCode, Json<Value>);

/// Backend state visible to tests.
pub struct FakeBackend {
    /// `(method path, Authorization header)` per request, in arrival order.
    pub seen: Mutex<Vec<(String, Option<String>)>>,
    pub courses: Mutex<Vec<Value>>,
    /// Uploaded file names keyed by form field.
    pub uploads: Mutex<Vec<(String, String)>>,
    /// When set, every access token is rejected.
    pub revoked: AtomicBool,
    next_id: AtomicI64,
}

impl FakeBackend {
    fn new() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            courses: Mutex::new(vec![json!({
                "id": SEEDED_COURSE_ID,
                "title": SEEDED_COURSE_TITLE,
                "category": 1,
                "category_name": "Mindfulness",
                "instructor": "Kim",
                "level": "beginner",
                "created_at": "2024-01-01T08:00:00Z"
            })]),
            uploads: Mutex::new(Vec::new()),
            revoked: AtomicBool::new(false),
            next_id: AtomicI64::new(100),
        }
    }

    pub fn revoke_tokens(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }

    pub fn authorization_for(&self, route: &str) -> Vec<Option<String>> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(seen, _)| seen == route)
            .map(|(_, auth)| auth.clone())
            .collect()
    }

    fn record(&self, route: &str, headers: &HeaderMap) -> Option<String> {
        let auth = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        self.seen.lock().unwrap().push((route.to_string(), auth.clone()));
        auth
    }

    fn authorized(&self, route: &str, headers: &HeaderMap) -> bool {
        let auth = self.record(route, headers);
        if self.revoked.load(Ordering::SeqCst) {
            return false;
        }
        matches!(
            auth.as_deref().and_then(|value| value.strip_prefix("Bearer ")),
            Some(ACCESS_TOKEN) | Some(REFRESHED_ACCESS_TOKEN)
        )
    }
}

fn unauthorized() -> Reply {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Given token not valid for any token type"})),
    )
}

fn profile() -> Value {
    json!({
        "id": ADMIN_ID,
        "username": ADMIN_USER,
        "email": "admin@example.com",
        "full_name": "Ada Admin",
        "role": {"id": 1, "name": "admin"}
    })
}

// ============================================================================
// Handlers
// ============================================================================

async fn issue_token(
    State(backend): State<Arc<FakeBackend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    backend.record("POST /token/", &headers);
    if body["username"] == ADMIN_USER && body["password"] == ADMIN_PASS {
        (
            StatusCode::OK,
            Json(json!({"access": ACCESS_TOKEN, "refresh": REFRESH_TOKEN})),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "No active account found with the given credentials"})),
        )
    }
}

async fn refresh_token(
    State(backend): State<Arc<FakeBackend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    backend.record("POST /token/refresh/", &headers);
    if body["refresh"] == REFRESH_TOKEN {
        (
            StatusCode::OK,
            Json(json!({"access": REFRESHED_ACCESS_TOKEN})),
        )
    } else {
        unauthorized()
    }
}

async fn get_profile(State(backend): State<Arc<FakeBackend>>, headers: HeaderMap) -> Reply {
    if !backend.authorized("GET /profile/", &headers) {
        return unauthorized();
    }
    (StatusCode::OK, Json(profile()))
}

async fn logout(State(backend): State<Arc<FakeBackend>>, headers: HeaderMap) -> Reply {
    backend.record("POST /logout/", &headers);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"detail": "logout is broken"})),
    )
}

async fn list_courses(State(backend): State<Arc<FakeBackend>>, headers: HeaderMap) -> Reply {
    if !backend.authorized("GET /courses/", &headers) {
        return unauthorized();
    }
    let courses = backend.courses.lock().unwrap().clone();
    (StatusCode::OK, Json(Value::Array(courses)))
}

async fn create_course(
    State(backend): State<Arc<FakeBackend>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Reply {
    if !backend.authorized("POST /courses/", &headers) {
        return unauthorized();
    }

    let mut fields = Map::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                if field.bytes().await.is_err() {
                    return (StatusCode::BAD_REQUEST, Json(json!({"detail": "bad upload"})));
                }
                backend.uploads.lock().unwrap().push((name.clone(), file_name.clone()));
                fields.insert(name, Value::String(format!("/media/icons/{}", file_name)));
            }
            None => match field.text().await {
                Ok(text) => {
                    fields.insert(name, Value::String(text));
                }
                Err(_) => {
                    return (StatusCode::BAD_REQUEST, Json(json!({"detail": "bad field"})));
                }
            },
        }
    }

    let Some(title) = fields.get("title").cloned() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"title": ["This field is required."]})),
        );
    };
    let id = backend.next_id.fetch_add(1, Ordering::SeqCst);
    let course = json!({
        "id": id,
        "title": title,
        "instructor": fields.get("instructor").cloned().unwrap_or(Value::Null),
        "level": fields.get("level").cloned().unwrap_or(Value::Null),
        "icon": fields.get("icon").cloned().unwrap_or(Value::Null),
        "created_at": "2024-05-01T08:00:00Z"
    });
    backend.courses.lock().unwrap().insert(0, course.clone());
    (StatusCode::CREATED, Json(course))
}

async fn delete_course(
    State(backend): State<Arc<FakeBackend>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if !backend.authorized("DELETE /courses/{id}/", &headers) {
        return unauthorized().into_response();
    }
    let mut courses = backend.courses.lock().unwrap();
    let before = courses.len();
    courses.retain(|course| course["id"] != id);
    if courses.len() == before {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found."}))).into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

// ============================================================================
// TestServer
// ============================================================================

/// A running fake backend. The server task is aborted on drop.
pub struct TestServer {
    /// Base URL for the client (e.g. "http://127.0.0.1:12345")
    pub base_url: String,
    pub backend: Arc<FakeBackend>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let backend = Arc::new(FakeBackend::new());
        let app = Router::new()
            .route("/token/", post(issue_token))
            .route("/token/refresh/", post(refresh_token))
            .route("/profile/", get(get_profile))
            .route("/logout/", post(logout))
            .route("/courses/", get(list_courses).post(create_course))
            .route("/courses/{id}/", delete(delete_course))
            .with_state(backend.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to read local address");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Fake backend crashed");
        });

        Self {
            base_url: format!("http://{}", addr),
            backend,
            handle,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Builds a fully wired client pointed at `base_url`, storing tokens in
/// `token_store`.
pub fn app_state(base_url: &str, token_store: PathBuf) -> AppState {
    let config = Config {
        api_url: base_url.to_string(),
        request_timeout: Duration::from_secs(5),
        token_store_path: token_store,
        log_level: Level::DEBUG,
    };
    AppState::from_config(Arc::new(config)).expect("Failed to build app state")
}
