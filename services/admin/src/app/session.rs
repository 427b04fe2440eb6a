//! services/admin/src/app/session.rs
//!
//! Owns the authenticated user and the access/refresh token pair: login,
//! logout, restore-on-startup with a single refresh fallback, and keeping the
//! client's bearer in step with the current user.
//!
//! The bearer is attached in the same critical section that sets the user and
//! detached in the one that clears it, so `current_user().is_some()` and
//! `api.has_bearer()` always agree. While a session is being established the
//! candidate token is passed explicitly instead.

use coaching_admin_core::domain::{
    merge_over, Credentials, LoginResponse, RefreshedToken, TokenPair, User, UserUpdate,
};
use coaching_admin_core::payload::{json_body, RequestBody};
use coaching_admin_core::ports::{ApiRequest, HttpMethod, KeyValueStore, PortError, PortResult};
use coaching_admin_core::validation::{Validate, ValidationErrors};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::app::client::{ApiClient, Auth, AuthEvent};

pub const ACCESS_KEY: &str = "access";
pub const REFRESH_KEY: &str = "refresh";

const TOKEN_PATH: &str = "/token/";
const REFRESH_PATH: &str = "/token/refresh/";
const PROFILE_PATH: &str = "/profile/";
const LOGOUT_PATH: &str = "/logout/";

//=========================================================================================
// Errors
//=========================================================================================

/// Login failures, each with a message that can be shown as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoginError {
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Bad request. Please check your input.")]
    BadRequest,
    #[error("Cannot connect to server. Check your network.")]
    CannotConnect,
    #[error("Login failed. Please try again.")]
    Failed,
}

impl LoginError {
    fn from_token_error(error: &PortError) -> Self {
        match error {
            PortError::Unauthorized => LoginError::InvalidCredentials,
            PortError::BadRequest(_) => LoginError::BadRequest,
            PortError::Network(_) => LoginError::CannotConnect,
            _ => LoginError::Failed,
        }
    }

    fn from_profile_error(error: &PortError) -> Self {
        if error.is_network() {
            LoginError::CannotConnect
        } else {
            LoginError::Failed
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No user is currently logged in")]
    NotLoggedIn,
    #[error("No refresh token is stored")]
    MissingRefreshToken,
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Port(#[from] PortError),
}

pub type SessionResult<T> = Result<T, SessionError>;

//=========================================================================================
// SessionManager
//=========================================================================================

#[derive(Debug, Default)]
struct SessionState {
    user: Option<User>,
    is_restoring: bool,
    /// Bumped every time the session is cleared.
    epoch: u64,
}

/// A point-in-time copy of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub current_user: Option<User>,
    pub access_token: Option<String>,
    pub is_restoring: bool,
}

pub struct SessionManager {
    api: ApiClient,
    store: Arc<dyn KeyValueStore>,
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(api: ApiClient, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            api,
            store,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current_user(&self) -> Option<User> {
        self.state().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().user.is_some()
    }

    pub fn is_restoring(&self) -> bool {
        self.state().is_restoring
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state();
        SessionSnapshot {
            current_user: state.user.clone(),
            access_token: self.api.bearer(),
            is_restoring: state.is_restoring,
        }
    }

    fn establish(&self, user: User, access: String) {
        let mut state = self.state();
        self.api.set_bearer(Some(access));
        state.user = Some(user);
    }

    fn clear(&self) {
        let mut state = self.state();
        state.user = None;
        state.epoch += 1;
        self.api.set_bearer(None);
    }

    fn epoch(&self) -> u64 {
        self.state().epoch
    }

    /// Replaces the cached user unless the session ended or changed hands
    /// while a request was in flight.
    fn replace_user(&self, user: User) -> bool {
        let mut state = self.state();
        match &mut state.user {
            Some(current) if current.id == user.id => {
                *current = user;
                true
            }
            _ => false,
        }
    }

    async fn fetch_profile(&self, access: &str) -> PortResult<User> {
        self.api
            .send_as(
                ApiRequest::new(HttpMethod::Get, PROFILE_PATH),
                Auth::Token(access.to_string()),
            )
            .await
    }

    /// Exchanges `refresh` for a new access token and persists it. A token
    /// that arrives after a logout is dropped and reported as unauthorized.
    async fn exchange_refresh_token(&self, refresh: &str) -> PortResult<String> {
        let epoch = self.epoch();
        let body = refresh_body(refresh)?;
        let refreshed: RefreshedToken = self
            .api
            .send_as(
                ApiRequest::new(HttpMethod::Post, REFRESH_PATH).with_body(body),
                Auth::Anonymous,
            )
            .await?;

        if self.epoch() != epoch {
            debug!("Session ended during token refresh; dropping the new token");
            return Err(PortError::Unauthorized);
        }
        self.store.set(ACCESS_KEY, &refreshed.access).await?;
        if let Some(rotated) = &refreshed.refresh {
            self.store.set(REFRESH_KEY, rotated).await?;
        }
        // A logout may have cleared the store while the writes were pending.
        if self.epoch() != epoch {
            self.store.remove(&[ACCESS_KEY, REFRESH_KEY]).await?;
            return Err(PortError::Unauthorized);
        }
        Ok(refreshed.access)
    }

    //-------------------------------------------------------------------------------------
    // Restore
    //-------------------------------------------------------------------------------------

    /// Recovers a session from persisted tokens. Never fails: any problem
    /// ends in the logged-out state.
    pub async fn restore_session(&self) {
        self.state().is_restoring = true;

        match self.try_restore().await {
            Ok(Some(user)) => info!(user = %user.username, "Session restored"),
            Ok(None) => debug!("No stored session"),
            Err(error) => {
                warn!(%error, "Session restore failed; logging out");
                self.logout().await;
            }
        }

        self.state().is_restoring = false;
    }

    async fn try_restore(&self) -> PortResult<Option<User>> {
        let access = self.store.get(ACCESS_KEY).await?;
        let refresh = self.store.get(REFRESH_KEY).await?;

        let Some(access) = access else {
            return match refresh {
                Some(refresh) => self.restore_with_refresh(Some(refresh)).await.map(Some),
                None => Ok(None),
            };
        };

        match self.fetch_profile(&access).await {
            Ok(user) => {
                self.establish(user.clone(), access);
                Ok(Some(user))
            }
            Err(PortError::Unauthorized) => {
                info!("Stored access token rejected; trying refresh token");
                self.restore_with_refresh(refresh).await.map(Some)
            }
            Err(error) => Err(error),
        }
    }

    /// The single fallback step: one refresh, one profile retry.
    async fn restore_with_refresh(&self, refresh: Option<String>) -> PortResult<User> {
        let refresh = refresh.ok_or(PortError::Unauthorized)?;
        let access = self.exchange_refresh_token(&refresh).await?;
        let user = self.fetch_profile(&access).await?;
        self.establish(user.clone(), access);
        Ok(user)
    }

    //-------------------------------------------------------------------------------------
    // Login / refresh / logout
    //-------------------------------------------------------------------------------------

    /// Issues tokens, loads the profile, and only then persists and attaches
    /// the tokens.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, LoginError> {
        info!(%username, "Logging in");
        let credentials = Credentials {
            username: username.to_string(),
            password: password.to_string(),
        };
        let body = json_body(&credentials).map_err(|e| {
            error!(error = %e, "Failed to encode credentials");
            LoginError::Failed
        })?;

        let tokens: TokenPair = self
            .api
            .send_as(
                ApiRequest::new(HttpMethod::Post, TOKEN_PATH).with_body(body),
                Auth::Anonymous,
            )
            .await
            .map_err(|e| {
                warn!(error = %e, "Token request failed");
                LoginError::from_token_error(&e)
            })?;

        let user = self.fetch_profile(&tokens.access).await.map_err(|e| {
            warn!(error = %e, "Failed to fetch user after login");
            LoginError::from_profile_error(&e)
        })?;

        self.persist_tokens(&tokens).await.map_err(|e| {
            error!(error = %e, "Failed to persist tokens");
            LoginError::Failed
        })?;

        self.establish(user.clone(), tokens.access.clone());
        info!(user = %user.username, "Logged in");

        Ok(LoginResponse {
            user,
            access: tokens.access,
            refresh: tokens.refresh,
        })
    }

    async fn persist_tokens(&self, tokens: &TokenPair) -> PortResult<()> {
        self.store.set(ACCESS_KEY, &tokens.access).await?;
        self.store.set(REFRESH_KEY, &tokens.refresh).await
    }

    /// Exchanges the stored refresh token for a new access token. The new
    /// token is attached only when a user is logged in.
    pub async fn refresh_session(&self) -> SessionResult<String> {
        let refresh = self
            .store
            .get(REFRESH_KEY)
            .await?
            .ok_or(SessionError::MissingRefreshToken)?;

        let access = self.exchange_refresh_token(&refresh).await?;

        let state = self.state();
        if state.user.is_some() {
            self.api.set_bearer(Some(access.clone()));
        }
        debug!("Access token refreshed");
        Ok(access)
    }

    /// Always succeeds locally; the backend call is best-effort.
    pub async fn logout(&self) {
        let auth = match self.api.bearer() {
            Some(token) => Auth::Token(token),
            None => Auth::Anonymous,
        };
        if let Err(error) = self
            .api
            .send(ApiRequest::new(HttpMethod::Post, LOGOUT_PATH), auth)
            .await
        {
            warn!(%error, "Logout API error");
        }

        if let Err(error) = self.store.remove(&[ACCESS_KEY, REFRESH_KEY]).await {
            error!(%error, "Failed to clear stored tokens");
        }

        self.clear();
        info!("User logged out");
    }

    //-------------------------------------------------------------------------------------
    // Profile
    //-------------------------------------------------------------------------------------

    /// Applies `update` locally right away, then reconciles with the server.
    /// On failure the canonical profile is re-fetched and the error returned.
    pub async fn update_user(&self, update: UserUpdate) -> SessionResult<User> {
        let (previous, optimistic) = {
            let mut state = self.state();
            let user = state.user.as_mut().ok_or(SessionError::NotLoggedIn)?;
            update.validate()?;
            let previous = user.clone();
            user.apply(&update);
            (previous, user.clone())
        };

        let path = format!("{}{}/", PROFILE_PATH, optimistic.id);
        let result = async {
            let body = json_body(&update)?;
            let response: Value = self.api.patch(&path, body).await?;
            merge_over(&optimistic, response).map_err(|e| PortError::Decode(e.to_string()))
        }
        .await;

        match result {
            Ok(user) => {
                self.replace_user(user.clone());
                info!(user = %user.username, "User updated");
                Ok(user)
            }
            Err(error) => {
                warn!(%error, "Failed to update user; restoring server copy");
                match self.api.get::<User>(PROFILE_PATH).await {
                    Ok(canonical) => {
                        self.replace_user(canonical);
                    }
                    Err(fetch_error) => {
                        error!(error = %fetch_error, "Failed to re-fetch profile after a failed update");
                        self.replace_user(previous);
                    }
                }
                Err(error.into())
            }
        }
    }

    /// Re-fetches the profile. Returns `Ok(None)` after logging out when the
    /// backend no longer knows the user.
    pub async fn refresh_user(&self) -> SessionResult<Option<User>> {
        match self.api.get::<User>(PROFILE_PATH).await {
            Ok(user) => {
                self.replace_user(user.clone());
                Ok(Some(user))
            }
            Err(PortError::Unauthorized) | Err(PortError::NotFound(_)) => {
                warn!("Profile no longer available; logging out");
                self.logout().await;
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }

    //-------------------------------------------------------------------------------------
    // Forced logout
    //-------------------------------------------------------------------------------------

    /// Spawns a task that logs out whenever the client reports a rejected
    /// session token. Ends when the manager is dropped or the channel closes.
    pub fn watch_unauthorized(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.api.subscribe();
        let session = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AuthEvent::Unauthorized) => {
                        let Some(session) = session.upgrade() else {
                            break;
                        };
                        if session.is_authenticated() && !session.is_restoring() {
                            warn!("Session token rejected; forcing logout");
                            session.logout().await;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Missed auth events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

fn refresh_body(refresh: &str) -> PortResult<RequestBody> {
    json_body(&serde_json::json!({ "refresh": refresh }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use crate::testing::ScriptedTransport;
    use serde_json::json;
    use std::time::Duration;

    fn profile() -> Value {
        json!({
            "id": 1,
            "username": "admin",
            "email": "admin@example.com",
            "full_name": "Ada Admin",
            "city": "Oslo",
            "role": {"id": 1, "name": "admin"}
        })
    }

    fn setup(
        stored: &[(&'static str, &'static str)],
    ) -> (Arc<ScriptedTransport>, Arc<MemoryStore>, Arc<SessionManager>) {
        let transport = ScriptedTransport::new();
        let store = Arc::new(MemoryStore::with_entries(stored.iter().copied()));
        let api = ApiClient::new(transport.clone());
        let session = Arc::new(SessionManager::new(api, store.clone()));
        (transport, store, session)
    }

    fn assert_consistent(session: &SessionManager) {
        assert_eq!(session.is_authenticated(), session.api().has_bearer());
    }

    async fn logged_in() -> (Arc<ScriptedTransport>, Arc<MemoryStore>, Arc<SessionManager>) {
        let (transport, store, session) = setup(&[]);
        transport.reply(HttpMethod::Post, TOKEN_PATH, 200, json!({"access": "a-1", "refresh": "r-1"}));
        transport.reply(HttpMethod::Get, PROFILE_PATH, 200, profile());
        session.login("admin", "correct").await.unwrap();
        (transport, store, session)
    }

    //--- login -------------------------------------------------------------------------

    #[tokio::test]
    async fn login_persists_tokens_and_authenticates_later_requests() {
        let (transport, store, session) = logged_in().await;

        let stored = store.snapshot();
        assert_eq!(stored.get(ACCESS_KEY).map(String::as_str), Some("a-1"));
        assert_eq!(stored.get(REFRESH_KEY).map(String::as_str), Some("r-1"));
        assert_eq!(session.current_user().unwrap().username, "admin");
        assert_consistent(&session);

        transport.reply(HttpMethod::Get, PROFILE_PATH, 200, profile());
        session.refresh_user().await.unwrap();
        let last = transport.requests().pop().unwrap();
        assert_eq!(last.bearer.as_deref(), Some("a-1"));
    }

    #[tokio::test]
    async fn login_returns_user_and_both_tokens() {
        let (transport, _store, session) = setup(&[]);
        transport.reply(HttpMethod::Post, TOKEN_PATH, 200, json!({"access": "a-1", "refresh": "r-1"}));
        transport.reply(HttpMethod::Get, PROFILE_PATH, 200, profile());

        let response = session.login("admin", "correct").await.unwrap();
        assert_eq!(response.access, "a-1");
        assert_eq!(response.refresh, "r-1");
        assert_eq!(response.user.id, 1);

        let token_request = &transport.requests()[0];
        assert_eq!(token_request.bearer, None);
        assert_eq!(
            token_request.body,
            RequestBody::Json(json!({"username": "admin", "password": "correct"}))
        );
    }

    #[tokio::test]
    async fn wrong_password_is_reported_and_nothing_is_stored() {
        let (transport, store, session) = setup(&[]);
        transport.reply(HttpMethod::Post, TOKEN_PATH, 401, json!({"detail": "No active account"}));

        let err = session.login("admin", "wrong").await.unwrap_err();
        assert_eq!(err, LoginError::InvalidCredentials);
        assert_eq!(err.to_string(), "Invalid username or password");
        assert!(store.snapshot().is_empty());
        assert!(!session.is_authenticated());
        assert_consistent(&session);
    }

    #[tokio::test]
    async fn login_failures_map_to_distinct_kinds() {
        let (transport, _store, session) = setup(&[]);
        transport.reply(HttpMethod::Post, TOKEN_PATH, 400, json!({"password": ["required"]}));
        transport.fail(HttpMethod::Post, TOKEN_PATH, PortError::Network("refused".into()));
        transport.reply(HttpMethod::Post, TOKEN_PATH, 503, Value::Null);

        assert_eq!(session.login("admin", "").await.unwrap_err(), LoginError::BadRequest);
        let offline = session.login("admin", "x").await.unwrap_err();
        assert_eq!(offline, LoginError::CannotConnect);
        assert_eq!(offline.to_string(), "Cannot connect to server. Check your network.");
        assert_eq!(session.login("admin", "x").await.unwrap_err(), LoginError::Failed);
    }

    #[tokio::test]
    async fn profile_failure_after_token_issue_stores_nothing() {
        let (transport, store, session) = setup(&[]);
        transport.reply(HttpMethod::Post, TOKEN_PATH, 200, json!({"access": "a-1", "refresh": "r-1"}));
        transport.reply(HttpMethod::Get, PROFILE_PATH, 500, Value::Null);

        let err = session.login("admin", "correct").await.unwrap_err();
        assert_eq!(err.to_string(), "Login failed. Please try again.");
        assert!(store.snapshot().is_empty());
        assert!(!session.api().has_bearer());
    }

    #[tokio::test]
    async fn unreachable_profile_after_token_issue_reports_cannot_connect() {
        let (transport, store, session) = setup(&[]);
        transport.reply(HttpMethod::Post, TOKEN_PATH, 200, json!({"access": "a-1", "refresh": "r-1"}));
        transport.fail(HttpMethod::Get, PROFILE_PATH, PortError::Network("reset".into()));

        let err = session.login("admin", "correct").await.unwrap_err();
        assert_eq!(err, LoginError::CannotConnect);
        assert!(store.snapshot().is_empty());
    }

    //--- restore -----------------------------------------------------------------------

    #[tokio::test]
    async fn restore_without_tokens_is_a_quiet_no_op() {
        let (transport, _store, session) = setup(&[]);
        session.restore_session().await;

        assert!(!session.is_authenticated());
        assert!(!session.is_restoring());
        assert!(transport.requests().is_empty());
        assert_consistent(&session);
    }

    #[tokio::test]
    async fn restore_with_valid_access_token() {
        let (transport, _store, session) = setup(&[(ACCESS_KEY, "a-1"), (REFRESH_KEY, "r-1")]);
        transport.reply(HttpMethod::Get, PROFILE_PATH, 200, profile());

        session.restore_session().await;

        assert!(session.is_authenticated());
        assert_eq!(session.snapshot().access_token.as_deref(), Some("a-1"));
        assert!(!session.is_restoring());
    }

    #[tokio::test]
    async fn restore_refreshes_once_when_access_token_is_rejected() {
        let (transport, store, session) = setup(&[(ACCESS_KEY, "stale"), (REFRESH_KEY, "r-1")]);
        transport.reply(HttpMethod::Get, PROFILE_PATH, 401, Value::Null);
        transport.reply(HttpMethod::Post, REFRESH_PATH, 200, json!({"access": "a-2"}));
        transport.reply(HttpMethod::Get, PROFILE_PATH, 200, profile());

        session.restore_session().await;

        assert!(session.is_authenticated());
        assert_eq!(transport.count(HttpMethod::Post, REFRESH_PATH), 1);
        assert_eq!(transport.count(HttpMethod::Get, PROFILE_PATH), 2);
        assert_eq!(store.snapshot().get(ACCESS_KEY).map(String::as_str), Some("a-2"));
        assert_eq!(session.api().bearer().as_deref(), Some("a-2"));

        let refresh_request = transport
            .requests()
            .into_iter()
            .find(|r| r.path == REFRESH_PATH)
            .unwrap();
        assert_eq!(refresh_request.body, RequestBody::Json(json!({"refresh": "r-1"})));
    }

    #[tokio::test]
    async fn restore_without_refresh_token_ends_logged_out() {
        let (transport, store, session) = setup(&[(ACCESS_KEY, "stale")]);
        transport.reply(HttpMethod::Get, PROFILE_PATH, 401, Value::Null);

        session.restore_session().await;

        assert!(!session.is_authenticated());
        assert!(store.snapshot().is_empty());
        assert_eq!(transport.count(HttpMethod::Post, REFRESH_PATH), 0);
        assert_consistent(&session);
    }

    #[tokio::test]
    async fn restore_with_rejected_refresh_clears_everything() {
        let (transport, store, session) = setup(&[(ACCESS_KEY, "stale"), (REFRESH_KEY, "expired")]);
        transport.reply(HttpMethod::Get, PROFILE_PATH, 401, Value::Null);
        transport.reply(HttpMethod::Post, REFRESH_PATH, 401, json!({"detail": "Token is invalid"}));

        session.restore_session().await;

        assert!(!session.is_authenticated());
        assert!(!session.api().has_bearer());
        assert!(store.snapshot().is_empty());
        assert_eq!(transport.count(HttpMethod::Get, PROFILE_PATH), 1);
    }

    #[tokio::test]
    async fn restore_gives_up_when_the_retry_also_fails() {
        let (transport, store, session) = setup(&[(ACCESS_KEY, "stale"), (REFRESH_KEY, "r-1")]);
        transport.reply(HttpMethod::Get, PROFILE_PATH, 401, Value::Null);
        transport.reply(HttpMethod::Post, REFRESH_PATH, 200, json!({"access": "a-2"}));
        transport.reply(HttpMethod::Get, PROFILE_PATH, 401, Value::Null);

        session.restore_session().await;

        assert!(!session.is_authenticated());
        assert!(store.snapshot().is_empty());
        assert_eq!(transport.count(HttpMethod::Post, REFRESH_PATH), 1);
    }

    #[tokio::test]
    async fn network_failure_during_restore_is_not_retried() {
        let (transport, store, session) = setup(&[(ACCESS_KEY, "a-1"), (REFRESH_KEY, "r-1")]);
        transport.fail(HttpMethod::Get, PROFILE_PATH, PortError::Network("offline".into()));

        session.restore_session().await;

        assert!(!session.is_authenticated());
        assert!(store.snapshot().is_empty());
        assert_eq!(transport.count(HttpMethod::Post, REFRESH_PATH), 0);
        assert!(!session.is_restoring());
    }

    #[tokio::test]
    async fn restore_from_refresh_token_alone() {
        let (transport, _store, session) = setup(&[(REFRESH_KEY, "r-1")]);
        transport.reply(HttpMethod::Post, REFRESH_PATH, 200, json!({"access": "a-9", "refresh": "r-2"}));
        transport.reply(HttpMethod::Get, PROFILE_PATH, 200, profile());

        session.restore_session().await;

        assert!(session.is_authenticated());
        assert_eq!(session.api().bearer().as_deref(), Some("a-9"));
    }

    //--- refresh / logout --------------------------------------------------------------

    #[tokio::test]
    async fn refresh_session_needs_a_refresh_token() {
        let (_transport, _store, session) = setup(&[]);
        assert!(matches!(
            session.refresh_session().await,
            Err(SessionError::MissingRefreshToken)
        ));
    }

    #[tokio::test]
    async fn refresh_session_reattaches_for_a_logged_in_user() {
        let (transport, store, session) = logged_in().await;
        transport.reply(HttpMethod::Post, REFRESH_PATH, 200, json!({"access": "a-2"}));

        assert_eq!(session.refresh_session().await.unwrap(), "a-2");
        assert_eq!(session.api().bearer().as_deref(), Some("a-2"));
        assert_eq!(store.snapshot().get(ACCESS_KEY).map(String::as_str), Some("a-2"));
    }

    #[tokio::test]
    async fn refresh_session_without_user_does_not_attach() {
        let (transport, store, session) = setup(&[(REFRESH_KEY, "r-1")]);
        transport.reply(HttpMethod::Post, REFRESH_PATH, 200, json!({"access": "a-2"}));

        session.refresh_session().await.unwrap();
        assert!(!session.api().has_bearer());
        assert_eq!(store.snapshot().get(ACCESS_KEY).map(String::as_str), Some("a-2"));
    }

    #[tokio::test]
    async fn logout_clears_even_when_backend_fails() {
        let (transport, store, session) = logged_in().await;
        transport.reply(HttpMethod::Post, LOGOUT_PATH, 500, Value::Null);

        session.logout().await;

        assert!(store.snapshot().is_empty());
        assert!(session.current_user().is_none());
        assert!(!session.api().has_bearer());
        let logout_request = transport.requests().pop().unwrap();
        assert_eq!(logout_request.path, LOGOUT_PATH);
        assert_eq!(logout_request.bearer.as_deref(), Some("a-1"));
    }

    //--- profile updates ---------------------------------------------------------------

    #[tokio::test]
    async fn update_requires_a_logged_in_user() {
        let (_transport, _store, session) = setup(&[]);
        let err = session.update_user(UserUpdate::default()).await.unwrap_err();
        assert!(matches!(err, SessionError::NotLoggedIn));
        assert_eq!(err.to_string(), "No user is currently logged in");
    }

    #[tokio::test]
    async fn update_merges_the_server_response() {
        let (transport, _store, session) = logged_in().await;
        transport.reply(
            HttpMethod::Patch,
            "/profile/1/",
            200,
            json!({"city": "Bergen", "updated_at": "2024-06-01T12:00:00Z"}),
        );

        let updated = session
            .update_user(UserUpdate {
                city: Some("Trondheim".into()),
                phone_number: Some("555-0199".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(updated.city.as_deref(), Some("Bergen"));
        assert_eq!(updated.phone_number.as_deref(), Some("555-0199"));
        assert!(updated.updated_at.is_some());
        assert_eq!(session.current_user(), Some(updated));

        let patch = transport.requests().pop().unwrap();
        assert_eq!(
            patch.body,
            RequestBody::Json(json!({"phone_number": "555-0199", "city": "Trondheim"}))
        );
    }

    #[tokio::test]
    async fn update_is_applied_before_the_server_answers() {
        let (transport, _store, session) = logged_in().await;
        let reply = transport.defer(HttpMethod::Patch, "/profile/1/");

        let pending = session.update_user(UserUpdate {
            city: Some("Tromsø".into()),
            ..Default::default()
        });
        tokio::pin!(pending);
        assert!(futures::poll!(&mut pending).is_pending());
        assert_eq!(session.current_user().unwrap().city.as_deref(), Some("Tromsø"));

        reply.send(Ok(coaching_admin_core::ports::ApiResponse::new(200, json!({})))).unwrap();
        pending.await.unwrap();
    }

    #[tokio::test]
    async fn failed_update_restores_the_server_copy() {
        let (transport, _store, session) = logged_in().await;
        transport.reply(HttpMethod::Patch, "/profile/1/", 400, json!({"city": ["too long"]}));
        transport.reply(HttpMethod::Get, PROFILE_PATH, 200, profile());

        let err = session
            .update_user(UserUpdate {
                city: Some("x".repeat(500)),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Port(PortError::BadRequest(_))));
        assert_eq!(session.current_user().unwrap().city.as_deref(), Some("Oslo"));
    }

    #[tokio::test]
    async fn invalid_update_is_rejected_locally() {
        let (transport, _store, session) = logged_in().await;
        let before = transport.requests().len();

        let err = session
            .update_user(UserUpdate {
                email: Some("not-an-email".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Validation(_)));
        assert_eq!(transport.requests().len(), before);
        assert_eq!(session.current_user().unwrap().email, "admin@example.com");
    }

    #[tokio::test]
    async fn refresh_user_logs_out_when_profile_is_gone() {
        let (transport, store, session) = logged_in().await;
        transport.reply(HttpMethod::Get, PROFILE_PATH, 404, Value::Null);

        assert_eq!(session.refresh_user().await.unwrap(), None);
        assert!(!session.is_authenticated());
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn refresh_user_propagates_other_errors() {
        let (transport, _store, session) = logged_in().await;
        transport.reply(HttpMethod::Get, PROFILE_PATH, 502, Value::Null);

        assert!(matches!(
            session.refresh_user().await,
            Err(SessionError::Port(PortError::Status { status: 502, .. }))
        ));
        assert!(session.is_authenticated());
    }

    //--- forced logout -----------------------------------------------------------------

    #[tokio::test]
    async fn rejected_session_token_forces_logout() {
        let (transport, store, session) = logged_in().await;
        let watcher = session.watch_unauthorized();
        tokio::task::yield_now().await;

        transport.reply(HttpMethod::Get, "/courses/", 401, Value::Null);
        let _ = session.api().get::<Value>("/courses/").await;

        for _ in 0..50 {
            if !session.is_authenticated() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(!session.is_authenticated());
        assert!(store.snapshot().is_empty());
        assert_consistent(&session);
        watcher.abort();
    }

    #[tokio::test]
    async fn rejected_token_during_restore_does_not_force_logout() {
        let (transport, _store, session) = logged_in().await;
        let watcher = session.watch_unauthorized();
        tokio::task::yield_now().await;
        let profile_reply = transport.defer(HttpMethod::Get, PROFILE_PATH);

        let restoring = session.restore_session();
        tokio::pin!(restoring);
        assert!(futures::poll!(&mut restoring).is_pending());
        assert!(session.is_restoring());
        assert!(session.snapshot().is_restoring);

        transport.reply(HttpMethod::Get, "/courses/", 401, Value::Null);
        let _ = session.api().get::<Value>("/courses/").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(session.is_authenticated());

        profile_reply
            .send(Ok(coaching_admin_core::ports::ApiResponse::new(200, profile())))
            .unwrap();
        restoring.await;

        assert!(session.is_authenticated());
        assert!(!session.is_restoring());
        assert_consistent(&session);
        watcher.abort();
    }

    //--- late refresh responses --------------------------------------------------------

    #[tokio::test]
    async fn refreshed_token_arriving_after_logout_is_dropped() {
        let (transport, store, session) = logged_in().await;
        let reply = transport.defer(HttpMethod::Post, REFRESH_PATH);

        let refreshing = session.refresh_session();
        tokio::pin!(refreshing);
        assert!(futures::poll!(&mut refreshing).is_pending());

        session.logout().await;
        reply
            .send(Ok(coaching_admin_core::ports::ApiResponse::new(200, json!({"access": "a-2"}))))
            .unwrap();

        assert!(matches!(
            refreshing.await,
            Err(SessionError::Port(PortError::Unauthorized))
        ));
        assert!(store.snapshot().is_empty());
        assert!(!session.api().has_bearer());
        assert_consistent(&session);
    }

    #[tokio::test]
    async fn logout_during_restore_refresh_keeps_store_empty() {
        let (transport, store, session) = setup(&[(ACCESS_KEY, "stale"), (REFRESH_KEY, "r-1")]);
        transport.reply(HttpMethod::Get, PROFILE_PATH, 401, Value::Null);
        let reply = transport.defer(HttpMethod::Post, REFRESH_PATH);

        let restoring = session.restore_session();
        tokio::pin!(restoring);
        assert!(futures::poll!(&mut restoring).is_pending());

        session.logout().await;
        reply
            .send(Ok(coaching_admin_core::ports::ApiResponse::new(200, json!({"access": "a-2"}))))
            .unwrap();
        restoring.await;

        assert!(store.snapshot().is_empty());
        assert!(!session.is_authenticated());
        assert!(!session.is_restoring());
        assert_eq!(transport.count(HttpMethod::Get, PROFILE_PATH), 1);
    }

    //--- rollback without a server copy ------------------------------------------------

    #[tokio::test]
    async fn failed_update_is_rolled_back_when_profile_cannot_be_reloaded() {
        let (transport, _store, session) = logged_in().await;
        transport.fail(HttpMethod::Patch, "/profile/1/", PortError::Network("offline".into()));
        transport.fail(HttpMethod::Get, PROFILE_PATH, PortError::Network("offline".into()));

        let err = session
            .update_user(UserUpdate {
                city: Some("Unsaved".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Port(PortError::Network(_))));
        assert_eq!(session.current_user().unwrap().city.as_deref(), Some("Oslo"));
    }
}
