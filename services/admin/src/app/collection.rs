//! services/admin/src/app/collection.rs
//!
//! `RemoteCollection<R>` caches one resource type for the lifetime of a view
//! and mediates its create/read/update/delete traffic. Responses are applied
//! in the order they arrive. Once the owning view closes the collection,
//! pending operations resolve to `CollectionError::Detached` and their
//! results are dropped.

use coaching_admin_core::payload::Payload;
use coaching_admin_core::ports::{PortError, PortResult};
use coaching_admin_core::resource::Resource;
use coaching_admin_core::validation::{Validate, ValidationErrors};
use coaching_admin_core::view::{ListPage, ListQuery};
use coaching_admin_core::RecordId;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::app::client::ApiClient;

#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    /// The backend call failed; `message` is the text shown to the user.
    #[error("{message}")]
    Request {
        message: String,
        #[source]
        source: PortError,
    },
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationErrors),
    #[error("Collection was closed")]
    Detached,
}

impl CollectionError {
    pub fn port_error(&self) -> Option<&PortError> {
        match self {
            CollectionError::Request { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type CollectionResult<T> = Result<T, CollectionError>;

struct CollectionState<R> {
    items: Vec<R>,
    focused: Option<R>,
    /// Operations in flight.
    loading: usize,
    last_error: Option<String>,
}

impl<R> Default for CollectionState<R> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            focused: None,
            loading: 0,
            last_error: None,
        }
    }
}

pub struct RemoteCollection<R: Resource> {
    api: ApiClient,
    state: Mutex<CollectionState<R>>,
    cancel: CancellationToken,
}

impl<R: Resource> RemoteCollection<R> {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            state: Mutex::new(CollectionState::default()),
            cancel: CancellationToken::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, CollectionState<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    //-------------------------------------------------------------------------------------
    // Snapshots
    //-------------------------------------------------------------------------------------

    /// Cached records in server order.
    pub fn items(&self) -> Vec<R> {
        self.state().items.clone()
    }

    pub fn focused_item(&self) -> Option<R> {
        self.state().focused.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state().loading > 0
    }

    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    pub fn clear_error(&self) {
        self.state().last_error = None;
    }

    pub fn get(&self, id: RecordId) -> Option<R> {
        self.state().items.iter().find(|item| item.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().items.is_empty()
    }

    /// Filters, sorts and pages the cache without reordering it.
    pub fn view(&self, query: &ListQuery) -> ListPage<R> {
        query.apply(&self.state().items)
    }

    //-------------------------------------------------------------------------------------
    // Lifetime
    //-------------------------------------------------------------------------------------

    /// Detaches the collection from its view. Pending operations stop waiting
    /// and nothing is applied afterwards.
    pub fn close(&self) {
        let _state = self.state();
        self.cancel.cancel();
        debug!(resource = R::PLURAL, "Collection closed");
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Runs `request` unless the collection is closed first, counting it as
    /// in flight meanwhile.
    async fn guarded<T, F>(&self, request: F) -> CollectionResult<PortResult<T>>
    where
        F: Future<Output = PortResult<T>>,
    {
        if self.is_closed() {
            return Err(CollectionError::Detached);
        }
        self.state().loading += 1;

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = request => Some(result),
        };

        let mut state = self.state();
        state.loading = state.loading.saturating_sub(1);
        match outcome {
            Some(result) if !self.cancel.is_cancelled() => Ok(result),
            _ => Err(CollectionError::Detached),
        }
    }

    /// Records a failed operation and builds the error returned to the caller.
    fn fail(&self, action: &str, noun: &str, source: PortError) -> CollectionError {
        let message = format!("Failed to {} {}", action, noun);
        error!(resource = R::PLURAL, error = %source, "{}", message);
        let mut state = self.state();
        if !self.cancel.is_cancelled() {
            state.last_error = Some(message.clone());
        }
        CollectionError::Request { message, source }
    }

    //-------------------------------------------------------------------------------------
    // Operations
    //-------------------------------------------------------------------------------------

    /// Replaces the cache with the server's list. On failure the previous
    /// items stay in place.
    pub async fn fetch_all(&self) -> CollectionResult<Vec<R>> {
        if !self.is_closed() {
            self.clear_error();
        }
        let path = R::collection_path();

        match self.guarded(self.api.get::<Vec<R>>(&path)).await? {
            Ok(items) => {
                let mut state = self.state();
                if self.cancel.is_cancelled() {
                    return Err(CollectionError::Detached);
                }
                state.items = items.clone();
                debug!(resource = R::PLURAL, count = items.len(), "Fetched");
                Ok(items)
            }
            Err(source) => Err(self.fail("fetch", R::PLURAL, source)),
        }
    }

    /// Loads one record into `focused_item`.
    pub async fn fetch_one(&self, id: RecordId) -> CollectionResult<R> {
        if !self.is_closed() {
            self.clear_error();
        }
        let path = R::item_path(id);

        match self.guarded(self.api.get::<R>(&path)).await? {
            Ok(item) => {
                let mut state = self.state();
                if self.cancel.is_cancelled() {
                    return Err(CollectionError::Detached);
                }
                state.focused = Some(item.clone());
                Ok(item)
            }
            Err(source) => Err(self.fail("fetch", R::SINGULAR, source)),
        }
    }

    /// Validates locally, then creates the record and puts it first.
    pub async fn create(&self, payload: R::Create) -> CollectionResult<R> {
        payload.validate()?;
        let path = R::collection_path();

        let request = async {
            let body = payload.to_body()?;
            self.api.post::<R>(&path, body).await
        };

        match self.guarded(request).await? {
            Ok(created) => {
                let mut state = self.state();
                if self.cancel.is_cancelled() {
                    return Err(CollectionError::Detached);
                }
                let id = created.id();
                state.items.retain(|item| item.id() != id);
                state.items.insert(0, created.clone());
                debug!(resource = R::PLURAL, id, "Created");
                Ok(created)
            }
            Err(source) => Err(self.fail("create", R::SINGULAR, source)),
        }
    }

    /// Sends a partial update and replaces the cached entry with the
    /// server's copy.
    pub async fn update(&self, id: RecordId, changes: R::Update) -> CollectionResult<R> {
        changes.validate()?;
        let path = R::item_path(id);

        let request = async {
            let body = changes.to_body()?;
            self.api.put::<R>(&path, body).await
        };

        match self.guarded(request).await? {
            Ok(updated) => {
                let mut state = self.state();
                if self.cancel.is_cancelled() {
                    return Err(CollectionError::Detached);
                }
                if let Some(slot) = state.items.iter_mut().find(|item| item.id() == id) {
                    *slot = updated.clone();
                }
                if let Some(focused) = state.focused.as_mut().filter(|item| item.id() == id) {
                    *focused = updated.clone();
                }
                debug!(resource = R::PLURAL, id, "Updated");
                Ok(updated)
            }
            Err(source) => Err(self.fail("update", R::SINGULAR, source)),
        }
    }

    /// Removes the cached entry once the backend confirms the delete.
    pub async fn delete(&self, id: RecordId) -> CollectionResult<()> {
        let path = R::item_path(id);

        match self.guarded(self.api.delete(&path)).await? {
            Ok(()) => {
                let mut state = self.state();
                if self.cancel.is_cancelled() {
                    return Err(CollectionError::Detached);
                }
                state.items.retain(|item| item.id() != id);
                if state.focused.as_ref().is_some_and(|item| item.id() == id) {
                    state.focused = None;
                }
                debug!(resource = R::PLURAL, id, "Deleted");
                Ok(())
            }
            Err(source) => Err(self.fail("delete", R::SINGULAR, source)),
        }
    }
}

impl<R: Resource> Drop for RemoteCollection<R> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
