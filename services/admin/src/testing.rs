//! A scripted `HttpTransport` for unit tests: replies are queued per
//! method and path and consumed in order.

use async_trait::async_trait;
use coaching_admin_core::ports::{
    ApiRequest, ApiResponse, HttpMethod, HttpTransport, PortError, PortResult,
};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

enum Reply {
    Ready(PortResult<ApiResponse>),
    Deferred(oneshot::Receiver<PortResult<ApiResponse>>),
}

#[derive(Default)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<HashMap<(HttpMethod, String), VecDeque<Reply>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, method: HttpMethod, path: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
    }

    pub(crate) fn reply(&self, method: HttpMethod, path: &str, status: u16, body: Value) {
        self.push(method, path, Reply::Ready(Ok(ApiResponse::new(status, body))));
    }

    pub(crate) fn fail(&self, method: HttpMethod, path: &str, error: PortError) {
        self.push(method, path, Reply::Ready(Err(error)));
    }

    /// Queues a reply that is only delivered once the returned sender fires.
    pub(crate) fn defer(
        &self,
        method: HttpMethod,
        path: &str,
    ) -> oneshot::Sender<PortResult<ApiResponse>> {
        let (tx, rx) = oneshot::channel();
        self.push(method, path, Reply::Deferred(rx));
        tx
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, method: HttpMethod, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: ApiRequest) -> PortResult<ApiResponse> {
        let key = (request.method, request.path.clone());
        self.requests.lock().unwrap().push(request);

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front);

        match reply {
            Some(Reply::Ready(result)) => result,
            Some(Reply::Deferred(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(PortError::Network("deferred reply dropped".into()))),
            None => Err(PortError::Network(format!(
                "no scripted reply for {} {}",
                key.0, key.1
            ))),
        }
    }
}
