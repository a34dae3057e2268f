use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// A pending call to a sensitive tool, shown to whoever approves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub tool_name: String,
    pub params:    HashMap<String, serde_json::Value>,
}

type ApprovalFn = dyn Fn(ApprovalRequest) -> BoxFuture<'static, bool> + Send + Sync;

/// Async yes/no gate consulted before a sensitive tool runs.
pub struct ApprovalCallback(pub Arc<ApprovalFn>);

impl ApprovalCallback {
    /// Wrap a blocking decision, e.g. a policy check or a terminal prompt.
    ///
    /// The closure runs on the blocking pool, so an approval timeout still
    /// fires while it waits. A panicking closure counts as a denial.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(ApprovalRequest) -> bool + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self(Arc::new(move |req| {
            let f = Arc::clone(&f);
            async move {
                tokio::task::spawn_blocking(move || f(req))
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!(error = %e, "approval callback failed, denying");
                        false
                    })
            }
            .boxed()
        }))
    }

    /// Wrap an async decision, e.g. a round-trip to a reviewer.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(ApprovalRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Self(Arc::new(move |req| f(req).boxed()))
    }

    pub fn request(&self, req: ApprovalRequest) -> BoxFuture<'static, bool> {
        (self.0)(req)
    }
}

impl std::fmt::Debug for ApprovalCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<callback>")
    }
}

impl Clone for ApprovalCallback {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str) -> ApprovalRequest {
        ApprovalRequest { tool_name: name.to_string(), params: HashMap::new() }
    }

    #[tokio::test]
    async fn sync_callback_sees_tool_name() {
        let cb = ApprovalCallback::from_fn(|req| req.tool_name == "read_file");
        assert!(cb.request(request("read_file")).await);
        assert!(!cb.request(request("delete_file")).await);
    }

    #[tokio::test]
    async fn panicking_sync_callback_denies() {
        let cb = ApprovalCallback::from_fn(|_| panic!("reviewer crashed"));
        assert!(!cb.request(request("x")).await);
    }

    #[tokio::test]
    async fn async_callback_is_awaited() {
        let cb = ApprovalCallback::from_async(|_req| async {
            tokio::task::yield_now().await;
            true
        });
        assert!(cb.clone().request(request("x")).await);
    }
}
