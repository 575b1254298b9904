//! Per-request correlation id, visible to everything running inside
//! the request's task

use std::future::Future;

tokio::task_local!
{   static REQUEST_ID: String;
}

/// Run `future` with `request_id` as the current request id
pub async fn with_request_id<F>(request_id: String, future: F) -> F::Output
where
  F: Future
{   REQUEST_ID.scope(request_id, future).await
}

/// Id of the request being served, if any
pub fn current_request_id() -> Option<String>
{   REQUEST_ID.try_with(|id| id.clone()).ok()
}
