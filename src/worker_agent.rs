//! Web Worker agent hosting the planner service off the UI thread.

use crate::assets::DatasetLoader;
use crate::config::QUERY_CACHE_CAPACITY;
use crate::protocol::{ReplyEnvelope, RequestEnvelope, WorkerReply, WorkerRequest};
use crate::service::{serve, PlannerService};
use futures::StreamExt;
use std::rc::Rc;
use yew_agent::reactor::{reactor, ReactorScope};

thread_local! {
    /// One engine and query cache per worker, shared by every bridge.
    static SERVICE: Rc<PlannerService> = Rc::new(PlannerService::new(
        Rc::new(DatasetLoader::default()),
        QUERY_CACHE_CAPACITY,
    ));
}

/// Worker reactor answering correlated planner requests.
///
/// Each connected bridge gets its own reactor instance; all of them share the
/// thread's [`PlannerService`], so the engine is still built only once.
#[reactor]
pub async fn PlannerTask(
    scope: ReactorScope<RequestEnvelope<WorkerRequest>, ReplyEnvelope<WorkerReply>>,
) {
    let service = SERVICE.with(Rc::clone);
    let (replies, requests) = scope.split();
    serve(&service, requests, replies).await;
}
