use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use tracing::trace;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::Rejection;
use warp::Reply;

use crate::engine::SyncEngine;
use crate::errors::DeliveryError;
use crate::feed::ChangeEvent;
use crate::metrics::POLL_REQUESTS;
use crate::notifier::NotifierId;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollQuery {
    /// Listener asking; its latest fragment is returned when it is current
    pub listener: Option<String>,
    /// Return the retained events after this sequence number instead
    pub since: Option<u64>,
}

/// Body of a `?since=` poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollEvents {
    pub id: NotifierId,
    pub events: Vec<ChangeEvent>,
}

pub(super) async fn poll_handler(
    notifier_id: String,
    query: PollQuery,
    engine: Arc<SyncEngine>,
) -> Result<Response, Rejection> {
    trace!(%notifier_id, ?query, "poll");

    if let Some(listener_id) = &query.listener {
        engine.registry().touch_listener(listener_id);
    }

    let feed = engine.feed();
    let response = match query.since {
        Some(seq) => feed.since(&notifier_id, seq).map(|events| {
            warp::reply::json(&PollEvents {
                id: notifier_id.clone(),
                events,
            })
            .into_response()
        }),
        None => feed
            .snapshot(&notifier_id, query.listener.as_deref())
            .map(|snapshot| warp::reply::json(&snapshot).into_response()),
    };

    match response {
        Some(response) => {
            POLL_REQUESTS.with_label_values(&["hit"]).inc();
            Ok(response)
        }
        None => {
            POLL_REQUESTS.with_label_values(&["unknown"]).inc();
            let body = json!({ "error": DeliveryError::UnknownNotifier(notifier_id).to_string() });
            Ok(warp::reply::with_status(warp::reply::json(&body), StatusCode::NOT_FOUND).into_response())
        }
    }
}
