//! HTTP Request Handlers
//!
//! Liveness ping and query endpoints. Heartbeat writes are lock-free and
//! never touch a task.

use super::protocol::*;
use super::tracker::HeartbeatTracker;
use crate::tasks::types::now_ms;
use crate::wallet::handlers::session_from_headers;
use crate::wallet::protocol::ErrorResponse;

use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use std::sync::Arc;

/// Liveness ping. The worker id comes from the body or, failing that, the
/// caller's session.
pub async fn handle_heartbeat(
    headers: HeaderMap,
    Extension(tracker): Extension<Arc<HeartbeatTracker>>,
    body: Option<Json<HeartbeatRequest>>,
) -> Result<Json<HeartbeatResponse>, (StatusCode, Json<ErrorResponse>)> {
    let from_body = body.and_then(|Json(req)| req.worker_id);
    let Some(worker_id) = from_body.or_else(|| session_from_headers(&headers)) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("missing worker id")),
        ));
    };

    let server_time = tracker.heartbeat(&worker_id);
    Ok(Json(HeartbeatResponse {
        ok: true,
        server_time,
    }))
}

/// Liveness query for a specific worker.
pub async fn handle_worker_online(
    Path(worker_id): Path<String>,
    Extension(tracker): Extension<Arc<HeartbeatTracker>>,
) -> Json<OnlineResponse> {
    match tracker.last_heartbeat(&worker_id) {
        Some(last) => Json(OnlineResponse {
            online: true,
            last_heartbeat: Some(last),
            age_ms: Some(now_ms().saturating_sub(last)),
        }),
        None => Json(OnlineResponse {
            online: false,
            last_heartbeat: None,
            age_ms: None,
        }),
    }
}
