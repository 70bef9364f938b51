//! HTTP handlers for the `/sync/*` contract plus the read-only reference
//! endpoints (spec §6). Each push operation is resolved inside the
//! conflict resolver's own transaction (`sync_server::resolve_operation`);
//! this layer's job is purely wire marshalling, SSE fan-out on success,
//! and the coarse auth gate wired in `lib.rs`.

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::{Json, Router};
use futures_util::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tracing::{info, warn};

use sync_server::protocol::{
    PullQuery, PullResponse, PushRequest, PushResponse, SnapshotOrder, SnapshotOrderLine,
    SnapshotResponse,
};
use sync_server::resolve_operation;

use crate::error::ApiError;
use crate::AppState;

pub fn router(state: AppState) -> Router {
    let gated = Router::new()
        .route("/partners", axum::routing::get(list_partners))
        .route("/products", axum::routing::get(list_products))
        .route("/units", axum::routing::get(list_units))
        .route("/sync/push", axum::routing::post(push))
        .route("/sync/pull", axum::routing::get(pull))
        .route("/sync/snapshot", axum::routing::get(snapshot))
        .route("/sync/events", axum::routing::get(events))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::auth::require_bearer_token,
        ));

    Router::new()
        .route("/healthz", axum::routing::get(healthz))
        .merge(gated)
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_partners(State(state): State<AppState>) -> Result<Json<Vec<sync_core::Partner>>, ApiError> {
    Ok(Json(state.db.partners().get_all().await?))
}

async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<sync_core::Product>>, ApiError> {
    Ok(Json(state.db.products().get_all().await?))
}

async fn list_units(State(state): State<AppState>) -> Result<Json<Vec<sync_core::Unit>>, ApiError> {
    Ok(Json(state.db.units().get_all().await?))
}

/// `POST /sync/push` (§6). Resolves every operation in the batch
/// independently — one op's business error never aborts the others
/// (§7 propagation policy) — and broadcasts an SSE notification for each
/// op the resolver actually logged (`success` or `conflict`; `error`
/// never reaches the change log).
async fn push(
    State(state): State<AppState>,
    Json(request): Json<PushRequest>,
) -> Result<Json<PushResponse>, ApiError> {
    let mut results = Vec::with_capacity(request.operations.len());

    for op in request.operations {
        let entity_type = op.entity_type;
        let entity_id = op.entity_id;
        let result = resolve_operation(&state.db, op).await?;

        if let Some(sync_id) = result.sync_id {
            state.broadcaster.notify_change(entity_type, entity_id, sync_id);
        }

        results.push(result);
    }

    Ok(Json(PushResponse { results }))
}

/// `GET /sync/pull?since=<int>&limit=<int>` (§6).
async fn pull(
    State(state): State<AppState>,
    Query(query): Query<PullQuery>,
) -> Result<Json<PullResponse>, ApiError> {
    let limit = query.limit.unwrap_or(state.config.default_pull_limit).max(1);
    let (entries, has_more) = state.db.change_log().fetch_since(query.since, limit).await?;

    let operations = entries
        .into_iter()
        .map(|e| sync_server::protocol::PullLogEntry {
            sync_id: e.sync_id,
            entity_type: e.entity_type,
            entity_id: e.entity_id,
            operation_type: e.op_type,
            data: e.data,
            timestamp: e.timestamp,
        })
        .collect();

    Ok(Json(PullResponse { operations, has_more }))
}

/// `GET /sync/snapshot` (§6). Returns the reference collections plus
/// every live entity, omitting `version` — a fresh snapshot always
/// starts its client-side rows at version 1.
async fn snapshot(State(state): State<AppState>) -> Result<Json<SnapshotResponse>, ApiError> {
    let partners = state.db.partners().get_all().await?;
    let products = state.db.products().get_all().await?;
    let units = state.db.units().get_all().await?;
    let orders: Vec<SnapshotOrder> = state.db.orders().get_all().await?.into_iter().map(Into::into).collect();
    let order_lines: Vec<SnapshotOrderLine> = state
        .db
        .order_lines()
        .get_all()
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    info!(
        partners = partners.len(),
        products = products.len(),
        units = units.len(),
        orders = orders.len(),
        order_lines = order_lines.len(),
        "served snapshot"
    );

    Ok(Json(SnapshotResponse {
        partners,
        products,
        units,
        orders,
        order_lines,
    }))
}

/// `GET /sync/events` (§6). Fans out change notifications plus a
/// keepalive ping on the configured interval; axum's `KeepAlive` covers
/// the comment-line variant, but the spec's `{event:"ping"}` payload is
/// an application-level frame, so it's interleaved explicitly.
async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let change_stream = sync_server::broadcast::subscriber_stream(state.broadcaster.subscribe())
        .map(|event| Ok(Event::default().json_data(event).unwrap_or_else(|e| {
            warn!(error = %e, "failed to serialize sse event");
            Event::default().data("{}")
        })));

    Sse::new(change_stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(state.config.sse_ping_interval_secs))
            .text(serde_json::to_string(&sync_server::protocol::SseSyncEvent::ping()).unwrap_or_default()),
    )
}
