//! Agent HTTP handlers: the per-node surface the controller fans out to.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::api::{LoadQuery, RegisterRequest, UnregisterRequest};
use crate::error::Error;
use crate::registry::ProgramEntry;
use crate::state::SharedAgentState;

pub fn agent_router(state: SharedAgentState) -> Router {
    Router::new()
        .route("/load", get(load_handler))
        .route("/register", post(register_handler))
        .route("/unregister", delete(unregister_handler))
        .route("/programs", get(programs_handler))
        .route("/program/{name}", get(program_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Compiles and attaches the requested program, then records it. Duplicate
/// names are a failure at load time.
#[instrument(skip(state, query), fields(name = %query.name))]
async fn load_handler(
    State(state): State<SharedAgentState>,
    Query(query): Query<LoadQuery>,
) -> Result<impl IntoResponse, Error> {
    if query.name.is_empty() {
        return Err(Error::validation("name", "must not be empty"));
    }
    if state.programs.get(&query.name).is_some() {
        return Err(Error::already_exists("program", query.name));
    }

    let spec = crate::loader::LoadSpec {
        name: query.name.clone(),
        target: query.target,
        kind: query.kind,
        code: query.code,
        program: query.program,
    };
    if let Err(e) = state.loader.load(&spec).await {
        warn!("loading '{}' failed: {:#}", query.name, e);
        return Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("load failed: {e:#}"),
        ));
    }

    state.programs.add(ProgramEntry::loaded(&query.name))?;
    info!("program '{}' loaded", query.name);
    Ok((StatusCode::OK, "loaded".to_string()))
}

/// Registers the metric instrument and completes the program entry with the
/// pinned-map path and kind. Re-registering the same name is a no-op success.
#[instrument(skip(state, request), fields(name = %request.name))]
async fn register_handler(
    State(state): State<SharedAgentState>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, Error> {
    if request.name.is_empty() {
        return Err(Error::validation("name", "must not be empty"));
    }
    if request.path.is_empty() {
        return Err(Error::validation("path", "must not be empty"));
    }

    state
        .metrics
        .register_metric(&request.name, &request.help, request.kind, &request.labels)?;

    state.programs.upsert(ProgramEntry {
        name: request.name.clone(),
        path: Some(request.path),
        kind: Some(request.kind),
    });
    info!("metric '{}' registered ({})", request.name, request.kind);
    Ok((StatusCode::OK, "registered"))
}

/// Removes the program entry and unpins its artifacts. Idempotent.
#[instrument(skip(state, request), fields(name = %request.name))]
async fn unregister_handler(
    State(state): State<SharedAgentState>,
    Json(request): Json<UnregisterRequest>,
) -> Result<impl IntoResponse, Error> {
    if request.name.is_empty() {
        return Err(Error::validation("name", "must not be empty"));
    }

    state.programs.remove(&request.name);
    if let Err(e) = state.loader.unload(&request.name).await {
        warn!("unloading '{}' failed: {:#}", request.name, e);
    }
    info!("program '{}' unregistered", request.name);
    Ok((StatusCode::OK, "unregistered"))
}

async fn programs_handler(State(state): State<SharedAgentState>) -> Json<Vec<ProgramEntry>> {
    Json(state.programs.list())
}

/// Returns the entry, or an empty object for unknown names.
async fn program_handler(
    State(state): State<SharedAgentState>,
    Path(name): Path<String>,
) -> Json<serde_json::Value> {
    match state.programs.get(&name) {
        Some(entry) => Json(json!(entry)),
        None => Json(json!({})),
    }
}

async fn metrics_handler(
    State(state): State<SharedAgentState>,
) -> Result<impl IntoResponse, Error> {
    let body = state.metrics.encode_text()?;
    Ok(([("Content-Type", "text/plain; version=0.0.4")], body))
}
