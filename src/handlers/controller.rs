//! Controller HTTP handlers: operator-facing deployment CRUD.
//!
//! Applying a spec only records the desired state; the reconciler picks it
//! up on its next tick and fans out to the fleet. Status on the returned
//! objects is therefore always the last observed state, not a synchronous
//! result.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{info, instrument};

use crate::deployment::{Deployment, DeploymentSpec};
use crate::error::Error;
use crate::state::SharedControllerState;

pub fn controller_router(state: SharedControllerState) -> Router {
    Router::new()
        .route("/deployments", post(apply_handler).get(list_handler))
        .route("/deployments/{name}", get(get_handler).delete(delete_handler))
        .with_state(state)
}

#[instrument(skip(state, spec), fields(name = %spec.name))]
async fn apply_handler(
    State(state): State<SharedControllerState>,
    Json(spec): Json<DeploymentSpec>,
) -> Result<impl IntoResponse, Error> {
    if spec.name.is_empty() {
        return Err(Error::validation("name", "must not be empty"));
    }
    if spec.map.is_empty() {
        return Err(Error::validation("map", "must not be empty"));
    }

    let name = spec.name.clone();
    let version = state.store.apply(spec).await;
    info!("deployment '{}' applied at version {}", name, version);
    Ok((
        StatusCode::OK,
        Json(json!({ "name": name, "version": version })),
    ))
}

async fn list_handler(State(state): State<SharedControllerState>) -> Json<Vec<Deployment>> {
    let deployments = state
        .store
        .list()
        .await
        .into_iter()
        .map(|stored| stored.deployment)
        .collect();
    Json(deployments)
}

async fn get_handler(
    State(state): State<SharedControllerState>,
    Path(name): Path<String>,
) -> Result<Json<Deployment>, Error> {
    state
        .store
        .get(&name)
        .await
        .map(|stored| Json(stored.deployment))
        .ok_or_else(|| Error::not_found("deployment", name))
}

/// Marks the deployment Terminating, unregisters it from every node
/// best-effort and removes the object.
#[instrument(skip(state))]
async fn delete_handler(
    State(state): State<SharedControllerState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, Error> {
    state.reconciler.teardown(&name).await?;
    Ok((StatusCode::OK, "deleted"))
}
