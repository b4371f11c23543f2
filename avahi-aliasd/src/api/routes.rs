use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tokio::sync::watch;
use crate::aliases::store::Snapshot;
use shared::protocol::API_PREFIX;
use shared::types::{AliasEntry, ResourceEntry};

#[derive(Clone)]
pub struct AppState {
    pub snapshot_rx: watch::Receiver<Snapshot>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(&format!("{}/aliases", API_PREFIX), get(get_aliases))
        .route(&format!("{}/aliases/hash", API_PREFIX), get(get_hash))
        .route(&format!("{}/resources", API_PREFIX), get(get_resources))
        .route(&format!("{}/resources/:uid", API_PREFIX), get(get_resource))
        .with_state(state)
}

async fn get_aliases(State(state): State<AppState>) -> Json<Vec<AliasEntry>> {
    Json(state.snapshot_rx.borrow().aliases.clone())
}

async fn get_hash(State(state): State<AppState>) -> String {
    state.snapshot_rx.borrow().hash.clone()
}

async fn get_resources(State(state): State<AppState>) -> Json<Vec<ResourceEntry>> {
    Json(state.snapshot_rx.borrow().resources.clone())
}

async fn get_resource(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<ResourceEntry>, StatusCode> {
    state
        .snapshot_rx
        .borrow()
        .resources
        .iter()
        .find(|resource| resource.uid == uid)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
