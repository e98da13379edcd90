use crate::api::extract::UserId;
use crate::api::state::AppState;
use crate::error::Result;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::{Json, Router};
use axum::routing::{get, post, put};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::instrument;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/nodes/claim", post(claim))
        .route("/nodes/ping", post(ping))
        .route("/nodes", get(list_mine))
        .route("/nodes/public", get(list_public))
        .route("/nodes/:id/visibility", put(set_visibility))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    pub public_key: String,
    pub name: String,
}

#[instrument(skip(state, body))]
async fn claim(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(body): Json<ClaimRequest>,
) -> Result<impl IntoResponse> {
    let node = state.registry.claim(&body.public_key, &body.name, &user_id).await?;
    Ok(Json(
        json!({ "success": true, "nodeId": node.node_id, "status": node.status }),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingRequest {
    #[serde(flatten)]
    pub envelope: crate::identity::SignatureEnvelope,
    pub capabilities: Option<Value>,
    pub active_jobs: Option<i64>,
    pub max_concurrent_jobs: Option<i64>,
}

#[instrument(skip(state, body))]
async fn ping(State(state): State<AppState>, Json(body): Json<PingRequest>) -> Result<impl IntoResponse> {
    let verified = state.registry.authenticate(&body.envelope, state.now_ms()).await?;

    let mut extras = serde_json::Map::new();
    if let Some(caps) = body.capabilities {
        extras.insert("capabilities".into(), caps);
    }
    if let Some(active) = body.active_jobs {
        extras.insert("activeJobs".into(), json!(active));
    }
    if let Some(max) = body.max_concurrent_jobs {
        extras.insert("maxConcurrentJobs".into(), json!(max));
    }

    state
        .registry
        .ping(&verified.node_id, &verified.public_key, Some(Value::Object(extras)))
        .await?;

    Ok(Json(json!({ "success": true, "status": "online" })))
}

#[instrument(skip(state))]
async fn list_mine(State(state): State<AppState>, UserId(user_id): UserId) -> Result<impl IntoResponse> {
    let nodes = state.registry.list_for_user(&user_id).await?;
    Ok(Json(json!({ "nodes": nodes })))
}

#[instrument(skip(state))]
async fn list_public(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let (nodes, total_online) = state.registry.list_public(100).await?;
    Ok(Json(json!({ "nodes": nodes, "totalOnline": total_online })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityRequest {
    pub is_public: bool,
}

#[instrument(skip(state, body))]
async fn set_visibility(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    UserId(user_id): UserId,
    Json(body): Json<VisibilityRequest>,
) -> Result<impl IntoResponse> {
    let node = state
        .registry
        .set_visibility(&node_id, &user_id, body.is_public)
        .await?;
    Ok(Json(json!({ "success": true, "isPublic": node.is_public })))
}
