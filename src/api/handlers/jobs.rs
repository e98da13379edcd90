use crate::api::extract::UserId;
use crate::api::state::AppState;
use crate::domain::{Job, JobStatus};
use crate::error::{CoordinatorError, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::instrument;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(submit))
        .route("/jobs/poll", post(poll))
        .route("/jobs/stats", get(stats))
        .route("/jobs/check-timeouts", post(check_timeouts))
        .route("/jobs/cleanup", post(cleanup))
        .route("/jobs/:id", get(get_result))
        .route("/jobs/:id/heartbeat", post(heartbeat))
        .route("/jobs/:id/chunks", post(store_chunk))
        .route("/jobs/:id/complete", post(complete))
        .route("/jobs/:id/fail", post(fail))
        .route("/jobs/:id/cancel", post(cancel))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub options: Option<Value>,
    pub priority: Option<i64>,
    pub max_tokens: Option<i64>,
    pub temperature: Option<f64>,
}

#[instrument(skip(state, body))]
async fn submit(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(body): Json<SubmitRequest>,
) -> Result<impl IntoResponse> {
    if body.prompt.is_empty() {
        return Err(CoordinatorError::BadRequest("prompt is required".into()));
    }

    let now = state.now_ms();
    let job = Job {
        id: new_job_id(now),
        prompt: body.prompt,
        model: body.model.unwrap_or_else(|| state.config.default_model.clone()),
        options: body.options.unwrap_or_else(|| json!({})),
        priority: body.priority.unwrap_or(state.config.default_priority),
        max_tokens: body.max_tokens.unwrap_or(state.config.default_max_tokens),
        temperature: body.temperature.unwrap_or(state.config.default_temperature),
        user_id,
        status: JobStatus::Pending,
        created_at: now,
        updated_at: now,
        assigned_to: None,
        assigned_at: None,
        started_at: None,
        last_heartbeat: None,
        last_chunk_at: None,
        chunk_count: 0,
        last_metrics: None,
        result: None,
        failure_reason: None,
        attempts: 0,
        timeout_reason: None,
    };

    state.jobs.create(&job).await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "job": job }))))
}

/// Time-based prefix plus a random suffix — sortable-ish by creation
/// time without needing a shared counter.
fn new_job_id(now_ms: i64) -> String {
    format!("job_{now_ms}_{}", uuid::Uuid::new_v4().simple())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRequest {
    #[serde(flatten)]
    pub envelope: crate::identity::SignatureEnvelope,
    pub max_jobs: Option<usize>,
}

#[instrument(skip(state, body))]
async fn poll(State(state): State<AppState>, Json(body): Json<PollRequest>) -> Result<impl IntoResponse> {
    let verified = state.registry.authenticate(&body.envelope, state.now_ms()).await?;

    let max_jobs = body.max_jobs.unwrap_or(1).max(0);
    let jobs = state.scheduler.assign(&verified.node_id, max_jobs).await?;
    Ok(Json(json!({ "success": true, "jobs": jobs })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeOnly {
    #[serde(flatten)]
    pub envelope: crate::identity::SignatureEnvelope,
}

#[instrument(skip(state, body))]
async fn heartbeat(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(body): Json<EnvelopeOnly>,
) -> Result<impl IntoResponse> {
    let verified = state.registry.authenticate(&body.envelope, state.now_ms()).await?;
    state.sweeper.heartbeat(&job_id, &verified.node_id).await?;
    Ok(Json(json!({ "success": true, "timestamp": state.now_ms() })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRequest {
    #[serde(flatten)]
    pub envelope: crate::identity::SignatureEnvelope,
    pub chunk_index: u64,
    pub content: String,
    pub metrics: Option<Value>,
    pub is_final: Option<bool>,
}

#[instrument(skip(state, body))]
async fn store_chunk(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(body): Json<ChunkRequest>,
) -> Result<impl IntoResponse> {
    let verified = state.registry.authenticate(&body.envelope, state.now_ms()).await?;
    let index = state
        .chunks
        .store_chunk(&job_id, &verified.node_id, body.chunk_index, body.content, body.metrics)
        .await?;
    // `is_final` is accepted for wire compatibility but is advisory only;
    // the authoritative terminal signal is a separate `complete` call.
    let _ = body.is_final;
    Ok(Json(json!({ "success": true, "chunkIndex": index })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    #[serde(flatten)]
    pub envelope: crate::identity::SignatureEnvelope,
    pub final_output: Option<String>,
}

#[instrument(skip(state, body))]
async fn complete(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(body): Json<CompleteRequest>,
) -> Result<impl IntoResponse> {
    let verified = state.registry.authenticate(&body.envelope, state.now_ms()).await?;
    let job = state.chunks.complete(&job_id, &verified.node_id, body.final_output).await?;
    Ok(Json(json!({ "success": true, "job": job })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailRequest {
    #[serde(flatten)]
    pub envelope: crate::identity::SignatureEnvelope,
    pub error: String,
}

#[instrument(skip(state, body))]
async fn fail(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(body): Json<FailRequest>,
) -> Result<impl IntoResponse> {
    let verified = state.registry.authenticate(&body.envelope, state.now_ms()).await?;
    let job = state.chunks.fail(&job_id, &verified.node_id, body.error).await?;
    Ok(Json(json!({ "success": true, "job": job })))
}

#[instrument(skip(state))]
async fn get_result(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<impl IntoResponse> {
    let job = state.jobs.require(&job_id).await?;

    let (partial, chunks) = if job.status == JobStatus::Running || job.status == JobStatus::Assigned {
        let ordered = state.chunks.read_ordered(&job_id).await?;
        let concatenated = ordered.iter().map(|c| c.content.as_str()).collect::<String>();
        (Some(concatenated), Some(ordered))
    } else {
        (None, None)
    };

    Ok(Json(json!({
        "success": true,
        "jobId": job.id,
        "status": job.status,
        "result": job.result,
        "failureReason": job.failure_reason,
        "partial": partial,
        "chunks": chunks,
        "metrics": job.last_metrics,
        "chunkCount": job.chunk_count,
    })))
}

#[instrument(skip(state))]
async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let pending = state.jobs.queue_len("pending").await?;
    let assigned = state.jobs.queue_len("assigned").await?;
    let completed = state.jobs.queue_len("completed").await?;
    let failed = state.jobs.queue_len("failed").await?;
    let running = state.jobs.running_count().await?;

    Ok(Json(json!({
        "success": true,
        "stats": {
            "pending": pending,
            "assigned": assigned,
            "running": running,
            "completed": completed,
            "failed": failed,
        }
    })))
}

#[instrument(skip(state))]
async fn check_timeouts(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let reclaimed = state.sweeper.sweep(state.config.heartbeat_stale_after).await?;
    Ok(Json(json!({ "success": true, "timeoutJobs": reclaimed })))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRequest {
    #[serde(default)]
    pub max_age_ms: Option<i64>,
}

#[instrument(skip(state, body))]
async fn cleanup(
    State(state): State<AppState>,
    UserId(_user_id): UserId,
    Json(body): Json<CleanupRequest>,
) -> Result<impl IntoResponse> {
    let max_age_ms = body
        .max_age_ms
        .unwrap_or(state.config.cleanup_max_age_default.as_millis() as i64);
    let horizon = state.now_ms() - max_age_ms;

    let mut cleaned = 0;
    for queue in ["completed", "failed"] {
        for id in state.jobs.queue_older_than(queue, horizon).await? {
            state.jobs.delete(&id).await?;
            cleaned += 1;
        }
    }

    Ok(Json(json!({ "success": true, "cleaned": cleaned })))
}

#[instrument(skip(state))]
async fn cancel(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    UserId(user_id): UserId,
) -> Result<impl IntoResponse> {
    let mut job = state.jobs.require(&job_id).await?;
    if job.user_id != user_id {
        return Err(CoordinatorError::Forbidden(
            "only the submitting user may cancel this job".into(),
        ));
    }

    if matches!(job.status, JobStatus::Completed | JobStatus::Failed) {
        return Ok(Json(json!({ "success": true, "job": job })));
    }

    let from_status = job.status;
    let now = state.now_ms();
    job.status = JobStatus::Failed;
    job.failure_reason = Some("cancelled_by_user".to_string());
    job.updated_at = now;

    state.jobs.move_queue(&job_id, from_status, JobStatus::Failed, now as f64).await?;
    state.jobs.write(&job).await?;
    state.jobs.unmark_running(&job_id).await?;
    if let Some(holder) = &job.assigned_to {
        state.lock.release(&job_id, holder).await?;
    }

    Ok(Json(json!({ "success": true, "job": job })))
}

