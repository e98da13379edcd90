//! End-to-end tests driving the HTTP surface over an in-memory store,
//! covering the job lifecycle, authentication, and timeout-recovery
//! scenarios end to end.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use coordinator_core::api::{self, AppState};
use coordinator_core::config::CoordinatorConfig;
use coordinator_core::kv::MemoryStore;
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> axum::Router {
    app_with_state().0
}

fn app_with_state() -> (axum::Router, AppState) {
    let kv = Arc::new(MemoryStore::new());
    let state = AppState::new(kv, CoordinatorConfig::for_tests());
    (api::build(state.clone()), state)
}

async fn send(router: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = if bytes.is_empty() {
        json!(null)
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post(uri: &str, user_id: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user_id) = user_id {
        builder = builder.header("x-user-id", user_id);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, user_id: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(user_id) = user_id {
        builder = builder.header("x-user-id", user_id);
    }
    builder.body(Body::empty()).unwrap()
}

/// A fresh signing keypair plus the envelope fields a node attaches to
/// every authenticated request it makes.
struct Worker {
    signing_key: SigningKey,
    node_id: String,
    public_key_b64: String,
}

impl Worker {
    fn new(node_id: &str, public_key_b64: &str, signing_key: SigningKey) -> Self {
        Self {
            signing_key,
            node_id: node_id.to_string(),
            public_key_b64: public_key_b64.to_string(),
        }
    }

    fn envelope_at(&self, timestamp: i64) -> Value {
        let message = format!("{}:{}", self.node_id, timestamp);
        let signature = self.signing_key.sign(message.as_bytes());
        json!({
            "nodeId": self.node_id,
            "publicKey": self.public_key_b64,
            "signature": BASE64.encode(signature.to_bytes()),
            "timestamp": timestamp,
        })
    }

    fn envelope(&self) -> Value {
        self.envelope_at(coordinator_core::identity::now_ms())
    }
}

async fn claim_worker(router: &axum::Router, user_id: &str, name: &str) -> Worker {
    let signing_key = SigningKey::generate(&mut OsRng);
    let public_key_b64 = BASE64.encode(signing_key.verifying_key().to_bytes());

    let (status, body) = send(
        router,
        post("/nodes/claim", Some(user_id), json!({ "publicKey": public_key_b64, "name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "claim failed: {body:?}");
    let node_id = body["nodeId"].as_str().unwrap().to_string();
    Worker::new(&node_id, &public_key_b64, signing_key)
}

#[tokio::test]
async fn happy_path_single_worker() {
    let router = app();

    let (status, body) = send(
        &router,
        post("/jobs", Some("u1"), json!({ "prompt": "2+2?", "priority": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let job_id = body["job"]["id"].as_str().unwrap().to_string();

    let worker = claim_worker(&router, "u1", "w1").await;

    let mut poll_body = worker.envelope();
    poll_body["maxJobs"] = json!(1);
    let (status, body) = send(&router, post("/jobs/poll", None, poll_body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["jobs"][0]["id"].as_str().unwrap(), job_id);

    let mut chunk0 = worker.envelope();
    chunk0["chunkIndex"] = json!(0);
    chunk0["content"] = json!("The answer ");
    let (status, _) = send(&router, post(&format!("/jobs/{job_id}/chunks"), None, chunk0)).await;
    assert_eq!(status, StatusCode::OK);

    let mut chunk1 = worker.envelope();
    chunk1["chunkIndex"] = json!(1);
    chunk1["content"] = json!("is 4.");
    let (status, _) = send(&router, post(&format!("/jobs/{job_id}/chunks"), None, chunk1)).await;
    assert_eq!(status, StatusCode::OK);

    let complete = worker.envelope();
    let (status, _) = send(&router, post(&format!("/jobs/{job_id}/complete"), None, complete)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&router, get(&format!("/jobs/{job_id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["result"], "The answer is 4.");
}

#[tokio::test]
async fn priority_ordering_returns_higher_priority_job_first() {
    let router = app();

    send(&router, post("/jobs", Some("u1"), json!({ "prompt": "low", "priority": 0 }))).await;
    send(&router, post("/jobs", Some("u1"), json!({ "prompt": "high", "priority": 5 }))).await;

    let worker = claim_worker(&router, "u1", "w1").await;
    let mut poll_body = worker.envelope();
    poll_body["maxJobs"] = json!(1);
    let (status, body) = send(&router, post("/jobs/poll", None, poll_body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["jobs"][0]["prompt"], "high");
}

#[tokio::test]
async fn wrong_holder_rejection() {
    let router = app();

    let (_, body) = send(&router, post("/jobs", Some("u1"), json!({ "prompt": "hi" }))).await;
    let job_id = body["job"]["id"].as_str().unwrap().to_string();

    let holder = claim_worker(&router, "u1", "holder").await;
    let mut poll_body = holder.envelope();
    poll_body["maxJobs"] = json!(1);
    send(&router, post("/jobs/poll", None, poll_body)).await;

    let intruder = claim_worker(&router, "u1", "intruder").await;
    let mut chunk = intruder.envelope();
    chunk["chunkIndex"] = json!(0);
    chunk["content"] = json!("stolen");
    let (status, _) = send(&router, post(&format!("/jobs/{job_id}/chunks"), None, chunk)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn double_claim_by_different_user_conflicts() {
    let router = app();
    let signing_key = SigningKey::generate(&mut OsRng);
    let public_key_b64 = BASE64.encode(signing_key.verifying_key().to_bytes());

    let (status, _) = send(
        &router,
        post("/nodes/claim", Some("u1"), json!({ "publicKey": public_key_b64, "name": "w1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &router,
        post("/nodes/claim", Some("u2"), json!({ "publicKey": public_key_b64, "name": "w1-stolen" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "expected a conflict: {body:?}");
}

#[tokio::test]
async fn stale_timestamp_is_rejected() {
    let router = app();
    let (_, body) = send(&router, post("/jobs", Some("u1"), json!({ "prompt": "hi" }))).await;
    let job_id = body["job"]["id"].as_str().unwrap().to_string();

    let worker = claim_worker(&router, "u1", "w1").await;
    let mut poll_body = worker.envelope();
    poll_body["maxJobs"] = json!(1);
    send(&router, post("/jobs/poll", None, poll_body)).await;

    let stale = worker.envelope_at(coordinator_core::identity::now_ms() - 10 * 60 * 1000);
    let (status, _) = send(&router, post(&format!("/jobs/{job_id}/heartbeat"), None, stale)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&router, get(&format!("/jobs/{job_id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "assigned");
}

#[tokio::test]
async fn lease_expiry_requeues_to_a_different_worker() {
    let (router, state) = app_with_state();
    let (_, body) = send(&router, post("/jobs", Some("u1"), json!({ "prompt": "hi" }))).await;
    let job_id = body["job"]["id"].as_str().unwrap().to_string();

    let abandoner = claim_worker(&router, "u1", "abandoner").await;
    let mut poll_body = abandoner.envelope();
    poll_body["maxJobs"] = json!(1);
    send(&router, post("/jobs/poll", None, poll_body)).await;
    // Never heartbeats. Force-drop the lease directly rather than sleeping
    // out a real 300s TTL, standing in for the lease's natural expiry.
    state.lock.force_release(&job_id).await.unwrap();

    let (status, body) = send(&router, post("/jobs/check-timeouts", None, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["timeoutJobs"][0], job_id);

    let rescuer = claim_worker(&router, "u1", "rescuer").await;
    let mut poll_body = rescuer.envelope();
    poll_body["maxJobs"] = json!(1);
    let (_, body) = send(&router, post("/jobs/poll", None, poll_body)).await;
    assert_eq!(body["jobs"][0]["id"], job_id);
}

#[tokio::test]
async fn cancel_by_non_owner_is_forbidden() {
    let router = app();
    let (_, body) = send(&router, post("/jobs", Some("u1"), json!({ "prompt": "hi" }))).await;
    let job_id = body["job"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(&router, post(&format!("/jobs/{job_id}/cancel"), Some("u2"), json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&router, post(&format!("/jobs/{job_id}/cancel"), Some("u1"), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job"]["status"], "failed");
}

#[tokio::test]
async fn stats_reflect_queue_membership() {
    let router = app();
    send(&router, post("/jobs", Some("u1"), json!({ "prompt": "a" }))).await;
    send(&router, post("/jobs", Some("u1"), json!({ "prompt": "b" }))).await;

    let (status, body) = send(&router, get("/jobs/stats", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["pending"], 2);
    assert_eq!(body["stats"]["assigned"], 0);
}
