//! `coordinator_core`: the coordinator core for a distributed LLM inference
//! job broker. Everything that touches the shared KV/sorted-set store —
//! job lifecycle, priority scheduling, per-job leases, chunk aggregation,
//! node registry, and the timeout sweeper — lives here and is reachable
//! without a running HTTP server. `api` is the thin axum transport over it.

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod identity;
pub mod jobs;
pub mod kv;
pub mod registry;
pub mod telemetry;
