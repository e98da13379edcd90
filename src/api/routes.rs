use crate::api::handlers;
use crate::api::state::AppState;
use axum::http::{header, Method};
use axum::routing::get;
use axum::Router;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn build(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, "x-user-id".parse().unwrap()])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(handlers::nodes::router())
        .merge(handlers::jobs::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
