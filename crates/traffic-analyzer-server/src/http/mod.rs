//! HTTP surface (C11): the load / status / generate / render / delete /
//! cleanup endpoints, plus health probes, wired over the job tracker and the
//! ingest/reconciliation engines.

pub mod auth;
mod routes;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use axum::Router;
use axum::middleware;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::header_cache::HeaderDictionary;
use crate::ingest::Ingester;
use crate::jobs::JobTracker;
use crate::reconcile_service::ReconciliationEngine;
use crate::render::ReportRowSource;
use crate::storage::ObjectStorage;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: PgPool,
    pub jobs: Arc<JobTracker>,
    pub ingester: Arc<Ingester>,
    pub storage: Arc<ObjectStorage>,
    pub reconciler: Arc<ReconciliationEngine>,
    pub render_source: Arc<ReportRowSource>,
    pub headers: Arc<HeaderDictionary>,
    /// Set once schema migrations finish running at startup; `/startup`
    /// reports this rather than an unconditional OK.
    pub migrations_complete: Arc<AtomicBool>,
}

/// Builds the full router: health probes are unauthenticated and outside the
/// CORS policy entirely (liveness probes are not browser traffic); everything
/// under `/api` goes through the fixed API-key middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = if state.config.production_mode {
        match &state.config.origin_allowed {
            Some(origin) => CorsLayer::new().allow_origin(origin.parse::<axum::http::HeaderValue>().unwrap()),
            None => CorsLayer::new(),
        }
    } else {
        CorsLayer::permissive()
    };

    let api = routes::api_router().route_layer(middleware::from_fn_with_state(state.clone(), auth::require_api_key));

    Router::new()
        .merge(routes::health_router())
        .merge(api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
