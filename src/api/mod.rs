use crate::ingest::IngestionGateway;
use crate::status::StatusAggregator;
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;

pub mod handlers;
pub mod responses;

/// Shared handles for the HTTP layer. Both sides point at the same zone store.
#[derive(Debug, Clone)]
pub struct ApiContext {
    pub gateway: Arc<IngestionGateway>,
    pub status: Arc<StatusAggregator>,
}

impl ApiContext {
    pub fn new(gateway: Arc<IngestionGateway>, status: StatusAggregator) -> Self {
        Self {
            gateway,
            status: Arc::new(status),
        }
    }
}

pub fn router(context: ApiContext) -> Router {
    Router::new()
        .route("/api/ingest", post(handlers::post_ingest))
        .route("/api/status", get(handlers::get_status))
        .route("/api/zones/{zone_id}", get(handlers::get_zone))
        .route("/api/health", get(handlers::get_health))
        .with_state(context)
}
