use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    db::DataSource,
    middleware::{make_span_with_request_id, request_id_middleware},
    services::SnapshotStore,
};

pub mod recommendations;
pub mod refresh;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SnapshotStore>,
    pub source: Arc<dyn DataSource>,
    /// Largest `max` accepted by `/recommends`
    pub max_recommendations: usize,
    /// Bearer token guarding `/refresh`; `None` disables the endpoint
    pub refresh_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        store: Arc<SnapshotStore>,
        source: Arc<dyn DataSource>,
        max_recommendations: usize,
    ) -> Self {
        Self {
            store,
            source,
            max_recommendations,
            refresh_token: None,
        }
    }

    pub fn with_refresh_token(mut self, token: Option<String>) -> Self {
        self.refresh_token = token.map(Arc::from);
        self
    }
}

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(documentation))
        .route("/health", get(health_check))
        .route("/recommends", post(recommendations::recommend))
        .route("/refresh", post(refresh::refresh))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Endpoint documentation
async fn documentation() -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "POST /recommends": {
                "body": { "user_id": "integer", "max": "integer" },
                "returns": "courses the user has not rated, ranked by predicted rating, doubled for courses in the user's interest categories"
            },
            "POST /refresh": {
                "headers": { "Authorization": "Bearer <REFRESH_TOKEN>" },
                "returns": "reloads data and retrains the model; disabled unless REFRESH_TOKEN is set"
            },
            "GET /health": "model status"
        }
    }))
}

/// Health check endpoint
///
/// Unhealthy until a model has been trained.
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let status = state.store.status().await;
    let code = if status.snapshot.is_some() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let label = if status.snapshot.is_some() {
        "healthy"
    } else {
        "starting"
    };

    (
        code,
        Json(json!({
            "status": label,
            "snapshot": status.snapshot,
            "last_refresh_error": status.last_error,
        })),
    )
}
