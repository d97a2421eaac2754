//! HTTP server module.
//!
//! This module provides:
//! - Shared application state wiring
//! - The REST router
//! - Error-to-status mapping at the transport boundary

pub mod auth;
pub mod cookie;
mod handlers;

pub use handlers::*;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::analysis::{SignificanceEvaluator, TestReporter};
use crate::assign::VariantAssigner;
use crate::config::Config;
use crate::error::ApiError;
use crate::generate::GenerationClient;
use crate::storage::Storage;
use crate::tracking::{BeaconQueue, EventRecorder};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Storage backend.
    pub storage: Arc<dyn Storage>,
    /// Variant assigner.
    pub assigner: VariantAssigner,
    /// Event recorder.
    pub recorder: EventRecorder,
    /// Test-result reporter.
    pub reporter: TestReporter,
    /// Beacon post-processing queue.
    pub beacons: BeaconQueue,
    /// Variant-drafting client, when configured.
    pub generator: Option<GenerationClient>,
}

impl AppState {
    /// Create application state and spawn the beacon worker.
    ///
    /// Returns the worker's join handle so the caller can await it on
    /// shutdown; the queue drains once every state clone is dropped.
    pub fn new(
        config: Config,
        storage: Arc<dyn Storage>,
        generator: Option<GenerationClient>,
    ) -> (Self, JoinHandle<()>) {
        if generator.is_none() {
            warn!("Variant generation disabled (no GENERATION_API_KEY)");
        }

        let evaluator = SignificanceEvaluator::new(&config.analysis);
        let reporter = TestReporter::new(storage.clone(), evaluator);
        let recorder = EventRecorder::new(storage.clone(), reporter.clone());
        let (beacons, worker) =
            BeaconQueue::spawn(recorder.clone(), config.tracking.beacon_queue_capacity);

        let state = Self {
            config,
            storage,
            assigner: VariantAssigner,
            recorder,
            reporter,
            beacons,
            generator,
        };

        (state, worker)
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;

/// Build the REST router over shared state.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/api/public/lp/{id}", get(handlers::public_lp))
        .route("/api/tracking/pageview", post(handlers::track_pageview))
        .route("/api/tracking/component", post(handlers::track_component))
        .route("/api/tracking/conversion", post(handlers::track_conversion))
        .route("/api/tracking/scroll", post(handlers::track_scroll))
        .route("/api/tracking/event", post(handlers::track_event))
        .route("/api/tracking/exit", post(handlers::track_exit))
        .route("/api/tracking/stats", get(handlers::lp_stats))
        .route(
            "/api/tracking/stats/components",
            get(handlers::component_stats),
        )
        .route(
            "/api/tracking/stats/report/{test_id}",
            get(handlers::test_report),
        )
        .route("/api/tests/{id}/apply-winner", post(handlers::apply_winner))
        .route("/api/lps", post(handlers::create_lp).get(handlers::list_lps))
        .route(
            "/api/lps/{id}",
            get(handlers::get_lp).delete(handlers::delete_lp),
        )
        .route("/api/lps/{id}/components", post(handlers::create_component))
        .route(
            "/api/components/{id}/variants",
            post(handlers::create_variant),
        )
        .route(
            "/api/components/{id}/generate-variant",
            post(handlers::generate_variant),
        )
        .with_state(state)
}

fn api_error_status(err: &ApiError) -> StatusCode {
    match err {
        ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
        ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
        ApiError::Forbidden => StatusCode::FORBIDDEN,
        ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
        ApiError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = api_error_status(&self);
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
