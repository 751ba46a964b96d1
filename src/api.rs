use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::error::PipelineError;
use crate::model::FeedTheme;
use crate::pipeline::{PipelineDebug, PipelineRequest, ThemeCard};
use crate::runner::PipelineRunner;

#[derive(Clone)]
pub struct AppState {
    runner: Arc<PipelineRunner>,
    metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(runner: Arc<PipelineRunner>) -> Self {
        Self {
            runner,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/feed", post(feed))
        .route("/metrics", get(render_metrics))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct FeedReq {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(flatten)]
    request: PipelineRequest,
    /// Include per-stage diagnostics in the response.
    #[serde(default)]
    debug: bool,
}

#[derive(Debug, Serialize)]
struct FeedResp {
    themes: Vec<FeedTheme>,
    cards: Vec<ThemeCard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug: Option<PipelineDebug>,
}

struct ApiError(PipelineError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            PipelineError::NoData => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::Superseded { .. } => StatusCode::CONFLICT,
            PipelineError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({
            "error": self.0.code(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

async fn feed(State(state): State<AppState>, Json(body): Json<FeedReq>) -> Result<Json<FeedResp>, ApiError> {
    let result = match body.user_id.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        Some(user) => state.runner.run_for(user, body.request).await,
        None => state.runner.run_once(body.request).await,
    };
    let out = result.map_err(|e| {
        tracing::warn!(target: "pipeline", error = %e, "feed request failed");
        ApiError(e)
    })?;

    Ok(Json(FeedResp {
        themes: out.themes,
        cards: out.cards,
        debug: body.debug.then_some(out.debug),
    }))
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(h) => h.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
