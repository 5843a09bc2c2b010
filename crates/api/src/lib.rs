mod rate_limit;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Json, State};
use axum::http::{Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{body::Body, Router};
use carryon_agents::PreviewAgent;
use carryon_classifier::{DecisionModel, GeminiModel};
use carryon_core::models::{
    DutyFreeInfo, ItemParams, Itinerary, PreviewRequest, Segment,
};
use carryon_core::{AdvisorConfig, Canonical, Taxonomy};
use carryon_observability::AppMetrics;
use carryon_regstore::RegulationStore;
use serde::{Deserialize, Serialize};

pub use crate::rate_limit::{RequestLimiter, RouteClass};

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<PreviewAgent>,
    pub metrics: Arc<AppMetrics>,
    pub api_key: String,
    pub limiter: RequestLimiter,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    metrics: carryon_observability::MetricsSnapshot,
}

#[derive(Debug, Deserialize)]
struct DecideRequest {
    canonical: Canonical,
    #[serde(default)]
    req_id: Option<String>,
    itinerary: Itinerary,
    #[serde(default)]
    segments: Vec<Segment>,
    #[serde(default)]
    item_params: ItemParams,
    #[serde(default)]
    duty_free: DutyFreeInfo,
}

/// Assemble the full runtime from configuration: taxonomy, regulation
/// store, model client, orchestrator, router.
pub async fn build_app(config: AdvisorConfig) -> Result<Router> {
    let metrics = AppMetrics::shared();

    let taxonomy = match &config.taxonomy_dir {
        Some(dir) => Arc::new(
            Taxonomy::load_dir(dir)
                .with_context(|| format!("failed loading taxonomy from {}", dir.display()))?,
        ),
        None => Arc::new(Taxonomy::builtin().clone()),
    };

    let store = if config.regulation_dir.is_dir() {
        Arc::new(
            RegulationStore::load_dir(&config.regulation_dir).with_context(|| {
                format!(
                    "failed loading regulations from {}",
                    config.regulation_dir.display()
                )
            })?,
        )
    } else {
        tracing::warn!(
            dir = %config.regulation_dir.display(),
            "regulation directory missing; serving taxonomy defaults only"
        );
        Arc::new(RegulationStore::empty())
    };

    let model: Arc<dyn DecisionModel> = Arc::new(GeminiModel::new(
        config.gemini_api_key.clone().unwrap_or_default(),
        config.model_name.clone(),
    ));

    let api_key = config.api_key.clone();
    let agent = Arc::new(PreviewAgent::new(
        taxonomy,
        store,
        model,
        config,
        metrics.clone(),
    ));

    Ok(build_router(ApiState {
        agent,
        metrics,
        api_key,
        limiter: RequestLimiter::new(Duration::from_secs(60), 30, 120),
    }))
}

/// Router over an already-assembled state; integration tests inject stub
/// models through this seam.
pub fn build_router(state: ApiState) -> Router {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::limit::RequestBodyLimitLayer;
    use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/health", get(health))
        .route("/v1/items/preview", post(preview))
        .route("/v1/items/classify", post(classify))
        .route("/v1/items/decide", post(decide))
        .route("/v1/regulations/reload", post(reload))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(RequestBodyLimitLayer::new(64 * 1024))
        .layer(middleware::from_fn_with_state(state.clone(), api_key_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        metrics: state.metrics.snapshot(),
    };
    (StatusCode::OK, Json(payload))
}

async fn preview(
    State(state): State<ApiState>,
    Json(input): Json<PreviewRequest>,
) -> impl IntoResponse {
    if input.label.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "invalid_label",
                "message": "label must not be empty"
            })),
        )
            .into_response();
    }

    match state.agent.preview(input).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": "preview_failed",
                "message": error.to_string()
            })),
        )
            .into_response(),
    }
}

async fn classify(
    State(state): State<ApiState>,
    Json(input): Json<PreviewRequest>,
) -> impl IntoResponse {
    match state.agent.classify(&input).await {
        Ok(draft) => (StatusCode::OK, Json(draft)).into_response(),
        Err(error) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({
                "error": "classification_failed",
                "message": error.to_string()
            })),
        )
            .into_response(),
    }
}

async fn decide(
    State(state): State<ApiState>,
    Json(input): Json<DecideRequest>,
) -> impl IntoResponse {
    let (resolved, engine) = state.agent.decide(
        input.canonical,
        &input.itinerary,
        &input.segments,
        &input.item_params,
        input.duty_free,
    );

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "req_id": input.req_id,
            "resolved": resolved,
            "engine": engine,
        })),
    )
        .into_response()
}

async fn reload(State(state): State<ApiState>) -> impl IntoResponse {
    match state.agent.reload_regulations() {
        Ok(summary) => (StatusCode::OK, Json(serde_json::json!({ "reloaded": summary })))
            .into_response(),
        Err(error) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": "reload_failed",
                "message": error.to_string()
            })),
        )
            .into_response(),
    }
}

async fn api_key_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.uri().path() == "/health" || request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let header_key = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if header_key != state.api_key {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "unauthorized",
                "message": "missing or invalid x-api-key"
            })),
        )
            .into_response();
    }

    next.run(request).await
}

async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if path == "/health" || request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    // Model-backed routes burn tokens upstream; they draw from the
    // tighter budget.
    let class = match path {
        "/v1/items/preview" | "/v1/items/classify" => RouteClass::Model,
        _ => RouteClass::Metadata,
    };

    let ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(',').next().unwrap_or("unknown").trim().to_string())
        .unwrap_or_else(|| "local".to_string());
    let presented_key = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let caller = format!("{presented_key}|{ip}");

    if !state.limiter.allow(&caller, class) {
        state.metrics.inc_rate_limited();
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "rate_limited",
                "message": "request budget exceeded for this caller"
            })),
        )
            .into_response();
    }

    next.run(request).await
}
