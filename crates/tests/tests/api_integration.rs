use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use carryon_agents::PreviewAgent;
use carryon_api::{build_router, ApiState, RequestLimiter};
use carryon_classifier::{DecisionModel, ModelError};
use carryon_core::models::ModelInfo;
use carryon_core::{AdvisorConfig, Taxonomy};
use carryon_observability::AppMetrics;
use carryon_regstore::RegulationStore;
use serde_json::json;
use tower::ServiceExt;

const API_KEY: &str = "dev-carryon-key";

struct ScriptedModel {
    body: String,
}

#[async_trait]
impl DecisionModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate_json(
        &self,
        _prompt: &str,
        _max_output_tokens: u32,
        _timeout: Duration,
    ) -> Result<(String, ModelInfo), ModelError> {
        Ok((self.body.clone(), ModelInfo::default()))
    }
}

struct FailingModel;

#[async_trait]
impl DecisionModel for FailingModel {
    fn model_name(&self) -> &str {
        "failing"
    }

    async fn generate_json(
        &self,
        _prompt: &str,
        _max_output_tokens: u32,
        _timeout: Duration,
    ) -> Result<(String, ModelInfo), ModelError> {
        Err(ModelError::Timeout(Duration::from_secs(8)))
    }
}

fn app_with_model(model: Arc<dyn DecisionModel>) -> Router {
    let rules = carryon_regstore::parse_file(
        &std::path::PathBuf::from("seed.json"),
        r#"{
            "scope": "international", "code": "IATA", "rules": [
                {"item_category": "power_bank", "severity": "warn",
                 "constraints": {"max_wh": 160, "bags": "carry_on",
                                 "reason_code": "DG_IATA_POWERBANK"}},
                {"item_category": "power_bank", "severity": "block",
                 "constraints": {"bags": "checked",
                                 "reason_code": "DG_IATA_POWERBANK_HOLD"}}
            ]
        }"#,
    )
    .expect("seed rules parse");

    let metrics = AppMetrics::shared();
    let config = AdvisorConfig {
        narration_enabled: false,
        ..AdvisorConfig::default()
    };
    let agent = Arc::new(PreviewAgent::new(
        Arc::new(Taxonomy::builtin().clone()),
        Arc::new(RegulationStore::from_rules(rules)),
        model,
        config,
        metrics.clone(),
    ));

    build_router(ApiState {
        agent,
        metrics,
        api_key: API_KEY.to_string(),
        limiter: RequestLimiter::new(Duration::from_secs(60), 30, 120),
    })
}

fn benign_payload() -> serde_json::Value {
    json!({
        "canonical": "benign_general",
        "params": {"volume_ml": null, "wh": null, "count": null,
                   "weight_kg": null, "abv_percent": null, "blade_length_cm": null},
        "carry_on": {"status": "allow", "badges": []},
        "checked": {"status": "allow", "badges": []},
        "needs_review": false,
        "signals": {"matched_terms": ["hoo", "die"], "confidence": 0.95, "notes": null}
    })
}

fn preview_body(label: &str) -> String {
    json!({
        "label": label,
        "locale": "en",
        "itinerary": {"from": "ICN", "to": "LAX", "via": [], "rescreening": false},
        "segments": []
    })
    .to_string()
}

#[tokio::test]
async fn health_is_public() {
    let app = app_with_model(Arc::new(ScriptedModel {
        body: benign_payload().to_string(),
    }));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn preview_requires_api_key() {
    let app = app_with_model(Arc::new(ScriptedModel {
        body: benign_payload().to_string(),
    }));

    let request = Request::builder()
        .method("POST")
        .uri("/v1/items/preview")
        .header("content-type", "application/json")
        .body(Body::from(preview_body("hoodie")))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn preview_returns_a_complete_benign_verdict() {
    let app = app_with_model(Arc::new(ScriptedModel {
        body: benign_payload().to_string(),
    }));

    let request = Request::builder()
        .method("POST")
        .uri("/v1/items/preview")
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(preview_body("hoodie")))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(parsed["state"], "complete");
    assert_eq!(parsed["resolved"]["carry_on"]["status"], "allow");
    assert_eq!(parsed["resolved"]["checked"]["status"], "allow");
    assert_eq!(parsed["engine"]["canonical"], "benign_general");
}

#[tokio::test]
async fn model_failure_still_answers_with_review_flags() {
    let app = app_with_model(Arc::new(FailingModel));

    let request = Request::builder()
        .method("POST")
        .uri("/v1/items/preview")
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(preview_body("hair spray 350ml")))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(parsed["state"], "needs_review");
    assert!(parsed["flags"]["llm_error"].is_string());
    assert_eq!(parsed["resolved"]["carry_on"]["status"], "limit");
    assert_eq!(parsed["resolved"]["checked"]["status"], "limit");
}

#[tokio::test]
async fn decide_runs_the_rule_engine_without_the_model() {
    let app = app_with_model(Arc::new(FailingModel));

    let request = Request::builder()
        .method("POST")
        .uri("/v1/items/decide")
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(
            json!({
                "canonical": "power_bank",
                "itinerary": {"from": "ICN", "to": "LAX", "via": [], "rescreening": false},
                "segments": [],
                "item_params": {"wh": 99.0, "count": 1}
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(parsed["resolved"]["checked"]["status"], "deny");
    assert_eq!(parsed["resolved"]["carry_on"]["status"], "limit");
    let applied = parsed["engine"]["applied_rules"].as_array().unwrap();
    assert!(!applied.is_empty());
}

#[tokio::test]
async fn decide_rejects_unknown_canonical_keys() {
    let app = app_with_model(Arc::new(FailingModel));

    let request = Request::builder()
        .method("POST")
        .uri("/v1/items/decide")
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(
            json!({
                "canonical": "suspicious_gadget",
                "itinerary": {"from": "ICN", "to": "LAX"}
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn model_routes_are_rate_limited_under_abuse() {
    let app = app_with_model(Arc::new(ScriptedModel {
        body: benign_payload().to_string(),
    }));
    let mut blocked = false;

    for _ in 0..40 {
        let request = Request::builder()
            .method("POST")
            .uri("/v1/items/preview")
            .header("content-type", "application/json")
            .header("x-api-key", API_KEY)
            .body(Body::from(preview_body("hoodie")))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            blocked = true;
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(
                parsed.get("error").and_then(|value| value.as_str()),
                Some("rate_limited")
            );
            break;
        }
    }

    assert!(blocked, "model-route abuse should eventually be rate limited");
}

#[tokio::test]
async fn reload_without_a_directory_backed_store_is_rejected() {
    let app = app_with_model(Arc::new(ScriptedModel {
        body: benign_payload().to_string(),
    }));

    let request = Request::builder()
        .method("POST")
        .uri("/v1/regulations/reload")
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
