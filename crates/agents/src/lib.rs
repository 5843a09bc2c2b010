mod narration;
mod singleflight;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use carryon_classifier::{
    classifier_prompt, fingerprint, validate_draft, DecisionModel, TtlCache,
};
use carryon_core::models::{
    ClassificationDraft, DecisionStatus, DutyFreeInfo, EngineReport, Flags, ItemParams, Itinerary,
    Narration, PreviewRequest, PreviewResult, PreviewState, ResolvedBags, ResolvedVerdict, Segment,
};
use carryon_core::{normalize_label, AdvisorConfig, Canonical, Taxonomy};
use carryon_engine::{reconcile, resolve, ItineraryContext};
use carryon_observability::AppMetrics;
use carryon_regstore::{RegulationStore, ReloadSummary};
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub use narration::{narrate, status_label};
use singleflight::SingleFlight;

const REVIEW_BADGE: &str = "manual review required";

enum PipelineFailure {
    Llm(String),
    Validation(String),
}

/// Drives the preview pipeline end to end: classifier call, guards, rule
/// resolution, reconciliation and narration. Owns the preview cache and
/// the single-flight slots. Never relaxes a deny.
pub struct PreviewAgent {
    taxonomy: Arc<Taxonomy>,
    store: Arc<RegulationStore>,
    model: Arc<dyn DecisionModel>,
    config: AdvisorConfig,
    metrics: Arc<AppMetrics>,
    preview_cache: TtlCache<PreviewResult>,
    draft_cache: TtlCache<ClassificationDraft>,
    inflight: SingleFlight,
}

impl PreviewAgent {
    pub fn new(
        taxonomy: Arc<Taxonomy>,
        store: Arc<RegulationStore>,
        model: Arc<dyn DecisionModel>,
        config: AdvisorConfig,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        let preview_cache = TtlCache::new(config.cache_ttl, config.cache_capacity);
        let draft_cache = TtlCache::new(config.cache_ttl, config.cache_capacity);
        Self {
            taxonomy,
            store,
            model,
            config,
            metrics,
            preview_cache,
            draft_cache,
            inflight: SingleFlight::default(),
        }
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    #[instrument(skip(self, request), fields(label = %request.label))]
    pub async fn preview(&self, request: PreviewRequest) -> Result<PreviewResult> {
        let started = Instant::now();
        self.metrics.inc_preview();

        let label = request.label.trim().to_string();
        if label.is_empty() {
            bail!("label must not be empty");
        }

        let key = self.preview_fingerprint(&request);
        if let Some(hit) = self.preview_cache.get(&key) {
            self.metrics.inc_cache_hit();
            return Ok(hit);
        }

        let slot = self.inflight.slot(&key);
        let result = {
            let _guard = slot.lock().await;
            match self.preview_cache.get(&key) {
                Some(hit) => {
                    self.metrics.inc_cache_hit();
                    hit
                }
                None => {
                    let computed = self.compute_preview(&request, &label).await;
                    self.preview_cache.insert(key.clone(), computed.clone());
                    computed
                }
            }
        };
        drop(slot);
        self.inflight.release(&key);

        self.metrics.observe_latency(started.elapsed());
        info!(
            req_id = %result.req_id,
            state = ?result.state,
            canonical = result.engine.canonical.as_key(),
            carry_on = result.resolved.carry_on.status.as_str(),
            checked = result.resolved.checked.status.as_str(),
            "preview resolved"
        );
        Ok(result)
    }

    /// Classifier and guards only: the validated draft for one label, cached.
    pub async fn classify(&self, request: &PreviewRequest) -> Result<ClassificationDraft> {
        let key = self.preview_fingerprint(request);
        if let Some(draft) = self.draft_cache.get(&key) {
            return Ok(draft);
        }

        self.metrics.inc_llm_call();
        let prompt = classifier_prompt(request, &self.taxonomy);
        let (raw, model_info) = self
            .model
            .generate_json(&prompt, self.config.llm_max_tokens, self.config.llm_timeout)
            .await
            .map_err(|error| {
                self.metrics.inc_llm_failure();
                anyhow::anyhow!(error)
            })
            .context("classifier call failed")?;

        let mut draft = validate_draft(&raw, &request.label, &self.taxonomy)
            .map_err(|error| anyhow::anyhow!("{error}"))?;
        if draft.model_info.is_none() {
            draft.model_info = Some(model_info);
        }
        self.draft_cache.insert(key, draft.clone());
        Ok(draft)
    }

    /// The deterministic rule engine for an already-known canonical,
    /// used by the decide surface and offline tooling.
    pub fn decide(
        &self,
        canonical: Canonical,
        itinerary: &Itinerary,
        segments: &[Segment],
        params: &ItemParams,
        duty_free: DutyFreeInfo,
    ) -> (ResolvedBags, EngineReport) {
        let ctx = ItineraryContext::new(itinerary, segments, duty_free);
        let index = self.store.snapshot();
        let outcome = resolve(&self.taxonomy, &index, canonical, &ctx, params);
        (
            ResolvedBags {
                carry_on: outcome.carry_on,
                checked: outcome.checked,
            },
            EngineReport {
                canonical,
                params: *params,
                applied_rules: outcome.applied_rules,
                conditions: outcome.conditions,
            },
        )
    }

    pub fn reload_regulations(&self) -> Result<ReloadSummary> {
        let summary = self.store.reload()?;
        self.metrics.inc_reload();
        Ok(summary)
    }

    async fn compute_preview(&self, request: &PreviewRequest, label: &str) -> PreviewResult {
        let req_id = request
            .req_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        let key = self.preview_fingerprint(request);
        let draft = match self.draft_cache.get(&key) {
            Some(draft) => Ok(draft),
            None => {
                self.metrics.inc_llm_call();
                let prompt = classifier_prompt(request, &self.taxonomy);
                match self
                    .model
                    .generate_json(&prompt, self.config.llm_max_tokens, self.config.llm_timeout)
                    .await
                {
                    Err(error) => {
                        self.metrics.inc_llm_failure();
                        warn!(error = %error, "classifier call failed");
                        Err(PipelineFailure::Llm(error.to_string()))
                    }
                    Ok((raw, model_info)) => match validate_draft(&raw, label, &self.taxonomy) {
                        Err(guard_error) => {
                            warn!(field = guard_error.field_name(), "draft failed validation");
                            Err(PipelineFailure::Validation(
                                guard_error.field_name().to_string(),
                            ))
                        }
                        Ok(mut draft) => {
                            if draft.model_info.is_none() {
                                draft.model_info = Some(model_info);
                            }
                            self.draft_cache.insert(key, draft.clone());
                            Ok(draft)
                        }
                    },
                }
            }
        };

        match draft {
            Ok(draft) => self.resolve_preview(request, label, req_id, draft).await,
            Err(PipelineFailure::Llm(message)) => {
                self.fallback_preview(request, label, req_id, Flags {
                    llm_error: Some(message),
                    ..Flags::default()
                })
            }
            Err(PipelineFailure::Validation(field)) => {
                self.validation_fallback_preview(request, label, req_id, field)
            }
        }
    }

    async fn resolve_preview(
        &self,
        request: &PreviewRequest,
        label: &str,
        req_id: String,
        draft: ClassificationDraft,
    ) -> PreviewResult {
        let params = draft.params.merged_with(&request.item_params);
        let ctx = ItineraryContext::new(&request.itinerary, &request.segments, request.duty_free);
        let index = self.store.snapshot();
        let outcome = resolve(&self.taxonomy, &index, draft.canonical, &ctx, &params);

        let mut flags = Flags::default();
        let is_risk = self.taxonomy.is_risk(draft.canonical);

        if is_risk {
            flags.missing_params = self
                .taxonomy
                .missing_params(draft.canonical, &params)
                .into_iter()
                .map(|name| name.as_str().to_string())
                .collect();
        }

        let report = reconcile(
            &draft,
            &outcome,
            &self.taxonomy,
            self.config.confidence_threshold,
        );
        flags.conflict = report.has_conflict();
        if is_risk {
            flags.low_confidence = report.low_confidence;
            // The model's own review request is advisory; it surfaces as an
            // uncertainty signal, never as an operator override.
            if draft.needs_review && flags.low_confidence.is_none() {
                flags.low_confidence = Some(draft.signals.confidence);
            }
        }
        if self.config.always_review.contains(&draft.canonical) {
            flags.override_review = true;
        }

        let resolved = ResolvedBags {
            carry_on: outcome.carry_on,
            checked: outcome.checked,
        };
        let engine = EngineReport {
            canonical: draft.canonical,
            params,
            applied_rules: outcome.applied_rules,
            conditions: outcome.conditions,
        };

        let narration = if self.config.narration_enabled {
            narrate(
                self.model.as_ref(),
                self.config.narration_timeout,
                label,
                &resolved,
                &engine,
            )
            .await
        } else {
            Narration::default()
        };

        let state = if flags.requires_review() {
            self.metrics.inc_review();
            PreviewState::NeedsReview
        } else {
            PreviewState::Complete
        };

        PreviewResult {
            req_id,
            state,
            resolved,
            engine,
            narration,
            flags,
        }
    }

    /// LLM unavailable: safe fallback, both bags conditional pending a
    /// human look. The verdict is deliberately not a deny and never an
    /// unconditional allow.
    fn fallback_preview(
        &self,
        request: &PreviewRequest,
        label: &str,
        req_id: String,
        mut flags: Flags,
    ) -> PreviewResult {
        let canonical = self
            .taxonomy
            .synonym_hint(label)
            .unwrap_or(Canonical::BenignGeneral);

        self.metrics.inc_review();
        let limited = ResolvedVerdict {
            status: DecisionStatus::Limit,
            badges: vec![REVIEW_BADGE.to_string()],
            reason_codes: Vec::new(),
        };
        if flags.llm_error.is_none() && flags.validation_error.is_none() {
            flags.llm_error = Some("model unavailable".to_string());
        }

        PreviewResult {
            req_id,
            state: PreviewState::NeedsReview,
            resolved: ResolvedBags {
                carry_on: limited.clone(),
                checked: limited,
            },
            engine: EngineReport {
                canonical,
                params: request.item_params,
                applied_rules: Vec::new(),
                conditions: serde_json::Map::new(),
            },
            narration: Narration::default(),
            flags,
        }
    }

    /// Schema guard rejected the payload. When the synonym table still
    /// recognizes the item, the taxonomy defaults and rule layers carry
    /// the verdict; otherwise fall back to the generic review slot.
    fn validation_fallback_preview(
        &self,
        request: &PreviewRequest,
        label: &str,
        req_id: String,
        field: String,
    ) -> PreviewResult {
        let flags = Flags {
            validation_error: Some(field),
            ..Flags::default()
        };

        let Some(canonical) = self.taxonomy.synonym_hint(label) else {
            return self.fallback_preview(request, label, req_id, flags);
        };

        let ctx = ItineraryContext::new(&request.itinerary, &request.segments, request.duty_free);
        let index = self.store.snapshot();
        let outcome = resolve(
            &self.taxonomy,
            &index,
            canonical,
            &ctx,
            &request.item_params,
        );

        self.metrics.inc_review();
        PreviewResult {
            req_id,
            state: PreviewState::NeedsReview,
            resolved: ResolvedBags {
                carry_on: outcome.carry_on,
                checked: outcome.checked,
            },
            engine: EngineReport {
                canonical,
                params: request.item_params,
                applied_rules: outcome.applied_rules,
                conditions: outcome.conditions,
            },
            narration: Narration::default(),
            flags,
        }
    }

    fn preview_fingerprint(&self, request: &PreviewRequest) -> String {
        let itinerary = format!(
            "{}|{}",
            request.itinerary.airports().join(">"),
            request.itinerary.rescreening
        );
        let segments = request
            .segments
            .iter()
            .map(|segment| {
                format!(
                    "{}:{}:{}",
                    segment.operating.to_uppercase(),
                    segment
                        .cabin_class
                        .map(|cabin| format!("{cabin:?}").to_lowercase())
                        .unwrap_or_default(),
                    segment.fare_class.as_deref().unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join("|");
        let hints = serde_json::to_string(&request.item_params).unwrap_or_default();
        let duty_free = format!(
            "{}|{}",
            request.duty_free.is_df, request.duty_free.steb_sealed
        );

        fingerprint(&[
            &normalize_label(&request.label),
            request.locale.as_deref().unwrap_or(""),
            &itinerary,
            &segments,
            &hints,
            &duty_free,
        ])
    }
}
