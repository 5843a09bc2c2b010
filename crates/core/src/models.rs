use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::Canonical;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Allow,
    Limit,
    Deny,
}

impl DecisionStatus {
    /// Rank in the monotone lattice `deny > limit > allow`.
    pub fn restrictiveness(self) -> u8 {
        match self {
            Self::Allow => 1,
            Self::Limit => 2,
            Self::Deny => 3,
        }
    }

    pub fn more_restrictive(self, other: Self) -> Self {
        if other.restrictiveness() > self.restrictiveness() {
            other
        } else {
            self
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Limit => "limit",
            Self::Deny => "deny",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Airline,
    Country,
    International,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Airline => "airline",
            Self::Country => "country",
            Self::International => "international",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CabinClass {
    Economy,
    Business,
    First,
    Prestige,
}

impl CabinClass {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "economy" | "y" => Some(Self::Economy),
            "business" | "c" => Some(Self::Business),
            "first" | "f" => Some(Self::First),
            "prestige" => Some(Self::Prestige),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteType {
    Domestic,
    International,
}

/// Ordered origin, optional via-points, destination. `rescreening` is true
/// when a via-point re-screens liquids and aerosols for the onward leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Itinerary {
    #[serde(alias = "from")]
    pub origin: String,
    #[serde(default)]
    pub via: Vec<String>,
    #[serde(alias = "to")]
    pub destination: String,
    #[serde(default)]
    pub rescreening: bool,
}

impl Itinerary {
    pub fn airports(&self) -> Vec<String> {
        let mut codes = Vec::with_capacity(self.via.len() + 2);
        codes.push(self.origin.to_uppercase());
        codes.extend(self.via.iter().map(|code| code.to_uppercase()));
        codes.push(self.destination.to_uppercase());
        codes
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub leg: String,
    pub operating: String,
    #[serde(default)]
    pub cabin_class: Option<CabinClass>,
    #[serde(default)]
    pub fare_class: Option<String>,
}

/// Quantitative attributes extracted for an item. Absent means unknown,
/// never a sentinel zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ItemParams {
    #[serde(default)]
    pub volume_ml: Option<f64>,
    #[serde(default)]
    pub wh: Option<f64>,
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub abv_percent: Option<f64>,
    #[serde(default)]
    pub blade_length_cm: Option<f64>,
}

impl ItemParams {
    pub fn get(&self, name: ParamName) -> Option<f64> {
        match name {
            ParamName::VolumeMl => self.volume_ml,
            ParamName::Wh => self.wh,
            ParamName::Count => self.count.map(f64::from),
            ParamName::WeightKg => self.weight_kg,
            ParamName::AbvPercent => self.abv_percent,
            ParamName::BladeLengthCm => self.blade_length_cm,
        }
    }

    pub fn merged_with(&self, hint: &ItemParams) -> ItemParams {
        ItemParams {
            volume_ml: self.volume_ml.or(hint.volume_ml),
            wh: self.wh.or(hint.wh),
            count: self.count.or(hint.count),
            weight_kg: self.weight_kg.or(hint.weight_kg),
            abv_percent: self.abv_percent.or(hint.abv_percent),
            blade_length_cm: self.blade_length_cm.or(hint.blade_length_cm),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamName {
    VolumeMl,
    Wh,
    Count,
    WeightKg,
    AbvPercent,
    BladeLengthCm,
}

impl ParamName {
    pub const ALL: &'static [ParamName] = &[
        Self::VolumeMl,
        Self::Wh,
        Self::Count,
        Self::WeightKg,
        Self::AbvPercent,
        Self::BladeLengthCm,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::VolumeMl => "volume_ml",
            Self::Wh => "wh",
            Self::Count => "count",
            Self::WeightKg => "weight_kg",
            Self::AbvPercent => "abv_percent",
            Self::BladeLengthCm => "blade_length_cm",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == value.trim())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DutyFreeInfo {
    #[serde(default)]
    pub is_df: bool,
    #[serde(default)]
    pub steb_sealed: bool,
}

/// Draft verdict for one bag as proposed by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftSlot {
    pub status: DecisionStatus,
    #[serde(default)]
    pub badges: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftSignals {
    #[serde(default)]
    pub matched_terms: Vec<String>,
    pub confidence: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub temperature: f64,
}

/// Validated output of the classifier call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationDraft {
    pub canonical: Canonical,
    #[serde(default)]
    pub params: ItemParams,
    pub carry_on: DraftSlot,
    pub checked: DraftSlot,
    #[serde(default)]
    pub needs_review: bool,
    pub signals: DraftSignals,
    #[serde(default)]
    pub model_info: Option<ModelInfo>,
}

/// Authoritative per-bag outcome after layer resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedVerdict {
    pub status: DecisionStatus,
    #[serde(default)]
    pub badges: Vec<String>,
    #[serde(default)]
    pub reason_codes: Vec<String>,
}

impl ResolvedVerdict {
    pub fn allow() -> Self {
        Self {
            status: DecisionStatus::Allow,
            badges: Vec::new(),
            reason_codes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewState {
    Complete,
    NeedsReview,
}

/// Failure and review signals surfaced to the caller. No flag ever
/// downgrades a deny.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Flags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_params: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub conflict: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_error: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub override_review: bool,
}

impl Flags {
    pub fn requires_review(&self) -> bool {
        self.validation_error.is_some()
            || !self.missing_params.is_empty()
            || self.low_confidence.is_some()
            || self.conflict
            || self.llm_error.is_some()
            || self.override_review
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewRequest {
    pub label: String,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub req_id: Option<String>,
    pub itinerary: Itinerary,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub item_params: ItemParams,
    #[serde(default)]
    pub duty_free: DutyFreeInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedBags {
    pub carry_on: ResolvedVerdict,
    pub checked: ResolvedVerdict,
}

/// Trace entry naming one rule that contributed to the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedRule {
    pub rule_id: String,
    pub layer: String,
    pub code: String,
    pub item_category: String,
    pub carry_on: Option<DecisionStatus>,
    pub checked: Option<DecisionStatus>,
    #[serde(default)]
    pub reason_codes: Vec<String>,
    #[serde(default)]
    pub caps_used: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineReport {
    pub canonical: Canonical,
    pub params: ItemParams,
    #[serde(default)]
    pub applied_rules: Vec<AppliedRule>,
    #[serde(default)]
    pub conditions: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationCard {
    pub status_label: String,
    pub short_reason: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Narration {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carry_on: Option<NarrationCard>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<NarrationCard>,
    #[serde(default)]
    pub bullets: Vec<String>,
    #[serde(default)]
    pub badges: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footnote: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl Narration {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.carry_on.is_none() && self.bullets.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewResult {
    pub req_id: String,
    pub state: PreviewState,
    pub resolved: ResolvedBags,
    pub engine: EngineReport,
    #[serde(default)]
    pub narration: Narration,
    #[serde(default)]
    pub flags: Flags,
}
