use carryon_core::models::{ClassificationDraft, ParamName};
use carryon_core::{normalize_label, Canonical, Taxonomy};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("model output is not valid JSON")]
    NotJson,
    #[error("field {field}: {reason}")]
    Field { field: String, reason: String },
}

impl GuardError {
    /// The offending field, recorded in `flags.validation_error`.
    pub fn field_name(&self) -> &str {
        match self {
            GuardError::NotJson => "payload",
            GuardError::Field { field, .. } => field,
        }
    }
}

fn field_err(field: &str, reason: impl Into<String>) -> GuardError {
    GuardError::Field {
        field: field.to_string(),
        reason: reason.into(),
    }
}

const PARAM_FIELDS: &[&str] = &[
    "volume_ml",
    "wh",
    "count",
    "weight_kg",
    "abv_percent",
    "blade_length_cm",
];

/// Bit-exact validation of the model payload against the response
/// schema. Anything the schema does not promise is rejected, not coerced.
pub fn validate_draft(
    raw: &str,
    label: &str,
    taxonomy: &Taxonomy,
) -> Result<ClassificationDraft, GuardError> {
    let value: Value = serde_json::from_str(raw).map_err(|_| GuardError::NotJson)?;
    let object = value.as_object().ok_or(GuardError::NotJson)?;

    // canonical: present, in the closed set, known to the loaded taxonomy.
    let canonical_raw = object
        .get("canonical")
        .and_then(Value::as_str)
        .ok_or_else(|| field_err("canonical", "missing or not a string"))?;
    let canonical = Canonical::parse(canonical_raw)
        .ok_or_else(|| field_err("canonical", format!("{canonical_raw:?} is not in the closed set")))?;
    if !taxonomy.is_risk(canonical) && canonical != Canonical::BenignGeneral {
        return Err(field_err(
            "canonical",
            format!("{canonical_raw:?} is not an allowed key"),
        ));
    }

    // params: each slot null or a finite non-negative number; no extras.
    let params = object
        .get("params")
        .and_then(Value::as_object)
        .ok_or_else(|| field_err("params", "missing or not an object"))?;
    for (key, slot) in params {
        if !PARAM_FIELDS.contains(&key.as_str()) {
            return Err(field_err(&format!("params.{key}"), "unknown parameter"));
        }
        match slot {
            Value::Null => {}
            Value::Number(number) => {
                let numeric = number.as_f64().unwrap_or(f64::NAN);
                if !numeric.is_finite() || numeric < 0.0 {
                    return Err(field_err(
                        &format!("params.{key}"),
                        "must be finite and non-negative",
                    ));
                }
                if key == "count" && numeric.fract() != 0.0 {
                    return Err(field_err("params.count", "must be an integer"));
                }
            }
            _ => {
                return Err(field_err(
                    &format!("params.{key}"),
                    "must be a number or null",
                ))
            }
        }
    }

    for slot in ["carry_on", "checked"] {
        let bag = object
            .get(slot)
            .and_then(Value::as_object)
            .ok_or_else(|| field_err(slot, "missing or not an object"))?;
        let status = bag
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| field_err(&format!("{slot}.status"), "missing or not a string"))?;
        if !matches!(status, "allow" | "limit" | "deny") {
            return Err(field_err(
                &format!("{slot}.status"),
                format!("{status:?} is not a status"),
            ));
        }
        if let Some(badges) = bag.get("badges") {
            let ok = badges
                .as_array()
                .map(|items| items.iter().all(Value::is_string))
                .unwrap_or(false);
            if !ok {
                return Err(field_err(
                    &format!("{slot}.badges"),
                    "must be an array of strings",
                ));
            }
        }
    }

    // signals: term count, verbatim membership, bounded confidence.
    let signals = object
        .get("signals")
        .and_then(Value::as_object)
        .ok_or_else(|| field_err("signals", "missing or not an object"))?;

    let confidence = signals
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| field_err("signals.confidence", "missing or not a number"))?;
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(field_err("signals.confidence", "must be within [0, 1]"));
    }

    let terms = signals
        .get("matched_terms")
        .and_then(Value::as_array)
        .ok_or_else(|| field_err("signals.matched_terms", "missing or not an array"))?;
    if !(2..=4).contains(&terms.len()) {
        return Err(field_err(
            "signals.matched_terms",
            format!("expected 2-4 terms, got {}", terms.len()),
        ));
    }
    let label_lower = label.to_lowercase();
    let norm_lower = normalize_label(label);
    for term in terms {
        let term = term
            .as_str()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .ok_or_else(|| field_err("signals.matched_terms", "terms must be non-empty strings"))?;
        let term_lower = term.to_lowercase();
        if !label_lower.contains(&term_lower) && !norm_lower.contains(&term_lower) {
            return Err(field_err(
                "signals.matched_terms",
                format!("{term:?} is not a substring of the label"),
            ));
        }
    }

    serde_json::from_value::<ClassificationDraft>(value).map_err(|error| field_err(
        "payload",
        format!("shape mismatch after field checks: {error}"),
    ))
}

/// Required-parameter table. Missing names are surfaced, the pipeline
/// keeps going so the UI can ask for exactly these fields.
pub fn missing_required_params(draft: &ClassificationDraft, taxonomy: &Taxonomy) -> Vec<ParamName> {
    if !taxonomy.is_risk(draft.canonical) {
        return Vec::new();
    }
    taxonomy.missing_params(draft.canonical, &draft.params)
}
