use std::collections::HashSet;
use std::time::Duration;

use carryon_core::models::{
    DecisionStatus, EngineReport, Narration, ResolvedBags,
};
use carryon_classifier::DecisionModel;
use serde_json::json;
use tracing::warn;

/// Rewrite the resolved decision into short user-facing copy. The
/// adapter is strictly non-authoritative; any contract violation or model
/// failure yields an empty narration block and the decision stands.
pub async fn narrate(
    model: &dyn DecisionModel,
    timeout: Duration,
    label: &str,
    resolved: &ResolvedBags,
    engine: &EngineReport,
) -> Narration {
    let prompt = narration_prompt(label, resolved, engine);

    let raw = match model.generate_json(&prompt, 512, timeout).await {
        Ok((text, _info)) => text,
        Err(error) => {
            warn!(error = %error, "narration call failed; returning empty block");
            return Narration::default();
        }
    };

    match validate_narration(&raw, label, resolved, engine) {
        Some(narration) => narration,
        None => {
            warn!("narration violated the read-only contract; returning empty block");
            Narration::default()
        }
    }
}

pub fn status_label(status: DecisionStatus) -> &'static str {
    match status {
        DecisionStatus::Allow => "allowed",
        DecisionStatus::Limit => "conditional",
        DecisionStatus::Deny => "prohibited",
    }
}

fn narration_prompt(label: &str, resolved: &ResolvedBags, engine: &EngineReport) -> String {
    let decision = json!({
        "label": label,
        "canonical": engine.canonical,
        "params": engine.params,
        "carry_on": resolved.carry_on,
        "checked": resolved.checked,
        "conditions": engine.conditions,
        "sources": engine.applied_rules.iter()
            .map(|rule| format!("{}/{}", rule.layer, rule.code))
            .collect::<Vec<_>>(),
    });

    format!(
        r#"System:
You rewrite an airline baggage decision into short traveler-facing copy. Output VALID JSON only.
Read-only contract:
- Do NOT change any verdict. status_label must be exactly "allowed" for allow, "conditional" for limit, "prohibited" for deny.
- Do NOT introduce any number that is not already present in the decision below.
- bullets: 2-4 short strings paraphrasing the badges and conditions.
- badges: copy from the decision, do not invent new ones.

Output schema:
{{
  "title": string,
  "carry_on": {{"status_label": string, "short_reason": string}},
  "checked": {{"status_label": string, "short_reason": string}},
  "bullets": [string],
  "badges": [string],
  "footnote": string|null,
  "sources": [string]
}}

DECISION = {decision}
"#
    )
}

/// Enforce the read-only contract: status labels must map back to the
/// resolved statuses and no new numeric token may appear.
fn validate_narration(
    raw: &str,
    label: &str,
    resolved: &ResolvedBags,
    engine: &EngineReport,
) -> Option<Narration> {
    let narration: Narration = serde_json::from_str(raw).ok()?;

    let carry = narration.carry_on.as_ref()?;
    let checked = narration.checked.as_ref()?;
    if carry.status_label != status_label(resolved.carry_on.status)
        || checked.status_label != status_label(resolved.checked.status)
    {
        return None;
    }

    if !(2..=4).contains(&narration.bullets.len()) {
        return None;
    }

    let allowed_numbers = allowed_numeric_tokens(label, resolved, engine);
    let mut narrated_text = vec![narration.title.clone()];
    narrated_text.push(carry.short_reason.clone());
    narrated_text.push(checked.short_reason.clone());
    narrated_text.extend(narration.bullets.iter().cloned());
    narrated_text.extend(narration.badges.iter().cloned());
    if let Some(footnote) = &narration.footnote {
        narrated_text.push(footnote.clone());
    }

    for text in &narrated_text {
        for token in numeric_tokens(text) {
            if !allowed_numbers.contains(&token) {
                return None;
            }
        }
    }

    Some(narration)
}

fn allowed_numeric_tokens(
    label: &str,
    resolved: &ResolvedBags,
    engine: &EngineReport,
) -> HashSet<String> {
    let mut allowed = HashSet::new();
    let mut absorb = |text: &str| {
        for token in numeric_tokens(text) {
            allowed.insert(token);
        }
    };

    absorb(label);
    for badge in resolved.carry_on.badges.iter().chain(resolved.checked.badges.iter()) {
        absorb(badge);
    }
    for (_key, value) in &engine.conditions {
        absorb(&value.to_string());
    }
    absorb(&serde_json::to_string(&engine.params).unwrap_or_default());
    allowed
}

fn numeric_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() || (ch == '.' && !current.is_empty()) {
            current.push(ch);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current).trim_end_matches('.').to_string());
        }
    }
    if !current.is_empty() {
        tokens.push(current.trim_end_matches('.').to_string());
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use carryon_core::models::{ItemParams, ResolvedVerdict};
    use carryon_core::Canonical;

    fn bags() -> ResolvedBags {
        ResolvedBags {
            carry_on: ResolvedVerdict {
                status: DecisionStatus::Limit,
                badges: vec!["100ml".to_string(), "1L zip bag".to_string()],
                reason_codes: vec!["SEC_KR_LAGS".to_string()],
            },
            checked: ResolvedVerdict::allow(),
        }
    }

    fn report() -> EngineReport {
        EngineReport {
            canonical: Canonical::CosmeticsLiquid,
            params: ItemParams {
                volume_ml: Some(150.0),
                ..ItemParams::default()
            },
            applied_rules: vec![],
            conditions: serde_json::Map::new(),
        }
    }

    fn conforming() -> serde_json::Value {
        json!({
            "title": "Toner 150ml",
            "carry_on": {"status_label": "conditional", "short_reason": "Containers up to 100ml in a 1L zip bag"},
            "checked": {"status_label": "allowed", "short_reason": "No restriction in the hold"},
            "bullets": ["Security: 100ml per container", "Pack the 1L zip bag on top"],
            "badges": ["100ml", "1L zip bag"],
            "footnote": null,
            "sources": ["country_security/KR"]
        })
    }

    #[test]
    fn accepts_a_conforming_narration() {
        let narration =
            validate_narration(&conforming().to_string(), "toner 150ml", &bags(), &report());
        assert!(narration.is_some());
    }

    #[test]
    fn rejects_a_changed_verdict() {
        let mut value = conforming();
        value["carry_on"]["status_label"] = json!("allowed");
        let narration =
            validate_narration(&value.to_string(), "toner 150ml", &bags(), &report());
        assert!(narration.is_none());
    }

    #[test]
    fn rejects_an_invented_number() {
        let mut value = conforming();
        value["bullets"] = json!(["Limit is 250ml per container", "Use a zip bag"]);
        let narration =
            validate_narration(&value.to_string(), "toner 150ml", &bags(), &report());
        assert!(narration.is_none());
    }

    #[test]
    fn rejects_wrong_bullet_count() {
        let mut value = conforming();
        value["bullets"] = json!([]);
        let narration =
            validate_narration(&value.to_string(), "toner 150ml", &bags(), &report());
        assert!(narration.is_none());
    }

    #[test]
    fn numeric_tokens_are_extracted_with_decimals() {
        assert_eq!(numeric_tokens("≤2.5 kg and 100ml"), vec!["2.5", "100"]);
        assert!(numeric_tokens("no numbers here").is_empty());
    }
}
