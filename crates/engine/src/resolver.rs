use std::collections::HashSet;
use std::sync::Arc;

use carryon_core::models::{
    AppliedRule, DecisionStatus, ItemParams, ResolvedVerdict, Severity,
};
use carryon_core::{Canonical, Taxonomy};
use carryon_regstore::{BagTarget, RegulationIndex, RegulationRule, RuleKind};
use serde_json::{Map, Value};
use tracing::debug;

use crate::context::ItineraryContext;

/// Airline baggage-allowance rows apply to every item preview on that
/// carrier, one row family per bag.
const CARRY_ALLOWANCE: &str = "carry_on_allowance";
const CHECKED_ALLOWANCE: &str = "checked_allowance";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    Country,
    Airline,
    International,
}

impl Layer {
    fn priority(self) -> u8 {
        match self {
            Self::Country => 0,
            Self::Airline => 1,
            Self::International => 2,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Country => "country_security",
            Self::Airline => "airline",
            Self::International => "international",
        }
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    rule: Arc<RegulationRule>,
    layer: Layer,
}

#[derive(Debug, Clone)]
pub struct ResolverOutcome {
    pub carry_on: ResolvedVerdict,
    pub checked: ResolvedVerdict,
    pub applied_rules: Vec<AppliedRule>,
    pub conditions: Map<String, Value>,
}

/// Merge the three regulation layers for one canonical and itinerary.
/// Walks matching rules in descending specificity; the lattice
/// `deny > limit > allow` makes the fold monotone, so no rule is visited
/// twice and deny can never be relaxed.
pub fn resolve(
    taxonomy: &Taxonomy,
    index: &RegulationIndex,
    canonical: Canonical,
    ctx: &ItineraryContext,
    params: &ItemParams,
) -> ResolverOutcome {
    let candidates = collect_candidates(taxonomy, index, canonical, ctx);

    let (carry_template, checked_template) = taxonomy.default_verdicts(canonical);
    let mut carry = BagAccumulator::from_template(carry_template.status, &carry_template.badges);
    let mut checked =
        BagAccumulator::from_template(checked_template.status, &checked_template.badges);
    let mut applied_rules = Vec::new();
    let mut conditions = Map::new();

    for candidate in &candidates {
        let rule = candidate.rule.as_ref();
        let to_carry = applies_to_carry(rule);
        let to_checked = applies_to_checked(rule);

        let status = status_for(rule, params, ctx);
        let carry_status = to_carry.then_some(status);
        let checked_status = to_checked.then_some(status);

        let mut caps_used = Map::new();
        if to_carry {
            carry.apply(rule, status, &mut caps_used);
        }
        if to_checked {
            checked.apply(rule, status, &mut caps_used);
        }
        for (key, value) in &caps_used {
            conditions.entry(key.clone()).or_insert_with(|| value.clone());
        }

        applied_rules.push(AppliedRule {
            rule_id: rule.id.clone(),
            layer: candidate.layer.as_str().to_string(),
            code: rule.code.clone(),
            item_category: rule.item_category.clone(),
            carry_on: carry_status,
            checked: checked_status,
            reason_codes: vec![rule.reason_code.clone()],
            caps_used,
        });
    }

    debug!(
        canonical = canonical.as_key(),
        rules = applied_rules.len(),
        carry = carry.status.as_str(),
        checked = checked.status.as_str(),
        "layers resolved"
    );

    ResolverOutcome {
        carry_on: carry.into_verdict(),
        checked: checked.into_verdict(),
        applied_rules,
        conditions,
    }
}

fn collect_candidates(
    taxonomy: &Taxonomy,
    index: &RegulationIndex,
    canonical: Canonical,
    ctx: &ItineraryContext,
) -> Vec<Candidate> {
    use carryon_core::models::Scope;

    let key = canonical.as_key();
    let benign = !taxonomy.is_risk(canonical);
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let mut push = |rule: &Arc<RegulationRule>, layer: Layer| {
        if seen.insert(rule.id.clone()) {
            candidates.push(Candidate {
                rule: rule.clone(),
                layer,
            });
        }
    };

    // L1: country security and customs for origin, via-points, destination.
    for country in &ctx.countries {
        for rule in index.find(Scope::Country, country, key) {
            // A benign canonical only reacts to an explicit prohibition.
            if benign && rule.severity != Severity::Block {
                continue;
            }
            // Checkpoint rules only fire where the bag is screened: the
            // origin, and a via-point only under rescreening.
            if rule.kind == RuleKind::Security && !ctx.has_security_country(country) {
                continue;
            }
            push(rule, Layer::Country);
        }
    }

    if !benign {
        // L2: operating-carrier rules plus the per-bag allowance rows.
        for carrier in &ctx.carriers {
            for rule in index.find(Scope::Airline, carrier, key) {
                push(rule, Layer::Airline);
            }
            for rule in index.find(Scope::Airline, carrier, CARRY_ALLOWANCE) {
                push(rule, Layer::Airline);
            }
            for rule in index.find(Scope::Airline, carrier, CHECKED_ALLOWANCE) {
                push(rule, Layer::Airline);
            }
        }

        // L3: international dangerous goods, keyed on the canonical alone.
        for rule in index.find_international(key) {
            push(rule, Layer::International);
        }
    }

    candidates.retain(|candidate| condition_matches(&candidate.rule, ctx));
    candidates.sort_by(|a, b| {
        b.rule
            .conditions
            .specificity()
            .cmp(&a.rule.conditions.specificity())
            .then(a.layer.priority().cmp(&b.layer.priority()))
            .then(a.rule.id.cmp(&b.rule.id))
    });
    candidates
}

fn condition_matches(rule: &RegulationRule, ctx: &ItineraryContext) -> bool {
    ctx.matches_route(rule.conditions.route_type)
        && ctx.matches_cabin(rule.conditions.cabin_class)
        && ctx.matches_fare(rule.conditions.fare_class.as_deref())
}

fn applies_to_carry(rule: &RegulationRule) -> bool {
    if rule.item_category == CHECKED_ALLOWANCE {
        return false;
    }
    if rule.item_category == CARRY_ALLOWANCE {
        return true;
    }
    rule.bags.map(|bag| bag == BagTarget::CarryOn).unwrap_or(true)
}

fn applies_to_checked(rule: &RegulationRule) -> bool {
    if rule.item_category == CARRY_ALLOWANCE {
        return false;
    }
    if rule.item_category == CHECKED_ALLOWANCE {
        return true;
    }
    rule.bags.map(|bag| bag == BagTarget::Checked).unwrap_or(true)
}

/// Severity to intermediate status: block denies outright, warn denies
/// when a known parameter violates the rule's caps, info is advisory.
fn status_for(rule: &RegulationRule, params: &ItemParams, ctx: &ItineraryContext) -> DecisionStatus {
    match rule.severity {
        Severity::Block => DecisionStatus::Deny,
        Severity::Info => DecisionStatus::Allow,
        Severity::Warn => {
            if violates(rule, params, ctx) {
                DecisionStatus::Deny
            } else {
                DecisionStatus::Limit
            }
        }
    }
}

fn violates(rule: &RegulationRule, params: &ItemParams, ctx: &ItineraryContext) -> bool {
    for (key, value) in &rule.caps {
        let cap = value.as_f64();
        let exceeded = match (key.as_str(), cap) {
            ("max_container_ml", Some(cap)) => params.volume_ml.map(|v| v > cap),
            ("max_wh", Some(cap)) => params.wh.map(|v| v > cap),
            ("max_pieces", Some(cap)) => params.count.map(|v| f64::from(v) > cap),
            ("max_weight_kg", Some(cap)) => params.weight_kg.map(|v| v > cap),
            ("max_abv_percent", Some(cap)) => params.abv_percent.map(|v| v > cap),
            ("max_blade_length_cm", Some(cap)) => params.blade_length_cm.map(|v| v > cap),
            ("max_total_l", Some(cap)) => match (params.volume_ml, params.count) {
                (Some(volume), Some(count)) => Some(volume * f64::from(count) / 1000.0 > cap),
                _ => None,
            },
            ("steb_required", _) => {
                if value.as_bool() == Some(true) {
                    Some(!ctx.duty_free.steb_sealed)
                } else {
                    None
                }
            }
            _ => None,
        };
        if exceeded == Some(true) {
            return true;
        }
    }
    false
}

struct BagAccumulator {
    status: DecisionStatus,
    badges: Vec<String>,
    reason_codes: Vec<String>,
    has_cap_source: bool,
}

impl BagAccumulator {
    fn from_template(status: DecisionStatus, badges: &[String]) -> Self {
        Self {
            status,
            badges: badges.to_vec(),
            reason_codes: Vec::new(),
            has_cap_source: false,
        }
    }

    fn apply(
        &mut self,
        rule: &RegulationRule,
        status: DecisionStatus,
        caps_used: &mut Map<String, Value>,
    ) {
        self.status = self.status.more_restrictive(status);

        for badge in &rule.badges {
            push_unique(&mut self.badges, badge.clone());
        }
        push_unique(&mut self.reason_codes, rule.reason_code.clone());

        // Numeric caps come from the most specific rule only; rules walked
        // later contribute their textual badges but not their numbers.
        if !self.has_cap_source && !rule.caps.is_empty() {
            self.has_cap_source = true;
            for (key, value) in &rule.caps {
                caps_used.insert(key.clone(), value.clone());
                if let Some(badge) = badge_for_cap(key, value) {
                    push_unique(&mut self.badges, badge);
                }
            }
        }
    }

    fn into_verdict(self) -> ResolvedVerdict {
        ResolvedVerdict {
            status: self.status,
            badges: self.badges,
            reason_codes: self.reason_codes,
        }
    }
}

fn push_unique(target: &mut Vec<String>, item: String) {
    if !target.contains(&item) {
        target.push(item);
    }
}

fn badge_for_cap(key: &str, value: &Value) -> Option<String> {
    let number = value.as_f64();
    match key {
        "max_container_ml" => number.map(|v| format!("{}ml", v as i64)),
        "max_total_l" => number.map(|v| {
            if v <= 1.0 {
                "1L zip bag".to_string()
            } else {
                format!("{v}L total")
            }
        }),
        "max_wh" => number.map(|v| format!("{}Wh", v as i64)),
        "max_pieces" => number.map(|v| format!("{}pc", v as i64)),
        "max_weight_kg" => number.map(|v| {
            if v.fract() == 0.0 {
                format!("{}kg", v as i64)
            } else {
                format!("{v:.1}kg")
            }
        }),
        "max_blade_length_cm" => number.map(|v| format!("blade ≤{}cm", v as i64)),
        "max_abv_percent" => number.map(|v| format!("≤{}% ABV", v as i64)),
        "size_sum_cm" => number.map(|v| format!("{}cm", v as i64)),
        "steb_required" if value.as_bool() == Some(true) => Some("STEB sealed".to_string()),
        "airline_approval" if value.as_bool() == Some(true) => Some("Airline approval".to_string()),
        "zip_bag_1l" if value.as_bool() == Some(true) => Some("1L zip bag".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carryon_core::models::{CabinClass, DutyFreeInfo, Itinerary, Segment};
    use carryon_regstore::RegulationStore;

    fn ctx(origin: &str, via: &[&str], destination: &str, rescreening: bool) -> ItineraryContext {
        ItineraryContext::new(
            &Itinerary {
                origin: origin.to_string(),
                via: via.iter().map(|code| code.to_string()).collect(),
                destination: destination.to_string(),
                rescreening,
            },
            &[],
            DutyFreeInfo::default(),
        )
    }

    fn ctx_with_segments(segments: Vec<Segment>) -> ItineraryContext {
        ItineraryContext::new(
            &Itinerary {
                origin: "ICN".to_string(),
                via: vec![],
                destination: "LAX".to_string(),
                rescreening: false,
            },
            &segments,
            DutyFreeInfo::default(),
        )
    }

    fn store(files: &[&str]) -> RegulationStore {
        let mut rules = Vec::new();
        for (index, raw) in files.iter().enumerate() {
            let path = std::path::PathBuf::from(format!("seed{index}.json"));
            rules.extend(carryon_regstore::parse_file(&path, raw).unwrap());
        }
        RegulationStore::from_rules(rules)
    }

    const IATA_SPARE_BATTERY: &str = r#"{
        "scope": "international", "code": "IATA", "rules": [
            {"item_category": "lithium_battery_spare", "severity": "warn",
             "constraints": {"max_wh": 160, "bags": "carry_on",
                             "badges": ["terminal cover"],
                             "reason_code": "DG_IATA_SPARE_LIION"}},
            {"item_category": "lithium_battery_spare", "severity": "block",
             "constraints": {"bags": "checked",
                             "reason_code": "DG_IATA_SPARE_LIION_HOLD"}}
        ]
    }"#;

    const US_AEROSOL: &str = r#"{
        "scope": "country", "code": "US", "rules": [
            {"item_category": "aerosol_toiletry", "severity": "warn",
             "constraints": {"max_container_ml": 500, "max_total_l": 2.0,
                             "badges": ["≤500 ml per container, 2 L total"],
                             "reason_code": "DG_US_AEROSOL"}}
        ]
    }"#;

    const KE_ALLOWANCE: &str = r#"{
        "scope": "airline", "code": "KE", "rules": [
            {"item_category": "carry_on_allowance", "severity": "warn",
             "constraints": {"max_pieces": 1, "max_weight_kg": 10,
                             "reason_code": "AIR_KE_CARRYON"}},
            {"item_category": "carry_on_allowance", "severity": "warn",
             "constraints": {"max_pieces": 2, "max_weight_kg": 18,
                             "route_type": "international",
                             "cabin_class": "prestige",
                             "reason_code": "AIR_KE_CARRYON_PRESTIGE"}}
        ]
    }"#;

    #[test]
    fn block_severity_forces_deny() {
        let store = store(&[IATA_SPARE_BATTERY]);
        let outcome = resolve(
            Taxonomy::builtin(),
            &store.snapshot(),
            Canonical::LithiumBatterySpare,
            &ctx("ICN", &[], "LAX", false),
            &ItemParams {
                wh: Some(90.0),
                count: Some(1),
                ..ItemParams::default()
            },
        );
        assert_eq!(outcome.checked.status, DecisionStatus::Deny);
        assert_eq!(outcome.carry_on.status, DecisionStatus::Limit);
        assert!(outcome
            .carry_on
            .reason_codes
            .contains(&"DG_IATA_SPARE_LIION".to_string()));
    }

    #[test]
    fn warn_with_violated_cap_denies() {
        let store = store(&[IATA_SPARE_BATTERY]);
        let outcome = resolve(
            Taxonomy::builtin(),
            &store.snapshot(),
            Canonical::LithiumBatterySpare,
            &ctx("ICN", &[], "LAX", false),
            &ItemParams {
                wh: Some(200.0),
                count: Some(3),
                ..ItemParams::default()
            },
        );
        assert_eq!(outcome.carry_on.status, DecisionStatus::Deny);
        assert_eq!(outcome.checked.status, DecisionStatus::Deny);
    }

    #[test]
    fn aerosol_on_us_route_gets_country_caps() {
        let store = store(&[US_AEROSOL]);
        let outcome = resolve(
            Taxonomy::builtin(),
            &store.snapshot(),
            Canonical::AerosolToiletry,
            &ctx("ICN", &["PVG"], "LAX", true),
            &ItemParams {
                volume_ml: Some(350.0),
                ..ItemParams::default()
            },
        );
        assert_eq!(outcome.carry_on.status, DecisionStatus::Limit);
        assert_eq!(outcome.checked.status, DecisionStatus::Limit);
        assert!(outcome
            .carry_on
            .badges
            .contains(&"≤500 ml per container, 2 L total".to_string()));
        assert_eq!(outcome.conditions.get("max_container_ml"), Some(&serde_json::json!(500)));
    }

    #[test]
    fn most_specific_rule_supplies_the_caps() {
        let store = store(&[KE_ALLOWANCE]);
        let segments = vec![Segment {
            leg: "ICN-LAX".to_string(),
            operating: "KE".to_string(),
            cabin_class: Some(CabinClass::Prestige),
            fare_class: None,
        }];
        let outcome = resolve(
            Taxonomy::builtin(),
            &store.snapshot(),
            Canonical::CosmeticsLiquid,
            &ctx_with_segments(segments),
            &ItemParams::default(),
        );
        // The prestige rule wins the numerics; the unconditional fallback
        // contributes no cap badges.
        assert!(outcome.carry_on.badges.contains(&"2pc".to_string()));
        assert!(!outcome.carry_on.badges.contains(&"1pc".to_string()));
        assert_eq!(outcome.conditions.get("max_pieces"), Some(&serde_json::json!(2)));
    }

    #[test]
    fn economy_falls_back_to_the_unconditional_allowance() {
        let store = store(&[KE_ALLOWANCE]);
        let segments = vec![Segment {
            leg: "ICN-LAX".to_string(),
            operating: "KE".to_string(),
            cabin_class: Some(CabinClass::Economy),
            fare_class: None,
        }];
        let outcome = resolve(
            Taxonomy::builtin(),
            &store.snapshot(),
            Canonical::CosmeticsLiquid,
            &ctx_with_segments(segments),
            &ItemParams::default(),
        );
        assert!(outcome.carry_on.badges.contains(&"1pc".to_string()));
        assert!(!outcome.carry_on.badges.contains(&"2pc".to_string()));
    }

    const CN_LAGS_SECURITY: &str = r#"{
        "scope": "country", "code": "CN", "rules": [
            {"item_category": "cosmetics_liquid", "severity": "warn",
             "constraints": {"kind": "security", "max_container_ml": 100,
                             "max_total_l": 1.0, "bags": "carry_on",
                             "badges": ["1L zip bag"],
                             "reason_code": "SEC_CN_LAGS"}}
        ]
    }"#;

    #[test]
    fn via_point_security_rules_require_rescreening() {
        let store = store(&[CN_LAGS_SECURITY]);
        let params = ItemParams {
            volume_ml: Some(80.0),
            ..ItemParams::default()
        };

        let unscreened = resolve(
            Taxonomy::builtin(),
            &store.snapshot(),
            Canonical::CosmeticsLiquid,
            &ctx("ICN", &["PVG"], "LAX", false),
            &params,
        );
        assert!(unscreened.applied_rules.is_empty());
        assert!(!unscreened
            .carry_on
            .reason_codes
            .contains(&"SEC_CN_LAGS".to_string()));

        let screened = resolve(
            Taxonomy::builtin(),
            &store.snapshot(),
            Canonical::CosmeticsLiquid,
            &ctx("ICN", &["PVG"], "LAX", true),
            &params,
        );
        assert_eq!(screened.applied_rules.len(), 1);
        assert!(screened
            .carry_on
            .reason_codes
            .contains(&"SEC_CN_LAGS".to_string()));
    }

    #[test]
    fn destination_security_rules_never_screen_the_onward_bag() {
        let us_knife_security = r#"{
            "scope": "country", "code": "US", "rules": [
                {"item_category": "knife", "severity": "block",
                 "constraints": {"kind": "security", "bags": "carry_on",
                                 "reason_code": "SEC_US_KNIFE"}},
                {"item_category": "knife", "severity": "warn",
                 "constraints": {"badges": ["sheathed or wrapped"],
                                 "reason_code": "CTY_US_KNIFE_CUSTOMS"}}
            ]
        }"#;
        let store = store(&[us_knife_security]);
        let outcome = resolve(
            Taxonomy::builtin(),
            &store.snapshot(),
            Canonical::Knife,
            &ctx("ICN", &[], "LAX", false),
            &ItemParams {
                blade_length_cm: Some(8.0),
                ..ItemParams::default()
            },
        );

        // Only the customs rule fires for the destination country.
        assert_eq!(outcome.applied_rules.len(), 1);
        assert_eq!(outcome.applied_rules[0].reason_codes, vec!["CTY_US_KNIFE_CUSTOMS"]);
    }

    #[test]
    fn benign_canonical_ignores_everything_but_country_blocks() {
        let store = store(&[US_AEROSOL, KE_ALLOWANCE]);
        let outcome = resolve(
            Taxonomy::builtin(),
            &store.snapshot(),
            Canonical::BenignGeneral,
            &ctx("ICN", &[], "LAX", false),
            &ItemParams::default(),
        );
        assert_eq!(outcome.carry_on.status, DecisionStatus::Allow);
        assert_eq!(outcome.checked.status, DecisionStatus::Allow);
        assert!(outcome.carry_on.badges.is_empty());
        assert!(outcome.applied_rules.is_empty());
    }

    #[test]
    fn benign_canonical_honors_an_explicit_country_prohibition() {
        let prohibition = r#"{
            "scope": "country", "code": "US", "rules": [
                {"item_category": "benign_general", "severity": "block",
                 "constraints": {"reason_code": "CTY_US_BAN"}}
            ]
        }"#;
        let store = store(&[prohibition]);
        let outcome = resolve(
            Taxonomy::builtin(),
            &store.snapshot(),
            Canonical::BenignGeneral,
            &ctx("ICN", &[], "LAX", false),
            &ItemParams::default(),
        );
        assert_eq!(outcome.carry_on.status, DecisionStatus::Deny);
        assert_eq!(outcome.checked.status, DecisionStatus::Deny);
    }

    #[test]
    fn adding_a_more_restrictive_rule_never_relaxes_the_verdict() {
        let base = store(&[US_AEROSOL]);
        let before = resolve(
            Taxonomy::builtin(),
            &base.snapshot(),
            Canonical::AerosolToiletry,
            &ctx("ICN", &[], "LAX", false),
            &ItemParams {
                volume_ml: Some(350.0),
                ..ItemParams::default()
            },
        );

        let stricter = r#"{
            "scope": "country", "code": "KR", "rules": [
                {"item_category": "aerosol_toiletry", "severity": "block",
                 "constraints": {"reason_code": "SEC_KR_AEROSOL_BAN"}}
            ]
        }"#;
        let extended = store(&[US_AEROSOL, stricter]);
        let after = resolve(
            Taxonomy::builtin(),
            &extended.snapshot(),
            Canonical::AerosolToiletry,
            &ctx("ICN", &[], "LAX", false),
            &ItemParams {
                volume_ml: Some(350.0),
                ..ItemParams::default()
            },
        );

        assert!(after.carry_on.status.restrictiveness() >= before.carry_on.status.restrictiveness());
        assert!(after.checked.status.restrictiveness() >= before.checked.status.restrictiveness());
        assert_eq!(after.carry_on.status, DecisionStatus::Deny);
    }

    #[test]
    fn steb_requirement_violates_without_a_sealed_bag() {
        let steb = r#"{
            "scope": "country", "code": "CN", "rules": [
                {"item_category": "duty_free_liquids_steb", "severity": "warn",
                 "constraints": {"kind": "security", "steb_required": true,
                                 "reason_code": "SEC_CN_STEB"}}
            ]
        }"#;
        let store = store(&[steb]);
        let outcome = resolve(
            Taxonomy::builtin(),
            &store.snapshot(),
            Canonical::DutyFreeLiquidsSteb,
            &ctx("ICN", &["PVG"], "LAX", true),
            &ItemParams {
                volume_ml: Some(1000.0),
                ..ItemParams::default()
            },
        );
        assert_eq!(outcome.carry_on.status, DecisionStatus::Deny);
    }
}
