use carryon_core::models::{ClassificationDraft, DecisionStatus};
use carryon_core::Taxonomy;

use crate::resolver::ResolverOutcome;

/// One bag where the draft was less restrictive than the rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictSlot {
    pub bag: &'static str,
    pub draft: DecisionStatus,
    pub resolved: DecisionStatus,
}

#[derive(Debug, Clone, Default)]
pub struct ConflictReport {
    pub slots: Vec<ConflictSlot>,
    pub low_confidence: Option<f64>,
}

impl ConflictReport {
    pub fn has_conflict(&self) -> bool {
        !self.slots.is_empty()
    }

    pub fn requires_review(&self) -> bool {
        self.has_conflict() || self.low_confidence.is_some()
    }
}

/// Compare the model draft with the rule-derived outcome. Rules are
/// authoritative; only the non-monotone direction counts as a conflict.
pub fn reconcile(
    draft: &ClassificationDraft,
    outcome: &ResolverOutcome,
    taxonomy: &Taxonomy,
    confidence_threshold: f64,
) -> ConflictReport {
    let mut report = ConflictReport::default();

    check_slot(
        &mut report,
        "carry_on",
        draft.carry_on.status,
        outcome.carry_on.status,
    );
    check_slot(
        &mut report,
        "checked",
        draft.checked.status,
        outcome.checked.status,
    );

    // A draft that relaxes the taxonomy template is suspect even when no
    // loaded rule fired, e.g. a spare battery drafted as checked=allow.
    let (carry_template, checked_template) = taxonomy.default_verdicts(draft.canonical);
    check_slot(
        &mut report,
        "carry_on",
        draft.carry_on.status,
        carry_template.status,
    );
    check_slot(
        &mut report,
        "checked",
        draft.checked.status,
        checked_template.status,
    );

    if draft.signals.confidence < confidence_threshold || draft.signals.matched_terms.len() < 2 {
        report.low_confidence = Some(draft.signals.confidence);
    }

    report
}

fn check_slot(
    report: &mut ConflictReport,
    bag: &'static str,
    draft: DecisionStatus,
    resolved: DecisionStatus,
) {
    if resolved.restrictiveness() > draft.restrictiveness() {
        let slot = ConflictSlot {
            bag,
            draft,
            resolved,
        };
        if !report.slots.contains(&slot) {
            report.slots.push(slot);
        }
    }
}
