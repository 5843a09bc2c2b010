use once_cell::sync::Lazy;
use regex::Regex;

static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Collapse whitespace and case for cache keys, synonym lookup and
/// matched-term checks. Spelling variants the classifier corpus produced
/// are folded here, not downstream.
pub fn normalize_label(label: &str) -> String {
    if label.trim().is_empty() {
        return String::new();
    }

    let lowered = label.trim().to_lowercase();
    let collapsed = SPACE_RE.replace_all(&lowered, " ").to_string();
    collapsed
        .replace("e-cig", "ecig")
        .replace("보조 배터리", "보조배터리")
}
