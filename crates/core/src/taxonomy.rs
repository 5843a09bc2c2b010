use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::canonical::Canonical;
use crate::label::normalize_label;
use crate::models::{DecisionStatus, ItemParams, ParamName};

const RISK_KEYS_JSON: &str = include_str!("../../../data/taxonomy/risk_keys.json");
const BENIGN_KEYS_JSON: &str = include_str!("../../../data/taxonomy/benign_keys.json");
const REQUIRED_PARAMS_JSON: &str = include_str!("../../../data/taxonomy/required_params.json");
const DEFAULT_VERDICTS_JSON: &str = include_str!("../../../data/taxonomy/default_verdicts.json");
const SYNONYMS_JSON: &str = include_str!("../../../data/taxonomy/synonyms.json");

static BUILTIN: Lazy<Taxonomy> = Lazy::new(|| {
    Taxonomy::from_sources(
        RISK_KEYS_JSON,
        BENIGN_KEYS_JSON,
        REQUIRED_PARAMS_JSON,
        DEFAULT_VERDICTS_JSON,
        SYNONYMS_JSON,
    )
    .expect("embedded taxonomy data is valid")
});

/// Constant per-bag default encoding the field-safe verdict for a family.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VerdictTemplate {
    pub status: DecisionStatus,
    #[serde(default)]
    pub badges: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ParamSpec {
    #[serde(default)]
    required: Vec<ParamName>,
    #[serde(default)]
    optional: Vec<ParamName>,
    #[serde(default)]
    any_of: Vec<ParamName>,
}

#[derive(Debug, Clone, Deserialize)]
struct SynonymEntry {
    value: String,
    #[serde(default = "default_match_type")]
    match_type: String,
}

fn default_match_type() -> String {
    "substring".to_string()
}

#[derive(Debug, Clone)]
struct SynonymRule {
    canonical: Canonical,
    token: String,
    exact: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct TemplatePair {
    carry_on: VerdictTemplate,
    checked: VerdictTemplate,
}

/// The closed taxonomy. One loaded instance backs both the classifier
/// prompt and the runtime guard so the two cannot drift.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    risk_order: Vec<Canonical>,
    risk: HashSet<Canonical>,
    benign_order: Vec<Canonical>,
    params: HashMap<Canonical, ParamSpec>,
    verdicts: HashMap<Canonical, TemplatePair>,
    synonyms: Vec<SynonymRule>,
}

impl Taxonomy {
    pub fn builtin() -> &'static Taxonomy {
        &BUILTIN
    }

    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Taxonomy> {
        let dir = dir.as_ref();
        let read = |name: &str| -> Result<String> {
            std::fs::read_to_string(dir.join(name))
                .with_context(|| format!("failed reading taxonomy file {}", dir.join(name).display()))
        };
        Taxonomy::from_sources(
            &read("risk_keys.json")?,
            &read("benign_keys.json")?,
            &read("required_params.json")?,
            &read("default_verdicts.json")?,
            &read("synonyms.json")?,
        )
    }

    fn from_sources(
        risk_json: &str,
        benign_json: &str,
        params_json: &str,
        verdicts_json: &str,
        synonyms_json: &str,
    ) -> Result<Taxonomy> {
        let risk_keys: Vec<String> =
            serde_json::from_str(risk_json).context("risk_keys.json is not a string array")?;
        let benign_keys: Vec<String> =
            serde_json::from_str(benign_json).context("benign_keys.json is not a string array")?;
        let raw_params: HashMap<String, ParamSpec> =
            serde_json::from_str(params_json).context("required_params.json is malformed")?;
        let raw_verdicts: HashMap<String, TemplatePair> =
            serde_json::from_str(verdicts_json).context("default_verdicts.json is malformed")?;
        let raw_synonyms: HashMap<String, Vec<SynonymEntry>> =
            serde_json::from_str(synonyms_json).context("synonyms.json is malformed")?;

        if risk_keys.is_empty() {
            bail!("risk_keys.json must list at least one key");
        }

        let parse_key = |key: &str, file: &str| -> Result<Canonical> {
            Canonical::parse(key)
                .with_context(|| format!("{file}: unknown canonical key {key:?}"))
        };

        let mut risk_order = Vec::with_capacity(risk_keys.len());
        for key in &risk_keys {
            risk_order.push(parse_key(key, "risk_keys.json")?);
        }
        let risk: HashSet<Canonical> = risk_order.iter().copied().collect();

        let mut benign_order = Vec::with_capacity(benign_keys.len());
        for key in &benign_keys {
            let canonical = parse_key(key, "benign_keys.json")?;
            if risk.contains(&canonical) {
                bail!("benign_keys.json: {key:?} is already listed as a risk key");
            }
            benign_order.push(canonical);
        }

        let mut params = HashMap::new();
        for (key, spec) in raw_params {
            let canonical = parse_key(&key, "required_params.json")?;
            if !risk.contains(&canonical) {
                bail!("required_params.json: {key:?} is not a risk key");
            }
            params.insert(canonical, spec);
        }

        let mut verdicts = HashMap::new();
        for (key, pair) in raw_verdicts {
            verdicts.insert(parse_key(&key, "default_verdicts.json")?, pair);
        }
        for canonical in risk_order.iter().chain(benign_order.iter()) {
            if !verdicts.contains_key(canonical) {
                bail!(
                    "default_verdicts.json: missing template for {:?}",
                    canonical.as_key()
                );
            }
        }

        let mut synonyms = Vec::new();
        for (key, entries) in raw_synonyms {
            let canonical = parse_key(&key, "synonyms.json")?;
            for entry in entries {
                let exact = match entry.match_type.as_str() {
                    "exact" => true,
                    "substring" => false,
                    other => bail!("synonyms.json: unknown match_type {other:?} for {key:?}"),
                };
                synonyms.push(SynonymRule {
                    canonical,
                    token: normalize_label(&entry.value),
                    exact,
                });
            }
        }
        // Longer tokens first so the most specific synonym wins.
        synonyms.sort_by(|a, b| b.token.len().cmp(&a.token.len()));

        Ok(Taxonomy {
            risk_order,
            risk,
            benign_order,
            params,
            verdicts,
            synonyms,
        })
    }

    pub fn is_risk(&self, canonical: Canonical) -> bool {
        self.risk.contains(&canonical)
    }

    pub fn required_params(&self, canonical: Canonical) -> &[ParamName] {
        self.params
            .get(&canonical)
            .map(|spec| spec.required.as_slice())
            .unwrap_or(&[])
    }

    pub fn optional_params(&self, canonical: Canonical) -> &[ParamName] {
        self.params
            .get(&canonical)
            .map(|spec| spec.optional.as_slice())
            .unwrap_or(&[])
    }

    /// Required slots that are absent from `params`. For families declaring
    /// an any-of group, the whole group is reported when no member is set.
    pub fn missing_params(&self, canonical: Canonical, params: &ItemParams) -> Vec<ParamName> {
        let Some(spec) = self.params.get(&canonical) else {
            return Vec::new();
        };

        let mut missing: Vec<ParamName> = spec
            .required
            .iter()
            .copied()
            .filter(|name| params.get(*name).is_none())
            .collect();

        if !spec.any_of.is_empty() && spec.any_of.iter().all(|name| params.get(*name).is_none()) {
            missing.extend(spec.any_of.iter().copied());
        }

        missing
    }

    pub fn default_verdicts(&self, canonical: Canonical) -> (&VerdictTemplate, &VerdictTemplate) {
        static ALLOW_ALL: Lazy<TemplatePair> = Lazy::new(|| TemplatePair {
            carry_on: VerdictTemplate {
                status: DecisionStatus::Allow,
                badges: Vec::new(),
            },
            checked: VerdictTemplate {
                status: DecisionStatus::Allow,
                badges: Vec::new(),
            },
        });

        let pair = self.verdicts.get(&canonical).unwrap_or(&ALLOW_ALL);
        (&pair.carry_on, &pair.checked)
    }

    /// Keys in prompt order: risk first, then benign.
    pub fn allowed_keys(&self) -> Vec<&'static str> {
        self.risk_order
            .iter()
            .chain(self.benign_order.iter())
            .map(|canonical| canonical.as_key())
            .collect()
    }

    pub fn risk_keys(&self) -> &[Canonical] {
        &self.risk_order
    }

    /// Synonym lookup over the normalized label. Used as a prompt hint and
    /// to recover a canonical when the model payload fails validation.
    pub fn synonym_hint(&self, label: &str) -> Option<Canonical> {
        let norm = normalize_label(label);
        if norm.is_empty() {
            return None;
        }

        for rule in &self.synonyms {
            let hit = if rule.exact {
                norm == rule.token
            } else {
                norm.contains(&rule.token)
            };
            if hit {
                return Some(rule.canonical);
            }
        }
        None
    }
}
