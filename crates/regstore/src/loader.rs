use std::collections::HashSet;
use std::path::Path;

use carryon_core::models::{CabinClass, RouteType, Scope, Severity};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegulationLoadError {
    #[error("failed reading {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{file}: not valid regulation JSON: {source}")]
    Json {
        file: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{file}: rules[{index}]: {reason}")]
    InvalidRule {
        file: String,
        index: usize,
        reason: String,
    },
    #[error("{file}: {reason}")]
    InvalidFile { file: String, reason: String },
    #[error("{file}: rules[{first}] and rules[{second}] collide on ({category}, {conditions}); \
             add a distinguishing route_type/cabin_class/fare_class")]
    ConditionCollision {
        file: String,
        first: usize,
        second: usize,
        category: String,
        conditions: String,
    },
}

/// Which bag a rule constrains. Absent means both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BagTarget {
    CarryOn,
    Checked,
}

/// Whether a country rule belongs to the screening checkpoint or to the
/// customs and dangerous-goods body of law. Security rules only fire
/// where the passenger is actually screened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleKind {
    Security,
    #[default]
    Customs,
}

/// The optional condition fields carried inside `constraints`. The vector
/// is part of rule identity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConditionVector {
    pub route_type: Option<RouteType>,
    pub cabin_class: Option<CabinClass>,
    pub fare_class: Option<String>,
}

impl ConditionVector {
    pub fn specificity(&self) -> u8 {
        u8::from(self.route_type.is_some())
            + u8::from(self.cabin_class.is_some())
            + u8::from(self.fare_class.is_some())
    }

    fn identity(&self) -> String {
        format!(
            "route_type={:?}, cabin_class={:?}, fare_class={:?}",
            self.route_type, self.cabin_class, self.fare_class
        )
    }
}

/// Immutable regulation record, one per (scope, code, category, conditions).
#[derive(Debug, Clone)]
pub struct RegulationRule {
    pub id: String,
    pub scope: Scope,
    pub code: String,
    pub item_category: String,
    pub severity: Severity,
    pub notes: Option<String>,
    pub conditions: ConditionVector,
    pub bags: Option<BagTarget>,
    pub kind: RuleKind,
    pub badges: Vec<String>,
    pub reason_code: String,
    /// Free-form numeric / boolean caps after the meta keys are lifted out.
    pub caps: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    scope: Scope,
    code: String,
    #[serde(default)]
    #[allow(dead_code)]
    name: Option<String>,
    rules: Vec<RawRule>,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    item_category: String,
    constraints: Map<String, Value>,
    severity: Severity,
    #[serde(default)]
    notes: Option<String>,
}

/// Parse and validate one regulation file into immutable records.
pub fn parse_file(path: &Path, raw: &str) -> Result<Vec<RegulationRule>, RegulationLoadError> {
    let file = path.display().to_string();

    let parsed: RawFile = serde_json::from_str(raw).map_err(|source| RegulationLoadError::Json {
        file: file.clone(),
        source,
    })?;

    let code = parsed.code.trim().to_uppercase();
    if code.is_empty() && parsed.scope != Scope::International {
        return Err(RegulationLoadError::InvalidFile {
            file,
            reason: "code must not be empty for airline/country scope".to_string(),
        });
    }
    if parsed.rules.is_empty() {
        return Err(RegulationLoadError::InvalidFile {
            file,
            reason: "rules array is empty".to_string(),
        });
    }

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut first_index: Vec<((String, String), usize)> = Vec::new();
    let mut rules = Vec::with_capacity(parsed.rules.len());

    for (index, raw_rule) in parsed.rules.iter().enumerate() {
        let category = raw_rule.item_category.trim().to_string();
        if category.is_empty() {
            return Err(RegulationLoadError::InvalidRule {
                file,
                index,
                reason: "item_category must not be empty".to_string(),
            });
        }

        let rule = build_rule(&file, index, parsed.scope, &code, &category, raw_rule)?;

        let identity = (category.clone(), rule.conditions.identity());
        if !seen.insert(identity.clone()) {
            let first = first_index
                .iter()
                .find(|(key, _)| *key == identity)
                .map(|(_, idx)| *idx)
                .unwrap_or(0);
            return Err(RegulationLoadError::ConditionCollision {
                file,
                first,
                second: index,
                category,
                conditions: rule.conditions.identity(),
            });
        }
        first_index.push((identity, index));
        rules.push(rule);
    }

    Ok(rules)
}

fn build_rule(
    file: &str,
    index: usize,
    scope: Scope,
    code: &str,
    category: &str,
    raw: &RawRule,
) -> Result<RegulationRule, RegulationLoadError> {
    let invalid = |reason: String| RegulationLoadError::InvalidRule {
        file: file.to_string(),
        index,
        reason,
    };

    let mut caps = raw.constraints.clone();

    let route_type = take_enum::<RouteType>(&mut caps, "route_type")
        .map_err(|value| invalid(format!("route_type has out-of-enum value {value}")))?;
    let cabin_class = take_enum::<CabinClass>(&mut caps, "cabin_class")
        .map_err(|value| invalid(format!("cabin_class has out-of-enum value {value}")))?;
    let fare_class = match caps.remove("fare_class") {
        None | Some(Value::Null) => None,
        Some(Value::String(fare)) => Some(fare.trim().to_uppercase()),
        Some(other) => return Err(invalid(format!("fare_class must be a string, got {other}"))),
    };

    let kind = match caps.remove("kind") {
        None | Some(Value::Null) => RuleKind::Customs,
        Some(Value::String(kind)) => match kind.as_str() {
            "security" => RuleKind::Security,
            "customs" => RuleKind::Customs,
            other => return Err(invalid(format!("kind has out-of-enum value {other:?}"))),
        },
        Some(other) => return Err(invalid(format!("kind must be a string, got {other}"))),
    };

    let bags = match caps.remove("bags") {
        None | Some(Value::Null) => None,
        Some(Value::String(bag)) => match bag.as_str() {
            "carry_on" => Some(BagTarget::CarryOn),
            "checked" => Some(BagTarget::Checked),
            other => return Err(invalid(format!("bags has out-of-enum value {other:?}"))),
        },
        Some(other) => return Err(invalid(format!("bags must be a string, got {other}"))),
    };

    let badges = match caps.remove("badges") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(text) => Ok(text),
                other => Err(invalid(format!("badges entries must be strings, got {other}"))),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => return Err(invalid(format!("badges must be an array, got {other}"))),
    };

    let reason_code = match caps.remove("reason_code") {
        None | Some(Value::Null) => default_reason_code(scope, code, category),
        Some(Value::String(reason)) => reason,
        Some(other) => {
            return Err(invalid(format!("reason_code must be a string, got {other}")))
        }
    };

    for (key, value) in &caps {
        if key.starts_with("max_") || key.starts_with("min_") {
            let numeric = value.as_f64();
            match numeric {
                Some(number) if number.is_finite() && number >= 0.0 => {}
                _ => {
                    return Err(invalid(format!(
                        "{key} must be a finite non-negative number, got {value}"
                    )))
                }
            }
        }
    }

    Ok(RegulationRule {
        id: format!("{}:{}:{}:{}", scope.as_str(), code, category, index),
        scope,
        code: code.to_string(),
        item_category: category.to_string(),
        severity: raw.severity,
        notes: raw.notes.clone(),
        conditions: ConditionVector {
            route_type,
            cabin_class,
            fare_class,
        },
        bags,
        kind,
        badges,
        reason_code,
        caps,
    })
}

fn take_enum<T: serde::de::DeserializeOwned>(
    caps: &mut Map<String, Value>,
    key: &str,
) -> Result<Option<T>, String> {
    match caps.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value::<T>(value.clone())
            .map(Some)
            .map_err(|_| value.to_string()),
    }
}

fn default_reason_code(scope: Scope, code: &str, category: &str) -> String {
    let code = if code.is_empty() { "INTL" } else { code };
    format!(
        "{}_{}_{}",
        scope.as_str().to_uppercase(),
        code,
        category.to_uppercase()
    )
}
