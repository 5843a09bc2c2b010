mod loader;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use carryon_core::models::Scope;
use parking_lot::RwLock;
use tracing::info;
use walkdir::WalkDir;

pub use loader::{
    parse_file, BagTarget, ConditionVector, RegulationLoadError, RegulationRule, RuleKind,
};

/// Immutable snapshot of every loaded rule, indexed for the resolver.
#[derive(Debug, Default)]
pub struct RegulationIndex {
    by_key: HashMap<(Scope, String, String), Vec<Arc<RegulationRule>>>,
    by_scope_code: HashMap<(Scope, String), Vec<Arc<RegulationRule>>>,
    international_by_category: HashMap<String, Vec<Arc<RegulationRule>>>,
    files_loaded: usize,
}

impl RegulationIndex {
    fn insert(&mut self, rule: RegulationRule) {
        let rule = Arc::new(rule);
        self.by_key
            .entry((rule.scope, rule.code.clone(), rule.item_category.clone()))
            .or_default()
            .push(rule.clone());
        self.by_scope_code
            .entry((rule.scope, rule.code.clone()))
            .or_default()
            .push(rule.clone());
        if rule.scope == Scope::International {
            self.international_by_category
                .entry(rule.item_category.clone())
                .or_default()
                .push(rule);
        }
    }

    /// All records (including conditional variants) for one lookup key.
    pub fn find(&self, scope: Scope, code: &str, item_category: &str) -> &[Arc<RegulationRule>] {
        self.by_key
            .get(&(scope, code.to_uppercase(), item_category.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn find_scope(&self, scope: Scope, code: &str) -> &[Arc<RegulationRule>] {
        self.by_scope_code
            .get(&(scope, code.to_uppercase()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// International dangerous-goods rules are keyed on the category alone,
    /// whichever publisher code the file carried.
    pub fn find_international(&self, item_category: &str) -> &[Arc<RegulationRule>] {
        self.international_by_category
            .get(item_category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn rule_count(&self) -> usize {
        self.by_key.values().map(Vec::len).sum()
    }

    pub fn file_count(&self) -> usize {
        self.files_loaded
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ReloadSummary {
    pub files_loaded: usize,
    pub rules_loaded: usize,
}

/// Loads rule files at startup and republishes the whole index
/// atomically on an operator reload signal. In-flight previews keep the
/// snapshot they cloned.
#[derive(Debug)]
pub struct RegulationStore {
    dir: Option<PathBuf>,
    index: RwLock<Arc<RegulationIndex>>,
}

impl RegulationStore {
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let index = build_index(&dir)?;
        Ok(Self {
            dir: Some(dir),
            index: RwLock::new(Arc::new(index)),
        })
    }

    /// In-memory store for tests and for running without regulation data.
    pub fn from_rules(rules: Vec<RegulationRule>) -> Self {
        let mut index = RegulationIndex::default();
        for rule in rules {
            index.insert(rule);
        }
        Self {
            dir: None,
            index: RwLock::new(Arc::new(index)),
        }
    }

    pub fn empty() -> Self {
        Self::from_rules(Vec::new())
    }

    /// Current published index. Callers hold the `Arc` for the duration of
    /// one preview so a concurrent reload cannot shift rules under them.
    pub fn snapshot(&self) -> Arc<RegulationIndex> {
        self.index.read().clone()
    }

    /// Rebuild from disk and swap the published pointer. A failed rebuild
    /// leaves the current index serving.
    pub fn reload(&self) -> Result<ReloadSummary> {
        let dir = self
            .dir
            .as_ref()
            .context("store was built in memory; nothing to reload")?;
        let index = build_index(dir)?;
        let summary = ReloadSummary {
            files_loaded: index.file_count(),
            rules_loaded: index.rule_count(),
        };
        *self.index.write() = Arc::new(index);
        info!(
            files = summary.files_loaded,
            rules = summary.rules_loaded,
            "regulation index reloaded"
        );
        Ok(summary)
    }
}

fn build_index(dir: &Path) -> Result<RegulationIndex> {
    let mut index = RegulationIndex::default();

    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry.path().extension().and_then(|ext| ext.to_str()) == Some("json")
        })
        .map(|entry| entry.into_path())
        .collect();
    paths.sort();

    for path in paths {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed reading regulation file {}", path.display()))?;
        let rules = loader::parse_file(&path, &raw)?;
        for rule in rules {
            index.insert(rule);
        }
        index.files_loaded += 1;
    }

    info!(
        dir = %dir.display(),
        files = index.file_count(),
        rules = index.rule_count(),
        "regulation index built"
    );
    Ok(index)
}
