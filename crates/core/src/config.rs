use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::canonical::Canonical;

/// Runtime configuration, read once at startup. Temperature is fixed at
/// zero and deny monotonicity is not configurable.
#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    pub gemini_api_key: Option<String>,
    pub model_name: String,
    pub llm_max_tokens: u32,
    pub llm_timeout: Duration,
    pub narration_timeout: Duration,
    pub narration_enabled: bool,
    pub confidence_threshold: f64,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub regulation_dir: PathBuf,
    pub taxonomy_dir: Option<PathBuf>,
    pub always_review: Vec<Canonical>,
    pub api_key: String,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            model_name: "gemini-2.0-flash".to_string(),
            llm_max_tokens: 1024,
            llm_timeout: Duration::from_secs(8),
            narration_timeout: Duration::from_secs(5),
            narration_enabled: true,
            confidence_threshold: 0.55,
            cache_ttl: Duration::from_secs(600),
            cache_capacity: 2048,
            regulation_dir: PathBuf::from("data/regulations"),
            taxonomy_dir: None,
            always_review: Vec::new(),
            api_key: "dev-carryon-key".to_string(),
        }
    }
}

impl AdvisorConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.gemini_api_key = read("CARRYON_GEMINI_API_KEY");
        if let Some(model) = read("CARRYON_GEMINI_MODEL") {
            config.model_name = model;
        }
        if let Some(tokens) = read_parsed::<u32>("CARRYON_LLM_MAX_TOKENS") {
            config.llm_max_tokens = tokens;
        }
        if let Some(secs) = read_parsed::<u64>("CARRYON_LLM_TIMEOUT_SECS") {
            config.llm_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = read_parsed::<u64>("CARRYON_NARRATION_TIMEOUT_SECS") {
            config.narration_timeout = Duration::from_secs(secs);
        }
        if let Some(flag) = read("CARRYON_NARRATION_ENABLED") {
            config.narration_enabled = flag != "0" && !flag.eq_ignore_ascii_case("false");
        }
        if let Some(threshold) = read_parsed::<f64>("CARRYON_CONFIDENCE_THRESHOLD") {
            config.confidence_threshold = threshold.clamp(0.0, 1.0);
        }
        if let Some(secs) = read_parsed::<u64>("CARRYON_PREVIEW_CACHE_TTL_SECS") {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(capacity) = read_parsed::<usize>("CARRYON_CACHE_CAPACITY") {
            config.cache_capacity = capacity.max(16);
        }
        if let Some(dir) = read("CARRYON_REGULATION_DIR") {
            config.regulation_dir = PathBuf::from(dir);
        }
        config.taxonomy_dir = read("CARRYON_TAXONOMY_DIR").map(PathBuf::from);
        if let Some(list) = read("CARRYON_ALWAYS_REVIEW") {
            config.always_review = list
                .split(',')
                .filter_map(|key| Canonical::parse(key))
                .collect();
        }
        if let Some(key) = read("CARRYON_API_KEY") {
            config.api_key = key;
        }

        config
    }
}

fn read(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    read(key).and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AdvisorConfig::default();
        assert_eq!(config.llm_timeout, Duration::from_secs(8));
        assert_eq!(config.narration_timeout, Duration::from_secs(5));
        assert!(config.confidence_threshold > 0.0 && config.confidence_threshold < 1.0);
        assert!(config.gemini_api_key.is_none());
    }
}
