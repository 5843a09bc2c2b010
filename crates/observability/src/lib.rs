use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Default)]
pub struct AppMetrics {
    previews_total: AtomicU64,
    preview_cache_hits_total: AtomicU64,
    llm_calls_total: AtomicU64,
    llm_failures_total: AtomicU64,
    reviews_total: AtomicU64,
    reloads_total: AtomicU64,
    rate_limited_total: AtomicU64,
    total_latency_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub previews_total: u64,
    pub preview_cache_hits_total: u64,
    pub llm_calls_total: u64,
    pub llm_failures_total: u64,
    pub reviews_total: u64,
    pub reloads_total: u64,
    pub rate_limited_total: u64,
    pub avg_latency_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_preview(&self) {
        self.previews_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_hit(&self) {
        self.preview_cache_hits_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_llm_call(&self) {
        self.llm_calls_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_llm_failure(&self) {
        self.llm_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_review(&self) {
        self.reviews_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reload(&self) {
        self.reloads_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rate_limited(&self) {
        self.rate_limited_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let previews = self.previews_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            previews_total: previews,
            preview_cache_hits_total: self.preview_cache_hits_total.load(Ordering::Relaxed),
            llm_calls_total: self.llm_calls_total.load(Ordering::Relaxed),
            llm_failures_total: self.llm_failures_total.load(Ordering::Relaxed),
            reviews_total: self.reviews_total.load(Ordering::Relaxed),
            reloads_total: self.reloads_total.load(Ordering::Relaxed),
            rate_limited_total: self.rate_limited_total.load(Ordering::Relaxed),
            avg_latency_millis: if previews == 0 {
                0.0
            } else {
                latency as f64 / previews as f64
            },
        }
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,carryon_api=info,carryon_agents=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let metrics = AppMetrics::default();
        metrics.inc_preview();
        metrics.inc_preview();
        metrics.inc_cache_hit();
        metrics.observe_latency(Duration::from_millis(30));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.previews_total, 2);
        assert_eq!(snapshot.preview_cache_hits_total, 1);
        assert_eq!(snapshot.avg_latency_millis, 15.0);
    }
}
