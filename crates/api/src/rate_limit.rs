use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Which budget a request draws from. Preview and classify calls spend
/// model tokens; everything else on the surface is metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    Model,
    Metadata,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    used: u32,
}

/// Fixed-window request budgets keyed by caller identity and route class.
/// Stale windows are swept once the table grows past its bound.
#[derive(Debug, Clone)]
pub struct RequestLimiter {
    window: Duration,
    model_budget: u32,
    metadata_budget: u32,
    windows: Arc<Mutex<HashMap<(String, RouteClass), Window>>>,
}

const MAX_TRACKED_CALLERS: usize = 4096;

impl RequestLimiter {
    pub fn new(window: Duration, model_budget: u32, metadata_budget: u32) -> Self {
        Self {
            window,
            model_budget,
            metadata_budget,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn allow(&self, caller: &str, class: RouteClass) -> bool {
        let budget = match class {
            RouteClass::Model => self.model_budget,
            RouteClass::Metadata => self.metadata_budget,
        };

        let now = Instant::now();
        let mut windows = self.windows.lock();

        if windows.len() > MAX_TRACKED_CALLERS {
            let horizon = self.window;
            windows.retain(|_, window| now.duration_since(window.started) <= horizon);
        }

        let window = windows
            .entry((caller.to_string(), class))
            .or_insert(Window {
                started: now,
                used: 0,
            });
        if now.duration_since(window.started) > self.window {
            window.started = now;
            window.used = 0;
        }

        if window.used >= budget {
            return false;
        }
        window.used += 1;
        true
    }
}
