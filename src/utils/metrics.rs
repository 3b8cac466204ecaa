use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub const RUNS_TOTAL: &str = "runs_total";
pub const RUNS_FAILED: &str = "runs_failed";
pub const LIMIT_VIOLATIONS: &str = "limit_violations";
pub const TIMEOUTS: &str = "timeouts";
pub const LAST_RUN_DURATION_MS: &str = "last_run_duration_ms";

/// Metrics registry (simple, Prometheus-style)
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    counters: Arc<Mutex<HashMap<String, u64>>>,
    gauges: Arc<Mutex<HashMap<String, f64>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_counter(&self, name: &str) {
        *self.counters.lock().entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn set_gauge(&self, name: &str, val: f64) {
        self.gauges.lock().insert(name.to_string(), val);
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> (HashMap<String, u64>, HashMap<String, f64>) {
        (self.counters.lock().clone(), self.gauges.lock().clone())
    }
}

lazy_static! {
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let m = MetricsRegistry::new();
        m.inc_counter(RUNS_TOTAL);
        m.inc_counter(RUNS_TOTAL);
        m.set_gauge(LAST_RUN_DURATION_MS, 12.0);
        assert_eq!(m.counter(RUNS_TOTAL), 2);
        assert_eq!(m.counter(TIMEOUTS), 0);
        let (_, gauges) = m.snapshot();
        assert_eq!(gauges[LAST_RUN_DURATION_MS], 12.0);
    }
}
