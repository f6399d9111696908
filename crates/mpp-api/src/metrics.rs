//! Prometheus registry and the service's counters.
use prometheus::{Encoder, Gauge, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct ApiMetrics {
    registry: Registry,
    /// Requests per route.
    pub requests: IntCounterVec,
    /// Vertical runs by outcome: `success`, `unsuccessful`, `failed`.
    pub vertical_runs: IntCounterVec,
    /// Longitudinal runs by outcome: `completed`, `failed`.
    pub optimize_runs: IntCounterVec,
    pub last_optimize_score: Gauge,
}

impl ApiMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let requests = IntCounterVec::new(
            Opts::new("mpp_requests_total", "HTTP requests by route"),
            &["route"],
        )?;
        let vertical_runs = IntCounterVec::new(
            Opts::new("mpp_vertical_runs_total", "Vertical refinement runs by outcome"),
            &["outcome"],
        )?;
        let optimize_runs = IntCounterVec::new(
            Opts::new("mpp_optimize_runs_total", "Longitudinal refinement runs by outcome"),
            &["outcome"],
        )?;
        let last_optimize_score = Gauge::new(
            "mpp_last_optimize_score",
            "Best score of the most recent longitudinal run",
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(vertical_runs.clone()))?;
        registry.register(Box::new(optimize_runs.clone()))?;
        registry.register(Box::new(last_optimize_score.clone()))?;

        Ok(Self {
            registry,
            requests,
            vertical_runs,
            optimize_runs,
            last_optimize_score,
        })
    }

    pub fn hit(&self, route: &str) {
        self.requests.with_label_values(&[route]).inc();
    }

    pub fn encode(&self) -> Result<String, prometheus::Error> {
        encode(&self.registry)
    }
}

pub fn encode(registry: &Registry) -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_exported() {
        let metrics = ApiMetrics::new().unwrap();
        metrics.hit("health");
        metrics.hit("health");
        metrics.vertical_runs.with_label_values(&["success"]).inc();

        let text = metrics.encode().unwrap();
        assert!(text.contains("mpp_requests_total{route=\"health\"} 2"));
        assert!(text.contains("mpp_vertical_runs_total{outcome=\"success\"} 1"));
    }
}
