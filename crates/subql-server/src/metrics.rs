//! Prometheus metrics

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;
use subql_engine::PlanEncoding;

pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    errors: IntCounterVec,
    plans: IntCounterVec,
    duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let requests = IntCounterVec::new(
            Opts::new("subql_requests_total", "Requests handled, by route and status"),
            &["route", "status"],
        )?;
        let errors = IntCounterVec::new(
            Opts::new("subql_errors_total", "Failed requests, by error kind"),
            &["kind"],
        )?;
        let plans = IntCounterVec::new(
            Opts::new("subql_plans_total", "Substrait plans produced or consumed, by encoding"),
            &["direction", "encoding"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new("subql_request_duration_seconds", "Request latency"),
            &["route"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(plans.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            requests,
            errors,
            plans,
            duration,
        })
    }

    pub fn observe(&self, route: &str, status: u16, elapsed: Duration) {
        self.requests
            .with_label_values(&[route, &status.to_string()])
            .inc();
        self.duration
            .with_label_values(&[route])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_error(&self, kind: &str) {
        self.errors.with_label_values(&[kind]).inc();
    }

    pub fn record_plan(&self, direction: &str, encoding: PlanEncoding) {
        self.plans
            .with_label_values(&[direction, &encoding.to_string()])
            .inc();
    }

    /// Text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_after_observation() {
        let metrics = Metrics::new().unwrap();
        metrics.observe("/sql", 200, Duration::from_millis(3));
        metrics.record_error("malformed_plan");
        metrics.record_plan("consumed", PlanEncoding::Json);

        let text = metrics.render().unwrap();
        assert!(text.contains("subql_requests_total{route=\"/sql\",status=\"200\"} 1"));
        assert!(text.contains("subql_errors_total{kind=\"malformed_plan\"} 1"));
        assert!(text.contains("subql_plans_total{direction=\"consumed\",encoding=\"json\"} 1"));
        assert!(text.contains("subql_request_duration_seconds_count{route=\"/sql\"} 1"));
    }
}
