//! Key Ring, Validation and Store Metrics
//!
//! Provides Prometheus metrics for key set refreshes, token validation
//! outcomes and document store latency.

use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};

const NAMESPACE: &str = "project_api";

/// Core metrics shared by the key ring, validator and repository
#[derive(Clone)]
pub struct CoreMetrics {
    /// Key set fetches by outcome (success, failure)
    pub key_set_fetches: CounterVec,
    /// Key lookups by result (hit, miss, stale)
    pub key_lookups: CounterVec,
    /// Token validations by outcome code
    pub validations: CounterVec,
    /// Store call latency by operation
    pub store_latency: HistogramVec,
    /// Store call failures by operation and error code
    pub store_errors: CounterVec,
}

impl CoreMetrics {
    /// Creates metrics registered in the given registry
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let metrics = Self::unregistered()?;
        registry.register(Box::new(metrics.key_set_fetches.clone()))?;
        registry.register(Box::new(metrics.key_lookups.clone()))?;
        registry.register(Box::new(metrics.validations.clone()))?;
        registry.register(Box::new(metrics.store_latency.clone()))?;
        registry.register(Box::new(metrics.store_errors.clone()))?;
        Ok(metrics)
    }

    /// Creates metrics that are not exported anywhere (tests, embedded use)
    pub fn unregistered() -> Result<Self, prometheus::Error> {
        let key_set_fetches = CounterVec::new(
            Opts::new("key_set_fetches_total", "Total signing key set fetches")
                .namespace(NAMESPACE),
            &["outcome"],
        )?;

        let key_lookups = CounterVec::new(
            Opts::new("key_lookups_total", "Total signing key lookups").namespace(NAMESPACE),
            &["result"],
        )?;

        let validations = CounterVec::new(
            Opts::new("token_validations_total", "Total bearer token validations")
                .namespace(NAMESPACE),
            &["outcome"],
        )?;

        let store_latency = HistogramVec::new(
            HistogramOpts::new("store_latency_seconds", "Document store call latency")
                .namespace(NAMESPACE)
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;

        let store_errors = CounterVec::new(
            Opts::new("store_errors_total", "Total document store failures").namespace(NAMESPACE),
            &["operation", "code"],
        )?;

        Ok(Self {
            key_set_fetches,
            key_lookups,
            validations,
            store_latency,
            store_errors,
        })
    }

    /// Records a key set fetch
    pub fn record_fetch(&self, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.key_set_fetches.with_label_values(&[outcome]).inc();
    }

    /// Number of successful key set fetches so far
    pub fn successful_fetches(&self) -> u64 {
        self.key_set_fetches.with_label_values(&["success"]).get() as u64
    }

    /// Records a key lookup result
    pub fn record_lookup(&self, result: &str) {
        self.key_lookups.with_label_values(&[result]).inc();
    }

    /// Records a validation outcome
    pub fn record_validation(&self, outcome: &str) {
        self.validations.with_label_values(&[outcome]).inc();
    }

    /// Records a store call
    pub fn record_store_call(&self, operation: &str, latency_secs: f64, error_code: Option<&str>) {
        self.store_latency
            .with_label_values(&[operation])
            .observe(latency_secs);
        if let Some(code) = error_code {
            self.store_errors.with_label_values(&[operation, code]).inc();
        }
    }
}

impl std::fmt::Debug for CoreMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreMetrics").finish_non_exhaustive()
    }
}
