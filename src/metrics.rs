/// Prometheus metrics for one catalog run
///
/// Each run owns its own registry; the binary writes the text exposition
/// to `--metrics-file` once the run has finished.
use parking_lot::RwLock;
use prometheus_client::encoding::{EncodeLabelSet, text::encode};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::time::Duration;

use crate::language::Language;

/// Labels for per-object outcomes
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ObjectLabels {
    /// "generated" or "no_images"
    pub outcome: String,
}

/// Labels for generation requests
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct GenerationLabels {
    /// Language code, e.g. "DE"
    pub language: String,
    /// "success", "api_error" or "retries_exhausted"
    pub status: String,
}

pub struct RunMetrics {
    registry: RwLock<Registry>,

    /// Objects written to the output table, by outcome
    pub objects_total: Family<ObjectLabels, Counter>,

    /// Generation calls by language and final status
    pub generation_requests_total: Family<GenerationLabels, Counter>,

    /// Generation call latency including retry sleeps
    pub generation_duration_seconds: Histogram,

    /// Attempts repeated after a rate-limit response
    pub rate_limit_retries_total: Counter,

    /// Image references that did not resolve to a file
    pub missing_images_total: Counter,
}

impl RunMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("catalog");

        let objects_total = Family::<ObjectLabels, Counter>::default();
        registry.register(
            "objects",
            "Objects written to the output table",
            objects_total.clone(),
        );

        let generation_requests_total = Family::<GenerationLabels, Counter>::default();
        registry.register(
            "generation_requests",
            "Generation service calls by language and status",
            generation_requests_total.clone(),
        );

        // Buckets: 0.5s .. ~4.5min
        let generation_duration_seconds = Histogram::new(exponential_buckets(0.5, 2.0, 10));
        registry.register(
            "generation_duration_seconds",
            "Generation call latency in seconds, retries included",
            generation_duration_seconds.clone(),
        );

        let rate_limit_retries_total = Counter::default();
        registry.register(
            "rate_limit_retries",
            "Generation attempts repeated after a rate-limit response",
            rate_limit_retries_total.clone(),
        );

        let missing_images_total = Counter::default();
        registry.register(
            "missing_images",
            "Image references without a file on disk",
            missing_images_total.clone(),
        );

        Self {
            registry: RwLock::new(registry),
            objects_total,
            generation_requests_total,
            generation_duration_seconds,
            rate_limit_retries_total,
            missing_images_total,
        }
    }

    /// Encode metrics in Prometheus text format
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        let registry = self.registry.read();
        encode(&mut buffer, &registry)?;
        Ok(buffer)
    }

    pub fn record_object(&self, outcome: &str) {
        self.objects_total
            .get_or_create(&ObjectLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    pub fn record_generation(&self, language: Language, status: &str, duration: Duration) {
        self.generation_requests_total
            .get_or_create(&GenerationLabels {
                language: language.code().to_string(),
                status: status.to_string(),
            })
            .inc();
        self.generation_duration_seconds
            .observe(duration.as_secs_f64());
    }

    pub fn record_rate_limit_retry(&self) {
        self.rate_limit_retries_total.inc();
    }

    pub fn record_missing_images(&self, count: usize) {
        self.missing_images_total.inc_by(count as u64);
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}
