use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};

/// Highest trackable latency: 1 hour in microseconds.
const MAX_TRACKABLE_MICROS: u64 = 3_600_000_000;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid latency bucket (value={value}, count={count}): {reason}")]
    InvalidBucket {
        value: u64,
        count: u64,
        reason: String,
    },

    #[error("failed to merge latency histograms: {0}")]
    Merge(String),
}

/// Latency distribution statistics. All values are in microseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub count: u64,
}

/// Wire form of a [`LatencyHistogram`]: `(value_micros, count)` pairs for every
/// non-empty bucket, in ascending value order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LatencyBuckets(pub Vec<(u64, u64)>);

impl LatencyBuckets {
    pub fn total_count(&self) -> u64 {
        self.0.iter().fold(0u64, |acc, (_, n)| acc.saturating_add(*n))
    }
}

/// Mergeable latency histogram recorded in microseconds.
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    inner: Histogram<u64>,
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self {
            inner: new_default_histogram(),
        }
    }
}

fn new_default_histogram() -> Histogram<u64> {
    match Histogram::<u64>::new_with_bounds(1, MAX_TRACKABLE_MICROS, 3) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

impl LatencyHistogram {
    /// Records one observation. Values outside the trackable range are clamped.
    pub fn record_micros(&mut self, micros: u64) {
        self.inner.saturating_record(micros.clamp(1, MAX_TRACKABLE_MICROS));
    }

    /// Adds `other` into `self`. On error `self` may hold a partial merge.
    pub fn merge(&mut self, other: &LatencyHistogram) -> Result<(), Error> {
        self.inner
            .add(&other.inner)
            .map_err(|err| Error::Merge(format!("{err:?}")))
    }

    pub fn len(&self) -> u64 {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn summary(&self) -> HistogramSummary {
        summarize_histogram(&self.inner)
    }

    pub fn to_buckets(&self) -> LatencyBuckets {
        LatencyBuckets(
            self.inner
                .iter_recorded()
                .map(|v| (v.value_iterated_to(), v.count_at_value()))
                .collect(),
        )
    }

    pub fn from_buckets(buckets: &LatencyBuckets) -> Result<Self, Error> {
        let mut out = Self::default();
        for &(value, count) in &buckets.0 {
            if value == 0 || value > MAX_TRACKABLE_MICROS {
                return Err(Error::InvalidBucket {
                    value,
                    count,
                    reason: "value out of range".to_string(),
                });
            }
            out.inner
                .record_n(value, count)
                .map_err(|err| Error::InvalidBucket {
                    value,
                    count,
                    reason: format!("{err:?}"),
                })?;
        }
        Ok(out)
    }
}

fn summarize_histogram(h: &Histogram<u64>) -> HistogramSummary {
    let count = h.len();
    let map_val = |v| v as f64;

    HistogramSummary {
        p50: (count > 0).then(|| map_val(h.value_at_quantile(0.50))),
        p75: (count > 0).then(|| map_val(h.value_at_quantile(0.75))),
        p90: (count > 0).then(|| map_val(h.value_at_quantile(0.90))),
        p95: (count > 0).then(|| map_val(h.value_at_quantile(0.95))),
        p99: (count > 0).then(|| map_val(h.value_at_quantile(0.99))),
        min: (count > 0).then(|| map_val(h.min())),
        max: (count > 0).then(|| map_val(h.max())),
        mean: (count > 0).then(|| h.mean()),
        stdev: (count > 0).then(|| h.stdev()),
        count,
    }
}
