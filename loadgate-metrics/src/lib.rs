pub mod agg;
pub mod histogram;

pub use agg::{RateStats, rate_between};
pub use histogram::{Error, HistogramSummary, LatencyBuckets, LatencyHistogram};
