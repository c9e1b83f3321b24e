use std::time::Duration;

/// Mean and peak over a stream of rate samples.
#[derive(Debug, Default, Clone, Copy)]
pub struct RateStats {
    samples: u64,
    sum: f64,
    max: f64,
}

impl RateStats {
    pub fn push(&mut self, rate: f64) {
        self.samples = self.samples.saturating_add(1);
        self.sum += rate;
        self.max = self.max.max(rate);
    }

    pub fn mean(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        self.sum / self.samples as f64
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

/// Events per second between two readings of a monotonic counter. A counter that went
/// backwards yields 0.
pub fn rate_between(prev: u64, now: u64, dt: Duration) -> f64 {
    let secs = dt.as_secs_f64().max(1e-9);
    now.saturating_sub(prev) as f64 / secs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_between_readings() {
        assert!((rate_between(7, 10, Duration::from_secs(1)) - 3.0).abs() < 1e-9);
        assert!((rate_between(0, 10, Duration::from_millis(500)) - 20.0).abs() < 1e-9);
        assert_eq!(rate_between(999, 10, Duration::from_secs(1)), 0.0);
        assert!(rate_between(0, 1, Duration::ZERO).is_finite());
    }

    #[test]
    fn rate_stats_mean_and_max() {
        let mut s = RateStats::default();
        assert_eq!(s.mean(), 0.0);
        for x in [100.0, 300.0, 200.0] {
            s.push(x);
        }
        assert!((s.mean() - 200.0).abs() < 1e-9);
        assert_eq!(s.max(), 300.0);
    }
}
