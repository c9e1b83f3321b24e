use std::time::Duration;

use super::Stage;

/// Target load over time. Each stage ramps linearly from the previous stage's target (or the
/// schedule's start) to its own target.
#[derive(Debug, Clone)]
pub struct RampingSchedule {
    start: u64,
    stages: Vec<Stage>,
}

impl RampingSchedule {
    pub fn new(start: u64, stages: Vec<Stage>) -> Self {
        Self { start, stages }
    }

    pub fn total_duration(&self) -> Duration {
        self.stages
            .iter()
            .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration))
    }

    /// Holds the last stage's target once the schedule has run out.
    pub fn target_at(&self, elapsed: Duration) -> u64 {
        let mut from = self.start;
        let mut stage_start = Duration::ZERO;

        for stage in &self.stages {
            let stage_end = stage_start.saturating_add(stage.duration);
            if elapsed < stage_end {
                let into = elapsed.saturating_sub(stage_start);
                return interpolate(from, stage.target, into, stage.duration);
            }
            from = stage.target;
            stage_start = stage_end;
        }

        from
    }
}

fn interpolate(from: u64, to: u64, into: Duration, over: Duration) -> u64 {
    let frac = (into.as_secs_f64() / over.as_secs_f64()).clamp(0.0, 1.0);
    let value = from as f64 + (to as f64 - from as f64) * frac;
    value.round().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(secs: u64, target: u64) -> Stage {
        Stage {
            duration: Duration::from_secs(secs),
            target,
        }
    }

    #[test]
    fn ramps_up_then_down() {
        let s = RampingSchedule::new(0, vec![stage(10, 100), stage(10, 0)]);
        assert_eq!(s.target_at(Duration::ZERO), 0);
        assert_eq!(s.target_at(Duration::from_secs(5)), 50);
        assert_eq!(s.target_at(Duration::from_secs(10)), 100);
        assert_eq!(s.target_at(Duration::from_secs(15)), 50);
        assert_eq!(s.target_at(Duration::from_secs(60)), 0);
        assert_eq!(s.total_duration(), Duration::from_secs(20));
    }

    #[test]
    fn zero_length_stage_jumps() {
        let s = RampingSchedule::new(7, vec![stage(0, 40), stage(30, 40)]);
        assert_eq!(s.target_at(Duration::ZERO), 40);
        assert_eq!(s.target_at(Duration::from_secs(12)), 40);
    }

    #[test]
    fn empty_schedule_stays_at_start() {
        let s = RampingSchedule::new(3, Vec::new());
        assert_eq!(s.target_at(Duration::from_secs(5)), 3);
        assert_eq!(s.total_duration(), Duration::ZERO);
    }
}
