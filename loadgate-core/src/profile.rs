use std::time::Duration;

use crate::error::{Error, Result};

mod schedule;

pub use schedule::RampingSchedule;

pub const BUILTIN_PROFILES: [&str; 6] = ["smoke", "baseline", "stress", "spike", "soak", "peak"];

/// A spike stage must reach at least this multiple of its neighbours' target.
const SPIKE_FACTOR: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    const fn secs(secs: u64, target: u64) -> Self {
        Self {
            duration: Duration::from_secs(secs),
            target,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ProfileShape {
    Constant,
    Ramping,
    Spike,
}

/// A named, ordered list of load stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub stages: Vec<Stage>,
}

impl Profile {
    pub fn new(name: impl Into<String>, stages: Vec<Stage>) -> Result<Self> {
        let profile = Self {
            name: name.into(),
            stages,
        };
        profile.validate()?;
        Ok(profile)
    }

    pub fn builtin(name: &str) -> Result<Self> {
        let stages = match name {
            "smoke" => vec![Stage::secs(30, 5)],
            "baseline" => vec![Stage::secs(300, 50)],
            "stress" => vec![
                Stage::secs(120, 100),
                Stage::secs(300, 200),
                Stage::secs(120, 300),
                Stage::secs(300, 300),
                Stage::secs(120, 0),
            ],
            "spike" => vec![
                Stage::secs(60, 50),
                Stage::secs(30, 500),
                Stage::secs(60, 50),
            ],
            "soak" => vec![
                Stage::secs(300, 100),
                Stage::secs(3600, 100),
                Stage::secs(300, 0),
            ],
            "peak" => vec![
                Stage::secs(120, 400),
                Stage::secs(600, 400),
                Stage::secs(120, 0),
            ],
            other => return Err(Error::UnknownProfile(other.to_string())),
        };

        Ok(Self {
            name: name.to_string(),
            stages,
        })
    }

    /// Uses explicit stages when given, otherwise the built-in profile of that name.
    pub fn resolve(name: &str, stages: Option<Vec<Stage>>) -> Result<Self> {
        match stages {
            Some(stages) => Self::new(name, stages),
            None => Self::builtin(name),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(Error::InvalidStages);
        }
        if let Some(index) = self.stages.iter().position(|s| s.duration.is_zero()) {
            return Err(Error::ZeroStageDuration {
                profile: self.name.clone(),
                index,
            });
        }
        Ok(())
    }

    pub fn shape(&self) -> ProfileShape {
        if self.stages.len() == 1 {
            return ProfileShape::Constant;
        }

        let is_spike = (1..self.stages.len()).any(|i| {
            let cur = self.stages[i];
            let neighbours = [Some(self.stages[i - 1]), self.stages.get(i + 1).copied()];
            let neighbours = neighbours.iter().flatten();

            let neighbour_max = neighbours.clone().map(|s| s.target).max().unwrap_or(0);
            cur.target > 0
                && cur.target >= neighbour_max.saturating_mul(SPIKE_FACTOR)
                && neighbours.into_iter().all(|s| cur.duration < s.duration)
        });

        if is_spike {
            ProfileShape::Spike
        } else {
            ProfileShape::Ramping
        }
    }

    pub fn schedule(&self) -> RampingSchedule {
        let start = match self.shape() {
            ProfileShape::Constant => self.stages.first().map(|s| s.target).unwrap_or(0),
            ProfileShape::Ramping | ProfileShape::Spike => 0,
        };
        RampingSchedule::new(start, self.stages.clone())
    }

    pub fn peak_target(&self) -> u64 {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }

    pub fn total_duration(&self) -> Duration {
        self.schedule().total_duration()
    }

    /// Per-worker concurrency derived from the peak target: `ceil(peak / workers)`, at least 1.
    pub fn concurrency_per_worker(&self, workers: u32) -> u32 {
        let workers = u64::from(workers.max(1));
        let per_worker = self.peak_target().div_ceil(workers).max(1);
        u32::try_from(per_worker).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_profiles_are_valid() {
        for name in BUILTIN_PROFILES {
            let p = Profile::builtin(name).unwrap_or_else(|e| panic!("{name}: {e}"));
            p.validate().unwrap_or_else(|e| panic!("{name}: {e}"));
            assert_eq!(p.name, name);
        }
    }

    #[test]
    fn unknown_profile_without_stages_is_rejected() {
        let err = match Profile::resolve("chaos", None) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::UnknownProfile(ref n) if n == "chaos"));
        assert!(err.is_invalid_input());
    }

    #[test]
    fn explicit_stages_override_builtin_name() {
        let p = Profile::resolve("smoke", Some(vec![Stage::secs(5, 2)]))
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(p.stages, vec![Stage::secs(5, 2)]);
    }

    #[test]
    fn rejects_empty_and_zero_duration_stages() {
        assert!(matches!(
            Profile::new("x", Vec::new()),
            Err(Error::InvalidStages)
        ));
        assert!(matches!(
            Profile::new("x", vec![Stage::secs(5, 1), Stage::secs(0, 2)]),
            Err(Error::ZeroStageDuration { index: 1, .. })
        ));
    }

    #[test]
    fn classifies_shapes() {
        let shape = |name| {
            Profile::builtin(name)
                .unwrap_or_else(|e| panic!("{e}"))
                .shape()
        };
        assert_eq!(shape("smoke"), ProfileShape::Constant);
        assert_eq!(shape("baseline"), ProfileShape::Constant);
        assert_eq!(shape("spike"), ProfileShape::Spike);
        assert_eq!(shape("stress"), ProfileShape::Ramping);
        assert_eq!(shape("soak"), ProfileShape::Ramping);
    }

    #[test]
    fn trailing_short_burst_is_a_spike() {
        let p = Profile {
            name: "burst".to_string(),
            stages: vec![Stage::secs(60, 10), Stage::secs(5, 40)],
        };
        assert_eq!(p.shape(), ProfileShape::Spike);

        let long_burst = Profile {
            name: "burst".to_string(),
            stages: vec![Stage::secs(60, 10), Stage::secs(120, 40)],
        };
        assert_eq!(long_burst.shape(), ProfileShape::Ramping);
    }

    #[test]
    fn schedule_start_depends_on_shape() {
        let smoke = Profile::builtin("smoke").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(smoke.schedule().target_at(Duration::ZERO), 5);

        let spike = Profile::builtin("spike").unwrap_or_else(|e| panic!("{e}"));
        let schedule = spike.schedule();
        assert_eq!(schedule.target_at(Duration::ZERO), 0);
        assert_eq!(schedule.target_at(Duration::from_secs(30)), 25);
        assert_eq!(schedule.target_at(Duration::from_secs(90)), 500);
        assert_eq!(schedule.total_duration(), Duration::from_secs(150));
        assert_eq!(spike.total_duration(), schedule.total_duration());
    }

    #[test]
    fn concurrency_is_peak_split_across_workers() {
        let stress = Profile::builtin("stress").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(stress.peak_target(), 300);
        assert_eq!(stress.concurrency_per_worker(4), 75);
        assert_eq!(stress.concurrency_per_worker(7), 43);

        let idle = Profile {
            name: "idle".to_string(),
            stages: vec![Stage::secs(10, 0)],
        };
        assert_eq!(idle.concurrency_per_worker(3), 1);
    }
}
