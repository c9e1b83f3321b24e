#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// The compliance report did not pass and `failOnNonCompliance` is set.
    SloFailed = 11,

    /// Invalid CLI/config/options (bad flags, invalid durations, invalid thresholds syntax, etc.).
    InvalidInput = 30,

    /// Orchestration/runtime error (worker spawn failure, IO errors, unexpected invariants).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Regression flags never reach this point: only the compliance verdict decides.
    #[must_use]
    pub fn from_compliance(passed: bool, fail_on_non_compliance: bool) -> Self {
        if passed || !fail_on_non_compliance {
            Self::Success
        } else {
            Self::SloFailed
        }
    }
}
