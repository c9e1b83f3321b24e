use crate::exit_codes::ExitCode;

#[derive(Debug)]
pub enum RunError {
    InvalidInput(anyhow::Error),
    RuntimeError(anyhow::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::RuntimeError(_) => ExitCode::RuntimeError,
        }
    }

    #[must_use]
    pub fn anyhow(&self) -> &anyhow::Error {
        match self {
            Self::InvalidInput(e) | Self::RuntimeError(e) => e,
        }
    }

    /// Configuration failures are invalid input; everything else is an orchestration failure.
    pub fn from_core(context: &'static str, err: loadgate_core::Error) -> Self {
        let kind = if err.is_invalid_input() {
            Self::InvalidInput
        } else {
            Self::RuntimeError
        };
        kind(anyhow::Error::new(err).context(context))
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(e) | Self::RuntimeError(e) => write!(f, "{e:#}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.anyhow().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_are_classified() {
        let invalid = RunError::from_core("validate", loadgate_core::Error::InvalidWorkerCount);
        assert_eq!(invalid.exit_code(), ExitCode::InvalidInput);
        assert!(invalid.to_string().starts_with("validate: "));

        let spawn = RunError::from_core(
            "launch",
            loadgate_core::Error::Spawn {
                worker_id: 1,
                source: std::io::Error::other("nope"),
            },
        );
        assert_eq!(spawn.exit_code(), ExitCode::RuntimeError);
    }
}
