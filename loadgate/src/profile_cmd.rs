use loadgate_core::{BUILTIN_PROFILES, Profile};

use crate::cli::ProfileArgs;
use crate::config_yaml::StageYaml;
use crate::run_error::RunError;

pub(crate) fn profile(args: &ProfileArgs) -> Result<(), RunError> {
    let out = if args.list {
        list()
    } else {
        let name = args.name.as_deref().unwrap_or_default();
        render(name)?
    };
    print!("{out}");
    Ok(())
}

fn list() -> String {
    let mut out = String::new();
    for name in BUILTIN_PROFILES {
        out.push_str(name);
        out.push('\n');
    }
    out
}

/// The stage list alone, in the same shape a config file's `profile.stages` takes, so it can be
/// fed to an external staged-load tool as is.
fn render(name: &str) -> Result<String, RunError> {
    let profile = Profile::builtin(name).map_err(|err| RunError::from_core("profile", err))?;
    tracing::debug!(
        profile = %profile.name,
        shape = %profile.shape(),
        peak = profile.peak_target(),
        "rendering built-in profile"
    );
    let stages: Vec<StageYaml> = profile.stages.iter().copied().map(StageYaml::from).collect();
    serde_yaml::to_string(&stages).map_err(|err| RunError::RuntimeError(err.into()))
}
