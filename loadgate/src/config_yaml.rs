use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use loadgate_core::{
    ComparisonOp, CompliancePolicy, DEFAULT_PROGRESS_EVERY, Endpoint, Profile, RegressionPolicy,
    RunConfiguration, SloMetric, SloThreshold, Stage,
};

use crate::cli::RunArgs;

pub(crate) const DEFAULT_PROFILE: &str = "smoke";
pub(crate) const DEFAULT_REQUESTS: u64 = 1000;
pub(crate) const DEFAULT_WORKERS: u32 = 4;
pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(600);
pub(crate) const DEFAULT_BASELINE_DIR: &str = ".loadgate/baselines";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RunConfigYaml {
    #[serde(default)]
    pub profile: Option<ProfileYaml>,

    pub requests: Option<u64>,
    pub workers: Option<u32>,
    pub concurrency: Option<u32>,

    #[serde(default)]
    pub timeout: Option<YamlDuration>,
    #[serde(default)]
    pub run_timeout: Option<YamlDuration>,

    pub progress_every: Option<u64>,

    #[serde(default)]
    pub target: TargetYaml,

    #[serde(default)]
    pub slo: SloYaml,

    #[serde(default)]
    pub regression: RegressionYaml,
}

/// `profile: stress`, or a custom profile with explicit stages.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ProfileYaml {
    Name(String),
    Custom { name: String, stages: Vec<StageYaml> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StageYaml {
    pub duration: YamlDuration,
    pub target: u64,
}

impl From<Stage> for StageYaml {
    fn from(s: Stage) -> Self {
        Self {
            duration: YamlDuration(s.duration),
            target: s.target,
        }
    }
}

impl From<StageYaml> for Stage {
    fn from(s: StageYaml) -> Self {
        Stage {
            duration: s.duration.into_inner(),
            target: s.target,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct TargetYaml {
    pub base_url: Option<String>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct SloYaml {
    pub pass_threshold_percent: Option<f64>,
    pub fail_on_non_compliance: Option<bool>,

    #[serde(default)]
    pub thresholds: Vec<ThresholdYaml>,
}

/// Either `"p95_latency_ms <= 500ms"` or `{ metric, op, target, unit }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdYaml {
    Expr(String),
    Full {
        metric: SloMetric,
        op: ComparisonOp,
        target: f64,
        #[serde(default)]
        unit: Option<String>,
    },
}

impl ThresholdYaml {
    fn resolve(self) -> anyhow::Result<SloThreshold> {
        let t = match self {
            Self::Expr(raw) => SloThreshold::parse(&raw)?,
            Self::Full {
                metric,
                op,
                target,
                unit,
            } => SloThreshold::new(
                metric,
                op,
                target,
                unit.unwrap_or_else(|| metric.default_unit().to_string()),
            )?,
        };
        Ok(t)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RegressionYaml {
    pub enabled: Option<bool>,
    pub baseline_dir: Option<PathBuf>,
    pub latency_increase_percent: Option<f64>,
    pub throughput_drop_percent: Option<f64>,
    pub error_rate_increase_percent: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    pub(crate) fn into_inner(self) -> Duration {
        self.0
    }
}

impl Serialize for YamlDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(self.0).to_string())
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|v| YamlDuration(Duration::from_secs(v)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Duration::try_from_secs_f64(v)
                    .map(YamlDuration)
                    .map_err(|err| E::custom(format_args!("invalid duration {v}: {err}")))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v.trim()).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }
        }

        deserializer.deserialize_any(V)
    }
}

/// Everything `run` needs after merging defaults, the config file and CLI flags.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedRun {
    pub config: RunConfiguration,
    pub thresholds: Vec<SloThreshold>,
    pub policy: CompliancePolicy,
    pub regression: RegressionPolicy,
    /// `None` when baselines are disabled.
    pub baseline_dir: Option<PathBuf>,
}

pub(crate) async fn load(path: &Path) -> anyhow::Result<RunConfigYaml> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    parse(&bytes).with_context(|| format!("failed to parse YAML: {}", path.display()))
}

pub(crate) fn parse(bytes: &[u8]) -> anyhow::Result<RunConfigYaml> {
    // An empty document means "all defaults".
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(RunConfigYaml::default());
    }
    let doc: Option<RunConfigYaml> = serde_yaml::from_slice(bytes)?;
    Ok(doc.unwrap_or_default())
}

/// CLI flags beat the file; the file beats defaults.
pub(crate) fn resolve(file: RunConfigYaml, args: &RunArgs) -> anyhow::Result<ResolvedRun> {
    let RunConfigYaml {
        profile,
        requests,
        workers,
        concurrency,
        timeout,
        run_timeout,
        progress_every,
        target,
        slo,
        regression,
    } = file;

    let profile = match (&args.profile, profile) {
        (Some(name), _) => Profile::builtin(name)?,
        (None, Some(ProfileYaml::Name(name))) => Profile::builtin(&name)?,
        (None, Some(ProfileYaml::Custom { name, stages })) => {
            Profile::resolve(&name, Some(stages.into_iter().map(Stage::from).collect()))?
        }
        (None, None) => Profile::builtin(DEFAULT_PROFILE)?,
    };

    let worker_count = args.workers.or(workers).unwrap_or(DEFAULT_WORKERS);
    let concurrency_per_worker = args
        .concurrency
        .or(concurrency)
        .unwrap_or_else(|| profile.concurrency_per_worker(worker_count));

    let mut headers = target.headers;
    for (k, v) in &args.headers {
        headers.insert(k.clone(), v.clone());
    }

    let endpoints = if args.endpoints.is_empty() {
        target.endpoints
    } else {
        args.endpoints
            .iter()
            .map(|(name, path)| Endpoint::new(name.clone(), path.clone()))
            .collect()
    };

    let config = RunConfiguration {
        profile,
        total_requests: args.requests.or(requests).unwrap_or(DEFAULT_REQUESTS),
        worker_count,
        concurrency_per_worker,
        request_timeout: args
            .timeout
            .or(timeout.map(YamlDuration::into_inner))
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        run_timeout: args
            .run_timeout
            .or(run_timeout.map(YamlDuration::into_inner))
            .unwrap_or(DEFAULT_RUN_TIMEOUT),
        target_base_url: args
            .base_url
            .clone()
            .or(target.base_url)
            .context("missing target base URL (set `target.baseUrl` or --base-url)")?,
        headers: headers.into_iter().collect(),
        endpoints,
        progress_every: progress_every.unwrap_or(DEFAULT_PROGRESS_EVERY),
    };
    config.validate()?;

    let thresholds = if args.thresholds.is_empty() {
        slo.thresholds
            .into_iter()
            .map(ThresholdYaml::resolve)
            .collect::<anyhow::Result<Vec<_>>>()?
    } else {
        args.thresholds
            .iter()
            .map(|raw| SloThreshold::parse(raw))
            .collect::<Result<Vec<_>, _>>()?
    };

    let defaults = CompliancePolicy::default();
    let pass_threshold_percent = slo
        .pass_threshold_percent
        .unwrap_or(defaults.pass_threshold_percent);
    if !(0.0..=100.0).contains(&pass_threshold_percent) {
        anyhow::bail!("`slo.passThresholdPercent` must be within 0..=100");
    }
    let policy = CompliancePolicy {
        pass_threshold_percent,
        fail_on_non_compliance: !args.no_fail_on_slo
            && slo
                .fail_on_non_compliance
                .unwrap_or(defaults.fail_on_non_compliance),
    };

    let regression_defaults = RegressionPolicy::default();
    let regression_policy = RegressionPolicy {
        latency_increase_percent: regression
            .latency_increase_percent
            .unwrap_or(regression_defaults.latency_increase_percent),
        throughput_drop_percent: regression
            .throughput_drop_percent
            .unwrap_or(regression_defaults.throughput_drop_percent),
        error_rate_increase_percent: regression
            .error_rate_increase_percent
            .unwrap_or(regression_defaults.error_rate_increase_percent),
    };

    let baseline_enabled = !args.no_baseline && regression.enabled.unwrap_or(true);
    let baseline_dir = baseline_enabled.then(|| {
        args.baseline_dir
            .clone()
            .or(regression.baseline_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BASELINE_DIR))
    });

    Ok(ResolvedRun {
        config,
        thresholds,
        policy,
        regression: regression_policy,
        baseline_dir,
    })
}
