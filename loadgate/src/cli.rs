use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    let d = humantime::parse_duration(s)
        .map_err(|err| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m): {err}"))?;
    if d.is_zero() {
        return Err(format!("duration '{s}' must be positive"));
    }
    Ok(d)
}

fn parse_key_value(input: &str) -> Result<(String, String), String> {
    let (k, v) = input
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{input}'"))?;
    let k = k.trim();
    if k.is_empty() {
        return Err(format!("empty KEY in '{input}'"));
    }
    Ok((k.to_string(), v.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Progress bar on stderr and a human-readable report on stdout.
    HumanReadable,
    /// NDJSON progress lines and a final summary line on stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "loadgate",
    author,
    version,
    about = "Distributed load generation with SLO compliance gating",
    long_about = "loadgate drives HTTP load against a target service from a pool of worker processes, merges their results, judges them against declared SLO thresholds, and compares the run with the previous baseline of the same profile.\n\nExit codes: 0 success, 11 SLO compliance failed (unless --no-fail-on-slo), 30 invalid input, 40 runtime failure.",
    after_help = "Examples:\n  loadgate run --config loadgate.yaml\n  loadgate run --config loadgate.yaml --profile stress --workers 8\n  loadgate run --base-url http://127.0.0.1:8080 --endpoint health=/health --requests 500 --threshold 'p95_latency_ms <= 200ms'\n  loadgate profile spike"
)]
pub struct Cli {
    /// Log filter (e.g. `debug`, `loadgate_core=trace`). Falls back to RUST_LOG.
    #[arg(long, global = true, env = "LOADGATE_LOG", value_name = "FILTER")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test and evaluate it against its SLOs
    #[command(
        long_about = "Run a load test described by a YAML config file.\n\nCLI flags override values from the file; the file overrides built-in defaults."
    )]
    Run(RunArgs),

    /// Internal: execute one worker's share of a run (spawned by `run`)
    #[command(hide = true)]
    Worker(WorkerArgs),

    /// Print the stages of a built-in load profile as YAML
    Profile(ProfileArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the run config (.yaml)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Built-in profile name (smoke, baseline, stress, spike, soak, peak)
    #[arg(long)]
    pub profile: Option<String>,

    /// Total number of requests across all workers
    #[arg(long)]
    pub requests: Option<u64>,

    /// Number of worker processes
    #[arg(long)]
    pub workers: Option<u32>,

    /// Maximum in-flight requests per worker (derived from the profile when omitted)
    #[arg(long)]
    pub concurrency: Option<u32>,

    /// Per-request timeout (e.g. 5s, 250ms)
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Wall-clock limit for the whole run
    #[arg(long, value_parser = parse_duration)]
    pub run_timeout: Option<Duration>,

    /// Target base URL (http:// or https://)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Target endpoint (repeatable, NAME=PATH). Replaces the file's endpoints.
    #[arg(long = "endpoint", value_name = "NAME=PATH", value_parser = parse_key_value)]
    pub endpoints: Vec<(String, String)>,

    /// Request header (repeatable, KEY=VALUE). Added to / overrides the file's headers.
    #[arg(long = "header", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub headers: Vec<(String, String)>,

    /// SLO threshold (repeatable), e.g. 'p95_latency_ms <= 500ms'. Replaces the file's thresholds.
    #[arg(long = "threshold", value_name = "EXPR")]
    pub thresholds: Vec<String>,

    /// Directory holding per-profile baselines
    #[arg(long)]
    pub baseline_dir: Option<PathBuf>,

    /// Neither compare against nor record a baseline
    #[arg(long)]
    pub no_baseline: bool,

    /// Exit 0 even when the compliance report does not pass
    #[arg(long)]
    pub no_fail_on_slo: bool,

    /// Write the compliance, regression and aggregate reports as JSON to this path
    #[arg(long)]
    pub report_out: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Run workers as tasks in this process instead of child processes
    #[arg(long)]
    pub in_process: bool,
}

#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// JSON-encoded worker spec
    #[arg(long)]
    pub spec: String,
}

#[derive(Debug, Args)]
pub struct ProfileArgs {
    /// Profile name
    #[arg(required_unless_present = "list")]
    pub name: Option<String>,

    /// List the built-in profile names
    #[arg(long)]
    pub list: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(2 * 60 * 60)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("0s").is_err());
    }

    #[test]
    fn cli_parses_run_overrides() {
        let parsed = Cli::try_parse_from([
            "loadgate",
            "run",
            "--config",
            "run.yaml",
            "--profile",
            "stress",
            "--requests",
            "1000",
            "--workers",
            "4",
            "--timeout",
            "250ms",
            "--endpoint",
            "ok=/ok",
            "--header",
            "authorization=Bearer x",
            "--threshold",
            "p95_latency_ms <= 500ms",
            "--no-fail-on-slo",
            "--output",
            "json",
            "--log-level",
            "debug",
        ]);

        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.config, Some(PathBuf::from("run.yaml")));
                assert_eq!(args.profile.as_deref(), Some("stress"));
                assert_eq!(args.requests, Some(1000));
                assert_eq!(args.workers, Some(4));
                assert_eq!(args.concurrency, None);
                assert_eq!(args.timeout, Some(Duration::from_millis(250)));
                assert_eq!(args.endpoints, vec![("ok".to_string(), "/ok".to_string())]);
                assert_eq!(
                    args.headers,
                    vec![("authorization".to_string(), "Bearer x".to_string())]
                );
                assert_eq!(args.thresholds.len(), 1);
                assert!(args.no_fail_on_slo);
                assert!(!args.no_baseline);
                assert_eq!(args.output, OutputFormat::Json);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn cli_rejects_malformed_endpoint() {
        assert!(Cli::try_parse_from(["loadgate", "run", "--endpoint", "nope"]).is_err());
    }

    #[test]
    fn cli_parses_profile_list() {
        let cli = match Cli::try_parse_from(["loadgate", "profile", "--list"]) {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };
        match cli.command {
            Command::Profile(args) => {
                assert!(args.list);
                assert_eq!(args.name, None);
            }
            _ => panic!("expected profile command"),
        }
        assert!(Cli::try_parse_from(["loadgate", "profile"]).is_err());
    }
}
