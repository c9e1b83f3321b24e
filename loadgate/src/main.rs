mod cli;
mod config_yaml;
mod exit_codes;
mod logging;
mod output;
mod profile_cmd;
mod run;
mod run_error;
mod worker_cmd;

use clap::Parser;
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() {
    let cli = match cli::Cli::try_parse() {
        Ok(v) => v,
        Err(err) => {
            use clap::error::ErrorKind;
            let _ = err.print();
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    exit_codes::ExitCode::Success.as_i32()
                }
                _ => exit_codes::ExitCode::InvalidInput.as_i32(),
            };
            std::process::exit(code);
        }
    };

    let log_level = cli.log_level.as_deref();
    let code = match cli.command {
        cli::Command::Run(args) => {
            logging::init(log_level, logging::MASTER_DEFAULT);
            match run::run(args, log_level).await {
                Ok(code) => code.as_i32(),
                Err(err) => {
                    eprintln!("{err}");
                    err.exit_code().as_i32()
                }
            }
        }
        cli::Command::Worker(args) => {
            logging::init(log_level, logging::WORKER_DEFAULT);
            worker_cmd::worker(args).await.as_i32()
        }
        cli::Command::Profile(args) => match profile_cmd::profile(&args) {
            Ok(()) => exit_codes::ExitCode::Success.as_i32(),
            Err(err) => {
                eprintln!("{err}");
                err.exit_code().as_i32()
            }
        },
    };

    // Workers may still be parked on a blocking stdin read.
    std::process::exit(code);
}
