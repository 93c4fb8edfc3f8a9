use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod config;
mod telemetry;

use config::Config;

#[derive(Parser)]
#[command(version, about = "Relays stored documents to a file-ingestion API")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve the relay endpoint and the admin endpoint
    Relay(ConfigArgs),
    /// Load and validate the config, then exit
    CheckConfig(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long, short = 'c', default_value = "filerelay.yaml")]
    config_path: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        CliCommand::Relay(args) => run_relay(args),
        CliCommand::CheckConfig(args) => match Config::load(&args.config_path) {
            Ok(_) => {
                println!("{}: ok", args.config_path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}: {e}", args.config_path.display());
                ExitCode::FAILURE
            }
        },
    }
}

fn run_relay(args: ConfigArgs) -> ExitCode {
    let config = match Config::load(&args.config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Sentry is initialised before the runtime starts
    let _telemetry = match telemetry::init(&config.common) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialise telemetry: {e}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("Starting relay");
    match runtime.block_on(relay::run(config.relay)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Relay exited");
            ExitCode::FAILURE
        }
    }
}
