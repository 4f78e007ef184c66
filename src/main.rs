//! API Challenger - stateful conformance runs against an HTTP API
//!
//! Runs YAML scenarios (or the built-in API challenge suite) step by step,
//! sharing one session per scenario, and reports which steps held up.

use challenger::commands::{self, Commands, RunOptions};
use challenger::common::{logging, paths};
use challenger::Config;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "challenger", about = "Stateful conformance harness for HTTP APIs")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            files,
            base_url,
            session,
            strategy,
            json,
            parallel,
            verbose,
            log_file,
        } => {
            let log_file = match log_file {
                Some(Some(path)) => Some(path),
                Some(None) => paths::default_log_file().ok().flatten(),
                None => None,
            };
            let _guard = match &log_file {
                Some(path) => match logging::init_with_file(verbose, path) {
                    Ok(guard) => Some(guard),
                    Err(e) => {
                        eprintln!("Error: cannot open log file {}: {e}", path.display());
                        std::process::exit(1);
                    }
                },
                None => {
                    logging::init_cli(verbose);
                    None
                }
            };

            let opts = RunOptions {
                files,
                base_url,
                session,
                strategy,
                json,
                parallel,
                verbose,
            };
            match load_config(cli.config.as_deref()) {
                Ok(config) => commands::run(config, opts).await,
                Err(e) => Err(e),
            }
        }
        Commands::List { file } => {
            logging::init_cli(false);
            commands::list(file.as_deref()).map(|_| true)
        }
        Commands::Validate { file } => {
            logging::init_cli(false);
            commands::validate(&file).map(|_| true)
        }
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> challenger::Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}
