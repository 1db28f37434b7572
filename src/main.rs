use clap::Parser;
use std::process::ExitCode;

mod cli;
mod commands;
mod config;
mod domain;
mod error;
mod infrastructure;
mod services;
mod tools;
mod ui;

use cli::{Cli, Commands};
use commands::{deploy, plan, setup, stop, DeployOptions};
use error::{ConfigError, RolloutError};

/// Exit code for failures outside the rollout taxonomy
const EXIT_UNEXPECTED: u8 = 1;
const EXIT_INVALID_CONFIG: u8 = 2;

fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(rollout) = err.downcast_ref::<RolloutError>() {
        rollout.exit_code()
    } else if err.downcast_ref::<ConfigError>().is_some() {
        EXIT_INVALID_CONFIG
    } else {
        EXIT_UNEXPECTED
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging with LOGGING env var support
    // LOGGING=debug,info,warn,error or just LOGGING=debug
    let log_level = std::env::var("LOGGING")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| {
            if cli.verbose {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(false) // Disable ANSI escape codes for cleaner output
        .init();

    let result = match cli.command {
        Commands::Deploy {
            skip_build,
            forward,
            no_smoke,
            image,
            deadline,
        } => {
            deploy::execute(
                &cli.config,
                DeployOptions {
                    skip_build,
                    forward,
                    no_smoke,
                    image,
                    deadline,
                },
            )
            .await
        }
        Commands::Stop { cluster } => stop::execute(&cli.config, cluster).await,
        Commands::Setup { skip_deploy } => setup::execute(&cli.config, skip_deploy).await,
        Commands::Plan => plan::execute(&cli.config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Rollout failures were already reported by the summary
            if e.downcast_ref::<RolloutError>().is_none() {
                ui::print_error(&format!("{:#}", e));
            }
            ExitCode::from(exit_code(&e))
        }
    }
}
