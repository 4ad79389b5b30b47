use std::process;
mod cli;
mod demo;
mod exit_codes;

use clap::CommandFactory;
use cli::{Cli, Commands, OutputFormat};
use exit_codes::{EXIT_ERROR, EXIT_SUCCESS};
use flowbridge::HostConfig;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    if cli.command.is_none() {
        if let Err(e) = Cli::command().print_help() {
            eprintln!("Failed to print help: {}", e);
            process::exit(EXIT_ERROR);
        }
        process::exit(EXIT_SUCCESS);
    }

    let log_level = if cli.quiet {
        Level::ERROR
    } else if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::TRACE
    } else {
        Level::INFO
    };

    // RUST_LOG wins over the verbosity flags
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string().to_lowercase()));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{:#}", e);
            process::exit(EXIT_ERROR);
        }
    };

    let result = match cli.command {
        Some(Commands::Retry {
            failures,
            max_attempts,
            backoff_ms,
        }) => {
            tracing::info!("Running retry demonstration");
            demo::run_retry(config, failures, max_attempts, backoff_ms).await
        }
        Some(Commands::Delay { millis, dispatcher }) => {
            tracing::info!("Running delay demonstration");
            demo::run_delay(config, millis, dispatcher.map(Into::into)).await
        }
        Some(Commands::Config { format, example }) => run_config(&config, format, example),
        None => {
            // Handled above
            unreachable!()
        }
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            EXIT_ERROR
        }
    };
    process::exit(exit_code);
}

fn load_config(cli: &Cli) -> anyhow::Result<HostConfig> {
    let config = match &cli.config {
        Some(path) => HostConfig::load_from(Some(path.as_path()))?,
        None => HostConfig::load()?,
    };
    tracing::debug!("Effective configuration: {:?}", config);
    Ok(config)
}

fn run_config(config: &HostConfig, format: OutputFormat, example: bool) -> anyhow::Result<i32> {
    if example {
        print!("{}", HostConfig::example_yaml_config());
        return Ok(EXIT_SUCCESS);
    }
    let rendered = match format {
        OutputFormat::Yaml => serde_yaml::to_string(config)?,
        OutputFormat::Json => serde_json::to_string_pretty(config)?,
    };
    println!("{}", rendered.trim_end());
    Ok(EXIT_SUCCESS)
}
