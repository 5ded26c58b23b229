use anyhow::Context;
use cadence_cli::config::ProfileConfig;
use cadence_cli::experiment;
use cadence_cli::output::ExperimentResults;
use cadence_core::threading::Shutdown;
use clap::{Parser, Subcommand};
use schemars::schema_for;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Cadence: periodic and aperiodic request workload generator
///
/// Cadence uses TOML configuration files (profiles) to define experiments.
/// One process both sends requests to its peer and answers the peer's requests.
///
/// Example usage:
///   cadence run -P profiles/default.toml --set target.address=[2001:db8::1]:5684
///   cadence run -P profiles/default.toml --set workload.aperiodic.lambda_per_ms=0.02
///   cadence run -P profiles/default.toml --set experiment.duration=5m --set experiment.seed=7
///   cadence serve -P profiles/default.toml
///
/// Override any config value using dot notation:
///   --set workload.periodic.interval=250ms
///   --set workload.periodic.enabled=false
///   --set server.bind=[::]:15684
///
/// See profiles/ directory for example configurations.
#[derive(Parser)]
#[command(name = "cadence")]
#[command(version, about = "Periodic/aperiodic workload generator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduling loops against a target (and serve its requests)
    Run {
        /// Path to TOML profile configuration file (REQUIRED)
        #[arg(short = 'P', long, required = true)]
        profile: PathBuf,

        /// Override any configuration value using dot notation (can be specified multiple times)
        ///
        /// Examples:
        ///   --set target.address=[2001:db8::1]:5684
        ///   --set experiment.duration=60s
        ///   --set experiment.seed=999
        ///   --set workload.idle_backoff=1s
        ///   --set output.format=json --set output.file=/tmp/results.json
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Only serve the periodic and aperiodic resources
    Serve {
        /// Path to TOML profile configuration file (REQUIRED)
        #[arg(short = 'P', long, required = true)]
        profile: PathBuf,

        /// Override any configuration value using dot notation
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Generate JSON Schema for configuration files
    Schema,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Schema => {
            let schema = schema_for!(ProfileConfig);
            let schema_json = serde_json::to_string_pretty(&schema)?;
            println!("{}", schema_json);
            Ok(())
        }
        Commands::Run { profile, set } => {
            let config = load_profile(&profile, &set)?;
            config.validate()?;
            log_configuration(&config);

            let shutdown = install_shutdown_handler()?;
            tracing::info!("Starting experiment...");
            let results = experiment::run(&config, &shutdown)?;
            tracing::info!("Experiment completed successfully");
            report(&config, &results)
        }
        Commands::Serve { profile, set } => {
            let config = load_profile(&profile, &set)?;
            config.validate_serve()?;
            log_configuration(&config);

            let shutdown = install_shutdown_handler()?;
            let results = experiment::serve(&config, &shutdown)?;
            report(&config, &results)
        }
    }
}

fn load_profile(profile: &Path, set: &[String]) -> anyhow::Result<ProfileConfig> {
    tracing::info!("Loading profile: {}", profile.display());
    if set.is_empty() {
        ProfileConfig::from_file(profile)
    } else {
        ProfileConfig::from_file_with_overrides(profile, set)
    }
}

fn log_configuration(config: &ProfileConfig) {
    tracing::info!("=== Experiment Configuration ===");
    tracing::info!("Name: {}", config.experiment.name);
    if let Some(desc) = &config.experiment.description {
        tracing::info!("Description: {}", desc);
    }
    if let Some(seed) = config.experiment.seed {
        tracing::info!("Seed: {} (reproducible mode)", seed);
    }
    match config.experiment.duration {
        Some(duration) => tracing::info!("Duration: {:?}", duration),
        None => tracing::info!("Duration: until interrupted"),
    }
    if let Some(address) = &config.target.address {
        tracing::info!("Target: {}", address);
    }
    tracing::info!("Bind: {} (server {})", config.server.bind, on_off(config.server.enabled));

    let workload = &config.workload;
    tracing::info!(
        "Periodic: {}, interval {:?}",
        on_off(workload.periodic.enabled),
        workload.periodic.interval
    );
    tracing::info!(
        "Aperiodic: {}, lambda {} per ms",
        on_off(workload.aperiodic.enabled),
        workload.aperiodic.lambda_per_ms
    );
    tracing::info!("Idle backoff: {:?}", workload.idle_backoff);
    tracing::info!("================================");
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

fn install_shutdown_handler() -> anyhow::Result<Shutdown> {
    let shutdown = Shutdown::new();
    let handler = shutdown.clone();
    ctrlc::set_handler(move || {
        tracing::info!("Interrupted, stopping...");
        handler.trigger();
    })
    .context("Failed to set signal handler")?;
    Ok(shutdown)
}

fn report(config: &ProfileConfig, results: &ExperimentResults) -> anyhow::Result<()> {
    results.print_human();

    if config.output.format == "json" {
        if let Some(path) = &config.output.file {
            results.write_json(path)?;
            tracing::info!("Results written to: {}", path.display());
        }
    }
    Ok(())
}
