//! TaskOrchard Worker - task dispatch worker
//!
//! Entry point for the worker binary.

use clap::Parser;
use tracing::{error, info};

use taskorchard_worker::cli::{Cli, Commands, ConfigSubcommand};
use taskorchard_worker::config::{self, CliOverrides, WorkerConfig};
use taskorchard_worker::error::{Error, Result};
use taskorchard_worker::handler;
use taskorchard_worker::logging;
use taskorchard_worker::version::{self, BuildInfo};
use taskorchard_worker::worker::Worker;

fn main() -> Result<()> {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    let (config_path, overrides) = match cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            if let Err(e) = handle_config_command(subcommand) {
                eprint!("{}", e.format_for_terminal());
                std::process::exit(e.exit_code());
            }
            return Ok(());
        }
        Commands::Run {
            config,
            server_url,
            group,
        } => (config, CliOverrides { server_url, group }),
    };

    let config = match WorkerConfig::load_with(config_path.as_deref(), &overrides) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprint!("{}", e.format_for_terminal());
            std::process::exit(e.exit_code());
        }
    };

    // The guards must be kept alive for the lifetime of the program
    let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    let build = BuildInfo::current();
    info!(
        version = %build.full_version(),
        target = %build.target,
        host = %hostname_or_unknown(),
        "Starting TaskOrchard Worker"
    );

    if let Err(e) = run_worker(config) {
        error!(fatal = e.is_fatal(), "{}", e.format_for_log());
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }

    Ok(())
}

/// Run the worker until Ctrl+C
fn run_worker(config: WorkerConfig) -> Result<()> {
    info!(
        server_url = %config.worker.server_url,
        group = %config.worker.group,
        name = config.worker.name.as_deref().unwrap_or("(none)"),
        reconnect_interval = config.worker.reconnect_interval,
        heartbeat_interval = config.worker.heartbeat_interval,
        "Configuration loaded"
    );

    let handler = handler::builtin_handler(&config.executor)?;
    let worker = Worker::new(config, handler)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("taskorchard-worker")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    runtime.block_on(async {
        let handle = worker.handle();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received shutdown signal"),
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
            handle.stop();
        });

        worker.run().await;
    });

    Ok(())
}

fn hostname_or_unknown() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = WorkerConfig::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let created = config::init_config(path.as_deref(), force)?;
            println!("Created configuration file: {}", created.display());
        }
        ConfigSubcommand::Validate { config } => {
            let cfg = WorkerConfig::load(config.as_deref())?;
            handler::builtin_handler(&cfg.executor)?;
            println!("Configuration is valid.");
            println!("  Server URL: {}", cfg.worker.server_url);
            println!("  Group:      {}", cfg.worker.group);
        }
    }

    Ok(())
}
