//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for the TaskOrchard worker.

use clap::{Parser, Subcommand};

/// TaskOrchard Worker - task dispatch worker
///
/// Keeps a WebSocket connection to a TaskOrchard dispatch server, joins a
/// worker group, executes the tasks it is sent and reports the results.
#[derive(Parser, Debug)]
#[command(name = "taskorchard-worker")]
#[command(author, version, about = "TaskOrchard Worker - task dispatch worker", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the worker
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the worker (connects to the dispatch server and processes tasks)
    Run {
        /// Path to configuration file
        #[arg(short, long, env = "TASKORCHARD_CONFIG")]
        config: Option<String>,

        /// Dispatch server URL (ws:// or wss://)
        #[arg(long)]
        server_url: Option<String>,

        /// Worker group to join
        #[arg(short, long)]
        group: Option<String>,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}
