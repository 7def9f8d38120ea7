//! Binary entry point for medtrack.
//!
//! This binary provides the CLI and HTTP server for the medication tracker.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

mod commands;

use clap::{Parser, Subcommand};
use commands::{
    ListFormat, UserAction, cmd_config, cmd_list, cmd_log, cmd_medications, cmd_serve, cmd_user,
};
use medtrack::observability;
use medtrack::{LogEventRequest, MedtrackConfig};
use std::path::PathBuf;
use std::process::ExitCode;

/// Medtrack - records medication intake events and serves them back.
#[derive(Parser)]
#[command(name = "medtrack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "MEDTRACK_CONFIG")]
    config: Option<PathBuf>,

    /// Act for this user instead of the configured one.
    #[arg(short, long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API.
    Serve {
        /// Interface to bind.
        #[arg(long)]
        host: Option<String>,

        /// Port to bind.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Log a medication intake event.
    Log {
        /// Medication name (created on first use).
        #[arg(short, long)]
        medication: String,

        /// When it was taken, ISO 8601.
        #[arg(short, long)]
        timestamp: String,

        /// Event source: manual, nfc, smart_bottle or scanner.
        #[arg(short, long)]
        source: Option<String>,

        /// Alternative name for --source; wins when both are given.
        #[arg(long)]
        event_source: Option<String>,

        /// Free-form notes.
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// List the user's events, most recent first.
    List {
        /// Output format.
        #[arg(short, long, value_enum, default_value_t = ListFormat::Table)]
        format: ListFormat,
    },

    /// List the user's medications.
    Medications,

    /// Manage users.
    User {
        /// User subcommand.
        #[command(subcommand)]
        action: UserAction,
    },

    /// Show the effective configuration.
    Config {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Main entry point.
fn main() -> ExitCode {
    // A missing .env file is normal.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config = match MedtrackConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };
    if let Some(user) = cli.user.clone() {
        config.user_name = user;
    }

    let expose_metrics = matches!(cli.command, Commands::Serve { .. });
    if let Err(e) = observability::init(&config.observability(cli.verbose, expose_metrics)) {
        eprintln!("Failed to initialize observability: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(command: Commands, config: MedtrackConfig) -> commands::CommandResult {
    match command {
        Commands::Serve { host, port } => cmd_serve(config, host, port),

        Commands::Log {
            medication,
            timestamp,
            source,
            event_source,
            notes,
        } => {
            let request = LogEventRequest {
                medication: Some(medication),
                timestamp: Some(timestamp),
                source,
                event_source,
                notes,
            };
            cmd_log(&config, request)
        },

        Commands::List { format } => cmd_list(&config, format),

        Commands::Medications => cmd_medications(&config),

        Commands::User { action } => cmd_user(&config, action),

        Commands::Config { json } => cmd_config(&config, json),
    }
}
