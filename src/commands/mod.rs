//! Command handlers module.
//!
//! - `events.rs`: `log`, `list` and `medications`
//! - `serve.rs`: the HTTP server
//! - `user.rs`: user provisioning
//! - `config.rs`: effective configuration display

mod config;
mod events;
mod serve;
mod user;

use clap::{Subcommand, ValueEnum};

pub use config::cmd_config;
pub use events::{cmd_list, cmd_log, cmd_medications};
pub use serve::cmd_serve;
pub use user::cmd_user;

/// Output format for `list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ListFormat {
    /// Aligned columns.
    #[default]
    Table,
    /// The same JSON array `GET /medications` returns.
    Json,
}

/// User subcommands.
#[derive(Subcommand)]
pub enum UserAction {
    /// Provision a user (no-op if it exists).
    Add {
        /// User name.
        name: String,
    },
}

/// Command result shared by all handlers.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;
