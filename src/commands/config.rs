//! Config command handler.

use super::CommandResult;
use medtrack::MedtrackConfig;
use medtrack::config::{StorageBackendType, default_config_path};

/// Config command.
///
/// The PostgreSQL password is always masked.
pub fn cmd_config(config: &MedtrackConfig, json: bool) -> CommandResult {
    let mut shown = config.clone();
    shown.storage.postgres_url = config.storage.redacted_postgres_url();

    if json {
        println!("{}", serde_json::to_string_pretty(&shown)?);
        return Ok(());
    }

    println!("Current Configuration");
    println!("=====================");
    println!();
    println!(
        "Default Config File: {}",
        default_config_path().map_or_else(|| "(none)".to_string(), |p| p.display().to_string())
    );
    println!("User: {}", shown.user_name);
    println!();

    println!("Storage:");
    println!("  Backend: {}", shown.storage.backend);
    match shown.storage.backend {
        StorageBackendType::Sqlite => {
            println!("  Path: {}", shown.storage.sqlite_path.display());
        },
        StorageBackendType::Postgres => {
            println!("  Connection: {}", shown.storage.postgres_url);
            println!(
                "  Pool Max Size: {}",
                shown
                    .storage
                    .pool_max_size
                    .map_or_else(|| "(default)".to_string(), |n| n.to_string())
            );
        },
    }
    println!();

    println!("Server:");
    println!("  Listen: {}:{}", shown.server.host, shown.server.port);
    println!();

    println!("Observability:");
    println!("  Log Format: {}", shown.logging.format);
    println!("  Log Filter: {}", shown.logging.filter);
    println!(
        "  Metrics: {}",
        if shown.metrics.enabled {
            format!("enabled (port {})", shown.metrics.port)
        } else {
            "disabled".to_string()
        }
    );

    Ok(())
}
