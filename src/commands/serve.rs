//! Serve command handler.

use super::CommandResult;
use medtrack::http::{self, AppState};
use medtrack::services::create_event_store;
use medtrack::{Error, MedicationLogService, MedtrackConfig};

/// Serve command.
///
/// Runs the HTTP server on a multi-threaded runtime until Ctrl-C.
pub fn cmd_serve(mut config: MedtrackConfig, host: Option<String>, port: Option<u16>) -> CommandResult {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    let addr = config.server.socket_addr()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("medtrack-http")
        .build()
        .map_err(|e| Error::operation("create_runtime", e))?;

    runtime.block_on(async move {
        // Opening a store may block (migrations, file I/O).
        let storage = config.storage.clone();
        let store = tokio::task::spawn_blocking(move || create_event_store(&storage))
            .await
            .map_err(|e| Error::operation("open_store", e))??;
        let service = MedicationLogService::new(store);

        let user_name = config.user_name.clone();
        let probe = service.clone();
        let lookup = tokio::task::spawn_blocking(move || probe.store().resolve_user(&user_name))
            .await
            .map_err(|e| Error::operation("resolve_user", e))?;
        if let Err(e) = lookup {
            tracing::warn!(
                user = %config.user_name,
                error = %e,
                "Configured user is not available; requests will fail until it is provisioned"
            );
        }

        http::serve(AppState::new(service, config.user_name.as_str()), addr).await
    })?;

    Ok(())
}
