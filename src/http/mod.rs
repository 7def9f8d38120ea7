//! HTTP transport.
//!
//! | Route | Method | Success |
//! |-------|--------|---------|
//! | `/` | GET | 200 `Medication Tracker API is running.` |
//! | `/log` | POST | 201 `{"message": ..., "event_id": N}` |
//! | `/medications` | GET | 200 `[[id, name, time, source, notes], ...]` |
//!
//! Failures are `{"error": message}` with 400 for client errors and 500
//! otherwise.

mod error;
mod handlers;

pub use handlers::LoggedResponse;

use crate::observability::{REQUEST_ID_HEADER, RequestContext, scope_request_context};
use crate::services::MedicationLogService;
use crate::{Error, Result};
use axum::Router;
use axum::extract::Request;
use axum::http::{HeaderValue, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Logging service.
    pub service: MedicationLogService,
    /// Identity every request acts for.
    pub user_name: Arc<str>,
}

impl AppState {
    /// Creates handler state.
    #[must_use]
    pub fn new(service: MedicationLogService, user_name: impl Into<Arc<str>>) -> Self {
        Self {
            service,
            user_name: user_name.into(),
        }
    }
}

/// Builds the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/log", post(handlers::log_medication))
        .route("/medications", get(handlers::list_medications))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id
            )
        }))
        .layer(middleware::from_fn(request_context))
        .with_state(state)
}

/// Assigns a correlation id, echoes it in the response and counts the request.
async fn request_context(mut request: Request, next: Next) -> Response {
    let context = RequestContext::from_header(
        request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok()),
    );
    let header_value = HeaderValue::from_str(context.request_id()).ok();
    if let Some(value) = &header_value {
        request.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
    }

    let method = request.method().to_string();
    let route = route_label(request.uri().path());

    let mut response = scope_request_context(context, next.run(request)).await;

    if let Some(value) = header_value {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    metrics::counter!(
        "http_requests_total",
        "method" => method,
        "route" => route,
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);

    response
}

/// Metric label for a request path; unknown paths share one label.
fn route_label(path: &str) -> &'static str {
    match path {
        "/" => "/",
        "/log" => "/log",
        "/medications" => "/medications",
        _ => "unmatched",
    }
}

/// Binds `addr` and serves until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::operation("bind", format!("{addr}: {e}")))?;
    serve_on(listener, state, shutdown_signal()).await
}

/// Serves on an already-bound listener until `shutdown` completes.
///
/// In-flight requests finish before this returns.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve_on(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let local_addr = listener
        .local_addr()
        .map_err(|e| Error::operation("local_addr", e))?;
    tracing::info!(
        addr = %local_addr,
        user = %state.user_name,
        backend = state.service.store().backend_name(),
        "Medication Tracker API listening"
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::operation("serve", e))?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C; shutting down");
        return;
    }
    tracing::info!("Shutdown signal received");
}
