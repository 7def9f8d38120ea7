//! Route handlers.
//!
//! Storage work is synchronous, so each handler hands the service call to a
//! blocking worker together with the current request context.

use super::AppState;
use crate::models::{EventListing, LogEventRequest};
use crate::observability::{current_request_context, enter_request_context};
use crate::{Error, Result};
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;

/// Body of a successful `POST /log`.
#[derive(Debug, Serialize)]
pub struct LoggedResponse {
    /// Confirmation text.
    pub message: &'static str,
    /// Id of the new event.
    pub event_id: crate::models::EventId,
}

/// `GET /`
pub async fn index() -> &'static str {
    "Medication Tracker API is running."
}

/// `POST /log`
pub async fn log_medication(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<LoggedResponse>)> {
    let request = parse_log_request(&body)?;

    let recorded =
        run_blocking(move || state.service.log_event(&state.user_name, &request)).await?;

    Ok((
        StatusCode::CREATED,
        Json(LoggedResponse {
            message: "Medication logged successfully!",
            event_id: recorded.event_id,
        }),
    ))
}

/// `GET /medications`
pub async fn list_medications(State(state): State<AppState>) -> Result<Json<Vec<EventListing>>> {
    let events = run_blocking(move || state.service.list_events(&state.user_name)).await?;
    Ok(Json(events))
}

/// Parses a `POST /log` body.
///
/// The body must be a JSON object; its known keys must be strings or null.
/// Unknown keys are ignored.
fn parse_log_request(body: &[u8]) -> Result<LogEventRequest> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| Error::InvalidInput(format!("request body is not valid JSON: {e}")))?;

    if !value.is_object() {
        return Err(Error::InvalidInput(
            "request body must be a JSON object".to_string(),
        ));
    }

    serde_json::from_value(value).map_err(|e| Error::InvalidInput(e.to_string()))
}

/// Runs `op` on the blocking pool, carrying the request context across.
async fn run_blocking<T, F>(op: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let context = current_request_context();
    tokio::task::spawn_blocking(move || {
        let _guard = context.map(enter_request_context);
        op()
    })
    .await
    .map_err(|e| Error::operation("spawn_blocking", e))?
}
