//! Operation metrics shared by the `SQLite` and PostgreSQL stores.

use std::time::Instant;

/// Counts one storage operation and records its latency in milliseconds.
///
/// Emits `storage_operations_total` and `storage_operation_duration_ms`, both
/// labelled by `backend`, `operation` and `status` (`success` | `error`).
pub fn record_operation_metrics(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "storage_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Runs `op`, recording its outcome and latency under `backend`/`operation`.
pub fn timed<T, E>(
    backend: &'static str,
    operation: &'static str,
    op: impl FnOnce() -> Result<T, E>,
) -> Result<T, E> {
    let start = Instant::now();
    let result = op();
    let status = if result.is_ok() { "success" } else { "error" };
    record_operation_metrics(backend, operation, start, status);
    result
}
