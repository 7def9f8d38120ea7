//! Business logic services.
//!
//! Services validate input and orchestrate the storage backend.

mod backend_factory;
mod medication_log;
mod validation;

pub use backend_factory::create_event_store;
pub use medication_log::MedicationLogService;
pub use validation::{effective_source, validate_log_request};
