//! User command handlers.

use super::{CommandResult, UserAction};
use medtrack::services::create_event_store;
use medtrack::{MedicationLogService, MedtrackConfig};

/// User command.
pub fn cmd_user(config: &MedtrackConfig, action: UserAction) -> CommandResult {
    match action {
        UserAction::Add { name } => {
            let service = MedicationLogService::new(create_event_store(&config.storage)?);
            let user_id = service.create_user(&name)?;
            println!("User '{name}' ready (id {user_id})");
        },
    }
    Ok(())
}
