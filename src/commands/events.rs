//! Event command handlers.

use super::{CommandResult, ListFormat};
use medtrack::services::create_event_store;
use medtrack::{LogEventRequest, MedicationLogService, MedtrackConfig};

fn open_service(config: &MedtrackConfig) -> Result<MedicationLogService, medtrack::Error> {
    Ok(MedicationLogService::new(create_event_store(&config.storage)?))
}

/// Log command.
pub fn cmd_log(config: &MedtrackConfig, request: LogEventRequest) -> CommandResult {
    let service = open_service(config)?;
    let medication = request.medication.clone().unwrap_or_default();
    let recorded = service.log_event(&config.user_name, &request)?;

    println!("Medication logged successfully!");
    println!("  Event ID: {}", recorded.event_id);
    println!("  Medication: {medication} (id {})", recorded.medication_id);
    if recorded.medication_created {
        println!("  Note: new medication created with default dosage");
    }

    Ok(())
}

/// List command.
pub fn cmd_list(config: &MedtrackConfig, format: ListFormat) -> CommandResult {
    let service = open_service(config)?;
    let events = service.list_events(&config.user_name)?;

    match format {
        ListFormat::Json => println!("{}", serde_json::to_string_pretty(&events)?),
        ListFormat::Table => {
            if events.is_empty() {
                println!("No events recorded for '{}'", config.user_name);
                return Ok(());
            }
            println!(
                "{:>6}  {:<24}  {:<26}  {:<12}  NOTES",
                "ID", "MEDICATION", "TIME", "SOURCE"
            );
            for event in &events {
                println!(
                    "{:>6}  {:<24}  {:<26}  {:<12}  {}",
                    event.event_id,
                    event.medication,
                    event.event_time_iso().as_deref().unwrap_or("-"),
                    event.event_source,
                    event.notes
                );
            }
        },
    }

    Ok(())
}

/// Medications command.
pub fn cmd_medications(config: &MedtrackConfig) -> CommandResult {
    let service = open_service(config)?;
    let medications = service.list_medications(&config.user_name)?;

    if medications.is_empty() {
        println!("No medications recorded for '{}'", config.user_name);
        return Ok(());
    }

    println!(
        "{:>6}  {:<24}  {:>8}  {:<6}  {:<8}  NOTES",
        "ID", "NAME", "DOSE", "UNIT", "ROUTE"
    );
    for medication in &medications {
        println!(
            "{:>6}  {:<24}  {:>8.2}  {:<6}  {:<8}  {}",
            medication.id,
            medication.name,
            medication.dosage_amount,
            medication.dosage_unit,
            medication.route,
            medication.notes
        );
    }

    Ok(())
}
