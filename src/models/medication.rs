//! Medication records.

use super::{MedicationId, UserId};
use serde::{Deserialize, Serialize};

/// Dosage amount given to medications created on first use.
pub const DEFAULT_DOSAGE_AMOUNT: f64 = 1.0;

/// Dosage unit given to medications created on first use.
pub const DEFAULT_DOSAGE_UNIT: &str = "mg";

/// Route given to medications created on first use.
pub const DEFAULT_ROUTE: &str = "oral";

/// Notes given to medications created on first use.
pub const DEFAULT_MEDICATION_NOTES: &str = "Created via log endpoint";

/// A named substance tracked for one user.
///
/// `(user_id, name)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    /// Row identifier.
    pub id: MedicationId,
    /// Owning user.
    pub user_id: UserId,
    /// Medication name.
    pub name: String,
    /// Dosage amount.
    pub dosage_amount: f64,
    /// Dosage unit (e.g. "mg").
    pub dosage_unit: String,
    /// Route of administration (e.g. "oral").
    pub route: String,
    /// Notes.
    pub notes: String,
}

/// Attributes of a medication about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMedication<'a> {
    /// Owning user.
    pub user_id: UserId,
    /// Medication name.
    pub name: &'a str,
    /// Dosage amount.
    pub dosage_amount: f64,
    /// Dosage unit.
    pub dosage_unit: &'a str,
    /// Route of administration.
    pub route: &'a str,
    /// Notes.
    pub notes: &'a str,
}

impl<'a> NewMedication<'a> {
    /// A medication created lazily by the first event that names it.
    #[must_use]
    pub const fn with_defaults(user_id: UserId, name: &'a str) -> Self {
        Self {
            user_id,
            name,
            dosage_amount: DEFAULT_DOSAGE_AMOUNT,
            dosage_unit: DEFAULT_DOSAGE_UNIT,
            route: DEFAULT_ROUTE,
            notes: DEFAULT_MEDICATION_NOTES,
        }
    }
}
