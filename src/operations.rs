//! Record management operations.
//!
//! Each operation loads a fresh copy of the table, transforms it in memory
//! and, unless it is read-only, overwrites the store with the result. A
//! rejected operation never saves.

use crate::downloader;
use crate::error::{DashboardError, ValidationError};
use crate::record::{MedicationTable, PatientRecord, RecordFields};
use crate::store::SheetStore;

/// Current contents of the store.
pub fn list_records<S: SheetStore + ?Sized>(store: &S) -> Result<MedicationTable, DashboardError> {
    Ok(store.load()?)
}

/// Append a new patient record.
///
/// # Errors
/// * `ValidationError::MissingPatientId` if the identifier is empty
/// * `ValidationError::DuplicatePatientId` if the identifier is already in the table
pub fn add_record<S: SheetStore + ?Sized>(
    store: &S,
    record: PatientRecord,
) -> Result<PatientRecord, DashboardError> {
    let mut table = store.load()?;
    if let Err(e) = table.insert(record.clone()) {
        log::warn!("rejected new record {:?}: {e}", record.patient_id);
        return Err(e.into());
    }
    store.save(&table)?;
    log::info!("added patient {:?} ({} records)", record.patient_id, table.len());
    Ok(record)
}

/// Overwrite the non-key columns of every record with `patient_id`.
///
/// Returns the number of rows updated.
pub fn modify_record<S: SheetStore + ?Sized>(
    store: &S,
    patient_id: &str,
    fields: &RecordFields,
) -> Result<usize, DashboardError> {
    let mut table = store.load()?;
    let updated = table.update_matching(patient_id, fields);
    if updated == 0 {
        log::warn!("modify of unknown patient {patient_id:?}");
        return Err(ValidationError::UnknownPatientId(patient_id.to_string()).into());
    }
    store.save(&table)?;
    log::info!("updated {updated} row(s) for patient {patient_id:?}");
    Ok(updated)
}

/// Remove every record with `patient_id`. Returns the number removed.
pub fn delete_record<S: SheetStore + ?Sized>(
    store: &S,
    patient_id: &str,
) -> Result<usize, DashboardError> {
    let mut table = store.load()?;
    let removed = table.remove_matching(patient_id);
    if removed == 0 {
        log::warn!("delete of unknown patient {patient_id:?}");
        return Err(ValidationError::UnknownPatientId(patient_id.to_string()).into());
    }
    store.save(&table)?;
    log::info!("deleted {removed} row(s) for patient {patient_id:?}");
    Ok(removed)
}

/// Fresh CSV rendering of the table. Never saves.
pub fn export_csv<S: SheetStore + ?Sized>(store: &S) -> Result<String, DashboardError> {
    let table = store.load()?;
    Ok(downloader::to_csv(&table))
}

/// Fresh XLSX rendering of the table. Never saves.
pub fn export_xlsx<S: SheetStore + ?Sized>(store: &S) -> Result<Vec<u8>, DashboardError> {
    let table = store.load()?;
    Ok(downloader::to_xlsx(&table)?)
}
