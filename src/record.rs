use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ValidationError;

/// Column names of the backing sheet, in display and storage order.
pub const COLUMNS: [&str; 10] = [
    "PatientID",
    "Name",
    "PhoneNumber",
    "MedicationName",
    "Dosage",
    "Frequency",
    "LastAdministeredDate",
    "NextDueDate",
    "Time",
    "Notes",
];

/// Name of the key column.
pub const KEY_COLUMN: &str = COLUMNS[0];

/// The nine non-key columns of a record.
///
/// Used as the payload of a modify and as the body of the add/modify forms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFields {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "PhoneNumber", default)]
    pub phone_number: String,
    #[serde(rename = "MedicationName", default)]
    pub medication_name: String,
    #[serde(rename = "Dosage", default)]
    pub dosage: String,
    #[serde(rename = "Frequency", default)]
    pub frequency: String,
    #[serde(rename = "LastAdministeredDate", default)]
    pub last_administered_date: String,
    #[serde(rename = "NextDueDate", default)]
    pub next_due_date: String,
    #[serde(rename = "Time", default)]
    pub time: String,
    #[serde(rename = "Notes", default)]
    pub notes: String,
}

impl RecordFields {
    /// Values in schema order, excluding the key column.
    pub fn values(&self) -> [&str; 9] {
        [
            &self.name,
            &self.phone_number,
            &self.medication_name,
            &self.dosage,
            &self.frequency,
            &self.last_administered_date,
            &self.next_due_date,
            &self.time,
            &self.notes,
        ]
    }

    fn field_mut(&mut self, column: &str) -> Option<&mut String> {
        match column {
            "Name" => Some(&mut self.name),
            "PhoneNumber" => Some(&mut self.phone_number),
            "MedicationName" => Some(&mut self.medication_name),
            "Dosage" => Some(&mut self.dosage),
            "Frequency" => Some(&mut self.frequency),
            "LastAdministeredDate" => Some(&mut self.last_administered_date),
            "NextDueDate" => Some(&mut self.next_due_date),
            "Time" => Some(&mut self.time),
            "Notes" => Some(&mut self.notes),
            _ => None,
        }
    }
}

/// One patient's medication entry, keyed by `PatientID`.
///
/// Every attribute is a free-text display string. Dates and times are kept
/// exactly as the caregiver typed them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    #[serde(rename = "PatientID")]
    pub patient_id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "PhoneNumber", default)]
    pub phone_number: String,
    #[serde(rename = "MedicationName", default)]
    pub medication_name: String,
    #[serde(rename = "Dosage", default)]
    pub dosage: String,
    #[serde(rename = "Frequency", default)]
    pub frequency: String,
    #[serde(rename = "LastAdministeredDate", default)]
    pub last_administered_date: String,
    #[serde(rename = "NextDueDate", default)]
    pub next_due_date: String,
    #[serde(rename = "Time", default)]
    pub time: String,
    #[serde(rename = "Notes", default)]
    pub notes: String,
    /// Cells of sheet columns outside the schema, keyed by column position.
    #[serde(skip)]
    pub extra: BTreeMap<usize, String>,
}

impl PatientRecord {
    pub fn new(patient_id: impl Into<String>, fields: RecordFields) -> Self {
        PatientRecord {
            patient_id: patient_id.into(),
            name: fields.name,
            phone_number: fields.phone_number,
            medication_name: fields.medication_name,
            dosage: fields.dosage,
            frequency: fields.frequency,
            last_administered_date: fields.last_administered_date,
            next_due_date: fields.next_due_date,
            time: fields.time,
            notes: fields.notes,
            extra: BTreeMap::new(),
        }
    }

    /// Build a record from a map of column name to value.
    ///
    /// Columns outside the schema are ignored and schema columns missing
    /// from the map are left empty.
    pub fn from_columns(columns: &BTreeMap<&str, String>) -> Self {
        let mut fields = RecordFields::default();
        for (column, value) in columns {
            if let Some(slot) = fields.field_mut(column) {
                slot.clone_from(value);
            }
        }
        let patient_id = columns.get(KEY_COLUMN).cloned().unwrap_or_default();
        PatientRecord::new(patient_id, fields)
    }

    /// Non-key attributes of this record.
    pub fn fields(&self) -> RecordFields {
        RecordFields {
            name: self.name.clone(),
            phone_number: self.phone_number.clone(),
            medication_name: self.medication_name.clone(),
            dosage: self.dosage.clone(),
            frequency: self.frequency.clone(),
            last_administered_date: self.last_administered_date.clone(),
            next_due_date: self.next_due_date.clone(),
            time: self.time.clone(),
            notes: self.notes.clone(),
        }
    }

    /// Overwrite every non-key attribute, leaving `PatientID` and the
    /// non-schema cells untouched.
    pub fn apply(&mut self, fields: &RecordFields) {
        let id = std::mem::take(&mut self.patient_id);
        let extra = std::mem::take(&mut self.extra);
        *self = PatientRecord {
            extra,
            ..PatientRecord::new(id, fields.clone())
        };
    }

    /// Values in schema order, key first.
    pub fn values(&self) -> [&str; 10] {
        [
            &self.patient_id,
            &self.name,
            &self.phone_number,
            &self.medication_name,
            &self.dosage,
            &self.frequency,
            &self.last_administered_date,
            &self.next_due_date,
            &self.time,
            &self.notes,
        ]
    }
}

/// Ordered sequence of patient records. Insertion order is display order.
///
/// A table loaded from a sheet whose header differs from [`COLUMNS`] keeps
/// that header, so saving writes the sheet back in its own column layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicationTable {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    header: Vec<String>,
    records: Vec<PatientRecord>,
}

impl MedicationTable {
    pub fn new() -> Self {
        MedicationTable::default()
    }

    pub fn from_records(records: Vec<PatientRecord>) -> Self {
        MedicationTable {
            header: Vec::new(),
            records,
        }
    }

    /// Attach the header row the records were loaded under.
    ///
    /// A header equal to [`COLUMNS`] is the default layout and is not stored.
    pub fn with_header(mut self, header: Vec<String>) -> Self {
        let canonical = header.len() == COLUMNS.len()
            && header.iter().zip(COLUMNS).all(|(cell, column)| cell == column);
        self.header = if canonical { Vec::new() } else { header };
        self
    }

    /// Header row of the sheet this table came from; empty for the default layout.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn records(&self) -> &[PatientRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<PatientRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Patient identifiers in display order.
    pub fn ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.patient_id.as_str()).collect()
    }

    /// Exact, case-sensitive identifier lookup.
    pub fn contains_id(&self, patient_id: &str) -> bool {
        self.records.iter().any(|r| r.patient_id == patient_id)
    }

    /// First record carrying `patient_id`.
    pub fn find(&self, patient_id: &str) -> Option<&PatientRecord> {
        self.records.iter().find(|r| r.patient_id == patient_id)
    }

    /// Check the at-rest invariants for a record about to be appended.
    pub fn check_insert(&self, record: &PatientRecord) -> Result<(), ValidationError> {
        if record.patient_id.is_empty() {
            return Err(ValidationError::MissingPatientId);
        }
        if self.contains_id(&record.patient_id) {
            return Err(ValidationError::DuplicatePatientId(
                record.patient_id.clone(),
            ));
        }
        Ok(())
    }

    /// Append a record after validating it against the table.
    pub fn insert(&mut self, record: PatientRecord) -> Result<(), ValidationError> {
        self.check_insert(&record)?;
        self.records.push(record);
        Ok(())
    }

    /// Overwrite the non-key columns of every row matching `patient_id`.
    ///
    /// Returns the number of rows touched. Rows keep their position.
    pub fn update_matching(&mut self, patient_id: &str, fields: &RecordFields) -> usize {
        let mut touched = 0;
        for record in self.records.iter_mut().filter(|r| r.patient_id == patient_id) {
            record.apply(fields);
            touched += 1;
        }
        touched
    }

    /// Remove every row matching `patient_id`. Returns the number removed.
    pub fn remove_matching(&mut self, patient_id: &str) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.patient_id != patient_id);
        before - self.records.len()
    }

    /// Identifiers that occur on more than one row, in first-seen order.
    pub fn duplicate_ids(&self) -> Vec<&str> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        let mut order = Vec::new();
        for record in &self.records {
            let count = counts.entry(record.patient_id.as_str()).or_insert(0);
            *count += 1;
            if *count == 2 {
                order.push(record.patient_id.as_str());
            }
        }
        order
    }
}

impl FromIterator<PatientRecord> for MedicationTable {
    fn from_iter<I: IntoIterator<Item = PatientRecord>>(iter: I) -> Self {
        MedicationTable::from_records(iter.into_iter().collect())
    }
}
