//! Conversion between raw sheet rows and a [`MedicationTable`].
//!
//! A sheet is a header row followed by data rows, every cell a string. Rows
//! may be ragged: trailing empty cells are usually omitted by the remote API.

use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::record::{COLUMNS, KEY_COLUMN, MedicationTable, PatientRecord};

/// Header row in schema order.
pub fn header_row() -> Vec<String> {
    COLUMNS.iter().map(|c| c.to_string()).collect()
}

/// Decode sheet rows into a table.
///
/// An empty sheet, or one with only a header, decodes to an empty table.
/// Columns are matched by header name, so a reordered sheet still loads.
/// Cells under columns outside the schema are carried on each record and
/// the header is kept on the table, so [`encode_rows`] can write them back.
/// Fully blank data rows are skipped.
pub fn decode_rows(rows: &[Vec<String>]) -> Result<MedicationTable, StoreError> {
    let Some((header, data)) = rows.split_first() else {
        return Ok(MedicationTable::new());
    };
    if header.iter().all(|cell| cell.trim().is_empty()) && data.is_empty() {
        return Ok(MedicationTable::new());
    }

    let mut positions: BTreeMap<&str, usize> = BTreeMap::new();
    let mut foreign = Vec::new();
    for (index, name) in header.iter().enumerate() {
        let name = name.trim();
        match COLUMNS.iter().find(|column| **column == name) {
            Some(column) if !positions.contains_key(column) => {
                positions.insert(*column, index);
            }
            _ => {
                if !name.is_empty() {
                    log::debug!("keeping column {name:?} which is not part of the medication schema");
                }
                foreign.push(index);
            }
        }
    }
    if !positions.contains_key(KEY_COLUMN) {
        return Err(StoreError::Malformed(format!(
            "header row is missing the {KEY_COLUMN} column"
        )));
    }
    for column in COLUMNS.iter().filter(|c| !positions.contains_key(*c)) {
        log::debug!("column {column} missing from sheet, loading it as empty");
    }

    let mut records = Vec::with_capacity(data.len());
    for (line, row) in data.iter().enumerate() {
        if row.iter().all(|cell| cell.is_empty()) {
            log::debug!("skipping blank sheet row {}", line + 2);
            continue;
        }
        let columns: BTreeMap<&str, String> = positions
            .iter()
            .map(|(name, &index)| (*name, row.get(index).cloned().unwrap_or_default()))
            .collect();
        let mut record = PatientRecord::from_columns(&columns);
        record.extra = foreign
            .iter()
            .filter_map(|&index| row.get(index).map(|cell| (index, cell.clone())))
            .filter(|(_, cell)| !cell.is_empty())
            .collect();
        records.push(record);
    }

    let table = MedicationTable::from_records(records).with_header(header.clone());
    let duplicates = table.duplicate_ids();
    if !duplicates.is_empty() {
        log::warn!("sheet holds duplicate patient ids {duplicates:?}; edits apply to every match");
    }
    Ok(table)
}

/// Encode a table as a header row plus one row per record.
///
/// Tables loaded with their own header are written in that layout, with
/// any schema column the header lacks appended at the end. Every row is
/// padded to the header's width.
pub fn encode_rows(table: &MedicationTable) -> Vec<Vec<String>> {
    let mut header = if table.header().is_empty() {
        header_row()
    } else {
        table.header().to_vec()
    };

    let mut positions: BTreeMap<&str, usize> = BTreeMap::new();
    for (index, name) in header.iter().enumerate() {
        if let Some(column) = COLUMNS.iter().find(|column| **column == name.trim()) {
            positions.entry(*column).or_insert(index);
        }
    }
    for column in COLUMNS {
        if !positions.contains_key(column) {
            positions.insert(column, header.len());
            header.push(column.to_string());
        }
    }
    let schema_index: Vec<usize> = COLUMNS.iter().map(|c| positions[c]).collect();

    let mut rows = Vec::with_capacity(table.len() + 1);
    rows.extend(table.records().iter().map(|record| {
        let mut row = vec![String::new(); header.len()];
        for (&index, cell) in &record.extra {
            if let Some(slot) = row.get_mut(index) {
                slot.clone_from(cell);
            }
        }
        for (&index, value) in schema_index.iter().zip(record.values()) {
            row[index] = value.to_string();
        }
        row
    }));
    rows.insert(0, header);
    rows
}
