use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

use crate::record::{COLUMNS, MedicationTable};

/// File name offered for the CSV download.
pub const CSV_FILENAME: &str = "reminders.csv";
pub const CSV_CONTENT_TYPE: &str = "text/csv";

pub const XLSX_FILENAME: &str = "reminders.xlsx";
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Convert the medication table to CSV format
///
/// The first line is the column header in schema order, followed by one
/// line per record. Fields containing commas, quotes or line breaks are
/// quoted, with embedded quotes doubled.
///
/// # Examples
/// ```
/// use medication_dashboard::downloader::to_csv;
/// use medication_dashboard::record::MedicationTable;
///
/// let csv = to_csv(&MedicationTable::new());
/// assert!(csv.starts_with("PatientID,Name,"));
/// assert_eq!(csv.lines().count(), 1);
/// ```
pub fn to_csv(table: &MedicationTable) -> String {
    let mut csv_content = String::new();
    push_csv_line(&mut csv_content, &COLUMNS);
    for record in table.records() {
        push_csv_line(&mut csv_content, &record.values());
    }
    csv_content
}

fn push_csv_line(out: &mut String, values: &[&str]) {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if value.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&value.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(value);
        }
    }
    out.push('\n');
}

/// Convert the medication table to XLSX format
///
/// Writes a single worksheet with a bold header row. Every cell is written
/// as text so identifiers such as `007` keep their leading zeros.
///
/// # Returns
/// * `Result<Vec<u8>, XlsxError>` - XLSX file content as bytes or an error
pub fn to_xlsx(table: &MedicationTable) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name("Reminders")?;

    let header = Format::new().set_bold();
    for (c, column) in COLUMNS.iter().enumerate() {
        worksheet.write_string_with_format(0, c as u16, *column, &header)?;
    }

    for (r, record) in table.records().iter().enumerate() {
        for (c, value) in record.values().iter().enumerate() {
            worksheet.write_string((r + 1) as u32, c as u16, *value)?;
        }
    }

    workbook.push_worksheet(worksheet);
    workbook.save_to_buffer()
}
