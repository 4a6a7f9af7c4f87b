/*!
# Senior Medication Dashboard

A browser-based dashboard for tracking senior patients' medication schedules,
backed by a spreadsheet that acts as the datastore.

## Overview

A caregiver views, adds, edits and deletes patient medication records through
form-based pages, and downloads the current record set as `reminders.csv`.
The spreadsheet is the only source of truth: every action loads the full
table, changes it in memory and writes the whole table back.

## Architecture

### Presentation Layer
- **Technologies**: HTML rendered with handlebars, served by axum
- **Key Components**:
  - Dashboard page - records table, add form, patient selector, modify form
  - Per-session UI state - which form is open, the selected patient, flash messages
  - Download endpoints - CSV and XLSX exports
  - JSON API - the same record operations for scripts

### Operations Layer
- Add, modify, delete and export, each a load / transform / save sequence
- Validation of the record invariants (required, unique `PatientID`)

### Data Persistence Layer
- Google Sheets (REST v4) as the primary backing store, authenticated as a
  service account whose access tokens are renewed as they expire
- Gzip-compressed bincode snapshot file for local use
- In-memory sheet for demos and tests

## Modules

- **record**: `PatientRecord`, `MedicationTable` and the fixed column schema
- **store**: the `SheetStore` trait and its backends
- **operations**: the record management operations
- **downloader**: CSV and XLSX export
- **config**: command line and environment configuration
- **error**: error types
- **session**: per-session UI state (web feature)
- **view**: page rendering (web feature)
- **app**: routing and handlers (web feature)

## Known limitations

Saves overwrite the whole sheet. Two people editing at the same time race
and the last save wins; nothing detects or prevents that.

## REST API Endpoints

- `GET /api/records` - All records with the column schema
- `POST /api/records` - Add a record
- `PUT /api/records/{id}` - Replace the non-key fields of a record
- `DELETE /api/records/{id}` - Delete every record with that id
*/

pub mod config;
pub mod downloader;
pub mod error;
pub mod operations;
pub mod record;
pub mod store;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod session;
#[cfg(feature = "web")]
pub mod view;

pub use error::{ConfigError, DashboardError, StoreError, ValidationError};
pub use record::{COLUMNS, MedicationTable, PatientRecord, RecordFields};
pub use store::SheetStore;
