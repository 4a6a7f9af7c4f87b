//! Storage adapters for the medication sheet.
//!
//! Every backend exposes the same two calls: [`SheetStore::load`] returns the
//! whole table and [`SheetStore::save`] overwrites the whole store with a
//! table. There is no row-level update path and no conflict detection; the
//! last writer wins.

pub mod auth;
pub mod file;
pub mod google;
pub mod memory;
pub mod rows;

pub use auth::Credentials;
pub use file::FileStore;
pub use google::GoogleSheetStore;
pub use memory::MemoryStore;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::record::MedicationTable;

/// A tabular backing store holding the full medication table.
pub trait SheetStore: Send {
    /// Fetch every record. An empty store yields an empty table.
    fn load(&self) -> Result<MedicationTable, StoreError>;

    /// Replace the entire stored contents with `table`.
    fn save(&self, table: &MedicationTable) -> Result<(), StoreError>;

    /// Human readable name of the store, used in logs and diagnostics.
    fn describe(&self) -> String;
}

impl<S: SheetStore + ?Sized> SheetStore for Box<S> {
    fn load(&self) -> Result<MedicationTable, StoreError> {
        (**self).load()
    }

    fn save(&self, table: &MedicationTable) -> Result<(), StoreError> {
        (**self).save(table)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Open the store selected by `config`.
///
/// Fails with a connection-kind [`StoreError`] when the store cannot be
/// reached or the credentials are rejected.
pub fn open(config: &StoreConfig) -> Result<Box<dyn SheetStore>, StoreError> {
    let store: Box<dyn SheetStore> = match config {
        StoreConfig::Google {
            sheet_id,
            auth,
            api_url,
        } => {
            let credentials = Credentials::from_config(auth)?;
            Box::new(GoogleSheetStore::connect(api_url, sheet_id, credentials)?)
        }
        StoreConfig::File { path } => Box::new(FileStore::open(path)?),
        StoreConfig::Memory => Box::new(MemoryStore::new()),
    };
    log::info!("opened {}", store.describe());
    Ok(store)
}
