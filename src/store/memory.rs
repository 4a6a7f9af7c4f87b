use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::StoreError;
use crate::record::MedicationTable;
use crate::store::SheetStore;
use crate::store::rows::{decode_rows, encode_rows};

/// In-process sheet. Clones share the same rows.
///
/// Holds raw sheet rows rather than a table so that loads go through the
/// same decoding path as the remote sheet.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    rows: Mutex<Vec<Vec<String>>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Start from raw sheet rows, header first.
    pub fn with_rows(rows: Vec<Vec<String>>) -> Self {
        let store = MemoryStore::new();
        *store.lock() = rows;
        store
    }

    pub fn with_table(table: &MedicationTable) -> Self {
        MemoryStore::with_rows(encode_rows(table))
    }

    /// Copy of the raw rows currently stored.
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.lock().clone()
    }

    /// Number of successful saves since creation.
    pub fn save_count(&self) -> usize {
        self.inner.saves.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Vec<String>>> {
        self.inner.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SheetStore for MemoryStore {
    fn load(&self) -> Result<MedicationTable, StoreError> {
        decode_rows(&self.lock())
    }

    fn save(&self, table: &MedicationTable) -> Result<(), StoreError> {
        *self.lock() = encode_rows(table);
        self.inner.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "in-memory sheet".to_string()
    }
}
