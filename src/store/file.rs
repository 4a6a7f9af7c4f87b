use bincode::{deserialize_from, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::StoreError;
use crate::record::MedicationTable;
use crate::store::SheetStore;
use crate::store::rows::{decode_rows, encode_rows};

const SNAPSHOT_VERSION: u32 = 1;

/// On-disk layout: the sheet rows, header first.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    rows: Vec<Vec<String>>,
}

/// Local sheet kept as a gzip-compressed bincode snapshot.
///
/// Saves write a temporary file next to the snapshot and rename it into
/// place, so a reader never sees a half-written file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Open (or prepare to create) the snapshot at `path`.
    ///
    /// The parent directory is created if needed. A missing snapshot file is
    /// not an error: the store simply starts empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let target = format!("data file {}", path.display());
        let connection_error = |reason: String| StoreError::Connection {
            target: target.clone(),
            reason,
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| connection_error(e.to_string()))?;
            let readonly = fs::metadata(dir)
                .map_err(|e| connection_error(e.to_string()))?
                .permissions()
                .readonly();
            if readonly {
                return Err(connection_error("directory is read-only".to_string()));
            }
        }
        if path.is_dir() {
            return Err(connection_error("path is a directory".to_string()));
        }

        let store = FileStore { path };
        // Surface a corrupt snapshot at startup instead of on first request.
        store
            .read_rows()
            .map_err(|e| connection_error(e.to_string()))?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_rows(&self) -> Result<Vec<Vec<String>>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)?;
        let decoder = GzDecoder::new(file);
        let mut reader = BufReader::new(decoder);

        let snapshot: Snapshot = deserialize_from(&mut reader)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::Malformed(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(snapshot.rows)
    }

    fn write_rows(&self, rows: Vec<Vec<String>>) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let temp = NamedTempFile::new_in(dir)?;
        {
            let encoder = GzEncoder::new(temp.as_file(), Compression::default());
            let mut writer = BufWriter::new(encoder);
            let snapshot = Snapshot {
                version: SNAPSHOT_VERSION,
                rows,
            };
            serialize_into(&mut writer, &snapshot)?;
            writer.flush()?;
            let encoder = writer.into_inner().map_err(|e| e.into_error())?;
            encoder.finish()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl SheetStore for FileStore {
    fn load(&self) -> Result<MedicationTable, StoreError> {
        decode_rows(&self.read_rows()?)
    }

    fn save(&self, table: &MedicationTable) -> Result<(), StoreError> {
        self.write_rows(encode_rows(table))
    }

    fn describe(&self) -> String {
        format!("data file {}", self.path.display())
    }
}
