use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

use super::loader::{RecordFormat, read_record, write_record};
use super::model::EventRecord;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Failures of the spectral record accessor.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no spectral record for event {event} (looked for {path:?})")]
    NotFound { event: String, path: PathBuf },

    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record {path:?}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// SpectraStore – the accessor seam
// ---------------------------------------------------------------------------

/// Loads and saves whole per-event records. This is the only path by which
/// review decisions reach durable storage.
pub trait SpectraStore {
    /// Load the record of `event` below `parent_dir`.
    fn load(&self, parent_dir: &Path, event: &str) -> Result<EventRecord, StoreError>;

    /// Replace the record of `event`. Readers observe either the previous
    /// record or the new one, never a partial write.
    fn save(&mut self, parent_dir: &Path, event: &str, record: &EventRecord) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// FileStore – `{parent}/{event}/Spectra/{event}.{ext}`
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct FileStore {
    pub format: RecordFormat,
}

impl FileStore {
    pub fn new(format: RecordFormat) -> Self {
        Self { format }
    }

    /// Location of an event's record file.
    pub fn record_path(&self, parent_dir: &Path, event: &str) -> PathBuf {
        parent_dir
            .join(event)
            .join("Spectra")
            .join(format!("{event}.{}", self.format.extension()))
    }

    /// Events below `parent_dir` that have a record in this store's format.
    pub fn events(&self, parent_dir: &Path) -> Result<Vec<String>, StoreError> {
        let entries = std::fs::read_dir(parent_dir).map_err(|e| StoreError::io(parent_dir, e))?;

        let mut events = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(parent_dir, e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if self.record_path(parent_dir, &name).is_file() {
                events.push(name);
            }
        }
        events.sort();
        Ok(events)
    }
}

impl SpectraStore for FileStore {
    fn load(&self, parent_dir: &Path, event: &str) -> Result<EventRecord, StoreError> {
        let path = self.record_path(parent_dir, event);
        if !path.is_file() {
            return Err(StoreError::NotFound {
                event: event.to_string(),
                path,
            });
        }

        let record = read_record(&path).map_err(|e| StoreError::Malformed {
            path: path.clone(),
            reason: format!("{e:#}"),
        })?;
        log::debug!("Loaded {} stations from {}", record.len(), path.display());
        Ok(record)
    }

    fn save(&mut self, parent_dir: &Path, event: &str, record: &EventRecord) -> Result<(), StoreError> {
        let path = self.record_path(parent_dir, event);
        let dir = path.parent().unwrap_or(parent_dir);
        std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

        // Encode into a sibling temp file, then rename over the target.
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            write_record(&mut writer, self.format, record).map_err(|e| StoreError::Malformed {
                path: path.clone(),
                reason: format!("{e:#}"),
            })?;
            writer.flush().map_err(|e| StoreError::io(&path, e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| StoreError::io(&path, e))?;
        tmp.persist(&path)
            .map_err(|e| StoreError::io(&path, e.error))?;

        log::info!("Saved {} stations to {}", record.len(), path.display());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore – in-process records
// ---------------------------------------------------------------------------

/// Keeps records in memory, keyed by `(parent_dir, event)`. Every load hands
/// out an independent copy, like a fresh read from disk would.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: BTreeMap<(PathBuf, String), EventRecord>,
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, parent_dir: &Path, event: &str, record: EventRecord) -> Self {
        self.records
            .insert((parent_dir.to_path_buf(), event.to_string()), record);
        self
    }

    pub fn record(&self, parent_dir: &Path, event: &str) -> Option<&EventRecord> {
        self.records
            .get(&(parent_dir.to_path_buf(), event.to_string()))
    }

    /// Number of successful `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl SpectraStore for MemoryStore {
    fn load(&self, parent_dir: &Path, event: &str) -> Result<EventRecord, StoreError> {
        self.record(parent_dir, event)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                event: event.to_string(),
                path: parent_dir.join(event),
            })
    }

    fn save(&mut self, parent_dir: &Path, event: &str, record: &EventRecord) -> Result<(), StoreError> {
        self.records
            .insert((parent_dir.to_path_buf(), event.to_string()), record.clone());
        self.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::tests::station;

    fn event() -> EventRecord {
        let mut ev = EventRecord::new();
        ev.insert("STA1", station(true, Some((1.0, 50.0))));
        ev
    }

    #[test]
    fn file_store_uses_spectra_layout() {
        let store = FileStore::new(RecordFormat::Json);
        let path = store.record_path(Path::new("Events"), "2012-10-08T12:12:12.760000Z");
        assert_eq!(
            path,
            Path::new("Events/2012-10-08T12:12:12.760000Z/Spectra/2012-10-08T12:12:12.760000Z.json")
        );
    }

    #[test]
    fn file_store_missing_event_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(RecordFormat::Json);
        let err = store.load(dir.path(), "nope").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn file_store_save_replaces_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(RecordFormat::Parquet);

        store.save(dir.path(), "ev1", &event()).unwrap();
        let mut changed = store.load(dir.path(), "ev1").unwrap();
        changed.station_mut("STA1").unwrap().mark_unsuitable();
        store.save(dir.path(), "ev1", &changed).unwrap();

        let reloaded = store.load(dir.path(), "ev1").unwrap();
        assert!(!reloaded.station("STA1").unwrap().suitable_for_modeling());
        assert_eq!(store.events(dir.path()).unwrap(), vec!["ev1".to_string()]);

        // no stray temp files next to the record
        let spectra_dir = dir.path().join("ev1").join("Spectra");
        assert_eq!(std::fs::read_dir(spectra_dir).unwrap().count(), 1);
    }

    #[test]
    fn memory_store_loads_are_copies() {
        let parent = Path::new("mem");
        let store = MemoryStore::new().with_record(parent, "ev1", event());

        let mut copy = store.load(parent, "ev1").unwrap();
        copy.station_mut("STA1").unwrap().mark_unsuitable();

        let again = store.load(parent, "ev1").unwrap();
        assert!(again.station("STA1").unwrap().suitable_for_modeling());
        assert_eq!(store.save_count(), 0);
    }
}
