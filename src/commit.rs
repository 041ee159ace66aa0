use std::fmt;
use std::path::Path;

use crate::data::model::{EventRecord, LogBand};
use crate::data::store::{SpectraStore, StoreError};
use crate::error::ReviewError;
use crate::session::SessionStore;

// ---------------------------------------------------------------------------
// Commit report
// ---------------------------------------------------------------------------

/// Outcome of flushing one event.
#[derive(Debug)]
pub struct EventCommit {
    pub event: String,
    /// Stations whose staged values were (or would have been) written.
    pub stations: Vec<String>,
    pub result: Result<(), ReviewError>,
}

impl EventCommit {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-event outcome of a `commit` call.
#[derive(Debug, Default)]
pub struct CommitReport {
    pub events: Vec<EventCommit>,
}

impl CommitReport {
    /// Nothing was pending.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        self.events.iter().any(|e| !e.is_ok())
    }

    /// `(event, station)` pairs that reached storage.
    pub fn committed(&self) -> Vec<(&str, &str)> {
        self.events
            .iter()
            .filter(|e| e.is_ok())
            .flat_map(|e| e.stations.iter().map(move |s| (e.event.as_str(), s.as_str())))
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &EventCommit> {
        self.events.iter().filter(|e| !e.is_ok())
    }
}

impl fmt::Display for CommitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "No changes to commit.");
        }
        for (i, ev) in self.events.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let stations = ev.stations.join(", ");
            match &ev.result {
                Ok(()) => write!(f, "Committed {} for event {}.", stations, ev.event)?,
                Err(e) => write!(f, "Could not commit {} for event {}: {e}", stations, ev.event)?,
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Commit pipeline
// ---------------------------------------------------------------------------

/// A staged station value as it will be written.
struct StagedStation {
    station: String,
    /// `None` marks the station unsuitable.
    bandwidth: Option<LogBand>,
}

impl<S: SpectraStore> SessionStore<S> {
    /// Write every pending entry back through the accessor, one save per
    /// event. Events that fail keep their entries staged so a later commit
    /// retries them; events already saved are not written again.
    pub fn commit(&mut self) -> CommitReport {
        let mut report = CommitReport::default();
        let parent_dir = self.parent_dir().to_path_buf();

        for (event, session) in self.events.iter_mut() {
            let staged: Vec<StagedStation> = session
                .entries
                .values()
                .filter(|e| e.is_pending())
                .map(|e| StagedStation {
                    station: e.station().to_string(),
                    bandwidth: e.effective_bandwidth(),
                })
                .collect();
            if staged.is_empty() {
                continue;
            }
            let stations: Vec<String> = staged.iter().map(|s| s.station.clone()).collect();

            let result = flush_event(&mut self.store, &parent_dir, event, &staged);
            let result = match result {
                Ok(record) => {
                    for station in &stations {
                        if let Some(entry) = session.entries.get_mut(station) {
                            entry.mark_persisted();
                        }
                    }
                    session.record = record;
                    log::info!("Committed {} station(s) of event {event}", stations.len());
                    Ok(())
                }
                Err(e) => {
                    log::error!("Commit of event {event} failed: {e}");
                    Err(e)
                }
            };

            report.events.push(EventCommit {
                event: event.clone(),
                stations,
                result,
            });
        }

        report
    }
}

/// Reload the event, apply staged values on top of the fresh record and save
/// it once. Returns the record as saved.
fn flush_event<S: SpectraStore>(
    store: &mut S,
    parent_dir: &Path,
    event: &str,
    staged: &[StagedStation],
) -> Result<EventRecord, ReviewError> {
    let persistence = |source: StoreError| ReviewError::Persistence {
        event: event.to_string(),
        source,
    };

    let mut record = store.load(parent_dir, event).map_err(persistence)?;

    for change in staged {
        let station = record.station_mut(&change.station).ok_or_else(|| {
            ReviewError::StationNotFound {
                event: event.to_string(),
                station: change.station.clone(),
            }
        })?;
        match change.bandwidth {
            Some(band) => station.mark_suitable(band.to_freq_band()?)?,
            None => station.mark_unsuitable(),
        }
    }

    store.save(parent_dir, event, &record).map_err(persistence)?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::RecordFormat;
    use crate::data::model::tests::{spectrum, station};
    use crate::data::model::{ModelError, StationRecord};
    use crate::data::store::{FileStore, MemoryStore};
    use crate::session::tests::{EVENT, session};

    /// Fails every save of the named event.
    struct FailingStore {
        inner: MemoryStore,
        fail_event: String,
    }

    impl SpectraStore for FailingStore {
        fn load(&self, parent_dir: &Path, event: &str) -> Result<EventRecord, StoreError> {
            self.inner.load(parent_dir, event)
        }

        fn save(&mut self, parent_dir: &Path, event: &str, record: &EventRecord) -> Result<(), StoreError> {
            if event == self.fail_event {
                return Err(StoreError::Io {
                    path: parent_dir.join(event),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                });
            }
            self.inner.save(parent_dir, event, record)
        }
    }

    #[test]
    fn commit_writes_only_changed_station() {
        let mut s = session();
        let current = s.get_or_load(EVENT, "STA1").unwrap().current_bandwidth();
        s.get_or_load(EVENT, "STA3").unwrap();
        s.stage(EVENT, "STA1", false, current).unwrap();

        let before = s.store().record(Path::new("Events"), EVENT).unwrap().clone();
        let report = s.commit();

        assert_eq!(report.committed(), vec![(EVENT, "STA1")]);
        assert!(!report.has_failures());

        let after = s.store().record(Path::new("Events"), EVENT).unwrap();
        let sta1 = after.station("STA1").unwrap();
        assert!(!sta1.suitable_for_modeling());
        assert!(sta1.usable_bandwidth().is_none());
        assert_eq!(after.station("STA2"), before.station("STA2"));
        assert_eq!(after.station("STA3"), before.station("STA3"));
        assert_eq!(s.store().save_count(), 1);
    }

    #[test]
    fn commit_converts_band_back_to_hz() {
        let mut s = session();
        s.get_or_load(EVENT, "STA2").unwrap();
        s.stage(EVENT, "STA2", true, Some(LogBand::from_hz(0.5, 20.0)))
            .unwrap();

        s.commit();
        let band = s
            .store()
            .record(Path::new("Events"), EVENT)
            .unwrap()
            .station("STA2")
            .unwrap()
            .usable_bandwidth()
            .unwrap();
        assert!((band.min_hz() - 0.5).abs() < 1e-9);
        assert!((band.max_hz() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn commit_is_idempotent_after_success() {
        let mut s = session();
        s.get_or_load(EVENT, "STA1").unwrap();
        s.stage(EVENT, "STA1", true, Some(LogBand::from_hz(2.0, 40.0)))
            .unwrap();

        assert_eq!(s.commit().committed().len(), 1);
        assert!(!s.has_pending_changes());

        let again = s.commit();
        assert!(again.is_empty());
        assert_eq!(again.to_string(), "No changes to commit.");
        assert_eq!(s.store().save_count(), 1);
    }

    #[test]
    fn unsuitable_flip_clears_band_on_commit() {
        let mut s = session();
        s.get_or_load(EVENT, "STA1").unwrap();
        s.stage(EVENT, "STA1", false, Some(LogBand::from_hz(3.0, 30.0)))
            .unwrap();

        s.commit();
        let sta1 = s
            .store()
            .record(Path::new("Events"), EVENT)
            .unwrap()
            .station("STA1")
            .unwrap()
            .clone();
        assert!(!sta1.suitable_for_modeling());
        assert!(sta1.usable_bandwidth().is_none());
    }

    /// Two events with the same single station; the commit of the second
    /// is broken by swapping its stored record after staging.
    fn two_event_session() -> SessionStore<MemoryStore> {
        let parent = Path::new("Events");
        let mut ev = EventRecord::new();
        ev.insert("STA1", station(true, None));
        let store = MemoryStore::new()
            .with_record(parent, "ev-ok", ev.clone())
            .with_record(parent, "ev-bad", ev);
        let mut s = SessionStore::new(parent, store);
        for event in ["ev-bad", "ev-ok"] {
            s.get_or_load(event, "STA1").unwrap();
            s.stage(event, "STA1", true, Some(LogBand::from_hz(1.0, 50.0)))
                .unwrap();
        }
        s
    }

    fn replace_stored(s: &mut SessionStore<MemoryStore>, event: &str, record: EventRecord) {
        s.store = std::mem::take(&mut s.store).with_record(Path::new("Events"), event, record);
    }

    #[test]
    fn station_gone_from_storage_fails_its_event() {
        let mut s = two_event_session();
        let mut other = EventRecord::new();
        other.insert("STA9", station(true, None));
        replace_stored(&mut s, "ev-bad", other);

        let report = s.commit();
        assert_eq!(report.committed(), vec![("ev-ok", "STA1")]);
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.event, "ev-bad");
        assert!(matches!(failure.result, Err(ReviewError::StationNotFound { .. })));

        assert!(s.entry("ev-bad", "STA1").unwrap().is_pending());
        assert!(!s.entry("ev-ok", "STA1").unwrap().is_pending());
    }

    #[test]
    fn band_outside_fresh_record_fails_its_event() {
        let mut s = two_event_session();
        let narrow = spectrum(&[0.01, 0.1, 1.0, 10.0]);
        let mut shrunk = EventRecord::new();
        shrunk.insert("STA1", StationRecord::new(narrow.clone(), narrow, true, None));
        replace_stored(&mut s, "ev-bad", shrunk);

        let report = s.commit();
        assert_eq!(report.committed(), vec![("ev-ok", "STA1")]);
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.event, "ev-bad");
        assert!(matches!(
            failure.result,
            Err(ReviewError::InvalidBand(ModelError::BandOutOfRange { .. }))
        ));

        assert!(s.entry("ev-bad", "STA1").unwrap().is_pending());
        assert!(!s.entry("ev-ok", "STA1").unwrap().is_pending());
        let stored = s.store().record(Path::new("Events"), "ev-bad").unwrap();
        assert!(stored.station("STA1").unwrap().usable_bandwidth().is_none());
    }

    #[test]
    fn untouched_stations_keep_their_stored_bands() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(RecordFormat::Json);
        let path = store.record_path(dir.path(), EVENT);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();

        let axis = r#"{"freq": [0.01, 0.1, 1.0, 10.0, 100.0], "amp": [1.0, 0.9, 0.5, 0.1, 0.01]}"#;
        let json = format!(
            r#"{{"stations": {{
                "A": {{"signal": {axis}, "noise": {axis}, "pass_snr": true,  "ub_freqs": [1.0, 200.0]}},
                "B": {{"signal": {axis}, "noise": {axis}, "pass_snr": true,  "ub_freqs": [1.0, 50.0]}},
                "C": {{"signal": {axis}, "noise": {axis}, "pass_snr": false, "ub_freqs": [2.0, 20.0]}}
            }}}}"#
        );
        std::fs::write(&path, json).unwrap();

        let mut s = SessionStore::new(dir.path(), store);
        let current = s.get_or_load(EVENT, "B").unwrap().current_bandwidth();
        s.stage(EVENT, "B", false, current).unwrap();
        assert!(!s.commit().has_failures());

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let stations = &saved["stations"];
        assert_eq!(stations["A"]["ub_freqs"], serde_json::json!([1.0, 200.0]));
        assert_eq!(stations["A"]["pass_snr"], serde_json::json!(true));
        assert_eq!(stations["C"]["ub_freqs"], serde_json::json!([2.0, 20.0]));
        assert_eq!(stations["B"]["pass_snr"], serde_json::json!(false));
        assert_eq!(stations["B"]["ub_freqs"], serde_json::json!([]));
    }

    #[test]
    fn failed_event_stays_staged() {
        let parent = Path::new("Events");
        let mut ev = EventRecord::new();
        ev.insert("STA1", station(true, None));
        let inner = MemoryStore::new()
            .with_record(parent, "ev-ok", ev.clone())
            .with_record(parent, "ev-bad", ev);
        let store = FailingStore {
            inner,
            fail_event: "ev-bad".into(),
        };
        let mut s = SessionStore::new(parent, store);

        for event in ["ev-bad", "ev-ok"] {
            s.get_or_load(event, "STA1").unwrap();
            s.stage(event, "STA1", false, None).unwrap();
        }

        let report = s.commit();
        assert!(report.has_failures());
        assert_eq!(report.committed(), vec![("ev-ok", "STA1")]);
        let failed: Vec<&str> = report.failures().map(|f| f.event.as_str()).collect();
        assert_eq!(failed, vec!["ev-bad"]);
        assert!(matches!(
            report.failures().next().unwrap().result,
            Err(ReviewError::Persistence { .. })
        ));

        // ok event flushed, bad event still pending
        assert!(!s.entry("ev-ok", "STA1").unwrap().is_pending());
        assert!(s.entry("ev-bad", "STA1").unwrap().is_pending());

        s.store.fail_event.clear();
        let retry = s.commit();
        assert_eq!(retry.committed(), vec![("ev-bad", "STA1")]);
        assert!(!s.has_pending_changes());
    }
}
