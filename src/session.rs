use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};

use crate::bandwidth::{bandwidths_match, derive_bandwidth, derive_min_max};
use crate::data::model::{EventRecord, LogBand, StationRecord};
use crate::data::store::SpectraStore;
use crate::error::ReviewError;

// ---------------------------------------------------------------------------
// SessionEntry – cached review state of one (event, station)
// ---------------------------------------------------------------------------

/// What the durable record holds for a station, as far as the session knows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Persisted {
    pub(crate) suitable: bool,
    pub(crate) bandwidth: Option<LogBand>,
}

/// Session view of one station: derived defaults plus the working values
/// the analyst edits.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEntry {
    event: String,
    station: String,
    derived_min_max: LogBand,
    derived_bandwidth: Option<LogBand>,
    pub(crate) suitable_for_modeling: bool,
    pub(crate) current_bandwidth: Option<LogBand>,
    pub(crate) persisted: Persisted,
}

impl SessionEntry {
    /// Seed an entry from a durable station record.
    pub(crate) fn derive(event: &str, station: &str, record: &StationRecord) -> Result<Self, ReviewError> {
        let derived_min_max = derive_min_max(&record.signal)?;
        let derived_bandwidth = derive_bandwidth(record)?;
        let suitable = record.suitable_for_modeling();

        Ok(Self {
            event: event.to_string(),
            station: station.to_string(),
            derived_min_max,
            derived_bandwidth,
            suitable_for_modeling: suitable,
            current_bandwidth: derived_bandwidth,
            persisted: Persisted {
                suitable,
                bandwidth: derived_bandwidth,
            },
        })
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn station(&self) -> &str {
        &self.station
    }

    /// Signal range in log10(Hz); the slider limits.
    pub fn derived_min_max(&self) -> LogBand {
        self.derived_min_max
    }

    /// Bandwidth derived when the entry was loaded; `None` if the station was
    /// unsuitable at that time.
    pub fn derived_bandwidth(&self) -> Option<LogBand> {
        self.derived_bandwidth
    }

    pub fn suitable_for_modeling(&self) -> bool {
        self.suitable_for_modeling
    }

    /// Working bandwidth, possibly edited. May still be set on an entry just
    /// marked unsuitable; the commit clears it from storage.
    pub fn current_bandwidth(&self) -> Option<LogBand> {
        self.current_bandwidth
    }

    /// The bandwidth a commit would write: `None` when unsuitable, otherwise
    /// the working band or, lacking one, the signal range.
    pub fn effective_bandwidth(&self) -> Option<LogBand> {
        if self.suitable_for_modeling {
            Some(self.current_bandwidth.unwrap_or(self.derived_min_max))
        } else {
            None
        }
    }

    /// Whether the entry differs from what was last persisted.
    pub fn is_pending(&self) -> bool {
        let effective = self.effective_bandwidth();
        self.suitable_for_modeling != self.persisted.suitable
            || (self.suitable_for_modeling
                && !bandwidths_match(effective, self.persisted.bandwidth))
    }

    /// Record that storage now holds this entry's values.
    pub(crate) fn mark_persisted(&mut self) {
        self.persisted = Persisted {
            suitable: self.suitable_for_modeling,
            bandwidth: self.effective_bandwidth(),
        };
    }
}

// ---------------------------------------------------------------------------
// SessionStore – all review state of one editing session
// ---------------------------------------------------------------------------

/// Cached event record plus the entries loaded from it.
#[derive(Debug)]
pub(crate) struct EventSession {
    pub(crate) record: EventRecord,
    pub(crate) entries: BTreeMap<String, SessionEntry>,
}

/// Owns every [`SessionEntry`] of a session and the accessor used to load
/// and commit them.
///
/// All mutating operations take `&mut self`, so there is exactly one
/// authoritative entry per (event, station) and no two operations on the same
/// session interleave. Run one store per session.
pub struct SessionStore<S> {
    parent_dir: PathBuf,
    pub(crate) store: S,
    pub(crate) events: BTreeMap<String, EventSession>,
}

impl<S: SpectraStore> SessionStore<S> {
    pub fn new(parent_dir: impl Into<PathBuf>, store: S) -> Self {
        Self {
            parent_dir: parent_dir.into(),
            store,
            events: BTreeMap::new(),
        }
    }

    pub fn parent_dir(&self) -> &Path {
        &self.parent_dir
    }

    /// The underlying accessor.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Return the entry for (event, station), loading and deriving it on
    /// first access. A cached entry is returned as is, keeping staged edits.
    pub fn get_or_load(&mut self, event: &str, station: &str) -> Result<&SessionEntry, ReviewError> {
        let session = self.load_event(event)?;

        match session.entries.entry(station.to_string()) {
            Entry::Occupied(cached) => Ok(cached.into_mut()),
            Entry::Vacant(slot) => {
                let record = session.record.station(station).ok_or_else(|| {
                    ReviewError::StationNotFound {
                        event: event.to_string(),
                        station: station.to_string(),
                    }
                })?;
                let entry = SessionEntry::derive(event, station, record)?;
                log::debug!(
                    "Loaded {event}/{station}: suitable={}, bandwidth={:?}",
                    entry.suitable_for_modeling,
                    entry.current_bandwidth
                );
                Ok(slot.insert(entry))
            }
        }
    }

    /// Station ids of an event, loading the event if needed.
    pub fn station_ids(&mut self, event: &str) -> Result<Vec<String>, ReviewError> {
        Ok(self.load_event(event)?.record.station_ids())
    }

    fn load_event(&mut self, event: &str) -> Result<&mut EventSession, ReviewError> {
        match self.events.entry(event.to_string()) {
            Entry::Occupied(cached) => Ok(cached.into_mut()),
            Entry::Vacant(slot) => {
                let record = self
                    .store
                    .load(&self.parent_dir, event)
                    .map_err(|e| ReviewError::from_load(event, e))?;
                log::info!("Loaded event {event} with {} stations", record.len());
                Ok(slot.insert(EventSession {
                    record,
                    entries: BTreeMap::new(),
                }))
            }
        }
    }

    pub fn entry(&self, event: &str, station: &str) -> Option<&SessionEntry> {
        self.events.get(event)?.entries.get(station)
    }

    pub(crate) fn entry_mut(&mut self, event: &str, station: &str) -> Option<&mut SessionEntry> {
        self.events.get_mut(event)?.entries.get_mut(station)
    }

    /// The event record as last loaded or committed.
    pub fn record(&self, event: &str) -> Option<&EventRecord> {
        self.events.get(event).map(|s| &s.record)
    }

    /// Events loaded in this session.
    pub fn events(&self) -> impl Iterator<Item = &str> {
        self.events.keys().map(String::as_str)
    }

    /// All loaded entries, by event then station.
    pub fn entries(&self) -> impl Iterator<Item = &SessionEntry> {
        self.events.values().flat_map(|s| s.entries.values())
    }

    /// Entries with staged changes not yet committed.
    pub fn pending_changes(&self) -> Vec<&SessionEntry> {
        self.entries().filter(|e| e.is_pending()).collect()
    }

    pub fn has_pending_changes(&self) -> bool {
        self.entries().any(SessionEntry::is_pending)
    }

    /// End the session, dropping all cached state and returning the accessor.
    pub fn teardown(self) -> S {
        let pending = self.pending_changes().len();
        if pending > 0 {
            log::warn!("Session closed with {pending} uncommitted station change(s)");
        }
        self.store
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::model::tests::station;
    use crate::data::store::MemoryStore;

    pub(crate) const EVENT: &str = "2012-10-08T12:12:12.760000Z";

    pub(crate) fn session() -> SessionStore<MemoryStore> {
        let mut ev = EventRecord::new();
        ev.insert("STA1", station(true, Some((1.0, 50.0))));
        ev.insert("STA2", station(false, None));
        ev.insert("STA3", station(true, None));
        let store = MemoryStore::new().with_record(Path::new("Events"), EVENT, ev);
        SessionStore::new("Events", store)
    }

    #[test]
    fn first_access_derives_entry() {
        let mut s = session();
        let entry = s.get_or_load(EVENT, "STA1").unwrap();
        assert!(entry.suitable_for_modeling());
        assert_eq!(entry.current_bandwidth(), entry.derived_bandwidth());
        assert!((entry.derived_min_max().max - 2.0).abs() < 1e-9);
        assert!(!entry.is_pending());

        let entry = s.get_or_load(EVENT, "STA2").unwrap();
        assert!(entry.current_bandwidth().is_none());
    }

    #[test]
    fn cache_hit_keeps_staged_values() {
        let mut s = session();
        s.get_or_load(EVENT, "STA1").unwrap();

        let band = LogBand::from_hz(2.0, 20.0);
        s.stage(EVENT, "STA1", true, Some(band)).unwrap();

        let entry = s.get_or_load(EVENT, "STA1").unwrap();
        assert_eq!(entry.current_bandwidth(), Some(band));
        assert!(entry.is_pending());
    }

    #[test]
    fn missing_event_creates_no_state() {
        let mut s = session();
        let err = s.get_or_load("1999-01-01T00:00:00Z", "STA1").unwrap_err();
        assert!(matches!(err, ReviewError::NotFound { .. }));
        assert_eq!(s.events().count(), 0);
    }

    #[test]
    fn missing_station_is_reported() {
        let mut s = session();
        let err = s.get_or_load(EVENT, "NOPE").unwrap_err();
        assert!(matches!(err, ReviewError::StationNotFound { .. }));
        assert!(s.entry(EVENT, "NOPE").is_none());
        assert_eq!(s.station_ids(EVENT).unwrap(), vec!["STA1", "STA2", "STA3"]);
    }

    #[test]
    fn short_spectrum_creates_no_entry() {
        use crate::data::model::{Spectrum, StationRecord};

        let short = Spectrum::new(vec![1.0], vec![1.0]).unwrap();
        let mut ev = EventRecord::new();
        ev.insert("SHORT", StationRecord::new(short.clone(), short, true, None));
        let store = MemoryStore::new().with_record(Path::new("p"), "ev", ev);
        let mut s = SessionStore::new("p", store);

        let err = s.get_or_load("ev", "SHORT").unwrap_err();
        assert!(matches!(err, ReviewError::InsufficientData { .. }));
        assert!(s.entry("ev", "SHORT").is_none());
    }

    #[test]
    fn tiny_stored_band_still_loads() {
        let mut ev = EventRecord::new();
        ev.insert("LOW", station(true, Some((0.03, 50.0))));
        let store = MemoryStore::new().with_record(Path::new("p"), "ev", ev);
        let mut s = SessionStore::new("p", store);

        let entry = s.get_or_load("ev", "LOW").unwrap();
        assert_eq!(entry.derived_bandwidth(), Some(entry.derived_min_max()));
        assert!(!s.has_pending_changes());
    }

    #[test]
    fn suitable_without_band_is_not_pending() {
        let mut s = session();
        let entry = s.get_or_load(EVENT, "STA3").unwrap();
        assert_eq!(entry.current_bandwidth(), Some(entry.derived_min_max()));
        assert!(!s.has_pending_changes());
    }

    #[test]
    fn teardown_returns_store() {
        let mut s = session();
        s.get_or_load(EVENT, "STA1").unwrap();
        let store = s.teardown();
        assert_eq!(store.save_count(), 0);
    }
}
