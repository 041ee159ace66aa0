use super::model::{EventRecord, StationRecord};

// ---------------------------------------------------------------------------
// Station filter: which stations of an event to list
// ---------------------------------------------------------------------------

/// Selects stations by their suitability flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum StationFilter {
    /// Every station of the event.
    #[default]
    All,
    Suitable,
    Unsuitable,
}

impl StationFilter {
    pub fn accepts(&self, station: &StationRecord) -> bool {
        match self {
            StationFilter::All => true,
            StationFilter::Suitable => station.suitable_for_modeling(),
            StationFilter::Unsuitable => !station.suitable_for_modeling(),
        }
    }
}

/// Return the ids of stations passing `filter`, in station order.
pub fn filtered_station_ids(record: &EventRecord, filter: StationFilter) -> Vec<String> {
    record
        .stations()
        .filter(|(_, st)| filter.accepts(st))
        .map(|(id, _)| id.to_string())
        .collect()
}
