//! Presentation-ready data for one station: spectra, axis extents, the
//! derived and overridden bandwidth overlays, and slider marks.

use crate::bandwidth::{Mark, bandwidths_match, derive_marks, describe_band};
use crate::data::model::{LogBand, Spectrum, StationRecord};
use crate::data::store::SpectraStore;
use crate::error::ReviewError;
use crate::session::{SessionEntry, SessionStore};

/// Padding factor applied to the data extents on both log axes.
pub const EXTENT_PADDING: f64 = 1.25;

#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumView {
    pub station: String,
    /// `[freq, amp]` pairs.
    pub signal: Vec<[f64; 2]>,
    pub noise: Vec<[f64; 2]>,
    /// Frequency axis range in log10(Hz).
    pub x_range: (f64, f64),
    /// Amplitude axis range in log10.
    pub y_range: (f64, f64),
    /// Slider limits in log10(Hz).
    pub slider: LogBand,
    pub marks: Vec<Mark>,
    pub suitable_for_modeling: bool,
    /// Default bandwidth for the current flag; absent when unsuitable.
    pub auto_bandwidth: Option<LogBand>,
    /// The working bandwidth, only when it differs from `auto_bandwidth`.
    pub new_bandwidth: Option<LogBand>,
    /// Readout of the working bandwidth.
    pub readout: Option<String>,
}

impl SpectrumView {
    pub fn build(entry: &SessionEntry, record: &StationRecord, mark_count: usize) -> Self {
        let slider = entry.derived_min_max();

        let auto_bandwidth = if entry.suitable_for_modeling() {
            Some(entry.derived_bandwidth().unwrap_or(slider))
        } else {
            None
        };
        let current = entry.current_bandwidth();
        let new_bandwidth = current.filter(|_| !bandwidths_match(current, auto_bandwidth));

        Self {
            station: entry.station().to_string(),
            signal: points(&record.signal),
            noise: points(&record.noise),
            x_range: log_extent(record.signal.freq_range(), record.noise.freq_range()),
            y_range: log_extent(record.signal.amp_range(), record.noise.amp_range()),
            slider,
            marks: derive_marks(slider.min, slider.max, mark_count),
            suitable_for_modeling: entry.suitable_for_modeling(),
            auto_bandwidth,
            new_bandwidth,
            readout: current.as_ref().map(describe_band),
        }
    }
}

impl<S: SpectraStore> SessionStore<S> {
    /// Load (if needed) and describe one station for display.
    pub fn view(&mut self, event: &str, station: &str, mark_count: usize) -> Result<SpectrumView, ReviewError> {
        self.get_or_load(event, station)?;

        let entry = self.entry(event, station);
        let record = self.record(event).and_then(|r| r.station(station));
        match (entry, record) {
            (Some(entry), Some(record)) => Ok(SpectrumView::build(entry, record, mark_count)),
            _ => Err(ReviewError::StationNotFound {
                event: event.to_string(),
                station: station.to_string(),
            }),
        }
    }
}

fn points(spectrum: &Spectrum) -> Vec<[f64; 2]> {
    spectrum
        .freq()
        .iter()
        .zip(spectrum.amp())
        .map(|(&f, &a)| [f, a])
        .collect()
}

/// Padded log10 extent covering both ranges. Non-positive lower bounds
/// (a 0 Hz sample) are skipped.
fn log_extent(a: Option<(f64, f64)>, b: Option<(f64, f64)>) -> (f64, f64) {
    let ranges = [a, b];
    let lo = ranges
        .iter()
        .flatten()
        .map(|(lo, _)| *lo)
        .filter(|lo| *lo > 0.0)
        .map(|lo| (lo / EXTENT_PADDING).log10())
        .fold(f64::INFINITY, f64::min);
    let hi = ranges
        .iter()
        .flatten()
        .map(|(_, hi)| (hi * EXTENT_PADDING).log10())
        .fold(f64::NEG_INFINITY, f64::max);
    if lo.is_finite() && hi.is_finite() {
        (lo, hi)
    } else {
        (0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bandwidth::DEFAULT_MARK_COUNT;
    use crate::session::tests::{EVENT, session};

    #[test]
    fn view_of_untouched_station_has_no_override() {
        let mut s = session();
        let view = s.view(EVENT, "STA1", DEFAULT_MARK_COUNT).unwrap();

        assert!(view.auto_bandwidth.is_some());
        assert!(view.new_bandwidth.is_none());
        assert_eq!(view.marks.len(), DEFAULT_MARK_COUNT);
        assert_eq!(view.signal.len(), 5);
        assert_eq!(view.readout.as_deref(), Some("min f: 1.0, max f: 50.0"));

        let (lo, hi) = view.x_range;
        assert!((lo - (0.01f64 / 1.25).log10()).abs() < 1e-12);
        assert!((hi - (100.0f64 * 1.25).log10()).abs() < 1e-12);
    }

    #[test]
    fn view_shows_override_after_stage() {
        let mut s = session();
        s.get_or_load(EVENT, "STA1").unwrap();
        let band = LogBand::from_hz(2.0, 20.0);
        s.stage(EVENT, "STA1", true, Some(band)).unwrap();

        let view = s.view(EVENT, "STA1", 5).unwrap();
        assert_eq!(view.new_bandwidth, Some(band));
        assert_eq!(view.marks.len(), 5);
    }

    #[test]
    fn unsuitable_station_has_no_auto_band() {
        let mut s = session();
        let view = s.view(EVENT, "STA2", DEFAULT_MARK_COUNT).unwrap();
        assert!(!view.suitable_for_modeling);
        assert!(view.auto_bandwidth.is_none());
        assert!(view.new_bandwidth.is_none());
        assert!(view.readout.is_none());
    }
}
