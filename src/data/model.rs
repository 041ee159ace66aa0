use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Slack allowed when checking a usable bandwidth against the signal range.
/// Bounds are stored at 0.1 Hz precision, so a rounded bound may overshoot the
/// raw spectrum edge by up to half a step.
pub const BAND_RANGE_TOLERANCE_HZ: f64 = 0.05;

// ---------------------------------------------------------------------------
// ModelError – validation failures for spectra and bands
// ---------------------------------------------------------------------------

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("frequency has {freq} samples but amplitude has {amp}")]
    LengthMismatch { freq: usize, amp: usize },

    #[error("frequency not strictly increasing at sample {index}")]
    NonIncreasingFrequency { index: usize },

    #[error("amplitude at sample {index} is {value}, expected a finite positive value")]
    NonPositiveAmplitude { index: usize, value: f64 },

    #[error("invalid band [{min_hz}, {max_hz}] Hz: need 0 < min < max")]
    InvalidBand { min_hz: f64, max_hz: f64 },

    #[error("band [{min_hz:.3}, {max_hz:.3}] Hz outside signal range [{lo:.3}, {hi:.3}] Hz")]
    BandOutOfRange {
        min_hz: f64,
        max_hz: f64,
        lo: f64,
        hi: f64,
    },
}

// ---------------------------------------------------------------------------
// Spectrum – one amplitude spectrum
// ---------------------------------------------------------------------------

/// An amplitude spectrum sampled at strictly increasing frequencies.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    freq: Vec<f64>,
    amp: Vec<f64>,
}

impl Spectrum {
    pub fn new(freq: Vec<f64>, amp: Vec<f64>) -> Result<Self, ModelError> {
        if freq.len() != amp.len() {
            return Err(ModelError::LengthMismatch {
                freq: freq.len(),
                amp: amp.len(),
            });
        }
        if let Some(i) = freq.windows(2).position(|w| !(w[1] > w[0])) {
            return Err(ModelError::NonIncreasingFrequency { index: i + 1 });
        }
        if let Some((index, &value)) = amp
            .iter()
            .enumerate()
            .find(|(_, a)| !(a.is_finite() && **a > 0.0))
        {
            return Err(ModelError::NonPositiveAmplitude { index, value });
        }
        Ok(Self { freq, amp })
    }

    /// Frequency axis in Hz.
    pub fn freq(&self) -> &[f64] {
        &self.freq
    }

    /// Amplitude axis, same length as `freq`.
    pub fn amp(&self) -> &[f64] {
        &self.amp
    }

    pub fn len(&self) -> usize {
        self.freq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.freq.is_empty()
    }

    /// `(first, last)` frequency, if any samples exist.
    pub fn freq_range(&self) -> Option<(f64, f64)> {
        Some((*self.freq.first()?, *self.freq.last()?))
    }

    /// `(min, max)` amplitude, if any samples exist.
    pub fn amp_range(&self) -> Option<(f64, f64)> {
        if self.amp.is_empty() {
            return None;
        }
        let min = self.amp.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = self.amp.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        Some((min, max))
    }
}

// ---------------------------------------------------------------------------
// Bands – linear (storage) and log10 (session / slider)
// ---------------------------------------------------------------------------

/// A usable bandwidth in linear Hz, as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreqBand {
    min_hz: f64,
    max_hz: f64,
}

impl FreqBand {
    pub fn new(min_hz: f64, max_hz: f64) -> Result<Self, ModelError> {
        if !(min_hz.is_finite() && max_hz.is_finite() && min_hz > 0.0 && min_hz < max_hz) {
            return Err(ModelError::InvalidBand { min_hz, max_hz });
        }
        Ok(Self { min_hz, max_hz })
    }

    /// Interpret a stored `[min, max]` sequence. Anything shorter than two
    /// elements, or an invalid pair, counts as "no band stored".
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match values {
            [min, max, ..] => Self::new(*min, *max).ok(),
            _ => None,
        }
    }

    pub fn min_hz(&self) -> f64 {
        self.min_hz
    }

    pub fn max_hz(&self) -> f64 {
        self.max_hz
    }

    pub fn to_vec(&self) -> Vec<f64> {
        vec![self.min_hz, self.max_hz]
    }
}

/// A frequency pair in base-10 log space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogBand {
    pub min: f64,
    pub max: f64,
}

impl LogBand {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Log10 of a pair given in Hz.
    pub fn from_hz(min_hz: f64, max_hz: f64) -> Self {
        Self {
            min: min_hz.log10(),
            max: max_hz.log10(),
        }
    }

    pub fn min_hz(&self) -> f64 {
        10f64.powf(self.min)
    }

    pub fn max_hz(&self) -> f64 {
        10f64.powf(self.max)
    }

    /// Convert back to a linear, validated band.
    pub fn to_freq_band(&self) -> Result<FreqBand, ModelError> {
        FreqBand::new(self.min_hz(), self.max_hz())
    }
}

impl fmt::Display for LogBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}–{:.1} Hz", self.min_hz(), self.max_hz())
    }
}

// ---------------------------------------------------------------------------
// StationRecord – one station's review unit
// ---------------------------------------------------------------------------

/// Signal and noise spectra of one station plus the analyst's decision.
#[derive(Debug, Clone, PartialEq)]
pub struct StationRecord {
    pub signal: Spectrum,
    pub noise: Spectrum,
    suitable_for_modeling: bool,
    usable_bandwidth: Option<FreqBand>,
    /// Bandwidth exactly as stored, written back unchanged until the
    /// station is re-marked.
    stored_bandwidth: Vec<f64>,
}

impl StationRecord {
    /// Build a record as found in storage.
    ///
    /// A band given for an unsuitable station is dropped. A suitable station
    /// may legitimately come without a band; derivation then falls back to
    /// the signal range.
    pub fn new(
        signal: Spectrum,
        noise: Spectrum,
        suitable_for_modeling: bool,
        usable_bandwidth: Option<FreqBand>,
    ) -> Self {
        let usable_bandwidth = usable_bandwidth.filter(|_| suitable_for_modeling);
        Self {
            signal,
            noise,
            suitable_for_modeling,
            usable_bandwidth,
            stored_bandwidth: usable_bandwidth.map(|b| b.to_vec()).unwrap_or_default(),
        }
    }

    /// Keep the raw stored `[min, max]` values, even when they were not
    /// usable as a band.
    pub fn with_stored_bandwidth(mut self, raw: Vec<f64>) -> Self {
        self.stored_bandwidth = raw;
        self
    }

    pub fn suitable_for_modeling(&self) -> bool {
        self.suitable_for_modeling
    }

    pub fn usable_bandwidth(&self) -> Option<FreqBand> {
        self.usable_bandwidth
    }

    /// Raw bandwidth values to write back to storage.
    pub fn stored_bandwidth(&self) -> &[f64] {
        &self.stored_bandwidth
    }

    /// Check that `band` lies inside the signal spectrum's frequency range.
    pub fn check_band(&self, band: FreqBand) -> Result<(), ModelError> {
        if let Some((lo, hi)) = self.signal.freq_range() {
            if band.min_hz() < lo - BAND_RANGE_TOLERANCE_HZ
                || band.max_hz() > hi + BAND_RANGE_TOLERANCE_HZ
            {
                return Err(ModelError::BandOutOfRange {
                    min_hz: band.min_hz(),
                    max_hz: band.max_hz(),
                    lo,
                    hi,
                });
            }
        }
        Ok(())
    }

    /// Mark the station suitable with the given band, which must fall inside
    /// the signal spectrum's frequency range.
    pub fn mark_suitable(&mut self, band: FreqBand) -> Result<(), ModelError> {
        self.check_band(band)?;
        self.suitable_for_modeling = true;
        self.usable_bandwidth = Some(band);
        self.stored_bandwidth = band.to_vec();
        Ok(())
    }

    pub fn mark_unsuitable(&mut self) {
        self.suitable_for_modeling = false;
        self.usable_bandwidth = None;
        self.stored_bandwidth.clear();
    }
}

// ---------------------------------------------------------------------------
// EventRecord – all stations of one event
// ---------------------------------------------------------------------------

/// The durable per-event record: station id → station record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventRecord {
    stations: BTreeMap<String, StationRecord>,
}

impl EventRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a station, returning the previous record.
    pub fn insert(&mut self, station: impl Into<String>, record: StationRecord) -> Option<StationRecord> {
        self.stations.insert(station.into(), record)
    }

    pub fn station(&self, station: &str) -> Option<&StationRecord> {
        self.stations.get(station)
    }

    pub fn station_mut(&mut self, station: &str) -> Option<&mut StationRecord> {
        self.stations.get_mut(station)
    }

    /// Sorted station identifiers.
    pub fn station_ids(&self) -> Vec<String> {
        self.stations.keys().cloned().collect()
    }

    pub fn stations(&self) -> impl Iterator<Item = (&str, &StationRecord)> {
        self.stations.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn spectrum(freq: &[f64]) -> Spectrum {
        let amp = freq.iter().map(|f| 1.0 / (1.0 + f)).collect();
        Spectrum::new(freq.to_vec(), amp).unwrap()
    }

    pub(crate) fn station(suitable: bool, band: Option<(f64, f64)>) -> StationRecord {
        let freq = [0.01, 0.1, 1.0, 10.0, 100.0];
        StationRecord::new(
            spectrum(&freq),
            spectrum(&freq),
            suitable,
            band.map(|(lo, hi)| FreqBand::new(lo, hi).unwrap()),
        )
    }

    #[test]
    fn spectrum_rejects_bad_axes() {
        assert_eq!(
            Spectrum::new(vec![1.0, 2.0], vec![1.0]),
            Err(ModelError::LengthMismatch { freq: 2, amp: 1 })
        );
        assert_eq!(
            Spectrum::new(vec![1.0, 1.0], vec![1.0, 1.0]),
            Err(ModelError::NonIncreasingFrequency { index: 1 })
        );
        assert!(matches!(
            Spectrum::new(vec![1.0, 2.0], vec![1.0, 0.0]),
            Err(ModelError::NonPositiveAmplitude { index: 1, .. })
        ));
    }

    #[test]
    fn freq_band_from_short_slice_is_absent() {
        assert!(FreqBand::from_slice(&[]).is_none());
        assert!(FreqBand::from_slice(&[1.0]).is_none());
        assert!(FreqBand::from_slice(&[5.0, 1.0]).is_none());
        assert_eq!(FreqBand::from_slice(&[1.0, 50.0]).unwrap().max_hz(), 50.0);
    }

    #[test]
    fn unsuitable_record_never_carries_band() {
        let rec = station(false, Some((1.0, 10.0)));
        assert!(rec.usable_bandwidth().is_none());

        let mut rec = station(true, Some((1.0, 10.0)));
        rec.mark_unsuitable();
        assert!(!rec.suitable_for_modeling());
        assert!(rec.usable_bandwidth().is_none());
    }

    #[test]
    fn mark_suitable_checks_signal_range() {
        let mut rec = station(false, None);
        let outside = FreqBand::new(1.0, 500.0).unwrap();
        assert!(matches!(
            rec.mark_suitable(outside),
            Err(ModelError::BandOutOfRange { .. })
        ));
        assert!(!rec.suitable_for_modeling());

        // rounding slack at the upper edge
        rec.mark_suitable(FreqBand::new(0.1, 100.04).unwrap()).unwrap();
        assert!(rec.suitable_for_modeling());
        assert_eq!(rec.stored_bandwidth(), &[0.1, 100.04]);
    }

    #[test]
    fn raw_band_survives_until_remarked() {
        let mut rec = station(false, None).with_stored_bandwidth(vec![2.0, 20.0]);
        assert!(rec.usable_bandwidth().is_none());
        assert_eq!(rec.stored_bandwidth(), &[2.0, 20.0]);

        rec.mark_unsuitable();
        assert!(rec.stored_bandwidth().is_empty());
    }

    #[test]
    fn event_station_ids_are_sorted() {
        let mut ev = EventRecord::new();
        ev.insert("STB", station(true, None));
        ev.insert("STA", station(false, None));
        assert_eq!(ev.station_ids(), vec!["STA".to_string(), "STB".to_string()]);
    }
}
