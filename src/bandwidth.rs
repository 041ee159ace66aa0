//! Default frequency bounds and slider marks derived from a station's spectra.
//!
//! All bounds are expressed in log10(Hz). Linear values are rounded to
//! 0.1 Hz before the log is taken, so bounds line up with what the analyst
//! sees on the readout.

use crate::data::model::{LogBand, Spectrum, StationRecord};
use crate::error::ReviewError;

/// Default number of slider marks.
pub const DEFAULT_MARK_COUNT: usize = 10;

/// Round to one decimal place, ties to even.
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

/// Frequency range of the signal spectrum.
///
/// The first sample is skipped (it sits at or near DC); the bounds are the
/// second and the last frequency.
pub fn derive_min_max(signal: &Spectrum) -> Result<LogBand, ReviewError> {
    let freq = signal.freq();
    if freq.len() < 2 {
        return Err(ReviewError::insufficient_data(format!(
            "signal spectrum has {} samples, need at least 2",
            freq.len()
        )));
    }
    log_band_rounded(freq[1], freq[freq.len() - 1])
}

/// The working bandwidth of a station.
///
/// `None` exactly when the station is unsuitable. A suitable station uses its
/// stored band, or the signal range when none is stored or the stored band
/// has a bound that rounds to 0 Hz.
pub fn derive_bandwidth(station: &StationRecord) -> Result<Option<LogBand>, ReviewError> {
    if !station.suitable_for_modeling() {
        return Ok(None);
    }
    if let Some(band) = station.usable_bandwidth() {
        match log_band_rounded(band.min_hz(), band.max_hz()) {
            Ok(log_band) => return Ok(Some(log_band)),
            Err(e) => log::warn!("Stored bandwidth not usable, using signal range: {e}"),
        }
    }
    derive_min_max(&station.signal).map(Some)
}

fn log_band_rounded(min_hz: f64, max_hz: f64) -> Result<LogBand, ReviewError> {
    let (lo, hi) = (round_to_tenth(min_hz), round_to_tenth(max_hz));
    if !(lo > 0.0 && hi > 0.0) {
        return Err(ReviewError::insufficient_data(format!(
            "frequency bounds [{min_hz}, {max_hz}] Hz round to [{lo}, {hi}] Hz"
        )));
    }
    Ok(LogBand::from_hz(lo, hi))
}

/// Compare two working bandwidths at the stored precision (0.1 Hz).
pub fn bandwidths_match(a: Option<LogBand>, b: Option<LogBand>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            round_to_tenth(a.min_hz()) == round_to_tenth(b.min_hz())
                && round_to_tenth(a.max_hz()) == round_to_tenth(b.max_hz())
        }
        _ => false,
    }
}

/// One labelled slider position.
#[derive(Debug, Clone, PartialEq)]
pub struct Mark {
    /// Position in log10(Hz).
    pub position: f64,
    pub label: String,
}

/// `count` marks evenly spaced in log space from `min` to `max` inclusive.
pub fn derive_marks(min: f64, max: f64, count: usize) -> Vec<Mark> {
    let step = if count > 1 {
        (max - min) / (count - 1) as f64
    } else {
        0.0
    };
    (0..count)
        .map(|i| {
            let position = if i + 1 == count && count > 1 {
                max
            } else {
                min + step * i as f64
            };
            Mark {
                position,
                label: format!("{:.1}Hz", round_to_tenth(10f64.powf(position))),
            }
        })
        .collect()
}

/// Readout text for a working band.
pub fn describe_band(band: &LogBand) -> String {
    format!("min f: {:.1}, max f: {:.1}", band.min_hz(), band.max_hz())
}
