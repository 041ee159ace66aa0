use crate::bandwidth::bandwidths_match;
use crate::data::model::LogBand;
use crate::data::store::SpectraStore;
use crate::error::ReviewError;
use crate::session::{SessionEntry, SessionStore};

// ---------------------------------------------------------------------------
// Staging user edits into the session
// ---------------------------------------------------------------------------

/// Result of a `stage` call. `changed == false` means there was nothing to
/// do; the description is then empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOutcome {
    pub changed: bool,
    pub description: String,
}

impl<S: SpectraStore> SessionStore<S> {
    /// Stage the analyst's flag and bandwidth for a loaded station.
    ///
    /// Only the in-memory entry changes; storage is written by `commit`.
    /// A band that could never be written (inverted, or outside the signal
    /// range) is rejected with `InvalidBand` and nothing is staged.
    pub fn stage(
        &mut self,
        event: &str,
        station: &str,
        new_flag: bool,
        new_bandwidth: Option<LogBand>,
    ) -> Result<StageOutcome, ReviewError> {
        let unknown = || ReviewError::UnknownSessionKey {
            event: event.to_string(),
            station: station.to_string(),
        };
        if self.entry(event, station).is_none() {
            return Err(unknown());
        }
        if let Some(band) = new_bandwidth {
            let record = self
                .record(event)
                .and_then(|r| r.station(station))
                .ok_or_else(unknown)?;
            record.check_band(band.to_freq_band()?)?;
        }

        let entry = self
            .entry_mut(event, station)
            .ok_or_else(unknown)?;

        let outcome = entry.reconcile(new_flag, new_bandwidth);
        if outcome.changed {
            log::info!("{event}: {}", outcome.description);
        }
        Ok(outcome)
    }
}

impl SessionEntry {
    fn reconcile(&mut self, new_flag: bool, new_bandwidth: Option<LogBand>) -> StageOutcome {
        let flag_changed = new_flag != self.suitable_for_modeling;
        let bandwidth_changed = !bandwidths_match(new_bandwidth, self.current_bandwidth);

        if !flag_changed && !bandwidth_changed {
            return StageOutcome::default();
        }

        let mut clauses = Vec::with_capacity(2);
        if flag_changed {
            // The working bandwidth is left as is on a flip to unsuitable.
            self.suitable_for_modeling = new_flag;
            let verdict = if new_flag { "suitable" } else { "unsuitable" };
            clauses.push(format!("Marked {} as {verdict} for modeling", self.station()));
        }
        if bandwidth_changed {
            self.current_bandwidth = new_bandwidth;
            clauses.push(format!("changed bandwidth limits of {}", self.station()));
        }

        StageOutcome {
            changed: true,
            description: sentence(&clauses.join(" and ")),
        }
    }
}

/// Capitalise the first letter and close with a full stop.
fn sentence(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => format!("{}{}.", first.to_uppercase(), chars.as_str()),
        None => String::new(),
    }
}
