//! Error types for the review core.

use thiserror::Error;

use crate::data::model::ModelError;
use crate::data::store::StoreError;

/// Errors raised by derivation, session loading, staging and committing.
#[derive(Error, Debug)]
pub enum ReviewError {
    /// Spectrum too short (or too close to 0 Hz) to derive frequency bounds.
    #[error("insufficient spectral data: {reason}")]
    InsufficientData {
        /// What was missing
        reason: String,
    },

    /// `stage` called for a key that was never loaded into the session.
    #[error("station {station} of event {event} has not been loaded in this session")]
    UnknownSessionKey { event: String, station: String },

    /// No durable record exists for the event.
    #[error("no spectral record for event {event}")]
    NotFound { event: String },

    /// The event exists but has no such station.
    #[error("event {event} has no station {station}")]
    StationNotFound { event: String, station: String },

    /// Loading an event failed for a reason other than absence.
    #[error(transparent)]
    Store(StoreError),

    /// Committing one event's changes failed.
    #[error("failed to persist event {event}: {source}")]
    Persistence {
        event: String,
        #[source]
        source: StoreError,
    },

    /// A bandwidth could not be applied to a record.
    #[error("invalid bandwidth: {0}")]
    InvalidBand(#[from] ModelError),
}

impl ReviewError {
    pub fn insufficient_data(reason: impl Into<String>) -> Self {
        Self::InsufficientData {
            reason: reason.into(),
        }
    }

    /// Map an accessor load failure, keeping absence distinct.
    pub fn from_load(event: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::NotFound {
                event: event.to_string(),
            },
            other => Self::Store(other),
        }
    }
}
