//! Review core for seismic signal/noise spectra.
//!
//! An analyst loads a station of an event, decides whether it is suitable
//! for modeling, adjusts its usable bandwidth, and commits the decision back
//! to the event's spectral record.
//!
//! ```text
//!   SpectraStore (load/save)  ──►  SessionStore::get_or_load
//!                                        │  bandwidth::derive_*
//!                                        ▼
//!                                  SessionEntry  ◄── SessionStore::stage
//!                                        │
//!                                        ▼
//!                                  SessionStore::commit ──► SpectraStore::save
//! ```

pub mod bandwidth;
pub mod commit;
pub mod config;
pub mod data;
pub mod error;
pub mod reconcile;
pub mod session;
pub mod view;

pub use commit::CommitReport;
pub use data::model::{EventRecord, FreqBand, LogBand, Spectrum, StationRecord};
pub use data::store::{FileStore, MemoryStore, SpectraStore, StoreError};
pub use error::ReviewError;
pub use reconcile::StageOutcome;
pub use session::{SessionEntry, SessionStore};
pub use view::SpectrumView;
