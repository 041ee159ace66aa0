//! Data layer: record types, encodings, the accessor seam, and filtering.
//!
//! Architecture:
//! ```text
//!  {parent}/{event}/Spectra/{event}.json|.csv|.parquet
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  decode/encode file ↔ EventRecord
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  store    │  SpectraStore: load / atomic save per event
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────────┐
//!   │ EventRecord   │  station → signal, noise, flag, bandwidth
//!   └──────────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  filter   │  select stations by suitability
//!   └──────────┘
//! ```

pub mod loader;
pub mod model;
pub mod filter;
pub mod store;
