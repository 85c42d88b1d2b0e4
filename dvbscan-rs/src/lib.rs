//! dvbscan - DVB network scanner
//!
//! Tunes through the transponders of a DVB-S, DVB-C or DVB-T network,
//! starting from an initial tuning list and following the NIT, and
//! collects the services each transponder carries from its PAT, PMT and
//! SDT. The result is written as a channel list.
//!
//! Hardware access goes through the [`demux::Demux`] and
//! [`tuner::Frontend`] traits; Linux DVB devices implement both, and the
//! in-memory versions let a whole scan run without hardware.

pub mod config;
pub mod context;
pub mod demux;
pub mod error;
pub mod initial;
pub mod interpret;
pub mod model;
pub mod output;
pub mod reassembly;
pub mod scheduler;
pub mod session;
pub mod tuner;

#[cfg(test)]
mod testutil;

// Re-export commonly used types
pub use config::{OutputFormat, ScanConfig};
pub use error::{Result, ScanError};
pub use model::{Network, Service, Transponder};
pub use session::{ScanOutcome, ScanSession};
