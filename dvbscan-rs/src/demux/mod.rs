//! Hardware section filters.
//!
//! A [`Demux`] opens one [`SectionFilter`] per (PID, table_id) pair and
//! multiplexes readiness across all open filters. Each successful read
//! yields exactly one complete section.

use std::time::Duration;

use crate::error::DemuxError;

#[cfg(target_os = "linux")]
pub use self::linux::{LinuxDemux, LinuxFilter};
#[cfg(not(target_os = "linux"))]
pub use self::unsupported::{LinuxDemux, LinuxFilter};

#[cfg(target_os = "linux")]
mod linux;
#[cfg(not(target_os = "linux"))]
mod unsupported;

pub mod memory;

/// Largest buffer a section read can need.
pub const SECTION_BUFFER_SIZE: usize = dvbscan_si::MAX_SECTION_SIZE;

/// One running section filter.
pub trait SectionFilter {
    /// Read one complete section into `buf` and return its length.
    ///
    /// Fails with [`DemuxError::Overflow`] when the kernel dropped data.
    fn read_section(&mut self, buf: &mut [u8]) -> Result<usize, DemuxError>;

    /// Stop the filter in hardware.
    fn stop(&mut self) -> Result<(), DemuxError>;
}

/// A device able to run several section filters at once.
pub trait Demux {
    type Filter: SectionFilter;

    /// Start a filter for `table_id` sections on `pid`.
    ///
    /// Fails with [`DemuxError::Exhausted`] when no hardware filter is free.
    fn open_filter(&mut self, pid: u16, table_id: u8) -> Result<Self::Filter, DemuxError>;

    /// Wait until at least one filter has data or `timeout` elapses.
    ///
    /// Returns the indices (into `filters`) of the ready filters.
    fn poll(
        &mut self,
        filters: &[&Self::Filter],
        timeout: Duration,
    ) -> Result<Vec<usize>, DemuxError>;
}
