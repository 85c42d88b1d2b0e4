use std::time::Duration;

use super::{Demux, SectionFilter};
use crate::error::DemuxError;

/// Placeholder demux for platforms without Linux DVB.
#[derive(Debug, Clone)]
pub struct LinuxDemux;

impl LinuxDemux {
    pub fn new(_adapter: u32, _demux: u32) -> Self {
        LinuxDemux
    }

    pub fn path(&self) -> &std::path::Path {
        std::path::Path::new("")
    }
}

pub struct LinuxFilter {
    _private: (),
}

impl Demux for LinuxDemux {
    type Filter = LinuxFilter;

    fn open_filter(&mut self, _pid: u16, _table_id: u8) -> Result<LinuxFilter, DemuxError> {
        Err(DemuxError::Unsupported)
    }

    fn poll(
        &mut self,
        _filters: &[&LinuxFilter],
        _timeout: Duration,
    ) -> Result<Vec<usize>, DemuxError> {
        Err(DemuxError::Unsupported)
    }
}

impl SectionFilter for LinuxFilter {
    fn read_section(&mut self, _buf: &mut [u8]) -> Result<usize, DemuxError> {
        Err(DemuxError::Unsupported)
    }

    fn stop(&mut self) -> Result<(), DemuxError> {
        Ok(())
    }
}
