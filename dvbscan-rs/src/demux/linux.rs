//! Linux DVB demux (`/dev/dvb/adapterN/demuxM`).
//!
//! Each filter is a separate non-blocking open of the demux device with a
//! section filter set through `DMX_SET_FILTER`. The kernel checks the CRC
//! and hands out one full section per `read(2)`.

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::AsFd;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, trace};
use nix::errno::Errno;
use nix::libc;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use super::{Demux, SectionFilter};
use crate::error::DemuxError;

const DMX_FILTER_SIZE: usize = 16;
const DMX_CHECK_CRC: u32 = 1;
const DMX_IMMEDIATE_START: u32 = 4;

#[repr(C)]
#[derive(Default)]
struct DmxFilter {
    filter: [u8; DMX_FILTER_SIZE],
    mask: [u8; DMX_FILTER_SIZE],
    mode: [u8; DMX_FILTER_SIZE],
}

#[repr(C)]
#[derive(Default)]
struct DmxSctFilterParams {
    pid: u16,
    filter: DmxFilter,
    timeout: u32,
    flags: u32,
}

nix::ioctl_none!(dmx_stop, b'o', 42);
nix::ioctl_write_ptr!(dmx_set_filter, b'o', 43, DmxSctFilterParams);

/// The demux device of one adapter.
#[derive(Debug, Clone)]
pub struct LinuxDemux {
    path: PathBuf,
}

impl LinuxDemux {
    pub fn new(adapter: u32, demux: u32) -> Self {
        Self {
            path: PathBuf::from(format!("/dev/dvb/adapter{}/demux{}", adapter, demux)),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

/// One open section filter.
#[derive(Debug)]
pub struct LinuxFilter {
    file: File,
    pid: u16,
}

impl Demux for LinuxDemux {
    type Filter = LinuxFilter;

    fn open_filter(&mut self, pid: u16, table_id: u8) -> Result<LinuxFilter, DemuxError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.path)
            .map_err(|source| match source.raw_os_error() {
                Some(libc::EMFILE) | Some(libc::ENFILE) | Some(libc::EBUSY) => {
                    DemuxError::Exhausted
                }
                _ => DemuxError::Open {
                    path: self.path.clone(),
                    source,
                },
            })?;

        let mut params = DmxSctFilterParams {
            pid,
            flags: DMX_IMMEDIATE_START | DMX_CHECK_CRC,
            ..Default::default()
        };
        // Table id 0 (PAT) is left unfiltered; the PID alone selects it.
        if table_id > 0 {
            params.filter.filter[0] = table_id;
            params.filter.mask[0] = 0xFF;
        }

        trace!("start filter pid 0x{:04x} table_id 0x{:02x}", pid, table_id);
        // SAFETY: fd is open, params is a valid dmx_sct_filter_params.
        if let Err(errno) = unsafe { dmx_set_filter(file.as_raw_fd(), &params) } {
            // SAFETY: fd is open.
            let _ = unsafe { dmx_stop(file.as_raw_fd()) };
            return Err(DemuxError::SetFilter {
                pid,
                source: io::Error::from(errno),
            });
        }

        Ok(LinuxFilter { file, pid })
    }

    fn poll(
        &mut self,
        filters: &[&LinuxFilter],
        timeout: Duration,
    ) -> Result<Vec<usize>, DemuxError> {
        let mut fds: Vec<PollFd> = filters
            .iter()
            .map(|f| PollFd::new(f.file.as_fd(), PollFlags::POLLIN))
            .collect();
        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);

        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(_) => {}
            // SIGINT lands here; the caller checks its interrupt flag.
            Err(Errno::EINTR) => return Ok(Vec::new()),
            Err(errno) => return Err(DemuxError::Poll(io::Error::from(errno))),
        }

        Ok(fds
            .iter()
            .enumerate()
            .filter(|(_, fd)| fd.revents().map_or(false, |r| !r.is_empty()))
            .map(|(i, _)| i)
            .collect())
    }
}

impl SectionFilter for LinuxFilter {
    fn read_section(&mut self, buf: &mut [u8]) -> Result<usize, DemuxError> {
        match self.file.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.raw_os_error() == Some(libc::EOVERFLOW) => Err(DemuxError::Overflow),
            Err(e) => Err(DemuxError::Read(e)),
        }
    }

    fn stop(&mut self) -> Result<(), DemuxError> {
        debug!("stop filter pid 0x{:04x}", self.pid);
        // SAFETY: fd is open until self is dropped.
        unsafe { dmx_stop(self.file.as_raw_fd()) }
            .map(drop)
            .map_err(|errno| DemuxError::Read(io::Error::from(errno)))
    }
}
