//! In-memory demux fed with prepared sections.
//!
//! Sections are queued per `(pid, table_id)` and handed out one per read.
//! Whole multiplexes can be registered by frequency and switched in when a
//! frontend tunes, which lets a complete scan run without hardware.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use super::{Demux, SectionFilter};
use crate::error::DemuxError;

#[derive(Debug, Clone)]
enum Event {
    Section(Vec<u8>),
    Overflow,
}

#[derive(Debug, Default)]
struct Shared {
    queues: HashMap<(u16, u8), VecDeque<Event>>,
    multiplexes: HashMap<u32, Vec<(u16, Vec<u8>)>>,
    capacity: Option<usize>,
    active: usize,
    failing_pids: HashSet<u16>,
    failing_stop: bool,
    opened: Vec<(u16, u8)>,
}

/// Clonable handle; clones share the same queues.
#[derive(Debug, Clone, Default)]
pub struct MemoryDemux {
    shared: Rc<RefCell<Shared>>,
}

/// Filter handle returned by [`MemoryDemux::open_filter`].
#[derive(Debug)]
pub struct MemoryFilter {
    key: (u16, u8),
    shared: Rc<RefCell<Shared>>,
    stopped: bool,
}

impl MemoryDemux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow at most `n` filters open at the same time.
    pub fn with_capacity(n: usize) -> Self {
        let demux = Self::default();
        demux.shared.borrow_mut().capacity = Some(n);
        demux
    }

    /// Queue a section on `pid`; its first byte selects the table filter.
    pub fn push_section(&self, pid: u16, section: Vec<u8>) {
        let table_id = section.first().copied().unwrap_or(0);
        self.push_raw(pid, table_id, section);
    }

    /// Queue bytes for the `(pid, table_id)` filter without looking at them.
    pub fn push_raw(&self, pid: u16, table_id: u8, bytes: Vec<u8>) {
        self.shared
            .borrow_mut()
            .queues
            .entry((pid, table_id))
            .or_default()
            .push_back(Event::Section(bytes));
    }

    /// Make the next read of `(pid, table_id)` report an overflow.
    pub fn push_overflow(&self, pid: u16, table_id: u8) {
        self.shared
            .borrow_mut()
            .queues
            .entry((pid, table_id))
            .or_default()
            .push_back(Event::Overflow);
    }

    /// Setting a filter on `pid` fails as if the hardware rejected it.
    pub fn fail_pid(&self, pid: u16) {
        self.shared.borrow_mut().failing_pids.insert(pid);
    }

    /// Stopping a filter releases it but reports an error.
    pub fn fail_stop(&self) {
        self.shared.borrow_mut().failing_stop = true;
    }

    /// Register the sections broadcast on `frequency`.
    pub fn add_multiplex(&self, frequency: u32, sections: Vec<(u16, Vec<u8>)>) {
        self.shared
            .borrow_mut()
            .multiplexes
            .insert(frequency, sections);
    }

    /// Replace all queued data with the multiplex on `frequency`.
    pub fn switch_to(&self, frequency: u32) {
        let sections = {
            let mut shared = self.shared.borrow_mut();
            shared.queues.clear();
            shared
                .multiplexes
                .get(&frequency)
                .cloned()
                .unwrap_or_default()
        };
        for (pid, section) in sections {
            self.push_section(pid, section);
        }
    }

    /// Every `(pid, table_id)` a filter was opened for, in order.
    pub fn opened(&self) -> Vec<(u16, u8)> {
        self.shared.borrow().opened.clone()
    }

    pub fn active(&self) -> usize {
        self.shared.borrow().active
    }
}

impl Demux for MemoryDemux {
    type Filter = MemoryFilter;

    fn open_filter(&mut self, pid: u16, table_id: u8) -> Result<MemoryFilter, DemuxError> {
        let mut shared = self.shared.borrow_mut();
        if shared.capacity.map_or(false, |cap| shared.active >= cap) {
            return Err(DemuxError::Exhausted);
        }
        if shared.failing_pids.contains(&pid) {
            return Err(DemuxError::SetFilter {
                pid,
                source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
            });
        }
        shared.active += 1;
        shared.opened.push((pid, table_id));
        Ok(MemoryFilter {
            key: (pid, table_id),
            shared: Rc::clone(&self.shared),
            stopped: false,
        })
    }

    fn poll(
        &mut self,
        filters: &[&MemoryFilter],
        timeout: Duration,
    ) -> Result<Vec<usize>, DemuxError> {
        let ready: Vec<usize> = {
            let shared = self.shared.borrow();
            filters
                .iter()
                .enumerate()
                .filter(|(_, f)| shared.queues.get(&f.key).map_or(false, |q| !q.is_empty()))
                .map(|(i, _)| i)
                .collect()
        };
        if ready.is_empty() {
            // Keep idle loops from spinning while filter timeouts run down.
            std::thread::sleep(timeout.min(Duration::from_millis(1)));
        }
        Ok(ready)
    }
}

impl SectionFilter for MemoryFilter {
    fn read_section(&mut self, buf: &mut [u8]) -> Result<usize, DemuxError> {
        let event = self
            .shared
            .borrow_mut()
            .queues
            .get_mut(&self.key)
            .and_then(|q| q.pop_front());
        match event {
            Some(Event::Section(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Some(Event::Overflow) => Err(DemuxError::Overflow),
            None => Err(DemuxError::Read(std::io::Error::from(
                std::io::ErrorKind::WouldBlock,
            ))),
        }
    }

    fn stop(&mut self) -> Result<(), DemuxError> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        let mut shared = self.shared.borrow_mut();
        shared.active = shared.active.saturating_sub(1);
        if shared.failing_stop {
            return Err(DemuxError::Read(std::io::Error::from(
                std::io::ErrorKind::BrokenPipe,
            )));
        }
        Ok(())
    }
}

impl Drop for MemoryFilter {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
