//! Section filter scheduling.
//!
//! The demux hardware has a limited number of section filters. The
//! scheduler keeps at most `max_running` of them open, queues the rest in
//! FIFO order, and promotes waiting filters whenever one is removed.
//!
//! A poll pass reads at most one section from every ready filter, feeds new
//! sections to a [`SectionHandler`], then retires run-once filters that are
//! complete or timed out.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dvbscan_si::PsiSection;
use log::{debug, error, trace, warn};

use crate::demux::{Demux, SectionFilter, SECTION_BUFFER_SIZE};
use crate::error::DemuxError;
use crate::reassembly::Reassembler;

/// Default number of filters kept open at once.
pub const MAX_RUNNING: usize = 32;

/// What a filter should collect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    pub pid: u16,
    pub table_id: u8,
    /// Keep one reassembly state per `table_id_ext`; never completes.
    pub segmented: bool,
    /// Remove the filter once complete or timed out.
    pub run_once: bool,
    pub timeout: Duration,
}

impl FilterSpec {
    /// A run-once filter for a single table.
    pub fn once(pid: u16, table_id: u8, timeout: Duration) -> Self {
        Self {
            pid,
            table_id,
            segmented: false,
            run_once: true,
            timeout,
        }
    }

    pub fn segmented(self) -> Self {
        Self {
            segmented: true,
            ..self
        }
    }

    /// Never removed; the timeout only restarts its collection window.
    pub fn continuous(self) -> Self {
        Self {
            run_once: false,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Running(FilterId),
    /// No hardware filter free; started when one is removed.
    Queued(FilterId),
    /// The hardware refused the filter; it is dropped.
    Rejected,
}

/// Receives every section not seen before.
pub trait SectionHandler {
    /// `requests` collects filters to add after the current pass.
    fn handle(
        &mut self,
        filter: &FilterSpec,
        section: &PsiSection<'_>,
        requests: &mut Vec<FilterSpec>,
    );
}

struct ActiveFilter<F> {
    id: FilterId,
    spec: FilterSpec,
    filter: F,
    reassembler: Reassembler,
    started: Instant,
}

pub struct FilterScheduler<D: Demux> {
    demux: D,
    max_running: usize,
    running: Vec<ActiveFilter<D::Filter>>,
    waiting: VecDeque<(FilterId, FilterSpec)>,
    next_id: u64,
    buf: Vec<u8>,
}

impl<D: Demux> FilterScheduler<D> {
    pub fn new(demux: D, max_running: usize) -> Self {
        Self {
            demux,
            max_running: max_running.max(1),
            running: Vec::new(),
            waiting: VecDeque::new(),
            next_id: 0,
            buf: vec![0; SECTION_BUFFER_SIZE],
        }
    }

    pub fn demux(&self) -> &D {
        &self.demux
    }

    fn alloc_id(&mut self) -> FilterId {
        self.next_id += 1;
        FilterId(self.next_id)
    }

    fn start(&mut self, id: FilterId, spec: FilterSpec) -> Result<(), DemuxError> {
        if self.running.len() >= self.max_running {
            return Err(DemuxError::Exhausted);
        }
        let filter = self.demux.open_filter(spec.pid, spec.table_id)?;
        debug!(
            "start filter pid 0x{:04x} table_id 0x{:02x}",
            spec.pid, spec.table_id
        );
        let reassembler = if spec.segmented {
            Reassembler::segmented(spec.table_id)
        } else {
            Reassembler::new(spec.table_id)
        };
        self.running.push(ActiveFilter {
            id,
            spec,
            filter,
            reassembler,
            started: Instant::now(),
        });
        Ok(())
    }

    /// Start a filter, or queue it when every hardware filter is busy.
    pub fn add(&mut self, spec: FilterSpec) -> Admission {
        let id = self.alloc_id();
        match self.start(id, spec.clone()) {
            Ok(()) => Admission::Running(id),
            Err(DemuxError::Exhausted) => {
                trace!(
                    "queue filter pid 0x{:04x} table_id 0x{:02x}",
                    spec.pid,
                    spec.table_id
                );
                self.waiting.push_back((id, spec));
                Admission::Queued(id)
            }
            Err(e) => {
                error!(
                    "filter pid 0x{:04x} table_id 0x{:02x}: {}",
                    spec.pid, spec.table_id, e
                );
                Admission::Rejected
            }
        }
    }

    /// Start a filter now or fail.
    pub fn install(&mut self, spec: FilterSpec) -> Result<FilterId, DemuxError> {
        let id = self.alloc_id();
        self.start(id, spec)?;
        Ok(id)
    }

    /// Stop a running filter (or forget a waiting one) and promote waiters.
    pub fn remove(&mut self, id: FilterId) -> bool {
        if let Some(pos) = self.running.iter().position(|f| f.id == id) {
            let mut active = self.running.remove(pos);
            if let Err(e) = active.filter.stop() {
                debug!("stop filter pid 0x{:04x}: {}", active.spec.pid, e);
            }
            self.promote_waiting();
            true
        } else if let Some(pos) = self.waiting.iter().position(|(w, _)| *w == id) {
            self.waiting.remove(pos);
            true
        } else {
            false
        }
    }

    fn promote_waiting(&mut self) {
        while self.running.len() < self.max_running {
            let Some((id, spec)) = self.waiting.pop_front() else {
                break;
            };
            match self.start(id, spec.clone()) {
                Ok(()) => {}
                Err(DemuxError::Exhausted) => {
                    self.waiting.push_front((id, spec));
                    break;
                }
                Err(e) => error!(
                    "filter pid 0x{:04x} table_id 0x{:02x}: {}",
                    spec.pid, spec.table_id, e
                ),
            }
        }
    }

    /// Stop everything, running and waiting.
    pub fn clear(&mut self) {
        self.waiting.clear();
        for mut active in self.running.drain(..) {
            if let Err(e) = active.filter.stop() {
                debug!("stop filter pid 0x{:04x}: {}", active.spec.pid, e);
            }
        }
    }

    /// Nothing running and nothing waiting.
    pub fn is_idle(&self) -> bool {
        self.running.is_empty() && self.waiting.is_empty()
    }

    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    /// One poll-read-dispatch-expire pass.
    pub fn poll_once<H: SectionHandler>(
        &mut self,
        timeout: Duration,
        handler: &mut H,
    ) -> Result<(), DemuxError> {
        if self.running.is_empty() {
            self.promote_waiting();
            if self.running.is_empty() {
                for (_, spec) in self.waiting.drain(..) {
                    error!(
                        "no section filter for pid 0x{:04x} table_id 0x{:02x}, dropped",
                        spec.pid, spec.table_id
                    );
                }
                return Ok(());
            }
        }

        let ready = {
            let filters: Vec<&D::Filter> = self.running.iter().map(|f| &f.filter).collect();
            self.demux.poll(&filters, timeout)?
        };

        let mut requests = Vec::new();
        for index in ready {
            let Some(active) = self.running.get_mut(index) else {
                continue;
            };
            let Some(len) = read_one(&mut active.filter, &mut self.buf, active.spec.pid) else {
                continue;
            };
            let Some(section) = active.reassembler.check(&self.buf[..len]) else {
                continue;
            };
            let Some(progress) = active.reassembler.record(&section.header) else {
                continue;
            };
            trace!(
                "pid 0x{:04x} table_id 0x{:02x} ext 0x{:04x} section {}/{} version {}",
                active.spec.pid,
                section.header.table_id,
                section.header.table_id_extension,
                section.header.section_number,
                section.header.last_section_number,
                section.header.version_number
            );
            if progress.completed_now {
                debug!(
                    "table 0x{:02x} on pid 0x{:04x} complete",
                    section.header.table_id, active.spec.pid
                );
            }
            handler.handle(&active.spec, &section, &mut requests);
        }

        for spec in requests {
            self.add(spec);
        }

        let now = Instant::now();
        let mut finished = Vec::new();
        for active in &mut self.running {
            let expired = now.duration_since(active.started) >= active.spec.timeout;
            if active.spec.run_once {
                if active.reassembler.is_finished() {
                    finished.push(active.id);
                } else if expired {
                    warn!(
                        "filter timeout pid 0x{:04x} table_id 0x{:02x}",
                        active.spec.pid, active.spec.table_id
                    );
                    finished.push(active.id);
                }
            } else if expired {
                active.started = now;
            }
        }
        for id in finished {
            self.remove(id);
        }
        Ok(())
    }
}

/// Read one section, retrying once after a buffer overflow.
fn read_one<F: SectionFilter>(filter: &mut F, buf: &mut [u8], pid: u16) -> Option<usize> {
    let result = match filter.read_section(buf) {
        Err(DemuxError::Overflow) => {
            debug!("pid 0x{:04x}: section buffer overflow, retrying", pid);
            filter.read_section(buf)
        }
        other => other,
    };
    match result {
        Ok(n) => Some(n),
        Err(e) => {
            debug!("pid 0x{:04x}: {}", pid, e);
            None
        }
    }
}

impl<D: Demux> Drop for FilterScheduler<D> {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demux::memory::MemoryDemux;
    use crate::testutil::long_section;

    #[derive(Default)]
    struct Recorder {
        seen: Vec<(u16, u8, u16, u8)>,
        on_pat: Option<FilterSpec>,
    }

    impl SectionHandler for Recorder {
        fn handle(
            &mut self,
            filter: &FilterSpec,
            section: &PsiSection<'_>,
            requests: &mut Vec<FilterSpec>,
        ) {
            let h = &section.header;
            self.seen
                .push((filter.pid, h.table_id, h.table_id_extension, h.section_number));
            if h.table_id == 0 {
                if let Some(spec) = self.on_pat.take() {
                    requests.push(spec);
                }
            }
        }
    }

    const LONG: Duration = Duration::from_secs(60);

    fn pass(s: &mut FilterScheduler<MemoryDemux>, r: &mut Recorder) {
        s.poll_once(Duration::ZERO, r).unwrap();
    }

    #[test]
    fn test_queue_is_fifo_and_bounded() {
        let demux = MemoryDemux::new();
        let mut s = FilterScheduler::new(demux.clone(), 2);
        let a = s.add(FilterSpec::once(0x100, 2, LONG));
        let _b = s.add(FilterSpec::once(0x101, 2, LONG));
        let c = s.add(FilterSpec::once(0x102, 2, LONG));
        let d = s.add(FilterSpec::once(0x103, 2, LONG));

        assert!(matches!(c, Admission::Queued(_)));
        assert!(matches!(d, Admission::Queued(_)));
        assert_eq!(s.running_len(), 2);

        let Admission::Running(a) = a else { panic!("{:?}", a) };
        s.remove(a);
        assert_eq!(s.running_len(), 2);
        assert_eq!(s.waiting_len(), 1);
        assert_eq!(demux.opened().last(), Some(&(0x102, 2)));
    }

    #[test]
    fn test_run_once_filter_removed_when_complete() {
        let demux = MemoryDemux::new();
        demux.push_section(0, long_section(0x00, 1, 0, 1, 1, &[]));
        demux.push_section(0, long_section(0x00, 1, 0, 0, 1, &[]));
        demux.push_section(0, long_section(0x00, 1, 0, 0, 1, &[]));
        let mut s = FilterScheduler::new(demux.clone(), 4);
        s.install(FilterSpec::once(0, 0, LONG)).unwrap();

        let mut r = Recorder::default();
        pass(&mut s, &mut r);
        assert!(!s.is_idle());
        pass(&mut s, &mut r);
        assert!(s.is_idle());
        assert_eq!(r.seen, vec![(0, 0, 1, 1), (0, 0, 1, 0)]);
        assert_eq!(demux.active(), 0);
    }

    #[test]
    fn test_timeout_removes_run_once_and_restarts_continuous() {
        let demux = MemoryDemux::new();
        let mut s = FilterScheduler::new(demux, 4);
        s.install(FilterSpec::once(0x11, 0x42, Duration::ZERO)).unwrap();
        s.install(FilterSpec::once(0x12, 0x4E, Duration::ZERO).continuous())
            .unwrap();

        let mut r = Recorder::default();
        pass(&mut s, &mut r);
        pass(&mut s, &mut r);
        assert_eq!(s.running_len(), 1);
        assert!(!s.is_idle());
    }

    #[test]
    fn test_requests_are_added_after_the_pass() {
        let demux = MemoryDemux::new();
        demux.push_section(0, long_section(0x00, 1, 0, 0, 0, &[]));
        demux.push_section(0x100, long_section(0x02, 5, 0, 0, 0, &[0xE1, 0x00, 0xF0, 0x00]));
        let mut s = FilterScheduler::new(demux.clone(), 4);
        s.install(FilterSpec::once(0, 0, LONG)).unwrap();

        let mut r = Recorder {
            on_pat: Some(FilterSpec::once(0x100, 0x02, LONG)),
            ..Default::default()
        };
        pass(&mut s, &mut r);
        assert_eq!(demux.opened(), vec![(0, 0), (0x100, 0x02)]);
        assert_eq!(r.seen.len(), 1);

        pass(&mut s, &mut r);
        assert_eq!(r.seen[1], (0x100, 0x02, 5, 0));
        assert!(s.is_idle());
    }

    #[test]
    fn test_overflow_is_retried_once() {
        let demux = MemoryDemux::new();
        demux.push_overflow(0, 0);
        demux.push_section(0, long_section(0x00, 1, 0, 0, 0, &[]));
        let mut s = FilterScheduler::new(demux, 4);
        s.install(FilterSpec::once(0, 0, LONG)).unwrap();

        let mut r = Recorder::default();
        pass(&mut s, &mut r);
        assert_eq!(r.seen.len(), 1);
        assert!(s.is_idle());
    }

    #[test]
    fn test_rejected_filter_is_dropped() {
        let demux = MemoryDemux::new();
        demux.fail_pid(0x1FFF);
        let mut s = FilterScheduler::new(demux, 4);
        assert_eq!(
            s.add(FilterSpec::once(0x1FFF, 0x02, LONG)),
            Admission::Rejected
        );
        assert!(s.is_idle());
    }

    #[test]
    fn test_hardware_exhaustion_queues() {
        let demux = MemoryDemux::with_capacity(1);
        let mut s = FilterScheduler::new(demux, 8);
        let first = s.add(FilterSpec::once(0, 0, LONG));
        let second = s.add(FilterSpec::once(0x10, 0x40, LONG));
        assert!(matches!(second, Admission::Queued(_)));

        let Admission::Running(first) = first else { panic!() };
        s.remove(first);
        assert_eq!(s.running_len(), 1);
        assert_eq!(s.waiting_len(), 0);
    }

    #[test]
    fn test_clear_stops_everything_despite_errors() {
        let demux = MemoryDemux::new();
        let mut s = FilterScheduler::new(demux.clone(), 2);
        s.add(FilterSpec::once(0, 0, LONG));
        s.add(FilterSpec::once(0x11, 0x42, LONG));
        s.add(FilterSpec::once(0x10, 0x40, LONG));
        assert_eq!(s.waiting_len(), 1);

        demux.fail_stop();
        s.clear();
        assert!(s.is_idle());
        assert_eq!(demux.active(), 0);
    }

    #[test]
    fn test_segmented_filter_runs_until_timeout() {
        let demux = MemoryDemux::new();
        demux.push_section(0x10, long_section(0x41, 1, 0, 0, 0, &[0xF0, 0x00, 0xF0, 0x00]));
        demux.push_section(0x10, long_section(0x41, 2, 0, 0, 0, &[0xF0, 0x00, 0xF0, 0x00]));
        let mut s = FilterScheduler::new(demux, 4);
        s.install(FilterSpec::once(0x10, 0x41, LONG).segmented())
            .unwrap();

        let mut r = Recorder::default();
        pass(&mut s, &mut r);
        pass(&mut s, &mut r);
        assert_eq!(r.seen.len(), 2);
        assert_eq!(s.running_len(), 1);
    }
}
