//! Section reassembly and version tracking.
//!
//! Every filter owns a [`Reassembler`]. It remembers which
//! `section_number`s of the current `(table_id_ext, version)` have been
//! seen, so that repeated sections are not interpreted twice, and reports
//! the moment all sections `0..=last_section_number` are present.
//!
//! A segmented reassembler (NIT other, where `table_id_ext` enumerates
//! networks) keeps one independent state per `table_id_ext` and never
//! finishes; its filter ends by timeout.

use std::collections::HashMap;

use dvbscan_si::{PsiHeader, PsiSection};
use log::debug;

/// Outcome of recording a section that was not seen before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// This section completed the table.
    pub completed_now: bool,
}

/// Received-sections state for one `(table_id_ext, version)` collection.
#[derive(Debug, Clone, Default)]
struct SectionState {
    table_id_ext: Option<u16>,
    version: Option<u8>,
    received: [u64; 4],
    done: bool,
}

impl SectionState {
    fn is_set(&self, bit: u8) -> bool {
        self.received[bit as usize / 64] & (1u64 << (bit % 64)) != 0
    }

    fn set(&mut self, bit: u8) {
        self.received[bit as usize / 64] |= 1u64 << (bit % 64);
    }

    fn reset(&mut self, table_id_ext: u16, version: u8) {
        if let (Some(old_ext), Some(old_version)) = (self.table_id_ext, self.version) {
            debug!(
                "section version_number or table_id_ext changed {} -> {} / {:04x} -> {:04x}",
                old_version, version, old_ext, table_id_ext
            );
        }
        self.table_id_ext = Some(table_id_ext);
        self.version = Some(version);
        self.received = [0; 4];
        self.done = false;
    }

    fn record(&mut self, header: &PsiHeader) -> Option<Progress> {
        let ext = header.table_id_extension;
        let version = header.version_number;
        if self.table_id_ext != Some(ext) || self.version != Some(version) {
            self.reset(ext, version);
        }

        if self.is_set(header.section_number) {
            return None;
        }
        self.set(header.section_number);

        let mut completed_now = false;
        if !self.done && (0..=header.last_section_number).all(|n| self.is_set(n)) {
            self.done = true;
            completed_now = true;
        }
        Some(Progress { completed_now })
    }
}

/// Per-filter reassembly state.
#[derive(Debug, Clone)]
pub struct Reassembler {
    table_id: u8,
    segmented: bool,
    single: SectionState,
    segments: HashMap<u16, SectionState>,
    dropped: u64,
}

impl Reassembler {
    /// Reassembler for a table that completes on its own.
    pub fn new(table_id: u8) -> Self {
        Self {
            table_id,
            segmented: false,
            single: SectionState::default(),
            segments: HashMap::new(),
            dropped: 0,
        }
    }

    /// Reassembler for a table split by `table_id_ext` into independent segments.
    pub fn segmented(table_id: u8) -> Self {
        Self {
            segmented: true,
            ..Self::new(table_id)
        }
    }

    pub fn table_id(&self) -> u8 {
        self.table_id
    }

    /// Validate one read. Malformed buffers and foreign table ids are
    /// counted and dropped.
    pub fn check<'a>(&mut self, buf: &'a [u8]) -> Option<PsiSection<'a>> {
        match PsiSection::parse_expecting(buf, self.table_id) {
            Ok(section) => Some(section),
            Err(e) => {
                self.dropped += 1;
                debug!("dropping section (table_id 0x{:02x}): {}", self.table_id, e);
                None
            }
        }
    }

    /// Record a valid section header.
    ///
    /// Returns `None` for a section already seen in the current collection.
    pub fn record(&mut self, header: &PsiHeader) -> Option<Progress> {
        if self.segmented {
            self.segments
                .entry(header.table_id_extension)
                .or_default()
                .record(header)
        } else {
            self.single.record(header)
        }
    }

    /// Whether the filter can be stopped. Segmented reassemblers never finish.
    pub fn is_finished(&self) -> bool {
        !self.segmented && self.single.done
    }

    /// Number of segments tracked so far.
    pub fn segment_count(&self) -> usize {
        if self.segmented {
            self.segments.len()
        } else {
            usize::from(self.single.table_id_ext.is_some())
        }
    }

    /// Whether the segment for `table_id_ext` has all its sections.
    pub fn segment_done(&self, table_id_ext: u16) -> bool {
        if self.segmented {
            self.segments.get(&table_id_ext).map_or(false, |s| s.done)
        } else {
            self.single.table_id_ext == Some(table_id_ext) && self.single.done
        }
    }

    /// Buffers rejected by [`Reassembler::check`].
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(ext: u16, version: u8, number: u8, last: u8) -> PsiHeader {
        PsiHeader {
            table_id: 0x42,
            section_syntax_indicator: true,
            section_length: 0,
            table_id_extension: ext,
            version_number: version,
            current_next_indicator: true,
            section_number: number,
            last_section_number: last,
        }
    }

    fn completions(r: &mut Reassembler, order: &[u8], last: u8) -> Vec<bool> {
        order
            .iter()
            .map(|&n| r.record(&header(1, 0, n, last)).map_or(false, |p| p.completed_now))
            .collect()
    }

    #[test]
    fn test_completion_is_order_independent() {
        let orders: [&[u8]; 6] = [
            &[0, 1, 2],
            &[0, 2, 1],
            &[1, 0, 2],
            &[1, 2, 0],
            &[2, 0, 1],
            &[2, 1, 0],
        ];
        for order in orders {
            let mut r = Reassembler::new(0x42);
            let done = completions(&mut r, order, 2);
            assert_eq!(done, vec![false, false, true], "order {:?}", order);
            assert!(r.is_finished());
        }
    }

    #[test]
    fn test_completes_exactly_once() {
        let mut r = Reassembler::new(0x42);
        let done = completions(&mut r, &[1, 0, 0, 1, 1], 1);
        assert_eq!(done, vec![false, true, false, false, false]);
    }

    #[test]
    fn test_duplicate_is_not_reported() {
        let mut r = Reassembler::new(0x00);
        assert!(r.record(&header(1, 3, 0, 1)).is_some());
        assert!(r.record(&header(1, 3, 0, 1)).is_none());
        assert!(!r.is_finished());
    }

    #[test]
    fn test_version_change_resets() {
        let mut r = Reassembler::new(0x42);
        assert_eq!(
            r.record(&header(1, 0, 0, 1)),
            Some(Progress { completed_now: false })
        );
        // New version: section 0 counts again and 1 is still missing.
        assert_eq!(
            r.record(&header(1, 1, 0, 1)),
            Some(Progress { completed_now: false })
        );
        assert_eq!(
            r.record(&header(1, 1, 1, 1)),
            Some(Progress { completed_now: true })
        );
    }

    #[test]
    fn test_table_id_ext_change_resets() {
        let mut r = Reassembler::new(0x42);
        r.record(&header(1, 0, 0, 0));
        assert!(r.is_finished());
        assert_eq!(
            r.record(&header(2, 0, 0, 1)),
            Some(Progress { completed_now: false })
        );
        assert!(!r.is_finished());
    }

    #[test]
    fn test_segmented_states_are_independent() {
        let mut r = Reassembler::segmented(0x41);
        for ext in 1..=3u16 {
            assert!(r.record(&header(ext, 0, 0, 1)).is_some());
        }
        assert_eq!(r.segment_count(), 3);

        assert_eq!(
            r.record(&header(2, 0, 1, 1)),
            Some(Progress { completed_now: true })
        );
        assert!(r.segment_done(2));
        assert!(!r.segment_done(1));
        assert!(!r.segment_done(3));
        assert!(r.record(&header(1, 0, 0, 1)).is_none());
        assert!(!r.is_finished());
    }

    #[test]
    fn test_check_drops_malformed() {
        let mut r = Reassembler::new(0x00);
        assert!(r.check(&[0x00, 0xB0]).is_none());
        // Right size, wrong table.
        let raw = [0x42, 0xB0, 0x09, 0x00, 0x01, 0xC1, 0x00, 0x00, 0, 0, 0, 0];
        assert!(r.check(&raw).is_none());
        assert_eq!(r.dropped(), 2);

        let mut raw = raw;
        raw[0] = 0x00;
        assert!(r.check(&raw).is_some());
        assert_eq!(r.dropped(), 2);
    }
}
