//! Network data model: transponders, their services, and the scanned and
//! pending registries.
//!
//! Transponders live in an arena owned by [`Network`] and are referred to
//! by [`TransponderId`]. Identity is frequency proximity: two frequencies
//! closer than the configured tolerance name the same multiplex. Network
//! and transport stream ids are not used because broadcasters reuse them.

use std::collections::VecDeque;

use dvbscan_si::{DeliveryKind, DeliveryParameters, RunningStatus, SpectralInversion};
use log::{debug, warn};

/// Maximum number of audio PIDs kept per service.
pub const AUDIO_CHAN_MAX: usize = 32;

/// Maximum number of CA system ids kept per service.
pub const CA_SYSTEM_ID_MAX: usize = 16;

/// Frequencies closer than this are the same transponder.
pub const DEFAULT_FREQUENCY_TOLERANCE: u32 = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioStream {
    pub pid: u16,
    /// ISO 639 language code.
    pub language: Option<String>,
}

/// One service of a transponder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Service {
    pub service_id: u16,
    pub transport_stream_id: u16,
    pub pmt_pid: u16,
    pub pcr_pid: u16,
    pub video_pid: u16,
    pub teletext_pid: u16,
    pub subtitling_pid: u16,
    pub ac3_pid: u16,
    pub audio: Vec<AudioStream>,
    pub ca_ids: Vec<u16>,
    pub provider_name: Option<String>,
    pub service_name: Option<String>,
    pub running: RunningStatus,
    pub scrambled: bool,
    pub service_type: u8,
    /// Logical channel number (UK DTT).
    pub channel_num: Option<u16>,
    /// A PMT filter has been requested for this service.
    pub pmt_requested: bool,
}

impl Service {
    pub fn new(service_id: u16) -> Self {
        Self {
            service_id,
            ..Default::default()
        }
    }

    /// Append an audio stream. Returns false when the list is full.
    pub fn push_audio(&mut self, pid: u16, language: Option<String>) -> bool {
        if self.audio.len() >= AUDIO_CHAN_MAX {
            warn!(
                "service 0x{:04x}: more than {} audio channels, truncating",
                self.service_id, AUDIO_CHAN_MAX
            );
            return false;
        }
        self.audio.push(AudioStream { pid, language });
        true
    }

    /// Replace the CA system ids, keeping at most [`CA_SYSTEM_ID_MAX`].
    pub fn set_ca_ids(&mut self, ids: &[u16]) {
        if ids.len() > CA_SYSTEM_ID_MAX {
            warn!(
                "service 0x{:04x}: too many CA system ids ({}), keeping {}",
                self.service_id,
                ids.len(),
                CA_SYSTEM_ID_MAX
            );
        }
        self.ca_ids = ids.iter().copied().take(CA_SYSTEM_ID_MAX).collect();
        for id in &self.ca_ids {
            debug!("  CA ID 0x{:04x}", id);
        }
    }

    pub fn is_tv(&self) -> bool {
        self.video_pid != 0
    }

    pub fn is_radio(&self) -> bool {
        self.video_pid == 0 && !self.audio.is_empty()
    }
}

/// One physical multiplex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transponder {
    /// kHz for satellite, Hz for cable and terrestrial.
    pub frequency: u32,
    pub inversion: SpectralInversion,
    pub delivery: Option<DeliveryParameters>,
    pub network_id: u16,
    pub transport_stream_id: u16,
    pub services: Vec<Service>,
    pub scan_done: bool,
    pub last_tuning_failed: bool,
    /// Alternate frequencies, tried from the back.
    pub other_frequencies: Vec<u32>,
}

impl Transponder {
    pub fn new(frequency: u32, inversion: SpectralInversion) -> Self {
        Self {
            frequency,
            inversion,
            delivery: None,
            network_id: 0,
            transport_stream_id: 0,
            services: Vec::new(),
            scan_done: false,
            last_tuning_failed: false,
            other_frequencies: Vec::new(),
        }
    }

    pub fn kind(&self) -> Option<DeliveryKind> {
        self.delivery.map(|d| d.kind())
    }

    /// Whether the terrestrial descriptor flagged alternate frequencies.
    pub fn other_frequency_flag(&self) -> bool {
        matches!(
            self.delivery,
            Some(DeliveryParameters::Terrestrial(p)) if p.other_frequency_flag
        )
    }

    pub fn find_service(&self, service_id: u16) -> Option<&Service> {
        self.services.iter().find(|s| s.service_id == service_id)
    }

    pub fn find_service_mut(&mut self, service_id: u16) -> Option<&mut Service> {
        self.services.iter_mut().find(|s| s.service_id == service_id)
    }

    /// Find a service or append a new one; whichever of PAT and SDT
    /// arrives first creates it.
    pub fn service_entry(&mut self, service_id: u16) -> &mut Service {
        match self.services.iter().position(|s| s.service_id == service_id) {
            Some(index) => &mut self.services[index],
            None => {
                self.services.push(Service::new(service_id));
                let last = self.services.len() - 1;
                &mut self.services[last]
            }
        }
    }

    /// Overwrite the description fields from a NIT entry. Services and
    /// scan state are left alone.
    pub fn copy_description(&mut self, from: &Transponder) {
        self.frequency = from.frequency;
        self.delivery = from.delivery;
        self.network_id = from.network_id;
        self.transport_stream_id = from.transport_stream_id;
        self.other_frequencies = from.other_frequencies.clone();
    }
}

/// Index of a transponder in the [`Network`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransponderId(usize);

/// All transponders known to one scan.
#[derive(Debug, Clone)]
pub struct Network {
    transponders: Vec<Transponder>,
    scanned: Vec<TransponderId>,
    pending: VecDeque<TransponderId>,
    current: Option<TransponderId>,
    tolerance: u32,
    inversion: SpectralInversion,
    pinned: bool,
}

impl Network {
    pub fn new(tolerance: u32, inversion: SpectralInversion) -> Self {
        Self {
            transponders: Vec::new(),
            scanned: Vec::new(),
            pending: VecDeque::new(),
            current: None,
            tolerance,
            inversion,
            pinned: false,
        }
    }

    pub fn tolerance(&self) -> u32 {
        self.tolerance
    }

    /// Scan only what the frontend is tuned to: a dummy transponder becomes
    /// current and every frequency lookup resolves to it.
    pub fn pin_current(&mut self) -> TransponderId {
        let id = self.insert(Transponder::new(0, self.inversion));
        self.scanned.push(id);
        self.transponders[id.0].scan_done = true;
        self.current = Some(id);
        self.pinned = true;
        id
    }

    fn insert(&mut self, tp: Transponder) -> TransponderId {
        self.transponders.push(tp);
        TransponderId(self.transponders.len() - 1)
    }

    fn same_frequency(&self, a: u32, b: u32) -> bool {
        a.abs_diff(b) < self.tolerance
    }

    /// Look a frequency up among scanned, then pending transponders.
    pub fn find_transponder(&self, frequency: u32) -> Option<TransponderId> {
        if self.pinned {
            return self.scanned.first().copied();
        }
        self.scanned
            .iter()
            .chain(self.pending.iter())
            .copied()
            .find(|id| self.same_frequency(self.transponders[id.0].frequency, frequency))
    }

    /// Register a new pending transponder.
    pub fn alloc_transponder(&mut self, frequency: u32) -> TransponderId {
        let id = self.insert(Transponder::new(frequency, self.inversion));
        self.pending.push_back(id);
        id
    }

    pub fn find_or_alloc(&mut self, frequency: u32) -> TransponderId {
        match self.find_transponder(frequency) {
            Some(id) => id,
            None => {
                debug!("new transponder at {}", frequency);
                self.alloc_transponder(frequency)
            }
        }
    }

    pub fn get(&self, id: TransponderId) -> &Transponder {
        &self.transponders[id.0]
    }

    pub fn get_mut(&mut self, id: TransponderId) -> &mut Transponder {
        &mut self.transponders[id.0]
    }

    pub fn current(&self) -> Option<TransponderId> {
        self.current
    }

    pub fn set_current(&mut self, id: TransponderId) {
        self.current = Some(id);
    }

    pub fn current_mut(&mut self) -> Option<&mut Transponder> {
        self.current.map(|id| &mut self.transponders[id.0])
    }

    /// First pending transponder, if any.
    pub fn next_pending(&self) -> Option<TransponderId> {
        self.pending.front().copied()
    }

    /// Move a pending transponder to the scanned list and mark it done.
    pub fn mark_scanned(&mut self, id: TransponderId) {
        if let Some(pos) = self.pending.iter().position(|p| *p == id) {
            self.pending.remove(pos);
            self.scanned.push(id);
        }
        self.transponders[id.0].scan_done = true;
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Scanned transponders in scan order.
    pub fn scanned(&self) -> impl Iterator<Item = &Transponder> + '_ {
        self.scanned.iter().map(move |id| &self.transponders[id.0])
    }

    pub fn scanned_ids(&self) -> &[TransponderId] {
        &self.scanned
    }

    /// Services with `service_id` on any scanned transponder.
    pub fn scanned_services_mut(
        &mut self,
        service_id: u16,
    ) -> impl Iterator<Item = &mut Service> + '_ {
        let scanned = &self.scanned;
        self.transponders
            .iter_mut()
            .enumerate()
            .filter(move |(i, _)| scanned.contains(&TransponderId(*i)))
            .flat_map(|(_, tp)| tp.services.iter_mut())
            .filter(move |s| s.service_id == service_id)
    }

    pub fn service_count(&self) -> usize {
        self.scanned().map(|tp| tp.services.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> Network {
        Network::new(DEFAULT_FREQUENCY_TOLERANCE, SpectralInversion::Auto)
    }

    #[test]
    fn test_tolerance_boundary() {
        let mut net = network();
        let id = net.alloc_transponder(506_000_000);

        assert_eq!(net.find_transponder(506_001_999), Some(id));
        assert_eq!(net.find_transponder(505_998_001), Some(id));
        assert_eq!(net.find_transponder(506_002_000), None);
        assert_eq!(net.find_transponder(505_998_000), None);
    }

    #[test]
    fn test_configurable_tolerance() {
        let mut net = Network::new(10, SpectralInversion::Off);
        let id = net.alloc_transponder(11_778_000);
        assert_eq!(net.find_transponder(11_778_009), Some(id));
        assert_eq!(net.find_transponder(11_778_010), None);
        assert_eq!(net.get(id).inversion, SpectralInversion::Off);
    }

    #[test]
    fn test_scanned_searched_before_pending() {
        let mut net = network();
        let a = net.alloc_transponder(500_000_000);
        net.mark_scanned(a);
        let b = net.alloc_transponder(500_001_000);

        assert_eq!(net.find_transponder(500_000_500), Some(a));
        assert_eq!(net.next_pending(), Some(b));
        assert!(net.get(a).scan_done);
        assert_eq!(net.pending_len(), 1);
    }

    #[test]
    fn test_pinned_lookup_resolves_to_current() {
        let mut net = network();
        let id = net.pin_current();
        assert_eq!(net.current(), Some(id));
        assert_eq!(net.find_or_alloc(650_000_000), id);
        assert_eq!(net.pending_len(), 0);
    }

    #[test]
    fn test_service_entry_is_find_or_create() {
        let mut tp = Transponder::new(1, SpectralInversion::Auto);
        tp.service_entry(100).pmt_pid = 0x200;
        tp.service_entry(100).service_name = Some("A".into());
        tp.service_entry(101);

        assert_eq!(tp.services.len(), 2);
        let s = tp.find_service(100).unwrap();
        assert_eq!(s.pmt_pid, 0x200);
        assert_eq!(s.service_name.as_deref(), Some("A"));
    }

    #[test]
    fn test_copy_description_keeps_services() {
        let mut tp = Transponder::new(506_000_000, SpectralInversion::Auto);
        tp.service_entry(1);
        tp.scan_done = true;
        tp.other_frequencies = vec![514_000_000];

        let mut scratch = Transponder::new(506_000_500, SpectralInversion::Auto);
        scratch.network_id = 0x3001;
        scratch.transport_stream_id = 500;
        tp.copy_description(&scratch);

        assert_eq!(tp.frequency, 506_000_500);
        assert_eq!(tp.network_id, 0x3001);
        assert_eq!(tp.services.len(), 1);
        assert!(tp.scan_done);
        // An entry without a frequency list drops stale alternates.
        assert!(tp.other_frequencies.is_empty());
    }

    #[test]
    fn test_audio_and_ca_bounds() {
        let mut s = Service::new(7);
        for pid in 0..40u16 {
            s.push_audio(0x100 + pid, None);
        }
        assert_eq!(s.audio.len(), AUDIO_CHAN_MAX);

        let ids: Vec<u16> = (0..20).collect();
        s.set_ca_ids(&ids);
        assert_eq!(s.ca_ids.len(), CA_SYSTEM_ID_MAX);
        assert_eq!(s.ca_ids[15], 15);
    }

    #[test]
    fn test_scanned_services_mut() {
        let mut net = network();
        let a = net.alloc_transponder(1_000_000);
        let b = net.alloc_transponder(2_000_000);
        net.get_mut(a).service_entry(0x1044);
        net.get_mut(b).service_entry(0x1044);
        net.mark_scanned(a);

        for s in net.scanned_services_mut(0x1044) {
            s.channel_num = Some(1);
        }
        assert_eq!(net.get(a).services[0].channel_num, Some(1));
        assert_eq!(net.get(b).services[0].channel_num, None);
    }
}
