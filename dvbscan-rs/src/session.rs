//! A scan run: tune, collect tables, follow the NIT to the next transponder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dvbscan_si::{pid, table_id};
use log::{debug, error, info, warn};

use crate::config::ScanConfig;
use crate::demux::Demux;
use crate::error::Result;
use crate::initial::{load_into, InitialTransponder};
use crate::interpret::{InterpretOptions, TableInterpreter};
use crate::model::{Network, TransponderId};
use crate::scheduler::{FilterScheduler, FilterSpec};
use crate::tuner::{tune, Frontend, TuneResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed,
    Interrupted,
}

/// Filter timeouts per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub pat: Duration,
    pub sdt: Duration,
    pub nit: Duration,
    pub pmt: Duration,
}

impl Timeouts {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            pat: config.pat_timeout(),
            sdt: config.sdt_timeout(),
            nit: config.nit_timeout(),
            pmt: config.pmt_timeout(),
        }
    }
}

pub struct ScanSession<D: Demux, F: Frontend> {
    network: Network,
    scheduler: FilterScheduler<D>,
    frontend: F,
    config: ScanConfig,
    timeouts: Timeouts,
    interrupted: Arc<AtomicBool>,
    /// PAT and SDT filters have been started at least once.
    started: bool,
}

impl<D: Demux, F: Frontend> ScanSession<D, F> {
    pub fn new(demux: D, frontend: F, config: ScanConfig, interrupted: Arc<AtomicBool>) -> Self {
        let network = Network::new(config.frequency_tolerance, config.inversion);
        let scheduler = FilterScheduler::new(demux, config.max_filters);
        Self {
            network,
            scheduler,
            frontend,
            timeouts: Timeouts::from_config(&config),
            config,
            interrupted,
            started: false,
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    pub fn into_network(self) -> Network {
        self.network
    }

    pub fn frontend(&self) -> &F {
        &self.frontend
    }

    pub fn demux(&self) -> &D {
        self.scheduler.demux()
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Collect PAT, PMTs, SDT and NIT from the current transponder.
    ///
    /// Only the first transponder's PAT and SDT filters must start; later
    /// refusals are logged and the transponder yields what it can.
    pub fn scan_transponder(&mut self) -> Result<ScanOutcome> {
        let t = self.timeouts;
        let pat = FilterSpec::once(pid::PAT, table_id::PAT, t.pat);
        let sdt = FilterSpec::once(pid::SDT, table_id::SDT_ACTUAL, t.sdt);
        if self.started {
            self.scheduler.add(pat);
            self.scheduler.add(sdt);
        } else {
            self.scheduler.install(pat)?;
            self.scheduler.install(sdt)?;
            self.started = true;
        }
        if self.config.scan_nit() {
            self.scheduler
                .add(FilterSpec::once(pid::NIT, table_id::NIT_ACTUAL, t.nit));
        }
        if self.config.other_nits {
            self.scheduler
                .add(FilterSpec::once(pid::NIT, table_id::NIT_OTHER, t.nit).segmented());
        }

        let options = InterpretOptions {
            frontend_kind: self.frontend.kind(),
            uk_channel_numbers: self.config.uk_channel_numbers,
            pmt_timeout: t.pmt,
        };
        let mut interpreter = TableInterpreter::new(&mut self.network, &options);
        while !self.scheduler.is_idle() {
            self.scheduler
                .poll_once(self.config.poll_interval, &mut interpreter)?;
            if self.interrupted.load(Ordering::SeqCst) {
                info!("interrupted, stopping section filters");
                self.scheduler.clear();
                return Ok(ScanOutcome::Interrupted);
            }
        }
        Ok(ScanOutcome::Completed)
    }

    /// Move `id` to the scanned list, make it current and tune to it.
    /// Alternate frequencies are tried newest first when tuning fails.
    pub fn tune_to_transponder(&mut self, id: TransponderId) -> bool {
        self.network.mark_scanned(id);
        self.network.set_current(id);

        let kind = self.frontend.kind();
        let tp = self.network.get_mut(id);
        match tp.kind() {
            Some(k) if k == kind => {}
            Some(k) => {
                warn!(
                    "frontend type ({}) is not compatible with requested tuning type ({})",
                    kind, k
                );
                tp.last_tuning_failed = true;
                return false;
            }
            None => {
                warn!("transponder {} has no tuning parameters", tp.frequency);
                tp.last_tuning_failed = true;
                return false;
            }
        }

        loop {
            let result = tune(&mut self.frontend, self.network.get(id), &self.config.tune);
            let tp = self.network.get_mut(id);
            if result == TuneResult::Locked {
                tp.last_tuning_failed = false;
                return true;
            }
            if !tp.other_frequency_flag() {
                break;
            }
            let Some(frequency) = tp.other_frequencies.pop() else {
                break;
            };
            info!("retrying with f={}", frequency);
            tp.frequency = frequency;
        }
        self.network.get_mut(id).last_tuning_failed = true;
        false
    }

    /// Tune to the first pending transponder that locks.
    pub fn tune_to_next(&mut self) -> bool {
        while let Some(id) = self.network.next_pending() {
            if self.is_interrupted() {
                return false;
            }
            if self.tune_to_transponder(id) {
                return true;
            }
        }
        false
    }

    /// Scan the network reachable from the initial tuning list.
    pub fn scan_network(&mut self, initial: &[InitialTransponder]) -> Result<ScanOutcome> {
        load_into(&mut self.network, initial);
        if !self.tune_to_next() {
            if self.is_interrupted() {
                return Ok(ScanOutcome::Interrupted);
            }
            error!(
                "initial tuning failed: none of {} transponders could be tuned",
                initial.len()
            );
            return Ok(ScanOutcome::Completed);
        }

        loop {
            if self.scan_transponder()? == ScanOutcome::Interrupted {
                return Ok(ScanOutcome::Interrupted);
            }
            debug!("{} transponders pending", self.network.pending_len());
            if !self.tune_to_next() {
                break;
            }
        }
        if self.is_interrupted() {
            return Ok(ScanOutcome::Interrupted);
        }
        Ok(ScanOutcome::Completed)
    }

    /// Scan whatever the frontend is tuned to now, without tuning.
    pub fn scan_current(&mut self) -> Result<ScanOutcome> {
        self.network.pin_current();
        self.scan_transponder()
    }
}
