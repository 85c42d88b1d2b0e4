//! Tuning frontends.
//!
//! A [`Frontend`] knows its delivery system, accepts a transponder's
//! parameters and reports lock. [`tune`] wraps this into the
//! attempts-and-lock-polling procedure the scanner uses.

use std::time::Duration;

use dvbscan_si::DeliveryKind;
use log::{debug, info, warn};
use serde::Deserialize;

use crate::error::TunerError;
use crate::model::Transponder;

#[cfg(target_os = "linux")]
pub use self::linux::LinuxFrontend;
#[cfg(not(target_os = "linux"))]
pub use self::unsupported::LinuxFrontend;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(not(target_os = "linux"))]
mod unsupported;

pub mod scripted;

pub trait Frontend {
    /// Delivery system the device receives.
    fn kind(&self) -> DeliveryKind;

    /// Program the device with the transponder's parameters.
    fn set_frontend(&mut self, tp: &Transponder) -> Result<(), TunerError>;

    fn has_lock(&mut self) -> Result<bool, TunerError>;
}

/// LNB oscillator frequencies in MHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct Lnb {
    pub low: u32,
    #[serde(default)]
    pub high: u32,
    #[serde(default)]
    pub switch: u32,
}

impl Lnb {
    /// Universal Ku-band LNB.
    pub const UNIVERSAL: Lnb = Lnb {
        low: 9750,
        high: 10600,
        switch: 11700,
    };

    /// Parse `low[,high[,switch]]`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let mut values = s.split(',').map(|v| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| format!("invalid LNB frequency '{}': {}", v, e))
        });
        let low = values.next().ok_or("empty LNB specification")??;
        let high = values.next().transpose()?.unwrap_or(0);
        let switch = values.next().transpose()?.unwrap_or(0);
        if values.next().is_some() {
            return Err(format!("too many values in LNB specification '{}'", s));
        }
        let lnb = Lnb { low, high, switch };
        lnb.check()?;
        Ok(lnb)
    }

    /// Every frequency must still fit in a `u32` once converted to kHz.
    pub fn check(&self) -> Result<(), String> {
        const MAX_MHZ: u32 = u32::MAX / 1000;
        for v in [self.low, self.high, self.switch] {
            if v > MAX_MHZ {
                return Err(format!("LNB frequency {} MHz is above {} MHz", v, MAX_MHZ));
            }
        }
        Ok(())
    }

    /// Pick the band for a satellite frequency (kHz).
    ///
    /// Returns the intermediate frequency in kHz and whether the high band
    /// (22 kHz tone) is used.
    pub fn intermediate_frequency(&self, frequency: u32) -> (u32, bool) {
        let hiband =
            self.switch != 0 && self.high != 0 && frequency >= self.switch.saturating_mul(1000);
        let oscillator = (if hiband { self.high } else { self.low }).saturating_mul(1000);
        (frequency.abs_diff(oscillator), hiband)
    }
}

/// How hard [`tune`] tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuneOptions {
    pub attempts: u32,
    pub lock_polls: u32,
    pub lock_delay: Duration,
}

impl Default for TuneOptions {
    fn default() -> Self {
        Self {
            attempts: 2,
            lock_polls: 10,
            lock_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuneResult {
    Locked,
    Failed,
}

/// Set the frontend to `tp` and wait for lock.
///
/// Device errors count as a failed attempt; they never abort the scan.
pub fn tune<F: Frontend + ?Sized>(
    fe: &mut F,
    tp: &Transponder,
    options: &TuneOptions,
) -> TuneResult {
    for attempt in 1..=options.attempts.max(1) {
        info!("tuning to {}", tp.frequency);
        if let Err(e) = fe.set_frontend(tp) {
            warn!("{}: {}", tp.frequency, e);
            continue;
        }
        for _ in 0..options.lock_polls {
            std::thread::sleep(options.lock_delay);
            match fe.has_lock() {
                Ok(true) => {
                    debug!("{}: lock after attempt {}", tp.frequency, attempt);
                    return TuneResult::Locked;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("{}: {}", tp.frequency, e);
                    break;
                }
            }
        }
        warn!(">>> tuning failed!!!");
    }
    TuneResult::Failed
}
