//! Scan configuration.
//!
//! [`ScanConfig`] is the single source of settings for a scan. It starts
//! from defaults, takes values from an optional TOML file ([`ConfigFile`]),
//! and finally command line flags.

use std::path::Path;
use std::time::Duration;

use dvbscan_si::SpectralInversion;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::DEFAULT_FREQUENCY_TOLERANCE;
use crate::scheduler::MAX_RUNNING;
use crate::tuner::{Lnb, TuneOptions};

/// Channel list format written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// zap/czap/szap/tzap channels.conf
    #[default]
    Zap,
    /// VDR channels.conf
    Vdr,
    /// PID listing
    Pids,
}

/// Which services to list.
pub mod service_select {
    pub const TV: u8 = 1;
    pub const RADIO: u8 = 2;
    pub const OTHER: u8 = 4;
    pub const ALL: u8 = TV | RADIO | OTHER;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    pub adapter: u32,
    pub frontend: u32,
    pub demux: u32,
    /// Section filters kept open at once.
    pub max_filters: usize,
    pub frequency_tolerance: u32,
    /// Multiply every filter timeout by five.
    pub long_timeout: bool,
    /// Also collect NIT-other (table 0x41).
    pub other_nits: bool,
    /// Scan only what the frontend is tuned to now.
    pub current_tp_only: bool,
    pub inversion: SpectralInversion,
    pub lnb: Lnb,
    /// Satellite switch position, reported in zap output.
    pub sat_number: u8,
    pub tune: TuneOptions,
    pub poll_interval: Duration,
    pub output: OutputFormat,
    /// Bitmask of [`service_select`] values.
    pub service_select: u8,
    /// CA id written for scrambled services; 0 lists free-to-air only.
    pub ca_select: u16,
    pub vdr_provider: bool,
    pub vdr_version: u8,
    pub uk_channel_numbers: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            adapter: 0,
            frontend: 0,
            demux: 0,
            max_filters: MAX_RUNNING,
            frequency_tolerance: DEFAULT_FREQUENCY_TOLERANCE,
            long_timeout: false,
            other_nits: false,
            current_tp_only: false,
            inversion: SpectralInversion::Auto,
            lnb: Lnb::UNIVERSAL,
            sat_number: 0,
            tune: TuneOptions::default(),
            poll_interval: Duration::from_millis(1000),
            output: OutputFormat::Zap,
            service_select: service_select::ALL,
            ca_select: 1,
            vdr_provider: false,
            vdr_version: 2,
            uk_channel_numbers: false,
        }
    }
}

impl ScanConfig {
    fn timeout(&self, seconds: u64) -> Duration {
        let factor = if self.long_timeout { 5 } else { 1 };
        Duration::from_secs(seconds * factor)
    }

    pub fn pat_timeout(&self) -> Duration {
        self.timeout(5)
    }

    pub fn sdt_timeout(&self) -> Duration {
        self.timeout(5)
    }

    pub fn pmt_timeout(&self) -> Duration {
        self.timeout(5)
    }

    pub fn nit_timeout(&self) -> Duration {
        self.timeout(15)
    }

    /// The NIT is skipped when only the current transponder's PIDs are wanted.
    pub fn scan_nit(&self) -> bool {
        !(self.current_tp_only && self.output == OutputFormat::Pids)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sat_number >= 4 {
            return Err(ConfigError::Invalid(format!(
                "satellite switch position {} is not below 4",
                self.sat_number
            )));
        }
        if self.max_filters == 0 {
            return Err(ConfigError::Invalid("max_filters must be at least 1".into()));
        }
        if self.frequency_tolerance == 0 {
            return Err(ConfigError::Invalid(
                "frequency_tolerance must be at least 1".into(),
            ));
        }
        self.lnb.check().map_err(ConfigError::Invalid)?;
        Ok(())
    }

    /// Take every value the file sets.
    pub fn apply_file(&mut self, file: ConfigFile) -> Result<(), ConfigError> {
        let ConfigFile {
            device,
            scan,
            output,
        } = file;

        if let Some(v) = device.adapter {
            self.adapter = v;
        }
        if let Some(v) = device.frontend {
            self.frontend = v;
        }
        if let Some(v) = device.demux {
            self.demux = v;
        }
        if let Some(v) = device.lnb {
            self.lnb = v;
        }
        if let Some(v) = device.sat_number {
            self.sat_number = v;
        }
        if let Some(v) = device.inversion {
            self.inversion = SpectralInversion::try_from(v)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }

        if let Some(v) = scan.max_filters {
            self.max_filters = v;
        }
        if let Some(v) = scan.frequency_tolerance {
            self.frequency_tolerance = v;
        }
        if let Some(v) = scan.long_timeout {
            self.long_timeout = v;
        }
        if let Some(v) = scan.other_nits {
            self.other_nits = v;
        }
        if let Some(v) = scan.tune_attempts {
            self.tune.attempts = v;
        }
        if let Some(v) = scan.lock_polls {
            self.tune.lock_polls = v;
        }
        if let Some(v) = scan.lock_delay_ms {
            self.tune.lock_delay = Duration::from_millis(v);
        }
        if let Some(v) = scan.poll_interval_ms {
            self.poll_interval = Duration::from_millis(v);
        }
        if let Some(v) = scan.uk_channel_numbers {
            self.uk_channel_numbers = v;
        }

        if let Some(v) = output.format {
            self.output = v;
        }
        if let Some(v) = output.service_select {
            self.service_select = v;
        }
        if let Some(v) = output.ca_select {
            self.ca_select = v;
        }
        if let Some(v) = output.vdr_provider {
            self.vdr_provider = v;
        }
        if let Some(v) = output.vdr_version {
            self.vdr_version = v;
        }
        Ok(())
    }
}

/// Configuration file format.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub scan: ScanSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DeviceSection {
    pub adapter: Option<u32>,
    pub frontend: Option<u32>,
    pub demux: Option<u32>,
    pub lnb: Option<Lnb>,
    pub sat_number: Option<u8>,
    /// 0 off, 1 on, 2 auto.
    pub inversion: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ScanSection {
    pub max_filters: Option<usize>,
    pub frequency_tolerance: Option<u32>,
    pub long_timeout: Option<bool>,
    pub other_nits: Option<bool>,
    pub tune_attempts: Option<u32>,
    pub lock_polls: Option<u32>,
    pub lock_delay_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub uk_channel_numbers: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    pub format: Option<OutputFormat>,
    pub service_select: Option<u8>,
    pub ca_select: Option<u16>,
    pub vdr_provider: Option<bool>,
    pub vdr_version: Option<u8>,
}

impl ConfigFile {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_scale() {
        let mut config = ScanConfig::default();
        assert_eq!(config.pat_timeout(), Duration::from_secs(5));
        assert_eq!(config.nit_timeout(), Duration::from_secs(15));
        config.long_timeout = true;
        assert_eq!(config.sdt_timeout(), Duration::from_secs(25));
        assert_eq!(config.nit_timeout(), Duration::from_secs(75));
    }

    #[test]
    fn test_nit_skipped_for_current_pids() {
        let mut config = ScanConfig::default();
        assert!(config.scan_nit());
        config.current_tp_only = true;
        assert!(config.scan_nit());
        config.output = OutputFormat::Pids;
        assert!(!config.scan_nit());
    }

    #[test]
    fn test_apply_file() {
        let file = ConfigFile::parse(
            r#"
            [device]
            adapter = 1
            lnb = { low = 10750 }
            inversion = 0

            [scan]
            frequency_tolerance = 500
            lock_delay_ms = 50

            [output]
            format = "zap"
            service_select = 3
            "#,
        )
        .unwrap();

        let mut config = ScanConfig::default();
        config.apply_file(file).unwrap();
        assert_eq!(config.adapter, 1);
        assert_eq!(config.lnb.low, 10750);
        assert_eq!(config.lnb.high, 0);
        assert_eq!(config.inversion, SpectralInversion::Off);
        assert_eq!(config.frequency_tolerance, 500);
        assert_eq!(config.tune.lock_delay, Duration::from_millis(50));
        assert_eq!(config.tune.attempts, 2);
        assert_eq!(config.output, OutputFormat::Zap);
        assert_eq!(config.service_select, 3);
    }

    #[test]
    fn test_invalid_values() {
        assert!(ConfigFile::parse("[scan]\nbogus = 1\n").is_err());

        let mut config = ScanConfig::default();
        let file = ConfigFile::parse("[device]\ninversion = 7\n").unwrap();
        assert!(config.apply_file(file).is_err());

        config.sat_number = 4;
        assert!(config.validate().is_err());
        config.sat_number = 3;
        assert!(config.validate().is_ok());

        let file = ConfigFile::parse("[device]\nlnb = { low = 5000000 }\n").unwrap();
        config.apply_file(file).unwrap();
        assert!(config.validate().is_err());
    }
}
