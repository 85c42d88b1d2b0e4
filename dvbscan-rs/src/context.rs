use std::path::PathBuf;

use clap::{ArgGroup, Parser};
use clap_num::maybe_hex;
use dvbscan_si::SpectralInversion;
use log::LevelFilter;

use crate::config::{ConfigFile, OutputFormat, ScanConfig};
use crate::error::ConfigError;
use crate::tuner::Lnb;

#[derive(Debug, Parser)]
#[clap(name = "dvbscan")]
#[clap(about = "dvbscan tunes through a DVB network and prints the channels it finds. ", long_about = None)]
#[clap(version)]
#[clap(group(
    ArgGroup::new("source")
    .args(& ["initial", "current"])
    .required(true)
))]
pub struct Cli {
    /// Initial tuning list.{n}
    /// One transponder per line, for example{n}
    /// `T 506000000 8MHz 2/3 NONE QAM64 8k 1/32 NONE`
    pub initial: Option<PathBuf>,

    /// Scan only the transponder the frontend is tuned to now.{n}
    /// Implies `-o pids` unless an output format is given.
    #[clap(short = 'c', long = "current")]
    pub current: bool,

    /// Use /dev/dvb/adapterN/
    #[clap(short, long, value_name = "N")]
    pub adapter: Option<u32>,

    /// Use /dev/dvb/adapter?/frontendN
    #[clap(short, long, value_name = "N")]
    pub frontend: Option<u32>,

    /// Use /dev/dvb/adapter?/demuxN
    #[clap(short, long, value_name = "N")]
    pub demux: Option<u32>,

    /// Also collect NIT-other tables.
    #[clap(short = 'n', long = "other-nits")]
    pub other_nits: bool,

    /// Multiply all filter timeouts by five.
    #[clap(short = '5', long = "long-timeout")]
    pub long_timeout: bool,

    /// Output format.
    #[clap(value_enum, short, long)]
    pub output: Option<OutputFormat>,

    /// Conditional access.{n}
    /// 0 lists free-to-air services only; any other value is written
    /// as the CA field of scrambled services in VDR output.
    #[clap(short = 'x', long = "ca", value_name = "N", value_parser = maybe_hex::<u16>)]
    pub ca_select: Option<u16>,

    /// Service selection bitmask: 1 TV, 2 radio, 4 other.
    #[clap(short = 't', long = "types", value_name = "N", value_parser = maybe_hex::<u8>)]
    pub service_select: Option<u8>,

    /// Prefix service names with the provider in VDR output.
    #[clap(short = 'p', long = "provider")]
    pub vdr_provider: bool,

    /// Write network and transport stream ids in VDR output.
    #[clap(short = 'e', long = "vdr-ids")]
    pub vdr_ids: bool,

    /// Spectral inversion: 0 off, 1 on, 2 auto.
    #[clap(short = 'i', long, value_name = "N", value_parser = clap::value_parser!(u8).range(0..=2))]
    pub inversion: Option<u8>,

    /// LNB local oscillators in MHz: low[,high[,switch]].
    #[clap(short = 'l', long, value_name = "LOW[,HIGH[,SWITCH]]", value_parser = Lnb::parse)]
    pub lnb: Option<Lnb>,

    /// Satellite switch position (0-3).
    #[clap(short = 's', long = "sat", value_name = "N")]
    pub sat_number: Option<u8>,

    /// Apply UK logical channel numbers.
    #[clap(short = 'u', long = "uk-channel-numbers")]
    pub uk_channel_numbers: bool,

    /// Frequencies closer than this are the same transponder.
    #[clap(long, value_name = "N")]
    pub tolerance: Option<u32>,

    /// Section filters kept open at once.
    #[clap(long = "max-filters", value_name = "N")]
    pub max_filters: Option<usize>,

    /// Configuration file (TOML).{n}
    /// Command line flags take precedence over the file.
    #[clap(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// More log output; repeat for more.
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Less log output; repeat for less.
    #[clap(short, long, action = clap::ArgAction::Count, conflicts_with = "verbose")]
    pub quiet: u8,
}

impl Cli {
    /// Log level from `-v` and `-q`, starting at info.
    pub fn log_level(&self) -> LevelFilter {
        const LEVELS: [LevelFilter; 6] = [
            LevelFilter::Off,
            LevelFilter::Error,
            LevelFilter::Warn,
            LevelFilter::Info,
            LevelFilter::Debug,
            LevelFilter::Trace,
        ];
        let index = (3 + i32::from(self.verbose) - i32::from(self.quiet)).clamp(0, 5);
        LEVELS[index as usize]
    }

    /// Defaults, then the configuration file, then the flags.
    pub fn scan_config(&self) -> Result<ScanConfig, ConfigError> {
        let mut config = ScanConfig::default();
        if let Some(path) = &self.config {
            config.apply_file(ConfigFile::load(path)?)?;
        }

        if let Some(v) = self.adapter {
            config.adapter = v;
        }
        if let Some(v) = self.frontend {
            config.frontend = v;
        }
        if let Some(v) = self.demux {
            config.demux = v;
        }
        if let Some(v) = self.lnb {
            config.lnb = v;
        }
        if let Some(v) = self.sat_number {
            config.sat_number = v;
        }
        if let Some(v) = self.inversion {
            config.inversion =
                SpectralInversion::try_from(v).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        if let Some(v) = self.tolerance {
            config.frequency_tolerance = v;
        }
        if let Some(v) = self.max_filters {
            config.max_filters = v;
        }
        if let Some(v) = self.ca_select {
            config.ca_select = v;
        }
        if let Some(v) = self.service_select {
            config.service_select = v;
        }
        if let Some(v) = self.output {
            config.output = v;
        }
        config.other_nits |= self.other_nits;
        config.long_timeout |= self.long_timeout;
        config.vdr_provider |= self.vdr_provider;
        config.uk_channel_numbers |= self.uk_channel_numbers;
        if self.vdr_ids {
            config.vdr_version = 3;
        }
        if self.current {
            config.current_tp_only = true;
            if self.output.is_none() {
                config.output = OutputFormat::Pids;
            }
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("dvbscan").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_source_is_required_and_exclusive() {
        assert!(Cli::try_parse_from(["dvbscan"]).is_err());
        assert!(Cli::try_parse_from(["dvbscan", "-c", "list.conf"]).is_err());
        assert!(parse(&["list.conf"]).initial.is_some());
        assert!(parse(&["-c"]).current);
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = parse(&[
            "-a", "1", "-x", "0x0500", "-t", "3", "-o", "vdr", "-e", "-5", "-i", "0", "-l",
            "10750", "-s", "2", "list.conf",
        ]);
        let config = cli.scan_config().unwrap();
        assert_eq!(config.adapter, 1);
        assert_eq!(config.ca_select, 0x500);
        assert_eq!(config.service_select, 3);
        assert_eq!(config.output, OutputFormat::Vdr);
        assert_eq!(config.vdr_version, 3);
        assert!(config.long_timeout);
        assert_eq!(config.inversion, SpectralInversion::Off);
        assert_eq!(config.lnb.low, 10750);
        assert_eq!(config.sat_number, 2);
        assert!(!config.current_tp_only);
    }

    #[test]
    fn test_current_implies_pids() {
        let config = parse(&["-c"]).scan_config().unwrap();
        assert!(config.current_tp_only);
        assert_eq!(config.output, OutputFormat::Pids);
        assert!(!config.scan_nit());

        let config = parse(&["-c", "-o", "zap"]).scan_config().unwrap();
        assert_eq!(config.output, OutputFormat::Zap);
        assert!(config.scan_nit());
    }

    #[test]
    fn test_invalid_values() {
        assert!(Cli::try_parse_from(["dvbscan", "-i", "3", "list.conf"]).is_err());
        assert!(Cli::try_parse_from(["dvbscan", "-l", "a,b", "list.conf"]).is_err());
        assert!(parse(&["-s", "4", "list.conf"]).scan_config().is_err());
    }

    #[test]
    fn test_log_level() {
        assert_eq!(parse(&["-c"]).log_level(), LevelFilter::Info);
        assert_eq!(parse(&["-c", "-vv"]).log_level(), LevelFilter::Trace);
        assert_eq!(parse(&["-c", "-qqqqq"]).log_level(), LevelFilter::Off);
    }
}
