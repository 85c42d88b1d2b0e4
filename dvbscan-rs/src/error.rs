//! Error types for device access, configuration and the scan as a whole.

use std::io;
use std::path::PathBuf;

use dvbscan_si::DeliveryKind;
use thiserror::Error;

/// Section filter (demux) errors.
#[derive(Error, Debug)]
pub enum DemuxError {
    #[error("Failed to open demux device {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to set section filter on PID 0x{pid:04x}: {source}")]
    SetFilter {
        pid: u16,
        #[source]
        source: io::Error,
    },

    /// The device has no free section filter.
    #[error("No section filter available")]
    Exhausted,

    /// Sections were lost because the kernel buffer overflowed.
    #[error("Section buffer overflow")]
    Overflow,

    #[error("Section read failed: {0}")]
    Read(#[source] io::Error),

    #[error("Poll failed: {0}")]
    Poll(#[source] io::Error),

    #[error("Section filters are not supported on this platform")]
    Unsupported,
}

/// Frontend (tuner) errors.
#[derive(Error, Debug)]
pub enum TunerError {
    #[error("Failed to open frontend {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{op} failed: {source}")]
    Ioctl {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// The transponder carries no tuning parameters yet.
    #[error("Transponder {0} has no delivery parameters")]
    NoParameters(u32),

    #[error("Frontend is {frontend}, transponder is {transponder}")]
    KindMismatch {
        frontend: DeliveryKind,
        transponder: DeliveryKind,
    },

    #[error("Unknown frontend type {0}")]
    UnknownType(u32),

    #[error("Tuner device access is not supported on this platform (supported: Linux)")]
    Unsupported,
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level scan errors. Only these abort the process.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Demux(#[from] DemuxError),

    #[error(transparent)]
    Tuner(#[from] TunerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ScanError>;
