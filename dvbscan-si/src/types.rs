//! Delivery-system value types shared by the NIT decoder, the data model
//! and the tuning backends.
//!
//! Token parsing (`FromStr`) follows the spelling used by initial tuning
//! files (`2/3`, `QAM64`, `8MHz`, ...). `name()` gives the Linux DVB
//! constant spelling used in channel lists (`FEC_2_3`, `QAM_64`, ...).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Token in a tuning description that names no known value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind} value '{token}'")]
pub struct UnknownToken {
    pub kind: &'static str,
    pub token: String,
}

impl UnknownToken {
    fn new(kind: &'static str, token: &str) -> Self {
        Self {
            kind,
            token: token.to_string(),
        }
    }
}

/// Broadcast delivery system, one per frontend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryKind {
    /// DVB-S (QPSK frontend).
    Satellite,
    /// DVB-C (QAM frontend).
    Cable,
    /// DVB-T (OFDM frontend).
    Terrestrial,
}

impl fmt::Display for DeliveryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeliveryKind::Satellite => "DVB-S",
            DeliveryKind::Cable => "DVB-C",
            DeliveryKind::Terrestrial => "DVB-T",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarisation {
    #[default]
    Horizontal,
    Vertical,
    CircularLeft,
    CircularRight,
}

impl Polarisation {
    /// Decode the 2-bit polarization field of the satellite delivery descriptor.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Polarisation::Horizontal,
            1 => Polarisation::Vertical,
            2 => Polarisation::CircularLeft,
            _ => Polarisation::CircularRight,
        }
    }

    /// Single-letter form used by tuning files and channel lists.
    pub fn letter(self) -> char {
        match self {
            Polarisation::Horizontal => 'h',
            Polarisation::Vertical => 'v',
            Polarisation::CircularLeft => 'l',
            Polarisation::CircularRight => 'r',
        }
    }

    /// Whether the LNB must be fed with the 13 V (vertical/right) supply.
    pub fn is_vertical(self) -> bool {
        matches!(self, Polarisation::Vertical | Polarisation::CircularRight)
    }
}

impl FromStr for Polarisation {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "H" | "h" => Ok(Polarisation::Horizontal),
            "V" | "v" => Ok(Polarisation::Vertical),
            "L" | "l" => Ok(Polarisation::CircularLeft),
            "R" | "r" => Ok(Polarisation::CircularRight),
            _ => Err(UnknownToken::new("polarisation", s)),
        }
    }
}

/// Inner FEC code rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodeRate {
    None,
    Fec1_2,
    Fec2_3,
    Fec3_4,
    Fec4_5,
    Fec5_6,
    Fec6_7,
    Fec7_8,
    Fec8_9,
    #[default]
    Auto,
}

impl CodeRate {
    /// Decode the 4-bit FEC_inner field of satellite/cable delivery descriptors.
    pub fn from_inner_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => CodeRate::Auto,
            1 => CodeRate::Fec1_2,
            2 => CodeRate::Fec2_3,
            3 => CodeRate::Fec3_4,
            4 => CodeRate::Fec5_6,
            5 => CodeRate::Fec7_8,
            _ => CodeRate::None,
        }
    }

    /// Decode the 3-bit code_rate field of the terrestrial delivery descriptor.
    pub fn from_terrestrial_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => CodeRate::Fec1_2,
            1 => CodeRate::Fec2_3,
            2 => CodeRate::Fec3_4,
            3 => CodeRate::Fec5_6,
            4 => CodeRate::Fec7_8,
            _ => CodeRate::Auto,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CodeRate::None => "FEC_NONE",
            CodeRate::Fec1_2 => "FEC_1_2",
            CodeRate::Fec2_3 => "FEC_2_3",
            CodeRate::Fec3_4 => "FEC_3_4",
            CodeRate::Fec4_5 => "FEC_4_5",
            CodeRate::Fec5_6 => "FEC_5_6",
            CodeRate::Fec6_7 => "FEC_6_7",
            CodeRate::Fec7_8 => "FEC_7_8",
            CodeRate::Fec8_9 => "FEC_8_9",
            CodeRate::Auto => "FEC_AUTO",
        }
    }

    /// Numeric form used in VDR channel lists (`23` for 2/3, `0` none, `999` auto).
    pub fn vdr_value(self) -> u16 {
        match self {
            CodeRate::None => 0,
            CodeRate::Fec1_2 => 12,
            CodeRate::Fec2_3 => 23,
            CodeRate::Fec3_4 => 34,
            CodeRate::Fec4_5 => 45,
            CodeRate::Fec5_6 => 56,
            CodeRate::Fec6_7 => 67,
            CodeRate::Fec7_8 => 78,
            CodeRate::Fec8_9 => 89,
            CodeRate::Auto => 999,
        }
    }
}

impl FromStr for CodeRate {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(CodeRate::None),
            "1/2" => Ok(CodeRate::Fec1_2),
            "2/3" => Ok(CodeRate::Fec2_3),
            "3/4" => Ok(CodeRate::Fec3_4),
            "4/5" => Ok(CodeRate::Fec4_5),
            "5/6" => Ok(CodeRate::Fec5_6),
            "6/7" => Ok(CodeRate::Fec6_7),
            "7/8" => Ok(CodeRate::Fec7_8),
            "8/9" => Ok(CodeRate::Fec8_9),
            "AUTO" => Ok(CodeRate::Auto),
            _ => Err(UnknownToken::new("fec", s)),
        }
    }
}

/// Modulation / constellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Modulation {
    Qpsk,
    Qam16,
    Qam32,
    Qam64,
    Qam128,
    Qam256,
    #[default]
    Auto,
}

impl Modulation {
    /// Decode the modulation field of the cable delivery descriptor.
    pub fn from_cable_bits(bits: u8) -> Self {
        match bits & 0x0F {
            1 => Modulation::Qam16,
            2 => Modulation::Qam32,
            3 => Modulation::Qam64,
            4 => Modulation::Qam128,
            5 => Modulation::Qam256,
            _ => Modulation::Auto,
        }
    }

    /// Decode the constellation field of the terrestrial delivery descriptor.
    pub fn from_constellation_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Modulation::Qpsk,
            1 => Modulation::Qam16,
            2 => Modulation::Qam64,
            _ => Modulation::Auto,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Modulation::Qpsk => "QPSK",
            Modulation::Qam16 => "QAM_16",
            Modulation::Qam32 => "QAM_32",
            Modulation::Qam64 => "QAM_64",
            Modulation::Qam128 => "QAM_128",
            Modulation::Qam256 => "QAM_256",
            Modulation::Auto => "QAM_AUTO",
        }
    }

    /// Numeric form used in VDR channel lists.
    pub fn vdr_value(self) -> u16 {
        match self {
            Modulation::Qpsk => 0,
            Modulation::Qam16 => 16,
            Modulation::Qam32 => 32,
            Modulation::Qam64 => 64,
            Modulation::Qam128 => 128,
            Modulation::Qam256 => 256,
            Modulation::Auto => 999,
        }
    }
}

impl FromStr for Modulation {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QPSK" => Ok(Modulation::Qpsk),
            "QAM16" => Ok(Modulation::Qam16),
            "QAM32" => Ok(Modulation::Qam32),
            "QAM64" => Ok(Modulation::Qam64),
            "QAM128" => Ok(Modulation::Qam128),
            "QAM256" => Ok(Modulation::Qam256),
            "AUTO" => Ok(Modulation::Auto),
            _ => Err(UnknownToken::new("modulation", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bandwidth {
    Mhz8,
    Mhz7,
    Mhz6,
    #[default]
    Auto,
}

impl Bandwidth {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Bandwidth::Mhz8,
            1 => Bandwidth::Mhz7,
            2 => Bandwidth::Mhz6,
            _ => Bandwidth::Auto,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Bandwidth::Mhz8 => "BANDWIDTH_8_MHZ",
            Bandwidth::Mhz7 => "BANDWIDTH_7_MHZ",
            Bandwidth::Mhz6 => "BANDWIDTH_6_MHZ",
            Bandwidth::Auto => "BANDWIDTH_AUTO",
        }
    }

    pub fn vdr_value(self) -> u16 {
        match self {
            Bandwidth::Mhz8 => 8,
            Bandwidth::Mhz7 => 7,
            Bandwidth::Mhz6 => 6,
            Bandwidth::Auto => 999,
        }
    }
}

impl FromStr for Bandwidth {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "8MHz" => Ok(Bandwidth::Mhz8),
            "7MHz" => Ok(Bandwidth::Mhz7),
            "6MHz" => Ok(Bandwidth::Mhz6),
            "AUTO" => Ok(Bandwidth::Auto),
            _ => Err(UnknownToken::new("bandwidth", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransmissionMode {
    Mode2k,
    Mode8k,
    #[default]
    Auto,
}

impl TransmissionMode {
    pub fn name(self) -> &'static str {
        match self {
            TransmissionMode::Mode2k => "TRANSMISSION_MODE_2K",
            TransmissionMode::Mode8k => "TRANSMISSION_MODE_8K",
            TransmissionMode::Auto => "TRANSMISSION_MODE_AUTO",
        }
    }

    pub fn vdr_value(self) -> u16 {
        match self {
            TransmissionMode::Mode2k => 2,
            TransmissionMode::Mode8k => 8,
            TransmissionMode::Auto => 999,
        }
    }
}

impl FromStr for TransmissionMode {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "2k" => Ok(TransmissionMode::Mode2k),
            "8k" => Ok(TransmissionMode::Mode8k),
            "AUTO" => Ok(TransmissionMode::Auto),
            _ => Err(UnknownToken::new("transmission mode", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuardInterval {
    G1_32,
    G1_16,
    G1_8,
    G1_4,
    #[default]
    Auto,
}

impl GuardInterval {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => GuardInterval::G1_32,
            1 => GuardInterval::G1_16,
            2 => GuardInterval::G1_8,
            _ => GuardInterval::G1_4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            GuardInterval::G1_32 => "GUARD_INTERVAL_1_32",
            GuardInterval::G1_16 => "GUARD_INTERVAL_1_16",
            GuardInterval::G1_8 => "GUARD_INTERVAL_1_8",
            GuardInterval::G1_4 => "GUARD_INTERVAL_1_4",
            GuardInterval::Auto => "GUARD_INTERVAL_AUTO",
        }
    }

    pub fn vdr_value(self) -> u16 {
        match self {
            GuardInterval::G1_32 => 32,
            GuardInterval::G1_16 => 16,
            GuardInterval::G1_8 => 8,
            GuardInterval::G1_4 => 4,
            GuardInterval::Auto => 999,
        }
    }
}

impl FromStr for GuardInterval {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1/32" => Ok(GuardInterval::G1_32),
            "1/16" => Ok(GuardInterval::G1_16),
            "1/8" => Ok(GuardInterval::G1_8),
            "1/4" => Ok(GuardInterval::G1_4),
            "AUTO" => Ok(GuardInterval::Auto),
            _ => Err(UnknownToken::new("guard interval", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Hierarchy {
    None,
    H1,
    H2,
    H4,
    #[default]
    Auto,
}

impl Hierarchy {
    /// Decode the hierarchy field (the in-depth interleaver bit is ignored).
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Hierarchy::None,
            1 => Hierarchy::H1,
            2 => Hierarchy::H2,
            _ => Hierarchy::H4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Hierarchy::None => "HIERARCHY_NONE",
            Hierarchy::H1 => "HIERARCHY_1",
            Hierarchy::H2 => "HIERARCHY_2",
            Hierarchy::H4 => "HIERARCHY_4",
            Hierarchy::Auto => "HIERARCHY_AUTO",
        }
    }

    pub fn vdr_value(self) -> u16 {
        match self {
            Hierarchy::None => 0,
            Hierarchy::H1 => 1,
            Hierarchy::H2 => 2,
            Hierarchy::H4 => 4,
            Hierarchy::Auto => 999,
        }
    }
}

impl FromStr for Hierarchy {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(Hierarchy::None),
            "1" => Ok(Hierarchy::H1),
            "2" => Ok(Hierarchy::H2),
            "4" => Ok(Hierarchy::H4),
            "AUTO" => Ok(Hierarchy::Auto),
            _ => Err(UnknownToken::new("hierarchy", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpectralInversion {
    Off,
    On,
    #[default]
    Auto,
}

impl SpectralInversion {
    pub fn name(self) -> &'static str {
        match self {
            SpectralInversion::Off => "INVERSION_OFF",
            SpectralInversion::On => "INVERSION_ON",
            SpectralInversion::Auto => "INVERSION_AUTO",
        }
    }

    pub fn vdr_value(self) -> u16 {
        match self {
            SpectralInversion::Off => 0,
            SpectralInversion::On => 1,
            SpectralInversion::Auto => 999,
        }
    }
}

impl TryFrom<u8> for SpectralInversion {
    type Error = UnknownToken;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SpectralInversion::Off),
            1 => Ok(SpectralInversion::On),
            2 => Ok(SpectralInversion::Auto),
            other => Err(UnknownToken::new("spectral inversion", &other.to_string())),
        }
    }
}

/// SDT running_status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunningStatus {
    #[default]
    Undefined,
    NotRunning,
    StartsSoon,
    Pausing,
    Running,
    Reserved(u8),
}

impl RunningStatus {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => RunningStatus::Undefined,
            1 => RunningStatus::NotRunning,
            2 => RunningStatus::StartsSoon,
            3 => RunningStatus::Pausing,
            4 => RunningStatus::Running,
            other => RunningStatus::Reserved(other),
        }
    }
}

impl fmt::Display for RunningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunningStatus::NotRunning => "not running",
            RunningStatus::StartsSoon => "starts soon",
            RunningStatus::Pausing => "pausing",
            RunningStatus::Running => "running",
            RunningStatus::Undefined | RunningStatus::Reserved(_) => "???",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SatelliteParameters {
    /// Symbol rate in symbols/s.
    pub symbol_rate: u32,
    pub fec_inner: CodeRate,
    pub polarisation: Polarisation,
    /// Orbital position in 0.1 degree units.
    pub orbital_position: u16,
    /// `west_east_flag`: set for east, clear for west.
    pub west_east: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CableParameters {
    /// Symbol rate in symbols/s.
    pub symbol_rate: u32,
    pub fec_inner: CodeRate,
    pub modulation: Modulation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerrestrialParameters {
    pub bandwidth: Bandwidth,
    pub code_rate_hp: CodeRate,
    pub code_rate_lp: CodeRate,
    pub constellation: Modulation,
    pub transmission_mode: TransmissionMode,
    pub guard_interval: GuardInterval,
    pub hierarchy: Hierarchy,
    /// Set when the multiplex is also carried on other frequencies.
    pub other_frequency_flag: bool,
}

/// Tuning parameters for exactly one delivery system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryParameters {
    Satellite(SatelliteParameters),
    Cable(CableParameters),
    Terrestrial(TerrestrialParameters),
}

impl DeliveryParameters {
    pub fn kind(&self) -> DeliveryKind {
        match self {
            DeliveryParameters::Satellite(_) => DeliveryKind::Satellite,
            DeliveryParameters::Cable(_) => DeliveryKind::Cable,
            DeliveryParameters::Terrestrial(_) => DeliveryKind::Terrestrial,
        }
    }
}
