//! Initial tuning list.
//!
//! One transponder per line, `#` starts a comment:
//!
//! ```text
//! S 12551500 V 22000000 5/6
//! C 346000000 6900000 NONE QAM64
//! T 506000000 8MHz 2/3 NONE QAM64 8k 1/32 NONE
//! ```
//!
//! Satellite frequencies are in kHz and symbol rates in symbols/s; cable and
//! terrestrial frequencies are in Hz.

use std::path::Path;
use std::str::FromStr;

use dvbscan_si::{
    CableParameters, CodeRate, DeliveryParameters, Polarisation, SatelliteParameters,
    TerrestrialParameters, UnknownToken,
};
use log::{debug, error, warn};
use thiserror::Error;

use crate::error::ConfigError;
use crate::model::{Network, TransponderId};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum InitialLineError {
    #[error("unknown delivery system '{0}'")]
    UnknownSystem(String),

    #[error("missing {0}")]
    Missing(&'static str),

    #[error("invalid {field} '{value}'")]
    Number { field: &'static str, value: String },

    #[error(transparent)]
    Token(#[from] UnknownToken),
}

/// One entry of the initial tuning list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialTransponder {
    pub frequency: u32,
    pub delivery: DeliveryParameters,
}

struct Fields<'a> {
    iter: std::str::SplitWhitespace<'a>,
}

impl<'a> Fields<'a> {
    fn next(&mut self, field: &'static str) -> Result<&'a str, InitialLineError> {
        self.iter.next().ok_or(InitialLineError::Missing(field))
    }

    fn number(&mut self, field: &'static str) -> Result<u32, InitialLineError> {
        let value = self.next(field)?;
        value.parse().map_err(|_| InitialLineError::Number {
            field,
            value: value.to_string(),
        })
    }

    /// Enum token; unknown values are reported and replaced by the default (AUTO).
    fn token<T: FromStr<Err = UnknownToken> + Default>(
        &mut self,
        field: &'static str,
    ) -> Result<T, InitialLineError> {
        let value = self.next(field)?;
        Ok(value.parse().unwrap_or_else(|e: UnknownToken| {
            error!("{}, using AUTO", e);
            T::default()
        }))
    }
}

/// Parse one line. Blank lines and comments yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<InitialTransponder>, InitialLineError> {
    let line = line.split('#').next().unwrap_or("").trim();
    let mut fields = Fields {
        iter: line.split_whitespace(),
    };
    let Some(system) = fields.iter.next() else {
        return Ok(None);
    };

    let entry = match system {
        "S" => {
            let frequency = fields.number("frequency")?;
            let polarisation: Polarisation = fields.next("polarisation")?.parse()?;
            let symbol_rate = fields.number("symbol rate")?;
            let fec_inner: CodeRate = fields.token("fec")?;
            InitialTransponder {
                frequency,
                delivery: DeliveryParameters::Satellite(SatelliteParameters {
                    symbol_rate,
                    fec_inner,
                    polarisation,
                    orbital_position: 0,
                    west_east: false,
                }),
            }
        }
        "C" => {
            let frequency = fields.number("frequency")?;
            InitialTransponder {
                frequency,
                delivery: DeliveryParameters::Cable(CableParameters {
                    symbol_rate: fields.number("symbol rate")?,
                    fec_inner: fields.token("fec")?,
                    modulation: fields.token("modulation")?,
                }),
            }
        }
        "T" => {
            let frequency = fields.number("frequency")?;
            InitialTransponder {
                frequency,
                delivery: DeliveryParameters::Terrestrial(TerrestrialParameters {
                    bandwidth: fields.token("bandwidth")?,
                    code_rate_hp: fields.token("fec HP")?,
                    code_rate_lp: fields.token("fec LP")?,
                    constellation: fields.token("constellation")?,
                    transmission_mode: fields.token("transmission mode")?,
                    guard_interval: fields.token("guard interval")?,
                    hierarchy: fields.token("hierarchy")?,
                    other_frequency_flag: false,
                }),
            }
        }
        other => return Err(InitialLineError::UnknownSystem(other.to_string())),
    };
    Ok(Some(entry))
}

/// Parse a whole tuning list; bad lines are reported and skipped.
pub fn parse_initial(text: &str) -> Vec<InitialTransponder> {
    text.lines()
        .enumerate()
        .filter_map(|(n, line)| match parse_line(line) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("cannot parse line {}: {} ('{}')", n + 1, e, line.trim());
                None
            }
        })
        .collect()
}

pub fn read_initial(path: &Path) -> Result<Vec<InitialTransponder>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_initial(&text))
}

/// Register every entry as a pending transponder, in file order.
pub fn load_into(network: &mut Network, entries: &[InitialTransponder]) -> Vec<TransponderId> {
    entries
        .iter()
        .map(|entry| {
            let id = network.alloc_transponder(entry.frequency);
            network.get_mut(id).delivery = Some(entry.delivery);
            debug!("initial transponder {} {}", entry.frequency, entry.delivery.kind());
            id
        })
        .collect()
}
