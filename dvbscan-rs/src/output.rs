//! Channel list output.
//!
//! The lists are written from the scanned transponders in scan order, one
//! line per selected service, in one of three formats:
//!
//! - `zap`: `czap`/`szap`/`tzap` channels.conf
//! - `vdr`: VDR channels.conf
//! - `pids`: a PID table for humans

use std::io::{self, Write};

use dvbscan_si::DeliveryParameters;
use log::{debug, info};

use crate::config::{service_select, OutputFormat, ScanConfig};
use crate::model::{Network, Service, Transponder};

pub trait ServiceFormatter {
    fn write_service(
        &self,
        out: &mut dyn Write,
        tp: &Transponder,
        service: &Service,
    ) -> io::Result<()>;
}

fn polarisation_char(tp: &Transponder) -> char {
    match tp.delivery {
        Some(DeliveryParameters::Satellite(p)) => p.polarisation.letter(),
        _ => 'h',
    }
}

fn first_audio_pid(service: &Service) -> u16 {
    service.audio.first().map_or(0, |a| a.pid)
}

fn service_name(service: &Service) -> &str {
    service.service_name.as_deref().unwrap_or("")
}

/// channels.conf for the zap tools.
#[derive(Debug, Clone, Default)]
pub struct ZapFormatter {
    pub sat_number: u8,
}

impl ServiceFormatter for ZapFormatter {
    fn write_service(
        &self,
        out: &mut dyn Write,
        tp: &Transponder,
        service: &Service,
    ) -> io::Result<()> {
        write!(out, "{}:", service_name(service))?;
        match tp.delivery {
            Some(DeliveryParameters::Satellite(p)) => write!(
                out,
                "{}:{}:{}:{}",
                tp.frequency / 1000,
                polarisation_char(tp),
                self.sat_number,
                p.symbol_rate / 1000
            )?,
            Some(DeliveryParameters::Cable(p)) => write!(
                out,
                "{}:{}:{}:{}:{}",
                tp.frequency,
                tp.inversion.name(),
                p.symbol_rate,
                p.fec_inner.name(),
                p.modulation.name()
            )?,
            Some(DeliveryParameters::Terrestrial(p)) => write!(
                out,
                "{}:{}:{}:{}:{}:{}:{}:{}:{}",
                tp.frequency,
                tp.inversion.name(),
                p.bandwidth.name(),
                p.code_rate_hp.name(),
                p.code_rate_lp.name(),
                p.constellation.name(),
                p.transmission_mode.name(),
                p.guard_interval.name(),
                p.hierarchy.name()
            )?,
            None => write!(out, "{}", tp.frequency)?,
        }
        writeln!(
            out,
            ":{}:{}:{}",
            service.video_pid,
            first_audio_pid(service),
            service.service_id
        )
    }
}

/// VDR channels.conf.
#[derive(Debug, Clone)]
pub struct VdrFormatter {
    /// Prefix the name with the provider.
    pub provider: bool,
    /// CA field value for scrambled services.
    pub ca_select: u16,
    /// With version 2, network and transport stream ids are written as 0.
    pub version: u8,
    /// Emit `:@n` group lines for logical channel numbers.
    pub channel_numbers: bool,
}

impl VdrFormatter {
    fn write_parameters(&self, out: &mut dyn Write, tp: &Transponder) -> io::Result<()> {
        match tp.delivery {
            Some(DeliveryParameters::Satellite(p)) => write!(
                out,
                "{}:{}:S{}.{}{}:{}:",
                tp.frequency / 1000,
                polarisation_char(tp),
                p.orbital_position / 10,
                p.orbital_position % 10,
                if p.west_east { 'E' } else { 'W' },
                p.symbol_rate / 1000
            ),
            Some(DeliveryParameters::Cable(p)) => write!(
                out,
                "{}:M{}:C:{}:",
                tp.frequency / 1_000_000,
                p.modulation.vdr_value(),
                p.symbol_rate / 1000
            ),
            Some(DeliveryParameters::Terrestrial(p)) => write!(
                out,
                "{}:I{}B{}C{}D{}M{}T{}G{}Y{}:T:27500:",
                tp.frequency / 1000,
                tp.inversion.vdr_value(),
                p.bandwidth.vdr_value(),
                p.code_rate_hp.vdr_value(),
                p.code_rate_lp.vdr_value(),
                p.constellation.vdr_value(),
                p.transmission_mode.vdr_value(),
                p.guard_interval.vdr_value(),
                p.hierarchy.vdr_value()
            ),
            None => write!(out, "{}::::", tp.frequency),
        }
    }
}

impl ServiceFormatter for VdrFormatter {
    fn write_service(
        &self,
        out: &mut dyn Write,
        tp: &Transponder,
        service: &Service,
    ) -> io::Result<()> {
        if self.channel_numbers {
            if let Some(n) = service.channel_num {
                writeln!(out, ":@{}", n)?;
            }
        }
        if self.provider {
            write!(
                out,
                "{} - ",
                service.provider_name.as_deref().unwrap_or("")
            )?;
        }
        write!(out, "{}:", service_name(service))?;
        self.write_parameters(out, tp)?;

        if service.video_pid != 0 && service.pcr_pid != service.video_pid {
            write!(out, "{}+{}:", service.video_pid, service.pcr_pid)?;
        } else {
            write!(out, "{}:", service.video_pid)?;
        }
        write!(out, "{}", first_audio_pid(service))?;
        for audio in service.audio.iter().skip(1) {
            write!(out, ",{}", audio.pid)?;
        }
        if service.ac3_pid != 0 {
            write!(out, ";{}", service.ac3_pid)?;
        }

        let ca = if service.scrambled { self.ca_select } else { 0 };
        let (nid, tid) = if self.version == 2 {
            (0, 0)
        } else {
            (tp.network_id, service.transport_stream_id)
        };
        writeln!(
            out,
            ":{}:{}:{}:{}:{}:0",
            service.teletext_pid, ca, service.service_id, nid, tid
        )
    }
}

/// One line of PIDs per service.
#[derive(Debug, Clone, Default)]
pub struct PidsFormatter;

impl ServiceFormatter for PidsFormatter {
    fn write_service(
        &self,
        out: &mut dyn Write,
        _tp: &Transponder,
        s: &Service,
    ) -> io::Result<()> {
        write!(
            out,
            "{:<24.24} (0x{:04x}) {:02x}: ",
            service_name(s),
            s.service_id,
            s.service_type
        )?;

        if s.pcr_pid == 0 || s.service_type > 2 {
            write!(out, "           ")?;
        } else if s.pcr_pid == s.video_pid {
            write!(out, "PCR == V   ")?;
        } else if s.audio.len() == 1 && s.pcr_pid == s.audio[0].pid {
            write!(out, "PCR == A   ")?;
        } else {
            write!(out, "PCR 0x{:04x} ", s.pcr_pid)?;
        }

        if s.video_pid != 0 {
            write!(out, "V 0x{:04x}", s.video_pid)?;
        } else {
            write!(out, "        ")?;
        }

        if !s.audio.is_empty() {
            write!(out, " A")?;
        }
        for audio in &s.audio {
            write!(out, " 0x{:04x}", audio.pid)?;
            match &audio.language {
                Some(lang) => write!(out, " ({:.3})", lang)?,
                None if s.audio.len() == 1 => write!(out, "      ")?,
                None => {}
            }
        }

        if s.teletext_pid != 0 {
            write!(out, " TT 0x{:04x}", s.teletext_pid)?;
        }
        if s.ac3_pid != 0 {
            write!(out, " AC3 0x{:04x}", s.ac3_pid)?;
        }
        if s.subtitling_pid != 0 {
            write!(out, " SUB 0x{:04x}", s.subtitling_pid)?;
        }
        writeln!(out)
    }
}

pub fn formatter_for(config: &ScanConfig) -> Box<dyn ServiceFormatter> {
    match config.output {
        OutputFormat::Zap => Box::new(ZapFormatter {
            sat_number: config.sat_number,
        }),
        OutputFormat::Vdr => Box::new(VdrFormatter {
            provider: config.vdr_provider,
            ca_select: config.ca_select,
            version: config.vdr_version,
            channel_numbers: config.uk_channel_numbers,
        }),
        OutputFormat::Pids => Box::new(PidsFormatter),
    }
}

/// Name services missing from the SDT after their id and strip the `:`
/// field separator from names.
pub fn prepare_names(network: &mut Network) {
    let ids = network.scanned_ids().to_vec();
    for id in ids {
        for service in &mut network.get_mut(id).services {
            let service_id = service.service_id;
            let name = service
                .service_name
                .get_or_insert_with(|| format!("[{:04x}]", service_id));
            *name = name.replace(':', " ");
            if let Some(provider) = service.provider_name.as_mut() {
                *provider = provider.replace(':', " ");
            }
        }
    }
}

/// Whether the service passes the service and CA selection.
pub fn is_selected(service: &Service, select: u8, ca_select: u16) -> bool {
    if service.is_tv() && select & service_select::TV == 0 {
        return false;
    }
    if service.is_radio() && select & service_select::RADIO == 0 {
        return false;
    }
    if !service.is_tv() && !service.is_radio() && select & service_select::OTHER == 0 {
        return false;
    }
    !(service.scrambled && ca_select == 0)
}

/// Write every selected service. Returns the number of lines written.
pub fn dump_lists(
    network: &mut Network,
    config: &ScanConfig,
    out: &mut dyn Write,
) -> io::Result<usize> {
    prepare_names(network);
    info!("dumping lists ({} services)", network.service_count());

    let formatter = formatter_for(config);
    let mut written = 0;
    for tp in network.scanned() {
        for service in &tp.services {
            if !is_selected(service, config.service_select, config.ca_select) {
                debug!("service 0x{:04x} not selected", service.service_id);
                continue;
            }
            formatter.write_service(out, tp, service)?;
            written += 1;
        }
    }
    out.flush()?;
    info!("Done.");
    Ok(written)
}
