//! Linux DVB frontend (`/dev/dvb/adapterN/frontendM`), legacy v3 API.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

use dvbscan_si::{
    Bandwidth, CodeRate, DeliveryKind, DeliveryParameters, GuardInterval, Hierarchy, Modulation,
    SpectralInversion, TransmissionMode,
};
use log::{debug, info};
use nix::libc;

use super::{Frontend, Lnb};
use crate::error::TunerError;
use crate::model::Transponder;

const FE_QPSK: u32 = 0;
const FE_QAM: u32 = 1;
const FE_OFDM: u32 = 2;

const FE_CAN_INVERSION_AUTO: u32 = 0x1;
const FE_HAS_LOCK: u32 = 0x10;

const SEC_VOLTAGE_13: libc::c_int = 0;
const SEC_VOLTAGE_18: libc::c_int = 1;
const SEC_TONE_ON: libc::c_int = 0;
const SEC_TONE_OFF: libc::c_int = 1;

#[repr(C)]
#[allow(dead_code)]
struct DvbFrontendInfo {
    name: [libc::c_char; 128],
    fe_type: u32,
    frequency_min: u32,
    frequency_max: u32,
    frequency_stepsize: u32,
    frequency_tolerance: u32,
    symbol_rate_min: u32,
    symbol_rate_max: u32,
    symbol_rate_tolerance: u32,
    notifier_delay: u32,
    caps: u32,
}

/// `struct dvb_frontend_parameters`; the union is at most seven words.
#[repr(C)]
#[derive(Debug, Default)]
struct DvbFrontendParameters {
    frequency: u32,
    inversion: u32,
    u: [u32; 7],
}

nix::ioctl_read!(fe_get_info, b'o', 61, DvbFrontendInfo);
nix::ioctl_write_int_bad!(fe_set_tone, nix::request_code_none!(b'o', 66));
nix::ioctl_write_int_bad!(fe_set_voltage, nix::request_code_none!(b'o', 67));
nix::ioctl_read!(fe_read_status, b'o', 69, u32);
nix::ioctl_write_ptr!(fe_set_frontend, b'o', 76, DvbFrontendParameters);

pub struct LinuxFrontend {
    file: File,
    kind: DeliveryKind,
    caps: u32,
    lnb: Lnb,
}

fn ioctl_error(op: &'static str) -> impl FnOnce(nix::errno::Errno) -> TunerError {
    move |errno| TunerError::Ioctl {
        op,
        source: io::Error::from(errno),
    }
}

impl LinuxFrontend {
    /// Open the frontend and query its type. Read-only access is enough
    /// when the device is already tuned.
    pub fn open(
        adapter: u32,
        frontend: u32,
        read_only: bool,
        lnb: Lnb,
    ) -> Result<Self, TunerError> {
        let path = PathBuf::from(format!(
            "/dev/dvb/adapter{}/frontend{}",
            adapter, frontend
        ));
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)
            .map_err(|source| TunerError::Open {
                path: path.clone(),
                source,
            })?;

        // SAFETY: an all-zero dvb_frontend_info is valid.
        let mut info: DvbFrontendInfo = unsafe { std::mem::zeroed() };
        // SAFETY: fd is open, info is a valid dvb_frontend_info.
        unsafe { fe_get_info(file.as_raw_fd(), &mut info) }.map_err(ioctl_error("FE_GET_INFO"))?;

        let kind = match info.fe_type {
            FE_QPSK => DeliveryKind::Satellite,
            FE_QAM => DeliveryKind::Cable,
            FE_OFDM => DeliveryKind::Terrestrial,
            other => return Err(TunerError::UnknownType(other)),
        };
        let name: String = info
            .name
            .iter()
            .take_while(|c| **c != 0)
            .map(|c| *c as u8 as char)
            .collect();
        info!("using '{}' ({}) on {}", name, kind, path.display());
        debug!(
            "frequency range {}..{}, symbol rate {}..{}",
            info.frequency_min, info.frequency_max, info.symbol_rate_min, info.symbol_rate_max
        );

        Ok(Self {
            file,
            kind,
            caps: info.caps,
            lnb,
        })
    }

    pub fn can_inversion_auto(&self) -> bool {
        self.caps & FE_CAN_INVERSION_AUTO != 0
    }

    fn set_lnb(&self, vertical: bool, hiband: bool) -> Result<(), TunerError> {
        let fd = self.file.as_raw_fd();
        let voltage = if vertical { SEC_VOLTAGE_13 } else { SEC_VOLTAGE_18 };
        let tone = if hiband { SEC_TONE_ON } else { SEC_TONE_OFF };
        // SAFETY: fd is open; both take an enum by value.
        unsafe { fe_set_tone(fd, SEC_TONE_OFF) }.map_err(ioctl_error("FE_SET_TONE"))?;
        unsafe { fe_set_voltage(fd, voltage) }.map_err(ioctl_error("FE_SET_VOLTAGE"))?;
        std::thread::sleep(std::time::Duration::from_millis(15));
        unsafe { fe_set_tone(fd, tone) }.map_err(ioctl_error("FE_SET_TONE"))?;
        Ok(())
    }
}

fn code_rate(value: CodeRate) -> u32 {
    match value {
        CodeRate::None => 0,
        CodeRate::Fec1_2 => 1,
        CodeRate::Fec2_3 => 2,
        CodeRate::Fec3_4 => 3,
        CodeRate::Fec4_5 => 4,
        CodeRate::Fec5_6 => 5,
        CodeRate::Fec6_7 => 6,
        CodeRate::Fec7_8 => 7,
        CodeRate::Fec8_9 => 8,
        CodeRate::Auto => 9,
    }
}

fn modulation(value: Modulation) -> u32 {
    match value {
        Modulation::Qpsk => 0,
        Modulation::Qam16 => 1,
        Modulation::Qam32 => 2,
        Modulation::Qam64 => 3,
        Modulation::Qam128 => 4,
        Modulation::Qam256 => 5,
        Modulation::Auto => 6,
    }
}

fn bandwidth(value: Bandwidth) -> u32 {
    match value {
        Bandwidth::Mhz8 => 0,
        Bandwidth::Mhz7 => 1,
        Bandwidth::Mhz6 => 2,
        Bandwidth::Auto => 3,
    }
}

fn transmission_mode(value: TransmissionMode) -> u32 {
    match value {
        TransmissionMode::Mode2k => 0,
        TransmissionMode::Mode8k => 1,
        TransmissionMode::Auto => 2,
    }
}

fn guard_interval(value: GuardInterval) -> u32 {
    match value {
        GuardInterval::G1_32 => 0,
        GuardInterval::G1_16 => 1,
        GuardInterval::G1_8 => 2,
        GuardInterval::G1_4 => 3,
        GuardInterval::Auto => 4,
    }
}

fn hierarchy(value: Hierarchy) -> u32 {
    match value {
        Hierarchy::None => 0,
        Hierarchy::H1 => 1,
        Hierarchy::H2 => 2,
        Hierarchy::H4 => 3,
        Hierarchy::Auto => 4,
    }
}

fn inversion(value: SpectralInversion) -> u32 {
    match value {
        SpectralInversion::Off => 0,
        SpectralInversion::On => 1,
        SpectralInversion::Auto => 2,
    }
}

impl Frontend for LinuxFrontend {
    fn kind(&self) -> DeliveryKind {
        self.kind
    }

    fn set_frontend(&mut self, tp: &Transponder) -> Result<(), TunerError> {
        let delivery = tp.delivery.ok_or(TunerError::NoParameters(tp.frequency))?;
        if delivery.kind() != self.kind {
            return Err(TunerError::KindMismatch {
                frontend: self.kind,
                transponder: delivery.kind(),
            });
        }

        let mut params = DvbFrontendParameters {
            frequency: tp.frequency,
            inversion: inversion(tp.inversion),
            ..Default::default()
        };
        match delivery {
            DeliveryParameters::Satellite(p) => {
                let (frequency, hiband) = self.lnb.intermediate_frequency(tp.frequency);
                self.set_lnb(p.polarisation.is_vertical(), hiband)?;
                params.frequency = frequency;
                params.u[0] = p.symbol_rate;
                params.u[1] = code_rate(p.fec_inner);
            }
            DeliveryParameters::Cable(p) => {
                params.u[0] = p.symbol_rate;
                params.u[1] = code_rate(p.fec_inner);
                params.u[2] = modulation(p.modulation);
            }
            DeliveryParameters::Terrestrial(p) => {
                params.u = [
                    bandwidth(p.bandwidth),
                    code_rate(p.code_rate_hp),
                    code_rate(p.code_rate_lp),
                    modulation(p.constellation),
                    transmission_mode(p.transmission_mode),
                    guard_interval(p.guard_interval),
                    hierarchy(p.hierarchy),
                ];
            }
        }

        debug!("FE_SET_FRONTEND {:?}", params);
        // SAFETY: fd is open, params is a valid dvb_frontend_parameters.
        unsafe { fe_set_frontend(self.file.as_raw_fd(), &params) }
            .map_err(ioctl_error("FE_SET_FRONTEND"))?;
        Ok(())
    }

    fn has_lock(&mut self) -> Result<bool, TunerError> {
        let mut status: u32 = 0;
        // SAFETY: fd is open, status is a valid fe_status_t.
        unsafe { fe_read_status(self.file.as_raw_fd(), &mut status) }
            .map_err(ioctl_error("FE_READ_STATUS"))?;
        Ok(status & FE_HAS_LOCK != 0)
    }
}
