//! Descriptor parsing for PSI/SI tables.
//!
//! This module handles the descriptor loops found in PMT, NIT and SDT
//! sections and decodes the descriptors a scanner acts upon into owned
//! structs. All bit and offset arithmetic stays in here.

use crate::descriptor_tag;
use crate::error::DescriptorError;
use crate::types::{
    Bandwidth, CableParameters, CodeRate, GuardInterval, Hierarchy, Modulation, Polarisation,
    SatelliteParameters, TerrestrialParameters, TransmissionMode,
};

/// One raw descriptor borrowed from a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor<'a> {
    pub tag: u8,
    pub data: &'a [u8],
}

/// Lazy walk over a descriptor loop.
///
/// Yields an error for a zero-length descriptor or for one whose declared
/// length runs past the end of the loop, and yields nothing afterwards.
#[derive(Debug, Clone)]
pub struct DescriptorLoop<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> DescriptorLoop<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for DescriptorLoop<'a> {
    type Item = Result<Descriptor<'a>, DescriptorError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }

        let remaining = self.data.len() - self.offset;
        let tag = self.data[self.offset];
        if remaining < 2 {
            self.failed = true;
            return Some(Err(DescriptorError::Overrun {
                tag,
                declared: 0,
                remaining: 0,
            }));
        }

        let length = self.data[self.offset + 1] as usize;
        if length == 0 {
            self.failed = true;
            return Some(Err(DescriptorError::ZeroLength { tag }));
        }
        if length > remaining - 2 {
            self.failed = true;
            return Some(Err(DescriptorError::Overrun {
                tag,
                declared: length,
                remaining: remaining - 2,
            }));
        }

        let start = self.offset + 2;
        self.offset = start + length;
        Some(Ok(Descriptor {
            tag,
            data: &self.data[start..start + length],
        }))
    }
}

impl std::iter::FusedIterator for DescriptorLoop<'_> {}

/// Find a specific descriptor in a descriptor loop.
///
/// The search stops at the first structural error.
pub fn find_descriptor(data: &[u8], tag: u8) -> Option<&[u8]> {
    DescriptorLoop::new(data)
        .map_while(|d| d.ok())
        .find(|d| d.tag == tag)
        .map(|d| d.data)
}

/// Whether a descriptor with `tag` appears before any structural error.
pub fn has_descriptor(data: &[u8], tag: u8) -> bool {
    find_descriptor(data, tag).is_some()
}

fn require(tag: u8, data: &[u8], min: usize) -> Result<(), DescriptorError> {
    if data.len() < min {
        return Err(DescriptorError::TooShort {
            tag,
            len: data.len(),
        });
    }
    Ok(())
}

/// Network name descriptor (0x40).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkNameDescriptor {
    pub network_name: String,
}

impl NetworkNameDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, DescriptorError> {
        Ok(NetworkNameDescriptor {
            network_name: decode_dvb_string(data),
        })
    }
}

/// Satellite delivery system descriptor (0x43).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SatelliteDeliveryDescriptor {
    /// Frequency in kHz.
    pub frequency: u32,
    pub parameters: SatelliteParameters,
}

impl SatelliteDeliveryDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, DescriptorError> {
        require(descriptor_tag::SATELLITE_DELIVERY, data, 11)?;

        // Frequency: 8 BCD digits in 10 kHz units.
        let frequency = 10 * bcd_to_u32(&data[0..4]);
        let orbital_position = bcd_to_u32(&data[4..6]) as u16;

        Ok(SatelliteDeliveryDescriptor {
            frequency,
            parameters: SatelliteParameters {
                symbol_rate: symbol_rate(&data[7..11]),
                fec_inner: CodeRate::from_inner_bits(data[10]),
                polarisation: Polarisation::from_bits(data[6] >> 5),
                orbital_position,
                west_east: data[6] & 0x80 != 0,
            },
        })
    }
}

/// Cable delivery system descriptor (0x44).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CableDeliveryDescriptor {
    /// Frequency in Hz.
    pub frequency: u32,
    pub parameters: CableParameters,
}

impl CableDeliveryDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, DescriptorError> {
        require(descriptor_tag::CABLE_DELIVERY, data, 11)?;

        // Frequency: 8 BCD digits in 100 Hz units.
        let frequency = 100 * bcd_to_u32(&data[0..4]);

        Ok(CableDeliveryDescriptor {
            frequency,
            parameters: CableParameters {
                symbol_rate: symbol_rate(&data[7..11]),
                fec_inner: CodeRate::from_inner_bits(data[10]),
                modulation: Modulation::from_cable_bits(data[6]),
            },
        })
    }
}

/// Terrestrial delivery system descriptor (0x5A).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerrestrialDeliveryDescriptor {
    /// Centre frequency in Hz.
    pub frequency: u32,
    pub parameters: TerrestrialParameters,
}

impl TerrestrialDeliveryDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, DescriptorError> {
        require(descriptor_tag::TERRESTRIAL_DELIVERY, data, 7)?;

        // Centre frequency is binary, in 10 Hz units.
        let raw = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);

        let transmission_mode = if data[6] & 0x02 != 0 {
            TransmissionMode::Mode8k
        } else {
            TransmissionMode::Mode2k
        };

        Ok(TerrestrialDeliveryDescriptor {
            frequency: raw.wrapping_mul(10),
            parameters: TerrestrialParameters {
                bandwidth: Bandwidth::from_bits(data[4] >> 5),
                code_rate_hp: CodeRate::from_terrestrial_bits(data[5]),
                code_rate_lp: CodeRate::from_terrestrial_bits(data[6] >> 5),
                constellation: Modulation::from_constellation_bits(data[5] >> 6),
                transmission_mode,
                guard_interval: GuardInterval::from_bits(data[6] >> 3),
                hierarchy: Hierarchy::from_bits(data[5] >> 3),
                other_frequency_flag: data[6] & 0x01 != 0,
            },
        })
    }
}

/// Frequency list descriptor (0x62).
///
/// Only the terrestrial coding (`coding_type == 3`) yields frequencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyListDescriptor {
    pub coding_type: u8,
    /// Alternate centre frequencies in Hz, in descriptor order.
    pub frequencies: Vec<u32>,
}

impl FrequencyListDescriptor {
    pub const CODING_TERRESTRIAL: u8 = 3;

    pub fn parse(data: &[u8]) -> Result<Self, DescriptorError> {
        require(descriptor_tag::FREQUENCY_LIST, data, 1)?;

        let coding_type = data[0] & 0x03;
        let frequencies = if coding_type == Self::CODING_TERRESTRIAL {
            data[1..]
                .chunks_exact(4)
                .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]).wrapping_mul(10))
                .collect()
        } else {
            Vec::new()
        };

        Ok(FrequencyListDescriptor {
            coding_type,
            frequencies,
        })
    }
}

/// Service descriptor (0x48).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub service_type: u8,
    /// Provider name with control characters removed; `None` when empty.
    pub provider_name: Option<String>,
    /// Service name with control characters removed; `None` when empty.
    pub service_name: Option<String>,
}

impl ServiceDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, DescriptorError> {
        let tag = descriptor_tag::SERVICE;
        require(tag, data, 2)?;

        let service_type = data[0];
        let provider_len = data[1] as usize;
        let provider_end = 2 + provider_len;
        require(tag, data, provider_end + 1)?;

        let service_len = data[provider_end] as usize;
        let service_start = provider_end + 1;
        require(tag, data, service_start + service_len)?;

        Ok(ServiceDescriptor {
            service_type,
            provider_name: non_empty(strip_control(&data[2..provider_end])),
            service_name: non_empty(strip_control(
                &data[service_start..service_start + service_len],
            )),
        })
    }

    /// Get human-readable service type name.
    pub fn service_type_name(&self) -> &'static str {
        match self.service_type {
            0x01 => "Digital TV",
            0x02 => "Digital Radio",
            0x03 => "Teletext",
            0x0A => "Advanced Codec Radio",
            0x0C => "Data Service",
            0x11 => "MPEG-2 HD TV",
            0x16 => "Advanced Codec SD TV",
            0x19 => "Advanced Codec HD TV",
            _ => "Unknown",
        }
    }
}

/// CA identifier descriptor (0x53).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaIdentifierDescriptor {
    pub ca_system_ids: Vec<u16>,
}

impl CaIdentifierDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, DescriptorError> {
        Ok(CaIdentifierDescriptor {
            ca_system_ids: data
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect(),
        })
    }
}

/// ISO 639 language descriptor (0x0A). Only the first entry is decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iso639LanguageDescriptor {
    pub language: String,
    pub audio_type: u8,
}

impl Iso639LanguageDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, DescriptorError> {
        require(descriptor_tag::ISO_639_LANGUAGE, data, 4)?;
        Ok(Iso639LanguageDescriptor {
            language: data[0..3].iter().map(|&b| b as char).collect(),
            audio_type: data[3],
        })
    }
}

/// One entry of the UK logical channel descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalChannel {
    pub service_id: u16,
    pub visible: bool,
    pub channel_number: u16,
}

/// UK DTT logical channel descriptor (private tag 0x83).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogicalChannelDescriptor {
    pub channels: Vec<LogicalChannel>,
}

impl LogicalChannelDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, DescriptorError> {
        Ok(LogicalChannelDescriptor {
            channels: data
                .chunks_exact(4)
                .map(|c| LogicalChannel {
                    service_id: u16::from_be_bytes([c[0], c[1]]),
                    visible: c[2] & 0x80 != 0,
                    channel_number: ((c[2] as u16 & 0x03) << 8) | c[3] as u16,
                })
                .collect(),
        })
    }
}

/// Convert BCD bytes to u32, two digits per byte.
pub fn bcd_to_u32(data: &[u8]) -> u32 {
    let mut result = 0u32;
    for &byte in data {
        let high = (byte >> 4) as u32;
        let low = (byte & 0x0F) as u32;
        result = result.wrapping_mul(100).wrapping_add(high * 10 + low);
    }
    result
}

/// Seven BCD digits followed by the FEC nibble, in 100 symbol/s units.
fn symbol_rate(data: &[u8]) -> u32 {
    10 * bcd_to_u32(&[data[0], data[1], data[2], data[3] & 0xF0])
}

/// Drop C0 and C1 control codes (which also removes a leading charset byte).
fn strip_control(data: &[u8]) -> Vec<u8> {
    data.iter()
        .copied()
        .filter(|&b| b >= 0x20 && !(0x80..=0x9F).contains(&b))
        .collect()
}

fn non_empty(bytes: Vec<u8>) -> Option<String> {
    if bytes.is_empty() {
        None
    } else {
        Some(decode_bytes(bytes))
    }
}

/// Decode a DVB text field: UTF-8 when valid, Latin-1 otherwise.
pub fn decode_dvb_string(data: &[u8]) -> String {
    decode_bytes(strip_control(data))
}

fn decode_bytes(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Polarisation, SpectralInversion};

    #[test]
    fn test_descriptor_loop() {
        let data = [
            0x48, 0x02, 0xAA, 0xBB, // Service descriptor, length 2
            0x40, 0x03, 0xCC, 0xDD, 0xEE, // Network name, length 3
        ];

        let descriptors: Vec<_> = DescriptorLoop::new(&data).collect::<Result<_, _>>().unwrap();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].tag, 0x48);
        assert_eq!(descriptors[0].data, &[0xAA, 0xBB]);
        assert_eq!(descriptors[1].tag, 0x40);
        assert_eq!(descriptors[1].data, &[0xCC, 0xDD, 0xEE]);
    }

    #[test]
    fn test_descriptor_loop_overrun_is_fused() {
        let data = [0x40, 0x01, 0x41, 0x48, 0x05, 0x00, 0x00];
        let mut walk = DescriptorLoop::new(&data);

        assert!(walk.next().unwrap().is_ok());
        assert_eq!(
            walk.next().unwrap(),
            Err(DescriptorError::Overrun {
                tag: 0x48,
                declared: 5,
                remaining: 2
            })
        );
        assert!(walk.next().is_none());
        assert!(walk.next().is_none());
    }

    #[test]
    fn test_descriptor_loop_zero_length() {
        let data = [0x0A, 0x00, 0x40, 0x01, 0x41];
        let mut walk = DescriptorLoop::new(&data);
        assert_eq!(walk.next().unwrap(), Err(DescriptorError::ZeroLength { tag: 0x0A }));
        assert!(walk.next().is_none());
    }

    #[test]
    fn test_descriptor_loop_dangling_tag() {
        let data = [0x40, 0x01, 0x41, 0x48];
        let results: Vec<_> = DescriptorLoop::new(&data).collect();
        assert_eq!(results.len(), 2);
        assert!(results[1].is_err());
    }

    #[test]
    fn test_find_descriptor() {
        let data = [0x48, 0x02, 0xAA, 0xBB, 0x40, 0x03, 0xCC, 0xDD, 0xEE];

        assert_eq!(find_descriptor(&data, 0x40), Some(&[0xCC, 0xDD, 0xEE][..]));
        assert!(find_descriptor(&data, 0x99).is_none());
        assert!(has_descriptor(&data, 0x48));
    }

    #[test]
    fn test_parse_service_descriptor() {
        let data = [
            0x01, // service_type = Digital TV
            0x04, b'T', b'E', b'S', b'T', // provider_name = "TEST"
            0x07, b'C', b'H', b' ', b'N', b'A', b'M', b'E', // service_name = "CH NAME"
        ];

        let desc = ServiceDescriptor::parse(&data).unwrap();
        assert_eq!(desc.service_type, 0x01);
        assert_eq!(desc.provider_name.as_deref(), Some("TEST"));
        assert_eq!(desc.service_name.as_deref(), Some("CH NAME"));
        assert_eq!(desc.service_type_name(), "Digital TV");
    }

    #[test]
    fn test_service_descriptor_strips_control_codes() {
        // Leading charset selector 0x05, emphasis codes 0x86/0x87.
        let data = [
            0x02, 0x00, 0x07, 0x05, 0x86, b'R', b'a', 0x87, b'd', b'1',
        ];
        let desc = ServiceDescriptor::parse(&data).unwrap();
        assert_eq!(desc.provider_name, None);
        assert_eq!(desc.service_name.as_deref(), Some("Rad1"));
    }

    #[test]
    fn test_service_descriptor_latin1_fallback() {
        let data = [0x01, 0x00, 0x03, b'T', 0xE9, b'l'];
        let desc = ServiceDescriptor::parse(&data).unwrap();
        assert_eq!(desc.service_name.as_deref(), Some("T\u{e9}l"));
    }

    #[test]
    fn test_service_descriptor_truncated() {
        let data = [0x01, 0x04, b'T', b'E'];
        assert!(matches!(
            ServiceDescriptor::parse(&data),
            Err(DescriptorError::TooShort { tag: 0x48, .. })
        ));
    }

    #[test]
    fn test_parse_network_name_descriptor() {
        let desc = NetworkNameDescriptor::parse(b"Network1").unwrap();
        assert_eq!(desc.network_name, "Network1");
    }

    #[test]
    fn test_parse_satellite_delivery() {
        // 11.778 GHz, 19.2E, vertical, 27500 ksym/s, FEC 3/4
        let data = [
            0x01, 0x17, 0x78, 0x00, 0x01, 0x92, 0x22, 0x02, 0x75, 0x00, 0x03,
        ];
        let desc = SatelliteDeliveryDescriptor::parse(&data).unwrap();
        assert_eq!(desc.frequency, 11_778_000);
        assert_eq!(desc.parameters.orbital_position, 192);
        assert!(!desc.parameters.west_east);
        assert_eq!(desc.parameters.polarisation, Polarisation::Vertical);
        assert_eq!(desc.parameters.symbol_rate, 27_500_000);
        assert_eq!(desc.parameters.fec_inner, CodeRate::Fec3_4);
    }

    #[test]
    fn test_parse_cable_delivery() {
        // 346 MHz, QAM64, 6900 ksym/s, FEC auto
        let data = [
            0x03, 0x46, 0x00, 0x00, 0xFF, 0xF2, 0x03, 0x00, 0x69, 0x00, 0x00,
        ];
        let desc = CableDeliveryDescriptor::parse(&data).unwrap();
        assert_eq!(desc.frequency, 346_000_000);
        assert_eq!(desc.parameters.modulation, Modulation::Qam64);
        assert_eq!(desc.parameters.symbol_rate, 6_900_000);
        assert_eq!(desc.parameters.fec_inner, CodeRate::Auto);
    }

    #[test]
    fn test_parse_terrestrial_delivery() {
        // 506 MHz, 8 MHz, QAM64, HP 2/3, LP 1/2, guard 1/32, 8k, no hierarchy
        let freq = (506_000_000u32 / 10).to_be_bytes();
        let data = [
            freq[0], freq[1], freq[2], freq[3], 0x1F, 0x81, 0x03, 0xFF, 0xFF, 0xFF, 0xFF,
        ];
        let desc = TerrestrialDeliveryDescriptor::parse(&data).unwrap();
        let p = desc.parameters;
        assert_eq!(desc.frequency, 506_000_000);
        assert_eq!(p.bandwidth, Bandwidth::Mhz8);
        assert_eq!(p.constellation, Modulation::Qam64);
        assert_eq!(p.hierarchy, Hierarchy::None);
        assert_eq!(p.code_rate_hp, CodeRate::Fec2_3);
        assert_eq!(p.code_rate_lp, CodeRate::Fec1_2);
        assert_eq!(p.guard_interval, GuardInterval::G1_32);
        assert_eq!(p.transmission_mode, TransmissionMode::Mode8k);
        assert!(p.other_frequency_flag);
        assert_eq!(SpectralInversion::default(), SpectralInversion::Auto);
    }

    #[test]
    fn test_parse_frequency_list() {
        let a = (498_000_000u32 / 10).to_be_bytes();
        let b = (522_000_000u32 / 10).to_be_bytes();
        let data = [0xFF, a[0], a[1], a[2], a[3], b[0], b[1], b[2], b[3]];
        let desc = FrequencyListDescriptor::parse(&data).unwrap();
        assert_eq!(desc.coding_type, 3);
        assert_eq!(desc.frequencies, vec![498_000_000, 522_000_000]);

        // Satellite coding is not decoded.
        let desc = FrequencyListDescriptor::parse(&[0xFD, 0x01, 0x17, 0x78, 0x00]).unwrap();
        assert!(desc.frequencies.is_empty());
    }

    #[test]
    fn test_parse_ca_identifier() {
        let desc = CaIdentifierDescriptor::parse(&[0x17, 0x02, 0x09, 0x63, 0xFF]).unwrap();
        assert_eq!(desc.ca_system_ids, vec![0x1702, 0x0963]);
    }

    #[test]
    fn test_parse_iso639() {
        let desc = Iso639LanguageDescriptor::parse(b"eng\x00").unwrap();
        assert_eq!(desc.language, "eng");
        assert!(Iso639LanguageDescriptor::parse(b"en").is_err());
    }

    #[test]
    fn test_parse_logical_channel() {
        let data = [0x10, 0x44, 0xFC, 0x01, 0x10, 0x80, 0xFE, 0x15];
        let desc = LogicalChannelDescriptor::parse(&data).unwrap();
        assert_eq!(
            desc.channels,
            vec![
                LogicalChannel {
                    service_id: 0x1044,
                    visible: true,
                    channel_number: 1
                },
                LogicalChannel {
                    service_id: 0x1080,
                    visible: true,
                    channel_number: 0x215
                },
            ]
        );
    }

    #[test]
    fn test_bcd_to_u32() {
        assert_eq!(bcd_to_u32(&[0x12, 0x34]), 1234);
        assert_eq!(bcd_to_u32(&[0x00, 0x01]), 1);
        assert_eq!(bcd_to_u32(&[0x99, 0x99]), 9999);
    }
}
