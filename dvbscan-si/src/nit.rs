//! NIT (Network Information Table) parsing.
//!
//! The NIT is transmitted on PID 0x0010 and describes the transport
//! streams of a network together with their delivery-system parameters.

use log::debug;

use crate::descriptors::{
    CableDeliveryDescriptor, DescriptorLoop, FrequencyListDescriptor, LogicalChannel,
    LogicalChannelDescriptor, NetworkNameDescriptor, SatelliteDeliveryDescriptor,
    TerrestrialDeliveryDescriptor,
};
use crate::error::{DescriptorError, Result, TableError};
use crate::psi::{self, PsiSection};
use crate::types::DeliveryParameters;
use crate::{descriptor_tag, table_id};

/// Transport stream entry in the NIT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NitTransportStream {
    /// Transport stream ID.
    pub transport_stream_id: u16,
    /// Original network ID.
    pub original_network_id: u16,
    /// Frequency from the delivery system descriptor (kHz for satellite, Hz otherwise).
    pub frequency: u32,
    /// Delivery system parameters, if a delivery descriptor was present.
    pub delivery: Option<DeliveryParameters>,
    /// Alternate frequencies from the frequency list descriptor.
    pub alternate_frequencies: Vec<u32>,
    /// UK logical channel numbers.
    pub logical_channels: Vec<LogicalChannel>,
    /// Structural error that ended the descriptor loop early.
    pub descriptor_error: Option<DescriptorError>,
}

impl NitTransportStream {
    /// Decode the descriptors of one transport stream entry.
    ///
    /// A later delivery descriptor replaces an earlier one. Only the first
    /// frequency list is kept.
    fn apply_descriptors(&mut self, data: &[u8]) {
        for descriptor in DescriptorLoop::new(data) {
            let descriptor = match descriptor {
                Ok(d) => d,
                Err(e) => {
                    self.descriptor_error = Some(e);
                    break;
                }
            };

            let decoded = match descriptor.tag {
                descriptor_tag::SATELLITE_DELIVERY => {
                    SatelliteDeliveryDescriptor::parse(descriptor.data).map(|d| {
                        self.frequency = d.frequency;
                        self.delivery = Some(DeliveryParameters::Satellite(d.parameters));
                    })
                }
                descriptor_tag::CABLE_DELIVERY => {
                    CableDeliveryDescriptor::parse(descriptor.data).map(|d| {
                        self.frequency = d.frequency;
                        self.delivery = Some(DeliveryParameters::Cable(d.parameters));
                    })
                }
                descriptor_tag::TERRESTRIAL_DELIVERY => {
                    TerrestrialDeliveryDescriptor::parse(descriptor.data).map(|d| {
                        self.frequency = d.frequency;
                        self.delivery = Some(DeliveryParameters::Terrestrial(d.parameters));
                    })
                }
                descriptor_tag::FREQUENCY_LIST if self.alternate_frequencies.is_empty() => {
                    FrequencyListDescriptor::parse(descriptor.data)
                        .map(|d| self.alternate_frequencies = d.frequencies)
                }
                descriptor_tag::LOGICAL_CHANNEL => LogicalChannelDescriptor::parse(descriptor.data)
                    .map(|d| self.logical_channels.extend(d.channels)),
                tag => {
                    debug!("skip descriptor 0x{:02x}", tag);
                    Ok(())
                }
            };

            if let Err(e) = decoded {
                debug!(
                    "transport_stream_id 0x{:04x}: {}",
                    self.transport_stream_id, e
                );
            }
        }
    }
}

/// Parsed NIT section.
#[derive(Debug, Clone, Default)]
pub struct NitTable {
    /// Table ID (actual or other network).
    pub table_id: u8,
    /// Network ID.
    pub network_id: u16,
    /// Version number.
    pub version_number: u8,
    /// Network name (from descriptor).
    pub network_name: Option<String>,
    /// Transport stream loop.
    pub transport_streams: Vec<NitTransportStream>,
    /// Set when the transport stream loop disagreed with the section size.
    pub truncated: Option<TableError>,
}

impl NitTable {
    /// Parse a NIT (actual or other) from a PSI section.
    pub fn parse(section: &PsiSection) -> Result<Self> {
        let table = section.header.table_id;
        if table != table_id::NIT_OTHER {
            section.expect_table(table_id::NIT_ACTUAL)?;
        }

        let network_id = section.header.table_id_extension;
        let data = section.data;
        if data.len() < 2 {
            return Err(inconsistent(format!("{} bytes cannot hold a loop length", data.len())));
        }

        let network_descriptors_length = psi::loop_length(data[0], data[1]);
        if data.len() < 2 + network_descriptors_length + 2 {
            return Err(inconsistent(format!(
                "network_id 0x{:04x}: network descriptors length {} exceeds section of {} bytes",
                network_id,
                network_descriptors_length,
                data.len()
            )));
        }

        let mut network_name = None;
        for descriptor in DescriptorLoop::new(&data[2..2 + network_descriptors_length]) {
            match descriptor {
                Ok(d) if d.tag == descriptor_tag::NETWORK_NAME => {
                    network_name = NetworkNameDescriptor::parse(d.data)
                        .ok()
                        .map(|n| n.network_name);
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("network_id 0x{:04x}: {}", network_id, e);
                    break;
                }
            }
        }

        let mut nit = NitTable {
            table_id: table,
            network_id,
            version_number: section.header.version_number,
            network_name,
            transport_streams: Vec::new(),
            truncated: None,
        };

        // The transport_stream_loop_length field is not trusted; entries are
        // walked until the section ends.
        let mut offset = 2 + network_descriptors_length + 2;
        while offset + 6 <= data.len() {
            let transport_stream_id = u16::from_be_bytes([data[offset], data[offset + 1]]);
            let original_network_id = u16::from_be_bytes([data[offset + 2], data[offset + 3]]);
            let descriptors_length = psi::loop_length(data[offset + 4], data[offset + 5]);

            offset += 6;

            if offset + descriptors_length > data.len() {
                nit.truncated = Some(inconsistent(format!(
                    "transport_stream_id 0x{:04x}: descriptors length {} exceeds section",
                    transport_stream_id, descriptors_length
                )));
                break;
            }

            let mut ts = NitTransportStream {
                transport_stream_id,
                original_network_id,
                ..Default::default()
            };
            ts.apply_descriptors(&data[offset..offset + descriptors_length]);
            offset += descriptors_length;

            nit.transport_streams.push(ts);
        }

        Ok(nit)
    }

    /// Find transport stream by TSID.
    pub fn find_transport_stream(&self, tsid: u16) -> Option<&NitTransportStream> {
        self.transport_streams
            .iter()
            .find(|ts| ts.transport_stream_id == tsid)
    }
}

fn inconsistent(detail: String) -> TableError {
    TableError::Inconsistent {
        table: "NIT",
        detail,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::psi::tests::long_section;
    use crate::types::{Bandwidth, DeliveryKind, Modulation};

    /// Terrestrial delivery descriptor (8 MHz, QAM64, 8k) for `frequency` Hz.
    pub(crate) fn terrestrial_descriptor(frequency: u32) -> Vec<u8> {
        let f = (frequency / 10).to_be_bytes();
        vec![
            0x5A, 0x0B, f[0], f[1], f[2], f[3], 0x1F, 0x81, 0x02, 0xFF, 0xFF, 0xFF, 0xFF,
        ]
    }

    /// NIT payload with one network name and the given transport streams.
    pub(crate) fn nit_payload(name: &[u8], streams: &[(u16, Vec<u8>)]) -> Vec<u8> {
        let mut network = vec![0x40, name.len() as u8];
        network.extend_from_slice(name);

        let mut ts_loop = Vec::new();
        for (tsid, descriptors) in streams {
            ts_loop.extend_from_slice(&tsid.to_be_bytes());
            ts_loop.extend_from_slice(&[0x23, 0x3A]);
            ts_loop.push(0xF0 | (descriptors.len() >> 8) as u8);
            ts_loop.push(descriptors.len() as u8);
            ts_loop.extend_from_slice(descriptors);
        }

        let mut out = vec![0xF0 | (network.len() >> 8) as u8, network.len() as u8];
        out.extend_from_slice(&network);
        out.push(0xF0 | (ts_loop.len() >> 8) as u8);
        out.push(ts_loop.len() as u8);
        out.extend_from_slice(&ts_loop);
        out
    }

    #[test]
    fn test_parse_nit_terrestrial() {
        let mut descriptors = terrestrial_descriptor(506_000_000);
        let alt = (514_000_000u32 / 10).to_be_bytes();
        descriptors.extend_from_slice(&[0x62, 0x05, 0x03, alt[0], alt[1], alt[2], alt[3]]);

        let payload = nit_payload(b"TestNet", &[(500, descriptors)]);
        let raw = long_section(table_id::NIT_ACTUAL, 0x3001, 2, 0, 0, &payload);
        let section = PsiSection::parse(&raw).unwrap();
        let nit = NitTable::parse(&section).unwrap();

        assert_eq!(nit.network_id, 0x3001);
        assert_eq!(nit.network_name.as_deref(), Some("TestNet"));
        assert!(nit.truncated.is_none());

        let ts = nit.find_transport_stream(500).unwrap();
        assert_eq!(ts.original_network_id, 0x233A);
        assert_eq!(ts.frequency, 506_000_000);
        assert_eq!(ts.alternate_frequencies, vec![514_000_000]);
        match ts.delivery {
            Some(DeliveryParameters::Terrestrial(p)) => {
                assert_eq!(p.bandwidth, Bandwidth::Mhz8);
                assert_eq!(p.constellation, Modulation::Qam64);
            }
            other => panic!("unexpected delivery {:?}", other),
        }
        assert_eq!(ts.delivery.map(|d| d.kind()), Some(DeliveryKind::Terrestrial));
    }

    #[test]
    fn test_parse_nit_other() {
        let payload = nit_payload(b"Other", &[(7, terrestrial_descriptor(610_000_000))]);
        let raw = long_section(table_id::NIT_OTHER, 0x3002, 0, 0, 0, &payload);
        let section = PsiSection::parse(&raw).unwrap();
        let nit = NitTable::parse(&section).unwrap();
        assert_eq!(nit.table_id, table_id::NIT_OTHER);
        assert_eq!(nit.transport_streams.len(), 1);
    }

    #[test]
    fn test_nit_entry_overrun_keeps_earlier_entries() {
        let mut payload = nit_payload(b"N", &[(1, terrestrial_descriptor(506_000_000))]);
        // Second entry declares 0x40 bytes of descriptors with none present.
        payload.extend_from_slice(&[0x00, 0x02, 0x23, 0x3A, 0xF0, 0x40]);
        let raw = long_section(table_id::NIT_ACTUAL, 1, 0, 0, 0, &payload);
        let section = PsiSection::parse(&raw).unwrap();
        let nit = NitTable::parse(&section).unwrap();

        assert_eq!(nit.transport_streams.len(), 1);
        assert!(nit.truncated.is_some());
    }

    #[test]
    fn test_nit_network_loop_overrun() {
        let raw = long_section(table_id::NIT_ACTUAL, 1, 0, 0, 0, &[0xF0, 0x30, 0x40, 0x01, b'X']);
        let section = PsiSection::parse(&raw).unwrap();
        assert!(matches!(
            NitTable::parse(&section),
            Err(TableError::Inconsistent { table: "NIT", .. })
        ));
    }

    #[test]
    fn test_nit_zero_length_descriptor_recorded() {
        let mut descriptors = terrestrial_descriptor(506_000_000);
        descriptors.extend_from_slice(&[0x62, 0x00]);
        let payload = nit_payload(b"N", &[(1, descriptors)]);
        let raw = long_section(table_id::NIT_ACTUAL, 1, 0, 0, 0, &payload);
        let section = PsiSection::parse(&raw).unwrap();
        let nit = NitTable::parse(&section).unwrap();

        let ts = &nit.transport_streams[0];
        assert!(ts.delivery.is_some());
        assert_eq!(
            ts.descriptor_error,
            Some(DescriptorError::ZeroLength { tag: 0x62 })
        );
    }
}
