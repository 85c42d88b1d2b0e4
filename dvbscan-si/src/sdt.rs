//! SDT (Service Description Table) parsing.
//!
//! The SDT is transmitted on PID 0x0011 and carries service names,
//! running status and CA information for the services of a transport
//! stream.

use log::debug;

use crate::descriptors::{CaIdentifierDescriptor, DescriptorLoop, ServiceDescriptor};
use crate::error::{DescriptorError, Result, TableError};
use crate::psi::{self, PsiSection};
use crate::types::RunningStatus;
use crate::{descriptor_tag, table_id};

/// Service entry in the SDT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SdtService {
    /// Service ID (program number).
    pub service_id: u16,
    /// EIT schedule flag.
    pub eit_schedule_flag: bool,
    /// EIT present/following flag.
    pub eit_present_following_flag: bool,
    pub running_status: RunningStatus,
    /// Free CA mode: set when at least one component is scrambled.
    pub free_ca_mode: bool,
    /// Parsed service descriptor.
    pub service_descriptor: Option<ServiceDescriptor>,
    /// CA system ids from all CA identifier descriptors, in order.
    pub ca_system_ids: Vec<u16>,
    /// Structural error that ended the descriptor loop early.
    pub descriptor_error: Option<DescriptorError>,
}

impl SdtService {
    fn apply_descriptors(&mut self, data: &[u8]) {
        for descriptor in DescriptorLoop::new(data) {
            let descriptor = match descriptor {
                Ok(d) => d,
                Err(e) => {
                    self.descriptor_error = Some(e);
                    break;
                }
            };

            match descriptor.tag {
                descriptor_tag::SERVICE => match ServiceDescriptor::parse(descriptor.data) {
                    Ok(d) => self.service_descriptor = Some(d),
                    Err(e) => debug!("service_id 0x{:04x}: {}", self.service_id, e),
                },
                descriptor_tag::CA_IDENTIFIER => {
                    if let Ok(d) = CaIdentifierDescriptor::parse(descriptor.data) {
                        self.ca_system_ids.extend(d.ca_system_ids);
                    }
                }
                tag => debug!("skip descriptor 0x{:02x}", tag),
            }
        }
    }

    /// Get service name (from service descriptor).
    pub fn get_service_name(&self) -> Option<&str> {
        self.service_descriptor
            .as_ref()
            .and_then(|d| d.service_name.as_deref())
    }

    /// Get provider name (from service descriptor).
    pub fn get_provider_name(&self) -> Option<&str> {
        self.service_descriptor
            .as_ref()
            .and_then(|d| d.provider_name.as_deref())
    }

    /// Get service type (from service descriptor).
    pub fn get_service_type(&self) -> Option<u8> {
        self.service_descriptor.as_ref().map(|d| d.service_type)
    }
}

/// Parsed SDT section.
#[derive(Debug, Clone, Default)]
pub struct SdtTable {
    /// Transport stream ID.
    pub transport_stream_id: u16,
    /// Original network ID.
    pub original_network_id: u16,
    /// Version number.
    pub version_number: u8,
    /// Services.
    pub services: Vec<SdtService>,
    /// Set when a service entry stopped the walk.
    pub truncated: Option<TableError>,
}

impl SdtTable {
    /// Parse an SDT (actual or other) from a PSI section.
    ///
    /// A service whose descriptor loop is empty or runs past the section
    /// ends the walk.
    pub fn parse(section: &PsiSection) -> Result<Self> {
        if section.header.table_id != table_id::SDT_OTHER {
            section.expect_table(table_id::SDT_ACTUAL)?;
        }

        let data = section.data;
        if data.len() < 3 {
            return Err(TableError::Inconsistent {
                table: "SDT",
                detail: format!("{} bytes cannot hold original_network_id", data.len()),
            });
        }

        let mut sdt = SdtTable {
            transport_stream_id: section.header.table_id_extension,
            original_network_id: u16::from_be_bytes([data[0], data[1]]),
            version_number: section.header.version_number,
            services: Vec::new(),
            truncated: None,
        };

        // Skip original_network_id and the reserved byte.
        let mut offset = 3;
        while offset + 5 <= data.len() {
            let service_id = u16::from_be_bytes([data[offset], data[offset + 1]]);
            let flags = data[offset + 2];
            let status = data[offset + 3];
            let descriptors_length = psi::loop_length(data[offset + 3], data[offset + 4]);

            offset += 5;

            if descriptors_length == 0 || offset + descriptors_length > data.len() {
                sdt.truncated = Some(TableError::Inconsistent {
                    table: "SDT",
                    detail: format!(
                        "service_id 0x{:04x}: descriptors length {}, {} bytes left",
                        service_id,
                        descriptors_length,
                        data.len() - offset
                    ),
                });
                break;
            }

            let mut service = SdtService {
                service_id,
                eit_schedule_flag: flags & 0x02 != 0,
                eit_present_following_flag: flags & 0x01 != 0,
                running_status: RunningStatus::from_bits(status >> 5),
                free_ca_mode: status & 0x10 != 0,
                ..Default::default()
            };
            service.apply_descriptors(&data[offset..offset + descriptors_length]);
            offset += descriptors_length;

            sdt.services.push(service);
        }

        Ok(sdt)
    }

    /// Find a service by service_id.
    pub fn find_service(&self, service_id: u16) -> Option<&SdtService> {
        self.services.iter().find(|s| s.service_id == service_id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::psi::tests::long_section;

    /// One SDT service entry with a service descriptor.
    pub(crate) fn sdt_service(
        service_id: u16,
        running: u8,
        scrambled: bool,
        provider: &[u8],
        name: &[u8],
    ) -> Vec<u8> {
        let mut descriptor = vec![0x48, (3 + provider.len() + name.len()) as u8, 0x01];
        descriptor.push(provider.len() as u8);
        descriptor.extend_from_slice(provider);
        descriptor.push(name.len() as u8);
        descriptor.extend_from_slice(name);

        let mut out = service_id.to_be_bytes().to_vec();
        let free_ca: u8 = if scrambled { 0x10 } else { 0 };
        out.push(0xFC);
        out.push((running << 5) | free_ca | (descriptor.len() >> 8) as u8);
        out.push(descriptor.len() as u8);
        out.extend_from_slice(&descriptor);
        out
    }

    #[test]
    fn test_parse_sdt() {
        let mut payload = vec![0x23, 0x3A, 0xFF];
        payload.extend(sdt_service(100, 4, false, b"ProviderX", b"ServiceY"));
        payload.extend(sdt_service(101, 1, true, b"ProviderX", b"Pay"));
        let raw = long_section(table_id::SDT_ACTUAL, 0x0401, 3, 0, 0, &payload);
        let section = PsiSection::parse(&raw).unwrap();
        let sdt = SdtTable::parse(&section).unwrap();

        assert_eq!(sdt.transport_stream_id, 0x0401);
        assert_eq!(sdt.original_network_id, 0x233A);
        assert_eq!(sdt.services.len(), 2);
        assert!(sdt.truncated.is_none());

        let s = sdt.find_service(100).unwrap();
        assert_eq!(s.running_status, RunningStatus::Running);
        assert!(!s.free_ca_mode);
        assert_eq!(s.get_provider_name(), Some("ProviderX"));
        assert_eq!(s.get_service_name(), Some("ServiceY"));
        assert_eq!(s.get_service_type(), Some(0x01));

        let s = sdt.find_service(101).unwrap();
        assert_eq!(s.running_status, RunningStatus::NotRunning);
        assert!(s.free_ca_mode);
    }

    #[test]
    fn test_sdt_ca_identifiers() {
        let mut payload = vec![0x23, 0x3A, 0xFF];
        payload.extend_from_slice(&[0x00, 0x64, 0xFC, 0x90, 0x06, 0x53, 0x04, 0x17, 0x02, 0x09, 0x63]);
        let raw = long_section(table_id::SDT_ACTUAL, 1, 0, 0, 0, &payload);
        let section = PsiSection::parse(&raw).unwrap();
        let sdt = SdtTable::parse(&section).unwrap();

        assert_eq!(sdt.services[0].ca_system_ids, vec![0x1702, 0x0963]);
        assert!(sdt.services[0].service_descriptor.is_none());
    }

    #[test]
    fn test_sdt_empty_descriptor_loop_stops_walk() {
        let mut payload = vec![0x23, 0x3A, 0xFF];
        payload.extend(sdt_service(100, 4, false, b"P", b"A"));
        payload.extend_from_slice(&[0x00, 0x65, 0xFC, 0x80, 0x00]);
        payload.extend(sdt_service(102, 4, false, b"P", b"C"));
        let raw = long_section(table_id::SDT_ACTUAL, 1, 0, 0, 0, &payload);
        let section = PsiSection::parse(&raw).unwrap();
        let sdt = SdtTable::parse(&section).unwrap();

        assert_eq!(sdt.services.len(), 1);
        assert!(sdt.truncated.is_some());
    }
}
