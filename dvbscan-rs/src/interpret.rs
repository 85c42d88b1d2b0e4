//! Applies decoded PAT, PMT, NIT and SDT sections to the network model.
//!
//! Sections reach the interpreter only once per `(table_id_ext, version)`
//! thanks to reassembly. Structural problems in a table are logged and the
//! section is skipped; nothing here aborts a scan.

use std::time::Duration;

use dvbscan_si::{
    table_id, DeliveryKind, NitTable, PatTable, PmtTable, PsiSection, SdtTable, StreamKind,
};
use log::{debug, error, info, warn};

use crate::model::{Network, Transponder};
use crate::scheduler::{FilterSpec, SectionHandler};

/// Settings the interpreter needs from the scan configuration.
#[derive(Debug, Clone)]
pub struct InterpretOptions {
    /// Only NIT entries for this delivery system are kept.
    pub frontend_kind: DeliveryKind,
    /// Apply UK logical channel numbers from the NIT.
    pub uk_channel_numbers: bool,
    /// Timeout of the PMT filters requested from the PAT.
    pub pmt_timeout: Duration,
}

pub struct TableInterpreter<'a> {
    network: &'a mut Network,
    options: &'a InterpretOptions,
}

impl<'a> TableInterpreter<'a> {
    pub fn new(network: &'a mut Network, options: &'a InterpretOptions) -> Self {
        Self { network, options }
    }

    fn apply_pat(
        &mut self,
        section: &PsiSection<'_>,
        requests: &mut Vec<FilterSpec>,
    ) -> dvbscan_si::Result<()> {
        let pat = PatTable::parse(section)?;
        let Some(tp) = self.network.current_mut() else {
            warn!("PAT without a current transponder");
            return Ok(());
        };

        for entry in &pat.programs {
            let service = tp.service_entry(entry.program_number);
            service.pmt_pid = entry.pid;
            service.transport_stream_id = pat.transport_stream_id;
            debug!(
                "  service 0x{:04x} pmt_pid 0x{:04x}",
                entry.program_number, entry.pid
            );

            if service.pmt_pid != 0 && !service.pmt_requested {
                service.pmt_requested = true;
                requests.push(FilterSpec::once(
                    entry.pid,
                    table_id::PMT,
                    self.options.pmt_timeout,
                ));
            }
        }
        Ok(())
    }

    fn apply_pmt(&mut self, section: &PsiSection<'_>) -> dvbscan_si::Result<()> {
        let pmt = PmtTable::parse(section)?;
        if let Some(e) = &pmt.truncated {
            warn!("service 0x{:04x}: {}", pmt.program_number, e);
        }

        let Some(service) = self
            .network
            .current_mut()
            .and_then(|tp| tp.find_service_mut(pmt.program_number))
        else {
            error!(
                "PMT for service_id 0x{:04x} which was not in the PAT",
                pmt.program_number
            );
            return Ok(());
        };

        service.pcr_pid = pmt.pcr_pid;
        // A new PMT version replaces the audio set.
        service.audio.clear();
        for stream in &pmt.streams {
            let pid = stream.elementary_pid;
            match stream.kind() {
                StreamKind::Video => {
                    if service.video_pid == 0 {
                        debug!("  VIDEO     : PID 0x{:04x}", pid);
                        service.video_pid = pid;
                    }
                }
                StreamKind::Audio { language } => {
                    debug!("  AUDIO     : PID 0x{:04x}", pid);
                    service.push_audio(pid, language);
                }
                StreamKind::Teletext => {
                    debug!("  TELETEXT  : PID 0x{:04x}", pid);
                    service.teletext_pid = pid;
                }
                StreamKind::Subtitling => {
                    debug!("  SUBTITLING: PID 0x{:04x}", pid);
                    service.subtitling_pid = pid;
                }
                StreamKind::Ac3 => {
                    debug!("  AC3       : PID 0x{:04x}", pid);
                    service.ac3_pid = pid;
                }
                StreamKind::Other => debug!(
                    "  OTHER     : PID 0x{:04x} TYPE 0x{:02x} ({})",
                    pid,
                    stream.stream_type,
                    stream.stream_type_name()
                ),
            }
        }
        Ok(())
    }

    fn apply_nit(&mut self, section: &PsiSection<'_>) -> dvbscan_si::Result<()> {
        let nit = NitTable::parse(section)?;
        if let Some(name) = &nit.network_name {
            info!("Network Name '{}'", name);
        }
        if let Some(e) = &nit.truncated {
            warn!("network_id 0x{:04x}: {}", nit.network_id, e);
        }

        for ts in &nit.transport_streams {
            if let Some(e) = &ts.descriptor_error {
                warn!(
                    "transport_stream_id 0x{:04x}: {}",
                    ts.transport_stream_id, e
                );
            }

            if self.options.uk_channel_numbers {
                for channel in &ts.logical_channels {
                    for service in self.network.scanned_services_mut(channel.service_id) {
                        debug!(
                            "  service 0x{:04x} channel {}",
                            channel.service_id, channel.channel_number
                        );
                        service.channel_num = Some(channel.channel_number);
                    }
                }
            }

            let Some(delivery) = ts.delivery else {
                continue;
            };
            if delivery.kind() != self.options.frontend_kind {
                debug!(
                    "transport_stream_id 0x{:04x}: {} entry ignored on {} frontend",
                    ts.transport_stream_id,
                    delivery.kind(),
                    self.options.frontend_kind
                );
                continue;
            }

            let mut scratch = Transponder::new(ts.frequency, Default::default());
            scratch.delivery = Some(delivery);
            scratch.network_id = nit.network_id;
            scratch.transport_stream_id = ts.transport_stream_id;
            scratch.other_frequencies = ts.alternate_frequencies.clone();

            let id = self.network.find_or_alloc(ts.frequency);
            self.network.get_mut(id).copy_description(&scratch);
        }
        Ok(())
    }

    fn apply_sdt(&mut self, section: &PsiSection<'_>) -> dvbscan_si::Result<()> {
        let sdt = SdtTable::parse(section)?;
        if let Some(e) = &sdt.truncated {
            warn!(
                "transport_stream_id 0x{:04x}: {}",
                sdt.transport_stream_id, e
            );
        }

        let Some(tp) = self.network.current_mut() else {
            warn!("SDT without a current transponder");
            return Ok(());
        };

        for entry in &sdt.services {
            let service = tp.service_entry(entry.service_id);
            service.transport_stream_id = sdt.transport_stream_id;
            service.running = entry.running_status;
            service.scrambled = entry.free_ca_mode;

            if let Some(descriptor) = &entry.service_descriptor {
                service.service_type = descriptor.service_type;
                service.provider_name = descriptor.provider_name.clone();
                service.service_name = descriptor.service_name.clone();
            }
            if !entry.ca_system_ids.is_empty() {
                service.set_ca_ids(&entry.ca_system_ids);
            }
            if let Some(e) = &entry.descriptor_error {
                warn!("service 0x{:04x}: {}", entry.service_id, e);
            }

            debug!(
                "  service 0x{:04x} '{}' running {}{}",
                entry.service_id,
                entry.get_service_name().unwrap_or(""),
                entry.running_status,
                if entry.free_ca_mode { " scrambled" } else { "" }
            );
        }
        Ok(())
    }
}

impl SectionHandler for TableInterpreter<'_> {
    fn handle(
        &mut self,
        filter: &FilterSpec,
        section: &PsiSection<'_>,
        requests: &mut Vec<FilterSpec>,
    ) {
        let table = section.header.table_id;
        let result = match table {
            table_id::PAT => self.apply_pat(section, requests),
            table_id::PMT => self.apply_pmt(section),
            table_id::NIT_ACTUAL | table_id::NIT_OTHER => self.apply_nit(section),
            table_id::SDT_ACTUAL => self.apply_sdt(section),
            _ => {
                warn!(
                    "pid 0x{:04x}: no interpreter for table_id 0x{:02x}",
                    filter.pid, table
                );
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!(
                "pid 0x{:04x} table_id 0x{:02x}: {}",
                filter.pid, table, e
            );
        }
    }
}
