//! Section and descriptor decoders for DVB PSI/SI tables.
//!
//! This crate turns raw section buffers, as delivered one at a time by a
//! hardware section filter, into typed views of the tables a network
//! scanner needs. It performs no I/O.
//!
//! # Supported Tables
//! - PAT (Program Association Table) - PID 0x0000
//! - PMT (Program Map Table) - Variable PIDs from PAT
//! - NIT (Network Information Table) - PID 0x0010, actual (0x40) and other (0x41)
//! - SDT (Service Description Table) - PID 0x0011, actual (0x42)
//!
//! # Usage
//! ```ignore
//! use dvbscan_si::{PsiSection, PatTable, table_id};
//!
//! let section = PsiSection::parse_expecting(&buf[..len], table_id::PAT)?;
//! for entry in PatTable::parse(&section)?.programs {
//!     println!("service 0x{:04x} -> PMT pid 0x{:04x}", entry.program_number, entry.pid);
//! }
//! ```
//!
//! Loops inside a section (elementary streams, transport streams, services)
//! are decoded up to the first inconsistency. The entries before it are
//! kept and the problem is reported in the table's `truncated` field.

pub mod descriptors;
pub mod error;
pub mod nit;
pub mod pat;
pub mod pmt;
pub mod psi;
pub mod sdt;
pub mod types;

pub use descriptors::{
    find_descriptor, has_descriptor, CableDeliveryDescriptor, CaIdentifierDescriptor, Descriptor,
    DescriptorLoop, FrequencyListDescriptor, Iso639LanguageDescriptor, LogicalChannel,
    LogicalChannelDescriptor, NetworkNameDescriptor, SatelliteDeliveryDescriptor,
    ServiceDescriptor, TerrestrialDeliveryDescriptor,
};
pub use error::{DescriptorError, Result, SectionError, TableError};
pub use nit::{NitTable, NitTransportStream};
pub use pat::{PatEntry, PatTable};
pub use pmt::{PmtStream, PmtTable, StreamKind};
pub use psi::{PsiHeader, PsiSection, MAX_SECTION_SIZE};
pub use sdt::{SdtService, SdtTable};
pub use types::*;

/// Well-known PIDs.
pub mod pid {
    /// Program Association Table PID.
    pub const PAT: u16 = 0x0000;
    /// Network Information Table PID.
    pub const NIT: u16 = 0x0010;
    /// Service Description Table PID.
    pub const SDT: u16 = 0x0011;
}

/// Table IDs for PSI/SI tables.
pub mod table_id {
    /// Program Association Section.
    pub const PAT: u8 = 0x00;
    /// Program Map Section.
    pub const PMT: u8 = 0x02;
    /// Network Information Section - actual.
    pub const NIT_ACTUAL: u8 = 0x40;
    /// Network Information Section - other.
    pub const NIT_OTHER: u8 = 0x41;
    /// Service Description Section - actual.
    pub const SDT_ACTUAL: u8 = 0x42;
    /// Service Description Section - other.
    pub const SDT_OTHER: u8 = 0x46;
}

/// Descriptor tags used in PSI/SI tables.
pub mod descriptor_tag {
    /// ISO 639 language descriptor.
    pub const ISO_639_LANGUAGE: u8 = 0x0A;
    /// Network name descriptor.
    pub const NETWORK_NAME: u8 = 0x40;
    /// Satellite delivery system descriptor.
    pub const SATELLITE_DELIVERY: u8 = 0x43;
    /// Cable delivery system descriptor.
    pub const CABLE_DELIVERY: u8 = 0x44;
    /// Service descriptor.
    pub const SERVICE: u8 = 0x48;
    /// CA identifier descriptor.
    pub const CA_IDENTIFIER: u8 = 0x53;
    /// Teletext descriptor.
    pub const TELETEXT: u8 = 0x56;
    /// Subtitling descriptor.
    pub const SUBTITLING: u8 = 0x59;
    /// Terrestrial delivery system descriptor.
    pub const TERRESTRIAL_DELIVERY: u8 = 0x5A;
    /// Frequency list descriptor.
    pub const FREQUENCY_LIST: u8 = 0x62;
    /// AC-3 descriptor.
    pub const AC3: u8 = 0x6A;
    /// Logical channel number descriptor (UK DTT private range).
    pub const LOGICAL_CHANNEL: u8 = 0x83;
}
