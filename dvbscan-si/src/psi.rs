//! PSI (Program Specific Information) section parsing.
//!
//! The section filter API hands out exactly one complete section per read,
//! so a buffer is accepted only when its size matches the declared
//! `section_length` to the byte.

use crate::error::SectionError;

/// Bytes before the section_length field ends (table_id + 2 length bytes).
pub const SECTION_HEADER_SIZE: usize = 3;

/// Largest section a PSI/SI filter can deliver (12-bit length plus header).
pub const MAX_SECTION_SIZE: usize = SECTION_HEADER_SIZE + 0x0FFF;

/// Extended header (table_id_ext .. last_section_number) plus CRC32.
const EXTENDED_OVERHEAD: u16 = 5 + 4;

/// PSI section header (common to all PSI tables).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsiHeader {
    /// Table ID.
    pub table_id: u8,
    /// Section syntax indicator.
    pub section_syntax_indicator: bool,
    /// Section length (12 bits).
    pub section_length: u16,
    /// Table ID extension (for long sections).
    pub table_id_extension: u16,
    /// Version number (5 bits).
    pub version_number: u8,
    /// Current/next indicator.
    pub current_next_indicator: bool,
    /// Section number.
    pub section_number: u8,
    /// Last section number.
    pub last_section_number: u8,
}

/// A parsed PSI section borrowing the read buffer.
#[derive(Debug, Clone)]
pub struct PsiSection<'a> {
    /// Section header.
    pub header: PsiHeader,
    /// Section payload (after the header, before the CRC).
    pub data: &'a [u8],
}

impl<'a> PsiSection<'a> {
    /// Parse a PSI section from one complete read.
    ///
    /// Fails unless `data.len() == 3 + section_length`. Long-form sections
    /// must be large enough to carry the extended header and the CRC.
    pub fn parse(data: &'a [u8]) -> Result<Self, SectionError> {
        if data.len() < SECTION_HEADER_SIZE {
            return Err(SectionError::TooShort(data.len()));
        }

        let table_id = data[0];
        let section_syntax_indicator = data[1] & 0x80 != 0;
        let section_length = ((data[1] as u16 & 0x0F) << 8) | data[2] as u16;

        if data.len() != SECTION_HEADER_SIZE + section_length as usize {
            return Err(SectionError::LengthMismatch {
                declared: section_length,
                actual: data.len(),
            });
        }

        if !section_syntax_indicator {
            return Ok(PsiSection {
                header: PsiHeader {
                    table_id,
                    section_syntax_indicator,
                    section_length,
                    table_id_extension: 0,
                    version_number: 0,
                    current_next_indicator: true,
                    section_number: 0,
                    last_section_number: 0,
                },
                data: &data[SECTION_HEADER_SIZE..],
            });
        }

        if section_length < EXTENDED_OVERHEAD {
            return Err(SectionError::NoExtendedHeader(section_length));
        }

        let header = PsiHeader {
            table_id,
            section_syntax_indicator,
            section_length,
            table_id_extension: ((data[3] as u16) << 8) | data[4] as u16,
            version_number: (data[5] >> 1) & 0x1F,
            current_next_indicator: data[5] & 0x01 != 0,
            section_number: data[6],
            last_section_number: data[7],
        };

        Ok(PsiSection {
            header,
            data: &data[8..data.len() - 4],
        })
    }

    /// Parse and require a specific table id.
    pub fn parse_expecting(data: &'a [u8], table_id: u8) -> Result<Self, SectionError> {
        let section = Self::parse(data)?;
        section.expect_table(table_id)?;
        Ok(section)
    }

    /// Reject the section unless it carries `table_id`.
    pub fn expect_table(&self, table_id: u8) -> Result<(), SectionError> {
        if self.header.table_id != table_id {
            return Err(SectionError::TableIdMismatch {
                expected: table_id,
                actual: self.header.table_id,
            });
        }
        Ok(())
    }

    /// Get the total section length including header and CRC.
    pub fn total_length(&self) -> usize {
        SECTION_HEADER_SIZE + self.header.section_length as usize
    }
}

/// Read a 12-bit loop length (upper nibble of the first byte is reserved).
pub(crate) fn loop_length(hi: u8, lo: u8) -> usize {
    ((hi as usize & 0x0F) << 8) | lo as usize
}

/// Read a 13-bit PID (upper three bits of the first byte are reserved).
pub(crate) fn pid(hi: u8, lo: u8) -> u16 {
    ((hi as u16 & 0x1F) << 8) | lo as u16
}
