//! PAT (Program Association Table) parsing.
//!
//! The PAT is transmitted on PID 0x0000 and maps each service to the PID
//! carrying its PMT.

use crate::error::{Result, TableError};
use crate::psi::{self, PsiSection};
use crate::table_id;

/// A single PAT entry (program number and PMT PID).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatEntry {
    /// Program number, equal to the service_id.
    pub program_number: u16,
    /// PID of the PMT for this program.
    pub pid: u16,
}

/// Parsed PAT section.
#[derive(Debug, Clone, Default)]
pub struct PatTable {
    /// Transport stream ID.
    pub transport_stream_id: u16,
    /// Version number.
    pub version_number: u8,
    /// Programs, without the program 0 entry.
    pub programs: Vec<PatEntry>,
    /// NIT PID (program 0 entry), if present.
    pub nit_pid: Option<u16>,
}

impl PatTable {
    /// Parse a PAT from a PSI section.
    pub fn parse(section: &PsiSection) -> Result<Self> {
        section.expect_table(table_id::PAT)?;

        let data = section.data;
        if data.len() % 4 != 0 {
            return Err(TableError::Inconsistent {
                table: "PAT",
                detail: format!("program loop of {} bytes is not a multiple of 4", data.len()),
            });
        }

        let mut pat = PatTable {
            transport_stream_id: section.header.table_id_extension,
            version_number: section.header.version_number,
            programs: Vec::with_capacity(data.len() / 4),
            nit_pid: None,
        };

        for chunk in data.chunks_exact(4) {
            let program_number = u16::from_be_bytes([chunk[0], chunk[1]]);
            let pid = psi::pid(chunk[2], chunk[3]);

            if program_number == 0 {
                pat.nit_pid = Some(pid);
            } else {
                pat.programs.push(PatEntry {
                    program_number,
                    pid,
                });
            }
        }

        Ok(pat)
    }

    /// Get PMT PID for a specific program number.
    pub fn get_pmt_pid(&self, program_number: u16) -> Option<u16> {
        self.programs
            .iter()
            .find(|p| p.program_number == program_number)
            .map(|p| p.pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::tests::long_section;

    #[test]
    fn test_parse_pat() {
        let raw = long_section(
            table_id::PAT,
            0x1234,
            1,
            0,
            0,
            &[
                // NIT entry: program 0, PID 0x0010
                0x00, 0x00, 0xE0, 0x10,
                // Program 1: number=0x0101, PID=0x0100
                0x01, 0x01, 0xE1, 0x00,
                // Program 2: number=0x0102, PID=0x0200
                0x01, 0x02, 0xE2, 0x00,
            ],
        );
        let section = PsiSection::parse(&raw).unwrap();
        let pat = PatTable::parse(&section).unwrap();

        assert_eq!(pat.transport_stream_id, 0x1234);
        assert_eq!(pat.version_number, 1);
        assert_eq!(pat.nit_pid, Some(0x0010));
        assert_eq!(pat.programs.len(), 2);
        assert_eq!(pat.get_pmt_pid(0x0101), Some(0x0100));
        assert_eq!(pat.get_pmt_pid(0x0102), Some(0x0200));
        assert_eq!(pat.get_pmt_pid(0x0103), None);
    }

    #[test]
    fn test_pat_ragged_loop() {
        let raw = long_section(table_id::PAT, 1, 0, 0, 0, &[0x00, 0x64, 0xE2, 0x00, 0x00]);
        let section = PsiSection::parse(&raw).unwrap();
        assert!(matches!(
            PatTable::parse(&section),
            Err(TableError::Inconsistent { table: "PAT", .. })
        ));
    }

    #[test]
    fn test_pat_wrong_table() {
        let raw = long_section(table_id::SDT_ACTUAL, 1, 0, 0, 0, &[0x00, 0x64, 0xE2, 0x00]);
        let section = PsiSection::parse(&raw).unwrap();
        assert!(matches!(PatTable::parse(&section), Err(TableError::Section(_))));
    }
}
