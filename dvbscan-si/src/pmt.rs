//! PMT (Program Map Table) parsing.
//!
//! The PMT lists the elementary streams of one service. Streams are
//! classified the way a channel list needs them: one video PID, a list of
//! audio PIDs with languages, and teletext/subtitling/AC-3 PIDs recognised
//! from their descriptors.

use crate::descriptors::{find_descriptor, has_descriptor, Iso639LanguageDescriptor};
use crate::error::{Result, TableError};
use crate::psi::{self, PsiSection};
use crate::{descriptor_tag, table_id};

/// Stream type constants.
pub mod stream_type {
    /// MPEG-1 Video.
    pub const MPEG1_VIDEO: u8 = 0x01;
    /// MPEG-2 Video.
    pub const MPEG2_VIDEO: u8 = 0x02;
    /// MPEG-1 Audio.
    pub const MPEG1_AUDIO: u8 = 0x03;
    /// MPEG-2 Audio.
    pub const MPEG2_AUDIO: u8 = 0x04;
    /// MPEG-2 PES Private Data.
    pub const PES_PRIVATE_DATA: u8 = 0x06;
}

/// What a scanner records for an elementary stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio { language: Option<String> },
    Teletext,
    Subtitling,
    Ac3,
    Other,
}

/// A single elementary stream entry in the PMT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtStream {
    /// Stream type.
    pub stream_type: u8,
    /// Elementary PID.
    pub elementary_pid: u16,
    /// ES info descriptors.
    pub descriptors: Vec<u8>,
}

impl PmtStream {
    /// Classify the stream by type, then by descriptor for private data.
    ///
    /// Private data streams are checked for teletext, then subtitling,
    /// then AC-3.
    pub fn kind(&self) -> StreamKind {
        match self.stream_type {
            stream_type::MPEG1_VIDEO | stream_type::MPEG2_VIDEO => StreamKind::Video,
            stream_type::MPEG1_AUDIO | stream_type::MPEG2_AUDIO => StreamKind::Audio {
                language: find_descriptor(&self.descriptors, descriptor_tag::ISO_639_LANGUAGE)
                    .and_then(|d| Iso639LanguageDescriptor::parse(d).ok())
                    .map(|d| d.language),
            },
            stream_type::PES_PRIVATE_DATA => {
                if has_descriptor(&self.descriptors, descriptor_tag::TELETEXT) {
                    StreamKind::Teletext
                } else if has_descriptor(&self.descriptors, descriptor_tag::SUBTITLING) {
                    StreamKind::Subtitling
                } else if has_descriptor(&self.descriptors, descriptor_tag::AC3) {
                    StreamKind::Ac3
                } else {
                    StreamKind::Other
                }
            }
            _ => StreamKind::Other,
        }
    }

    /// Get a human-readable stream type name.
    pub fn stream_type_name(&self) -> &'static str {
        match self.stream_type {
            stream_type::MPEG1_VIDEO => "MPEG-1 Video",
            stream_type::MPEG2_VIDEO => "MPEG-2 Video",
            stream_type::MPEG1_AUDIO => "MPEG-1 Audio",
            stream_type::MPEG2_AUDIO => "MPEG-2 Audio",
            stream_type::PES_PRIVATE_DATA => "PES Private Data",
            0x1B => "H.264/AVC Video",
            0x24 => "H.265/HEVC Video",
            0x0F => "AAC Audio (ADTS)",
            0x11 => "AAC Audio (LATM)",
            _ => "Unknown",
        }
    }
}

/// Parsed PMT section.
#[derive(Debug, Clone, Default)]
pub struct PmtTable {
    /// Program number (service ID).
    pub program_number: u16,
    /// Version number.
    pub version_number: u8,
    /// PCR PID.
    pub pcr_pid: u16,
    /// Elementary streams.
    pub streams: Vec<PmtStream>,
    /// Set when the stream loop ran past the section end.
    pub truncated: Option<TableError>,
}

impl PmtTable {
    /// Parse a PMT from a PSI section.
    pub fn parse(section: &PsiSection) -> Result<Self> {
        section.expect_table(table_id::PMT)?;

        let data = section.data;
        if data.len() < 4 {
            return Err(inconsistent(format!("{} bytes cannot hold PCR PID", data.len())));
        }

        let pcr_pid = psi::pid(data[0], data[1]);
        let program_info_length = psi::loop_length(data[2], data[3]);

        if data.len() < 4 + program_info_length {
            return Err(inconsistent(format!(
                "program_info_length {} exceeds section",
                program_info_length
            )));
        }

        let mut pmt = PmtTable {
            program_number: section.header.table_id_extension,
            version_number: section.header.version_number,
            pcr_pid,
            streams: Vec::new(),
            truncated: None,
        };

        let mut offset = 4 + program_info_length;
        while offset < data.len() {
            if offset + 5 > data.len() {
                pmt.truncated = Some(inconsistent(format!(
                    "{} trailing bytes in stream loop",
                    data.len() - offset
                )));
                break;
            }

            let stream_type = data[offset];
            let elementary_pid = psi::pid(data[offset + 1], data[offset + 2]);
            let es_info_length = psi::loop_length(data[offset + 3], data[offset + 4]);

            offset += 5;

            if offset + es_info_length > data.len() {
                pmt.truncated = Some(inconsistent(format!(
                    "ES_info_length {} of PID 0x{:04x} exceeds section",
                    es_info_length, elementary_pid
                )));
                break;
            }

            let descriptors = data[offset..offset + es_info_length].to_vec();
            offset += es_info_length;

            pmt.streams.push(PmtStream {
                stream_type,
                elementary_pid,
                descriptors,
            });
        }

        Ok(pmt)
    }
}

fn inconsistent(detail: String) -> TableError {
    TableError::Inconsistent {
        table: "PMT",
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::tests::long_section;

    fn parse(payload: &[u8]) -> PmtTable {
        let raw = long_section(table_id::PMT, 100, 1, 0, 0, payload);
        let section = PsiSection::parse(&raw).unwrap();
        PmtTable::parse(&section).unwrap()
    }

    #[test]
    fn test_parse_pmt() {
        let pmt = parse(&[
            // PCR PID = 0x0210
            0xE2, 0x10,
            // Program info length = 0
            0xF0, 0x00,
            // Video MPEG-2, PID=0x0210
            0x02, 0xE2, 0x10, 0xF0, 0x00,
            // Audio MPEG-2, PID=0x0211, ISO 639 "eng"
            0x04, 0xE2, 0x11, 0xF0, 0x06, 0x0A, 0x04, b'e', b'n', b'g', 0x00,
        ]);

        assert_eq!(pmt.program_number, 100);
        assert_eq!(pmt.pcr_pid, 0x0210);
        assert_eq!(pmt.streams.len(), 2);
        assert!(pmt.truncated.is_none());

        assert_eq!(pmt.streams[0].elementary_pid, 0x0210);
        assert_eq!(pmt.streams[0].kind(), StreamKind::Video);
        assert_eq!(pmt.streams[1].elementary_pid, 0x0211);
        assert_eq!(
            pmt.streams[1].kind(),
            StreamKind::Audio {
                language: Some("eng".to_string())
            }
        );
    }

    #[test]
    fn test_private_data_priority() {
        let stream = |descriptors: Vec<u8>| PmtStream {
            stream_type: stream_type::PES_PRIVATE_DATA,
            elementary_pid: 0x300,
            descriptors,
        };

        // AC-3 and teletext together: teletext wins.
        assert_eq!(
            stream(vec![0x6A, 0x01, 0x00, 0x56, 0x05, b'e', b'n', b'g', 0x09, 0x00]).kind(),
            StreamKind::Teletext
        );
        assert_eq!(
            stream(vec![0x6A, 0x01, 0x00, 0x59, 0x01, 0x00]).kind(),
            StreamKind::Subtitling
        );
        assert_eq!(stream(vec![0x6A, 0x01, 0x00]).kind(), StreamKind::Ac3);
        assert_eq!(stream(vec![0x52, 0x01, 0x01]).kind(), StreamKind::Other);
    }

    #[test]
    fn test_truncated_stream_loop() {
        let pmt = parse(&[
            0xE1, 0x00, 0xF0, 0x00,
            0x02, 0xE1, 0x00, 0xF0, 0x00,
            // ES_info_length 0x10 but only 2 bytes follow
            0x04, 0xE1, 0x01, 0xF0, 0x10, 0x0A, 0x04,
        ]);
        assert_eq!(pmt.streams.len(), 1);
        assert!(matches!(
            pmt.truncated,
            Some(TableError::Inconsistent { table: "PMT", .. })
        ));
    }

    #[test]
    fn test_program_info_overrun() {
        let raw = long_section(table_id::PMT, 1, 0, 0, 0, &[0xE1, 0x00, 0xF0, 0x20]);
        let section = PsiSection::parse(&raw).unwrap();
        assert!(PmtTable::parse(&section).is_err());
    }
}
