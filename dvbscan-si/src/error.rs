//! Error types for section and descriptor decoding.

use thiserror::Error;

/// Errors raised while validating a raw section header.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SectionError {
    /// Buffer is too short to hold the fixed header.
    #[error("Section too short: {0} bytes")]
    TooShort(usize),

    /// Declared section_length does not cover exactly the bytes that were read.
    #[error("Section length mismatch: header declares {declared} + 3 bytes, got {actual}")]
    LengthMismatch { declared: u16, actual: usize },

    /// Long-form section whose length cannot hold the extended header and CRC.
    #[error("Section length {0} too small for extended header")]
    NoExtendedHeader(u16),

    /// Section does not carry the expected table id.
    #[error("Unexpected table id: expected 0x{expected:02X}, got 0x{actual:02X}")]
    TableIdMismatch { expected: u8, actual: u8 },
}

/// Structural errors inside a descriptor loop or a single descriptor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// Descriptor declares a zero payload length.
    #[error("Descriptor 0x{tag:02X} has zero length")]
    ZeroLength { tag: u8 },

    /// Declared length runs past the end of the descriptor loop.
    #[error("Descriptor 0x{tag:02X} declares {declared} bytes, only {remaining} left in loop")]
    Overrun {
        tag: u8,
        declared: usize,
        remaining: usize,
    },

    /// Descriptor payload is shorter than its fixed fields.
    #[error("Descriptor 0x{tag:02X} too short: {len} bytes")]
    TooShort { tag: u8, len: usize },
}

/// Errors raised by the table decoders.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error(transparent)]
    Section(#[from] SectionError),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    /// A loop length inside the section disagrees with the section size.
    #[error("Inconsistent {table} section: {detail}")]
    Inconsistent { table: &'static str, detail: String },
}

pub type Result<T> = std::result::Result<T, TableError>;
