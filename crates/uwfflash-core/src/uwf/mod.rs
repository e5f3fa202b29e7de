//! UWF container codec
//!
//! The UWF file format bundles one or more typed, checksummed memory
//! records for delivery to a module bootloader. It is a closed, versioned
//! binary contract: field widths and the additive checksum must match the
//! device firmware bit-for-bit.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! container: magic[4] | version u16 | record count u32 | records...
//! record:    kind u8 | address u32 | payload length u32 | payload | checksum u32
//! ```
//!
//! Records are order-significant: their file order is the transmission
//! order and is never reordered or deduplicated.

mod parser;

use core::fmt;

use crate::error::FormatError;

/// Magic bytes at the start of every container
pub const UWF_MAGIC: [u8; 4] = *b"UWF2";

/// Container version understood by this codec
pub const UWF_VERSION: u16 = 1;

/// Largest Data record payload the bootloader's receive buffer accepts.
///
/// The vendor tooling uses 16..=252 (divisible by 4); 252 is the hard
/// ceiling imposed by the single length byte plus command overhead.
pub const MAX_DATA_PAYLOAD: usize = 252;

pub(crate) const HEADER_LEN: usize = 10;
pub(crate) const RECORD_HEADER_LEN: usize = 9;
pub(crate) const RECORD_TRAILER_LEN: usize = 4;

/// Typed record kinds, tagged with the vendor's single-byte command ids.
///
/// This is a closed set. Unknown tags are a [`FormatError`], never
/// skipped: silently dropping a record would mis-flash the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// Target platform identifier the device must acknowledge
    Platform = b'T',
    /// Memory bank registration (handle, base address, geometry)
    Register = b'G',
    /// Select a registered bank for subsequent records
    Select = b'S',
    /// Sector geometry of the selected bank
    SectorMap = b'M',
    /// Erase a range of the selected bank
    Erase = b'E',
    /// Data to write at an offset of the selected bank
    Data = b'W',
    /// Release a registered bank handle
    Unregister = b'U',
    /// End-of-image marker; reboots the bootloader
    EndOfFile = b'Z',
}

impl RecordKind {
    /// Decode a record kind tag, `None` if outside the closed set
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'T' => Some(Self::Platform),
            b'G' => Some(Self::Register),
            b'S' => Some(Self::Select),
            b'M' => Some(Self::SectorMap),
            b'E' => Some(Self::Erase),
            b'W' => Some(Self::Data),
            b'U' => Some(Self::Unregister),
            b'Z' => Some(Self::EndOfFile),
            _ => None,
        }
    }

    /// The wire tag for this kind
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Kind name for logs and errors
    pub fn name(self) -> &'static str {
        match self {
            Self::Platform => "platform",
            Self::Register => "register",
            Self::Select => "select",
            Self::SectorMap => "sector-map",
            Self::Erase => "erase",
            Self::Data => "data",
            Self::Unregister => "unregister",
            Self::EndOfFile => "end-of-file",
        }
    }

    /// Whether `len` is a valid payload length for this kind.
    ///
    /// Fixed widths come from the vendor loader: platform id is a u32,
    /// registration data is 11 bytes (handle, base, banks, bank size,
    /// algorithm), selection is (handle, bank), sector maps are
    /// (count, size) u32 pairs, erase carries a u32 range length.
    pub(crate) fn payload_len_ok(self, len: usize) -> bool {
        match self {
            Self::Platform => len == 4,
            Self::Register => len == 11,
            Self::Select => len == 2,
            Self::SectorMap => len > 0 && len % 8 == 0,
            Self::Erase => len == 4,
            Self::Data => (1..=MAX_DATA_PAYLOAD).contains(&len),
            Self::Unregister => len == 1,
            Self::EndOfFile => len == 0,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One typed, checksummed unit within a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UwfRecord {
    /// Record kind
    pub kind: RecordKind,
    /// Destination address or bank-relative offset
    pub address: u32,
    /// Record payload
    pub payload: Vec<u8>,
    /// Additive checksum over kind, address and payload
    pub checksum: u32,
}

impl UwfRecord {
    /// Build a record with its checksum computed
    pub fn new(kind: RecordKind, address: u32, payload: Vec<u8>) -> Self {
        let checksum = Self::checksum_of(kind, address, &payload);
        Self {
            kind,
            address,
            payload,
            checksum,
        }
    }

    /// The deterministic record checksum: wrapping byte-sum of the kind
    /// tag, the four little-endian address bytes, and the payload.
    pub fn checksum_of(kind: RecordKind, address: u32, payload: &[u8]) -> u32 {
        let mut sum = kind.tag() as u32;
        for b in address.to_le_bytes() {
            sum = sum.wrapping_add(b as u32);
        }
        for &b in payload {
            sum = sum.wrapping_add(b as u32);
        }
        sum
    }

    /// Append the serialized record to `out`
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.kind.tag());
        out.extend_from_slice(&self.address.to_le_bytes());
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&self.checksum.to_le_bytes());
    }
}

/// A parsed UWF container: an ordered sequence of records.
///
/// Immutable once parsed; the record order is the transmission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UwfContainer {
    /// Container format version
    pub version: u16,
    /// Records in file order
    pub records: Vec<UwfRecord>,
}

impl UwfContainer {
    /// Decode a container from raw bytes.
    ///
    /// Pure and side-effect-free; see [`FormatError`] for the failure
    /// modes. Never touches any transport.
    pub fn parse(data: &[u8]) -> Result<Self, FormatError> {
        parser::parse(data)
    }

    /// Serialize the container back to its binary form
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.extend_from_slice(&UWF_MAGIC);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&(self.records.len() as u32).to_le_bytes());
        for record in &self.records {
            record.encode_into(&mut out);
        }
        out
    }

    /// Total number of Data payload bytes, for progress reporting
    pub fn data_len(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.kind == RecordKind::Data)
            .map(|r| r.payload.len())
            .sum()
    }
}
