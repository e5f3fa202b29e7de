//! Error types for uwfflash-core
//!
//! The taxonomy mirrors the failure classes of the flashing pipeline:
//! [`FormatError`] for a corrupt image (always raised before any device
//! contact), [`TransportError`] for the serial link, [`ProtocolError`] for
//! bootloader conversation failures (never retried), and
//! [`VerificationError`] for device-side checksum readback rejection.

use thiserror::Error;

/// Malformed or corrupt UWF image.
///
/// Always fatal, and always surfaced before any transport resource is
/// acquired: a bad image must never reach the device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// Magic bytes at the start of the container do not match
    #[error("bad magic {found:02X?}, not a UWF container")]
    BadMagic {
        /// The four bytes found where the magic was expected
        found: [u8; 4],
    },

    /// Container version not understood by this codec
    #[error("unsupported container version {0}")]
    UnsupportedVersion(u16),

    /// File ends before the structure it declares
    #[error("container truncated at offset {offset}: {needed} more byte(s) required")]
    Truncated {
        /// Offset at which the data ran out
        offset: usize,
        /// Bytes missing to complete the current structure
        needed: usize,
    },

    /// Header record count disagrees with the records actually present
    #[error("record count mismatch: header declares {declared}, file holds {actual}")]
    RecordCountMismatch {
        /// Count from the container header
        declared: u32,
        /// Records actually parsed before the data ran out
        actual: u32,
    },

    /// Record kind tag not in the closed vendor set
    #[error("unknown record kind 0x{0:02X}")]
    UnknownRecordKind(u8),

    /// Payload length invalid for the record kind
    #[error("record {index} ({kind}): invalid payload length {len}")]
    InvalidPayloadLength {
        /// Index of the offending record
        index: usize,
        /// Record kind name
        kind: &'static str,
        /// Declared payload length
        len: usize,
    },

    /// Data payload larger than the bootloader's receive buffer
    #[error("record {index}: payload of {len} bytes exceeds the {max}-byte bootloader buffer")]
    PayloadTooLarge {
        /// Index of the offending record
        index: usize,
        /// Declared payload length
        len: usize,
        /// Maximum the bootloader accepts
        max: usize,
    },

    /// Record checksum does not match its contents
    #[error("record {index}: checksum mismatch: declared 0x{declared:08X}, computed 0x{computed:08X}")]
    ChecksumMismatch {
        /// Index of the offending record
        index: usize,
        /// Checksum stored in the file
        declared: u32,
        /// Checksum computed over the record contents
        computed: u32,
    },

    /// Bytes remain after the last declared record
    #[error("{0} trailing byte(s) after the last record")]
    TrailingData(usize),
}

/// Serial link failure.
///
/// Timeouts are retried inside the engine's per-record attempt budget and
/// become fatal once it is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Port could not be claimed
    #[error("serial port unavailable: {0}")]
    PortUnavailable(String),

    /// No data arrived within the configured timeout
    #[error("timed out waiting for serial data")]
    Timeout,

    /// Read or write failed below the protocol layer
    #[error("serial I/O error: {0}")]
    Io(String),
}

/// Bootloader conversation failure.
///
/// None of these are retried: they indicate a wrong target, a wrong mode,
/// or an exhausted retry budget, not transient line noise.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Bootloader never answered the sync byte
    #[error("no handshake from bootloader after {attempts} attempt(s)")]
    NoHandshake {
        /// Sync attempts made before giving up
        attempts: u32,
    },

    /// Device identity does not match the selected variant
    #[error("device mismatch for {profile}: {detail}")]
    DeviceMismatch {
        /// Name of the selected processor profile
        profile: &'static str,
        /// What disagreed (identifier, platform id, registration data)
        detail: String,
    },

    /// Record was not acknowledged within its attempt budget
    #[error("record {index} not acknowledged after {attempts} attempt(s)")]
    RecordTransferFailed {
        /// Index of the record in the container
        index: usize,
        /// Attempts made before giving up
        attempts: u32,
    },

    /// Device answered with its error status byte
    #[error("device reported an error status")]
    DeviceReportedError,

    /// Device answered with a byte outside the protocol
    #[error("unexpected response 0x{response:02X} to command '{command}'")]
    UnexpectedResponse {
        /// Command character that was being answered
        command: char,
        /// The byte actually received
        response: u8,
    },

    /// Records arrived in an order the bootloader cannot process
    #[error("invalid record sequence: {0}")]
    InvalidSequence(&'static str),

    /// Command-mode request returned a device error code
    #[error("device returned error {code} to '{command}'")]
    CommandError {
        /// The command that was sent (without terminator)
        command: String,
        /// The device's error code
        code: String,
    },

    /// Command-mode request produced no response at all
    #[error("no response to '{command}'; device not connected or not in command mode")]
    NoResponse {
        /// The command that was sent (without terminator)
        command: String,
    },

    /// Command-mode response was neither success nor a recognizable error
    #[error("unexpected response to '{command}': {response:?}")]
    GarbledResponse {
        /// The command that was sent (without terminator)
        command: String,
        /// What came back
        response: String,
    },
}

/// Device-side checksum readback rejection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    /// Device computed a different checksum over the written range
    #[error("device rejected checksum readback for 0x{addr:08X}..+{len}")]
    DeviceReadback {
        /// Start address of the verified range
        addr: u32,
        /// Length of the verified range in bytes
        len: u32,
    },
}

/// Umbrella error for the whole flashing pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Malformed or corrupt image
    #[error("image format error: {0}")]
    Format(#[from] FormatError),

    /// Serial link failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Bootloader conversation failure
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Device-side verification failure
    #[error("verification error: {0}")]
    Verification(#[from] VerificationError),

    /// Operation cancelled between record boundaries.
    ///
    /// The transport is still released cleanly, but the device-side
    /// bootloader state is indeterminate until the module is reset.
    #[error("flash operation cancelled")]
    Cancelled,
}

/// Result type alias using the umbrella [`Error`]
pub type Result<T> = core::result::Result<T, Error>;
