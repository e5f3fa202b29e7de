//! Target variant descriptors
//!
//! Each supported module family is one variant of [`ProcessorProfile`],
//! resolved once at session start from the CLI flag. All variants expose
//! the same capability set: record adaptation, device-identity matching,
//! registration validation, and the entry/exit quirks of their bootloader.

use core::fmt;
use std::str::FromStr;

use crate::protocol::wire::ATS_LEN;
use crate::uwf::{RecordKind, UwfRecord};

/// Memory-bank registration data carried by a Register record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankRegistration {
    /// Bank handle used by Select records
    pub handle: u8,
    /// Physical base address of the bank
    pub base_address: u32,
    /// Number of banks behind the handle
    pub banks: u8,
    /// Bank size in bytes
    pub bank_size: u32,
    /// Flash algorithm identifier
    pub algorithm: u8,
}

/// A target chip/module family.
///
/// Closed set; free-form variant strings from the command line are
/// resolved through [`FromStr`] before a session starts, so no string
/// dispatch happens inside the transfer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorProfile {
    /// Unknown module; no identity or registration expectations
    Generic,
    /// BL652 module
    Bl652,
    /// BL653 module
    Bl653,
    /// BL654 module
    Bl654,
    /// BL654 inside an IG60 gateway; bootloader entered externally
    Ig60Bl654,
    /// RM1xx LoRa module
    Rm1xx,
    /// BT900 module
    Bt900,
}

impl ProcessorProfile {
    /// All selectable variants
    pub const ALL: [ProcessorProfile; 7] = [
        Self::Generic,
        Self::Bl652,
        Self::Bl653,
        Self::Bl654,
        Self::Ig60Bl654,
        Self::Rm1xx,
        Self::Bt900,
    ];

    /// Variant name as accepted on the command line
    pub fn name(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Bl652 => "bl652",
            Self::Bl653 => "bl653",
            Self::Bl654 => "bl654",
            Self::Ig60Bl654 => "bl654ig",
            Self::Rm1xx => "rm1xx",
            Self::Bt900 => "bt900",
        }
    }

    /// Command that drops the module into its bootloader, or `None` when
    /// the bootloader is entered by external means (IG60 gateway control).
    pub fn enter_command(self) -> Option<&'static [u8]> {
        match self {
            Self::Ig60Bl654 => None,
            _ => Some(b"AT+FUP\r"),
        }
    }

    /// Whether the module leaves the bootloader via a DTR/UART-break
    /// reset rather than the reboot command alone.
    pub fn reboot_via_break(self) -> bool {
        matches!(self, Self::Bl652 | Self::Bl653 | Self::Bl654)
    }

    /// Expected prefix of the bootloader's ATS identifier response
    fn ats_pattern(self) -> Option<&'static [u8]> {
        match self {
            Self::Generic => None,
            Self::Bl652 => Some(b"BL652"),
            Self::Bl653 => Some(b"BL653"),
            Self::Bl654 | Self::Ig60Bl654 => Some(b"BL654"),
            Self::Rm1xx => Some(b"RM1"),
            Self::Bt900 => Some(b"BT900"),
        }
    }

    /// Validate the bootloader's self-reported identifier.
    ///
    /// A mismatch aborts the session before any write is issued.
    pub fn matches_device(self, ats: &[u8]) -> bool {
        if ats.len() != ATS_LEN {
            return false;
        }
        match self.ats_pattern() {
            Some(pattern) => ats.starts_with(pattern),
            None => true,
        }
    }

    /// Validate Register record data against the variant's expectations.
    ///
    /// The BL65x and RM1xx bootloaders expose exactly one bank on handle
    /// 0 with algorithm 1; anything else means the image targets a
    /// different module.
    pub fn validate_registration(self, bank: &BankRegistration) -> bool {
        match self {
            Self::Generic => bank.bank_size > 0,
            _ => {
                bank.handle == 0 && bank.banks == 1 && bank.algorithm == 1 && bank.bank_size > 0
            }
        }
    }

    /// Adapt a record for transmission: device-bound addresses are
    /// rebased onto the registered bank's physical base address.
    pub fn adapt(self, record: &UwfRecord, base_address: u32) -> UwfRecord {
        match record.kind {
            RecordKind::Data | RecordKind::Erase => UwfRecord::new(
                record.kind,
                base_address.wrapping_add(record.address),
                record.payload.clone(),
            ),
            _ => record.clone(),
        }
    }
}

impl fmt::Display for ProcessorProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProcessorProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generic" => Ok(Self::Generic),
            "bl652" => Ok(Self::Bl652),
            "bl653" => Ok(Self::Bl653),
            "bl654" => Ok(Self::Bl654),
            "bl654ig" | "ig60" => Ok(Self::Ig60Bl654),
            "rm1xx" => Ok(Self::Rm1xx),
            "bt900" => Ok(Self::Bt900),
            _ => Err(format!(
                "unknown target variant '{}' [available: generic, bl652, bl653, bl654, bl654ig, rm1xx, bt900]",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ats(text: &str) -> Vec<u8> {
        let mut out = text.as_bytes().to_vec();
        out.resize(ATS_LEN, 0);
        out
    }

    #[test]
    fn parses_variant_names() {
        assert_eq!(
            "BL654".parse::<ProcessorProfile>().unwrap(),
            ProcessorProfile::Bl654
        );
        assert_eq!(
            "ig60".parse::<ProcessorProfile>().unwrap(),
            ProcessorProfile::Ig60Bl654
        );
        assert!("bl9000".parse::<ProcessorProfile>().is_err());
    }

    #[test]
    fn matches_expected_device() {
        assert!(ProcessorProfile::Bl654.matches_device(&ats("BL654 r2")));
        assert!(ProcessorProfile::Ig60Bl654.matches_device(&ats("BL654 r2")));
        assert!(!ProcessorProfile::Bl654.matches_device(&ats("BT900 r1")));
        // Generic accepts any full-length identifier.
        assert!(ProcessorProfile::Generic.matches_device(&ats("BT900 r1")));
        // Short response is never a match.
        assert!(!ProcessorProfile::Generic.matches_device(b"BL654"));
    }

    #[test]
    fn validates_registration_data() {
        let bank = BankRegistration {
            handle: 0,
            base_address: 0x1000,
            banks: 1,
            bank_size: 0x2000,
            algorithm: 1,
        };
        assert!(ProcessorProfile::Bl654.validate_registration(&bank));
        assert!(!ProcessorProfile::Bl654.validate_registration(&BankRegistration {
            handle: 2,
            ..bank
        }));
        // Generic only insists on a usable bank size.
        assert!(ProcessorProfile::Generic.validate_registration(&BankRegistration {
            handle: 2,
            ..bank
        }));
    }

    #[test]
    fn rebases_device_bound_records_only() {
        let data = UwfRecord::new(RecordKind::Data, 0x10, vec![1, 2]);
        let adapted = ProcessorProfile::Bl654.adapt(&data, 0x1000);
        assert_eq!(adapted.address, 0x1010);
        assert_eq!(adapted.payload, data.payload);

        let select = UwfRecord::new(RecordKind::Select, 0, vec![0, 0]);
        assert_eq!(ProcessorProfile::Bl654.adapt(&select, 0x1000), select);
    }
}
