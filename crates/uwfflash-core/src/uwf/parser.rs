//! UWF container parsing

use crate::error::FormatError;

use super::{
    RecordKind, UwfContainer, UwfRecord, HEADER_LEN, MAX_DATA_PAYLOAD, RECORD_HEADER_LEN,
    RECORD_TRAILER_LEN, UWF_MAGIC, UWF_VERSION,
};

/// Parse a UWF container from raw bytes
pub(super) fn parse(data: &[u8]) -> Result<UwfContainer, FormatError> {
    if data.len() < HEADER_LEN {
        return Err(FormatError::Truncated {
            offset: data.len(),
            needed: HEADER_LEN - data.len(),
        });
    }

    let magic: [u8; 4] = data[0..4].try_into().unwrap();
    if magic != UWF_MAGIC {
        return Err(FormatError::BadMagic { found: magic });
    }

    let version = u16::from_le_bytes(data[4..6].try_into().unwrap());
    if version != UWF_VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }

    let declared = u32::from_le_bytes(data[6..10].try_into().unwrap());

    let mut records = Vec::new();
    let mut pos = HEADER_LEN;
    for index in 0..declared as usize {
        if pos == data.len() {
            return Err(FormatError::RecordCountMismatch {
                declared,
                actual: index as u32,
            });
        }
        let (record, next) = parse_record(data, pos, index)?;
        records.push(record);
        pos = next;
    }

    if pos != data.len() {
        return Err(FormatError::TrailingData(data.len() - pos));
    }

    Ok(UwfContainer { version, records })
}

fn parse_record(data: &[u8], pos: usize, index: usize) -> Result<(UwfRecord, usize), FormatError> {
    let remaining = data.len() - pos;
    if remaining < RECORD_HEADER_LEN {
        return Err(FormatError::Truncated {
            offset: data.len(),
            needed: RECORD_HEADER_LEN - remaining,
        });
    }

    let tag = data[pos];
    let kind = RecordKind::from_tag(tag).ok_or(FormatError::UnknownRecordKind(tag))?;
    let address = u32::from_le_bytes(data[pos + 1..pos + 5].try_into().unwrap());
    let len = u32::from_le_bytes(data[pos + 5..pos + 9].try_into().unwrap()) as usize;

    if !kind.payload_len_ok(len) {
        if kind == RecordKind::Data && len > MAX_DATA_PAYLOAD {
            return Err(FormatError::PayloadTooLarge {
                index,
                len,
                max: MAX_DATA_PAYLOAD,
            });
        }
        return Err(FormatError::InvalidPayloadLength {
            index,
            kind: kind.name(),
            len,
        });
    }

    let body = pos + RECORD_HEADER_LEN;
    let end = body + len + RECORD_TRAILER_LEN;
    if data.len() < end {
        return Err(FormatError::Truncated {
            offset: data.len(),
            needed: end - data.len(),
        });
    }

    let payload = data[body..body + len].to_vec();
    let declared_sum = u32::from_le_bytes(data[body + len..end].try_into().unwrap());
    let computed = UwfRecord::checksum_of(kind, address, &payload);
    if declared_sum != computed {
        return Err(FormatError::ChecksumMismatch {
            index,
            declared: declared_sum,
            computed,
        });
    }

    Ok((
        UwfRecord {
            kind,
            address,
            payload,
            checksum: declared_sum,
        },
        end,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uwf::{UwfContainer, UwfRecord};

    fn sample_container() -> UwfContainer {
        UwfContainer {
            version: UWF_VERSION,
            records: vec![
                UwfRecord::new(RecordKind::Platform, 0, vec![0x54, 0x00, 0x01, 0x80]),
                UwfRecord::new(
                    RecordKind::Register,
                    0,
                    vec![0, 0x00, 0x10, 0x00, 0x00, 1, 0x00, 0x20, 0x00, 0x00, 1],
                ),
                UwfRecord::new(RecordKind::Data, 0x100, vec![0xDE, 0xAD, 0xBE, 0xEF]),
                UwfRecord::new(RecordKind::EndOfFile, 0, vec![]),
            ],
        }
    }

    #[test]
    fn round_trip() {
        let container = sample_container();
        let bytes = container.serialize();
        let parsed = UwfContainer::parse(&bytes).unwrap();
        assert_eq!(parsed, container);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample_container().serialize();
        bytes[0] = b'X';
        assert_eq!(
            UwfContainer::parse(&bytes),
            Err(FormatError::BadMagic {
                found: [b'X', b'W', b'F', b'2']
            })
        );
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = sample_container().serialize();
        bytes[4..6].copy_from_slice(&9u16.to_le_bytes());
        assert_eq!(
            UwfContainer::parse(&bytes),
            Err(FormatError::UnsupportedVersion(9))
        );
    }

    #[test]
    fn rejects_record_count_mismatch() {
        let mut bytes = sample_container().serialize();
        // Declare one record more than the file holds.
        bytes[6..10].copy_from_slice(&5u32.to_le_bytes());
        assert_eq!(
            UwfContainer::parse(&bytes),
            Err(FormatError::RecordCountMismatch {
                declared: 5,
                actual: 4,
            })
        );
    }

    #[test]
    fn rejects_trailing_data() {
        let mut bytes = sample_container().serialize();
        bytes.push(0x00);
        assert_eq!(
            UwfContainer::parse(&bytes),
            Err(FormatError::TrailingData(1))
        );
    }

    #[test]
    fn rejects_truncated_payload() {
        let bytes = sample_container().serialize();
        // Chop into the last record's trailer.
        let truncated = &bytes[..bytes.len() - 2];
        assert!(matches!(
            UwfContainer::parse(truncated),
            Err(FormatError::Truncated { .. })
        ));
    }

    #[test]
    fn rejects_unknown_record_kind() {
        let mut bytes = sample_container().serialize();
        // First record's tag sits right after the container header.
        bytes[HEADER_LEN] = b'Q';
        assert_eq!(
            UwfContainer::parse(&bytes),
            Err(FormatError::UnknownRecordKind(b'Q'))
        );
    }

    #[test]
    fn rejects_oversized_data_payload() {
        let container = UwfContainer {
            version: UWF_VERSION,
            records: vec![UwfRecord::new(
                RecordKind::Data,
                0,
                vec![0xAA; MAX_DATA_PAYLOAD + 1],
            )],
        };
        assert_eq!(
            UwfContainer::parse(&container.serialize()),
            Err(FormatError::PayloadTooLarge {
                index: 0,
                len: MAX_DATA_PAYLOAD + 1,
                max: MAX_DATA_PAYLOAD,
            })
        );
    }

    #[test]
    fn rejects_wrong_config_payload_width() {
        let container = UwfContainer {
            version: UWF_VERSION,
            records: vec![UwfRecord::new(RecordKind::Register, 0, vec![0; 5])],
        };
        assert_eq!(
            UwfContainer::parse(&container.serialize()),
            Err(FormatError::InvalidPayloadLength {
                index: 0,
                kind: "register",
                len: 5,
            })
        );
    }

    #[test]
    fn detects_any_single_bit_payload_corruption() {
        let container = UwfContainer {
            version: UWF_VERSION,
            records: vec![UwfRecord::new(
                RecordKind::Data,
                0x2000,
                vec![0x00, 0x5A, 0xFF, 0x13],
            )],
        };
        let clean = container.serialize();
        let payload_start = HEADER_LEN + RECORD_HEADER_LEN;

        for byte in 0..4 {
            for bit in 0..8 {
                let mut corrupt = clean.clone();
                corrupt[payload_start + byte] ^= 1 << bit;
                assert!(
                    matches!(
                        UwfContainer::parse(&corrupt),
                        Err(FormatError::ChecksumMismatch { index: 0, .. })
                    ),
                    "bit {} of payload byte {} not detected",
                    bit,
                    byte
                );
            }
        }
    }
}
