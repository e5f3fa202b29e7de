//! Bootloader wire protocol: control bytes and frame encoding
//!
//! Single-byte command codes and the frame layouts are a fixed contract
//! with the module bootloader, recovered from the vendor tooling. All
//! multi-byte integers are little-endian.

/// Sync byte that opens the bootloader conversation
pub const SYNC: u8 = 0x80;

/// Positive acknowledgment
pub const ACK: u8 = b'a';

/// Negative acknowledgment / error status
pub const NAK: u8 = b'f';

/// Platform identity check command
pub const CMD_PLATFORM: u8 = b'p';

/// Sector erase command
pub const CMD_ERASE: u8 = b'e';

/// Data write command
pub const CMD_WRITE: u8 = b'w';

/// Checksum readback command
pub const CMD_VERIFY: u8 = b'v';

/// Reboot-out-of-bootloader command
pub const CMD_REBOOT: u8 = b'z';

/// Length of the ATS identifier response that answers the sync byte
pub const ATS_LEN: usize = 14;

/// Additive checksum over a data payload, as the bootloader computes it
pub fn payload_checksum(payload: &[u8]) -> u32 {
    payload
        .iter()
        .fold(0u32, |sum, &b| sum.wrapping_add(b as u32))
}

/// `p` frame: platform identity word for the device to accept or reject
pub fn platform_frame(platform_id: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + platform_id.len());
    frame.push(CMD_PLATFORM);
    frame.extend_from_slice(platform_id);
    frame
}

/// `e` frame: erase the sector containing `addr`
pub fn erase_frame(addr: u32) -> Vec<u8> {
    let mut frame = Vec::with_capacity(5);
    frame.push(CMD_ERASE);
    frame.extend_from_slice(&addr.to_le_bytes());
    frame
}

/// `w` frame: write `payload` at `addr`.
///
/// The trailing byte is the low byte of the additive payload checksum;
/// the bootloader checks it before committing the block.
pub fn write_frame(addr: u32, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= u8::MAX as usize);
    let mut frame = Vec::with_capacity(7 + payload.len());
    frame.push(CMD_WRITE);
    frame.extend_from_slice(&addr.to_le_bytes());
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    frame.push((payload_checksum(payload) & 0xFF) as u8);
    frame
}

/// `v` frame: ask the device to checksum `len` bytes at `addr` and
/// compare against the full 32-bit `checksum`
pub fn verify_frame(addr: u32, len: u32, checksum: u32) -> Vec<u8> {
    let mut frame = Vec::with_capacity(13);
    frame.push(CMD_VERIFY);
    frame.extend_from_slice(&addr.to_le_bytes());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&checksum.to_le_bytes());
    frame
}

/// `z` frame: reboot the module out of the bootloader
pub fn reboot_frame() -> Vec<u8> {
    vec![CMD_REBOOT]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_frame_layout() {
        let frame = write_frame(0x0001_1000, &[0x10, 0x20, 0xF0]);
        assert_eq!(
            frame,
            vec![b'w', 0x00, 0x10, 0x01, 0x00, 3, 0x10, 0x20, 0xF0, 0x20]
        );
    }

    #[test]
    fn write_frame_checksum_keeps_low_byte_only() {
        // 0xFF * 2 = 0x1FE; only 0xFE goes on the wire.
        let frame = write_frame(0, &[0xFF, 0xFF]);
        assert_eq!(*frame.last().unwrap(), 0xFE);
    }

    #[test]
    fn verify_frame_layout() {
        let frame = verify_frame(0x2000, 0x100, 0x0001_02FE);
        assert_eq!(
            frame,
            vec![b'v', 0x00, 0x20, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0xFE, 0x02, 0x01, 0x00]
        );
    }

    #[test]
    fn erase_frame_layout() {
        assert_eq!(erase_frame(0x0400), vec![b'e', 0x00, 0x04, 0x00, 0x00]);
    }

    #[test]
    fn payload_checksum_wraps() {
        assert_eq!(payload_checksum(&[]), 0);
        assert_eq!(payload_checksum(&[1, 2, 3]), 6);
        assert_eq!(payload_checksum(&[0xFF; 4]), 0x3FC);
    }
}
