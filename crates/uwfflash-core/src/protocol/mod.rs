//! Bootloader transfer state machine
//!
//! [`ProtocolEngine`] drives one flashing session: handshake with the
//! bootloader, identity check against the selected
//! [`ProcessorProfile`](crate::profile::ProcessorProfile), record
//! transfer with bounded per-record retries, optional device-side
//! checksum readback, and reboot.
//!
//! The engine is strictly sequential: the bootloader protocol is
//! half-duplex and stateful, so there is exactly one outstanding frame at
//! any time and every read carries a timeout.

pub mod wire;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, ProtocolError, Result, TransportError, VerificationError};
use crate::profile::{BankRegistration, ProcessorProfile};
use crate::transport::Transport;
use crate::uwf::{RecordKind, UwfContainer};

/// Engine state, advanced monotonically during a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No session started
    Idle,
    /// Entering the bootloader
    Connecting,
    /// Syncing and checking device identity
    Handshaking,
    /// Streaming records
    Transferring,
    /// Device-side checksum readback
    Verifying,
    /// Every record acknowledged, no error status
    Complete,
    /// Terminal failure; reachable from any non-terminal state
    Failed,
}

/// Tunable parameters for one flashing session.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Transmissions attempted per record before failing
    pub record_attempts: u32,
    /// Sync attempts during the handshake. Fixed count, no backoff: the
    /// bootloader's receptive window after reset is narrow.
    pub handshake_attempts: u32,
    /// Timeout for every serial read
    pub read_timeout: Duration,
    /// Settle time after the bootloader-entry command
    pub settle_delay: Duration,
    /// Hold time for the UART break during a reset
    pub break_hold: Duration,
    /// Request device-side checksum readback during the transfer
    pub verify: bool,
    /// Data records between intermediate readbacks
    pub verify_batch: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            record_attempts: 3,
            handshake_attempts: 3,
            read_timeout: Duration::from_secs(3),
            settle_delay: Duration::from_millis(500),
            break_hold: Duration::from_millis(100),
            verify: false,
            verify_batch: 8,
        }
    }
}

/// Counters for a completed session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlashStats {
    /// Records acknowledged by the device
    pub records_sent: usize,
    /// Data payload bytes written
    pub bytes_written: usize,
    /// Frame retransmissions across all records
    pub retries: u32,
}

/// Cooperative cancellation flag, checked between record boundaries.
///
/// Cancellation never interrupts a frame mid-write, and the transport is
/// still released. The device-side bootloader state after a mid-transfer
/// cancellation is indeterminate: the module may sit waiting for a
/// continuation that never arrives until it is reset.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A fresh, uncancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation at the next record boundary
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Progress events emitted during a session. All methods default to
/// no-ops so implementors pick what they render.
pub trait FlashProgress {
    /// Handshake with the bootloader is starting
    fn handshake_started(&mut self) {}
    /// The device answered with its ATS identifier
    fn device_identified(&mut self, _ats: &[u8]) {}
    /// Record streaming is starting
    fn transfer_started(&mut self, _records: usize, _data_bytes: usize) {}
    /// A record was acknowledged
    fn record_sent(&mut self, _index: usize, _kind: RecordKind) {}
    /// A record is being retransmitted
    fn record_retry(&mut self, _index: usize, _attempt: u32) {}
    /// Final checksum readback is running
    fn verifying(&mut self) {}
    /// The session completed
    fn complete(&mut self, _stats: &FlashStats) {}
}

/// No-op progress reporter
pub struct NoProgress;

impl FlashProgress for NoProgress {}

/// Host-side memory state accumulated from config-class records.
///
/// Register/Select/SectorMap/Unregister records never reach the wire;
/// they shape how the device-bound records that follow are addressed,
/// exactly as the vendor loader consumes them.
#[derive(Debug, Default)]
struct MemoryMap {
    banks: Vec<BankRegistration>,
    selected: Option<u8>,
    sectors: Vec<SectorRun>,
}

#[derive(Debug, Clone, Copy)]
struct SectorRun {
    count: u32,
    size: u32,
}

impl MemoryMap {
    fn parse_registration(payload: &[u8]) -> BankRegistration {
        // Widths are validated by the parser.
        BankRegistration {
            handle: payload[0],
            base_address: u32::from_le_bytes(payload[1..5].try_into().unwrap()),
            banks: payload[5],
            bank_size: u32::from_le_bytes(payload[6..10].try_into().unwrap()),
            algorithm: payload[10],
        }
    }

    fn register(&mut self, bank: BankRegistration) {
        self.banks.retain(|b| b.handle != bank.handle);
        self.banks.push(bank);
    }

    fn unregister(&mut self, handle: u8) {
        self.banks.retain(|b| b.handle != handle);
        if self.selected == Some(handle) {
            self.selected = None;
        }
    }

    fn select(&mut self, handle: u8) -> Result<()> {
        if !self.banks.iter().any(|b| b.handle == handle) {
            return Err(ProtocolError::InvalidSequence("select of unregistered bank handle").into());
        }
        self.selected = Some(handle);
        Ok(())
    }

    fn selected_bank(&self) -> Option<&BankRegistration> {
        self.selected
            .and_then(|h| self.banks.iter().find(|b| b.handle == h))
    }

    /// Base address device-bound offsets are rebased onto. Zero until a
    /// bank has been selected, which keeps bare data-only images valid.
    fn base_address(&self) -> u32 {
        self.selected_bank().map_or(0, |b| b.base_address)
    }

    fn set_sector_map(&mut self, payload: &[u8]) -> Result<()> {
        let mut runs = Vec::with_capacity(payload.len() / 8);
        for pair in payload.chunks_exact(8) {
            runs.push(SectorRun {
                count: u32::from_le_bytes(pair[0..4].try_into().unwrap()),
                size: u32::from_le_bytes(pair[4..8].try_into().unwrap()),
            });
        }
        if let Some(bank) = self.selected_bank() {
            let total: u64 = runs.iter().map(|r| r.count as u64 * r.size as u64).sum();
            if total != bank.bank_size as u64 {
                return Err(
                    ProtocolError::InvalidSequence("sector map inconsistent with bank size").into(),
                );
            }
        }
        self.sectors = runs;
        Ok(())
    }

    /// Base offsets of every sector overlapping `[start, start + len)`.
    fn sector_starts(&self, start: u32, len: u32) -> Result<Vec<u32>> {
        if self.sectors.is_empty() {
            return Err(ProtocolError::InvalidSequence("erase before sector map").into());
        }
        if let Some(bank) = self.selected_bank() {
            if start as u64 + len as u64 > bank.bank_size as u64 {
                return Err(
                    ProtocolError::InvalidSequence("erase range exceeds the selected bank").into(),
                );
            }
        }

        let (start, end) = (start as u64, start as u64 + len as u64);
        let mut out = Vec::new();
        let mut base: u64 = 0;
        'runs: for run in &self.sectors {
            for _ in 0..run.count {
                if base >= end {
                    break 'runs;
                }
                let next = base + run.size as u64;
                if next > start {
                    out.push(base as u32);
                }
                base = next;
            }
        }
        if base < end {
            return Err(ProtocolError::InvalidSequence("erase range beyond the sector map").into());
        }
        Ok(out)
    }
}

/// Accumulates the range and checksum of written data between readbacks.
#[derive(Debug, Default)]
struct VerifyWindow {
    start: u32,
    len: u32,
    checksum: u32,
    blocks: usize,
    armed: bool,
}

impl VerifyWindow {
    fn extend(&mut self, addr: u32, payload: &[u8]) {
        if !self.armed {
            self.start = addr;
            self.armed = true;
        }
        self.len += payload.len() as u32;
        self.checksum = self.checksum.wrapping_add(wire::payload_checksum(payload));
        self.blocks += 1;
    }

    fn take(&mut self) -> Option<(u32, u32, u32)> {
        if !self.armed {
            return None;
        }
        let out = (self.start, self.len, self.checksum);
        *self = Self::default();
        Some(out)
    }

    /// Whether a readback is pending, without consuming the window
    fn pending(&self) -> bool {
        self.armed
    }
}

/// The transfer state machine. Owns the transport for the whole session,
/// so the port is released on every exit path when the engine (or the
/// transport it returns) is dropped.
pub struct ProtocolEngine<T: Transport> {
    transport: T,
    profile: ProcessorProfile,
    config: EngineConfig,
    state: EngineState,
}

impl<T: Transport> ProtocolEngine<T> {
    /// Create an engine around an open transport.
    pub fn new(transport: T, profile: ProcessorProfile, config: EngineConfig) -> Self {
        Self {
            transport,
            profile,
            config,
            state: EngineState::Idle,
        }
    }

    /// Current engine state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Give the transport back, e.g. to reuse the port
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Flash a parsed container onto the device.
    ///
    /// The container must come from [`UwfContainer::parse`], so format
    /// errors are caught before any transport activity. On any error the
    /// engine lands in [`EngineState::Failed`]; the transport is still
    /// released normally through ownership.
    pub fn flash(
        &mut self,
        container: &UwfContainer,
        progress: &mut dyn FlashProgress,
        cancel: &CancelToken,
    ) -> Result<FlashStats> {
        match self.run(container, progress, cancel) {
            Ok(stats) => {
                self.state = EngineState::Complete;
                progress.complete(&stats);
                log::info!(
                    "flash complete: {} records, {} data bytes, {} retries",
                    stats.records_sent,
                    stats.bytes_written,
                    stats.retries
                );
                Ok(stats)
            }
            Err(e) => {
                self.state = EngineState::Failed;
                Err(e)
            }
        }
    }

    fn run(
        &mut self,
        container: &UwfContainer,
        progress: &mut dyn FlashProgress,
        cancel: &CancelToken,
    ) -> Result<FlashStats> {
        self.state = EngineState::Connecting;
        self.transport.set_timeout(self.config.read_timeout)?;
        self.enter_bootloader()?;

        self.state = EngineState::Handshaking;
        progress.handshake_started();
        let ats = self.sync_with_bootloader()?;
        if !self.profile.matches_device(&ats) {
            return Err(ProtocolError::DeviceMismatch {
                profile: self.profile.name(),
                detail: format!("identifier {:?}", String::from_utf8_lossy(&ats)),
            }
            .into());
        }
        log::debug!(
            "device identified: {:?}",
            String::from_utf8_lossy(&ats).trim_end_matches('\0')
        );
        progress.device_identified(&ats);
        self.ack_identity()?;

        self.state = EngineState::Transferring;
        progress.transfer_started(container.records.len(), container.data_len());

        let mut map = MemoryMap::default();
        let mut window = VerifyWindow::default();
        let mut stats = FlashStats::default();
        let mut saw_eof = false;

        for (index, record) in container.records.iter().enumerate() {
            if cancel.is_cancelled() {
                log::warn!("cancelled before record {}; device needs a reset", index);
                return Err(Error::Cancelled);
            }

            match record.kind {
                RecordKind::Register => {
                    let bank = MemoryMap::parse_registration(&record.payload);
                    if !self.profile.validate_registration(&bank) {
                        return Err(ProtocolError::DeviceMismatch {
                            profile: self.profile.name(),
                            detail: format!("unexpected registration data {:?}", bank),
                        }
                        .into());
                    }
                    log::debug!("register bank {:?}", bank);
                    map.register(bank);
                }
                RecordKind::Select => {
                    map.select(record.payload[0])?;
                }
                RecordKind::SectorMap => {
                    map.set_sector_map(&record.payload)?;
                }
                RecordKind::Unregister => {
                    map.unregister(record.payload[0]);
                }
                RecordKind::Platform => {
                    self.send_platform(index, &record.payload)?;
                }
                RecordKind::Erase => {
                    let len = u32::from_le_bytes(record.payload[0..4].try_into().unwrap());
                    // The bootloader erases one sector per command.
                    for sector in map.sector_starts(record.address, len)? {
                        let addr = map.base_address().wrapping_add(sector);
                        self.send_with_retry(index, &wire::erase_frame(addr), progress, &mut stats)?;
                    }
                }
                RecordKind::Data => {
                    let adapted = self.profile.adapt(record, map.base_address());
                    let frame = wire::write_frame(adapted.address, &adapted.payload);
                    self.send_with_retry(index, &frame, progress, &mut stats)?;
                    stats.bytes_written += adapted.payload.len();
                    if self.config.verify {
                        window.extend(adapted.address, &adapted.payload);
                        if window.blocks >= self.config.verify_batch {
                            self.readback(&mut window)?;
                        }
                    }
                }
                RecordKind::EndOfFile => {
                    // Readback must land before the reboot marker.
                    if self.config.verify && window.pending() {
                        self.state = EngineState::Verifying;
                        progress.verifying();
                        self.readback(&mut window)?;
                    }
                    self.send_with_retry(index, &wire::reboot_frame(), progress, &mut stats)?;
                    saw_eof = true;
                }
            }

            stats.records_sent += 1;
            progress.record_sent(index, record.kind);
        }

        if self.config.verify && window.pending() {
            self.state = EngineState::Verifying;
            progress.verifying();
            self.readback(&mut window)?;
        }

        if !saw_eof {
            // No end marker in the image; reboot the module ourselves.
            // The bootloader does not acknowledge the reboot command.
            self.transport.write_bytes(&wire::reboot_frame())?;
        }

        if self.profile.reboot_via_break() {
            self.reset_via_break()?;
        }

        Ok(stats)
    }

    fn enter_bootloader(&mut self) -> Result<()> {
        self.transport.flush_input()?;
        if let Some(cmd) = self.profile.enter_command() {
            log::debug!("entering bootloader");
            self.transport.write_bytes(cmd)?;
            sleep(self.config.settle_delay);
            // Drop any command-mode echo before syncing.
            self.transport.flush_input()?;
        }
        Ok(())
    }

    fn sync_with_bootloader(&mut self) -> Result<Vec<u8>> {
        let mut ats = [0u8; wire::ATS_LEN];
        for attempt in 1..=self.config.handshake_attempts {
            self.transport.write_bytes(&[wire::SYNC])?;
            match self.transport.read_exact(&mut ats) {
                Ok(()) => return Ok(ats.to_vec()),
                Err(TransportError::Timeout) => {
                    log::debug!("handshake attempt {} timed out", attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ProtocolError::NoHandshake {
            attempts: self.config.handshake_attempts,
        }
        .into())
    }

    fn ack_identity(&mut self) -> Result<()> {
        self.transport.write_bytes(&[wire::ACK])?;
        match self.read_byte()? {
            wire::ACK => Ok(()),
            wire::NAK => Err(ProtocolError::DeviceReportedError.into()),
            response => Err(ProtocolError::UnexpectedResponse {
                command: wire::ACK as char,
                response,
            }
            .into()),
        }
    }

    /// One write-then-ack cycle with the per-record retry budget.
    /// Retries resend the identical frame; records are never skipped or
    /// reordered.
    fn send_with_retry(
        &mut self,
        index: usize,
        frame: &[u8],
        progress: &mut dyn FlashProgress,
        stats: &mut FlashStats,
    ) -> Result<()> {
        let attempts = self.config.record_attempts;
        for attempt in 1..=attempts {
            self.transport.write_bytes(frame)?;
            match self.read_ack_or_nak(frame[0])? {
                true => return Ok(()),
                false => {
                    log::warn!("record {}: attempt {} not acknowledged", index, attempt);
                }
            }
            if attempt < attempts {
                stats.retries += 1;
                progress.record_retry(index, attempt);
            }
        }
        Err(ProtocolError::RecordTransferFailed { index, attempts }.into())
    }

    /// Platform identity is special-cased: a nak means the image targets
    /// a different platform, which is a wrong-target condition and never
    /// retried. Timeouts still get the normal budget.
    fn send_platform(&mut self, index: usize, platform_id: &[u8]) -> Result<()> {
        let frame = wire::platform_frame(platform_id);
        let attempts = self.config.record_attempts;
        for _ in 1..=attempts {
            self.transport.write_bytes(&frame)?;
            match self.read_byte() {
                Ok(wire::ACK) => return Ok(()),
                Ok(wire::NAK) => {
                    return Err(ProtocolError::DeviceMismatch {
                        profile: self.profile.name(),
                        detail: "platform id rejected".into(),
                    }
                    .into());
                }
                Ok(other) => {
                    return Err(ProtocolError::UnexpectedResponse {
                        command: wire::CMD_PLATFORM as char,
                        response: other,
                    }
                    .into());
                }
                Err(TransportError::Timeout) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Err(ProtocolError::RecordTransferFailed { index, attempts }.into())
    }

    fn readback(&mut self, window: &mut VerifyWindow) -> Result<()> {
        if let Some((addr, len, checksum)) = window.take() {
            log::debug!("verify 0x{:08X}..+{} (sum 0x{:08X})", addr, len, checksum);
            self.transport
                .write_bytes(&wire::verify_frame(addr, len, checksum))?;
            match self.read_byte()? {
                wire::ACK => Ok(()),
                wire::NAK => Err(VerificationError::DeviceReadback { addr, len }.into()),
                other => Err(ProtocolError::UnexpectedResponse {
                    command: wire::CMD_VERIFY as char,
                    response: other,
                }
                .into()),
            }
        } else {
            Ok(())
        }
    }

    /// Reset the module by pulsing DTR and the UART break line, the way
    /// the BL65x dev boards wire their reset circuit.
    fn reset_via_break(&mut self) -> Result<()> {
        log::debug!("resetting module via UART break");
        self.transport.set_dtr(false)?;
        self.transport.set_break(true)?;
        sleep(self.config.break_hold);
        self.transport.set_break(false)?;
        self.transport.set_dtr(true)?;
        sleep(self.config.settle_delay);
        Ok(())
    }

    fn read_byte(&mut self) -> std::result::Result<u8, TransportError> {
        let mut byte = [0u8; 1];
        self.transport.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    /// `Ok(true)` for ack, `Ok(false)` for nak; anything else is fatal.
    fn read_ack_or_nak(&mut self, command: u8) -> Result<bool> {
        match self.read_byte() {
            Ok(wire::ACK) => Ok(true),
            Ok(wire::NAK) => Ok(false),
            Ok(other) => Err(ProtocolError::UnexpectedResponse {
                command: command as char,
                response: other,
            }
            .into()),
            // A silent device counts against the retry budget like a nak.
            Err(TransportError::Timeout) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn sleep(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}
