//! CLI command implementations
//!
//! Each subcommand lives in its own module; shared here are file loading
//! and the indicatif-based progress reporters the interactive commands
//! render.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use uwfflash_core::protocol::{FlashProgress, FlashStats};
use uwfflash_core::uwf::RecordKind;

pub mod app;
pub mod flash;
pub mod inspect;

/// Read a whole binary file into memory
fn read_binary_file(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut file = File::open(path)
        .map_err(|e| format!("cannot open {}: {}", path.display(), e))?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    log::debug!("read {} bytes from {}", data.len(), path.display());
    Ok(data)
}

fn record_bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} records ({eta}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

fn byte_bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Progress reporter for the firmware path, one bar per phase
pub struct IndicatifProgress {
    current: Option<ProgressBar>,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self { current: None }
    }

    fn finish(&mut self, message: &str) {
        if let Some(pb) = self.current.take() {
            pb.finish_with_message(message.to_string());
        }
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashProgress for IndicatifProgress {
    fn handshake_started(&mut self) {
        self.current = Some(spinner("Contacting bootloader...".to_string()));
    }

    fn device_identified(&mut self, ats: &[u8]) {
        let id = String::from_utf8_lossy(ats);
        self.finish(&format!("Device: {}", id.trim_end_matches('\0').trim()));
    }

    fn transfer_started(&mut self, records: usize, data_bytes: usize) {
        let pb = ProgressBar::new(records as u64);
        pb.set_style(record_bar_style());
        log::info!("transferring {} records ({} data bytes)", records, data_bytes);
        self.current = Some(pb);
    }

    fn record_sent(&mut self, _index: usize, _kind: RecordKind) {
        if let Some(pb) = &self.current {
            pb.inc(1);
            pb.set_message("");
        }
    }

    fn record_retry(&mut self, index: usize, attempt: u32) {
        if let Some(pb) = &self.current {
            pb.set_message(format!("retrying record {} (attempt {})", index, attempt));
        }
    }

    fn verifying(&mut self) {
        if let Some(pb) = &self.current {
            pb.set_message("verifying");
        }
    }

    fn complete(&mut self, stats: &FlashStats) {
        self.finish(&format!(
            "done ({} bytes written, {} retries)",
            stats.bytes_written, stats.retries
        ));
    }
}
