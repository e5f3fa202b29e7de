//! `uwfflash flash` - stream a firmware image to the bootloader

use std::path::PathBuf;
use std::time::Duration;

use uwfflash_core::profile::ProcessorProfile;
use uwfflash_core::protocol::{CancelToken, EngineConfig, ProtocolEngine};
use uwfflash_core::uwf::UwfContainer;
use uwfflash_serial::SerialTransport;

use super::{read_binary_file, IndicatifProgress};

pub struct FlashArgs {
    pub port: String,
    pub baud: u32,
    pub variant: String,
    pub image: PathBuf,
    pub verify: bool,
    pub attempts: u32,
    pub timeout_ms: u64,
}

pub fn run(args: &FlashArgs) -> Result<(), Box<dyn std::error::Error>> {
    let profile: ProcessorProfile = args.variant.parse()?;

    // Parse before opening the port: a corrupt image should never reach
    // the device.
    let data = read_binary_file(&args.image)?;
    let container = UwfContainer::parse(&data).map_err(uwfflash_core::Error::from)?;
    println!(
        "Image: {} records, {} data bytes",
        container.records.len(),
        container.data_len()
    );

    let transport = SerialTransport::open(&args.port, args.baud)
        .map_err(uwfflash_core::Error::from)?;

    let config = EngineConfig {
        record_attempts: args.attempts,
        read_timeout: Duration::from_millis(args.timeout_ms),
        verify: args.verify,
        ..EngineConfig::default()
    };

    let mut engine = ProtocolEngine::new(transport, profile, config);
    let stats = engine.flash(&container, &mut IndicatifProgress::new(), &CancelToken::new())?;

    println!(
        "Flashed {} records ({} bytes) on {}",
        stats.records_sent, stats.bytes_written, args.port
    );
    Ok(())
}
