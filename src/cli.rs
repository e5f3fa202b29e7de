//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uwfflash_core::profile::ProcessorProfile;

/// Generate dynamic help text for the variant argument
fn variant_help() -> String {
    let names: Vec<&str> = ProcessorProfile::ALL.iter().map(|p| p.name()).collect();
    format!("Target module variant [available: {}]", names.join(", "))
}

#[derive(Parser)]
#[command(name = "uwfflash")]
#[command(author, version, about = "Laird module firmware flasher", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Flash a firmware image over the module bootloader
    Flash {
        /// Serial port the module is attached to
        #[arg(short, long)]
        port: String,

        /// Baud rate
        #[arg(short, long, default_value = "115200")]
        baud: u32,

        /// Target module variant
        #[arg(long, default_value = "generic", help = variant_help())]
        variant: String,

        /// Firmware image (.uwf)
        image: PathBuf,

        /// Request device-side checksum readback during the transfer
        #[arg(long)]
        verify: bool,

        /// Transmissions attempted per record before giving up
        #[arg(long, default_value = "3")]
        attempts: u32,

        /// Serial read timeout in milliseconds
        #[arg(long, default_value = "3000")]
        timeout_ms: u64,
    },

    /// Upload a smartBASIC application over the AT interface
    App {
        /// Serial port the module is attached to
        #[arg(short, long)]
        port: String,

        /// Baud rate
        #[arg(short, long, default_value = "115200")]
        baud: u32,

        /// Compiled application (.uwc)
        image: PathBuf,

        /// Start the application after uploading
        #[arg(long)]
        run: bool,

        /// Skip the reset into command mode before uploading
        #[arg(long)]
        no_reset: bool,
    },

    /// Parse a firmware image and print its contents without touching a device
    Inspect {
        /// Firmware image (.uwf)
        image: PathBuf,
    },
}
