//! uwfflash - firmware and application flasher for Laird wireless modules
//!
//! Two independent paths share one serial port abstraction:
//! - **Firmware** (`flash`): streams a `.uwf` record container to the
//!   module's resident bootloader.
//! - **Applications** (`app`): stores a compiled smartBASIC `.uwc` file
//!   through the module's normal AT command interface.
//!
//! `inspect` parses an image offline, for checking a download before
//! pointing it at hardware.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let result = match cli.command {
        Commands::Flash {
            port,
            baud,
            variant,
            image,
            verify,
            attempts,
            timeout_ms,
        } => commands::flash::run(&commands::flash::FlashArgs {
            port,
            baud,
            variant,
            image,
            verify,
            attempts,
            timeout_ms,
        }),
        Commands::App {
            port,
            baud,
            image,
            run,
            no_reset,
        } => commands::app::run(&port, baud, &image, run, no_reset),
        Commands::Inspect { image } => commands::inspect::run(&image),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(exit_code(e.as_ref()));
    }
}

/// Map failures onto stable exit codes so wrappers can tell a bad image
/// from a bad cable.
fn exit_code(error: &(dyn std::error::Error + 'static)) -> i32 {
    use uwfflash_core::Error;

    match error.downcast_ref::<Error>() {
        Some(Error::Format(_)) | Some(Error::Verification(_)) => 2,
        Some(Error::Transport(_)) => 3,
        Some(Error::Protocol(_)) => 4,
        Some(Error::Cancelled) | None => 1,
    }
}
