//! uwfflash-core - UWF image decoding and bootloader transfer protocol
//!
//! This crate provides the device-independent half of the uwfflash tool:
//! parsing the UWF container format, adapting records for a target module
//! variant, and driving the bootloader's half-duplex serial protocol
//! through a byte-level [`transport::Transport`].
//!
//! Nothing in this crate performs serial I/O. The `uwfflash-serial` crate
//! supplies the real port; tests use a scripted mock.
//!
//! # Example
//!
//! ```ignore
//! use uwfflash_core::profile::ProcessorProfile;
//! use uwfflash_core::protocol::{CancelToken, EngineConfig, NoProgress, ProtocolEngine};
//! use uwfflash_core::uwf::UwfContainer;
//!
//! let container = UwfContainer::parse(&image_bytes)?;
//! let mut engine = ProtocolEngine::new(transport, ProcessorProfile::Bl654, EngineConfig::default());
//! let stats = engine.flash(&container, &mut NoProgress, &CancelToken::new())?;
//! println!("sent {} records", stats.records_sent);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod app;
pub mod error;
pub mod profile;
pub mod protocol;
pub mod transport;
pub mod uwf;

pub use error::{Error, Result};
