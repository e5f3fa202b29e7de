//! Byte-level transport abstraction
//!
//! The protocol engine and the application loader only ever talk to a
//! [`Transport`]: byte-level send/receive with an explicit timeout and the
//! two modem-control lines the module's reset circuit uses. The
//! `uwfflash-serial` crate provides the real serial port implementation;
//! tests script a mock.

use std::time::Duration;

use crate::error::TransportError;

/// Byte-level transport with explicit timeouts.
///
/// No operation may block indefinitely: reads return
/// [`TransportError::Timeout`] when nothing arrives within the configured
/// timeout. Implementations release the underlying port when dropped, so
/// ownership transfer is the resource-release mechanism on every exit
/// path.
pub trait Transport {
    /// Write all bytes to the link
    fn write_bytes(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read up to `buf.len()` bytes within the configured timeout.
    ///
    /// Returns the number of bytes read; fails with
    /// [`TransportError::Timeout`] if nothing arrives at all.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Read exactly `buf.len()` bytes within the configured timeout
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError>;

    /// Set the read timeout for subsequent operations
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError>;

    /// Discard anything pending in the receive buffer
    fn flush_input(&mut self) -> Result<(), TransportError>;

    /// Drive the DTR line
    fn set_dtr(&mut self, level: bool) -> Result<(), TransportError>;

    /// Assert or release the UART break condition
    fn set_break(&mut self, on: bool) -> Result<(), TransportError>;
}
