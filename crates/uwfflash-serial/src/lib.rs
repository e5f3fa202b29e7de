//! Serial port transport for uwfflash
//!
//! Wraps a [`serialport`] port behind the core
//! [`Transport`](uwfflash_core::transport::Transport) trait. The module
//! bootloader and AT interpreter both speak 8N1 with no flow control;
//! only the baud rate is selectable.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use uwfflash_core::error::TransportError;
use uwfflash_core::transport::Transport;

/// Serial port transport.
///
/// The OS handle is released on drop, so handing the value back through
/// `into_transport()` or letting it fall out of scope closes the port on
/// every exit path.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    device: String,
}

impl SerialTransport {
    /// Open a serial port at the given baud rate, 8N1, no flow control.
    pub fn open(device: &str, baud: u32) -> Result<Self, TransportError> {
        let port = serialport::new(device, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_secs(3))
            .open()
            .map_err(|e| TransportError::PortUnavailable(format!("{}: {}", device, e)))?;

        log::info!("opened serial port {} at {} baud", device, baud);

        Ok(Self {
            port,
            device: device.to_string(),
        })
    }

    /// Device path this transport was opened on
    pub fn device(&self) -> &str {
        &self.device
    }

    fn map_io(e: std::io::Error) -> TransportError {
        if e.kind() == std::io::ErrorKind::TimedOut {
            TransportError::Timeout
        } else {
            TransportError::Io(e.to_string())
        }
    }
}

impl Transport for SerialTransport {
    fn write_bytes(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(data).map_err(Self::map_io)?;
        self.port.flush().map_err(Self::map_io)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.port.read(buf) {
            Ok(0) => Err(TransportError::Timeout),
            Ok(n) => Ok(n),
            Err(e) => Err(Self::map_io(e)),
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        self.port.read_exact(buf).map_err(Self::map_io)
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    fn flush_input(&mut self) -> Result<(), TransportError> {
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    fn set_dtr(&mut self, level: bool) -> Result<(), TransportError> {
        self.port
            .write_data_terminal_ready(level)
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    fn set_break(&mut self, on: bool) -> Result<(), TransportError> {
        let result = if on {
            self.port.set_break()
        } else {
            self.port.clear_break()
        };
        result.map_err(|e| TransportError::Io(e.to_string()))
    }
}

/// List serial ports present on the system, for `--port` discovery.
pub fn available_ports() -> Vec<String> {
    match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(e) => {
            log::warn!("could not enumerate serial ports: {}", e);
            Vec::new()
        }
    }
}
