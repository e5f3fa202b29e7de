//! smartBASIC application upload over the AT command surface
//!
//! Separate from the firmware path: applications are loaded while the
//! module runs its normal AT interpreter, not the bootloader. Commands
//! are CR-terminated text; the module answers with a `00` status line on
//! success or `01\t<code>` on failure.

use std::fmt::Write as _;
use std::time::Duration;

use crate::error::{ProtocolError, Result, TransportError};
use crate::transport::Transport;

/// Maximum length of a stored application name
pub const MAX_APP_NAME: usize = 24;

/// Bytes encoded per `AT+FWRH` line
const HEX_ROW_BYTES: usize = 16;

/// Tunable parameters for an AT session.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Timeout for every serial read
    pub read_timeout: Duration,
    /// Settle time after a module reset
    pub settle_delay: Duration,
    /// Hold time for the UART break during a reset
    pub break_hold: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(2),
            settle_delay: Duration::from_millis(500),
            break_hold: Duration::from_millis(100),
        }
    }
}

/// Progress events during an application upload.
pub trait UploadProgress {
    /// Another row of the application was written
    fn chunk_written(&mut self, _sent: usize, _total: usize) {}
}

/// No-op progress reporter
pub struct NoUploadProgress;

impl UploadProgress for NoUploadProgress {}

/// Sanitize a file name into a module-side application name.
///
/// The module's flash file system rejects `:*?"<>|` and path
/// separators, and truncates names beyond 24 characters.
pub fn app_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|' | '/' | '\\'))
        .take(MAX_APP_NAME)
        .collect()
}

/// Drives the module's AT interpreter to store and start applications.
pub struct AppLoader<T: Transport> {
    transport: T,
    config: AppConfig,
}

impl<T: Transport> AppLoader<T> {
    /// Create a loader around an open transport.
    pub fn new(transport: T, config: AppConfig) -> Self {
        Self { transport, config }
    }

    /// Give the transport back, e.g. to reuse the port
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Reset the module and confirm the AT interpreter answers.
    ///
    /// Needed when the module is stuck running an application that owns
    /// the UART; the reset drops it back into command mode.
    pub fn reset_into_command_mode(&mut self) -> Result<()> {
        log::debug!("resetting module into command mode");
        self.transport.set_timeout(self.config.read_timeout)?;
        self.transport.set_dtr(false)?;
        self.transport.set_break(true)?;
        sleep(self.config.break_hold);
        self.transport.set_break(false)?;
        self.transport.set_dtr(true)?;
        sleep(self.config.settle_delay);
        self.transport.flush_input()?;
        self.command("AT").map(|_| ())
    }

    /// Store `data` on the module under `name`, replacing any previous
    /// application of that name.
    pub fn upload(
        &mut self,
        name: &str,
        data: &[u8],
        progress: &mut dyn UploadProgress,
    ) -> Result<()> {
        self.transport.set_timeout(self.config.read_timeout)?;
        let name = app_name(name);
        log::info!("uploading application {:?} ({} bytes)", name, data.len());

        // Deleting a file that does not exist reports an error; the `+`
        // suffix asks the module to stay quiet about it, but tolerate
        // the error anyway for firmware that predates the suffix.
        match self.command(&format!("AT+DEL \"{}\" +", name)) {
            Ok(_) | Err(crate::Error::Protocol(ProtocolError::CommandError { .. })) => {}
            Err(e) => return Err(e),
        }

        self.command(&format!("AT+FOW \"{}\"", name))?;
        let mut sent = 0;
        for row in data.chunks(HEX_ROW_BYTES) {
            let mut hex = String::with_capacity(row.len() * 2);
            for b in row {
                // Infallible on String.
                let _ = write!(hex, "{:02x}", b);
            }
            self.command(&format!("AT+FWRH \"{}\"", hex))?;
            sent += row.len();
            progress.chunk_written(sent, data.len());
        }
        self.command("AT+FCL").map(|_| ())
    }

    /// Start a stored application by name.
    pub fn run_app(&mut self, name: &str) -> Result<()> {
        self.transport.set_timeout(self.config.read_timeout)?;
        self.command(&format!("AT+RUN \"{}\"", app_name(name)))
            .map(|_| ())
    }

    /// Send one AT command and collect its response up to the status
    /// line. Returns any data lines printed before the status.
    pub fn command(&mut self, command: &str) -> Result<String> {
        log::trace!("at> {}", command);
        self.transport.write_bytes(command.as_bytes())?;
        self.transport.write_bytes(b"\r")?;
        self.read_response(command)
    }

    fn read_response(&mut self, command: &str) -> Result<String> {
        let mut buf: Vec<u8> = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.transport.read_bytes(&mut byte) {
                Ok(0) => continue,
                Ok(_) => buf.push(byte[0]),
                Err(TransportError::Timeout) => {
                    return if buf.is_empty() {
                        Err(ProtocolError::NoResponse {
                            command: command.to_string(),
                        }
                        .into())
                    } else {
                        Err(ProtocolError::GarbledResponse {
                            command: command.to_string(),
                            response: String::from_utf8_lossy(&buf).into_owned(),
                        }
                        .into())
                    };
                }
                Err(e) => return Err(e.into()),
            }

            if buf.last() != Some(&b'\r') {
                continue;
            }
            // Status lines terminate the response; anything else is a
            // data line (e.g. a directory listing) and accumulates.
            let text = String::from_utf8_lossy(&buf);
            let line = text.trim_end_matches('\r').rsplit('\n').next().unwrap_or("");
            if line == "00" {
                let body_end = text.len() - line.len() - 1;
                return Ok(text[..text.len().min(body_end)].trim().to_string());
            }
            if let Some(code) = line.strip_prefix("01") {
                return Err(ProtocolError::CommandError {
                    command: command.to_string(),
                    code: code.trim().to_string(),
                }
                .into());
            }
        }
    }
}

fn sleep(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::transport::mock::{MockTransport, Step};

    fn test_config() -> AppConfig {
        AppConfig {
            settle_delay: Duration::ZERO,
            break_hold: Duration::ZERO,
            ..AppConfig::default()
        }
    }

    fn ok() -> Step {
        Step::Reply(b"\n00\r".to_vec())
    }

    #[test]
    fn sanitizes_application_names() {
        assert_eq!(app_name("blinky"), "blinky");
        assert_eq!(app_name("my:app?.sb"), "myapp.sb");
        assert_eq!(app_name("dir/sub\\app"), "dirsubapp");
        assert_eq!(app_name(&"x".repeat(40)).len(), MAX_APP_NAME);
    }

    #[test]
    fn command_returns_data_lines_before_the_status() {
        let script = vec![Step::Reply(b"\n06\t0\tblinky\r\n00\r".to_vec())];
        let mut loader = AppLoader::new(MockTransport::new(script), test_config());

        let body = loader.command("AT+DIR").unwrap();
        assert_eq!(body, "06\t0\tblinky");

        let transport = loader.into_transport();
        assert_eq!(transport.writes, vec![b"AT+DIR".to_vec(), b"\r".to_vec()]);
    }

    #[test]
    fn command_error_carries_the_module_code() {
        let script = vec![Step::Reply(b"\n01\t1802\r".to_vec())];
        let mut loader = AppLoader::new(MockTransport::new(script), test_config());

        let err = loader.command("AT+FOW \"x\"").unwrap_err();
        assert_eq!(
            err,
            Error::Protocol(ProtocolError::CommandError {
                command: "AT+FOW \"x\"".to_string(),
                code: "1802".to_string(),
            })
        );
    }

    #[test]
    fn silent_module_is_distinguished_from_garbage() {
        let mut loader = AppLoader::new(MockTransport::new(vec![]), test_config());
        assert!(matches!(
            loader.command("AT").unwrap_err(),
            Error::Protocol(ProtocolError::NoResponse { .. })
        ));

        let script = vec![Step::Reply(b"\xFF\xFE".to_vec())];
        let mut loader = AppLoader::new(MockTransport::new(script), test_config());
        assert!(matches!(
            loader.command("AT").unwrap_err(),
            Error::Protocol(ProtocolError::GarbledResponse { .. })
        ));
    }

    #[test]
    fn upload_deletes_opens_writes_hex_rows_and_closes() {
        // delete, open, two rows, close
        let script = vec![ok(), ok(), ok(), ok(), ok()];
        let mut loader = AppLoader::new(MockTransport::new(script), test_config());

        let data: Vec<u8> = (0u8..20).collect();
        loader
            .upload("blinky.sb", &data, &mut NoUploadProgress)
            .unwrap();

        let transport = loader.into_transport();
        let lines: Vec<&[u8]> = transport
            .writes
            .iter()
            .filter(|w| w.as_slice() != b"\r")
            .map(|w| w.as_slice())
            .collect();
        assert_eq!(
            lines,
            vec![
                b"AT+DEL \"blinky.sb\" +".as_slice(),
                b"AT+FOW \"blinky.sb\"",
                b"AT+FWRH \"000102030405060708090a0b0c0d0e0f\"",
                b"AT+FWRH \"10111213\"",
                b"AT+FCL",
            ]
        );
    }

    #[test]
    fn upload_tolerates_delete_of_missing_file() {
        let script = vec![
            Step::Reply(b"\n01\t1806\r".to_vec()), // nothing to delete
            ok(),
            ok(),
            ok(),
        ];
        let mut loader = AppLoader::new(MockTransport::new(script), test_config());
        loader
            .upload("app", &[0xAA], &mut NoUploadProgress)
            .unwrap();
    }

    #[test]
    fn reset_probes_the_interpreter() {
        let script = vec![ok()];
        let mut loader = AppLoader::new(MockTransport::new(script), test_config());
        loader.reset_into_command_mode().unwrap();

        let transport = loader.into_transport();
        assert_eq!(
            transport.control,
            vec![
                ("dtr", false),
                ("break", true),
                ("break", false),
                ("dtr", true),
            ]
        );
        assert_eq!(transport.flushes, 1);
        assert_eq!(transport.writes, vec![b"AT".to_vec(), b"\r".to_vec()]);
    }
}
