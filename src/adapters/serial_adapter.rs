//! Serial Hardware Adapter for USB-serial stepper driver boards
//!
//! Writes newline-terminated ASCII commands and never waits for a reply.

use super::{AdapterError, CommandSink};
use crate::config::SerialConfig;
use std::time::Duration;
use tracing::debug;

#[cfg(feature = "instrument_serial")]
use serialport::SerialPort;

/// Serial adapter for RS-232/USB-serial communication
///
/// This adapter wraps the serialport crate. It is constructed closed; call
/// [`SerialAdapter::connect`] to open the port.
pub struct SerialAdapter {
    /// Port name (e.g., "/dev/ttyUSB0", "COM7")
    port_name: String,

    /// Line speed; driver boards usually run at 115200
    baud_rate: u32,

    /// Write timeout
    timeout: Duration,

    /// Line terminator appended to every command
    line_terminator: String,

    #[cfg(feature = "instrument_serial")]
    port: Option<Box<dyn SerialPort>>,
}

impl SerialAdapter {
    /// Create a new serial adapter with default settings
    ///
    /// # Arguments
    /// * `port_name` - Serial port path (e.g., "/dev/ttyUSB0", "COM7")
    /// * `baud_rate` - Communication speed (e.g., 115200)
    ///
    /// Defaults: 1 second timeout, `"\n"` terminator.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            timeout: Duration::from_secs(1),
            line_terminator: "\n".to_string(),
            #[cfg(feature = "instrument_serial")]
            port: None,
        }
    }

    /// Build an adapter from the `[serial]` section. Returns `None` when no
    /// port is configured.
    pub fn from_config(config: &SerialConfig) -> Option<Self> {
        config.port.as_ref().map(|port| {
            Self::new(port.clone(), config.baud_rate)
                .with_timeout(Duration::from_millis(config.timeout_ms))
                .with_line_terminator(config.line_terminator.as_str())
        })
    }

    /// Set write timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the terminator appended to each command
    pub fn with_line_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.line_terminator = terminator.into();
        self
    }

    /// Port path this adapter targets.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Open the serial port.
    #[cfg(feature = "instrument_serial")]
    pub fn connect(&mut self) -> Result<(), AdapterError> {
        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(self.timeout)
            .open()
            .map_err(|e| {
                AdapterError::ConnectionFailed(format!(
                    "Failed to open serial port '{}' at {} baud: {}",
                    self.port_name, self.baud_rate, e
                ))
            })?;

        self.port = Some(port);
        debug!(port = %self.port_name, baud = self.baud_rate, "Serial port opened");
        Ok(())
    }

    /// Open the serial port.
    #[cfg(not(feature = "instrument_serial"))]
    pub fn connect(&mut self) -> Result<(), AdapterError> {
        Err(AdapterError::FeatureDisabled)
    }
}

impl CommandSink for SerialAdapter {
    #[cfg(feature = "instrument_serial")]
    fn send_line(&mut self, line: &str) -> Result<(), AdapterError> {
        use std::io::Write;

        let port = self.port.as_mut().ok_or(AdapterError::NotConnected)?;
        let framed = format!("{}{}", line, self.line_terminator);

        port.write_all(framed.as_bytes())
            .map_err(|e| AdapterError::SendFailed(format!("'{}': {}", line, e)))?;
        port.flush()
            .map_err(|e| AdapterError::SendFailed(format!("flush after '{}': {}", line, e)))?;

        debug!("Sent serial command: {}", line);
        Ok(())
    }

    #[cfg(not(feature = "instrument_serial"))]
    fn send_line(&mut self, _line: &str) -> Result<(), AdapterError> {
        Err(AdapterError::FeatureDisabled)
    }

    fn close(&mut self) -> Result<(), AdapterError> {
        #[cfg(feature = "instrument_serial")]
        {
            if self.port.take().is_some() {
                debug!(port = %self.port_name, "Serial port closed");
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        #[cfg(feature = "instrument_serial")]
        {
            self.port.is_some()
        }

        #[cfg(not(feature = "instrument_serial"))]
        {
            false
        }
    }

    fn adapter_type(&self) -> &str {
        "serial"
    }

    fn info(&self) -> String {
        format!("serial {} at {} baud", self.port_name, self.baud_rate)
    }
}
