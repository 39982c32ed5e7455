//! Serial transport to the machine this crate drives (spec §6: pin bindings
//! remain an external collaborator — motion is computed in-core and
//! reported/driven over a line-oriented serial protocol).

pub mod serial;

pub use serial::{SerialConfig, SerialConnection, SerialStats};

use crate::config::Config;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not connected to hardware")]
    NotConnected,
    #[error("timeout waiting for response")]
    Timeout,
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Thin synchronous-request wrapper over the configured serial port, used
/// for one-shot command/response exchanges (connect handshake, config
/// push). `SerialConnection` (in `hardware::serial`) is the channel-backed
/// alternative for continuous streaming use.
#[derive(Debug)]
pub struct HardwareManager {
    port_name: String,
    baud: u32,
    serial: Option<SerialStream>,
}

impl HardwareManager {
    pub fn new(config: &Config) -> Self {
        Self { port_name: config.serial_port.clone(), baud: config.baud, serial: None }
    }

    pub async fn connect(&mut self) -> Result<(), HardwareError> {
        tracing::info!("connecting to {} at {} baud", self.port_name, self.baud);
        let port = tokio_serial::new(&self.port_name, self.baud)
            .timeout(Duration::from_millis(100))
            .open_native_async()?;
        self.serial = Some(port);
        tracing::info!("connected");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.serial.is_some()
    }

    pub async fn send_line(&mut self, line: &str) -> Result<String, HardwareError> {
        use tokio::time::timeout;
        let port = self.serial.as_mut().ok_or(HardwareError::NotConnected)?;
        tracing::debug!("-> {}", line);
        let framed = format!("{line}\n");
        port.write_all(framed.as_bytes()).await?;
        port.flush().await?;
        let mut buf = vec![0u8; 1024];
        let n = timeout(Duration::from_millis(500), port.read(&mut buf)).await.map_err(|_| HardwareError::Timeout)??;
        let response = String::from_utf8(buf[..n].to_vec())?.trim().to_string();
        tracing::debug!("<- {}", response);
        Ok(response)
    }

    pub async fn shutdown(&mut self) -> Result<(), HardwareError> {
        if let Some(port) = self.serial.as_mut() {
            let _ = port.write_all(b"shutdown\n").await;
            let _ = port.flush().await;
        }
        Ok(())
    }
}

impl Clone for HardwareManager {
    fn clone(&self) -> Self {
        Self { port_name: self.port_name.clone(), baud: self.baud, serial: None }
    }
}
