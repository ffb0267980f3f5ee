use log::{debug, error, info};
use serialport::SerialPort;
use std::time::Duration;

use super::port::Connector;
use crate::config::ParityConfig;
use crate::utils::error::ModbusError;

/// RS-485/RS-232 link, 8 data bits and 1 stop bit.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    path: String,
    baud_rate: u32,
    parity: ParityConfig,
}

impl SerialConnector {
    pub fn new(path: &str, baud_rate: u32, parity: ParityConfig) -> Self {
        Self {
            path: path.to_string(),
            baud_rate,
            parity,
        }
    }
}

impl Connector for SerialConnector {
    type Stream = Box<dyn SerialPort>;

    fn connect(&self) -> Result<Self::Stream, ModbusError> {
        info!("⚙️  Configuration: {} baud, 8 data bits, 1 stop bit, parity {:?}", self.baud_rate, self.parity);

        let serial_parity = match self.parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        };

        let port = serialport::new(&self.path, self.baud_rate)
            .timeout(Duration::from_millis(1000))
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serial_parity)
            .open()
            .map_err(|e| {
                error!("❌ Failed to open serial port {}: {}", self.path, e);
                ModbusError::ConnectionError(format!("Failed to open port {}: {}", self.path, e))
            })?;

        // stale bytes from a previous exchange would corrupt the next frame
        if let Err(e) = port.clear(serialport::ClearBuffer::All) {
            debug!("Could not clear buffers of {}: {}", self.path, e);
        }

        Ok(port)
    }

    fn set_read_timeout(&self, stream: &mut Self::Stream, timeout: Duration) -> Result<(), ModbusError> {
        stream.set_timeout(timeout)?;
        Ok(())
    }

    fn description(&self) -> String {
        format!("{} @ {} baud", self.path, self.baud_rate)
    }
}

/// Names and USB details of the serial ports present on this machine.
pub fn list_ports() -> Result<Vec<String>, ModbusError> {
    let ports = serialport::available_ports()?;

    Ok(ports
        .into_iter()
        .map(|port| match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => {
                let mut line = format!("{} (USB {:04x}:{:04x}", port.port_name, usb.vid, usb.pid);
                if let Some(manufacturer) = usb.manufacturer {
                    line.push_str(&format!(", {}", manufacturer));
                }
                if let Some(serial_number) = usb.serial_number {
                    line.push_str(&format!(", serial {}", serial_number));
                }
                line.push(')');
                line
            }
            _ => port.port_name,
        })
        .collect())
}
