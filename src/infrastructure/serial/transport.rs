use crate::core::transport::{Transport, TransportOpener};
use crate::domain::config::{FlowControlConfig, ParityConfig, SerialSettings};
use parking_lot::Mutex;
use serde::Serialize;
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, info};

/// Opens serial ports with fixed line settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialOpener {
    data_bits: u8,
    stop_bits: u8,
    parity: ParityConfig,
    flow_control: FlowControlConfig,
}

impl Default for SerialOpener {
    fn default() -> Self {
        Self {
            data_bits: 8,
            stop_bits: 1,
            parity: ParityConfig::None,
            flow_control: FlowControlConfig::None,
        }
    }
}

impl SerialOpener {
    /// Line settings from `settings`; name and baud rate come from each open call
    pub fn from_settings(settings: &SerialSettings) -> Self {
        Self {
            data_bits: settings.data_bits,
            stop_bits: settings.stop_bits,
            parity: settings.parity,
            flow_control: settings.flow_control,
        }
    }

    fn builder(&self, name: &str, baud: u32, read_timeout: Duration) -> io::Result<serialport::SerialPortBuilder> {
        let data_bits = match self.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Invalid data bits: {}", other),
                ))
            }
        };

        let stop_bits = match self.stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Invalid stop bits: {}", other),
                ))
            }
        };

        let parity = match self.parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        };

        let flow_control = match self.flow_control {
            FlowControlConfig::None => serialport::FlowControl::None,
            FlowControlConfig::Software => serialport::FlowControl::Software,
            FlowControlConfig::Hardware => serialport::FlowControl::Hardware,
        };

        Ok(serialport::new(name, baud)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .flow_control(flow_control)
            .timeout(read_timeout))
    }
}

impl TransportOpener for SerialOpener {
    fn open(&self, name: &str, baud: u32, read_timeout: Duration) -> io::Result<Box<dyn Transport>> {
        let reader = self.builder(name, baud, read_timeout)?.open()?;
        let writer = reader.try_clone()?;

        info!("Serial port {} opened at {} baud", name, baud);

        Ok(Box::new(SerialTransport {
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
        }))
    }
}

/// Serial port split into independent read and write handles
pub struct SerialTransport {
    reader: Mutex<Option<Box<dyn SerialPort>>>,
    writer: Mutex<Option<Box<dyn SerialPort>>>,
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "serial port closed")
}

impl Transport for SerialTransport {
    fn read(&self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let mut guard = self.reader.lock();
        let port = guard.as_mut().ok_or_else(closed)?;
        if port.timeout() != timeout {
            port.set_timeout(timeout)?;
        }
        port.read(buf)
    }

    fn write(&self, data: &[u8]) -> io::Result<usize> {
        let mut guard = self.writer.lock();
        let port = guard.as_mut().ok_or_else(closed)?;
        let n = port.write(data)?;
        port.flush()?;
        debug!("Sent {} bytes over serial", n);
        Ok(n)
    }

    fn close(&self) -> io::Result<()> {
        // Dropping both handles releases the device
        self.writer.lock().take();
        self.reader.lock().take();
        Ok(())
    }
}

/// A serial port reported by the operating system
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortListing {
    pub name: String,
    pub kind: String,
}

/// Enumerate serial ports present on this machine
pub fn available_ports() -> io::Result<Vec<PortListing>> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|port| PortListing {
            name: port.port_name,
            kind: match port.port_type {
                serialport::SerialPortType::UsbPort(usb) => match usb.product {
                    Some(product) => format!("USB ({})", product),
                    None => format!("USB {:04x}:{:04x}", usb.vid, usb.pid),
                },
                serialport::SerialPortType::PciPort => "PCI".to_string(),
                serialport::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                serialport::SerialPortType::Unknown => "Unknown".to_string(),
            },
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_fails_gracefully() {
        // /dev/null is not a serial port
        let result = SerialOpener::default().open("/dev/null", 9600, Duration::from_millis(100));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_line_settings_rejected() {
        let mut settings = SerialSettings::new("/dev/ttyUSB0", 9600);
        settings.data_bits = 9;

        let err = SerialOpener::from_settings(&settings)
            .open("/dev/ttyUSB0", 9600, Duration::from_millis(100))
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(err.to_string().contains("data bits"));
    }

    #[test]
    fn test_opener_copies_line_settings() {
        let mut settings = SerialSettings::new("/dev/ttyACM0", 115200);
        settings.parity = ParityConfig::Odd;
        settings.stop_bits = 2;

        let opener = SerialOpener::from_settings(&settings);
        assert_eq!(opener.parity, ParityConfig::Odd);
        assert_eq!(opener.stop_bits, 2);
        assert_ne!(opener, SerialOpener::default());
    }
}
