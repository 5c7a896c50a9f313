use crate::cli::args::OutputFormat;
use crate::domain::config::{DeviceConfig, LinePortConfig};
use crate::infrastructure::serial::PortListing;
use serde::Serialize;
use std::io;
use tabled::{Table, Tabled};

/// Output writer trait for different formats
pub trait OutputWriter {
    fn write_ports(&self, ports: &[PortListing]) -> Result<(), OutputError>;
    fn write_config(&self, config: &LinePortConfig) -> Result<(), OutputError>;
    fn write_devices(&self, devices: &[DeviceConfig]) -> Result<(), OutputError>;
    fn write_report(&self, report: &SendReport) -> Result<(), OutputError>;
    fn write_line(&self, port: &str, line: &str) -> Result<(), OutputError>;
    fn write_message(&self, message: &str) -> Result<(), OutputError>;
    fn write_error(&self, error: &str) -> Result<(), OutputError>;
}

/// Output formatting errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl From<OutputError> for crate::domain::error::LinePortError {
    fn from(err: OutputError) -> Self {
        Self::Output(err.to_string())
    }
}

/// Outcome of a send, run or send-file command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendReport {
    pub port: String,
    pub bytes_sent: usize,
    pub matched: Option<String>,
}

/// Console output writer
pub struct ConsoleWriter {
    format: OutputFormat,
}

impl ConsoleWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

impl OutputWriter for ConsoleWriter {
    fn write_ports(&self, ports: &[PortListing]) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                if ports.is_empty() {
                    println!("No serial ports found");
                }
                for port in ports {
                    println!("{}  {}", port.name, port.kind);
                }
            }
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(ports)?),
            OutputFormat::Table => {
                let rows: Vec<PortTableRow> = ports.iter().map(PortTableRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }
        Ok(())
    }

    fn write_config(&self, config: &LinePortConfig) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                println!("LinePort Configuration:");
                println!("  Log level: {}", config.global.log_level);
                println!("  Read timeout: {}ms", config.global.read_timeout_ms);
                println!("  EOL: {}", describe_byte(config.global.eol));
                println!(
                    "  File transfer: {} byte chunks, {}ms apart",
                    config.transfer.chunk_size, config.transfer.chunk_delay_ms
                );

                if !config.devices.is_empty() {
                    println!("  Devices:");
                    for device in &config.devices {
                        let desc = if device.description.is_empty() { "No description" } else { &device.description };
                        println!("    {}: {}", device.name, desc);
                    }
                }
            }
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
            OutputFormat::Table => self.write_devices(&config.devices)?,
        }
        Ok(())
    }

    fn write_devices(&self, devices: &[DeviceConfig]) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                for device in devices {
                    println!("Device: {}", device.name);
                    let desc = if device.description.is_empty() { "No description" } else { &device.description };
                    println!("  Description: {}", desc);
                    println!("  Port: {} @ {}", device.serial.port, device.serial.baud_rate);
                    for command in &device.commands {
                        match &command.response_pattern {
                            Some(pattern) => println!("  Command {}: {} -> /{}/", command.name, command.template, pattern),
                            None => println!("  Command {}: {}", command.name, command.template),
                        }
                    }
                    println!();
                }
            }
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(devices)?),
            OutputFormat::Table => {
                let rows: Vec<DeviceTableRow> = devices.iter().map(DeviceTableRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }
        Ok(())
    }

    fn write_report(&self, report: &SendReport) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                println!("Sent {} bytes to {}", report.bytes_sent, report.port);
                if let Some(matched) = &report.matched {
                    println!("Matched: {}", matched);
                }
            }
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
            OutputFormat::Table => println!("{}", Table::new([SendTableRow::from(report)])),
        }
        Ok(())
    }

    fn write_line(&self, port: &str, line: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let record = serde_json::json!({ "port": port, "line": line });
                println!("{}", serde_json::to_string(&record)?);
            }
            OutputFormat::Text | OutputFormat::Table => println!("{}", line),
        }
        Ok(())
    }

    fn write_message(&self, message: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({ "message": message });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text | OutputFormat::Table => println!("{}", message),
        }
        Ok(())
    }

    fn write_error(&self, error: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({ "error": error });
                eprintln!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text | OutputFormat::Table => eprintln!("Error: {}", error),
        }
        Ok(())
    }
}

/// Printable form of a delimiter byte
pub fn describe_byte(byte: u8) -> String {
    match byte {
        b'\n' => "\\n".to_string(),
        b'\r' => "\\r".to_string(),
        b'\t' => "\\t".to_string(),
        b if b.is_ascii_graphic() => (b as char).to_string(),
        b => format!("0x{:02x}", b),
    }
}

#[derive(Tabled)]
struct PortTableRow {
    #[tabled(rename = "Port")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
}

impl From<&PortListing> for PortTableRow {
    fn from(port: &PortListing) -> Self {
        Self {
            name: port.name.clone(),
            kind: port.kind.clone(),
        }
    }
}

#[derive(Tabled)]
struct DeviceTableRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Port")]
    port: String,
    #[tabled(rename = "Baud")]
    baud_rate: u32,
    #[tabled(rename = "Commands")]
    commands: usize,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&DeviceConfig> for DeviceTableRow {
    fn from(device: &DeviceConfig) -> Self {
        Self {
            name: device.name.clone(),
            port: device.serial.port.clone(),
            baud_rate: device.serial.baud_rate,
            commands: device.commands.len(),
            description: device.description.clone(),
        }
    }
}

#[derive(Tabled)]
struct SendTableRow {
    #[tabled(rename = "Port")]
    port: String,
    #[tabled(rename = "Bytes sent")]
    bytes_sent: usize,
    #[tabled(rename = "Matched")]
    matched: String,
}

impl From<&SendReport> for SendTableRow {
    fn from(report: &SendReport) -> Self {
        Self {
            port: report.port.clone(),
            bytes_sent: report.bytes_sent,
            matched: report.matched.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_byte() {
        assert_eq!(describe_byte(b'\n'), "\\n");
        assert_eq!(describe_byte(b'\r'), "\\r");
        assert_eq!(describe_byte(b';'), ";");
        assert_eq!(describe_byte(0x03), "0x03");
    }

    #[test]
    fn test_send_report_json() {
        let report = SendReport {
            port: "sim".to_string(),
            bytes_sent: 4,
            matched: Some("OK".to_string()),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["bytes_sent"], 4);
        assert_eq!(json["matched"], "OK");
    }

    #[test]
    fn test_table_rows() {
        let row = SendTableRow::from(&SendReport {
            port: "sim".to_string(),
            bytes_sent: 2,
            matched: None,
        });
        let table = Table::new([row]).to_string();
        assert!(table.contains("Bytes sent"));
        assert!(table.contains("sim"));
    }
}
