use serde::{Deserialize, Serialize};
use std::time::Duration;

/// LinePort configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinePortConfig {
    /// Global configuration
    #[serde(default)]
    pub global: GlobalConfig,
    /// File transfer settings
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Device configurations
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// Global configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Default log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Read timeout applied when a port is opened without one
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Line delimiter byte
    #[serde(default = "default_eol")]
    pub eol: u8,
}

/// Chunked file transfer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_delay")]
    pub chunk_delay_ms: u64,
}

/// Device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name
    pub name: String,
    /// Device description
    #[serde(default)]
    pub description: String,
    /// Serial line settings
    #[serde(flatten)]
    pub serial: SerialSettings,
    /// Custom commands
    #[serde(default)]
    pub commands: Vec<CustomCommand>,
}

/// Serial line settings handed to the platform layer when a port is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: ParityConfig,
    #[serde(default)]
    pub flow_control: FlowControlConfig,
}

/// Parity configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParityConfig {
    #[default]
    None,
    Odd,
    Even,
}

/// Flow control configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControlConfig {
    #[default]
    None,
    Hardware,
    Software,
}

/// Custom command definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomCommand {
    /// Command name
    pub name: String,
    /// Command description
    #[serde(default)]
    pub description: String,
    /// Text sent to the device, followed by CR+LF
    pub template: String,
    /// Expected response pattern (regex)
    #[serde(default)]
    pub response_pattern: Option<String>,
    /// Timeout in milliseconds
    #[serde(default = "default_command_timeout")]
    pub timeout_ms: u64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_read_timeout() -> u64 {
    1000
}

fn default_eol() -> u8 {
    crate::core::port::EOL_DEFAULT
}

fn default_chunk_size() -> usize {
    512
}

fn default_chunk_delay() -> u64 {
    100
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_command_timeout() -> u64 {
    1000
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            read_timeout_ms: default_read_timeout(),
            eol: default_eol(),
        }
    }
}

impl GlobalConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_delay_ms: default_chunk_delay(),
        }
    }
}

impl TransferConfig {
    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }
}

impl SerialSettings {
    /// 8N1 without flow control
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: ParityConfig::None,
            flow_control: FlowControlConfig::None,
        }
    }
}

impl LinePortConfig {
    /// Look up a device by name
    pub fn device(&self, name: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|device| device.name == name)
    }
}

impl DeviceConfig {
    /// Look up a custom command by name
    pub fn command(&self, name: &str) -> Option<&CustomCommand> {
        self.commands.iter().find(|command| command.name == name)
    }
}
