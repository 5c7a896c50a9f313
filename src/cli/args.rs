use crate::domain::config::{FlowControlConfig, ParityConfig, SerialSettings};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Command line arguments for LinePort
#[derive(Parser, Debug)]
#[command(
    name = "lineport",
    version = env!("CARGO_PKG_VERSION"),
    about = "Line-oriented serial device communication tool",
    long_about = "Send text or bytes to a serial device, watch its output line by line, and wait for expected responses with a timeout."
)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress logging
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Talk to an in-memory echo device instead of real hardware
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List available serial ports
    Ports,
    /// Send data and optionally wait for a response
    Send(SendArgs),
    /// Print lines received from a device
    Monitor(MonitorArgs),
    /// Send a file in chunks
    SendFile(SendFileArgs),
    /// Run a command defined for a configured device
    Run(RunArgs),
    /// Configuration management commands
    Config(ConfigArgs),
    /// Display version information
    Version,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
    /// Table output
    Table,
}

/// Serial port selection shared by the port commands
#[derive(ClapArgs, Debug, Clone)]
pub struct PortArgs {
    /// Serial port path
    #[arg(short, long)]
    pub port: String,

    /// Baud rate
    #[arg(short, long, default_value = "9600")]
    pub baud: u32,

    /// Data bits
    #[arg(long, default_value = "8")]
    pub data_bits: u8,

    /// Stop bits
    #[arg(long, default_value = "1")]
    pub stop_bits: u8,

    /// Parity (none, even, odd)
    #[arg(long, value_enum, default_value = "none")]
    pub parity: ParityArg,

    /// Flow control (none, software, hardware)
    #[arg(long, value_enum, default_value = "none")]
    pub flow_control: FlowControlArg,

    /// Line read timeout in milliseconds
    #[arg(long)]
    pub read_timeout_ms: Option<u64>,

    /// Line delimiter: a single character, an escape such as \r, or hex such as 0x0d
    #[arg(long)]
    pub eol: Option<String>,
}

/// Send arguments
#[derive(ClapArgs, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub port: PortArgs,

    /// Data to send
    pub data: String,

    /// Data format (text, hex, base64)
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: DataFormat,

    /// Append CR+LF after the data
    #[arg(short, long)]
    pub line: bool,

    /// Regular expression to wait for after sending
    #[arg(short, long)]
    pub expect: Option<String>,

    /// How long to wait for the expected response, in milliseconds
    #[arg(short, long, default_value = "1000")]
    pub timeout: u64,
}

/// Monitor arguments
#[derive(ClapArgs, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub port: PortArgs,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(short, long)]
    pub duration: Option<u64>,
}

/// File transfer arguments
#[derive(ClapArgs, Debug)]
pub struct SendFileArgs {
    #[command(flatten)]
    pub port: PortArgs,

    /// File to send
    pub path: PathBuf,
}

/// Configured command arguments
#[derive(ClapArgs, Debug)]
pub struct RunArgs {
    /// Device name from the configuration
    pub device: String,

    /// Command name defined for that device
    pub command: String,
}

/// Configuration management arguments
#[derive(ClapArgs, Debug)]
pub struct ConfigArgs {
    /// Configuration subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Configuration management subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,
    /// Validate configuration
    Validate {
        /// Configuration file path
        file: Option<String>,
    },
    /// Create default configuration
    Init {
        /// Directory for the project configuration
        #[arg(short, long)]
        dir: Option<String>,
        /// Write the global configuration instead
        #[arg(short, long)]
        global: bool,
    },
    /// List device configurations
    Devices,
}

/// Parity configuration argument
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum ParityArg {
    None,
    Even,
    Odd,
}

/// Flow control configuration argument
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum FlowControlArg {
    None,
    Software,
    Hardware,
}

/// Data format argument
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Text,
    Hex,
    Base64,
}

impl From<ParityArg> for ParityConfig {
    fn from(parity: ParityArg) -> Self {
        match parity {
            ParityArg::None => Self::None,
            ParityArg::Even => Self::Even,
            ParityArg::Odd => Self::Odd,
        }
    }
}

impl From<FlowControlArg> for FlowControlConfig {
    fn from(flow_control: FlowControlArg) -> Self {
        match flow_control {
            FlowControlArg::None => Self::None,
            FlowControlArg::Software => Self::Software,
            FlowControlArg::Hardware => Self::Hardware,
        }
    }
}

impl From<&PortArgs> for SerialSettings {
    fn from(args: &PortArgs) -> Self {
        Self {
            port: args.port.clone(),
            baud_rate: args.baud,
            data_bits: args.data_bits,
            stop_bits: args.stop_bits,
            parity: args.parity.into(),
            flow_control: args.flow_control.into(),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Table => write!(f, "table"),
        }
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataFormat::Text => write!(f, "text"),
            DataFormat::Hex => write!(f, "hex"),
            DataFormat::Base64 => write!(f, "base64"),
        }
    }
}
