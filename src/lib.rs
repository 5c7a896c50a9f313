//! LinePort Library
//!
//! Line-oriented access to serial devices: open a port, write text, read
//! lines as they arrive in the background, and wait for a regular expression
//! in the device's output with a timeout.

pub mod cli;
pub mod core;
pub mod domain;
pub mod infrastructure;

pub use core::observer::{ChannelObserver, FanoutObserver, NullObserver, PortEvent, PortEventKind, PortObserver, TracingObserver};
pub use core::port::{LinePort, LinePortBuilder, DEFAULT_READ_TIMEOUT, EOL_DEFAULT};
pub use core::transport::{Transport, TransportOpener};
pub use domain::config::LinePortConfig;
pub use domain::error::{LinePortError, LinePortResult};
pub use infrastructure::memory::MemoryDevice;
pub use infrastructure::serial::SerialOpener;
