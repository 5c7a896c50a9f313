// Core module - line ingestion pipeline and port controller
pub mod assembler;
pub mod buffer;
pub mod observer;
pub mod pattern;
pub mod port;
pub(crate) mod reader;
pub mod transport;

pub use buffer::SharedBuffer;
pub use observer::{ChannelObserver, FanoutObserver, NullObserver, PortEvent, PortEventKind, PortObserver, TracingObserver};
pub use port::{LinePort, LinePortBuilder, DEFAULT_READ_TIMEOUT, EOL_DEFAULT};
pub use transport::{Transport, TransportOpener};
