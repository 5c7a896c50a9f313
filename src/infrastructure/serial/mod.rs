// Serial module - serialport-backed transport
pub mod transport;

pub use transport::{available_ports, PortListing, SerialOpener, SerialTransport};
