use std::io;
use std::time::Duration;

/// Byte-stream handle to a device, supplied by the platform layer.
///
/// Implementations must be usable from two threads at once: the reader loop
/// blocks in [`Transport::read`] while callers write.
pub trait Transport: Send + Sync {
    /// Read into `buf`, blocking for at most `timeout`.
    ///
    /// `Ok(0)` or an error classified by [`is_transient`] means no data arrived
    /// in time; any other error is permanent.
    fn read(&self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Write `data`, returning the number of bytes accepted
    fn write(&self, data: &[u8]) -> io::Result<usize>;

    /// Release the underlying device
    fn close(&self) -> io::Result<()>;
}

/// Acquires transports by device name
pub trait TransportOpener: Send + Sync {
    fn open(&self, name: &str, baud: u32, read_timeout: Duration) -> io::Result<Box<dyn Transport>>;
}

/// Read errors that only mean "nothing yet"
pub fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(is_transient(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(is_transient(&io::Error::from(io::ErrorKind::Interrupted)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(!is_transient(&io::Error::new(io::ErrorKind::Other, "unplugged")));
    }
}
