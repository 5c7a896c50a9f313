use crate::core::buffer::SharedBuffer;
use crate::core::transport::{is_transient, Transport};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

const READ_CHUNK: usize = 256;

/// Background reader for one open session.
///
/// Runs on a blocking thread. It is the only appender to the shared buffer and
/// forwards every byte it appends, in order, to the line assembler.
pub(crate) struct ReaderLoop {
    pub session_id: String,
    pub name: String,
    pub transport: Arc<dyn Transport>,
    pub buffer: Arc<SharedBuffer>,
    pub bytes: mpsc::UnboundedSender<u8>,
    pub cancel: CancellationToken,
    pub poll_interval: Duration,
    pub fault: Arc<Mutex<Option<io::Error>>>,
}

impl ReaderLoop {
    pub fn run(self) {
        let mut rx_buff = vec![0u8; READ_CHUNK];

        while !self.cancel.is_cancelled() {
            let result = self.transport.read(&mut rx_buff, self.poll_interval);
            if self.cancel.is_cancelled() {
                break;
            }

            match result {
                Ok(0) => continue,
                Ok(n) => {
                    let data = &rx_buff[..n];
                    self.buffer.append(data);
                    if data.iter().any(|&b| self.bytes.send(b).is_err()) {
                        debug!(session = %self.session_id, "Line assembler gone, stopping reader");
                        break;
                    }
                }
                Err(ref e) if is_transient(e) => continue,
                Err(e) => {
                    error!(session = %self.session_id, "Failed to read from {}: {}", self.name, e);
                    *self.fault.lock() = Some(e);
                    self.cancel.cancel();
                    break;
                }
            }
        }

        debug!(session = %self.session_id, "Reader loop for {} stopped", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory::MemoryDevice;
    use crate::core::transport::TransportOpener;

    fn reader_for(device: &MemoryDevice) -> (ReaderLoop, mpsc::UnboundedReceiver<u8>) {
        let transport = device.open("sim", 9600, Duration::from_millis(10)).unwrap();
        let (bytes, receiver) = mpsc::unbounded_channel();
        let reader = ReaderLoop {
            session_id: "test".to_string(),
            name: "sim".to_string(),
            transport: Arc::from(transport),
            buffer: Arc::new(SharedBuffer::new()),
            bytes,
            cancel: CancellationToken::new(),
            poll_interval: Duration::from_millis(10),
            fault: Arc::new(Mutex::new(None)),
        };
        (reader, receiver)
    }

    #[test]
    fn test_reader_appends_and_forwards_in_order() {
        let device = MemoryDevice::new();
        let (reader, mut receiver) = reader_for(&device);
        let buffer = Arc::clone(&reader.buffer);
        let cancel = reader.cancel.clone();

        let handle = std::thread::spawn(move || reader.run());
        device.send("AT\r\n");

        let mut forwarded = Vec::new();
        while forwarded.len() < 4 {
            if let Ok(b) = receiver.try_recv() {
                forwarded.push(b);
            }
        }
        cancel.cancel();
        handle.join().unwrap();

        assert_eq!(forwarded, b"AT\r\n");
        assert_eq!(buffer.snapshot(), b"AT\r\n");
    }

    #[test]
    fn test_reader_records_permanent_fault() {
        let device = MemoryDevice::new();
        let (reader, _receiver) = reader_for(&device);
        let fault = Arc::clone(&reader.fault);
        let cancel = reader.cancel.clone();

        device.fail_reads(io::ErrorKind::BrokenPipe);
        reader.run();

        assert!(cancel.is_cancelled());
        let recorded = fault.lock().take().unwrap();
        assert_eq!(recorded.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_reader_stops_when_cancelled_before_read() {
        let device = MemoryDevice::new();
        let (reader, _receiver) = reader_for(&device);
        reader.cancel.cancel();
        device.send("late\n");
        let buffer = Arc::clone(&reader.buffer);

        reader.run();

        assert!(buffer.is_empty());
        assert_eq!(device.pending(), 5);
    }
}
