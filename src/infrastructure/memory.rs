//! In-process simulated serial device.
//!
//! A [`MemoryDevice`] stands in for real hardware: bytes passed to
//! [`MemoryDevice::send`] become readable by the host, and everything the host
//! writes is captured. It doubles as a [`TransportOpener`], so a `LinePort`
//! built on it behaves exactly like one built on a serial port.

use crate::core::transport::{Transport, TransportOpener};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct DeviceState {
    to_host: VecDeque<u8>,
    from_host: Vec<u8>,
    produced: usize,
    echo: bool,
    read_fault: Option<io::ErrorKind>,
    refuse_open: bool,
    open_count: usize,
    last_open: Option<(String, u32)>,
    reads_in_flight: usize,
    read_calls: usize,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<DeviceState>,
    data_ready: Condvar,
}

/// Simulated device endpoint; clones share the same device
#[derive(Debug, Clone, Default)]
pub struct MemoryDevice {
    shared: Arc<Shared>,
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device that echoes every byte the host writes
    pub fn echoing() -> Self {
        let device = Self::new();
        device.set_echo(true);
        device
    }

    /// Make bytes available for the host to read
    pub fn send(&self, data: impl AsRef<[u8]>) {
        let data = data.as_ref();
        let mut state = self.shared.state.lock();
        state.to_host.extend(data.iter().copied());
        state.produced += data.len();
        self.shared.data_ready.notify_all();
    }

    /// Everything the host has written so far
    pub fn written(&self) -> Vec<u8> {
        self.shared.state.lock().from_host.clone()
    }

    pub fn set_echo(&self, echo: bool) {
        self.shared.state.lock().echo = echo;
    }

    /// Fail every subsequent read with a permanent error of `kind`
    pub fn fail_reads(&self, kind: io::ErrorKind) {
        self.shared.state.lock().read_fault = Some(kind);
        self.shared.data_ready.notify_all();
    }

    pub fn clear_fault(&self) {
        self.shared.state.lock().read_fault = None;
    }

    /// Reject subsequent open attempts
    pub fn refuse_open(&self, refuse: bool) {
        self.shared.state.lock().refuse_open = refuse;
    }

    pub fn open_count(&self) -> usize {
        self.shared.state.lock().open_count
    }

    /// Name and baud rate of the most recent successful open
    pub fn last_open(&self) -> Option<(String, u32)> {
        self.shared.state.lock().last_open.clone()
    }

    /// Bytes produced by the device and not yet read by the host
    pub fn pending(&self) -> usize {
        self.shared.state.lock().to_host.len()
    }

    /// Total bytes the device has produced, echoes included
    pub fn produced(&self) -> usize {
        self.shared.state.lock().produced
    }

    /// Host reads currently blocked on this device
    pub fn reads_in_flight(&self) -> usize {
        self.shared.state.lock().reads_in_flight
    }

    /// Transport reads attempted since the device was created
    pub fn read_calls(&self) -> usize {
        self.shared.state.lock().read_calls
    }
}

impl TransportOpener for MemoryDevice {
    fn open(&self, name: &str, baud: u32, _read_timeout: Duration) -> io::Result<Box<dyn Transport>> {
        let mut state = self.shared.state.lock();
        if state.refuse_open {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no simulated device at {}", name),
            ));
        }
        state.open_count += 1;
        state.last_open = Some((name.to_string(), baud));

        Ok(Box::new(MemoryTransport {
            shared: Arc::clone(&self.shared),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemoryTransport {
    shared: Arc<Shared>,
    closed: AtomicBool,
}

impl MemoryTransport {
    fn ensure_open(&self) -> io::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(io::Error::new(io::ErrorKind::NotConnected, "transport closed"))
        } else {
            Ok(())
        }
    }
}

impl Transport for MemoryTransport {
    fn read(&self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.ensure_open()?;
        let mut state = self.shared.state.lock();
        state.read_calls += 1;
        state.reads_in_flight += 1;
        self.shared.data_ready.wait_while_for(
            &mut state,
            |state| {
                state.to_host.is_empty()
                    && state.read_fault.is_none()
                    && !self.closed.load(Ordering::Acquire)
            },
            timeout,
        );
        state.reads_in_flight -= 1;

        if self.closed.load(Ordering::Acquire) {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "transport closed"));
        }

        if let Some(kind) = state.read_fault {
            return Err(io::Error::new(kind, "simulated device fault"));
        }
        let n = buf.len().min(state.to_host.len());
        for (slot, byte) in buf.iter_mut().zip(state.to_host.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&self, data: &[u8]) -> io::Result<usize> {
        self.ensure_open()?;
        let mut state = self.shared.state.lock();
        state.from_host.extend_from_slice(data);
        if state.echo {
            state.to_host.extend(data.iter().copied());
            state.produced += data.len();
            self.shared.data_ready.notify_all();
        }
        Ok(data.len())
    }

    fn close(&self) -> io::Result<()> {
        self.closed.store(true, Ordering::Release);
        self.shared.data_ready.notify_all();
        Ok(())
    }
}
