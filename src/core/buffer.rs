use crate::domain::error::{LinePortError, LinePortResult};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// FIFO of received bytes not yet consumed by the caller.
///
/// The reader loop is the only appender. Every operation takes the same lock,
/// so a consumer never observes a half-applied append.
#[derive(Debug, Default)]
pub struct SharedBuffer {
    bytes: Mutex<VecDeque<u8>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, data: &[u8]) {
        self.bytes.lock().extend(data.iter().copied());
    }

    /// Pop the earliest unread byte
    pub fn read_byte(&self) -> LinePortResult<u8> {
        self.bytes.lock().pop_front().ok_or(LinePortError::BufferEmpty)
    }

    /// Pop everything up to and including the first `delimiter`
    pub fn read_until(&self, delimiter: u8) -> LinePortResult<Vec<u8>> {
        let mut bytes = self.bytes.lock();
        let end = bytes
            .iter()
            .position(|&b| b == delimiter)
            .ok_or(LinePortError::NoDelimiterYet)?;
        Ok(bytes.drain(..=end).collect())
    }

    /// Copy of the unread bytes, leaving them in place
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.lock().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.bytes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.lock().is_empty()
    }
}
