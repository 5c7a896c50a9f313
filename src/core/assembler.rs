use crate::core::observer::PortObserver;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Splits a byte stream into lines on a delimiter supplied per byte.
#[derive(Debug, Default)]
pub struct LineFramer {
    line: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte; returns the finished line, delimiter included, when `byte == eol`
    pub fn push(&mut self, byte: u8, eol: u8) -> Option<Vec<u8>> {
        self.line.push(byte);
        if byte == eol {
            Some(std::mem::take(&mut self.line))
        } else {
            None
        }
    }

    /// Bytes received since the last delimiter
    pub fn pending(&self) -> &[u8] {
        &self.line
    }
}

/// Background line assembler for one open session.
///
/// Consumes bytes from the reader loop, reports each completed line to the
/// observer and wakes every pending line reader.
pub(crate) struct LineAssembler {
    pub session_id: String,
    pub name: String,
    pub bytes: mpsc::UnboundedReceiver<u8>,
    pub eol: Arc<AtomicU8>,
    pub line_ready: Arc<Notify>,
    pub observer: Arc<dyn PortObserver>,
    pub cancel: CancellationToken,
}

impl LineAssembler {
    pub async fn run(mut self) {
        let mut framer = LineFramer::new();

        loop {
            let byte = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                byte = self.bytes.recv() => match byte {
                    Some(byte) => byte,
                    None => break,
                },
            };

            if let Some(line) = framer.push(byte, self.eol.load(Ordering::Acquire)) {
                self.observer.line_received(&self.name, &line);
                self.line_ready.notify_waiters();
            }
        }

        debug!(
            session = %self.session_id,
            "Line assembler for {} stopped with {} unframed bytes",
            self.name,
            framer.pending().len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::observer::{ChannelObserver, PortEventKind};

    #[test]
    fn test_framer_splits_on_eol() {
        let mut framer = LineFramer::new();
        let lines: Vec<_> = b"READY\nOK DONE\npartial"
            .iter()
            .filter_map(|&b| framer.push(b, b'\n'))
            .collect();

        assert_eq!(lines, vec![b"READY\n".to_vec(), b"OK DONE\n".to_vec()]);
        assert_eq!(framer.pending(), b"partial");
    }

    #[test]
    fn test_framer_eol_change_applies_to_later_bytes() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b'a', b'\n'), None);
        assert_eq!(framer.push(b';', b'\n'), None);
        // Delimiter switched mid-line: the accumulated bytes join the next line
        assert_eq!(framer.push(b';', b';'), Some(b"a;;".to_vec()));
    }

    #[tokio::test]
    async fn test_assembler_reports_lines_and_stops_on_channel_close() {
        let (observer, mut events) = ChannelObserver::new();
        let (sender, bytes) = mpsc::unbounded_channel();
        let assembler = LineAssembler {
            session_id: "test".to_string(),
            name: "sim".to_string(),
            bytes,
            eol: Arc::new(AtomicU8::new(b'\n')),
            line_ready: Arc::new(Notify::new()),
            observer: Arc::new(observer),
            cancel: CancellationToken::new(),
        };

        for &b in b"AT\r\nOK\n" {
            sender.send(b).unwrap();
        }
        drop(sender);
        assembler.run().await;

        assert_eq!(
            events.recv().await.unwrap().kind,
            PortEventKind::LineReceived(b"AT\r\n".to_vec())
        );
        assert_eq!(
            events.recv().await.unwrap().kind,
            PortEventKind::LineReceived(b"OK\n".to_vec())
        );
    }

    #[tokio::test]
    async fn test_assembler_stops_on_cancel() {
        let (_sender, bytes) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let assembler = LineAssembler {
            session_id: "test".to_string(),
            name: "sim".to_string(),
            bytes,
            eol: Arc::new(AtomicU8::new(b'\n')),
            line_ready: Arc::new(Notify::new()),
            observer: Arc::new(crate::core::observer::NullObserver),
            cancel: cancel.clone(),
        };

        let handle = tokio::spawn(assembler.run());
        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("assembler did not stop")
            .unwrap();
    }
}
