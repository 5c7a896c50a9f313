//! Observability hooks for a port session.
//!
//! The pipeline never prints or writes log files itself. It reports what
//! happens through a [`PortObserver`], and the binary decides how to render it.

use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Receives session events. All hooks default to doing nothing.
///
/// Hooks run inline on the task that produced the event, so they must not block.
pub trait PortObserver: Send + Sync {
    fn session_opened(&self, _name: &str, _baud: u32) {}

    fn session_closed(&self, _name: &str) {}

    fn bytes_transmitted(&self, _name: &str, _data: &[u8]) {}

    /// `line` is the raw framed line, delimiter included
    fn line_received(&self, _name: &str, _line: &[u8]) {}

    fn pattern_matched(&self, _name: &str, _pattern: &str, _matched: &str) {}

    fn pattern_timed_out(&self, _name: &str, _pattern: &str, _timeout: Duration) {}
}

/// Observer that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl PortObserver for NullObserver {}

/// Reports events as `tracing` records
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PortObserver for TracingObserver {
    fn session_opened(&self, name: &str, baud: u32) {
        info!(port = name, "Serial port {}@{} open", name, baud);
    }

    fn session_closed(&self, name: &str) {
        info!(port = name, "Serial port {} closed", name);
    }

    fn bytes_transmitted(&self, name: &str, data: &[u8]) {
        debug!(port = name, "Tx >> {}", String::from_utf8_lossy(data));
    }

    fn line_received(&self, name: &str, line: &[u8]) {
        debug!(port = name, "Rx << {}", String::from_utf8_lossy(line));
    }

    fn pattern_matched(&self, name: &str, pattern: &str, matched: &str) {
        info!(port = name, "Pattern \"{}\" matched: \"{}\"", pattern, matched);
    }

    fn pattern_timed_out(&self, name: &str, pattern: &str, timeout: Duration) {
        warn!(port = name, "Unable to match pattern \"{}\" within {:?}", pattern, timeout);
    }
}

/// A session event as delivered by [`ChannelObserver`]
#[derive(Debug, Clone)]
pub struct PortEvent {
    pub timestamp: SystemTime,
    pub port: String,
    pub kind: PortEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortEventKind {
    Opened { baud: u32 },
    Closed,
    Transmitted(Vec<u8>),
    LineReceived(Vec<u8>),
    PatternMatched { pattern: String, matched: String },
    PatternTimedOut { pattern: String, timeout: Duration },
}

/// Forwards events over an unbounded channel.
///
/// Events are dropped silently once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<PortEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PortEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn emit(&self, port: &str, kind: PortEventKind) {
        let _ = self.sender.send(PortEvent {
            timestamp: SystemTime::now(),
            port: port.to_string(),
            kind,
        });
    }
}

impl PortObserver for ChannelObserver {
    fn session_opened(&self, name: &str, baud: u32) {
        self.emit(name, PortEventKind::Opened { baud });
    }

    fn session_closed(&self, name: &str) {
        self.emit(name, PortEventKind::Closed);
    }

    fn bytes_transmitted(&self, name: &str, data: &[u8]) {
        self.emit(name, PortEventKind::Transmitted(data.to_vec()));
    }

    fn line_received(&self, name: &str, line: &[u8]) {
        self.emit(name, PortEventKind::LineReceived(line.to_vec()));
    }

    fn pattern_matched(&self, name: &str, pattern: &str, matched: &str) {
        self.emit(
            name,
            PortEventKind::PatternMatched {
                pattern: pattern.to_string(),
                matched: matched.to_string(),
            },
        );
    }

    fn pattern_timed_out(&self, name: &str, pattern: &str, timeout: Duration) {
        self.emit(
            name,
            PortEventKind::PatternTimedOut {
                pattern: pattern.to_string(),
                timeout,
            },
        );
    }
}

/// Dispatches each event to several observers in order
#[derive(Default, Clone)]
pub struct FanoutObserver {
    observers: Vec<Arc<dyn PortObserver>>,
}

impl FanoutObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn PortObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

impl PortObserver for FanoutObserver {
    fn session_opened(&self, name: &str, baud: u32) {
        self.observers.iter().for_each(|o| o.session_opened(name, baud));
    }

    fn session_closed(&self, name: &str) {
        self.observers.iter().for_each(|o| o.session_closed(name));
    }

    fn bytes_transmitted(&self, name: &str, data: &[u8]) {
        self.observers.iter().for_each(|o| o.bytes_transmitted(name, data));
    }

    fn line_received(&self, name: &str, line: &[u8]) {
        self.observers.iter().for_each(|o| o.line_received(name, line));
    }

    fn pattern_matched(&self, name: &str, pattern: &str, matched: &str) {
        self.observers
            .iter()
            .for_each(|o| o.pattern_matched(name, pattern, matched));
    }

    fn pattern_timed_out(&self, name: &str, pattern: &str, timeout: Duration) {
        self.observers
            .iter()
            .for_each(|o| o.pattern_timed_out(name, pattern, timeout));
    }
}
