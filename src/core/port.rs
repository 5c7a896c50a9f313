//! Port controller: session lifecycle and the caller-facing byte/line API.
//!
//! Opening a port starts two background tasks. The reader loop pulls bytes from
//! the transport into the shared buffer; the line assembler frames them and
//! wakes line readers. Both hold the session's cancellation token and are
//! joined by [`LinePort::close`].

use crate::core::assembler::LineAssembler;
use crate::core::buffer::SharedBuffer;
use crate::core::observer::{PortObserver, TracingObserver};
use crate::core::reader::ReaderLoop;
use crate::core::transport::{Transport, TransportOpener};
use crate::domain::config::{GlobalConfig, TransferConfig};
use crate::domain::error::{LinePortError, LinePortResult};
use crate::infrastructure::serial::SerialOpener;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Line feed
pub const EOL_DEFAULT: u8 = b'\n';

/// Read timeout used when `open` is called without one
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest a single transport read may block the reader loop
pub const READ_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// State of one open transport
struct Session {
    id: String,
    name: String,
    baud: u32,
    read_timeout: Duration,
    transport: Arc<dyn Transport>,
    buffer: Arc<SharedBuffer>,
    line_ready: Arc<Notify>,
    cancel: CancellationToken,
    fault: Arc<Mutex<Option<io::Error>>>,
    tasks: Mutex<Option<SessionTasks>>,
}

struct SessionTasks {
    reader: JoinHandle<()>,
    assembler: JoinHandle<()>,
}

impl Session {
    fn io_error(&self, operation: &'static str, source: io::Error) -> LinePortError {
        LinePortError::TransportIo {
            name: self.name.clone(),
            operation,
            source,
        }
    }
}

struct PortInner {
    opener: Arc<dyn TransportOpener>,
    observer: Arc<dyn PortObserver>,
    eol: Arc<AtomicU8>,
    default_read_timeout: Duration,
    transfer: TransferConfig,
    /// Serializes open, close and auto-close
    lifecycle: tokio::sync::Mutex<()>,
    session: Mutex<Option<Arc<Session>>>,
}

impl Drop for PortInner {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            // Cannot join from Drop; the tasks exit on their own once cancelled
            warn!("LinePort dropped while \"{}\" was open", session.name);
            session.cancel.cancel();
        }
    }
}

/// A line-oriented serial port.
///
/// Cloning is cheap and every clone drives the same session.
#[derive(Clone)]
pub struct LinePort {
    inner: Arc<PortInner>,
}

/// One line returned by the internal line reader
pub(crate) struct LineRead {
    pub text: String,
    pub complete: bool,
}

/// Configures a [`LinePort`]
pub struct LinePortBuilder {
    opener: Option<Arc<dyn TransportOpener>>,
    observer: Arc<dyn PortObserver>,
    eol: u8,
    read_timeout: Duration,
    transfer: TransferConfig,
}

impl Default for LinePortBuilder {
    fn default() -> Self {
        Self {
            opener: None,
            observer: Arc::new(TracingObserver),
            eol: EOL_DEFAULT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            transfer: TransferConfig::default(),
        }
    }
}

impl LinePortBuilder {
    /// Transport source; defaults to 8N1 serial ports
    pub fn opener(mut self, opener: Arc<dyn TransportOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn PortObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn eol(mut self, eol: u8) -> Self {
        self.eol = eol;
        self
    }

    pub fn read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn transfer(mut self, transfer: TransferConfig) -> Self {
        self.transfer = transfer;
        self
    }

    /// Apply EOL and read timeout from the global configuration
    pub fn global_config(self, global: &GlobalConfig) -> Self {
        self.eol(global.eol).read_timeout(global.read_timeout())
    }

    pub fn build(self) -> LinePort {
        LinePort {
            inner: Arc::new(PortInner {
                opener: self
                    .opener
                    .unwrap_or_else(|| Arc::new(SerialOpener::default())),
                observer: self.observer,
                eol: Arc::new(AtomicU8::new(self.eol)),
                default_read_timeout: self.read_timeout,
                transfer: self.transfer,
                lifecycle: tokio::sync::Mutex::new(()),
                session: Mutex::new(None),
            }),
        }
    }
}

impl Default for LinePort {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for LinePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinePort")
            .field("name", &self.name())
            .field("open", &self.is_open())
            .field("eol", &self.eol())
            .finish()
    }
}

impl LinePort {
    /// Serial port with default settings
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> LinePortBuilder {
        LinePortBuilder::default()
    }

    /// Open `name` at `baud` and start the background reader and line assembler.
    ///
    /// `timeout` bounds each [`LinePort::read_line`] wait; it defaults to the
    /// builder's read timeout.
    pub async fn open(&self, name: &str, baud: u32, timeout: Option<Duration>) -> LinePortResult<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;

        let existing = self.inner.session.lock().clone();
        if let Some(session) = existing {
            if !session.cancel.is_cancelled() {
                return Err(LinePortError::AlreadyOpen { name: name.to_string() });
            }
            // Reader died; reap it before reopening
            self.inner.session.lock().take();
            if let Err(e) = self.teardown(&session).await {
                warn!("Failed to close faulted session on {}: {}", session.name, e);
            }
        }

        let read_timeout = timeout.unwrap_or(self.inner.default_read_timeout);
        let transport: Arc<dyn Transport> = self
            .inner
            .opener
            .open(name, baud, reader_poll_interval(read_timeout))
            .map(Arc::from)
            .map_err(|source| LinePortError::TransportOpenFailed {
                name: name.to_string(),
                source,
            })?;

        let session_id = format!("port_{}", uuid::Uuid::new_v4().simple());
        let buffer = Arc::new(SharedBuffer::new());
        let line_ready = Arc::new(Notify::new());
        let cancel = CancellationToken::new();
        let fault = Arc::new(Mutex::new(None));
        let (byte_sender, byte_receiver) = mpsc::unbounded_channel();

        let reader = ReaderLoop {
            session_id: session_id.clone(),
            name: name.to_string(),
            transport: Arc::clone(&transport),
            buffer: Arc::clone(&buffer),
            bytes: byte_sender,
            cancel: cancel.clone(),
            poll_interval: reader_poll_interval(read_timeout),
            fault: Arc::clone(&fault),
        };
        let assembler = LineAssembler {
            session_id: session_id.clone(),
            name: name.to_string(),
            bytes: byte_receiver,
            eol: Arc::clone(&self.inner.eol),
            line_ready: Arc::clone(&line_ready),
            observer: Arc::clone(&self.inner.observer),
            cancel: cancel.clone(),
        };

        let tasks = SessionTasks {
            reader: tokio::task::spawn_blocking(move || reader.run()),
            assembler: tokio::spawn(assembler.run()),
        };

        info!(session = %session_id, "Opened {} at {} baud", name, baud);

        *self.inner.session.lock() = Some(Arc::new(Session {
            id: session_id,
            name: name.to_string(),
            baud,
            read_timeout,
            transport,
            buffer,
            line_ready,
            cancel,
            fault,
            tasks: Mutex::new(Some(tasks)),
        }));
        self.inner.observer.session_opened(name, baud);

        Ok(())
    }

    /// Stop the background tasks, wait for them to exit and close the transport.
    ///
    /// Closing a port that is not open does nothing.
    pub async fn close(&self) -> LinePortResult<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;

        let session = self.inner.session.lock().take();
        let Some(session) = session else {
            return Ok(());
        };
        self.teardown(&session).await
    }

    /// Caller must hold the lifecycle lock and have removed `session` from the slot
    async fn teardown(&self, session: &Session) -> LinePortResult<()> {
        session.cancel.cancel();

        let tasks = session.tasks.lock().take();
        if let Some(tasks) = tasks {
            if let Err(e) = tasks.reader.await {
                warn!(session = %session.id, "Reader loop ended abnormally: {}", e);
            }
            if let Err(e) = tasks.assembler.await {
                warn!(session = %session.id, "Line assembler ended abnormally: {}", e);
            }
        }

        let result = session
            .transport
            .close()
            .map_err(|source| session.io_error("close", source));

        info!(session = %session.id, "Closed {}", session.name);
        self.inner.observer.session_closed(&session.name);
        result
    }

    /// The open session, reaping it first if its reader has failed
    async fn active_session(&self) -> LinePortResult<Arc<Session>> {
        let session = self.inner.session.lock().clone();
        let session = session.ok_or(LinePortError::NotOpen)?;
        if session.cancel.is_cancelled() {
            return Err(self.session_lost(&session).await);
        }
        Ok(session)
    }

    /// Error for a session whose token fired: the reader's fault if one was
    /// recorded, `NotOpen` otherwise. A faulted session is closed here.
    async fn session_lost(&self, session: &Arc<Session>) -> LinePortError {
        let fault = session.fault.lock().take();

        {
            let _lifecycle = self.inner.lifecycle.lock().await;
            let current = {
                let mut slot = self.inner.session.lock();
                let still_current = slot
                    .as_ref()
                    .is_some_and(|current| Arc::ptr_eq(current, session));
                if still_current {
                    slot.take()
                } else {
                    None
                }
            };
            if let Some(current) = current {
                warn!(session = %current.id, "Closing {} after transport failure", current.name);
                if let Err(e) = self.teardown(&current).await {
                    warn!(session = %current.id, "Failed to close {}: {}", current.name, e);
                }
            }
        }

        match fault {
            Some(source) => session.io_error("read", source),
            None => LinePortError::NotOpen,
        }
    }

    /// Write raw bytes, returning how many the transport accepted
    pub async fn write(&self, data: &[u8]) -> LinePortResult<usize> {
        let session = self.active_session().await?;
        let n = session
            .transport
            .write(data)
            .map_err(|source| session.io_error("write", source))?;
        self.inner.observer.bytes_transmitted(&session.name, &data[..n]);
        Ok(n)
    }

    async fn write_all(&self, mut data: &[u8]) -> LinePortResult<()> {
        while !data.is_empty() {
            let n = self.write(data).await?;
            if n == 0 {
                let name = self.name().unwrap_or_default();
                return Err(LinePortError::TransportIo {
                    name,
                    operation: "write",
                    source: io::Error::from(io::ErrorKind::WriteZero),
                });
            }
            data = &data[n..];
        }
        Ok(())
    }

    pub async fn print(&self, text: &str) -> LinePortResult<()> {
        self.write_all(text.as_bytes()).await
    }

    /// Print `text` followed by CR+LF
    pub async fn println(&self, text: &str) -> LinePortResult<()> {
        self.print(&format!("{}\r\n", text)).await
    }

    /// Formatted print: `port.printf(format_args!("AT+BAUD={}", 9600))`
    pub fn printf(&self, args: fmt::Arguments<'_>) -> impl Future<Output = LinePortResult<()>> + Send + '_ {
        let text = fmt::format(args);
        async move { self.print(&text).await }
    }

    /// Send a file in fixed-size chunks with a pause after each one.
    ///
    /// Returns the number of bytes sent.
    pub async fn send_file(&self, path: impl AsRef<Path>) -> LinePortResult<usize> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await.map_err(|e| {
            LinePortError::InvalidInput(format!("Unable to read {}: {}", path.display(), e))
        })?;
        // Fail before sleeping if the port is closed
        self.active_session().await?;

        let transfer = self.inner.transfer;
        info!("Sending {} ({} bytes)", path.display(), data.len());

        let mut sent = 0;
        for chunk in data.chunks(transfer.chunk_size.max(1)) {
            self.write_all(chunk).await?;
            sent += chunk.len();
            if sent < data.len() {
                tokio::time::sleep(transfer.chunk_delay()).await;
            }
        }

        debug!("Sent {} of {} bytes from {}", sent, data.len(), path.display());
        Ok(sent)
    }

    /// Consume one buffered byte without waiting
    pub async fn read(&self) -> LinePortResult<u8> {
        self.active_session().await?.buffer.read_byte()
    }

    /// Next line from the device, without its line ending.
    ///
    /// Waits up to the session's read timeout for a line to complete. If none
    /// does, the partially received bytes are returned as they stand and stay
    /// in the buffer.
    pub async fn read_line(&self) -> LinePortResult<String> {
        let never = CancellationToken::new();
        Ok(self
            .next_line(&never)
            .await?
            .map(|line| line.text)
            .unwrap_or_default())
    }

    /// Line reader shared by `read_line` and pattern waits.
    ///
    /// Returns `None` as soon as `cancel` fires.
    pub(crate) async fn next_line(&self, cancel: &CancellationToken) -> LinePortResult<Option<LineRead>> {
        let session = self.active_session().await?;
        let deadline = line_deadline(session.read_timeout);

        loop {
            // Register before checking the buffer so a line finished in between still wakes us
            let notified = session.line_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let eol = self.eol();
            if let Ok(raw) = session.buffer.read_until(eol) {
                return Ok(Some(LineRead {
                    text: strip_line_ending(&raw, eol),
                    complete: true,
                }));
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                _ = session.cancel.cancelled() => return Err(self.session_lost(&session).await),
                _ = sleep_until_deadline(deadline) => {
                    let partial = session.buffer.snapshot();
                    return Ok(Some(LineRead {
                        text: String::from_utf8_lossy(&partial).into_owned(),
                        complete: false,
                    }));
                }
                _ = &mut notified => {}
            }
        }
    }

    /// Unread bytes in the receive buffer
    pub fn available(&self) -> usize {
        self.inner
            .session
            .lock()
            .as_ref()
            .map_or(0, |session| session.buffer.len())
    }

    /// Change the line delimiter for every line framed from now on
    pub fn set_eol(&self, eol: u8) {
        self.inner.eol.store(eol, Ordering::Release);
    }

    pub fn eol(&self) -> u8 {
        self.inner.eol.load(Ordering::Acquire)
    }

    pub fn is_open(&self) -> bool {
        self.inner
            .session
            .lock()
            .as_ref()
            .is_some_and(|session| !session.cancel.is_cancelled())
    }

    pub fn name(&self) -> Option<String> {
        self.inner.session.lock().as_ref().map(|s| s.name.clone())
    }

    pub fn baud(&self) -> Option<u32> {
        self.inner.session.lock().as_ref().map(|s| s.baud)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.inner.session.lock().as_ref().map(|s| s.read_timeout)
    }

    pub(crate) fn observer(&self) -> &dyn PortObserver {
        self.inner.observer.as_ref()
    }

    /// Name of the open session, failing like any other call when closed
    pub(crate) async fn active_name(&self) -> LinePortResult<String> {
        Ok(self.active_session().await?.name.clone())
    }
}

/// Longest a single transport read may block; a zero read timeout still polls
fn reader_poll_interval(read_timeout: Duration) -> Duration {
    if read_timeout.is_zero() {
        READ_POLL_INTERVAL
    } else {
        read_timeout.min(READ_POLL_INTERVAL)
    }
}

/// When a line wait gives up. `None` waits until a line completes: a zero
/// read timeout means block, and a timeout past the clock's range never fires.
fn line_deadline(read_timeout: Duration) -> Option<Instant> {
    if read_timeout.is_zero() {
        return None;
    }
    Instant::now().checked_add(read_timeout)
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Drop the delimiter and any trailing CR/LF
fn strip_line_ending(raw: &[u8], eol: u8) -> String {
    let mut line = raw.strip_suffix(&[eol]).unwrap_or(raw);
    while let [rest @ .., b'\r' | b'\n'] = line {
        line = rest;
    }
    String::from_utf8_lossy(line).into_owned()
}
