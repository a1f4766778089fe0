//! IPC transport to the platform over stdout
//!
//! Each call to [`IpcTransport::emit`] or [`IpcTransport::emit_many`] produces
//! exactly one line on the output stream:
//!
//! ```text
//! {"ipc":true,"type":"data","payload":{"title":"..."}}
//! {"ipc":true,"type":"data","payload":[{"id":1},{"id":2}]}
//! ```
//!
//! A frame is serialized completely before anything is written and is then
//! handed to the sink in a single `write_all` while holding the sink lock, so a
//! serialization failure never leaves a partial line behind and concurrent
//! callers never interleave bytes of different frames. Compact JSON never
//! contains a raw newline, which keeps one frame per line.

use crate::error::Result;
use crate::logging::{Logger, default_logger};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// Frames larger than this are still sent, but logged as a warning
pub const MAX_IPC_MESSAGE_SIZE: usize = 5 * 1024 * 1024;

/// Frame type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Crawled records
    Data,
}

#[derive(Serialize)]
struct Frame<'a, T: ?Sized> {
    ipc: bool,
    #[serde(rename = "type")]
    kind: MessageType,
    payload: &'a T,
}

/// An owned, decoded frame as read back by a consumer of the stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpcMessage {
    /// IPC marker, always `true`
    pub ipc: bool,
    /// Frame type tag
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// A single record or an array of records
    pub payload: serde_json::Value,
}

impl IpcMessage {
    /// Decode one line of the output stream
    pub fn parse_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim_end_matches(['\r', '\n']))?)
    }

    /// True when the payload carries a batch
    pub fn is_batch(&self) -> bool {
        self.payload.is_array()
    }

    /// Records carried by this frame, in order
    pub fn records(&self) -> Vec<&serde_json::Value> {
        match &self.payload {
            serde_json::Value::Array(items) => items.iter().collect(),
            single => vec![single],
        }
    }
}

/// Writes IPC frames to a shared append-only sink
pub struct IpcTransport {
    sink: Mutex<Box<dyn Write + Send>>,
    logger: Arc<dyn Logger>,
}

impl std::fmt::Debug for IpcTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcTransport").finish_non_exhaustive()
    }
}

impl IpcTransport {
    /// Create a transport writing to `sink`, with size warnings sent to `logger`
    pub fn new<W>(sink: W, logger: Arc<dyn Logger>) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            sink: Mutex::new(Box::new(sink)),
            logger,
        }
    }

    /// Create a transport writing to the process stdout
    pub fn stdout() -> Self {
        Self::new(std::io::stdout(), default_logger())
    }

    /// Send one record as a single-item data frame
    pub fn emit<T>(&self, record: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.send(MessageType::Data, record, "Item")
    }

    /// Send all records as one array-payload data frame
    ///
    /// An empty slice writes nothing.
    pub fn emit_many<T>(&self, records: &[T]) -> Result<()>
    where
        T: Serialize,
    {
        if records.is_empty() {
            return Ok(());
        }
        self.send(MessageType::Data, records, "Batch")
    }

    fn send<T>(&self, kind: MessageType, payload: &T, what: &str) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let mut line = serde_json::to_vec(&Frame {
            ipc: true,
            kind,
            payload,
        })?;

        if line.len() > MAX_IPC_MESSAGE_SIZE {
            self.logger.warn(&format!(
                "{what} size ({} bytes) exceeds recommended limit ({MAX_IPC_MESSAGE_SIZE} bytes), \
                 consider splitting large data or using external storage",
                line.len()
            ));
        }

        line.push(b'\n');

        let mut sink = self.lock_sink();
        sink.write_all(&line)?;
        sink.flush()?;
        Ok(())
    }

    fn lock_sink(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        // A panic while holding the lock happens before or after a whole write_all
        match self.sink.lock() {
            Ok(sink) => sink,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// In-memory sink that records every frame written to it
///
/// Cloning shares the buffer, so a clone can be handed to an [`IpcTransport`]
/// while the original is kept for assertions.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    buffer: Arc<Mutex<Vec<u8>>>,
    writes: Arc<AtomicUsize>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, as text
    pub fn contents(&self) -> String {
        let buffer = match self.buffer.lock() {
            Ok(buffer) => buffer,
            Err(poisoned) => poisoned.into_inner(),
        };
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Number of `write` calls received
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Written lines, without their terminators
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }

    /// Written lines decoded as frames
    pub fn frames(&self) -> Result<Vec<IpcMessage>> {
        self.lines()
            .iter()
            .map(|line| IpcMessage::parse_line(line))
            .collect()
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut buffer = match self.buffer.lock() {
            Ok(buffer) => buffer,
            Err(poisoned) => poisoned.into_inner(),
        };
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

static STDOUT_TRANSPORT: OnceLock<Arc<IpcTransport>> = OnceLock::new();

/// The process-wide transport bound to stdout
///
/// Every caller shares one sink lock, so frames from the free functions and
/// from spiders never interleave.
pub fn stdout_transport() -> Arc<IpcTransport> {
    STDOUT_TRANSPORT
        .get_or_init(|| Arc::new(IpcTransport::stdout()))
        .clone()
}

/// Save one record through the process-wide transport
pub fn save_item<T>(item: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    stdout_transport().emit(item)
}

/// Save records one frame per record
///
/// For more than a handful of records prefer [`save_batch`], which writes one frame.
pub fn save_items<T>(items: &[T]) -> Result<()>
where
    T: Serialize,
{
    items.iter().try_for_each(save_item)
}

/// Save all records as one array frame through the process-wide transport
pub fn save_batch<T>(items: &[T]) -> Result<()>
where
    T: Serialize,
{
    stdout_transport().emit_many(items)
}
