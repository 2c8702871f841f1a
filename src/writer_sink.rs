use crate::formatter::JsonFormatter;
use crate::payload::MessagePayload;
use crate::severity::Severity;
use crate::sink::LogSink;
use async_trait::async_trait;
use chrono::Utc;
use std::error::Error;
use std::io::{self, Write};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::Mutex;

/// Sink that renders each call with a [`JsonFormatter`] and writes the
/// resulting CRLF-terminated line to an [`io::Write`].
///
/// Lines are written whole under a lock, so concurrent requests never
/// interleave within a line.
pub struct JsonLineSink {
    formatter: JsonFormatter,
    progname: Option<String>,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonLineSink {
    /// Write lines to `writer`.
    ///
    /// **Parameters**
    /// - `formatter`: [`JsonFormatter`] carrying the correlation source.
    /// - `writer`: any [`io::Write`]; it is not flushed after each line,
    ///   call [`LogSink::flush`] for that.
    ///
    /// The write itself is blocking and happens on the calling task while
    /// the async lock is held. Hand it a fast writer (memory, stdout or a
    /// `BufWriter`); a slow file or socket stalls the runtime worker and
    /// every request queued on the lock.
    pub fn new(formatter: JsonFormatter, writer: impl Write + Send + 'static) -> Self {
        JsonLineSink {
            formatter,
            progname: None,
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Write lines to the process stdout.
    pub fn stdout(formatter: JsonFormatter) -> Self {
        Self::new(formatter, io::stdout())
    }

    /// Logger-scope name written to the `progname` field.
    pub fn with_progname(mut self, progname: impl Into<String>) -> Self {
        self.progname = Some(progname.into());
        self
    }

    pub fn formatter(&self) -> &JsonFormatter {
        &self.formatter
    }
}

#[async_trait]
impl LogSink for JsonLineSink {
    async fn log(
        &self,
        severity: Severity,
        payload: MessagePayload,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let line = self.formatter.format(
            severity.as_str(),
            &Utc::now(),
            self.progname.as_deref(),
            &payload,
        )?;

        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes())?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.writer.lock().await.flush()?;
        Ok(())
    }
}

/// In-memory [`io::Write`] target whose clones share one buffer.
///
/// Handy for capturing what a [`JsonLineSink`] or
/// [`JsonLayer`](crate::layer::JsonLayer) writes.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<StdMutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Buffer contents split into lines, terminators removed.
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.contents())
            .split_terminator("\r\n")
            .map(str::to_string)
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
