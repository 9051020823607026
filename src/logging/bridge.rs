//! Routing `tracing` events into day-files
//!
//! `TracingBridge` is a `MakeWriter` for the `tracing_subscriber` fmt layer:
//! each formatted event becomes one entry, with its severity taken from the
//! event's level.

use std::io::{self, Write};

use tracing::{Metadata, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::entry::Severity;
use super::file_writer::LogWriter;

/// Writer factory handing formatted events to a `LogWriter`
#[derive(Clone)]
pub struct TracingBridge {
    writer: LogWriter,
}

impl TracingBridge {
    pub fn new(writer: LogWriter) -> Self {
        Self { writer }
    }

    /// A fmt layer writing through this bridge
    ///
    /// Time and level are left out of the formatted text; the day-file
    /// line carries both already.
    pub fn layer<S>(self) -> impl Layer<S> + Send + Sync
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        tracing_subscriber::fmt::layer()
            .with_writer(self)
            .with_ansi(false)
            .without_time()
            .with_level(false)
            .with_target(true)
    }

    fn writer_for(&self, severity: Severity) -> BridgeWriter {
        BridgeWriter {
            writer: self.writer.clone(),
            severity,
            buf: Vec::new(),
        }
    }
}

/// Buffers one formatted event and writes it as a single entry on drop
pub struct BridgeWriter {
    writer: LogWriter,
    severity: Severity,
    buf: Vec<u8>,
}

impl Write for BridgeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for BridgeWriter {
    fn drop(&mut self) {
        let text = String::from_utf8_lossy(&self.buf);
        let text = text.trim_end();
        if !text.is_empty() {
            self.writer.write(Some(self.severity), text);
        }
    }
}

impl<'a> MakeWriter<'a> for TracingBridge {
    type Writer = BridgeWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer_for(Severity::Information)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        self.writer_for(Severity::from(*meta.level()))
    }
}
