//! Appending entries to day-files
//!
//! Every write opens today's file in append mode, writes one entry and
//! closes it again, under that file's lock. Writes never fail observably:
//! I/O errors go to the configured callback and, after too many in a row,
//! switch logging off until the host turns it back on.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::{LogConfig, Profile};

use super::entry::{day_file_path, LogEntry, Severity};
use super::locks::{acquire, DayFileLocks};

/// Source location of a log call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerInfo {
    pub file: &'static str,
    /// Function or module the call came from, when known
    pub member: Option<&'static str>,
    pub line: u32,
}

impl CallerInfo {
    pub fn new(file: &'static str, member: Option<&'static str>, line: u32) -> Self {
        Self { file, member, line }
    }

    /// Location of the caller of the function this is called from
    #[track_caller]
    pub fn here() -> Self {
        let location = std::panic::Location::caller();
        Self::new(location.file(), None, location.line())
    }

    fn file_name(&self) -> &str {
        Path::new(self.file)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(self.file)
    }
}

/// Capture file, module path and line of the call site
#[macro_export]
macro_rules! caller_info {
    () => {
        $crate::logging::CallerInfo::new(file!(), Some(module_path!()), line!())
    };
}

/// Writer for day-files
///
/// Cheap to clone; clones share the failure counter and the lock registry.
#[derive(Clone)]
pub struct LogWriter {
    config: Arc<LogConfig>,
    clock: Arc<dyn Clock>,
    locks: Arc<DayFileLocks>,
    consecutive_failures: Arc<AtomicU32>,
    profile: Profile,
}

impl LogWriter {
    /// Create a writer using the system clock and the running binary's profile
    pub fn new(config: Arc<LogConfig>) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            locks: Arc::new(DayFileLocks::new()),
            consecutive_failures: Arc::new(AtomicU32::new(0)),
            profile: Profile::current(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share a lock registry (with an `Archiver`, typically)
    pub fn with_locks(mut self, locks: Arc<DayFileLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    pub fn config(&self) -> &Arc<LogConfig> {
        &self.config
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Failed writes since the last successful one
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Path of the day-file writes would currently go to
    pub fn current_file_path(&self) -> PathBuf {
        day_file_path(&self.config.settings().log_directory, self.clock.today())
    }

    /// Check whether an entry of this severity would be persisted right now
    pub fn should_write(&self, severity: Option<Severity>) -> bool {
        if self.config.is_logging_disabled() {
            return false;
        }
        match severity {
            Some(severity) => self
                .config
                .settings()
                .allowed_types(self.profile)
                .contains(&severity),
            None => true,
        }
    }

    /// Append an entry to today's day-file
    pub fn write(&self, severity: Option<Severity>, text: &str) {
        if !self.should_write(severity) {
            return;
        }

        let entry = LogEntry::new(self.clock.now(), severity, text);
        match self.append(&entry) {
            Ok(()) => self.consecutive_failures.store(0, Ordering::SeqCst),
            Err(e) => self.record_failure(&e),
        }
    }

    /// Same as `write`, with the file I/O on the blocking pool
    pub async fn write_async(&self, severity: Option<Severity>, text: impl Into<String>) {
        if !self.should_write(severity) {
            return;
        }

        let writer = self.clone();
        let text = text.into();
        // A panic inside the blocking task is the only error here; logging stays best-effort
        let _ = tokio::task::spawn_blocking(move || writer.write(severity, &text)).await;
    }

    /// Write an error with its source chain (and backtrace, when captured)
    pub fn write_error(&self, severity: Option<Severity>, err: &(dyn Error + 'static)) {
        if !self.should_write(severity) {
            return;
        }
        self.write(severity, &format_error(err));
    }

    /// Write a message prefixed with the call site
    pub fn write_with_caller(&self, severity: Option<Severity>, text: &str, caller: CallerInfo) {
        if !self.should_write(severity) {
            return;
        }
        let prefix = match caller.member {
            Some(member) => format!("[{}:{} {}]", caller.file_name(), caller.line, member),
            None => format!("[{}:{}]", caller.file_name(), caller.line),
        };
        self.write(severity, &format!("{} {}", prefix, text));
    }

    fn append(&self, entry: &LogEntry) -> io::Result<()> {
        let logs_dir = self.config.log_directory()?;
        let path = day_file_path(&logs_dir, entry.timestamp.date());

        let mut line = entry.encode();
        line.push('\n');

        let handle = self.locks.handle(&path);
        let _guard = acquire(&handle);

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        file.flush()
    }

    fn record_failure(&self, err: &io::Error) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(callback) = self.config.on_failure() {
            callback(err);
        }

        if let Some(max) = self.config.settings().max_consecutive_failures {
            if failures >= max {
                self.config.set_logging_disabled(true);
                // Re-enabling starts with a fresh budget
                self.consecutive_failures.store(0, Ordering::SeqCst);
            }
        }
    }
}

/// Render an error, its `source()` chain and any captured backtrace
pub fn format_error(err: &(dyn Error + 'static)) -> String {
    let mut text = err.to_string();

    let mut source = err.source();
    while let Some(cause) = source {
        let _ = write!(text, "\n  caused by: {}", cause);
        source = cause.source();
    }

    let backtrace = Backtrace::capture();
    if backtrace.status() == BacktraceStatus::Captured {
        let _ = write!(text, "\n{}", backtrace);
    }

    text
}
