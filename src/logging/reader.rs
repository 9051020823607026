//! Reading entries back from day-files
//!
//! Physical lines are folded into entries: a line starting with a timestamp
//! opens a new entry, any other line continues the one above it.
//!
//! Lines may end in `\n` or `\r\n`; continuations are rejoined with `\n`
//! alone. Text written with embedded `\r\n` therefore reads back with
//! `\n`, and a lone trailing `\r` on a line is lost.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::mem;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;

use crate::config::LogConfig;

use super::entry::{classify_line, day_file_path, LineKind, LogEntry};

/// Reads historical entries
#[derive(Debug, Clone)]
pub struct LogReader {
    config: Arc<LogConfig>,
}

impl LogReader {
    pub fn new(config: Arc<LogConfig>) -> Self {
        Self { config }
    }

    /// Entries of every day in `[from, to]`, in file order
    ///
    /// Days without a readable file are skipped. Entries are not re-sorted,
    /// so a clock that went backwards shows up as out-of-order timestamps.
    pub fn import(&self, from: NaiveDate, to: NaiveDate) -> Import {
        Import::new(self.config.settings().log_directory, from, to)
    }

    /// `import` collected on the blocking pool
    pub async fn import_async(&self, from: NaiveDate, to: NaiveDate) -> Vec<LogEntry> {
        let import = self.import(from, to);
        tokio::task::spawn_blocking(move || import.collect::<Vec<_>>())
            .await
            .unwrap_or_default()
    }
}

/// Lazy iterator over the entries of a date range
pub struct Import {
    logs_dir: PathBuf,
    next_day: Option<NaiveDate>,
    last_day: NaiveDate,
    lines: Option<io::Split<BufReader<File>>>,
    /// Header line plus continuation lines of the entry being assembled
    pending: String,
    abort: Option<Arc<AtomicBool>>,
}

impl Import {
    fn new(logs_dir: PathBuf, from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            logs_dir,
            next_day: (from <= to).then_some(from),
            last_day: to,
            lines: None,
            pending: String::new(),
            abort: None,
        }
    }

    /// Stop before the next day once `flag` is set
    pub fn with_abort(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = Some(flag);
        self
    }

    fn aborted(&self) -> bool {
        self.abort
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Open the next existing day-file; false when the range is exhausted
    fn open_next_day(&mut self) -> bool {
        while let Some(day) = self.next_day {
            if self.aborted() {
                self.next_day = None;
                return false;
            }
            self.next_day = if day < self.last_day { day.succ_opt() } else { None };

            match File::open(day_file_path(&self.logs_dir, day)) {
                Ok(file) => {
                    self.lines = Some(BufReader::new(file).split(b'\n'));
                    return true;
                }
                Err(e) => {
                    tracing::trace!(%day, error = %e, "Skipping day without readable log file");
                }
            }
        }
        false
    }

    /// Parse and clear the pending entry
    fn flush(&mut self) -> Option<LogEntry> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = mem::take(&mut self.pending);
        let entry = LogEntry::decode(&raw);
        if entry.is_none() {
            tracing::debug!(len = raw.len(), "Dropping lines without a leading timestamp");
        }
        entry
    }
}

impl Iterator for Import {
    type Item = LogEntry;

    fn next(&mut self) -> Option<LogEntry> {
        loop {
            let Some(lines) = self.lines.as_mut() else {
                if !self.open_next_day() {
                    return None;
                }
                continue;
            };

            match lines.next() {
                Some(Ok(bytes)) => {
                    let line = String::from_utf8_lossy(&bytes);
                    let line = line.strip_suffix('\r').unwrap_or(&line);
                    match classify_line(line) {
                        LineKind::Header(_) => {
                            let finished = self.flush();
                            self.pending.push_str(line);
                            if finished.is_some() {
                                return finished;
                            }
                        }
                        LineKind::Continuation(text) => {
                            if !self.pending.is_empty() {
                                self.pending.push('\n');
                            }
                            self.pending.push_str(text);
                        }
                    }
                }
                // End of file, or a read error cutting it short
                Some(Err(_)) | None => {
                    self.lines = None;
                    if let Some(entry) = self.flush() {
                        return Some(entry);
                    }
                }
            }
        }
    }
}
