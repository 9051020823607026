//! Day-file logging
//!
//! Appends entries to per-day files, compacts old files into zip archives,
//! purges expired archives and reads entries back for historical queries.

mod archive;
mod bridge;
mod entry;
mod file_writer;
mod locks;
mod naming;
mod reader;
mod retention;

pub use archive::{ArchiveError, ArchiveInfo, Archiver};
pub use bridge::{BridgeWriter, TracingBridge};
pub use entry::{
    classify_line, day_file_name, day_file_path, parse_day_file_name, LineKind, LogEntry,
    Severity, DATE_FORMAT, TIMESTAMP_FORMAT,
};
pub use file_writer::{format_error, CallerInfo, LogWriter};
pub use locks::DayFileLocks;
pub use naming::ArchiveName;
pub use reader::{Import, LogReader};
pub use retention::RetentionSweeper;
