//! The log engine facade
//!
//! Wires a writer, archiver, sweeper and reader to one shared configuration,
//! clock and lock registry.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::clock::{Clock, SystemClock};
use crate::config::{LogConfig, Profile};
use crate::logging::{
    ArchiveError, ArchiveInfo, Archiver, CallerInfo, DayFileLocks, Import, LogEntry, LogReader,
    LogWriter, RetentionSweeper, Severity, TracingBridge,
};

/// What a maintenance run did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Archives written or extended
    pub archives_written: Vec<PathBuf>,
    /// Expired archives removed
    pub archives_deleted: usize,
}

/// One process-wide log engine
#[derive(Clone)]
pub struct LogEngine {
    config: Arc<LogConfig>,
    writer: LogWriter,
    archiver: Archiver,
    sweeper: RetentionSweeper,
    reader: LogReader,
}

impl LogEngine {
    /// Create an engine on the system clock
    pub fn new(config: Arc<LogConfig>) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: Arc<LogConfig>, clock: Arc<dyn Clock>) -> Self {
        let locks = Arc::new(DayFileLocks::new());
        Self {
            writer: LogWriter::new(Arc::clone(&config))
                .with_clock(Arc::clone(&clock))
                .with_locks(Arc::clone(&locks)),
            archiver: Archiver::new(Arc::clone(&config))
                .with_clock(Arc::clone(&clock))
                .with_locks(locks),
            sweeper: RetentionSweeper::new(Arc::clone(&config)).with_clock(clock),
            reader: LogReader::new(Arc::clone(&config)),
            config,
        }
    }

    /// Override the build profile used for severity filtering
    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.writer = self.writer.with_profile(profile);
        self
    }

    pub fn config(&self) -> &Arc<LogConfig> {
        &self.config
    }

    pub fn writer(&self) -> &LogWriter {
        &self.writer
    }

    pub fn archiver(&self) -> &Archiver {
        &self.archiver
    }

    pub fn sweeper(&self) -> &RetentionSweeper {
        &self.sweeper
    }

    pub fn reader(&self) -> &LogReader {
        &self.reader
    }

    /// A `tracing` writer factory feeding this engine's day-files
    pub fn tracing_bridge(&self) -> TracingBridge {
        TracingBridge::new(self.writer.clone())
    }

    /// Startup maintenance: auto-archive, then purge expired archives
    ///
    /// Failures are logged and otherwise ignored so startup always proceeds.
    pub fn start(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match self.archiver.auto_archive() {
            Ok(written) => report.archives_written = written,
            Err(e) => tracing::warn!(error = %e, "Auto-archive failed"),
        }
        match self.sweeper.delete_old_archives() {
            Ok(deleted) => report.archives_deleted = deleted,
            Err(e) => tracing::warn!(error = %e, "Archive cleanup failed"),
        }

        if !report.archives_written.is_empty() || report.archives_deleted > 0 {
            tracing::info!(
                written = report.archives_written.len(),
                deleted = report.archives_deleted,
                "Log maintenance done"
            );
        }
        report
    }

    /// Auto-archive, size-triggered archive and retention, stopping at the first error
    pub fn maintain(&self) -> Result<MaintenanceReport, ArchiveError> {
        let mut archives_written = self.archiver.auto_archive()?;
        archives_written.extend(self.archiver.force_size_archive_if_needed()?);
        let archives_deleted = self.sweeper.delete_old_archives()?;
        Ok(MaintenanceReport {
            archives_written,
            archives_deleted,
        })
    }

    /// Write an entry, then archive today's file if it outgrew the size limit
    pub fn write(&self, severity: Option<Severity>, text: &str) {
        self.writer.write(severity, text);
        self.archive_if_oversized();
    }

    pub async fn write_async(&self, severity: Option<Severity>, text: impl Into<String>) {
        self.writer.write_async(severity, text).await;
        let archiver = self.archiver.clone();
        let _ = tokio::task::spawn_blocking(move || {
            if let Err(e) = archiver.force_size_archive_if_needed() {
                tracing::warn!(error = %e, "Size-triggered archive failed");
            }
        })
        .await;
    }

    pub fn write_error(&self, severity: Option<Severity>, err: &(dyn Error + 'static)) {
        self.writer.write_error(severity, err);
        self.archive_if_oversized();
    }

    pub fn write_with_caller(&self, severity: Option<Severity>, text: &str, caller: CallerInfo) {
        self.writer.write_with_caller(severity, text, caller);
        self.archive_if_oversized();
    }

    pub fn archive(&self, from: NaiveDate, to: NaiveDate) -> Result<Option<PathBuf>, ArchiveError> {
        self.archiver.archive(from, to)
    }

    pub fn archive_day(&self, date: NaiveDate) -> Result<Option<PathBuf>, ArchiveError> {
        self.archiver.archive_day(date)
    }

    pub fn list_archives(&self) -> Result<Vec<ArchiveInfo>, ArchiveError> {
        Ok(self.archiver.list_archives()?)
    }

    pub fn delete_old_archives(&self) -> Result<usize, ArchiveError> {
        self.sweeper.delete_old_archives()
    }

    pub fn import(&self, from: NaiveDate, to: NaiveDate) -> Import {
        self.reader.import(from, to)
    }

    pub async fn import_async(&self, from: NaiveDate, to: NaiveDate) -> Vec<LogEntry> {
        self.reader.import_async(from, to).await
    }

    fn archive_if_oversized(&self) {
        if let Err(e) = self.archiver.force_size_archive_if_needed() {
            tracing::warn!(error = %e, "Size-triggered archive failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::LogSettings;
    use chrono::Duration;
    use std::fs;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn test_engine(temp_dir: &TempDir, clock: Arc<FixedClock>) -> LogEngine {
        let config = Arc::new(LogConfig::new(LogSettings::in_dir(temp_dir.path())));
        LogEngine::with_clock(config, clock).with_profile(Profile::Debug)
    }

    #[test]
    fn test_start_archives_and_sweeps() {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(FixedClock::at_date(date(2026, 1, 1)));
        let engine = test_engine(&temp_dir, Arc::clone(&clock));
        engine.config().update(|s| {
            s.archive.archive_when_older_than_days = 2;
            s.archive.keep_last_days_unarchived = 1;
            s.archive.delete_archives_older_than_days = Some(10);
        });

        for _ in 0..5 {
            engine.write(Some(Severity::Information), "tick");
            clock.advance(Duration::days(1));
        }
        // Today is 2026-01-06, files exist for the 1st through the 5th
        let report = engine.start();
        assert_eq!(report.archives_written.len(), 1);
        assert_eq!(
            report.archives_written[0].file_name().unwrap(),
            "archive_2026-01-01_2026-01-05.zip"
        );
        assert_eq!(report.archives_deleted, 0);

        clock.advance(Duration::days(12));
        let report = engine.start();
        assert!(report.archives_written.is_empty());
        assert_eq!(report.archives_deleted, 1);
        assert!(engine.list_archives().unwrap().is_empty());
    }

    #[test]
    fn test_write_triggers_size_archive() {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(FixedClock::at_date(date(2026, 1, 10)));
        let engine = test_engine(&temp_dir, clock);
        engine
            .config()
            .update(|s| s.archive.archive_when_file_size_exceeds = Some(100));

        engine.write(Some(Severity::Information), &"a".repeat(120));
        let today_file = engine.writer().current_file_path();
        assert!(!today_file.exists());

        engine.write(Some(Severity::Information), "fresh file");
        assert!(today_file.exists());

        let archives = engine.list_archives().unwrap();
        assert_eq!(archives.len(), 1);
        assert_eq!(archives[0].name.file_name(), "archive_2026-01-10.zip");
    }

    #[test]
    fn test_size_archive_with_tracing_bridge_installed() {
        use std::sync::mpsc;
        use std::time::Duration as StdDuration;
        use tracing_subscriber::layer::SubscriberExt;

        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(FixedClock::at_date(date(2026, 1, 10)));
        let engine = test_engine(&temp_dir, clock);
        engine
            .config()
            .update(|s| s.archive.archive_when_file_size_exceeds = Some(100));

        let (done_tx, done_rx) = mpsc::channel();
        let worker = engine.clone();
        std::thread::spawn(move || {
            let subscriber =
                tracing_subscriber::registry().with(worker.tracing_bridge().layer());
            tracing::subscriber::with_default(subscriber, || {
                worker.write(Some(Severity::Information), &"a".repeat(200));
            });
            let _ = done_tx.send(());
        });

        assert!(done_rx.recv_timeout(StdDuration::from_secs(10)).is_ok());

        let archives = engine.list_archives().unwrap();
        assert_eq!(archives.len(), 1);
        assert_eq!(archives[0].name.file_name(), "archive_2026-01-10.zip");

        // The archive event itself lands in the fresh day-file
        let entries: Vec<_> = engine.import(date(2026, 1, 10), date(2026, 1, 10)).collect();
        assert!(entries.iter().any(|e| e.text.contains("Archived day-files")));
    }

    #[test]
    fn test_maintain_propagates_errors() {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(FixedClock::at_date(date(2026, 3, 1)));
        let engine = test_engine(&temp_dir, Arc::clone(&clock));
        engine.write(None, "old");
        let old_file = engine.writer().current_file_path();
        clock.advance(Duration::days(4));

        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        engine.config().update(|s| {
            s.archive.archive_directory = blocker.join("archive");
            s.archive.keep_last_days_unarchived = 0;
            s.archive.archive_when_older_than_days = 0;
        });

        assert!(engine.maintain().is_err());
        assert!(old_file.exists());

        // start() reports nothing but does not fail
        assert_eq!(engine.start(), MaintenanceReport::default());
    }

    #[tokio::test]
    async fn test_async_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(FixedClock::new(
            date(2026, 1, 10).and_hms_opt(8, 15, 0).unwrap(),
        ));
        let engine = test_engine(&temp_dir, clock);

        engine.write_async(Some(Severity::Warning), "async entry").await;
        let entries = engine.import_async(date(2026, 1, 10), date(2026, 1, 10)).await;

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "async entry");
        assert_eq!(entries[0].severity, Some(Severity::Warning));
    }
}
