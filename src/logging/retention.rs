//! Archive retention management
//!
//! Deletes archives whose newest covered day has aged past the retention window.

use std::fs;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::LogConfig;

use super::archive::{list_archives_in, ArchiveError};

/// Purges expired archives
#[derive(Clone)]
pub struct RetentionSweeper {
    config: Arc<LogConfig>,
    clock: Arc<dyn Clock>,
}

impl RetentionSweeper {
    pub fn new(config: Arc<LogConfig>) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Delete archives older than the configured retention
    ///
    /// Returns the number of archives deleted. Does nothing when no retention is set.
    pub fn delete_old_archives(&self) -> Result<usize, ArchiveError> {
        let settings = self.config.settings();
        let Some(retention_days) = settings.archive.delete_archives_older_than_days else {
            return Ok(0);
        };

        let today = self.clock.today();
        let mut deleted_count = 0;

        for archive in list_archives_in(&settings.archive.archive_directory)? {
            let Some(end_date) = archive.name.end_date() else {
                continue;
            };
            if (today - end_date).num_days() > i64::from(retention_days) {
                fs::remove_file(&archive.path)?;
                tracing::info!(archive = %archive.path.display(), %end_date, "Deleted expired archive");
                deleted_count += 1;
            }
        }

        Ok(deleted_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::LogSettings;
    use chrono::NaiveDate;
    use std::fs::File;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn test_sweeper(temp_dir: &TempDir, retention: Option<u32>) -> RetentionSweeper {
        let mut settings = LogSettings::in_dir(temp_dir.path());
        settings.archive.delete_archives_older_than_days = retention;
        let today = NaiveDate::from_ymd_opt(2026, 6, 30).unwrap();
        RetentionSweeper::new(Arc::new(LogConfig::new(settings)))
            .with_clock(Arc::new(FixedClock::at_date(today)))
    }

    fn create_archive(dir: &Path, name: &str) -> PathBuf {
        fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        File::create(&path).unwrap().write_all(b"zip").unwrap();
        path
    }

    #[test]
    fn test_cleanup_nonexistent_dir() {
        let temp_dir = TempDir::new().unwrap();
        let sweeper = test_sweeper(&temp_dir, Some(30));
        assert_eq!(sweeper.delete_old_archives().unwrap(), 0);
    }

    #[test]
    fn test_no_retention_keeps_everything() {
        let temp_dir = TempDir::new().unwrap();
        let archive_dir = temp_dir.path().join("archive");
        let ancient = create_archive(&archive_dir, "archive_2001-01-01.zip");

        let sweeper = test_sweeper(&temp_dir, None);
        assert_eq!(sweeper.delete_old_archives().unwrap(), 0);
        assert!(ancient.exists());
    }

    #[test]
    fn test_deletes_expired_and_keeps_recent() {
        let temp_dir = TempDir::new().unwrap();
        let archive_dir = temp_dir.path().join("archive");
        // 2026-05-30 is 31 days before 2026-06-30, 2026-05-31 exactly 30
        let expired = create_archive(&archive_dir, "archive_2026-05-30.zip");
        let boundary = create_archive(&archive_dir, "archive_2026-05-31.zip");
        let recent = create_archive(&archive_dir, "archive_2026-06-20.zip");

        let sweeper = test_sweeper(&temp_dir, Some(30));
        assert_eq!(sweeper.delete_old_archives().unwrap(), 1);

        assert!(!expired.exists());
        assert!(boundary.exists());
        assert!(recent.exists());
    }

    #[test]
    fn test_uses_end_of_month_and_range() {
        let temp_dir = TempDir::new().unwrap();
        let archive_dir = temp_dir.path().join("archive");
        // May ends on the 31st, 30 days before today
        let month = create_archive(&archive_dir, "archive_2026-05.zip");
        let old_month = create_archive(&archive_dir, "archive_2026-04.zip");
        // Starts long ago but ends recently
        let range = create_archive(&archive_dir, "archive_2026-01-01_2026-06-01.zip");

        let sweeper = test_sweeper(&temp_dir, Some(30));
        assert_eq!(sweeper.delete_old_archives().unwrap(), 1);

        assert!(month.exists());
        assert!(!old_month.exists());
        assert!(range.exists());
    }

    #[test]
    fn test_cleanup_ignores_non_archive_files() {
        let temp_dir = TempDir::new().unwrap();
        let archive_dir = temp_dir.path().join("archive");
        let other = create_archive(&archive_dir, "other.txt");
        let wrong_prefix = create_archive(&archive_dir, "backup_2001-01-01.zip");

        let sweeper = test_sweeper(&temp_dir, Some(1));
        assert_eq!(sweeper.delete_old_archives().unwrap(), 0);

        assert!(other.exists());
        assert!(wrong_prefix.exists());
    }
}
