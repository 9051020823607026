//! Compaction of day-files into zip archives
//!
//! Day-files in a date range are zipped into one archive and removed from
//! the log directory. Archiving into a name that already exists merges with
//! the archive already there.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Datelike, Days, Months, NaiveDate};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::clock::{Clock, SystemClock};
use crate::config::LogConfig;

use super::entry::{day_file_name, day_file_path, parse_day_file_name};
use super::locks::{acquire, DayFileLocks};
use super::naming::{first_day_of_month, last_day_of_month, ArchiveName};

/// Errors from archive and retention operations
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("zip failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("invalid archive range {from} to {to}")]
    InvalidRange { from: NaiveDate, to: NaiveDate },
}

/// An archive found in the archive directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub path: PathBuf,
    pub name: ArchiveName,
    /// Size on disk in bytes
    pub size: u64,
}

/// Archives day-files
#[derive(Clone)]
pub struct Archiver {
    config: Arc<LogConfig>,
    clock: Arc<dyn Clock>,
    locks: Arc<DayFileLocks>,
}

impl Archiver {
    pub fn new(config: Arc<LogConfig>) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            locks: Arc::new(DayFileLocks::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share the lock registry used by the `LogWriter`
    pub fn with_locks(mut self, locks: Arc<DayFileLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Archive a single day
    pub fn archive_day(&self, date: NaiveDate) -> Result<Option<PathBuf>, ArchiveError> {
        self.archive(date, date)
    }

    /// Archive every day-file dated within `[from, to]`
    ///
    /// Returns the archive path, or `None` if no day-file fell in the range.
    /// Originals are deleted only after the archive has been written in full.
    pub fn archive(&self, from: NaiveDate, to: NaiveDate) -> Result<Option<PathBuf>, ArchiveError> {
        if from > to {
            return Err(ArchiveError::InvalidRange { from, to });
        }

        let settings = self.config.settings();
        let archive_dir = self.config.archive_directory()?;
        let logs_dir = settings.log_directory;

        let candidates: Vec<_> = self
            .day_files()?
            .into_iter()
            .filter(|(date, _)| *date >= from && *date <= to)
            .collect();

        if candidates.is_empty() {
            tracing::debug!(%from, %to, "No day-files to archive");
            return Ok(None);
        }

        let name = ArchiveName::for_range(from, to, settings.archive.archive_full_month);
        let target = archive_dir.join(name.file_name());
        let outcome = self.archive_locked(&target, candidates);
        self.locks.prune();

        // Events only once the day-file locks are released: a tracing bridge
        // appends to today's file, which may be one of the archived ones.
        let Some(archived) = outcome? else {
            return Ok(None);
        };
        if !archived.emptied.is_empty() {
            tracing::warn!(
                files = ?archived.emptied,
                "Archived day-files could not be removed and were emptied instead"
            );
        }
        if let Some(e) = archived.error {
            return Err(e.into());
        }

        tracing::info!(
            archive = %target.display(),
            files = archived.count,
            logs_dir = %logs_dir.display(),
            "Archived day-files"
        );

        Ok(Some(target))
    }

    /// Zip `candidates` into `target` and remove them, holding their locks throughout
    ///
    /// Emits no tracing events.
    fn archive_locked(
        &self,
        target: &Path,
        candidates: Vec<(NaiveDate, PathBuf)>,
    ) -> Result<Option<Archived>, ArchiveError> {
        // Writers append under the same locks, so nothing lands between read and delete
        let handles: Vec<_> = candidates
            .iter()
            .map(|(_, path)| self.locks.handle(path))
            .collect();
        let _guards: Vec<_> = handles.iter().map(|handle| acquire(handle)).collect();

        // Another archiver may have taken some of them while we waited
        let files: Vec<_> = candidates
            .into_iter()
            .filter(|(_, path)| path.exists())
            .collect();
        if files.is_empty() {
            return Ok(None);
        }

        let mut staging = target.as_os_str().to_owned();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        let existing = target.exists().then_some(target);
        if let Err(e) = write_zip(&staging, existing, &files) {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }
        fs::rename(&staging, target)?;

        let (emptied, error) = remove_archived(&files);
        Ok(Some(Archived {
            count: files.len(),
            emptied,
            error,
        }))
    }

    /// Startup archiving according to the configured policy
    ///
    /// With full-month archiving on, every complete month before the current
    /// one that still has day-files gets its own archive. Otherwise, once the
    /// oldest day-file is older than the threshold, everything up to the
    /// unarchived window is archived as one range.
    pub fn auto_archive(&self) -> Result<Vec<PathBuf>, ArchiveError> {
        let Some(oldest) = self.oldest_day_file_date()? else {
            return Ok(Vec::new());
        };

        let policy = self.config.settings().archive;
        let today = self.clock.today();
        let mut written = Vec::new();

        if policy.archive_full_month {
            if (oldest.year(), oldest.month()) == (today.year(), today.month()) {
                return Ok(written);
            }
            let (Some(mut month), Some(current_month)) =
                (first_day_of_month(oldest), first_day_of_month(today))
            else {
                return Ok(written);
            };
            while month < current_month {
                let Some(month_end) = last_day_of_month(month) else {
                    break;
                };
                written.extend(self.archive(month, month_end)?);
                match month.checked_add_months(Months::new(1)) {
                    Some(next) => month = next,
                    None => break,
                }
            }
        } else if (today - oldest).num_days() > i64::from(policy.archive_when_older_than_days) {
            let keep = Days::new(u64::from(policy.keep_last_days_unarchived));
            let until = today.checked_sub_days(keep);
            if let Some(until) = until.filter(|until| *until >= oldest) {
                written.extend(self.archive(oldest, until)?);
            }
        }

        Ok(written)
    }

    /// Archive today's day-file right away if it has outgrown the size limit
    ///
    /// The next write recreates an empty file of the same name.
    pub fn force_size_archive_if_needed(&self) -> Result<Option<PathBuf>, ArchiveError> {
        let settings = self.config.settings();
        let Some(limit) = settings.archive.archive_when_file_size_exceeds else {
            return Ok(None);
        };

        let today = self.clock.today();
        let path = day_file_path(&settings.log_directory, today);
        let size = match fs::metadata(&path) {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if size <= limit {
            return Ok(None);
        }

        tracing::info!(size, limit, file = %path.display(), "Day-file over size limit, archiving");
        self.archive_day(today)
    }

    /// Day-files in the log directory, oldest first
    pub fn day_files(&self) -> io::Result<Vec<(NaiveDate, PathBuf)>> {
        let logs_dir = self.config.settings().log_directory;
        if !logs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&logs_dir)? {
            let entry = entry?;
            let Some(date) = entry.file_name().to_str().and_then(parse_day_file_name) else {
                continue;
            };
            if entry.file_type()?.is_file() {
                files.push((date, day_file_path(&logs_dir, date)));
            }
        }
        files.sort();
        Ok(files)
    }

    /// Date of the oldest day-file still in the log directory
    ///
    /// Day-files are created on the day they are named after, so the name is
    /// used rather than filesystem creation time (not available everywhere).
    pub fn oldest_day_file_date(&self) -> io::Result<Option<NaiveDate>> {
        Ok(self.day_files()?.first().map(|(date, _)| *date))
    }

    /// Archives in the archive directory, ordered by the last day they cover
    pub fn list_archives(&self) -> io::Result<Vec<ArchiveInfo>> {
        let archive_dir = self.config.settings().archive.archive_directory;
        list_archives_in(&archive_dir)
    }
}

/// Result of a locked archive pass
struct Archived {
    count: usize,
    /// Day-files that could only be truncated
    emptied: Vec<PathBuf>,
    error: Option<io::Error>,
}

/// Remove archived day-files, trying every one
///
/// A day-file that cannot be removed is emptied instead, so archiving its
/// date again adds nothing twice. The first error where even that failed is
/// returned.
fn remove_archived(files: &[(NaiveDate, PathBuf)]) -> (Vec<PathBuf>, Option<io::Error>) {
    let mut emptied = Vec::new();
    let mut error = None;
    for (_, path) in files {
        let Err(e) = fs::remove_file(path) else {
            continue;
        };
        match File::create(path) {
            Ok(_) => emptied.push(path.clone()),
            Err(_) => {
                error.get_or_insert(e);
            }
        }
    }
    (emptied, error)
}

/// Archives in a directory, ordered by the last day they cover
pub(crate) fn list_archives_in(archive_dir: &Path) -> io::Result<Vec<ArchiveInfo>> {
    if !archive_dir.exists() {
        return Ok(Vec::new());
    }

    let mut archives = Vec::new();
    for entry in fs::read_dir(archive_dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().and_then(ArchiveName::parse) else {
            continue;
        };
        archives.push(ArchiveInfo {
            path: entry.path(),
            name,
            size: entry.metadata()?.len(),
        });
    }

    archives.sort_by_key(|a| (a.name.end_date(), a.name.start_date()));
    Ok(archives)
}

/// Write `files` (plus the entries of `existing`, if any) into a new zip at `path`
///
/// A day-file whose entry already exists in `existing` is appended to that
/// entry's content.
fn write_zip(
    path: &Path,
    existing: Option<&Path>,
    files: &[(NaiveDate, PathBuf)],
) -> Result<(), ArchiveError> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(File::create(path)?);

    let mut pending: BTreeMap<String, &Path> = files
        .iter()
        .map(|(date, path)| (day_file_name(*date), path.as_path()))
        .collect();

    if let Some(existing) = existing {
        let mut previous = ZipArchive::new(File::open(existing)?)?;
        for index in 0..previous.len() {
            let mut entry = previous.by_index(index)?;
            let entry_name = entry.name().to_string();
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;

            zip.start_file(entry_name.clone(), options)?;
            zip.write_all(&content)?;
            if let Some(day_file) = pending.remove(&entry_name) {
                io::copy(&mut File::open(day_file)?, &mut zip)?;
            }
        }
    }

    for (entry_name, day_file) in pending {
        zip.start_file(entry_name, options)?;
        io::copy(&mut File::open(day_file)?, &mut zip)?;
    }

    let file = zip.finish()?;
    file.sync_all()?;
    Ok(())
}
