//! Configuration for the log engine
//!
//! `LogSettings` is the plain, serializable policy (loaded from TOML).
//! `LogConfig` wraps it for sharing across the writer, archiver and
//! sweeper: settings can be changed at runtime, and the disabled flag and
//! failure callback live next to them.

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::logging::Severity;

/// Callback invoked with every write failure
pub type FailureCallback = Arc<dyn Fn(&io::Error) + Send + Sync>;

/// Build profile used to pick the severity allow-list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Debug,
    Release,
}

impl Profile {
    /// Profile of the running binary
    pub fn current() -> Self {
        if cfg!(debug_assertions) {
            Profile::Debug
        } else {
            Profile::Release
        }
    }
}

/// Archival and retention policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveSettings {
    /// Archive whole calendar months instead of rolling day ranges
    #[serde(default)]
    pub archive_full_month: bool,

    /// Most recent days left out of a rolling archive (default: 7)
    #[serde(default = "default_keep_last_days_unarchived")]
    pub keep_last_days_unarchived: u32,

    /// Age in days of the oldest day-file that triggers a rolling archive (default: 14)
    #[serde(default = "default_archive_when_older_than_days")]
    pub archive_when_older_than_days: u32,

    /// Size in bytes past which today's file is archived immediately
    #[serde(default)]
    pub archive_when_file_size_exceeds: Option<u64>,

    /// Directory holding the zip archives
    #[serde(default = "default_archive_directory")]
    pub archive_directory: PathBuf,

    /// Archives whose newest day is older than this are deleted; `None` keeps them forever
    #[serde(default)]
    pub delete_archives_older_than_days: Option<u32>,
}

fn default_keep_last_days_unarchived() -> u32 {
    7
}

fn default_archive_when_older_than_days() -> u32 {
    14
}

fn default_archive_directory() -> PathBuf {
    config_dir().join("archive")
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            archive_full_month: false,
            keep_last_days_unarchived: default_keep_last_days_unarchived(),
            archive_when_older_than_days: default_archive_when_older_than_days(),
            archive_when_file_size_exceeds: None,
            archive_directory: default_archive_directory(),
            delete_archives_older_than_days: None,
        }
    }
}

/// Logging policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSettings {
    /// Directory holding the day-files
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,

    /// Severities persisted by debug builds
    #[serde(default = "default_allowed_types_debug")]
    pub allowed_types_debug: BTreeSet<Severity>,

    /// Severities persisted by release builds
    #[serde(default = "default_allowed_types_release")]
    pub allowed_types_release: BTreeSet<Severity>,

    /// Consecutive write failures after which logging disables itself; `None` never disables
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: Option<u32>,

    #[serde(default)]
    pub archive: ArchiveSettings,
}

fn default_log_directory() -> PathBuf {
    logs_dir()
}

fn default_allowed_types_debug() -> BTreeSet<Severity> {
    Severity::ALL.into_iter().collect()
}

fn default_allowed_types_release() -> BTreeSet<Severity> {
    Severity::ALL
        .into_iter()
        .filter(|s| *s != Severity::Debug)
        .collect()
}

fn default_max_consecutive_failures() -> Option<u32> {
    Some(5)
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            log_directory: default_log_directory(),
            allowed_types_debug: default_allowed_types_debug(),
            allowed_types_release: default_allowed_types_release(),
            max_consecutive_failures: default_max_consecutive_failures(),
            archive: ArchiveSettings::default(),
        }
    }
}

impl LogSettings {
    /// Settings rooted at `base`: day-files in `base/logs`, archives in `base/archive`
    pub fn in_dir(base: &Path) -> Self {
        Self {
            log_directory: base.join("logs"),
            archive: ArchiveSettings {
                archive_directory: base.join("archive"),
                ..ArchiveSettings::default()
            },
            ..Self::default()
        }
    }

    /// Load settings from a TOML file, or return defaults if it doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut settings: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        settings.expand_paths()?;
        Ok(settings)
    }

    /// Save settings to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Allow-list for a build profile
    pub fn allowed_types(&self, profile: Profile) -> &BTreeSet<Severity> {
        match profile {
            Profile::Debug => &self.allowed_types_debug,
            Profile::Release => &self.allowed_types_release,
        }
    }

    /// Expand `~` and environment variables in the configured directories
    fn expand_paths(&mut self) -> Result<()> {
        self.log_directory = expand_path(&self.log_directory)?;
        self.archive.archive_directory = expand_path(&self.archive.archive_directory)?;
        Ok(())
    }
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .with_context(|| format!("Failed to expand path {}", raw))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Process-wide logging configuration, shared by reference
///
/// Reads take a snapshot of the settings. A host reconfiguring from another
/// thread while an operation is running may see that operation use either
/// the old or the new settings.
pub struct LogConfig {
    settings: RwLock<LogSettings>,
    logging_disabled: AtomicBool,
    on_failure: RwLock<Option<FailureCallback>>,
}

impl LogConfig {
    pub fn new(settings: LogSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
            logging_disabled: AtomicBool::new(false),
            on_failure: RwLock::new(None),
        }
    }

    /// Snapshot of the current settings
    pub fn settings(&self) -> LogSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Change settings in place
    pub fn update(&self, f: impl FnOnce(&mut LogSettings)) {
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut *settings);
    }

    /// Day-file directory, created if missing
    pub fn log_directory(&self) -> io::Result<PathBuf> {
        let dir = self.settings().log_directory;
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Archive directory, created if missing
    pub fn archive_directory(&self) -> io::Result<PathBuf> {
        let dir = self.settings().archive.archive_directory;
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn is_logging_disabled(&self) -> bool {
        self.logging_disabled.load(Ordering::Acquire)
    }

    /// Enable or disable logging; the only way to re-enable after the circuit breaker trips
    pub fn set_logging_disabled(&self, disabled: bool) {
        self.logging_disabled.store(disabled, Ordering::Release);
    }

    /// Register the callback invoked with every write failure
    pub fn set_on_failure(&self, callback: impl Fn(&io::Error) + Send + Sync + 'static) {
        *self.on_failure.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    pub fn clear_on_failure(&self) {
        *self.on_failure.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub(crate) fn on_failure(&self) -> Option<FailureCallback> {
        self.on_failure
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new(LogSettings::default())
    }
}

impl fmt::Debug for LogConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogConfig")
            .field("settings", &self.settings())
            .field("logging_disabled", &self.is_logging_disabled())
            .field("has_on_failure", &self.on_failure().is_some())
            .finish()
    }
}

/// Categories of disk errors for user-friendly messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskErrorKind {
    /// Disk is full or quota exceeded
    DiskFull,
    /// Permission denied (read or write)
    PermissionDenied,
    /// File or directory not found
    NotFound,
    /// Other IO error
    Other,
}

impl DiskErrorKind {
    /// Get a user-friendly message for this error kind
    pub fn user_message(&self) -> &'static str {
        match self {
            DiskErrorKind::DiskFull => "disk full, free space needed to keep logging",
            DiskErrorKind::PermissionDenied => "permission denied on the log directory",
            DiskErrorKind::NotFound => "file or directory not found",
            DiskErrorKind::Other => "failed to write log",
        }
    }
}

/// Categorize an IO error into a user-friendly category
pub fn categorize_io_error(e: &io::Error) -> DiskErrorKind {
    match e.kind() {
        io::ErrorKind::WriteZero => DiskErrorKind::DiskFull,
        io::ErrorKind::PermissionDenied => DiskErrorKind::PermissionDenied,
        io::ErrorKind::NotFound => DiskErrorKind::NotFound,
        _ => {
            #[cfg(unix)]
            {
                if let Some(os_error) = e.raw_os_error() {
                    // ENOSPC = 28; EDQUOT = 122 on Linux, 69 on macOS
                    if os_error == 28 || os_error == 122 || os_error == 69 {
                        return DiskErrorKind::DiskFull;
                    }
                    // EACCES
                    if os_error == 13 {
                        return DiskErrorKind::PermissionDenied;
                    }
                }
            }
            DiskErrorKind::Other
        }
    }
}

/// Create a user-friendly error message from an IO error
pub fn friendly_io_error_message(e: &io::Error, context: &str) -> String {
    match categorize_io_error(e) {
        DiskErrorKind::Other => format!("{}: {}", context, e),
        kind => format!("{}: {}", context, kind.user_message()),
    }
}

/// Get the base directory (~/.daylog)
/// Falls back to ./.daylog if home directory cannot be determined
pub fn config_dir() -> PathBuf {
    try_config_dir().unwrap_or_else(|| {
        tracing::warn!("Could not determine home directory, using current directory for logs");
        PathBuf::from(".daylog")
    })
}

/// Try to get the base directory, returning None if home dir is unavailable
pub fn try_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".daylog"))
}

/// Get the path to the config file
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the default day-file directory
pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}
