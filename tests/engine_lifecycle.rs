use std::fs::File;
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tempfile::TempDir;

use daylog::clock::FixedClock;
use daylog::config::{LogConfig, LogSettings, Profile};
use daylog::logging::{ArchiveName, Severity};
use daylog::LogEngine;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn setup(temp_dir: &TempDir, start: NaiveDate) -> (LogEngine, Arc<FixedClock>) {
    let config = Arc::new(LogConfig::new(LogSettings::in_dir(temp_dir.path())));
    let clock = Arc::new(FixedClock::new(start.and_hms_opt(9, 0, 0).unwrap()));
    let engine = LogEngine::with_clock(config, clock.clone()).with_profile(Profile::Debug);
    (engine, clock)
}

#[test]
fn month_of_logging_then_archive_and_query() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, clock) = setup(&temp_dir, date(2026, 1, 1));
    engine.config().update(|s| s.archive.archive_full_month = true);

    for day in 0..31 {
        engine.write(Some(Severity::Information), &format!("day {}", day + 1));
        if day % 10 == 0 {
            engine.write(Some(Severity::Error), "stack:\n  frame a\n  frame b");
        }
        clock.advance(Duration::days(1));
    }
    engine.write(Some(Severity::Information), "february begins");

    let entries: Vec<_> = engine.import(date(2026, 1, 1), date(2026, 1, 31)).collect();
    assert_eq!(entries.len(), 31 + 4);
    assert_eq!(entries[1].text, "stack:\n  frame a\n  frame b");

    let report = engine.start();
    assert_eq!(report.archives_written.len(), 1);
    assert_eq!(
        report.archives_written[0].file_name().unwrap(),
        "archive_2026-01.zip"
    );

    // January is gone from the log directory, February stays
    assert_eq!(engine.import(date(2026, 1, 1), date(2026, 1, 31)).count(), 0);
    let february: Vec<_> = engine.import(date(2026, 2, 1), date(2026, 2, 1)).collect();
    assert_eq!(february.len(), 1);
    assert_eq!(february[0].text, "february begins");

    let mut archive = zip::ZipArchive::new(File::open(&report.archives_written[0]).unwrap()).unwrap();
    assert_eq!(archive.len(), 31);
    let mut first_day = String::new();
    archive
        .by_name("log_2026-01-01.log")
        .unwrap()
        .read_to_string(&mut first_day)
        .unwrap();
    assert!(first_day.starts_with("2026-01-01 09:00:00 | I | day 1\n"));

    let archives = engine.list_archives().unwrap();
    assert_eq!(archives.len(), 1);
    assert_eq!(archives[0].name, ArchiveName::Month(2026, 1));
}

#[test]
fn circuit_breaker_trips_and_host_re_enables() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _clock) = setup(&temp_dir, date(2026, 5, 4));

    let failures = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&failures);
    engine.config().set_on_failure(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let good_dir = engine.config().settings().log_directory;
    let blocker = temp_dir.path().join("blocker");
    std::fs::write(&blocker, b"").unwrap();
    engine.config().update(|s| {
        s.log_directory = blocker.join("logs");
        s.max_consecutive_failures = Some(4);
    });

    for _ in 0..10 {
        engine.write(Some(Severity::Warning), "lost");
    }
    assert!(engine.config().is_logging_disabled());
    assert_eq!(failures.load(Ordering::SeqCst), 4);

    engine.config().update(|s| s.log_directory = good_dir);
    engine.write(Some(Severity::Warning), "still disabled");
    assert_eq!(engine.import(date(2026, 5, 4), date(2026, 5, 4)).count(), 0);

    engine.config().set_logging_disabled(false);
    engine.write(Some(Severity::Warning), "back");
    let entries: Vec<_> = engine.import(date(2026, 5, 4), date(2026, 5, 4)).collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].text, "back");
}

#[test]
fn writes_and_size_archives_from_many_threads() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _clock) = setup(&temp_dir, date(2026, 7, 1));
    engine
        .config()
        .update(|s| s.archive.archive_when_file_size_exceeds = Some(4096));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                for i in 0..250 {
                    engine.write(Some(Severity::Debug), &format!("thread {} line {}", t, i));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Every line is either still in the day-file or inside the day's archive
    let mut total = engine.import(date(2026, 7, 1), date(2026, 7, 1)).count();
    let archive_path = temp_dir
        .path()
        .join("archive")
        .join(ArchiveName::Day(date(2026, 7, 1)).file_name());
    let mut archive = zip::ZipArchive::new(File::open(archive_path).unwrap()).unwrap();
    let mut archived = String::new();
    archive
        .by_name("log_2026-07-01.log")
        .unwrap()
        .read_to_string(&mut archived)
        .unwrap();
    total += archived.lines().count();

    assert_eq!(total, 1000);
}
