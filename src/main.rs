use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use daylog::config::{self, LogConfig, LogSettings};
use daylog::logging::Severity;
use daylog::LogEngine;

/// Day-file logging with archival and retention
#[derive(Parser, Debug)]
#[command(name = "daylog", version)]
#[command(about = "Append to, archive and query day-file logs")]
struct Args {
    /// Config file (default: ~/.daylog/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Append an entry to today's day-file
    Write {
        /// Debug, Information, Success, Warning, Error or Fatal
        #[arg(short, long)]
        severity: Option<Severity>,

        /// Message text
        #[arg(required = true)]
        text: Vec<String>,
    },

    /// Print the entries of a date range
    Import {
        /// First day (YYYY-MM-DD)
        from: NaiveDate,

        /// Last day, inclusive (default: same as FROM)
        to: Option<NaiveDate>,

        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Archive the day-files of a date range
    Archive {
        /// First day (YYYY-MM-DD)
        from: NaiveDate,

        /// Last day, inclusive (default: same as FROM)
        to: Option<NaiveDate>,
    },

    /// Run auto-archive, size-triggered archive and archive retention
    Maintain,

    /// List archives
    Archives,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "daylog=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(config::config_file_path);
    let settings = LogSettings::load(&config_path)?;
    let config = Arc::new(LogConfig::new(settings));
    config.set_on_failure(|e| {
        eprintln!("{}", config::friendly_io_error_message(e, "Failed to write log"));
    });

    let engine = LogEngine::new(Arc::clone(&config));

    match args.command {
        Command::Write { severity, text } => {
            if !engine.writer().should_write(severity) {
                tracing::info!(?severity, "Entry filtered out by configuration");
                return Ok(());
            }
            engine.write_async(severity, text.join(" ")).await;
            if engine.writer().consecutive_failures() > 0 || config.is_logging_disabled() {
                anyhow::bail!("Entry was not written");
            }
        }
        Command::Import { from, to, json } => {
            let entries = engine.import_async(from, to.unwrap_or(from)).await;
            if json {
                let out =
                    serde_json::to_string_pretty(&entries).context("Failed to serialize entries")?;
                println!("{}", out);
            } else {
                for entry in &entries {
                    println!("{}", entry.encode());
                }
            }
        }
        Command::Archive { from, to } => {
            match engine.archive(from, to.unwrap_or(from))? {
                Some(path) => println!("{}", path.display()),
                None => println!("No day-files in range"),
            }
        }
        Command::Maintain => {
            let report = engine.maintain()?;
            for path in &report.archives_written {
                println!("archived: {}", path.display());
            }
            println!("deleted {} expired archive(s)", report.archives_deleted);
        }
        Command::Archives => {
            for archive in engine.list_archives()? {
                println!("{}\t{} bytes", archive.path.display(), archive.size);
            }
        }
    }

    Ok(())
}
