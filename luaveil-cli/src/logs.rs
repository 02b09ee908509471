//! Operator log retrieval.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use luaveil_core::{delivery, AppConfig};

pub const LOG_FILE_NAME: &str = "luaveil.log";

#[derive(Subcommand)]
pub enum LogsTarget {
    /// Print the current log file
    Current,
    /// Zip the whole log folder into the buffer directory
    Folder,
    /// Print the last N lines of the current log file
    Lines { count: usize },
}

pub async fn logs_command(config: &AppConfig, target: LogsTarget) -> Result<()> {
    let log_dir = PathBuf::from(&config.log_dir);
    let log_file = log_dir.join(LOG_FILE_NAME);

    match target {
        LogsTarget::Current => {
            let contents = tokio::fs::read_to_string(&log_file)
                .await
                .with_context(|| format!("reading {}", log_file.display()))?;
            print!("{contents}");
        }
        LogsTarget::Folder => {
            if !log_dir.is_dir() {
                bail!("log directory {} does not exist", log_dir.display());
            }
            let buffer_dir = PathBuf::from(&config.buffer_dir);
            std::fs::create_dir_all(&buffer_dir)?;
            let dest = buffer_dir.join("logs.zip");
            if dest.exists() {
                std::fs::remove_file(&dest)?;
            }
            delivery::zip_dir(&dest, &log_dir)?;
            println!("{}", dest.display());
        }
        LogsTarget::Lines { count } => {
            if count == 0 {
                bail!("line count must be positive");
            }
            let contents = tokio::fs::read_to_string(&log_file)
                .await
                .with_context(|| format!("reading {}", log_file.display()))?;
            let lines: Vec<&str> = contents.lines().collect();
            let start = lines.len().saturating_sub(count);
            for line in &lines[start..] {
                println!("{line}");
            }
        }
    }
    Ok(())
}
