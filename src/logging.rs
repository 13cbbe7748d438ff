use anyhow::{anyhow, Result};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::Level;

/// `<data_local_dir>/devagent/devagent.log`
pub fn default_log_path() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .ok_or_else(|| anyhow!("Could not determine data directory"))?;

    Ok(data_dir.join("devagent").join("devagent.log"))
}

fn parse_level(raw: Option<&str>) -> Level {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("error") => Level::ERROR,
        Some("warn") => Level::WARN,
        Some("debug") => Level::DEBUG,
        Some("trace") => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Send `tracing` output to a log file. The terminal belongs to the TUI, so
/// nothing is written to stdout or stderr. Level comes from `DEVAGENT_LOG`.
pub fn init() -> Result<PathBuf> {
    let path = default_log_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let level = parse_level(std::env::var("DEVAGENT_LOG").ok().as_deref());

    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_max_level(level)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))?;

    Ok(path)
}
