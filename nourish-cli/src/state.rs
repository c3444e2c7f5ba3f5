use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use nourish_core::{SystemClock, Tracker};

use crate::config::Config;
use crate::store::JsonFileStore;

/// `$NOURISH_HOME`, or `~/.nourish`.
pub fn nourish_home() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("NOURISH_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").context("HOME is not set (or set NOURISH_HOME)")?;
    Ok(PathBuf::from(home).join(".nourish"))
}

pub fn ensure_nourish_home() -> Result<PathBuf> {
    let dir = nourish_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn data_dir() -> Result<PathBuf> {
    Ok(ensure_nourish_home()?.join("data"))
}

pub fn reminder_queue_path() -> Result<PathBuf> {
    Ok(ensure_nourish_home()?.join("reminders").join("queue.json"))
}

pub type CliTracker = Tracker<JsonFileStore, SystemClock>;

/// Tracker over the file store in the home directory, on the configured timezone.
pub fn open_tracker(cfg: &Config) -> Result<CliTracker> {
    let store = JsonFileStore::open(data_dir()?)?;
    let clock = SystemClock::new(cfg.timezone()?);
    Ok(Tracker::new(store, clock)
        .with_reminder_policy(cfg.reminder_policy())
        .with_water_cadence(cfg.water_cadence()?))
}
