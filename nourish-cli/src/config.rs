use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use nourish_core::{ReminderPolicy, WaterCadence, parse_hhmm, parse_timezone};

use crate::state::ensure_nourish_home;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tracker: TrackerSection,
    pub water: WaterSection,
    pub reminders: RemindersSection,
    pub watcher: WatcherSection,
    pub log: LogSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSection {
    /// IANA zone the subject lives in.
    pub timezone: String,
    /// Used when `--subject` is not passed.
    pub subject_id: Option<Uuid>,
    /// Used when `--caregiver` is not passed.
    pub caregiver_id: Option<Uuid>,
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            timezone: "Europe/Istanbul".to_string(),
            subject_id: None,
            caregiver_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterSection {
    pub day_start: String,
    pub day_end: String,
    pub interval_minutes: i64,
    pub default_target_ml: u32,
}

impl Default for WaterSection {
    fn default() -> Self {
        Self {
            day_start: "09:00".to_string(),
            day_end: "21:00".to_string(),
            interval_minutes: 90,
            default_target_ml: nourish_core::DEFAULT_WATER_TARGET_ML,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemindersSection {
    pub pre_meal_lead_minutes: i64,
    /// Values above `nourish_core::MAX_WATER_REMINDERS` are clamped.
    pub water_cap: u32,
}

impl Default for RemindersSection {
    fn default() -> Self {
        let policy = ReminderPolicy::default();
        Self {
            pre_meal_lead_minutes: policy.pre_meal_lead_minutes,
            water_cap: policy.water_cap,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherSection {
    pub poll_seconds: u64,
    /// How far back the first poll looks.
    pub lookback_minutes: i64,
}

impl WatcherSection {
    /// Where the first poll starts reading.
    pub fn first_mark(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        Duration::try_minutes(self.lookback_minutes)
            .and_then(|lookback| now.checked_sub_signed(lookback))
            .with_context(|| format!("[watcher] lookback_minutes {} is out of range", self.lookback_minutes))
    }
}

impl Default for WatcherSection {
    fn default() -> Self {
        Self {
            poll_seconds: 15,
            lookback_minutes: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    pub fn timezone(&self) -> Result<Tz> {
        Ok(parse_timezone(&self.tracker.timezone)?)
    }

    pub fn water_cadence(&self) -> Result<WaterCadence> {
        Ok(WaterCadence {
            day_start: parse_hhmm(&self.water.day_start).context("[water] day_start")?,
            day_end: parse_hhmm(&self.water.day_end).context("[water] day_end")?,
            interval_minutes: self.water.interval_minutes,
        })
    }

    pub fn reminder_policy(&self) -> ReminderPolicy {
        ReminderPolicy {
            pre_meal_lead_minutes: self.reminders.pre_meal_lead_minutes,
            water_cap: self.reminders.water_cap,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_nourish_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(p: &Path) -> Result<Config> {
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_config(cfg: &Config) -> Result<()> {
    let p = config_path()?;
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(&Config::default())?;
    println!("Wrote {}", p.display());
    Ok(())
}

pub fn show_config() -> Result<()> {
    let cfg = load_config()?;
    println!("# {}", config_path()?.display());
    print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
    Ok(())
}
