//! Plan and log records shared by the caregiver and subject sides.
//!
//! Records are small and serializable; storage is a separate layer (see `crate::store`).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Water target used when a program does not carry one.
pub const DEFAULT_WATER_TARGET_ML: u32 = 2000;

/// A subject's date-bounded plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub start_date: NaiveDate,
    /// Always `start_date + day_count - 1`.
    pub end_date: NaiveDate,
    pub day_count: u32,
    pub daily_water_target_ml: Option<u32>,
}

impl Program {
    pub fn new(
        subject_id: Uuid,
        start_date: NaiveDate,
        day_count: u32,
        daily_water_target_ml: Option<u32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id,
            start_date,
            end_date: start_date + Duration::days(i64::from(day_count) - 1),
            day_count,
            daily_water_target_ml,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    pub fn water_target_ml(&self) -> u32 {
        self.daily_water_target_ml.unwrap_or(DEFAULT_WATER_TARGET_ML)
    }
}

/// One calendar date within a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Day {
    pub id: Uuid,
    pub program_id: Uuid,
    pub date: NaiveDate,
}

impl Day {
    pub fn new(program_id: Uuid, date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            program_id,
            date,
        }
    }
}

/// Named meal category. Declaration order is time-of-day order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MealSlot {
    Breakfast,
    MidMorningSnack,
    Lunch,
    MidAfternoonSnack,
    Dinner,
}

impl MealSlot {
    pub const ALL: [MealSlot; 5] = [
        MealSlot::Breakfast,
        MealSlot::MidMorningSnack,
        MealSlot::Lunch,
        MealSlot::MidAfternoonSnack,
        MealSlot::Dinner,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            MealSlot::Breakfast => "Breakfast",
            MealSlot::MidMorningSnack => "Snack 1",
            MealSlot::Lunch => "Lunch",
            MealSlot::MidAfternoonSnack => "Snack 2",
            MealSlot::Dinner => "Dinner",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            MealSlot::Breakfast => "🍳",
            MealSlot::MidMorningSnack => "🥪",
            MealSlot::Lunch => "🍲",
            MealSlot::MidAfternoonSnack => "🍎",
            MealSlot::Dinner => "🍽️",
        }
    }

    /// Storage key, also accepted by `FromStr`.
    pub fn key(&self) -> &'static str {
        match self {
            MealSlot::Breakfast => "breakfast",
            MealSlot::MidMorningSnack => "snack1",
            MealSlot::Lunch => "lunch",
            MealSlot::MidAfternoonSnack => "snack2",
            MealSlot::Dinner => "dinner",
        }
    }
}

impl fmt::Display for MealSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for MealSlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "breakfast" => Ok(MealSlot::Breakfast),
            "snack1" | "midmorningsnack" | "midmorning" => Ok(MealSlot::MidMorningSnack),
            "lunch" => Ok(MealSlot::Lunch),
            "snack2" | "midafternoonsnack" | "midafternoon" => Ok(MealSlot::MidAfternoonSnack),
            "dinner" => Ok(MealSlot::Dinner),
            other => Err(format!("unknown meal slot: {other}")),
        }
    }
}

/// One slot's scheduled window on one day. `start_time < end_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meal {
    pub id: Uuid,
    pub day_id: Uuid,
    pub slot: MealSlot,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub title: Option<String>,
    pub note: Option<String>,
    pub kcal: Option<u32>,
}

impl Meal {
    pub fn new(day_id: Uuid, slot: MealSlot, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            day_id,
            slot,
            start_time,
            end_time,
            title: None,
            note: None,
            kcal: None,
        }
    }

    /// Custom title if set, slot title otherwise.
    pub fn display_title(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => self.slot.title().to_string(),
        }
    }
}

/// A food line inside a meal. Owned by its meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealItem {
    pub id: Uuid,
    pub meal_id: Uuid,
    pub name: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub kcal: Option<u32>,
    pub note: Option<String>,
    pub sort_order: Option<i32>,
}

impl MealItem {
    pub fn new(meal_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            meal_id,
            name: name.into(),
            quantity: None,
            unit: None,
            kcal: None,
            note: None,
            sort_order: None,
        }
    }

    pub fn with_quantity(mut self, quantity: f64, unit: Option<String>) -> Self {
        self.quantity = Some(quantity);
        self.unit = unit;
        self
    }

    pub fn with_kcal(mut self, kcal: u32) -> Self {
        self.kcal = Some(kcal);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = Some(sort_order);
        self
    }

    /// "Oats — 50 g — 180 kcal — with milk"
    pub fn pretty(&self) -> String {
        let mut parts = vec![self.name.clone()];
        let unit = self.unit.as_deref().map(str::trim).filter(|u| !u.is_empty());
        if self.quantity.is_some() || unit.is_some() {
            let qty = self.quantity.map(format_quantity).unwrap_or_default();
            let joined = match unit {
                Some(u) => format!("{qty} {u}"),
                None => qty,
            };
            parts.push(joined.trim().to_string());
        }
        if let Some(kcal) = self.kcal {
            parts.push(format!("{kcal} kcal"));
        }
        if let Some(note) = self.note.as_deref().filter(|n| !n.trim().is_empty()) {
            parts.push(note.to_string());
        }
        parts.join(" — ")
    }
}

fn format_quantity(q: f64) -> String {
    let s = format!("{q:.2}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogStatus {
    Eaten,
    Skipped,
}

impl FromStr for LogStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eaten" | "done" => Ok(LogStatus::Eaten),
            "skipped" | "skip" => Ok(LogStatus::Skipped),
            other => Err(format!("unknown log status: {other}")),
        }
    }
}

/// Append-only record of a subject acting on a meal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealLog {
    pub id: Uuid,
    pub meal_id: Uuid,
    pub subject_id: Uuid,
    pub status: LogStatus,
    pub photo_ref: Option<String>,
    pub logged_at_utc: DateTime<Utc>,
}

impl MealLog {
    pub fn new(meal_id: Uuid, subject_id: Uuid, status: LogStatus, logged_at_utc: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            meal_id,
            subject_id,
            status,
            photo_ref: None,
            logged_at_utc,
        }
    }

    pub fn with_photo(mut self, photo_ref: impl Into<String>) -> Self {
        self.photo_ref = Some(photo_ref.into());
        self
    }
}

/// Pick the authoritative log: the one with the greatest `logged_at_utc`.
pub fn latest_log<'a, I>(logs: I) -> Option<&'a MealLog>
where
    I: IntoIterator<Item = &'a MealLog>,
{
    logs.into_iter().max_by_key(|l| l.logged_at_utc)
}

/// Append-only water intake record. `milliliters` is always positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterLog {
    pub id: Uuid,
    pub day_id: Uuid,
    pub subject_id: Uuid,
    pub milliliters: u32,
    pub logged_at_utc: DateTime<Utc>,
}

impl WaterLog {
    pub fn new(day_id: Uuid, subject_id: Uuid, milliliters: u32, logged_at_utc: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            day_id,
            subject_id,
            milliliters,
            logged_at_utc,
        }
    }
}

pub fn total_water_ml(logs: &[WaterLog]) -> u64 {
    logs.iter().map(|w| u64::from(w.milliliters)).sum()
}
