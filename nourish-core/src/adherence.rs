//! Adherence aggregation: per-day and per-range roll-ups of evaluated meals and water.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::meal_state::{MealState, evaluate_meal};
use crate::model::{Day, Meal, MealLog, WaterLog, latest_log, total_water_ml};

/// One day's raw inputs, already fetched.
#[derive(Debug, Clone, Default)]
pub struct DayInput {
    pub day: Option<Day>,
    pub meals: Vec<Meal>,
    pub logs: Vec<MealLog>,
    pub water: Vec<WaterLog>,
}

impl DayInput {
    pub fn new(day: Day, meals: Vec<Meal>, logs: Vec<MealLog>, water: Vec<WaterLog>) -> Self {
        Self {
            day: Some(day),
            meals,
            logs,
            water,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdherenceBand {
    Good,
    Fair,
    Poor,
}

impl AdherenceBand {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 0.8 {
            AdherenceBand::Good
        } else if ratio >= 0.5 {
            AdherenceBand::Fair
        } else {
            AdherenceBand::Poor
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AdherenceBand::Good => "good adherence",
            AdherenceBand::Fair => "fair",
            AdherenceBand::Poor => "poor",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            AdherenceBand::Good => "#16A34A",
            AdherenceBand::Fair => "#F59E0B",
            AdherenceBand::Poor => "#EF4444",
        }
    }
}

/// Per-meal line in a day report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealOutcome {
    pub meal_id: Uuid,
    pub name: String,
    pub state: MealState,
    pub completed_at_utc: Option<DateTime<Utc>>,
    pub note: Option<String>,
    pub photo_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    pub day_id: Option<Uuid>,
    pub date: NaiveDate,
    pub planned: u32,
    pub done: u32,
    pub skipped: u32,
    pub missed: u32,
    pub water_liters: f64,
    /// `done / planned`, 0 for a day with no meals.
    pub adherence: f64,
    pub meals: Vec<MealOutcome>,
}

impl DaySummary {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            day_id: None,
            date,
            planned: 0,
            done: 0,
            skipped: 0,
            missed: 0,
            water_liters: 0.0,
            adherence: 0.0,
            meals: Vec::new(),
        }
    }

    pub fn band(&self) -> AdherenceBand {
        AdherenceBand::from_ratio(self.adherence)
    }

    pub fn adherence_label(&self) -> String {
        format!("{}%", (self.adherence * 100.0).round() as i64)
    }

    pub fn water_text(&self) -> String {
        let s = format!("{:.2}", self.water_liters);
        format!("{} L", s.trim_end_matches('0').trim_end_matches('.'))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeSummary {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub day_count: u32,
    pub planned: u32,
    pub done: u32,
    pub skipped: u32,
    pub missed: u32,
    pub total_water_liters: f64,
    pub adherence_pct: u32,
    pub avg_water_liters_per_day: f64,
}

impl RangeSummary {
    pub fn range_text(&self) -> String {
        format!("{} – {}", self.from.format("%d.%m.%Y"), self.to.format("%d.%m.%Y"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeReport {
    pub summary: RangeSummary,
    /// Ascending by date.
    pub days: Vec<DaySummary>,
    /// The subject's daily water goal, when a profile carries one.
    #[serde(default)]
    pub water_target_ml: Option<u32>,
}

impl RangeReport {
    /// Days whose water reached the goal; `None` without a goal.
    pub fn water_goal_days(&self) -> Option<usize> {
        let target = f64::from(self.water_target_ml?) / 1000.0;
        Some(self.days.iter().filter(|d| d.water_liters >= target).count())
    }
}

/// Roll one day up. Each meal is evaluated on the day's own date.
pub fn summarize_day(input: &DayInput, date: NaiveDate, subject_id: Uuid, now: DateTime<Utc>, tz: Tz) -> DaySummary {
    let mut meals: Vec<&Meal> = input.meals.iter().collect();
    meals.sort_by_key(|m| m.start_time);

    let mut summary = DaySummary::empty(date);
    summary.day_id = input.day.as_ref().map(|d| d.id);
    summary.planned = meals.len() as u32;

    for meal in meals {
        let eval = evaluate_meal(meal, date, &input.logs, subject_id, now, tz);
        match eval.state {
            s if s.is_done() => summary.done += 1,
            MealState::Skipped => summary.skipped += 1,
            MealState::Missed => summary.missed += 1,
            _ => {}
        }

        let latest = latest_log(
            input
                .logs
                .iter()
                .filter(|l| l.meal_id == meal.id && l.subject_id == subject_id),
        );
        summary.meals.push(MealOutcome {
            meal_id: meal.id,
            name: meal.display_title(),
            state: eval.state,
            completed_at_utc: latest.filter(|_| eval.state.is_done()).map(|l| l.logged_at_utc),
            note: meal.note.clone(),
            photo_ref: latest.and_then(|l| l.photo_ref.clone()),
        });
    }

    let water: Vec<WaterLog> = input
        .water
        .iter()
        .filter(|w| w.subject_id == subject_id)
        .cloned()
        .collect();
    summary.water_liters = total_water_ml(&water) as f64 / 1000.0;
    summary.adherence = if summary.planned == 0 {
        0.0
    } else {
        f64::from(summary.done) / f64::from(summary.planned)
    };
    summary
}

/// Roll days up into a range. Days outside `[from, to]` are ignored.
pub fn summarize_range(
    from: NaiveDate,
    to: NaiveDate,
    days: &[DayInput],
    subject_id: Uuid,
    now: DateTime<Utc>,
    tz: Tz,
) -> RangeReport {
    let mut summaries: Vec<DaySummary> = days
        .iter()
        .filter_map(|input| {
            let date = input.day.as_ref()?.date;
            (from <= date && date <= to).then(|| summarize_day(input, date, subject_id, now, tz))
        })
        .collect();
    summaries.sort_by_key(|d| d.date);

    RangeReport {
        summary: roll_up(from, to, &summaries),
        days: summaries,
        water_target_ml: None,
    }
}

pub fn roll_up(from: NaiveDate, to: NaiveDate, days: &[DaySummary]) -> RangeSummary {
    let planned: u32 = days.iter().map(|d| d.planned).sum();
    let done: u32 = days.iter().map(|d| d.done).sum();
    let total_water_liters: f64 = days.iter().map(|d| d.water_liters).sum();
    let day_count = days.len() as u32;

    RangeSummary {
        from,
        to,
        day_count,
        planned,
        done,
        skipped: days.iter().map(|d| d.skipped).sum(),
        missed: days.iter().map(|d| d.missed).sum(),
        total_water_liters,
        adherence_pct: adherence_pct(done, planned),
        avg_water_liters_per_day: if day_count == 0 {
            0.0
        } else {
            total_water_liters / f64::from(day_count)
        },
    }
}

/// `round(100 * done / planned)`, 0 when nothing was planned.
pub fn adherence_pct(done: u32, planned: u32) -> u32 {
    if planned == 0 {
        return 0;
    }
    (100.0 * f64::from(done) / f64::from(planned)).round() as u32
}
