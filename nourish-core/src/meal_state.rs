//! Meal state machine.
//!
//! A meal's state is a pure function of its window, the latest log for the
//! subject and the current instant. Nothing here caches "already eaten":
//! the latest log is picked at read time, so a corrected re-log always wins.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::local_to_utc;
use crate::model::{LogStatus, Meal, MealItem, MealLog, MealSlot, latest_log};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MealState {
    Upcoming,
    InProgress,
    DoneOnTime,
    DoneEarly,
    DoneLate,
    Skipped,
    Missed,
}

impl MealState {
    pub fn is_done(&self) -> bool {
        matches!(self, MealState::DoneOnTime | MealState::DoneEarly | MealState::DoneLate)
    }

    pub fn badge(&self) -> StatusBadge {
        match self {
            MealState::DoneOnTime | MealState::DoneEarly | MealState::DoneLate => StatusBadge::Done,
            MealState::Skipped => StatusBadge::NotDone,
            MealState::InProgress => StatusBadge::InProgress,
            MealState::Upcoming => StatusBadge::Waiting,
            MealState::Missed => StatusBadge::Overdue,
        }
    }
}

/// Coarse badge shown next to a meal card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusBadge {
    Waiting,
    InProgress,
    Done,
    NotDone,
    Overdue,
}

impl StatusBadge {
    pub fn label(&self) -> &'static str {
        match self {
            StatusBadge::Waiting => "Waiting",
            StatusBadge::InProgress => "In progress",
            StatusBadge::Done => "Done",
            StatusBadge::NotDone => "Not done",
            StatusBadge::Overdue => "Waiting",
        }
    }

    /// Hex colour for renderers.
    pub fn color(&self) -> &'static str {
        match self {
            StatusBadge::Waiting => "#F59E0B",
            StatusBadge::InProgress => "#3B82F6",
            StatusBadge::Done => "#10B981",
            StatusBadge::NotDone => "#EF4444",
            StatusBadge::Overdue => "#F59E0B",
        }
    }
}

/// Whole hours and minutes; seconds are truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelativeDuration {
    pub hours: i64,
    pub minutes: i64,
}

impl RelativeDuration {
    /// `|a - b|` truncated to the minute.
    pub fn between(a: DateTime<Utc>, b: DateTime<Utc>) -> Self {
        let total = (a - b).num_minutes().abs();
        Self {
            hours: total / 60,
            minutes: total % 60,
        }
    }

    pub fn total_minutes(&self) -> i64 {
        self.hours * 60 + self.minutes
    }
}

impl fmt::Display for RelativeDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h {}m", self.hours, self.minutes)
    }
}

/// A meal window pinned to a concrete date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MealWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl MealWindow {
    /// Interpret the meal's times on `date` in `tz`.
    pub fn for_meal(meal: &Meal, date: NaiveDate, tz: Tz) -> Self {
        Self {
            start: local_to_utc(date, meal.start_time, tz),
            end: local_to_utc(date, meal.end_time, tz),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub state: MealState,
    /// Distance to/from the boundary that matters for `state`; `None` for
    /// on-time and skipped meals.
    pub relative: Option<RelativeDuration>,
}

impl Evaluation {
    pub fn relative_text(&self) -> String {
        let rel = self.relative.unwrap_or(RelativeDuration { hours: 0, minutes: 0 });
        match self.state {
            MealState::DoneEarly => format!("Eaten ahead of time • {rel} before"),
            MealState::DoneOnTime => "Eaten on time 👌".to_string(),
            MealState::DoneLate => format!("Eaten {rel} late"),
            MealState::Skipped => "Skipped".to_string(),
            MealState::Upcoming => format!("in {rel}"),
            MealState::InProgress => format!("Now • {} min left", rel.total_minutes()),
            MealState::Missed => format!("{rel} overdue"),
        }
    }
}

/// Classify one meal.
///
/// Logged meals compare against a closed window (both ends on time); unlogged
/// meals stop being in progress at the window end.
pub fn evaluate(window: MealWindow, log: Option<&MealLog>, now: DateTime<Utc>) -> Evaluation {
    if let Some(log) = log {
        return match log.status {
            LogStatus::Skipped => Evaluation {
                state: MealState::Skipped,
                relative: None,
            },
            LogStatus::Eaten => {
                let at = log.logged_at_utc;
                if at < window.start {
                    Evaluation {
                        state: MealState::DoneEarly,
                        relative: Some(RelativeDuration::between(window.start, at)),
                    }
                } else if at <= window.end {
                    Evaluation {
                        state: MealState::DoneOnTime,
                        relative: None,
                    }
                } else {
                    Evaluation {
                        state: MealState::DoneLate,
                        relative: Some(RelativeDuration::between(at, window.end)),
                    }
                }
            }
        };
    }

    if now < window.start {
        Evaluation {
            state: MealState::Upcoming,
            relative: Some(RelativeDuration::between(window.start, now)),
        }
    } else if now < window.end {
        Evaluation {
            state: MealState::InProgress,
            relative: Some(RelativeDuration::between(window.end, now)),
        }
    } else {
        Evaluation {
            state: MealState::Missed,
            relative: Some(RelativeDuration::between(now, window.end)),
        }
    }
}

/// Evaluate against the latest of `logs` belonging to `subject_id`.
pub fn evaluate_meal(
    meal: &Meal,
    date: NaiveDate,
    logs: &[MealLog],
    subject_id: Uuid,
    now: DateTime<Utc>,
    tz: Tz,
) -> Evaluation {
    let window = MealWindow::for_meal(meal, date, tz);
    let latest = latest_log(logs.iter().filter(|l| l.meal_id == meal.id && l.subject_id == subject_id));
    evaluate(window, latest, now)
}

/// Everything a meal card needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealView {
    pub meal_id: Uuid,
    pub slot: MealSlot,
    pub slot_emoji: String,
    /// Always the slot title.
    pub title: String,
    /// Custom meal title, or a short item summary.
    pub subtitle: String,
    pub time_range: String,
    pub items: Vec<String>,
    pub kcal_text: String,
    pub state: MealState,
    pub badge: StatusBadge,
    pub relative: Option<RelativeDuration>,
    pub relative_text: String,
    pub note: Option<String>,
    pub photo_ref: Option<String>,
    pub last_logged_at_utc: Option<DateTime<Utc>>,
    pub last_log_text: String,
}

/// Build the view for one meal. `items` should already be in display order.
pub fn build_view(
    meal: &Meal,
    items: &[MealItem],
    date: NaiveDate,
    logs: &[MealLog],
    subject_id: Uuid,
    now: DateTime<Utc>,
    tz: Tz,
) -> MealView {
    let eval = evaluate_meal(meal, date, logs, subject_id, now, tz);
    let latest = latest_log(logs.iter().filter(|l| l.meal_id == meal.id && l.subject_id == subject_id));

    let subtitle = match meal.title.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => item_summary(items),
    };

    let item_lines = if items.is_empty() {
        vec!["No items specified".to_string()]
    } else {
        items.iter().map(MealItem::pretty).collect()
    };

    let kcal: u32 = items.iter().filter_map(|i| i.kcal).sum();
    let kcal_text = if kcal > 0 { format!("{kcal} kcal") } else { String::new() };

    MealView {
        meal_id: meal.id,
        slot: meal.slot,
        slot_emoji: meal.slot.emoji().to_string(),
        title: meal.slot.title().to_string(),
        subtitle,
        time_range: format!("{} – {}", meal.start_time.format("%H:%M"), meal.end_time.format("%H:%M")),
        items: item_lines,
        kcal_text,
        state: eval.state,
        badge: eval.state.badge(),
        relative: eval.relative,
        relative_text: eval.relative_text(),
        note: meal.note.clone(),
        photo_ref: latest.and_then(|l| l.photo_ref.clone()),
        last_logged_at_utc: latest.map(|l| l.logged_at_utc),
        last_log_text: latest
            .map(|l| format!("Last entry: {}", l.logged_at_utc.with_timezone(&tz).format("%H:%M")))
            .unwrap_or_default(),
    }
}

/// "Oats + Milk +2"
pub fn item_summary(items: &[MealItem]) -> String {
    if items.is_empty() {
        return "No items added".to_string();
    }
    let names: Vec<&str> = items
        .iter()
        .map(|i| i.name.trim())
        .filter(|n| !n.is_empty())
        .take(2)
        .collect();
    let mut out = names.join(" + ");
    let extra = items.len() - names.len();
    if extra > 0 {
        out.push_str(&format!(" +{extra}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};

    fn tz() -> Tz {
        chrono_tz::UTC
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, s).unwrap()
    }

    fn lunch() -> Meal {
        Meal::new(
            Uuid::new_v4(),
            MealSlot::Lunch,
            NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
        )
    }

    fn window() -> MealWindow {
        MealWindow::for_meal(&lunch(), day(), tz())
    }

    fn eaten(at: DateTime<Utc>) -> MealLog {
        MealLog::new(Uuid::new_v4(), Uuid::new_v4(), LogStatus::Eaten, at)
    }

    #[test]
    fn log_on_either_boundary_is_on_time() {
        let now = at(18, 0, 0);
        assert_eq!(evaluate(window(), Some(&eaten(at(12, 0, 0))), now).state, MealState::DoneOnTime);
        assert_eq!(evaluate(window(), Some(&eaten(at(13, 0, 0))), now).state, MealState::DoneOnTime);
    }

    #[test]
    fn early_and_late_logs_carry_distance() {
        let now = at(18, 0, 0);
        let early = evaluate(window(), Some(&eaten(at(10, 29, 59))), now);
        assert_eq!(early.state, MealState::DoneEarly);
        assert_eq!(early.relative, Some(RelativeDuration { hours: 1, minutes: 30 }));

        let late = evaluate(window(), Some(&eaten(at(14, 45, 0))), now);
        assert_eq!(late.state, MealState::DoneLate);
        assert_eq!(late.relative, Some(RelativeDuration { hours: 1, minutes: 45 }));
        assert_eq!(late.relative_text(), "Eaten 1h 45m late");
    }

    #[test]
    fn skip_beats_timing() {
        let log = MealLog::new(Uuid::new_v4(), Uuid::new_v4(), LogStatus::Skipped, at(12, 30, 0));
        let eval = evaluate(window(), Some(&log), at(12, 10, 0));
        assert_eq!(eval.state, MealState::Skipped);
        assert_eq!(eval.relative, None);
    }

    #[test]
    fn unlogged_meal_follows_the_clock() {
        let up = evaluate(window(), None, at(9, 15, 0));
        assert_eq!(up.state, MealState::Upcoming);
        assert_eq!(up.relative, Some(RelativeDuration { hours: 2, minutes: 45 }));

        assert_eq!(evaluate(window(), None, at(12, 0, 0)).state, MealState::InProgress);
        let mid = evaluate(window(), None, at(12, 40, 0));
        assert_eq!(mid.state, MealState::InProgress);
        assert_eq!(mid.relative_text(), "Now • 20 min left");

        // The window closes at its end for unlogged meals.
        assert_eq!(evaluate(window(), None, at(13, 0, 0)).state, MealState::Missed);
        let missed = evaluate(window(), None, at(15, 5, 30));
        assert_eq!(missed.state, MealState::Missed);
        assert_eq!(missed.relative, Some(RelativeDuration { hours: 2, minutes: 5 }));
    }

    #[test]
    fn corrected_relog_wins() {
        let meal = lunch();
        let subject = Uuid::new_v4();
        let skipped = MealLog::new(meal.id, subject, LogStatus::Skipped, at(12, 5, 0));
        let eaten = MealLog::new(meal.id, subject, LogStatus::Eaten, at(12, 20, 0));
        let stranger = MealLog::new(meal.id, Uuid::new_v4(), LogStatus::Skipped, at(12, 50, 0));
        let logs = vec![eaten, skipped, stranger];

        let eval = evaluate_meal(&meal, day(), &logs, subject, at(16, 0, 0), tz());
        assert_eq!(eval.state, MealState::DoneOnTime);
    }

    #[test]
    fn window_uses_the_days_local_date() {
        let istanbul: Tz = "Europe/Istanbul".parse().unwrap();
        let w = MealWindow::for_meal(&lunch(), day(), istanbul);
        assert_eq!(w.start, at(9, 0, 0));
        assert_eq!(w.end, at(10, 0, 0));
    }

    #[test]
    fn view_prefers_custom_title_then_items() {
        let mut meal = lunch();
        let items = vec![
            MealItem::new(meal.id, "Rice").with_kcal(200),
            MealItem::new(meal.id, "Chicken").with_kcal(300),
            MealItem::new(meal.id, "Salad"),
        ];
        let view = build_view(&meal, &items, day(), &[], Uuid::new_v4(), at(11, 0, 0), tz());
        assert_eq!(view.title, "Lunch");
        assert_eq!(view.subtitle, "Rice + Chicken +1");
        assert_eq!(view.kcal_text, "500 kcal");
        assert_eq!(view.badge, StatusBadge::Waiting);
        assert_eq!(view.time_range, "12:00 – 13:00");
        assert!(view.last_log_text.is_empty());

        meal.title = Some("Light lunch".into());
        let view = build_view(&meal, &[], day(), &[], Uuid::new_v4(), at(11, 0, 0), tz());
        assert_eq!(view.subtitle, "Light lunch");
        assert_eq!(view.items, vec!["No items specified".to_string()]);
        assert_eq!(view.kcal_text, "");
    }
}
