//! Reminder policy and projection primitives for local notification delivery.
//!
//! Every descriptor carries a name-based id, so re-planning the same day yields
//! the same ids and a sink can cancel-and-replace instead of duplicating.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::local_to_utc;
use crate::error::StoreError;
use crate::model::Meal;

/// Namespace for every reminder id this crate derives.
const REMINDER_NAMESPACE: Uuid = Uuid::from_u128(0x6e6f_7572_6973_685f_7265_6d69_6e64_6572);

/// Hard ceiling on water reminders per day; a policy can only lower it.
pub const MAX_WATER_REMINDERS: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReminderBoundary {
    PreMeal,
    Start,
    End,
}

impl ReminderBoundary {
    fn key(&self) -> &'static str {
        match self {
            ReminderBoundary::PreMeal => "pre",
            ReminderBoundary::Start => "start",
            ReminderBoundary::End => "end",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReminderKind {
    Meal(ReminderBoundary),
    Water,
}

pub fn reminder_id(subject_id: Uuid, meal_id: Uuid, boundary: ReminderBoundary) -> Uuid {
    let name = format!("meal:{subject_id}:{meal_id}:{}", boundary.key());
    Uuid::new_v5(&REMINDER_NAMESPACE, name.as_bytes())
}

/// Water ids are stable per position in the day's cadence.
pub fn water_reminder_id(subject_id: Uuid, index: u32) -> Uuid {
    let name = format!("water:{subject_id}:{index}");
    Uuid::new_v5(&REMINDER_NAMESPACE, name.as_bytes())
}

/// Positive 31-bit id for platforms that key notifications by integer.
pub fn notification_id(id: Uuid) -> i32 {
    let (hi, lo) = id.as_u64_pair();
    ((hi ^ lo) & 0x7FFF_FFFF) as i32
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderDescriptor {
    pub id: Uuid,
    #[serde(default)]
    pub subject_id: Uuid,
    pub fire_at_utc: DateTime<Utc>,
    pub title: String,
    pub body: String,
    pub kind: ReminderKind,
}

impl ReminderDescriptor {
    pub fn notification_id(&self) -> i32 {
        notification_id(self.id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReminderPolicy {
    pub pre_meal_lead_minutes: i64,
    pub water_cap: u32,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            pre_meal_lead_minutes: 30,
            water_cap: 16,
        }
    }
}

/// Local-time drinking window and spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterCadence {
    pub day_start: NaiveTime,
    pub day_end: NaiveTime,
    pub interval_minutes: i64,
}

impl Default for WaterCadence {
    fn default() -> Self {
        Self {
            day_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            day_end: NaiveTime::from_hms_opt(21, 0, 0).unwrap_or(NaiveTime::MIN),
            interval_minutes: 90,
        }
    }
}

/// Future boundaries of each of `meals` on `date`. Logs are not consulted.
pub fn plan_meal_reminders(
    meals: &[Meal],
    date: NaiveDate,
    subject_id: Uuid,
    now: DateTime<Utc>,
    tz: Tz,
    policy: ReminderPolicy,
) -> Vec<ReminderDescriptor> {
    let mut out = Vec::new();
    let lead = Duration::try_minutes(policy.pre_meal_lead_minutes);
    if lead.is_none() {
        warn!(lead = policy.pre_meal_lead_minutes, "pre-meal lead out of range; skipping pre-meal reminders");
    }

    for meal in meals {
        let start = local_to_utc(date, meal.start_time, tz);
        let end = local_to_utc(date, meal.end_time, tz);
        let title = meal.display_title();
        let range = format!("{}-{}", meal.start_time.format("%H:%M"), meal.end_time.format("%H:%M"));

        let boundaries = [
            (
                ReminderBoundary::PreMeal,
                lead.and_then(|lead| start.checked_sub_signed(lead)),
                "Meal coming up".to_string(),
                format!(
                    "{} minutes until {title} ({})",
                    policy.pre_meal_lead_minutes,
                    meal.start_time.format("%H:%M")
                ),
            ),
            (
                ReminderBoundary::Start,
                Some(start),
                "Meal time".to_string(),
                format!("{title} has started • {range}"),
            ),
            (
                ReminderBoundary::End,
                Some(end),
                "Meal window over".to_string(),
                format!("Time is up for {title} ({})", meal.end_time.format("%H:%M")),
            ),
        ];

        for (boundary, fire_at_utc, title, body) in boundaries {
            let Some(fire_at_utc) = fire_at_utc.filter(|t| *t > now) else {
                continue;
            };
            out.push(ReminderDescriptor {
                id: reminder_id(subject_id, meal.id, boundary),
                subject_id,
                fire_at_utc,
                title,
                body,
                kind: ReminderKind::Meal(boundary),
            });
        }
    }

    out.sort_by_key(|r| r.fire_at_utc);
    out
}

/// One reminder per cadence step from the first step not before `now`, up to
/// `day_end` inclusive, at most `policy.water_cap` (never more than
/// [`MAX_WATER_REMINDERS`]) of them.
pub fn plan_water_reminders(
    date: NaiveDate,
    cadence: WaterCadence,
    subject_id: Uuid,
    now: DateTime<Utc>,
    tz: Tz,
    policy: ReminderPolicy,
) -> Vec<ReminderDescriptor> {
    let step = match Duration::try_minutes(cadence.interval_minutes) {
        Some(step) if cadence.interval_minutes > 0 => step,
        _ => {
            warn!(interval = cadence.interval_minutes, "water interval out of range; skipping water reminders");
            return Vec::new();
        }
    };
    let cap = policy.water_cap.min(MAX_WATER_REMINDERS);

    let first = NaiveDateTime::new(date, cadence.day_start);
    let last = NaiveDateTime::new(date, cadence.day_end);
    let to_utc = |t: NaiveDateTime| local_to_utc(t.date(), t.time(), tz);

    if to_utc(last) <= now {
        return Vec::new();
    }

    let mut t = first;
    while to_utc(t) < now {
        match t.checked_add_signed(step) {
            Some(next) => t = next,
            None => return Vec::new(),
        }
    }

    let mut out = Vec::new();
    let mut i = 0;
    while t <= last && i < cap {
        out.push(ReminderDescriptor {
            id: water_reminder_id(subject_id, i),
            subject_id,
            fire_at_utc: to_utc(t),
            title: "Water time 💧".to_string(),
            body: "Don't forget to drink a glass of water.".to_string(),
            kind: ReminderKind::Water,
        });
        i += 1;
        match t.checked_add_signed(step) {
            Some(next) => t = next,
            None => break,
        }
    }
    out
}

/// Full plan for one local day: meals then water, ordered by fire time.
pub fn plan_day_reminders(
    meals: &[Meal],
    date: NaiveDate,
    cadence: WaterCadence,
    subject_id: Uuid,
    now: DateTime<Utc>,
    tz: Tz,
    policy: ReminderPolicy,
) -> Vec<ReminderDescriptor> {
    let mut out = plan_meal_reminders(meals, date, subject_id, now, tz, policy);
    out.extend(plan_water_reminders(date, cadence, subject_id, now, tz, policy));
    out.sort_by_key(|r| r.fire_at_utc);
    out
}

/// Delivery collaborator: schedules and cancels local notifications by id.
pub trait ReminderSink {
    fn schedule(&mut self, reminder: &ReminderDescriptor) -> Result<(), StoreError>;

    /// Cancelling an unknown id is not an error.
    fn cancel(&mut self, id: Uuid) -> Result<(), StoreError>;
}

/// Remembers what it emitted last so a reschedule cancels everything first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rescheduler {
    emitted: BTreeSet<Uuid>,
}

impl Rescheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from ids a sink already holds.
    pub fn with_emitted(ids: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            emitted: ids.into_iter().collect(),
        }
    }

    pub fn emitted(&self) -> impl Iterator<Item = &Uuid> {
        self.emitted.iter()
    }

    /// Cancel every previously emitted id, then schedule `plan`.
    ///
    /// An id is forgotten only once its cancel succeeded, so a failed run
    /// can simply be retried.
    pub fn reschedule<K: ReminderSink + ?Sized>(
        &mut self,
        sink: &mut K,
        plan: &[ReminderDescriptor],
    ) -> Result<usize, StoreError> {
        let previous: Vec<Uuid> = self.emitted.iter().copied().collect();
        for id in previous {
            sink.cancel(id)?;
            self.emitted.remove(&id);
        }
        for reminder in plan {
            sink.schedule(reminder)?;
            self.emitted.insert(reminder.id);
        }
        debug!(scheduled = plan.len(), "reminders rescheduled");
        Ok(plan.len())
    }
}

/// Single-shot trigger for the nightly re-plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidnightWatch {
    armed: bool,
}

impl Default for MidnightWatch {
    fn default() -> Self {
        Self { armed: true }
    }
}

impl MidnightWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disarmed when started inside hour 0, so a startup plan is not repeated.
    pub fn starting_at(local_now: NaiveDateTime) -> Self {
        Self {
            armed: local_now.hour() != 0,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// True once, the first time the local clock is seen in hour 0.
    pub fn check(&mut self, local_now: NaiveDateTime) -> bool {
        if self.armed && local_now.hour() == 0 {
            self.armed = false;
            return true;
        }
        false
    }

    pub fn arm(&mut self) {
        self.armed = true;
    }

    /// `check`, re-arming once the clock has left hour 0.
    pub fn observe(&mut self, local_now: NaiveDateTime) -> bool {
        if self.check(local_now) {
            return true;
        }
        if !self.armed && local_now.hour() != 0 {
            self.arm();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MealSlot;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    #[derive(Default)]
    struct RecordingSink {
        live: HashMap<Uuid, ReminderDescriptor>,
        cancels: usize,
        failing_cancels: usize,
    }

    impl ReminderSink for RecordingSink {
        fn schedule(&mut self, reminder: &ReminderDescriptor) -> Result<(), StoreError> {
            self.live.insert(reminder.id, reminder.clone());
            Ok(())
        }

        fn cancel(&mut self, id: Uuid) -> Result<(), StoreError> {
            if self.failing_cancels > 0 {
                self.failing_cancels -= 1;
                return Err(StoreError::Io(std::io::Error::other("sink unavailable")));
            }
            self.live.remove(&id);
            self.cancels += 1;
            Ok(())
        }
    }

    #[test]
    fn only_future_meal_boundaries_are_emitted() {
        let subject = Uuid::new_v4();
        let lunch = Meal::new(Uuid::new_v4(), MealSlot::Lunch, t(12, 0), t(13, 0));

        let all = plan_meal_reminders(&[lunch.clone()], date(), subject, at(9, 0), chrono_tz::UTC, ReminderPolicy::default());
        let fire: Vec<_> = all.iter().map(|r| r.fire_at_utc).collect();
        assert_eq!(fire, vec![at(11, 30), at(12, 0), at(13, 0)]);

        let mid = plan_meal_reminders(&[lunch.clone()], date(), subject, at(12, 15), chrono_tz::UTC, ReminderPolicy::default());
        assert_eq!(mid.len(), 1);
        assert_eq!(mid[0].kind, ReminderKind::Meal(ReminderBoundary::End));
        assert_eq!(mid[0].id, reminder_id(subject, lunch.id, ReminderBoundary::End));

        // A boundary exactly at now is not in the future.
        let at_start = plan_meal_reminders(&[lunch], date(), subject, at(12, 0), chrono_tz::UTC, ReminderPolicy::default());
        assert_eq!(at_start.len(), 1);
    }

    #[test]
    fn ids_are_deterministic_and_distinct() {
        let subject = Uuid::new_v4();
        let meal = Uuid::new_v4();
        assert_eq!(
            reminder_id(subject, meal, ReminderBoundary::Start),
            reminder_id(subject, meal, ReminderBoundary::Start)
        );
        assert_ne!(
            reminder_id(subject, meal, ReminderBoundary::Start),
            reminder_id(subject, meal, ReminderBoundary::End)
        );
        assert_ne!(water_reminder_id(subject, 0), water_reminder_id(subject, 1));
        assert!(notification_id(water_reminder_id(subject, 3)) >= 0);
    }

    #[test]
    fn water_is_capped_at_sixteen() {
        let cadence = WaterCadence {
            day_start: t(6, 0),
            day_end: t(23, 0),
            interval_minutes: 30,
        };
        let out = plan_water_reminders(date(), cadence, Uuid::new_v4(), at(0, 0), chrono_tz::UTC, ReminderPolicy::default());
        assert_eq!(out.len(), 16);
        assert_eq!(out[0].fire_at_utc, at(6, 0));
        assert_eq!(out[15].fire_at_utc, at(13, 30));
    }

    #[test]
    fn water_cap_cannot_be_raised_above_sixteen() {
        let cadence = WaterCadence {
            day_start: t(6, 0),
            day_end: t(23, 0),
            interval_minutes: 15,
        };
        let policy = ReminderPolicy {
            water_cap: 100,
            ..ReminderPolicy::default()
        };
        let out = plan_water_reminders(date(), cadence, Uuid::new_v4(), at(0, 0), chrono_tz::UTC, policy);
        assert_eq!(out.len(), MAX_WATER_REMINDERS as usize);

        let lower = ReminderPolicy {
            water_cap: 4,
            ..ReminderPolicy::default()
        };
        assert_eq!(plan_water_reminders(date(), cadence, Uuid::new_v4(), at(0, 0), chrono_tz::UTC, lower).len(), 4);
    }

    #[test]
    fn huge_minute_values_do_not_panic() {
        let subject = Uuid::new_v4();
        let lunch = Meal::new(Uuid::new_v4(), MealSlot::Lunch, t(12, 0), t(13, 0));
        let policy = ReminderPolicy {
            pre_meal_lead_minutes: i64::MAX,
            ..ReminderPolicy::default()
        };
        let out = plan_meal_reminders(&[lunch], date(), subject, at(9, 0), chrono_tz::UTC, policy);
        let kinds: Vec<_> = out.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![ReminderKind::Meal(ReminderBoundary::Start), ReminderKind::Meal(ReminderBoundary::End)]
        );

        let cadence = WaterCadence {
            interval_minutes: i64::MAX,
            ..WaterCadence::default()
        };
        assert!(plan_water_reminders(date(), cadence, subject, at(8, 0), chrono_tz::UTC, ReminderPolicy::default()).is_empty());

        // Large but representable: one step overshoots the day.
        let wide = WaterCadence {
            interval_minutes: 1_000_000,
            ..WaterCadence::default()
        };
        assert_eq!(plan_water_reminders(date(), wide, subject, at(0, 0), chrono_tz::UTC, ReminderPolicy::default()).len(), 1);
    }

    #[test]
    fn water_starts_at_first_step_not_before_now() {
        let cadence = WaterCadence::default();
        let out = plan_water_reminders(date(), cadence, Uuid::new_v4(), at(10, 0), chrono_tz::UTC, ReminderPolicy::default());
        let fire: Vec<_> = out.iter().map(|r| r.fire_at_utc).collect();
        assert_eq!(fire, vec![at(10, 30), at(12, 0), at(13, 30), at(15, 0), at(16, 30), at(18, 0), at(19, 30), at(21, 0)]);

        assert!(plan_water_reminders(date(), cadence, Uuid::new_v4(), at(21, 0), chrono_tz::UTC, ReminderPolicy::default()).is_empty());

        let stalled = WaterCadence {
            interval_minutes: 0,
            ..cadence
        };
        assert!(plan_water_reminders(date(), stalled, Uuid::new_v4(), at(8, 0), chrono_tz::UTC, ReminderPolicy::default()).is_empty());
    }

    #[test]
    fn rescheduling_replaces_instead_of_duplicating() {
        let subject = Uuid::new_v4();
        let meals = vec![
            Meal::new(Uuid::new_v4(), MealSlot::Lunch, t(12, 0), t(13, 0)),
            Meal::new(Uuid::new_v4(), MealSlot::Dinner, t(19, 0), t(20, 0)),
        ];
        let plan = plan_day_reminders(&meals, date(), WaterCadence::default(), subject, at(8, 0), chrono_tz::UTC, ReminderPolicy::default());
        assert_eq!(plan.len(), 6 + 9);

        let mut sink = RecordingSink::default();
        let mut rescheduler = Rescheduler::new();
        rescheduler.reschedule(&mut sink, &plan).unwrap();
        rescheduler.reschedule(&mut sink, &plan).unwrap();
        assert_eq!(sink.live.len(), plan.len());
        assert_eq!(sink.cancels, plan.len());

        let later = plan_day_reminders(&meals, date(), WaterCadence::default(), subject, at(12, 30), chrono_tz::UTC, ReminderPolicy::default());
        rescheduler.reschedule(&mut sink, &later).unwrap();
        assert_eq!(sink.live.len(), later.len());
        assert!(sink.live.values().all(|r| r.fire_at_utc > at(12, 30)));
    }

    #[test]
    fn failed_cancel_keeps_ids_for_retry() {
        let subject = Uuid::new_v4();
        let plan = plan_water_reminders(date(), WaterCadence::default(), subject, at(8, 0), chrono_tz::UTC, ReminderPolicy::default());
        assert!(!plan.is_empty());

        let mut sink = RecordingSink::default();
        let mut rescheduler = Rescheduler::new();
        rescheduler.reschedule(&mut sink, &plan).unwrap();

        sink.failing_cancels = 1;
        assert!(rescheduler.reschedule(&mut sink, &[]).is_err());
        assert_eq!(rescheduler.emitted().count(), plan.len());

        rescheduler.reschedule(&mut sink, &[]).unwrap();
        assert!(sink.live.is_empty());
        assert_eq!(rescheduler.emitted().count(), 0);
    }

    #[test]
    fn midnight_watch_fires_once_until_rearmed() {
        let mut watch = MidnightWatch::new();
        let d = date();
        assert!(!watch.check(d.and_time(t(23, 59))));
        assert!(watch.check(d.and_time(t(0, 0))));
        assert!(!watch.check(d.and_time(t(0, 1))));
        assert!(!watch.is_armed());
        watch.arm();
        assert!(watch.check(d.and_time(t(0, 30))));
    }

    #[test]
    fn midnight_watch_observe_rearms_after_hour_zero() {
        let d = date();
        let mut started_late = MidnightWatch::starting_at(d.and_time(t(0, 10)));
        assert!(!started_late.observe(d.and_time(t(0, 20))));
        assert!(!started_late.observe(d.and_time(t(1, 0))));
        assert!(started_late.is_armed());

        let mut watch = MidnightWatch::starting_at(d.and_time(t(22, 0)));
        assert!(watch.observe(d.and_time(t(0, 0))));
        assert!(!watch.observe(d.and_time(t(0, 59))));
        assert!(!watch.observe(d.and_time(t(1, 0))));
        assert!(watch.observe(d.and_time(t(0, 5))));
    }
}
