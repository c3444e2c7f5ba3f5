//! Plan generator: turns a caregiver's template into a Program, its Days and initial Meals.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{InvalidPlanRequest, TrackerError};
use crate::model::{Day, Meal, MealSlot, Program};

pub const MIN_DAY_COUNT: u32 = 1;
pub const MAX_DAY_COUNT: u32 = 365;

/// Daily time window for a slot: `[start, end]`, `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl SlotWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn hm(start: (u32, u32), end: (u32, u32)) -> Option<Self> {
        Some(Self {
            start: NaiveTime::from_hms_opt(start.0, start.1, 0)?,
            end: NaiveTime::from_hms_opt(end.0, end.1, 0)?,
        })
    }

    pub fn validate(&self, slot: MealSlot) -> Result<(), InvalidPlanRequest> {
        if self.start >= self.end {
            return Err(InvalidPlanRequest::InvertedWindow {
                slot,
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }
}

/// Windows the caregiver wizard starts from.
pub fn default_windows() -> BTreeMap<MealSlot, SlotWindow> {
    let rows = [
        (MealSlot::Breakfast, (8, 0), (9, 0)),
        (MealSlot::MidMorningSnack, (11, 0), (11, 30)),
        (MealSlot::Lunch, (13, 0), (14, 0)),
        (MealSlot::MidAfternoonSnack, (16, 0), (16, 30)),
        (MealSlot::Dinner, (19, 0), (20, 0)),
    ];
    rows.into_iter()
        .filter_map(|(slot, s, e)| SlotWindow::hm(s, e).map(|w| (slot, w)))
        .collect()
}

/// Parse `lunch=12:00-13:00`.
pub fn parse_slot_window(text: &str) -> Result<(MealSlot, SlotWindow), TrackerError> {
    let re = Regex::new(r"^\s*([A-Za-z0-9 _-]+?)\s*=\s*(\d{1,2}):(\d{2})\s*-\s*(\d{1,2}):(\d{2})\s*$")
        .map_err(|e| TrackerError::InvalidInput(e.to_string()))?;
    let caps = re
        .captures(text)
        .ok_or_else(|| TrackerError::InvalidInput(format!("expected slot=HH:MM-HH:MM, got '{text}'")))?;

    let slot: MealSlot = caps[1].parse().map_err(TrackerError::InvalidInput)?;
    let num = |i: usize| caps[i].parse::<u32>().unwrap_or(u32::MAX);
    let window = SlotWindow::hm((num(2), num(3)), (num(4), num(5)))
        .ok_or_else(|| TrackerError::InvalidInput(format!("time out of range in '{text}'")))?;

    Ok((slot, window))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub subject_id: Uuid,
    pub start_date: NaiveDate,
    pub day_count: u32,
    pub slots: BTreeSet<MealSlot>,
    pub windows: BTreeMap<MealSlot, SlotWindow>,
    pub daily_water_target_ml: Option<u32>,
}

impl PlanRequest {
    /// Request over the default windows for every selected slot.
    pub fn new(subject_id: Uuid, start_date: NaiveDate, day_count: u32, slots: impl IntoIterator<Item = MealSlot>) -> Self {
        Self {
            subject_id,
            start_date,
            day_count,
            slots: slots.into_iter().collect(),
            windows: default_windows(),
            daily_water_target_ml: None,
        }
    }

    pub fn with_window(mut self, slot: MealSlot, window: SlotWindow) -> Self {
        self.windows.insert(slot, window);
        self
    }

    pub fn with_water_target(mut self, ml: u32) -> Self {
        self.daily_water_target_ml = Some(ml);
        self
    }

    /// Window for every selected slot, in time-of-day order.
    pub fn validate(&self) -> Result<Vec<(MealSlot, SlotWindow)>, InvalidPlanRequest> {
        if !(MIN_DAY_COUNT..=MAX_DAY_COUNT).contains(&self.day_count) {
            return Err(InvalidPlanRequest::DayCountOutOfRange(self.day_count));
        }
        if self.slots.is_empty() {
            return Err(InvalidPlanRequest::NoSlotsSelected);
        }

        self.slots
            .iter()
            .map(|slot| {
                let window = self
                    .windows
                    .get(slot)
                    .ok_or(InvalidPlanRequest::MissingWindow(*slot))?;
                window.validate(*slot)?;
                Ok((*slot, *window))
            })
            .collect()
    }
}

/// Records produced by one generation; persisting them is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedPlan {
    pub program: Program,
    pub days: Vec<Day>,
    pub meals: Vec<Meal>,
}

impl GeneratedPlan {
    pub fn meals_of(&self, day_id: Uuid) -> impl Iterator<Item = &Meal> {
        self.meals.iter().filter(move |m| m.day_id == day_id)
    }
}

/// Build the Program, one Day per date and one Meal per selected slot per Day.
pub fn generate_plan(request: &PlanRequest) -> Result<GeneratedPlan, InvalidPlanRequest> {
    let windows = request.validate()?;

    let program = Program::new(
        request.subject_id,
        request.start_date,
        request.day_count,
        request.daily_water_target_ml,
    );

    let mut days = Vec::with_capacity(request.day_count as usize);
    let mut meals = Vec::with_capacity(request.day_count as usize * windows.len());

    for i in 0..request.day_count {
        let day = Day::new(program.id, request.start_date + Duration::days(i64::from(i)));
        for (slot, window) in &windows {
            meals.push(Meal::new(day.id, *slot, window.start, window.end));
        }
        days.push(day);
    }

    Ok(GeneratedPlan { program, days, meals })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    #[test]
    fn generates_days_times_slots() {
        let req = PlanRequest::new(Uuid::new_v4(), start(), 10, [MealSlot::Dinner, MealSlot::Breakfast, MealSlot::Lunch]);
        let plan = generate_plan(&req).unwrap();

        assert_eq!(plan.days.len(), 10);
        assert_eq!(plan.meals.len(), 30);
        assert_eq!(plan.program.end_date, NaiveDate::from_ymd_opt(2026, 3, 10).unwrap());

        for (i, day) in plan.days.iter().enumerate() {
            assert_eq!(day.date, start() + Duration::days(i as i64));
            assert_eq!(day.program_id, plan.program.id);
            let slots: Vec<_> = plan.meals_of(day.id).map(|m| m.slot).collect();
            assert_eq!(slots, vec![MealSlot::Breakfast, MealSlot::Lunch, MealSlot::Dinner]);
        }

        let lunch = plan.meals.iter().find(|m| m.slot == MealSlot::Lunch).unwrap();
        assert_eq!(lunch.start_time, NaiveTime::from_hms_opt(13, 0, 0).unwrap());
        assert_eq!(lunch.end_time, NaiveTime::from_hms_opt(14, 0, 0).unwrap());
    }

    #[test]
    fn custom_window_overrides_default() {
        let req = PlanRequest::new(Uuid::new_v4(), start(), 1, [MealSlot::Lunch])
            .with_window(MealSlot::Lunch, SlotWindow::hm((12, 0), (13, 0)).unwrap())
            .with_water_target(2500);
        let plan = generate_plan(&req).unwrap();
        assert_eq!(plan.meals[0].start_time, NaiveTime::from_hms_opt(12, 0, 0).unwrap());
        assert_eq!(plan.program.daily_water_target_ml, Some(2500));
    }

    #[test]
    fn fresh_ids_everywhere() {
        let req = PlanRequest::new(Uuid::new_v4(), start(), 3, MealSlot::ALL);
        let plan = generate_plan(&req).unwrap();
        let mut ids: Vec<Uuid> = plan.days.iter().map(|d| d.id).chain(plan.meals.iter().map(|m| m.id)).collect();
        ids.push(plan.program.id);
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }

    #[test]
    fn rejects_bad_requests() {
        let subject = Uuid::new_v4();
        assert_eq!(
            generate_plan(&PlanRequest::new(subject, start(), 0, [MealSlot::Lunch])),
            Err(InvalidPlanRequest::DayCountOutOfRange(0))
        );
        assert_eq!(
            generate_plan(&PlanRequest::new(subject, start(), 366, [MealSlot::Lunch])),
            Err(InvalidPlanRequest::DayCountOutOfRange(366))
        );
        assert_eq!(
            generate_plan(&PlanRequest::new(subject, start(), 5, [])),
            Err(InvalidPlanRequest::NoSlotsSelected)
        );

        let inverted = PlanRequest::new(subject, start(), 5, [MealSlot::Dinner])
            .with_window(MealSlot::Dinner, SlotWindow::hm((20, 0), (19, 0)).unwrap());
        assert!(matches!(
            generate_plan(&inverted),
            Err(InvalidPlanRequest::InvertedWindow { slot: MealSlot::Dinner, .. })
        ));

        let mut missing = PlanRequest::new(subject, start(), 5, [MealSlot::Lunch]);
        missing.windows.clear();
        assert_eq!(generate_plan(&missing), Err(InvalidPlanRequest::MissingWindow(MealSlot::Lunch)));
    }

    #[test]
    fn equal_bounds_are_inverted() {
        let w = SlotWindow::hm((12, 0), (12, 0)).unwrap();
        assert!(w.validate(MealSlot::Lunch).is_err());
    }

    #[test]
    fn parses_slot_window_strings() {
        let (slot, w) = parse_slot_window("lunch=12:00-13:30").unwrap();
        assert_eq!(slot, MealSlot::Lunch);
        assert_eq!(w, SlotWindow::hm((12, 0), (13, 30)).unwrap());

        let (slot, _) = parse_slot_window(" snack2 = 16:00 - 16:30 ").unwrap();
        assert_eq!(slot, MealSlot::MidAfternoonSnack);

        assert!(parse_slot_window("lunch 12-13").is_err());
        assert!(parse_slot_window("lunch=25:00-26:00").is_err());
        assert!(parse_slot_window("brunch=10:00-11:00").is_err());
    }
}
