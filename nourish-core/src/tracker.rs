//! Tracker service: the operations both apps call, over a `Store` and a `Clock`.
//!
//! The computations live in their own modules and stay pure; this layer only
//! fetches, persists and logs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::adherence::{DayInput, DaySummary, RangeReport, summarize_day, summarize_range};
use crate::clock::Clock;
use crate::cloner::clone_meals;
use crate::error::TrackerError;
use crate::meal_state::{MealView, build_view};
use crate::model::{Day, LogStatus, Meal, MealItem, MealLog, MealSlot, Program, WaterLog, total_water_ml};
use crate::plan::{GeneratedPlan, PlanRequest, SlotWindow, generate_plan};
use crate::profiles::{Profile, Role, normalize_email, validate_water_target};
use crate::questions::{PollCursor, Question, QuestionFilter, WatchKind};
use crate::reminders::{ReminderDescriptor, ReminderPolicy, WaterCadence, plan_day_reminders};
use crate::store::{Nulls, Order, Query, Store};

/// Field changes for an existing meal. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MealPatch {
    pub title: Option<Option<String>>,
    pub note: Option<Option<String>>,
    pub kcal: Option<Option<u32>>,
    pub window: Option<SlotWindow>,
}

impl MealPatch {
    fn apply(&self, meal: &mut Meal) {
        if let Some(title) = &self.title {
            meal.title = title.clone();
        }
        if let Some(note) = &self.note {
            meal.note = note.clone();
        }
        if let Some(kcal) = self.kcal {
            meal.kcal = kcal;
        }
        if let Some(window) = self.window {
            meal.start_time = window.start;
            meal.end_time = window.end;
        }
    }
}

/// Today's screen for a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TodayView {
    NoActiveProgram,
    NoProgramDayForToday { program: Program },
    Ready(TodayPlan),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodayPlan {
    pub program: Program,
    pub day: Day,
    /// Start-time order.
    pub meals: Vec<MealView>,
    pub water_ml: u64,
    pub water_target_ml: u32,
}

impl TodayPlan {
    pub fn water_progress(&self) -> f64 {
        if self.water_target_ml == 0 {
            return 0.0;
        }
        (self.water_ml as f64 / f64::from(self.water_target_ml)).min(1.0)
    }
}

pub struct Tracker<S, C> {
    store: S,
    clock: C,
    policy: ReminderPolicy,
    cadence: WaterCadence,
}

impl<S: Store, C: Clock> Tracker<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            policy: ReminderPolicy::default(),
            cadence: WaterCadence::default(),
        }
    }

    pub fn with_reminder_policy(mut self, policy: ReminderPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_water_cadence(mut self, cadence: WaterCadence) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    // ---- profiles ----

    /// Create a subject, or update the one already registered under `email`.
    pub fn create_subject(
        &self,
        email: &str,
        full_name: &str,
        water_target_ml: Option<u32>,
    ) -> Result<Profile, TrackerError> {
        let target = water_target_ml.map(validate_water_target).transpose()?;
        let mut profile = Profile::new(Role::Subject, full_name, Some(email), self.clock.now_utc())?;

        if let Some(existing) = self.find_by_email(Role::Subject, email)? {
            let name = profile.full_name.clone();
            let patched_target = target.unwrap_or(existing.daily_water_target_ml);
            self.store.update::<Profile>(&Query::by_id(existing.id), &|row| {
                row.full_name = name.clone();
                row.daily_water_target_ml = patched_target;
            })?;
            info!(profile_id = %existing.id, "subject profile updated");
            return self.profile(existing.id);
        }

        if let Some(ml) = target {
            profile.daily_water_target_ml = ml;
        }
        let profile = self.store.insert_one(profile)?;
        info!(profile_id = %profile.id, "subject profile created");
        Ok(profile)
    }

    pub fn create_caregiver(&self, email: &str, full_name: &str) -> Result<Profile, TrackerError> {
        if let Some(existing) = self.find_by_email(Role::Caregiver, email)? {
            return Ok(existing);
        }
        let profile = Profile::new(Role::Caregiver, full_name, Some(email), self.clock.now_utc())?;
        let profile = self.store.insert_one(profile)?;
        info!(profile_id = %profile.id, "caregiver profile created");
        Ok(profile)
    }

    pub fn profile(&self, id: Uuid) -> Result<Profile, TrackerError> {
        self.store
            .find::<Profile>(id)?
            .ok_or_else(|| TrackerError::not_found("profile", id))
    }

    pub fn find_by_email(&self, role: Role, email: &str) -> Result<Option<Profile>, TrackerError> {
        let email = normalize_email(email)?;
        Ok(self
            .store
            .query::<Profile>(&Query::new().eq("role", role.key()).eq("email", email).limit(1))?
            .into_iter()
            .next())
    }

    /// Subjects by name.
    pub fn list_subjects(&self) -> Result<Vec<Profile>, TrackerError> {
        Ok(self.store.query(
            &Query::new()
                .eq("role", Role::Subject.key())
                .order_by(Order::asc("full_name")),
        )?)
    }

    /// Name match, plus the exact email match when the term looks like an address.
    pub fn search_subjects(&self, term: &str) -> Result<Vec<Profile>, TrackerError> {
        let mut found: Vec<Profile> = self
            .list_subjects()?
            .into_iter()
            .filter(|p| p.name_matches(term))
            .collect();
        let by_email = match normalize_email(term) {
            Ok(_) => self.find_by_email(Role::Subject, term)?,
            Err(_) => None,
        };
        if let Some(by_email) = by_email.filter(|p| found.iter().all(|f| f.id != p.id)) {
            found.push(by_email);
        }
        Ok(found)
    }

    pub fn set_water_target(&self, subject_id: Uuid, ml: u32) -> Result<Profile, TrackerError> {
        let ml = validate_water_target(ml)?;
        let touched = self
            .store
            .update::<Profile>(&Query::by_id(subject_id), &|row| row.daily_water_target_ml = ml)?;
        if touched == 0 {
            return Err(TrackerError::not_found("profile", subject_id));
        }
        info!(%subject_id, ml, "water target updated");
        self.profile(subject_id)
    }

    /// The first caregiver registered.
    pub fn default_caregiver(&self) -> Result<Option<Profile>, TrackerError> {
        Ok(self
            .store
            .query::<Profile>(
                &Query::new()
                    .eq("role", Role::Caregiver.key())
                    .order_by(Order::asc("created_at"))
                    .limit(1),
            )?
            .into_iter()
            .next())
    }

    // ---- plans ----

    /// Validate, then persist the program, its days and its meals.
    ///
    /// Without an explicit water target the subject profile's target is used.
    pub fn create_program(&self, request: &PlanRequest) -> Result<GeneratedPlan, TrackerError> {
        let plan = match request.daily_water_target_ml {
            Some(_) => generate_plan(request)?,
            None => match self.store.find::<Profile>(request.subject_id)? {
                Some(profile) => generate_plan(&request.clone().with_water_target(profile.daily_water_target_ml))?,
                None => generate_plan(request)?,
            },
        };

        self.store.insert_one(plan.program.clone())?;
        self.store.insert(plan.days.clone())?;
        self.store.insert(plan.meals.clone())?;

        info!(
            program_id = %plan.program.id,
            subject_id = %plan.program.subject_id,
            days = plan.days.len(),
            meals = plan.meals.len(),
            "program created"
        );
        Ok(plan)
    }

    /// Programs of a subject by start date.
    pub fn programs_of(&self, subject_id: Uuid) -> Result<Vec<Program>, TrackerError> {
        Ok(self
            .store
            .query(&Query::new().eq("subject_id", subject_id).order_by(Order::asc("start_date")))?)
    }

    /// The program covering `date`; the latest-starting one wins on overlap.
    pub fn active_program(&self, subject_id: Uuid, date: NaiveDate) -> Result<Option<Program>, TrackerError> {
        let query = Query::new()
            .eq("subject_id", subject_id)
            .lte("start_date", date)
            .gte("end_date", date)
            .order_by(Order::desc("start_date"))
            .limit(1);
        Ok(self.store.query::<Program>(&query)?.into_iter().next())
    }

    pub fn days_of_program(&self, program_id: Uuid) -> Result<Vec<Day>, TrackerError> {
        Ok(self
            .store
            .query(&Query::new().eq("program_id", program_id).order_by(Order::asc("date")))?)
    }

    pub fn day(&self, day_id: Uuid) -> Result<Day, TrackerError> {
        self.store
            .find::<Day>(day_id)?
            .ok_or_else(|| TrackerError::not_found("day", day_id))
    }

    pub fn day_on(&self, program_id: Uuid, date: NaiveDate) -> Result<Option<Day>, TrackerError> {
        let query = Query::new().eq("program_id", program_id).eq("date", date).limit(1);
        Ok(self.store.query::<Day>(&query)?.into_iter().next())
    }

    // ---- meals ----

    pub fn meals_of_day(&self, day_id: Uuid) -> Result<Vec<Meal>, TrackerError> {
        Ok(self
            .store
            .query(&Query::new().eq("day_id", day_id).order_by(Order::asc("start_time")))?)
    }

    pub fn meal(&self, meal_id: Uuid) -> Result<Meal, TrackerError> {
        self.store
            .find::<Meal>(meal_id)?
            .ok_or_else(|| TrackerError::not_found("meal", meal_id))
    }

    pub fn add_meal_to_day(
        &self,
        day_id: Uuid,
        slot: MealSlot,
        window: SlotWindow,
        title: Option<String>,
    ) -> Result<Meal, TrackerError> {
        window.validate(slot)?;
        self.day(day_id)?;

        let mut meal = Meal::new(day_id, slot, window.start, window.end);
        meal.title = title;
        let meal = self.store.insert_one(meal)?;
        debug!(meal_id = %meal.id, %day_id, %slot, "meal added");
        Ok(meal)
    }

    pub fn update_meal(&self, meal_id: Uuid, patch: &MealPatch) -> Result<Meal, TrackerError> {
        let mut meal = self.meal(meal_id)?;
        if let Some(window) = patch.window {
            window.validate(meal.slot)?;
        }
        patch.apply(&mut meal);

        let updated = meal.clone();
        self.store
            .update::<Meal>(&Query::by_id(meal_id), &|row| *row = updated.clone())?;
        debug!(%meal_id, "meal updated");
        Ok(meal)
    }

    /// Delete a meal and its items. Returns whether the meal existed.
    pub fn delete_meal(&self, meal_id: Uuid) -> Result<bool, TrackerError> {
        let items = self.store.delete::<MealItem>(&Query::new().eq("meal_id", meal_id))?;
        let meals = self.store.delete::<Meal>(&Query::by_id(meal_id))?;
        debug!(%meal_id, items, "meal deleted");
        Ok(meals > 0)
    }

    // ---- items ----

    pub fn add_item(&self, item: MealItem) -> Result<MealItem, TrackerError> {
        self.meal(item.meal_id)?;
        Ok(self.store.insert_one(item)?)
    }

    /// Items in `sort_order`, unordered items last.
    pub fn list_items(&self, meal_id: Uuid) -> Result<Vec<MealItem>, TrackerError> {
        let query = Query::new()
            .eq("meal_id", meal_id)
            .order_by(Order::asc("sort_order").nulls(Nulls::Last));
        Ok(self.store.query(&query)?)
    }

    pub fn delete_item(&self, item_id: Uuid) -> Result<bool, TrackerError> {
        Ok(self.store.delete::<MealItem>(&Query::by_id(item_id))? > 0)
    }

    fn items_of_meals(&self, meals: &[Meal]) -> Result<Vec<MealItem>, TrackerError> {
        if meals.is_empty() {
            return Ok(Vec::new());
        }
        let query = Query::new()
            .is_in("meal_id", meals.iter().map(|m| m.id))
            .order_by(Order::asc("sort_order").nulls(Nulls::Last));
        Ok(self.store.query(&query)?)
    }

    // ---- cloning ----

    /// Copy `source_day_id` onto one target day. Returns 1, or 0 when the source is empty.
    pub fn clone_day(&self, source_day_id: Uuid, target_day_id: Uuid, overwrite: bool) -> Result<usize, TrackerError> {
        let target = self.day(target_day_id)?;
        self.clone_onto(source_day_id, &[target], overwrite)
    }

    /// Copy `source_day_id` onto every later day of its program.
    pub fn copy_day_to_remaining(&self, source_day_id: Uuid, overwrite: bool) -> Result<usize, TrackerError> {
        let source = self.day(source_day_id)?;
        let query = Query::new()
            .eq("program_id", source.program_id)
            .gt("date", source.date)
            .order_by(Order::asc("date"));
        let targets: Vec<Day> = self.store.query(&query)?;
        self.clone_onto(source_day_id, &targets, overwrite)
    }

    fn clone_onto(&self, source_day_id: Uuid, targets: &[Day], overwrite: bool) -> Result<usize, TrackerError> {
        let source_meals = self.meals_of_day(source_day_id)?;
        if source_meals.is_empty() {
            debug!(%source_day_id, "source day has no meals; nothing to copy");
            return Ok(0);
        }
        let source_items = self.items_of_meals(&source_meals)?;

        for target in targets {
            if overwrite {
                let existing = self.meals_of_day(target.id)?;
                if !existing.is_empty() {
                    self.store
                        .delete::<MealItem>(&Query::new().is_in("meal_id", existing.iter().map(|m| m.id)))?;
                    self.store.delete::<Meal>(&Query::new().eq("day_id", target.id))?;
                }
            }
            let cloned = clone_meals(&source_meals, &source_items, target.id);
            self.store.insert(cloned.meals)?;
            self.store.insert(cloned.items)?;
        }

        info!(%source_day_id, days = targets.len(), overwrite, "day copied");
        Ok(targets.len())
    }

    // ---- logging ----

    pub fn log_meal(
        &self,
        meal_id: Uuid,
        subject_id: Uuid,
        status: LogStatus,
        photo_ref: Option<String>,
    ) -> Result<MealLog, TrackerError> {
        self.meal(meal_id)?;
        let mut log = MealLog::new(meal_id, subject_id, status, self.clock.now_utc());
        log.photo_ref = photo_ref;
        let log = self.store.insert_one(log)?;
        info!(%meal_id, %subject_id, ?status, "meal logged");
        Ok(log)
    }

    pub fn add_water(&self, day_id: Uuid, subject_id: Uuid, milliliters: i64) -> Result<WaterLog, TrackerError> {
        let ml = u32::try_from(milliliters)
            .ok()
            .filter(|ml| *ml > 0)
            .ok_or(TrackerError::InvalidWaterAmount(milliliters))?;
        self.day(day_id)?;

        let log = self
            .store
            .insert_one(WaterLog::new(day_id, subject_id, ml, self.clock.now_utc()))?;
        info!(%day_id, %subject_id, ml, "water logged");
        Ok(log)
    }

    pub fn water_total_ml(&self, day_id: Uuid, subject_id: Uuid) -> Result<u64, TrackerError> {
        let logs: Vec<WaterLog> = self
            .store
            .query(&Query::new().eq("day_id", day_id).eq("subject_id", subject_id))?;
        Ok(total_water_ml(&logs))
    }

    // ---- today ----

    pub fn today(&self, subject_id: Uuid) -> Result<TodayView, TrackerError> {
        let today = self.clock.today();
        let Some(program) = self.active_program(subject_id, today)? else {
            return Ok(TodayView::NoActiveProgram);
        };
        let Some(day) = self.day_on(program.id, today)? else {
            return Ok(TodayView::NoProgramDayForToday { program });
        };

        let meals = self.meals_of_day(day.id)?;
        let items = self.items_of_meals(&meals)?;
        let logs = self.logs_of_meals(&meals, subject_id)?;
        let now = self.clock.now_utc();
        let tz = self.clock.timezone();

        let views = meals
            .iter()
            .map(|meal| {
                let own: Vec<MealItem> = items.iter().filter(|i| i.meal_id == meal.id).cloned().collect();
                build_view(meal, &own, day.date, &logs, subject_id, now, tz)
            })
            .collect();

        Ok(TodayView::Ready(TodayPlan {
            water_ml: self.water_total_ml(day.id, subject_id)?,
            water_target_ml: program.water_target_ml(),
            program,
            day,
            meals: views,
        }))
    }

    fn logs_of_meals(&self, meals: &[Meal], subject_id: Uuid) -> Result<Vec<MealLog>, TrackerError> {
        if meals.is_empty() {
            return Ok(Vec::new());
        }
        let query = Query::new()
            .eq("subject_id", subject_id)
            .is_in("meal_id", meals.iter().map(|m| m.id));
        Ok(self.store.query(&query)?)
    }

    // ---- reports ----

    fn day_input(&self, day: Day, subject_id: Uuid) -> Result<DayInput, TrackerError> {
        let meals = self.meals_of_day(day.id)?;
        let logs = self.logs_of_meals(&meals, subject_id)?;
        let water: Vec<WaterLog> = self
            .store
            .query(&Query::new().eq("day_id", day.id).eq("subject_id", subject_id))?;
        Ok(DayInput::new(day, meals, logs, water))
    }

    pub fn day_summary(&self, day_id: Uuid, subject_id: Uuid) -> Result<DaySummary, TrackerError> {
        let day = self.day(day_id)?;
        let date = day.date;
        let input = self.day_input(day, subject_id)?;
        Ok(summarize_day(&input, date, subject_id, self.clock.now_utc(), self.clock.timezone()))
    }

    /// Summaries for every program day of `subject_id` in `[from, to]`.
    pub fn range_report(&self, subject_id: Uuid, from: NaiveDate, to: NaiveDate) -> Result<RangeReport, TrackerError> {
        let programs = self.programs_of(subject_id)?;
        let program_ids: Vec<Uuid> = programs
            .iter()
            .filter(|p| p.start_date <= to && p.end_date >= from)
            .map(|p| p.id)
            .collect();

        let mut inputs = Vec::new();
        if !program_ids.is_empty() {
            let days: Vec<Day> = self.store.query(
                &Query::new()
                    .is_in("program_id", program_ids)
                    .gte("date", from)
                    .lte("date", to)
                    .order_by(Order::asc("date")),
            )?;
            for day in days {
                inputs.push(self.day_input(day, subject_id)?);
            }
        }

        let mut report = summarize_range(from, to, &inputs, subject_id, self.clock.now_utc(), self.clock.timezone());
        report.water_target_ml = self.store.find::<Profile>(subject_id)?.map(|p| p.daily_water_target_ml);
        debug!(%subject_id, %from, %to, days = report.days.len(), "range report built");
        Ok(report)
    }

    /// Report over the whole span of the subject's programs; `None` without any.
    pub fn subject_report(&self, subject_id: Uuid) -> Result<Option<RangeReport>, TrackerError> {
        let programs = self.programs_of(subject_id)?;
        let (Some(from), Some(to)) = (
            programs.iter().map(|p| p.start_date).min(),
            programs.iter().map(|p| p.end_date).max(),
        ) else {
            return Ok(None);
        };
        self.range_report(subject_id, from, to).map(Some)
    }

    // ---- reminders ----

    /// Future reminders for the subject's local today. Empty without a program day.
    pub fn today_reminders(&self, subject_id: Uuid) -> Result<Vec<ReminderDescriptor>, TrackerError> {
        let today = self.clock.today();
        let meals = match self.active_program(subject_id, today)? {
            Some(program) => match self.day_on(program.id, today)? {
                Some(day) => self.meals_of_day(day.id)?,
                None => Vec::new(),
            },
            None => Vec::new(),
        };

        Ok(plan_day_reminders(
            &meals,
            today,
            self.cadence,
            subject_id,
            self.clock.now_utc(),
            self.clock.timezone(),
            self.policy,
        ))
    }

    // ---- questions ----

    pub fn ask_question(
        &self,
        subject_id: Uuid,
        caregiver_id: Uuid,
        title: Option<&str>,
        body: Option<&str>,
    ) -> Result<Question, TrackerError> {
        let q = Question::ask(subject_id, caregiver_id, title, body, self.clock.now_utc());
        let q = self.store.insert_one(q)?;
        info!(question_id = %q.id, %subject_id, %caregiver_id, "question asked");
        Ok(q)
    }

    /// Ask whoever [`Tracker::default_caregiver`] resolves to.
    pub fn ask_default_caregiver(
        &self,
        subject_id: Uuid,
        title: Option<&str>,
        body: Option<&str>,
    ) -> Result<Question, TrackerError> {
        let caregiver = self.default_caregiver()?.ok_or(TrackerError::NoCaregiver)?;
        self.ask_question(subject_id, caregiver.id, title, body)
    }

    pub fn answer_question(&self, question_id: Uuid, answer: &str) -> Result<Question, TrackerError> {
        let mut q = self
            .store
            .find::<Question>(question_id)?
            .ok_or_else(|| TrackerError::not_found("question", question_id))?;
        q.answer(answer, self.clock.now_utc());

        let updated = q.clone();
        self.store
            .update::<Question>(&Query::by_id(question_id), &|row| *row = updated.clone())?;
        info!(%question_id, "question answered");
        Ok(q)
    }

    pub fn list_questions(&self, filter: &QuestionFilter) -> Result<Vec<Question>, TrackerError> {
        Ok(filter.list(&self.store, self.clock.timezone())?)
    }

    pub fn poll_questions(&self, kind: WatchKind, cursor: &mut PollCursor) -> Result<Vec<Question>, TrackerError> {
        Ok(cursor.poll(&self.store, kind)?)
    }
}
