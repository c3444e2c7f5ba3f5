//! nourish-core: plan, meal-state, adherence and reminder logic for the Nourish tracker

pub mod adherence;
pub mod clock;
pub mod cloner;
pub mod error;
pub mod meal_state;
pub mod model;
pub mod plan;
pub mod profiles;
pub mod questions;
pub mod reminders;
pub mod store;
pub mod tracker;

pub use adherence::{AdherenceBand, DayInput, DaySummary, MealOutcome, RangeReport, RangeSummary, summarize_day, summarize_range};
pub use clock::{Clock, FixedClock, SystemClock, local_to_utc, parse_date, parse_hhmm, parse_timezone};
pub use cloner::{ClonedDay, clone_meals};
pub use error::{InvalidPlanRequest, StoreError, TrackerError};
pub use meal_state::{Evaluation, MealState, MealView, MealWindow, RelativeDuration, StatusBadge, build_view, evaluate, evaluate_meal};
pub use model::{
    DEFAULT_WATER_TARGET_ML, Day, LogStatus, Meal, MealItem, MealLog, MealSlot, Program, WaterLog, latest_log,
    total_water_ml,
};
pub use plan::{GeneratedPlan, PlanRequest, SlotWindow, default_windows, generate_plan, parse_slot_window};
pub use profiles::{MAX_WATER_TARGET_ML, MIN_WATER_TARGET_ML, Profile, Role, normalize_email, validate_water_target};
pub use questions::{Participant, PollCursor, Question, QuestionFilter, QuestionStatus, WatchKind, preview};
pub use reminders::{
    MAX_WATER_REMINDERS, MidnightWatch, ReminderBoundary, ReminderDescriptor, ReminderKind, ReminderPolicy, ReminderSink,
    Rescheduler, WaterCadence, plan_day_reminders, plan_meal_reminders, plan_water_reminders, reminder_id,
    water_reminder_id,
};
pub use store::{Direction, Filter, MemoryStore, Nulls, Order, Query, Record, Store, Value};
pub use tracker::{MealPatch, TodayPlan, TodayView, Tracker};
