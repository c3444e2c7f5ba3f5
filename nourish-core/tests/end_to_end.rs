use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use nourish_core::{
    AdherenceBand, Clock, Day, FixedClock, LogStatus, MealItem, MealLog, MealSlot, MealState, MemoryStore,
    Participant, PlanRequest, PollCursor, Query, QuestionFilter, QuestionStatus, ReminderKind, SlotWindow, StatusBadge, Store,
    TodayView, Tracker, WatchKind,
};
use uuid::Uuid;

const TZ: Tz = chrono_tz::Europe::Istanbul;

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// A tracker over the shared store whose clock reads `d` at `h:m` local time.
fn at(store: &Arc<MemoryStore>, d: u32, h: u32, m: u32) -> Tracker<Arc<MemoryStore>, FixedClock> {
    Tracker::new(Arc::clone(store), FixedClock::at_local(date(d), time(h, m), TZ))
}

fn lunch_plan(subject: Uuid, days: u32) -> PlanRequest {
    PlanRequest::new(subject, date(1), days, [MealSlot::Lunch])
        .with_window(MealSlot::Lunch, SlotWindow::hm((12, 0), (13, 0)).unwrap())
}

#[test]
fn three_day_lunch_plan_reports_two_of_three() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let subject = Uuid::new_v4();

    let plan = at(&store, 1, 8, 0).create_program(&lunch_plan(subject, 3))?;
    assert_eq!(plan.days.len(), 3);
    assert_eq!(plan.meals.len(), 3);

    let lunch_on = |i: usize| plan.meals_of(plan.days[i].id).next().unwrap().id;

    // Day 1 on time, day 2 early, day 3 never logged.
    at(&store, 1, 12, 30).log_meal(lunch_on(0), subject, LogStatus::Eaten, None)?;
    at(&store, 2, 11, 0).log_meal(lunch_on(1), subject, LogStatus::Eaten, Some("photos/d2.jpg".into()))?;

    let tracker = at(&store, 4, 9, 0);
    let report = tracker.range_report(subject, date(1), date(3))?;

    assert_eq!(report.summary.planned, 3);
    assert_eq!(report.summary.done, 2);
    assert_eq!(report.summary.missed, 1);
    assert_eq!(report.summary.adherence_pct, 67);

    let states: Vec<MealState> = report.days.iter().map(|d| d.meals[0].state).collect();
    assert_eq!(states, vec![MealState::DoneOnTime, MealState::DoneEarly, MealState::Missed]);
    assert_eq!(report.days[1].meals[0].photo_ref.as_deref(), Some("photos/d2.jpg"));
    assert_eq!(report.days[2].band(), AdherenceBand::Poor);

    let whole = tracker.subject_report(subject)?.unwrap();
    assert_eq!(whole.summary, report.summary);
    Ok(())
}

#[test]
fn relog_corrects_a_skip() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let subject = Uuid::new_v4();
    let plan = at(&store, 1, 8, 0).create_program(&lunch_plan(subject, 1))?;
    let lunch = plan.meals[0].id;

    at(&store, 1, 12, 5).log_meal(lunch, subject, LogStatus::Skipped, None)?;
    at(&store, 1, 12, 40).log_meal(lunch, subject, LogStatus::Eaten, None)?;

    let summary = at(&store, 1, 18, 0).day_summary(plan.days[0].id, subject)?;
    assert_eq!((summary.done, summary.skipped), (1, 0));
    Ok(())
}

#[test]
fn copying_a_day_forward() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let subject = Uuid::new_v4();
    let tracker = at(&store, 1, 8, 0);
    let plan = tracker.create_program(
        &PlanRequest::new(subject, date(1), 4, [MealSlot::Breakfast, MealSlot::Dinner]),
    )?;
    let source = plan.days[0].id;

    let breakfast = tracker.meals_of_day(source)?[0].clone();
    tracker.add_item(MealItem::new(breakfast.id, "Eggs").with_quantity(2.0, None).with_sort_order(1))?;
    tracker.add_item(MealItem::new(breakfast.id, "Tea").with_sort_order(2))?;
    tracker.log_meal(breakfast.id, subject, LogStatus::Eaten, None)?;

    // Overwrite: every later day ends up with exactly the source's meals.
    assert_eq!(tracker.copy_day_to_remaining(source, true)?, 3);
    for day in &plan.days[1..] {
        let meals = tracker.meals_of_day(day.id)?;
        assert_eq!(meals.iter().map(|m| m.slot).collect::<Vec<_>>(), vec![MealSlot::Breakfast, MealSlot::Dinner]);
        let items = tracker.list_items(meals[0].id)?;
        assert_eq!(items.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(), vec!["Eggs", "Tea"]);
    }

    // Additive: a second non-overwrite copy onto one day doubles its meals.
    assert_eq!(tracker.clone_day(source, plan.days[1].id, false)?, 1);
    assert_eq!(tracker.meals_of_day(plan.days[1].id)?.len(), 4);

    // Logs never travel with a copy.
    let logs: Vec<MealLog> = store.query(&Query::new())?;
    assert_eq!(logs.len(), 1);

    // An empty source is a no-op.
    let last = plan.days[3].id;
    for meal in tracker.meals_of_day(last)? {
        tracker.delete_meal(meal.id)?;
    }
    assert_eq!(tracker.clone_day(last, plan.days[1].id, true)?, 0);
    assert_eq!(tracker.meals_of_day(plan.days[1].id)?.len(), 4);
    Ok(())
}

#[test]
fn today_view_and_empty_states() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let subject = Uuid::new_v4();

    assert_eq!(at(&store, 1, 9, 0).today(subject)?, TodayView::NoActiveProgram);

    let plan = at(&store, 1, 8, 0).create_program(&lunch_plan(subject, 2).with_water_target(2500))?;
    at(&store, 1, 8, 0).add_water(plan.days[0].id, subject, 300)?;

    let TodayView::Ready(today) = at(&store, 1, 12, 15).today(subject)? else {
        panic!("expected a ready view");
    };
    assert_eq!(today.day.date, date(1));
    assert_eq!(today.water_ml, 300);
    assert_eq!(today.water_target_ml, 2500);
    assert_eq!(today.meals.len(), 1);
    assert_eq!(today.meals[0].badge, StatusBadge::InProgress);
    assert_eq!(today.meals[0].relative_text, "Now • 45 min left");

    // A day removed from the program leaves a gap on that date.
    store.delete::<Day>(&Query::by_id(plan.days[1].id))?;
    assert!(matches!(
        at(&store, 2, 9, 0).today(subject)?,
        TodayView::NoProgramDayForToday { .. }
    ));
    Ok(())
}

#[test]
fn reminders_for_today_are_stable() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let subject = Uuid::new_v4();
    at(&store, 1, 8, 0).create_program(&lunch_plan(subject, 1))?;

    let tracker = at(&store, 1, 10, 0);
    let first = tracker.today_reminders(subject)?;
    let second = tracker.today_reminders(subject)?;
    assert_eq!(first, second);

    // Lunch pre/start/end plus 10:30..21:00 every 90 minutes.
    assert_eq!(first.len(), 3 + 8);
    assert!(first.windows(2).all(|w| w[0].fire_at_utc <= w[1].fire_at_utc));

    assert!(at(&store, 2, 10, 0).today_reminders(subject)?.iter().all(|r| r.kind == ReminderKind::Water));
    Ok(())
}

#[test]
fn question_round_trip_and_watch() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let subject = Uuid::new_v4();
    let caregiver = Uuid::new_v4();

    let start_mark = at(&store, 1, 8, 0).clock().now_utc();
    let q = at(&store, 1, 9, 0).ask_question(subject, caregiver, Some("Coffee?"), Some("May I have coffee after lunch?"))?;

    let mut inbox = PollCursor::new(start_mark);
    let new = at(&store, 1, 9, 1).poll_questions(WatchKind::NewFor(caregiver), &mut inbox)?;
    assert_eq!(new.len(), 1);
    assert!(at(&store, 1, 9, 2).poll_questions(WatchKind::NewFor(caregiver), &mut inbox)?.is_empty());

    at(&store, 1, 10, 0).answer_question(q.id, "One small cup.")?;
    let mut answers = PollCursor::new(start_mark);
    let answered = at(&store, 1, 10, 1).poll_questions(WatchKind::AnsweredFor(subject), &mut answers)?;
    assert_eq!(answered[0].answer_text.as_deref(), Some("One small cup."));

    let listed = at(&store, 1, 11, 0).list_questions(
        &QuestionFilter::new(Participant::Subject(subject), date(1), date(1)).with_status(QuestionStatus::Answered),
    )?;
    assert_eq!(listed.len(), 1);
    Ok(())
}
