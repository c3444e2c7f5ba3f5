use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveTime};
use clap::Subcommand;
use uuid::Uuid;

use nourish_core::{
    Clock, MealItem, MealPatch, MealSlot, PlanRequest, Profile, SlotWindow, Store, parse_hhmm, parse_slot_window,
};

use crate::config::Config;
use crate::state::{CliTracker, open_tracker};

pub fn hhmm(s: &str) -> Result<NaiveTime, String> {
    parse_hhmm(s).map_err(|e| e.to_string())
}

#[derive(Subcommand, Debug)]
pub enum PlanCommand {
    /// Create a program with one day per date and one meal per selected slot
    Create {
        /// First day (default: today)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Number of days, 1..=365
        #[arg(long)]
        days: u32,

        /// Slot to include (breakfast, snack1, lunch, snack2, dinner); repeatable
        #[arg(long = "slot")]
        slots: Vec<MealSlot>,

        /// Window override as slot=HH:MM-HH:MM; repeatable, also selects the slot
        #[arg(long = "window")]
        windows: Vec<String>,

        /// Daily water target in ml (default: the subject's profile, then config)
        #[arg(long)]
        water_ml: Option<u32>,
    },

    /// List the subject's programs
    List,

    /// List a program's days
    Days {
        #[arg(long)]
        program: Uuid,
    },

    /// Copy one day's meals and items to another day, or to every later day
    CopyDay {
        #[arg(long)]
        from: Uuid,

        /// Single target day (default: all remaining days of the program)
        #[arg(long)]
        to: Option<Uuid>,

        /// Replace the targets' meals instead of adding to them
        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum MealCommand {
    /// List a day's meals in time order
    List {
        #[arg(long)]
        day: Uuid,
    },

    /// Add a meal to a day
    Add {
        #[arg(long)]
        day: Uuid,

        #[arg(long)]
        slot: MealSlot,

        #[arg(long, value_parser = hhmm)]
        start: NaiveTime,

        #[arg(long, value_parser = hhmm)]
        end: NaiveTime,

        #[arg(long)]
        title: Option<String>,
    },

    /// Change a meal's title, note, kcal or window
    Update {
        meal: Uuid,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        note: Option<String>,

        #[arg(long)]
        kcal: Option<u32>,

        #[arg(long, value_parser = hhmm, requires = "end")]
        start: Option<NaiveTime>,

        #[arg(long, value_parser = hhmm, requires = "start")]
        end: Option<NaiveTime>,
    },

    /// Delete a meal and its items
    Delete { meal: Uuid },
}

#[derive(Subcommand, Debug)]
pub enum ItemCommand {
    /// Add a food line to a meal
    Add {
        #[arg(long)]
        meal: Uuid,

        #[arg(long)]
        name: String,

        #[arg(long)]
        qty: Option<f64>,

        #[arg(long)]
        unit: Option<String>,

        #[arg(long)]
        kcal: Option<u32>,

        #[arg(long)]
        note: Option<String>,

        #[arg(long)]
        order: Option<i32>,
    },

    /// List a meal's items
    List {
        #[arg(long)]
        meal: Uuid,
    },

    /// Delete an item
    Delete { item: Uuid },
}

pub fn run_plan(cmd: PlanCommand, cfg: &Config, subject: Option<Uuid>) -> Result<()> {
    let tracker = open_tracker(cfg)?;
    match cmd {
        PlanCommand::Create {
            start,
            days,
            slots,
            windows,
            water_ml,
        } => {
            let subject = subject.context("pass --subject or set [tracker] subject_id")?;
            let start = start.unwrap_or_else(|| tracker.clock().today());

            let mut request = PlanRequest::new(subject, start, days, slots);
            let has_profile = tracker.store().find::<Profile>(subject)?.is_some();
            match water_ml {
                Some(ml) => request = request.with_water_target(ml),
                None if !has_profile => request = request.with_water_target(cfg.water.default_target_ml),
                None => {}
            }
            for text in &windows {
                let (slot, window) = parse_slot_window(text)?;
                request.slots.insert(slot);
                request = request.with_window(slot, window);
            }

            let plan = tracker.create_program(&request)?;
            println!(
                "Created program {} ({} – {}, {} days, {} meals)",
                plan.program.id,
                plan.program.start_date,
                plan.program.end_date,
                plan.days.len(),
                plan.meals.len()
            );
        }

        PlanCommand::List => {
            let subject = subject.context("pass --subject or set [tracker] subject_id")?;
            let programs = tracker.programs_of(subject)?;
            if programs.is_empty() {
                println!("No programs for {subject}");
            }
            for p in programs {
                println!(
                    "{} | {} – {} | {} days | water {} ml",
                    p.id,
                    p.start_date,
                    p.end_date,
                    p.day_count,
                    p.water_target_ml()
                );
            }
        }

        PlanCommand::Days { program } => {
            for day in tracker.days_of_program(program)? {
                let meals = tracker.meals_of_day(day.id)?;
                println!("{} | {} | {} meals", day.id, day.date, meals.len());
            }
        }

        PlanCommand::CopyDay { from, to, overwrite } => {
            let n = match to {
                Some(target) => tracker.clone_day(from, target, overwrite)?,
                None => tracker.copy_day_to_remaining(from, overwrite)?,
            };
            if n == 0 {
                println!("Source day has no meals; nothing copied.");
            } else {
                println!("Copied to {n} day(s){}", if overwrite { " (overwritten)" } else { "" });
            }
        }
    }
    Ok(())
}

pub fn run_meal(cmd: MealCommand, cfg: &Config) -> Result<()> {
    let tracker = open_tracker(cfg)?;
    match cmd {
        MealCommand::List { day } => print_meals(&tracker, day)?,

        MealCommand::Add {
            day,
            slot,
            start,
            end,
            title,
        } => {
            let meal = tracker.add_meal_to_day(day, slot, SlotWindow::new(start, end), title)?;
            println!("Added {} {} ({})", meal.slot.title(), meal.id, window_text(meal.start_time, meal.end_time));
        }

        MealCommand::Update {
            meal,
            title,
            note,
            kcal,
            start,
            end,
        } => {
            let window = match (start, end) {
                (Some(s), Some(e)) => Some(SlotWindow::new(s, e)),
                (None, None) => None,
                _ => bail!("--start and --end go together"),
            };
            let patch = MealPatch {
                title: title.map(|t| Some(t).filter(|t| !t.trim().is_empty())),
                note: note.map(|n| Some(n).filter(|n| !n.trim().is_empty())),
                kcal: kcal.map(Some),
                window,
            };
            let meal = tracker.update_meal(meal, &patch)?;
            println!("Updated {} ({})", meal.display_title(), window_text(meal.start_time, meal.end_time));
        }

        MealCommand::Delete { meal } => {
            if tracker.delete_meal(meal)? {
                println!("Deleted meal {meal}");
            } else {
                println!("No meal {meal}");
            }
        }
    }
    Ok(())
}

pub fn run_item(cmd: ItemCommand, cfg: &Config) -> Result<()> {
    let tracker = open_tracker(cfg)?;
    match cmd {
        ItemCommand::Add {
            meal,
            name,
            qty,
            unit,
            kcal,
            note,
            order,
        } => {
            let mut item = MealItem::new(meal, name.trim());
            item.quantity = qty;
            item.unit = unit;
            item.kcal = kcal;
            item.note = note;
            item.sort_order = order;
            let item = tracker.add_item(item)?;
            println!("Added {} ({})", item.pretty(), item.id);
        }

        ItemCommand::List { meal } => {
            let items = tracker.list_items(meal)?;
            if items.is_empty() {
                println!("No items specified");
            }
            for item in &items {
                println!("{} | {}", item.id, item.pretty());
            }
            let kcal: u32 = items.iter().filter_map(|i| i.kcal).sum();
            if kcal > 0 {
                println!("Total: {kcal} kcal");
            }
        }

        ItemCommand::Delete { item } => {
            if tracker.delete_item(item)? {
                println!("Deleted item {item}");
            } else {
                println!("No item {item}");
            }
        }
    }
    Ok(())
}

fn print_meals(tracker: &CliTracker, day: Uuid) -> Result<()> {
    let meals = tracker.meals_of_day(day)?;
    if meals.is_empty() {
        println!("No meals on this day");
    }
    for meal in meals {
        let items = tracker.list_items(meal.id)?;
        println!(
            "{} {} | {} | {} | {} item(s)",
            meal.slot.emoji(),
            meal.display_title(),
            window_text(meal.start_time, meal.end_time),
            meal.id,
            items.len()
        );
    }
    Ok(())
}

pub fn window_text(start: NaiveTime, end: NaiveTime) -> String {
    format!("{} – {}", start.format("%H:%M"), end.format("%H:%M"))
}
