use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::Subcommand;
use uuid::Uuid;

use nourish_core::{Clock, LogStatus, RangeReport, TodayView};

use crate::config::Config;
use crate::state::open_tracker;

#[derive(Subcommand, Debug)]
pub enum LogCommand {
    /// Record a meal as eaten (or skipped)
    Meal {
        meal: Uuid,

        #[arg(long, default_value_t = false)]
        skipped: bool,

        /// Reference to an uploaded photo
        #[arg(long)]
        photo: Option<String>,
    },

    /// Record water intake in ml
    Water {
        ml: i64,

        /// Day to log against (default: today's program day)
        #[arg(long)]
        day: Option<Uuid>,
    },
}

pub fn run_log(cmd: LogCommand, cfg: &Config, subject: Uuid) -> Result<()> {
    let tracker = open_tracker(cfg)?;
    match cmd {
        LogCommand::Meal { meal, skipped, photo } => {
            let status = if skipped { LogStatus::Skipped } else { LogStatus::Eaten };
            let log = tracker.log_meal(meal, subject, status, photo)?;
            let tz = tracker.clock().timezone();
            println!(
                "Logged {:?} at {}",
                log.status,
                log.logged_at_utc.with_timezone(&tz).format("%H:%M")
            );
        }

        LogCommand::Water { ml, day } => {
            let day = match day {
                Some(d) => d,
                None => match tracker.today(subject)? {
                    TodayView::Ready(today) => today.day.id,
                    _ => bail!("no program day for today; pass --day"),
                },
            };
            tracker.add_water(day, subject, ml)?;
            let total = tracker.water_total_ml(day, subject)?;
            println!("+{ml} ml, {total} ml today");
        }
    }
    Ok(())
}

pub fn run_today(cfg: &Config, subject: Uuid) -> Result<()> {
    let tracker = open_tracker(cfg)?;
    match tracker.today(subject)? {
        TodayView::NoActiveProgram => println!("No active program today."),
        TodayView::NoProgramDayForToday { program } => {
            println!("Program {} has no day for today.", program.id)
        }
        TodayView::Ready(today) => {
            println!("# {} (day of program {})\n", today.day.date.format("%d.%m.%Y"), today.program.id);
            for m in &today.meals {
                println!("{} {} | {} | {}", m.slot_emoji, m.title, m.time_range, m.badge.label());
                println!("   {}", m.subtitle);
                println!("   {}", m.relative_text);
                for line in &m.items {
                    println!("   - {line}");
                }
                if !m.kcal_text.is_empty() {
                    println!("   {}", m.kcal_text);
                }
                if !m.last_log_text.is_empty() {
                    println!("   {}", m.last_log_text);
                }
                println!("   id {}", m.meal_id);
            }
            println!(
                "\nWater: {} / {} ml ({:.0}%)",
                today.water_ml,
                today.water_target_ml,
                today.water_progress() * 100.0
            );
        }
    }
    Ok(())
}

pub fn run_report(cfg: &Config, subject: Uuid, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<()> {
    let tracker = open_tracker(cfg)?;
    let report = match (from, to) {
        (Some(from), Some(to)) => {
            if from > to {
                bail!("--from must not be after --to");
            }
            tracker.range_report(subject, from, to)?
        }
        (None, None) => tracker
            .subject_report(subject)?
            .context("subject has no programs")?,
        _ => bail!("pass both --from and --to, or neither for the whole plan"),
    };
    print_report(&report);
    Ok(())
}

fn print_report(report: &RangeReport) {
    let s = &report.summary;
    println!("# Report {}\n", s.range_text());
    for day in &report.days {
        println!(
            "{} | {}/{} done, {} skipped, {} missed | {} | {} ({})",
            day.date.format("%d.%m.%Y"),
            day.done,
            day.planned,
            day.skipped,
            day.missed,
            day.water_text(),
            day.adherence_label(),
            day.band().label()
        );
        for m in &day.meals {
            println!("   {} {:?}", m.name, m.state);
        }
    }
    println!(
        "\nAdherence {}% | planned {} | done {} | skipped {} | missed {} | water {:.2} L ({:.2} L/day)",
        s.adherence_pct,
        s.planned,
        s.done,
        s.skipped,
        s.missed,
        s.total_water_liters,
        s.avg_water_liters_per_day
    );
    if let (Some(target), Some(days)) = (report.water_target_ml, report.water_goal_days()) {
        println!("Water goal {target} ml reached on {days}/{} days", report.days.len());
    }
}
