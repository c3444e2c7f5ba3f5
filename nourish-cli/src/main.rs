use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::debug;
use uuid::Uuid;

mod config;
mod logging;
mod plan_cmd;
mod profile_cmd;
mod questions_cmd;
mod reminders_cmd;
mod state;
mod store;
mod track_cmd;
mod watcher;

use plan_cmd::{ItemCommand, MealCommand, PlanCommand};
use profile_cmd::ProfileCommand;
use questions_cmd::{Participants, QuestionsCommand};
use reminders_cmd::RemindersCommand;
use track_cmd::LogCommand;

#[derive(Parser, Debug)]
#[command(
    name = "nourish",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("NOURISH_BUILD_SHA"), ")"),
    about = "Meal-plan adherence tracker"
)]
struct Cli {
    /// Subject (patient) id; defaults to [tracker] subject_id
    #[arg(long, global = true)]
    subject: Option<Uuid>,

    /// Caregiver id; defaults to [tracker] caregiver_id
    #[arg(long, global = true)]
    caregiver: Option<Uuid>,

    /// Debug logging unless RUST_LOG is set
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage ~/.nourish/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Subjects, caregivers and water targets
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },

    /// Create and inspect programs
    Plan {
        #[command(subcommand)]
        command: PlanCommand,
    },

    /// Edit a day's meals
    Meal {
        #[command(subcommand)]
        command: MealCommand,
    },

    /// Edit a meal's items
    Item {
        #[command(subcommand)]
        command: ItemCommand,
    },

    /// Log meals and water
    Log {
        #[command(subcommand)]
        command: LogCommand,
    },

    /// Today's meals, their state and water progress
    Today,

    /// Adherence report for a date range, or the whole plan
    Report {
        #[arg(long)]
        from: Option<NaiveDate>,

        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Local meal and water reminders
    Reminders {
        #[command(subcommand)]
        command: RemindersCommand,
    },

    /// Questions between subject and caregiver
    Questions {
        #[command(subcommand)]
        command: QuestionsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write the default config if none exists
    Init,

    /// Print the effective config
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config()?;
    logging::init(&cfg.log, cli.verbose)?;
    debug!(home = %state::nourish_home()?.display(), "config loaded");

    let subject = cli.subject.or(cfg.tracker.subject_id);
    let caregiver = cli.caregiver.or(cfg.tracker.caregiver_id);
    let require_subject = || subject.context("pass --subject or set [tracker] subject_id");

    match cli.command {
        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => config::show_config()?,
        },
        Command::Profile { command } => profile_cmd::run(command, &cfg, subject)?,
        Command::Plan { command } => plan_cmd::run_plan(command, &cfg, subject)?,
        Command::Meal { command } => plan_cmd::run_meal(command, &cfg)?,
        Command::Item { command } => plan_cmd::run_item(command, &cfg)?,
        Command::Log { command } => track_cmd::run_log(command, &cfg, require_subject()?)?,
        Command::Today => track_cmd::run_today(&cfg, require_subject()?)?,
        Command::Report { from, to } => track_cmd::run_report(&cfg, require_subject()?, from, to)?,
        Command::Reminders { command } => reminders_cmd::run(command, subject).await?,
        Command::Questions { command } => {
            questions_cmd::run(command, &cfg, Participants { subject, caregiver }).await?
        }
    }

    Ok(())
}
