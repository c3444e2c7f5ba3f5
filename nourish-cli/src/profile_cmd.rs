use anyhow::{Context, Result};
use clap::Subcommand;
use uuid::Uuid;

use nourish_core::{Profile, Role};

use crate::config::Config;
use crate::state::open_tracker;

#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    /// Register a subject, or update the one with this email
    AddSubject {
        #[arg(long)]
        email: String,

        #[arg(long)]
        name: String,

        /// Daily water target in ml, 1000..=5000 (default 2000)
        #[arg(long)]
        water_ml: Option<u32>,
    },

    /// Register a caregiver; the first one answers questions by default
    AddCaregiver {
        #[arg(long)]
        email: String,

        #[arg(long)]
        name: String,
    },

    /// List subjects by name
    Subjects {
        /// Part of a name, or a full email address
        #[arg(long)]
        search: Option<String>,
    },

    /// Look a profile up by email
    Find {
        email: String,

        #[arg(long, default_value = "subject")]
        role: Role,
    },

    /// Change the subject's daily water target
    SetWater { ml: u32 },

    /// Show the subject's profile
    Show,
}

pub fn run(cmd: ProfileCommand, cfg: &Config, subject: Option<Uuid>) -> Result<()> {
    let tracker = open_tracker(cfg)?;
    let require_subject = || subject.context("pass --subject or set [tracker] subject_id");
    match cmd {
        ProfileCommand::AddSubject { email, name, water_ml } => {
            let p = tracker.create_subject(&email, &name, water_ml)?;
            println!("Subject {} ({})", p.full_name, p.id);
        }

        ProfileCommand::AddCaregiver { email, name } => {
            let p = tracker.create_caregiver(&email, &name)?;
            println!("Caregiver {} ({})", p.full_name, p.id);
        }

        ProfileCommand::Subjects { search } => {
            let rows = match search.as_deref() {
                Some(term) => tracker.search_subjects(term)?,
                None => tracker.list_subjects()?,
            };
            if rows.is_empty() {
                println!("No subjects");
            }
            for p in &rows {
                print_profile(p);
            }
        }

        ProfileCommand::Find { email, role } => match tracker.find_by_email(role, &email)? {
            Some(p) => print_profile(&p),
            None => println!("No {role} with email {email}"),
        },

        ProfileCommand::SetWater { ml } => {
            let p = tracker.set_water_target(require_subject()?, ml)?;
            println!("{} now targets {} ml a day", p.full_name, p.daily_water_target_ml);
        }

        ProfileCommand::Show => print_profile(&tracker.profile(require_subject()?)?),
    }
    Ok(())
}

fn print_profile(p: &Profile) {
    println!(
        "{} | {} | {} | {} ml | {}",
        p.full_name,
        p.role,
        p.email.as_deref().unwrap_or("-"),
        p.daily_water_target_ml,
        p.id
    );
}
