use anyhow::{Context, Result};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use nourish_core::{Clock, MidnightWatch, ReminderDescriptor, ReminderSink, Rescheduler, StoreError};

use crate::config::load_config;
use crate::state::{CliTracker, open_tracker, reminder_queue_path};

#[derive(Subcommand, Debug)]
pub enum RemindersCommand {
    /// Re-plan today's meal and water reminders into the local queue
    Plan,

    /// List queued reminders
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Keep running and re-plan once per local midnight
    Daemon {
        /// How often to look at the clock (clamped to 1..=3599)
        #[arg(long, default_value_t = 60)]
        check_seconds: u64,
    },
}

pub async fn run(cmd: RemindersCommand, subject: Option<Uuid>) -> Result<()> {
    let require_subject = || subject.context("pass --subject or set [tracker] subject_id");
    match cmd {
        RemindersCommand::Plan => {
            let subject = require_subject()?;
            let cfg = load_config()?;
            let tracker = open_tracker(&cfg)?;
            let n = replan(&tracker, subject, &reminder_queue_path()?)?;
            println!("Scheduled {n} reminders in {}", reminder_queue_path()?.display());
            Ok(())
        }
        RemindersCommand::List { limit } => list(limit),
        RemindersCommand::Daemon { check_seconds } => daemon(require_subject()?, check_seconds).await,
    }
}

/// Local notification queue persisted as JSON, keyed by reminder id.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct QueueSink {
    #[serde(skip)]
    path: PathBuf,
    reminders: BTreeMap<Uuid, ReminderDescriptor>,
}

impl QueueSink {
    pub fn load(path: &Path) -> Result<Self> {
        let mut sink = if path.exists() {
            let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
            serde_json::from_str::<QueueSink>(&s).with_context(|| format!("parse {}", path.display()))?
        } else {
            QueueSink::default()
        };
        sink.path = path.to_path_buf();
        Ok(sink)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path).with_context(|| format!("replace {}", self.path.display()))?;
        Ok(())
    }

    pub fn ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.reminders.keys().copied()
    }

    /// Queued ids that belong to one subject.
    pub fn ids_for(&self, subject: Uuid) -> impl Iterator<Item = Uuid> + '_ {
        self.reminders.values().filter(move |r| r.subject_id == subject).map(|r| r.id)
    }

    /// Queued reminders by fire time.
    pub fn pending(&self) -> Vec<&ReminderDescriptor> {
        let mut out: Vec<_> = self.reminders.values().collect();
        out.sort_by_key(|r| r.fire_at_utc);
        out
    }
}

impl ReminderSink for QueueSink {
    fn schedule(&mut self, reminder: &ReminderDescriptor) -> Result<(), StoreError> {
        self.reminders.insert(reminder.id, reminder.clone());
        Ok(())
    }

    fn cancel(&mut self, id: Uuid) -> Result<(), StoreError> {
        self.reminders.remove(&id);
        Ok(())
    }
}

/// Cancel the subject's queued reminders, then queue today's plan.
pub fn replan(tracker: &CliTracker, subject: Uuid, queue: &Path) -> Result<usize> {
    let plan = tracker.today_reminders(subject)?;
    let mut sink = QueueSink::load(queue)?;
    let n = replan_into(&mut sink, subject, &plan)?;
    sink.save()?;
    info!(%subject, scheduled = n, "reminders planned");
    Ok(n)
}

/// Other subjects' entries in the shared queue are left alone.
pub fn replan_into(sink: &mut QueueSink, subject: Uuid, plan: &[ReminderDescriptor]) -> Result<usize> {
    let mut rescheduler = Rescheduler::with_emitted(sink.ids_for(subject).collect::<Vec<_>>());
    Ok(rescheduler.reschedule(sink, plan)?)
}

/// Sleep between clock checks; under an hour so hour 0 is never skipped.
fn check_interval(check_seconds: u64) -> Duration {
    Duration::from_secs(check_seconds.clamp(1, 3599))
}

fn list(limit: usize) -> Result<()> {
    let q = reminder_queue_path()?;
    let sink = QueueSink::load(&q)?;
    let pending = sink.pending();
    if pending.is_empty() {
        println!("No reminders queued in {}", q.display());
        return Ok(());
    }

    let tz = load_config()?.timezone()?;
    for (i, r) in pending.iter().take(limit).enumerate() {
        println!(
            "{}. {} | {} | {} (#{})",
            i + 1,
            r.fire_at_utc.with_timezone(&tz).format("%Y-%m-%d %H:%M"),
            r.title,
            r.body,
            r.notification_id()
        );
    }
    Ok(())
}

async fn daemon(subject: Uuid, check_seconds: u64) -> Result<()> {
    let cfg = load_config()?;
    let tracker = open_tracker(&cfg)?;
    let queue = reminder_queue_path()?;

    replan(&tracker, subject, &queue)?;

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.cancel();
        }
    });

    let mut watch = MidnightWatch::starting_at(tracker.clock().now_local().naive_local());
    let interval = check_interval(check_seconds);
    info!(check_seconds = interval.as_secs(), "reminder daemon running; Ctrl+C to stop");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let local = tracker.clock().now_local().naive_local();
        if watch.observe(local) {
            if let Err(e) = replan(&tracker, subject, &queue) {
                warn!(error = %e, "midnight re-plan failed");
            }
        }
    }

    info!("reminder daemon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike, Utc};
    use nourish_core::ReminderKind;
    use temp_dir::TempDir;

    fn water(i: u32, hour: u32) -> ReminderDescriptor {
        water_for(Uuid::nil(), i, hour)
    }

    fn water_for(subject: Uuid, i: u32, hour: u32) -> ReminderDescriptor {
        ReminderDescriptor {
            id: nourish_core::water_reminder_id(subject, i),
            subject_id: subject,
            fire_at_utc: Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap(),
            title: "Water time 💧".to_string(),
            body: "Drink".to_string(),
            kind: ReminderKind::Water,
        }
    }

    #[test]
    fn queue_round_trips_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.child("reminders").join("queue.json");

        let mut sink = QueueSink::load(&path).unwrap();
        let mut rescheduler = Rescheduler::new();
        rescheduler.reschedule(&mut sink, &[water(0, 12), water(1, 10)]).unwrap();
        sink.save().unwrap();

        let mut sink = QueueSink::load(&path).unwrap();
        let hours: Vec<_> = sink.pending().iter().map(|r| r.fire_at_utc.hour()).collect();
        assert_eq!(hours, vec![10, 12]);

        // A fresh process resumes from the queued ids and replaces them.
        let mut rescheduler = Rescheduler::with_emitted(sink.ids().collect::<Vec<_>>());
        rescheduler.reschedule(&mut sink, &[water(0, 15)]).unwrap();
        sink.save().unwrap();

        let sink = QueueSink::load(&path).unwrap();
        assert_eq!(sink.pending().len(), 1);
        assert_eq!(sink.pending()[0].fire_at_utc.hour(), 15);
    }

    #[test]
    fn replanning_one_subject_keeps_the_others() {
        let dir = TempDir::new().unwrap();
        let path = dir.child("queue.json");
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let mut sink = QueueSink::load(&path).unwrap();
        replan_into(&mut sink, a, &[water_for(a, 0, 9), water_for(a, 1, 11)]).unwrap();
        replan_into(&mut sink, b, &[water_for(b, 0, 10)]).unwrap();
        sink.save().unwrap();

        let mut sink = QueueSink::load(&path).unwrap();
        replan_into(&mut sink, a, &[water_for(a, 0, 14)]).unwrap();
        sink.save().unwrap();

        let sink = QueueSink::load(&path).unwrap();
        assert_eq!(sink.ids_for(a).count(), 1);
        assert_eq!(sink.ids_for(b).count(), 1);
        let hours: Vec<_> = sink.pending().iter().map(|r| r.fire_at_utc.hour()).collect();
        assert_eq!(hours, vec![10, 14]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn check_interval_stays_under_an_hour() {
        assert_eq!(check_interval(0), Duration::from_secs(1));
        assert_eq!(check_interval(60), Duration::from_secs(60));
        assert_eq!(check_interval(7200), Duration::from_secs(3599));
    }
}
