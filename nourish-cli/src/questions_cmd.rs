use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::Subcommand;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use nourish_core::{Clock, Participant, PollCursor, Question, QuestionFilter, QuestionStatus, WatchKind};

use crate::config::Config;
use crate::state::{data_dir, open_tracker};
use crate::store::JsonFileStore;
use crate::watcher::QuestionWatcher;

#[derive(Subcommand, Debug)]
pub enum QuestionsCommand {
    /// Ask the caregiver a question (default: the first registered caregiver)
    Ask {
        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        body: Option<String>,
    },

    /// Answer a question (caregiver side)
    Answer { question: Uuid, text: String },

    /// List questions, newest first
    List {
        /// List the caregiver's inbox instead of the subject's questions
        #[arg(long, default_value_t = false)]
        caregiver_view: bool,

        /// First day (default: 30 days ago)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day (default: today)
        #[arg(long)]
        to: Option<NaiveDate>,

        #[arg(long)]
        status: Option<QuestionStatus>,

        /// Case-insensitive text search in title, body and answer
        #[arg(long)]
        search: Option<String>,
    },

    /// Print new questions (caregiver) or new answers (subject) as they arrive
    Watch {
        #[arg(long, default_value_t = false)]
        caregiver_view: bool,
    },
}

pub struct Participants {
    pub subject: Option<Uuid>,
    pub caregiver: Option<Uuid>,
}

impl Participants {
    fn subject(&self) -> Result<Uuid> {
        self.subject.context("pass --subject or set [tracker] subject_id")
    }

    fn caregiver(&self) -> Result<Uuid> {
        self.caregiver.context("pass --caregiver or set [tracker] caregiver_id")
    }
}

pub async fn run(cmd: QuestionsCommand, cfg: &Config, who: Participants) -> Result<()> {
    let tracker = open_tracker(cfg)?;
    match cmd {
        QuestionsCommand::Ask { title, body } => {
            let q = match who.caregiver {
                Some(caregiver) => tracker.ask_question(who.subject()?, caregiver, title.as_deref(), body.as_deref())?,
                None => tracker.ask_default_caregiver(who.subject()?, title.as_deref(), body.as_deref())?,
            };
            println!("Asked {} ({})", q.display_title(), q.id);
        }

        QuestionsCommand::Answer { question, text } => {
            let q = tracker.answer_question(question, &text)?;
            println!("Answered {}: {}", q.display_title(), q.short_answer());
        }

        QuestionsCommand::List {
            caregiver_view,
            from,
            to,
            status,
            search,
        } => {
            let today = tracker.clock().today();
            let participant = if caregiver_view {
                Participant::Caregiver(who.caregiver()?)
            } else {
                Participant::Subject(who.subject()?)
            };
            let mut filter = QuestionFilter::new(
                participant,
                from.unwrap_or(today - Duration::days(30)),
                to.unwrap_or(today),
            );
            filter.status = status;
            filter.search = search;

            let tz = tracker.clock().timezone();
            let rows = tracker.list_questions(&filter)?;
            if rows.is_empty() {
                println!("No questions");
            }
            for q in rows {
                println!(
                    "{} | {} | {} | {}",
                    q.created_at_utc.with_timezone(&tz).format("%d.%m.%Y %H:%M"),
                    q.status.label(),
                    q.display_title(),
                    q.id
                );
                if !q.short_question().is_empty() {
                    println!("   Q: {}", q.short_question());
                }
                if !q.short_answer().is_empty() {
                    println!("   A: {}", q.short_answer());
                }
            }
        }

        QuestionsCommand::Watch { caregiver_view } => {
            let kind = if caregiver_view {
                WatchKind::NewFor(who.caregiver()?)
            } else {
                WatchKind::AnsweredFor(who.subject()?)
            };
            watch(cfg, kind).await?;
        }
    }
    Ok(())
}

async fn watch(cfg: &Config, kind: WatchKind) -> Result<()> {
    let store = Arc::new(JsonFileStore::open(data_dir()?)?);
    let every = std::time::Duration::from_secs(cfg.watcher.poll_seconds.max(1));
    let cursor = PollCursor::new(cfg.watcher.first_mark(Utc::now())?);

    let cancel = CancellationToken::new();
    let handle = QuestionWatcher::new(store, kind, every).spawn(cursor, cancel.clone(), move |q| print_arrival(kind, q));
    info!(?kind, poll_seconds = every.as_secs(), "watching questions; Ctrl+C to stop");

    tokio::signal::ctrl_c().await.context("listen for Ctrl+C")?;
    cancel.cancel();
    handle.await.context("watcher task")?;
    Ok(())
}

fn print_arrival(kind: WatchKind, q: &Question) {
    match kind {
        WatchKind::NewFor(_) => println!("New question: {} | {}", q.display_title(), q.short_question()),
        WatchKind::AnsweredFor(_) => println!("Your question was answered: {} | {}", q.display_title(), q.short_answer()),
    }
}
