//! Caregiver ↔ subject questions and the polling primitive behind the watcher.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::local_to_utc;
use crate::error::StoreError;
use crate::store::{Order, Query, Record, Store, Value};

pub const PREVIEW_CHARS: usize = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionStatus {
    Open,
    Answered,
    Closed,
}

impl QuestionStatus {
    pub fn key(&self) -> &'static str {
        match self {
            QuestionStatus::Open => "open",
            QuestionStatus::Answered => "answered",
            QuestionStatus::Closed => "closed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            QuestionStatus::Open => "Unanswered",
            QuestionStatus::Answered => "Answered",
            QuestionStatus::Closed => "Closed",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            QuestionStatus::Open => "#F59E0B",
            QuestionStatus::Answered => "#10B981",
            QuestionStatus::Closed => "#6B7280",
        }
    }
}

impl fmt::Display for QuestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for QuestionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(QuestionStatus::Open),
            "answered" => Ok(QuestionStatus::Answered),
            "closed" => Ok(QuestionStatus::Closed),
            other => Err(format!("unknown question status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub caregiver_id: Uuid,
    pub title: Option<String>,
    pub body: Option<String>,
    pub answer_text: Option<String>,
    pub status: QuestionStatus,
    pub created_at_utc: DateTime<Utc>,
    pub answered_at_utc: Option<DateTime<Utc>>,
}

fn trimmed(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

impl Question {
    pub fn ask(subject_id: Uuid, caregiver_id: Uuid, title: Option<&str>, body: Option<&str>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id,
            caregiver_id,
            title: trimmed(title),
            body: trimmed(body),
            answer_text: None,
            status: QuestionStatus::Open,
            created_at_utc: now,
            answered_at_utc: None,
        }
    }

    pub fn answer(&mut self, text: &str, now: DateTime<Utc>) {
        self.answer_text = trimmed(Some(text));
        self.status = QuestionStatus::Answered;
        self.answered_at_utc = Some(now);
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("(untitled)")
    }

    pub fn short_question(&self) -> String {
        preview(self.body.as_deref().unwrap_or_default())
    }

    pub fn short_answer(&self) -> String {
        preview(self.answer_text.as_deref().unwrap_or_default())
    }

    /// Case-insensitive match against title, body and answer.
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        [&self.title, &self.body, &self.answer_text]
            .into_iter()
            .flatten()
            .any(|s| s.to_lowercase().contains(&needle))
    }
}

/// First 90 characters, with an ellipsis when cut.
pub fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    out.push('…');
    out
}

impl Record for Question {
    const TABLE: &'static str = "questions";

    fn id(&self) -> Uuid {
        self.id
    }

    fn field(&self, name: &str) -> Value {
        match name {
            "id" => self.id.into(),
            "subject_id" => self.subject_id.into(),
            "caregiver_id" => self.caregiver_id.into(),
            "status" => self.status.key().into(),
            "created_at" => self.created_at_utc.into(),
            "answered_at" => self.answered_at_utc.into(),
            _ => Value::Null,
        }
    }
}

/// Which side of the conversation a listing is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participant {
    Subject(Uuid),
    Caregiver(Uuid),
}

/// Listing criteria: participant, inclusive local date range, optional status and search text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionFilter {
    pub participant: Participant,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub status: Option<QuestionStatus>,
    pub search: Option<String>,
}

impl QuestionFilter {
    pub fn new(participant: Participant, from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            participant,
            from,
            to,
            status: None,
            search: None,
        }
    }

    pub fn with_status(mut self, status: QuestionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Store-side part of the filter, newest first.
    pub fn query(&self, tz: Tz) -> Query {
        let from = local_to_utc(self.from, chrono::NaiveTime::MIN, tz);
        let to = self
            .to
            .succ_opt()
            .map(|next| local_to_utc(next, chrono::NaiveTime::MIN, tz));

        let mut query = match self.participant {
            Participant::Subject(id) => Query::new().eq("subject_id", id),
            Participant::Caregiver(id) => Query::new().eq("caregiver_id", id),
        }
        .gte("created_at", from);
        if let Some(to) = to {
            query = query.lt("created_at", to);
        }
        if let Some(status) = self.status {
            query = query.eq("status", status.key());
        }
        query.order_by(Order::desc("created_at"))
    }

    pub fn list<S: Store + ?Sized>(&self, store: &S, tz: Tz) -> Result<Vec<Question>, StoreError> {
        let rows: Vec<Question> = store.query(&self.query(tz))?;
        Ok(match self.search.as_deref() {
            Some(needle) => rows.into_iter().filter(|q| q.mentions(needle)).collect(),
            None => rows,
        })
    }
}

/// What a watcher is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchKind {
    /// Answers arriving for a subject.
    AnsweredFor(Uuid),
    /// New open questions addressed to a caregiver.
    NewFor(Uuid),
}

impl WatchKind {
    fn stamp(&self, q: &Question) -> Option<DateTime<Utc>> {
        match self {
            WatchKind::AnsweredFor(_) => q.answered_at_utc,
            WatchKind::NewFor(_) => Some(q.created_at_utc),
        }
    }

    pub fn query(&self, mark: DateTime<Utc>) -> Query {
        match self {
            WatchKind::AnsweredFor(subject) => Query::new()
                .eq("subject_id", *subject)
                .eq("status", QuestionStatus::Answered.key())
                .gte("answered_at", mark)
                .order_by(Order::asc("answered_at")),
            WatchKind::NewFor(caregiver) => Query::new()
                .eq("caregiver_id", *caregiver)
                .eq("status", QuestionStatus::Open.key())
                .gte("created_at", mark)
                .order_by(Order::asc("created_at")),
        }
    }
}

/// How far a watcher has read: the newest stamp delivered, plus the ids
/// already delivered at exactly that stamp.
///
/// Queries are inclusive of the mark, so a record written later with the same
/// stamp is still picked up, and `seen` keeps it from being delivered twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollCursor {
    mark: DateTime<Utc>,
    seen: BTreeSet<Uuid>,
}

impl PollCursor {
    pub fn new(mark: DateTime<Utc>) -> Self {
        Self {
            mark,
            seen: BTreeSet::new(),
        }
    }

    pub fn mark(&self) -> DateTime<Utc> {
        self.mark
    }

    /// Undelivered records at or after the mark, oldest first.
    ///
    /// The cursor only moves when the query succeeds and something new came back.
    pub fn poll<S: Store + ?Sized>(&mut self, store: &S, kind: WatchKind) -> Result<Vec<Question>, StoreError> {
        let found: Vec<Question> = store.query(&kind.query(self.mark))?;
        let fresh: Vec<Question> = found.into_iter().filter(|q| !self.seen.contains(&q.id)).collect();

        if let Some(newest) = fresh.iter().filter_map(|q| kind.stamp(q)).max() {
            if newest > self.mark {
                self.mark = newest;
                self.seen.clear();
            }
            let mark = self.mark;
            self.seen
                .extend(fresh.iter().filter(|q| kind.stamp(q) == Some(mark)).map(|q| q.id));
        }
        Ok(fresh)
    }
}
