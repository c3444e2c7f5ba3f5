//! Time utilities: timezone-aware "now" / "today" and local wall-clock conversion.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::TrackerError;

/// Source of the current instant. The subject's timezone turns it into local time.
pub trait Clock {
    fn now_utc(&self) -> DateTime<Utc>;

    fn timezone(&self) -> Tz;

    fn now_local(&self) -> DateTime<Tz> {
        self.now_utc().with_timezone(&self.timezone())
    }

    fn today(&self) -> NaiveDate {
        self.now_local().date_naive()
    }
}

/// Wall clock in a fixed IANA zone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn timezone(&self) -> Tz {
        self.tz
    }
}

/// Frozen clock for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Utc>,
    tz: Tz,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>, tz: Tz) -> Self {
        Self { now, tz }
    }

    /// Build from a local wall-clock time in `tz`.
    pub fn at_local(date: NaiveDate, time: NaiveTime, tz: Tz) -> Self {
        Self::new(local_to_utc(date, time, tz), tz)
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.now
    }

    fn timezone(&self) -> Tz {
        self.tz
    }
}

pub fn parse_timezone(tz: &str) -> Result<Tz, TrackerError> {
    tz.parse::<Tz>()
        .map_err(|_| TrackerError::InvalidTimezone(tz.to_string()))
}

/// Resolve a local wall-clock time on `date` to UTC.
///
/// Ambiguous times (DST fall-back) take the earlier instant; times inside a
/// spring-forward gap are pushed past the gap.
pub fn local_to_utc(date: NaiveDate, time: NaiveTime, tz: Tz) -> DateTime<Utc> {
    resolve_local(date.and_time(time), tz).with_timezone(&Utc)
}

fn resolve_local(ndt: NaiveDateTime, tz: Tz) -> DateTime<Tz> {
    match tz.from_local_datetime(&ndt) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => match tz.from_local_datetime(&(ndt + Duration::hours(1))) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt,
            LocalResult::None => tz.from_utc_datetime(&ndt),
        },
    }
}

/// Parse "HH:MM".
pub fn parse_hhmm(s: &str) -> Result<NaiveTime, TrackerError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|e| TrackerError::InvalidInput(format!("invalid time '{s}': {e}")))
}

/// Parse "YYYY-MM-DD".
pub fn parse_date(s: &str) -> Result<NaiveDate, TrackerError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| TrackerError::InvalidInput(format!("invalid date '{s}': {e}")))
}
