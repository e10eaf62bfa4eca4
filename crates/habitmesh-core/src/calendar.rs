use std::sync::Mutex;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Timelike, Utc,
};
use serde::{Deserialize, Serialize};

/// Half-open interval `[start, end)` covering one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// Maps instants onto calendar days in one fixed time reference.
///
/// Every operation that reasons about "today" computes its window once through
/// a `Calendar` and passes it down, so a request that straddles midnight still
/// sees a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    offset: FixedOffset,
}

impl Default for Calendar {
    fn default() -> Self {
        Self::utc()
    }
}

impl Calendar {
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    pub fn with_offset(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Returns `None` when the offset is outside +/- 24h.
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        let seconds = minutes.checked_mul(60)?;
        FixedOffset::east_opt(seconds).map(Self::with_offset)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn local(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.offset)
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.local(instant).date_naive()
    }

    pub fn day_window(&self, instant: DateTime<Utc>) -> DayWindow {
        let midnight = self.local_date(instant).and_time(NaiveTime::MIN);
        let start =
            midnight.and_utc() - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        DayWindow {
            start,
            end: start + Duration::days(1),
        }
    }

    /// 0 = Sunday ... 6 = Saturday.
    pub fn weekday_index(&self, instant: DateTime<Utc>) -> usize {
        self.local(instant).weekday().num_days_from_sunday() as usize
    }

    /// Local wall-clock time formatted as `HH:MM`.
    pub fn local_hhmm(&self, instant: DateTime<Utc>) -> String {
        let local = self.local(instant);
        format!("{:02}:{:02}", local.hour(), local.minute())
    }
}

/// Source of "now". Operations take the instant as an argument; callers get it
/// from a `Clock` so tests can pin or move time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(at),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        match self.now.lock() {
            Ok(mut guard) => *guard = at,
            Err(poisoned) => *poisoned.into_inner() = at,
        }
    }

    pub fn advance(&self, by: Duration) {
        let next = self.now() + by;
        self.set(next);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
