// Reporting calendar: fixed-offset day boundaries and date labels
use chrono::{DateTime, FixedOffset, Offset, Utc};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// UTC+5:30, the offset the DGR backend reports days in.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 330;

/// Source of "now". Injected so "yesterday" is testable.
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

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn at(unix_seconds: i64) -> Self {
        Self(DateTime::from_timestamp(unix_seconds, 0).unwrap_or_default())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Calendar of the site's reporting timezone. Independent of the viewer's
/// locale: every day boundary and label is computed in this fixed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportingCalendar {
    offset: FixedOffset,
}

impl Default for ReportingCalendar {
    fn default() -> Self {
        Self::from_offset_minutes(DEFAULT_UTC_OFFSET_MINUTES)
            .unwrap_or_else(Self::utc)
    }
}

impl ReportingCalendar {
    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    /// `None` when the offset is not strictly inside ±24h.
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        let seconds = minutes.checked_mul(60)?;
        FixedOffset::east_opt(seconds).map(|offset| Self { offset })
    }

    pub fn offset_seconds(&self) -> i64 {
        i64::from(self.offset.local_minus_utc())
    }

    /// Start of the reporting day containing `unix_seconds`, or `None`
    /// when that instant has no calendar date.
    pub fn start_of_day(&self, unix_seconds: i64) -> Option<i64> {
        DateTime::from_timestamp(unix_seconds, 0)?;
        let offset = self.offset_seconds();
        unix_seconds
            .checked_add(offset)?
            .div_euclid(SECONDS_PER_DAY)
            .checked_mul(SECONDS_PER_DAY)?
            .checked_sub(offset)
    }

    pub fn today(&self, clock: &dyn Clock) -> i64 {
        let now = clock.now().timestamp();
        // chrono instants always have a date
        self.start_of_day(now).unwrap_or(now)
    }

    /// Start of the most recent day guaranteed to have complete data.
    pub fn yesterday(&self, clock: &dyn Clock) -> i64 {
        self.today(clock).saturating_sub(SECONDS_PER_DAY)
    }

    /// `YYYY-MM-DD` of the reporting day containing `unix_seconds`.
    pub fn format_date(&self, unix_seconds: i64) -> String {
        match DateTime::from_timestamp(unix_seconds, 0) {
            Some(dt) => dt.with_timezone(&self.offset).format("%Y-%m-%d").to_string(),
            None => "-".to_string(),
        }
    }
}
