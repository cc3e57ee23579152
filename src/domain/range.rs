// Date window and page cursor. Every state change hands back a fetch
// descriptor instead of performing I/O.
use super::calendar::{Clock, ReportingCalendar, SECONDS_PER_DAY};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const DEFAULT_RANGE_DAYS: u32 = 7;

/// Inclusive window of reporting days. Both ends are start-of-day anchors;
/// the `to` day is covered in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: i64,
    pub to: i64,
}

impl DateRange {
    pub fn new(from: i64, to: i64) -> Self {
        Self { from, to }
    }

    pub fn total_days(&self) -> u32 {
        let span = self.to.saturating_sub(self.from).max(0);
        let days = span / SECONDS_PER_DAY + i64::from(span % SECONDS_PER_DAY != 0) + 1;
        u32::try_from(days).unwrap_or(u32::MAX)
    }

    /// Move both ends by a fixed 86400-second stride per day. `None` when
    /// either end would overflow.
    pub fn shifted(&self, days: i64) -> Option<Self> {
        let delta = days.checked_mul(SECONDS_PER_DAY)?;
        Some(Self {
            from: self.from.checked_add(delta)?,
            to: self.to.checked_add(delta)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchRequest {
    /// `page` is 1-indexed, as the transport expects.
    SiteDgr {
        site_id: String,
        from: i64,
        to: i64,
        page: usize,
        per: usize,
    },
    FleetOverview { from: i64, to: i64 },
}

/// A fetch the caller must perform. Its response may only be applied while
/// `RangeController::is_current` still holds for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchTicket {
    pub generation: u64,
    pub request: FetchRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "site_id", rename_all = "snake_case")]
pub enum Scope {
    Site(String),
    Fleet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cursor {
    pub scope: Option<Scope>,
    pub range: Option<DateRange>,
    pub page_index: usize,
    pub page_size: usize,
    /// Sizes a pagination control may offer. Empty means any size.
    pub page_size_options: Vec<usize>,
    pub total_days: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("range start {from} is after range end {to}")]
    Inverted { from: i64, to: i64 },
    #[error("range end {to} is after the last complete day {yesterday}")]
    BeyondYesterday { to: i64, yesterday: i64 },
    #[error("page size must be at least 1")]
    EmptyPage,
    #[error("no site or fleet view has been opened")]
    Uninitialized,
    #[error("timestamp {value} is outside the supported calendar")]
    OutOfBounds { value: i64 },
    #[error("page index {page_index} is too large")]
    PageOutOfRange { page_index: usize },
    #[error("page size {size} is not one of {options:?}")]
    UnsupportedPageSize { size: usize, options: Vec<usize> },
}

pub struct RangeController {
    calendar: ReportingCalendar,
    clock: Arc<dyn Clock>,
    default_range_days: u32,
    scope: Option<Scope>,
    range: Option<DateRange>,
    page_index: usize,
    page_size: usize,
    page_size_options: Vec<usize>,
    generation: u64,
}

impl RangeController {
    pub fn new(calendar: ReportingCalendar, clock: Arc<dyn Clock>) -> Self {
        Self {
            calendar,
            clock,
            default_range_days: DEFAULT_RANGE_DAYS,
            scope: None,
            range: None,
            page_index: 0,
            page_size: DEFAULT_PAGE_SIZE,
            page_size_options: Vec::new(),
            generation: 0,
        }
    }

    /// Restrict page sizes to `options`. The default page size stays allowed.
    pub fn with_page_size_options(mut self, mut options: Vec<usize>) -> Self {
        options.retain(|n| *n > 0);
        if !options.is_empty() && !options.contains(&self.page_size) {
            options.push(self.page_size);
        }
        options.sort_unstable();
        options.dedup();
        self.page_size_options = options;
        self
    }

    pub fn with_defaults(mut self, page_size: usize, range_days: u32) -> Self {
        self.page_size = page_size.max(1);
        self.default_range_days = range_days.max(1);
        self
    }

    pub fn calendar(&self) -> &ReportingCalendar {
        &self.calendar
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    pub fn range(&self) -> Option<DateRange> {
        self.range
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total_days(&self) -> u32 {
        self.range.map(|r| r.total_days()).unwrap_or(0)
    }

    pub fn yesterday(&self) -> i64 {
        self.calendar.yesterday(self.clock.as_ref())
    }

    pub fn cursor(&self) -> Cursor {
        Cursor {
            scope: self.scope.clone(),
            range: self.range,
            page_index: self.page_index,
            page_size: self.page_size,
            page_size_options: self.page_size_options.clone(),
            total_days: self.total_days(),
        }
    }

    /// True while no later state change has superseded `ticket`.
    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        ticket.generation == self.generation
    }

    /// Open a site on the most recent complete window ending yesterday.
    /// Supersedes any in-flight fetch, including ones for another site.
    pub fn initialize_default_range(&mut self, site_id: &str) -> FetchTicket {
        let to = self.yesterday();
        let from = to - i64::from(self.default_range_days - 1) * SECONDS_PER_DAY;
        self.scope = Some(Scope::Site(site_id.to_string()));
        self.range = Some(DateRange::new(from, to));
        self.page_index = 0;
        self.issue()
    }

    /// Open the fleet overview on yesterday alone.
    pub fn initialize_fleet_range(&mut self) -> FetchTicket {
        let yesterday = self.yesterday();
        self.scope = Some(Scope::Fleet);
        self.range = Some(DateRange::new(yesterday, yesterday));
        self.page_index = 0;
        self.issue()
    }

    /// Restore a previously rendered cursor without fetching. The range is
    /// normalized and validated like a user pick.
    pub fn resume(
        &mut self,
        scope: Scope,
        range: Option<DateRange>,
        page_index: usize,
        page_size: usize,
    ) -> Result<(), RangeError> {
        if page_size == 0 {
            return Err(RangeError::EmptyPage);
        }
        if !self.allows_page_size(page_size) {
            return Err(RangeError::UnsupportedPageSize {
                size: page_size,
                options: self.page_size_options.clone(),
            });
        }
        if page_index.checked_add(1).is_none() {
            return Err(RangeError::PageOutOfRange { page_index });
        }
        let range = match range {
            Some(r) => Some(self.validate(r.from, r.to)?),
            None => None,
        };
        let is_fleet = scope == Scope::Fleet;
        let range = range.unwrap_or_else(|| {
            let to = self.yesterday();
            let days = if is_fleet { 1 } else { self.default_range_days };
            DateRange::new(to - i64::from(days.saturating_sub(1)) * SECONDS_PER_DAY, to)
        });
        self.scope = Some(scope);
        self.range = Some(range);
        self.page_size = page_size;
        self.page_index = if is_fleet { 0 } else { page_index };
        self.generation += 1;
        Ok(())
    }

    /// Re-issue the fetch for the current cursor.
    pub fn refresh(&mut self) -> Option<FetchTicket> {
        if self.scope.is_none() || self.range.is_none() {
            return None;
        }
        Some(self.issue())
    }

    pub fn next_page(&mut self) -> Option<FetchTicket> {
        if !self.is_paginated() {
            return None;
        }
        // the next page must still have a 1-indexed number
        let next = self.page_index.checked_add(1).filter(|n| n.checked_add(1).is_some())?;
        self.page_index = next;
        Some(self.issue())
    }

    /// No-op on the first page.
    pub fn prev_page(&mut self) -> Option<FetchTicket> {
        if !self.is_paginated() || self.page_index == 0 {
            return None;
        }
        self.page_index -= 1;
        Some(self.issue())
    }

    pub fn set_page_size(&mut self, page_size: usize) -> Option<FetchTicket> {
        if !self.is_paginated() || page_size == 0 || !self.allows_page_size(page_size) {
            return None;
        }
        self.page_size = page_size;
        self.page_index = 0;
        Some(self.issue())
    }

    /// Slide the window by `days`. Rejected, with no state change, when the
    /// new end would pass yesterday or leave the calendar.
    pub fn shift_range(&mut self, days: i64) -> Option<FetchTicket> {
        self.scope.as_ref()?;
        let shifted = match self.range?.shifted(days).map(|r| self.validate(r.from, r.to)) {
            Some(Ok(range)) => range,
            Some(Err(e)) => {
                tracing::debug!("Ignoring range shift of {} days: {}", days, e);
                return None;
            }
            None => {
                tracing::debug!("Ignoring range shift of {} days: overflow", days);
                return None;
            }
        };
        self.range = Some(shifted);
        self.page_index = 0;
        Some(self.issue())
    }

    /// Apply a user-picked window; both ends snap to start-of-day.
    pub fn set_range(&mut self, from: i64, to: i64) -> Result<FetchTicket, RangeError> {
        if self.scope.is_none() {
            return Err(RangeError::Uninitialized);
        }
        let range = self.validate(from, to)?;
        self.range = Some(range);
        self.page_index = 0;
        Ok(self.issue())
    }

    fn validate(&self, from: i64, to: i64) -> Result<DateRange, RangeError> {
        let from = self
            .calendar
            .start_of_day(from)
            .ok_or(RangeError::OutOfBounds { value: from })?;
        let to = self
            .calendar
            .start_of_day(to)
            .ok_or(RangeError::OutOfBounds { value: to })?;
        if to < from {
            return Err(RangeError::Inverted { from, to });
        }
        let yesterday = self.yesterday();
        if to > yesterday {
            return Err(RangeError::BeyondYesterday { to, yesterday });
        }
        Ok(DateRange::new(from, to))
    }

    fn allows_page_size(&self, page_size: usize) -> bool {
        self.page_size_options.is_empty() || self.page_size_options.contains(&page_size)
    }

    fn is_paginated(&self) -> bool {
        matches!(self.scope, Some(Scope::Site(_))) && self.range.is_some()
    }

    fn issue(&mut self) -> FetchTicket {
        self.generation += 1;
        let range = self.range.unwrap_or(DateRange::new(0, 0));
        let request = match &self.scope {
            Some(Scope::Site(site_id)) => FetchRequest::SiteDgr {
                site_id: site_id.clone(),
                from: range.from,
                to: range.to,
                page: self.page_index.saturating_add(1),
                per: self.page_size,
            },
            _ => FetchRequest::FleetOverview {
                from: range.from,
                to: range.to,
            },
        };
        tracing::debug!(generation = self.generation, ?request, "Issuing fetch");
        FetchTicket {
            generation: self.generation,
            request,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calendar::FixedClock;
    use proptest::prelude::*;

    // 2025-11-04 00:00 at UTC+5:30
    const IST_MIDNIGHT: i64 = 1_762_194_600;
    const TODAY: i64 = IST_MIDNIGHT + 10 * SECONDS_PER_DAY;
    const YESTERDAY: i64 = TODAY - SECONDS_PER_DAY;

    fn controller() -> RangeController {
        RangeController::new(
            ReportingCalendar::default(),
            Arc::new(FixedClock::at(TODAY + 9 * 3600)),
        )
    }

    fn site_request(ticket: &FetchTicket) -> (i64, i64, usize, usize) {
        match &ticket.request {
            FetchRequest::SiteDgr { from, to, page, per, .. } => (*from, *to, *page, *per),
            other => panic!("expected a site request, got {:?}", other),
        }
    }

    #[test]
    fn test_default_range_is_last_seven_days() {
        let mut c = controller();
        let ticket = c.initialize_default_range("site-1");
        let (from, to, page, per) = site_request(&ticket);
        assert_eq!(to, YESTERDAY);
        assert_eq!(from, YESTERDAY - 6 * SECONDS_PER_DAY);
        assert_eq!((page, per), (1, 10));
        assert_eq!(c.total_days(), 7);
        assert_eq!(c.page_index(), 0);
    }

    #[test]
    fn test_next_page_requests_second_page() {
        let mut c = controller();
        c.initialize_default_range("site-1");
        let ticket = c.next_page().expect("next page");
        let (_, _, page, per) = site_request(&ticket);
        assert_eq!((page, per), (2, 10));
        assert_eq!(c.page_index(), 1);
    }

    #[test]
    fn test_prev_page_is_noop_on_first_page() {
        let mut c = controller();
        c.initialize_default_range("site-1");
        let before = c.cursor();
        assert!(c.prev_page().is_none());
        assert_eq!(c.cursor(), before);

        c.next_page();
        let ticket = c.prev_page().expect("prev page");
        assert_eq!(site_request(&ticket).2, 1);
    }

    #[test]
    fn test_set_page_size_resets_page() {
        let mut c = controller();
        c.initialize_default_range("site-1");
        c.next_page();
        c.next_page();
        let ticket = c.set_page_size(50).expect("page size");
        let (_, _, page, per) = site_request(&ticket);
        assert_eq!((page, per), (1, 50));
        assert_eq!(c.page_index(), 0);
        assert!(c.set_page_size(0).is_none());
    }

    #[test]
    fn test_page_size_options_restrict_sizes() {
        let mut c = controller().with_page_size_options(vec![50, 20]);
        assert_eq!(c.cursor().page_size_options, vec![10, 20, 50]);

        c.initialize_default_range("site-1");
        assert!(c.set_page_size(15).is_none());
        assert_eq!(c.page_size(), 10);
        assert!(c.set_page_size(20).is_some());
        assert_eq!(
            c.resume(Scope::Site("site-1".into()), None, 0, 7),
            Err(RangeError::UnsupportedPageSize {
                size: 7,
                options: vec![10, 20, 50]
            })
        );
        assert!(c.resume(Scope::Site("site-1".into()), None, 0, 50).is_ok());
    }

    #[test]
    fn test_shift_past_yesterday_is_noop() {
        let mut c = controller();
        c.initialize_default_range("site-1");
        let before = c.cursor();
        assert!(c.shift_range(1).is_none());
        assert_eq!(c.cursor(), before);
    }

    #[test]
    fn test_shift_keeps_window_length() {
        let mut c = controller();
        c.initialize_default_range("site-1");
        c.next_page();
        let ticket = c.shift_range(-3).expect("shift back");
        let (from, to, page, _) = site_request(&ticket);
        assert_eq!(to, YESTERDAY - 3 * SECONDS_PER_DAY);
        assert_eq!(to - from, 6 * SECONDS_PER_DAY);
        assert_eq!(page, 1);
        assert_eq!(c.total_days(), 7);
    }

    #[test]
    fn test_set_range_normalizes_and_validates() {
        let mut c = controller();
        assert_eq!(c.set_range(IST_MIDNIGHT, IST_MIDNIGHT), Err(RangeError::Uninitialized));

        c.initialize_default_range("site-1");
        let ticket = c
            .set_range(IST_MIDNIGHT + 3600, IST_MIDNIGHT + 2 * SECONDS_PER_DAY + 7200)
            .expect("valid range");
        let (from, to, _, _) = site_request(&ticket);
        assert_eq!(from, IST_MIDNIGHT);
        assert_eq!(to, IST_MIDNIGHT + 2 * SECONDS_PER_DAY);
        assert_eq!(c.total_days(), 3);

        assert!(matches!(
            c.set_range(IST_MIDNIGHT + SECONDS_PER_DAY, IST_MIDNIGHT),
            Err(RangeError::Inverted { .. })
        ));
        assert!(matches!(
            c.set_range(IST_MIDNIGHT, TODAY),
            Err(RangeError::BeyondYesterday { .. })
        ));
        assert_eq!(c.range(), Some(DateRange::new(IST_MIDNIGHT, IST_MIDNIGHT + 2 * SECONDS_PER_DAY)));
    }

    #[test]
    fn test_only_latest_ticket_is_current() {
        let mut c = controller();
        let first = c.initialize_default_range("site-1");
        let second = c.set_page_size(20).expect("page size");
        assert!(!c.is_current(&first));
        assert!(c.is_current(&second));

        let other_site = c.initialize_default_range("site-2");
        assert!(!c.is_current(&second));
        assert!(c.is_current(&other_site));
    }

    #[test]
    fn test_noop_does_not_supersede() {
        let mut c = controller();
        let ticket = c.initialize_default_range("site-1");
        assert!(c.shift_range(2).is_none());
        assert!(c.prev_page().is_none());
        assert!(c.is_current(&ticket));
    }

    #[test]
    fn test_fleet_scope() {
        let mut c = controller();
        let ticket = c.initialize_fleet_range();
        assert_eq!(
            ticket.request,
            FetchRequest::FleetOverview {
                from: YESTERDAY,
                to: YESTERDAY
            }
        );
        assert!(c.next_page().is_none());
        let shifted = c.shift_range(-1).expect("shift back");
        assert_eq!(
            shifted.request,
            FetchRequest::FleetOverview {
                from: YESTERDAY - SECONDS_PER_DAY,
                to: YESTERDAY - SECONDS_PER_DAY
            }
        );
    }

    #[test]
    fn test_resume_then_refresh() {
        let mut c = controller();
        c.resume(
            Scope::Site("site-9".into()),
            Some(DateRange::new(IST_MIDNIGHT, IST_MIDNIGHT + SECONDS_PER_DAY)),
            3,
            20,
        )
        .expect("resume");
        let ticket = c.refresh().expect("refresh");
        assert_eq!(
            ticket.request,
            FetchRequest::SiteDgr {
                site_id: "site-9".into(),
                from: IST_MIDNIGHT,
                to: IST_MIDNIGHT + SECONDS_PER_DAY,
                page: 4,
                per: 20,
            }
        );
        assert_eq!(
            c.resume(Scope::Fleet, None, 0, 0),
            Err(RangeError::EmptyPage)
        );
    }

    #[test]
    fn test_extreme_shifts_are_rejected_without_change() {
        let mut c = controller();
        let ticket = c.initialize_default_range("site-1");
        let before = c.cursor();
        for days in [i64::MIN, i64::MIN / 2, -i64::MAX, i64::MAX, -200_000_000_000] {
            assert!(c.shift_range(days).is_none(), "shift by {}", days);
            assert_eq!(c.cursor(), before);
        }
        assert!(c.is_current(&ticket));
        assert_eq!(DateRange::new(0, 0).shifted(i64::MAX), None);
    }

    #[test]
    fn test_extreme_range_and_page_are_errors() {
        let mut c = controller();
        c.initialize_default_range("site-1");
        assert_eq!(
            c.set_range(i64::MIN, 0),
            Err(RangeError::OutOfBounds { value: i64::MIN })
        );
        assert_eq!(
            c.resume(Scope::Site("s".into()), None, usize::MAX, 10),
            Err(RangeError::PageOutOfRange { page_index: usize::MAX })
        );

        c.resume(Scope::Site("s".into()), None, usize::MAX - 1, 10)
            .expect("largest page");
        assert!(c.next_page().is_none());
        let ticket = c.refresh().expect("refresh");
        assert_eq!(site_request(&ticket).2, usize::MAX);
        assert_eq!(DateRange::new(i64::MIN, i64::MAX).total_days(), u32::MAX);
    }

    #[test]
    fn test_refresh_without_scope() {
        assert!(controller().refresh().is_none());
    }

    proptest! {
        #[test]
        fn prop_shift_and_unshift_restores_range(
            start_offset in 0i64..3000,
            length in 0i64..60,
            days in prop_oneof![-400i64..400, any::<i64>()],
        ) {
            let mut c = controller();
            c.initialize_default_range("site-1");
            let to = YESTERDAY - start_offset * SECONDS_PER_DAY;
            c.set_range(to - length * SECONDS_PER_DAY, to).expect("valid start");
            let before = c.range();

            if c.shift_range(days).is_some() {
                prop_assert!(c.shift_range(-days).is_some());
                prop_assert_eq!(c.range(), before);
            } else {
                prop_assert!(days > 0 || days < -90_000_000);
                prop_assert_eq!(c.range(), before);
            }
        }
    }
}
