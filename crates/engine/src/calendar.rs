//! Business calendar: working-day arithmetic pinned to one civil timezone.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Offset, Utc, Weekday};

/// Working-day calendar with a fixed reference offset.
///
/// Every date handled by the engine is a civil date in this offset, and a
/// day's authoritative state is its last instant ([`BusinessCalendar::end_of_day`]).
/// There are no error conditions; supplying holiday data for the years in
/// play is the caller's responsibility.
#[derive(Debug, Clone)]
pub struct BusinessCalendar {
    weekend: HashSet<Weekday>,
    holidays: HashSet<NaiveDate>,
    offset: FixedOffset,
}

impl BusinessCalendar {
    /// Build a calendar from non-working weekdays, a holiday set, and the
    /// reference UTC offset.
    pub fn new(
        weekend: impl IntoIterator<Item = Weekday>,
        holidays: impl IntoIterator<Item = NaiveDate>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            weekend: weekend.into_iter().collect(),
            holidays: holidays.into_iter().collect(),
            offset,
        }
    }

    /// Whether `date` is a working day.
    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        !self.weekend.contains(&date.weekday()) && !self.holidays.contains(&date)
    }

    /// Working days in `[start, end)`; 0 when `end <= start`.
    pub fn count_working_days(&self, start: NaiveDate, end: NaiveDate) -> u32 {
        let mut count = 0;
        let mut date = start;
        while date < end {
            if self.is_working_day(date) {
                count += 1;
            }
            date += Duration::days(1);
        }
        count
    }

    /// Ordinal business-day index of `date` relative to `start`; the start
    /// date itself is index 0.
    pub fn business_day_index(&self, start: NaiveDate, date: NaiveDate) -> u32 {
        self.count_working_days(start, date)
    }

    /// Working days in `[start, end]`, in order.
    pub fn working_days(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let mut days = Vec::new();
        let mut date = start;
        while date <= end {
            if self.is_working_day(date) {
                days.push(date);
            }
            date += Duration::days(1);
        }
        days
    }

    /// Last instant of the civil date, as a UTC timestamp.
    pub fn end_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let local = date.and_hms_opt(23, 59, 59).expect("valid wall-clock time");
        (local - Duration::seconds(i64::from(self.offset.local_minus_utc()))).and_utc()
    }

    /// The civil date an instant falls on in the reference offset.
    pub fn civil_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }
}

impl Default for BusinessCalendar {
    /// Saturday/Sunday weekend, no holidays, UTC.
    fn default() -> Self {
        Self::new([Weekday::Sat, Weekday::Sun], [], Utc.fix())
    }
}
