//! Local calendar-day handling for notes.
//!
//! Notes arrive carrying dates in several shapes: plain `YYYY-MM-DD` keys,
//! full ISO-8601 timestamps from the server, or native date-time values.
//! Everything here reduces those to a [`CalendarDay`] read in the observer's
//! local zone, and renders it as a [`NoteDateKey`] used to group notes by day.
//!
//! Plain day strings are anchored at 12:00 local time. Noon sits twelve hours
//! away from either midnight, so a later zone conversion or DST transition
//! cannot push the value into a neighbouring day.
//!
//! None of these operations fail. Absent or unparseable input resolves to
//! today's date in the local zone.

use std::fmt;

use anyhow::Result;
use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use serde::Serialize;
use tracing::debug;

use crate::clock::{Clock, LocalZone, SystemClock};

/// Offset-less date-times. These are wall-clock readings in the local zone.
const WALL_CLOCK_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Date-times carrying an explicit numeric offset.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

/// Loose date-only forms. `%B` also accepts abbreviated month names.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
];

/// A year/month/day triple with no time of day and no zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarDay(NaiveDate);

impl CalendarDay {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    /// 12:00 wall-clock time on this day.
    pub fn noon(&self) -> NaiveDateTime {
        self.0.and_time(NaiveTime::MIN) + Duration::hours(12)
    }

    pub fn add_days(&self, days: i64) -> Option<Self> {
        self.0.checked_add_signed(Duration::days(days)).map(Self)
    }

    /// `YYYY-MM-DD`. Years past 9999 take more digits and years before 1
    /// carry a leading `-`.
    pub fn key(&self) -> NoteDateKey {
        let sign = if self.year() < 0 { "-" } else { "" };
        NoteDateKey(format!(
            "{sign}{:04}-{:02}-{:02}",
            self.year().unsigned_abs(),
            self.month(),
            self.day()
        ))
    }
}

impl From<NaiveDate> for CalendarDay {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl fmt::Display for CalendarDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key().as_str())
    }
}

/// Canonical `YYYY-MM-DD` form of a [`CalendarDay`]. Ordering is
/// chronological for four-digit years.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NoteDateKey(String);

impl NoteDateKey {
    /// Matches exactly `^\d{4}-\d{2}-\d{2}$` with ASCII digits. Says nothing
    /// about whether the day exists.
    pub fn is_canonical(s: &str) -> bool {
        let b = s.as_bytes();
        b.len() == 10
            && b[4] == b'-'
            && b[7] == b'-'
            && b.iter()
                .enumerate()
                .all(|(i, c)| i == 4 || i == 7 || c.is_ascii_digit())
    }

    /// Wraps an already canonical string without reformatting it.
    pub fn from_canonical(s: &str) -> Option<Self> {
        Self::is_canonical(s).then(|| Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NoteDateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NoteDateKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for NoteDateKey {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for NoteDateKey {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Anything a note's date might be.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DateInput<'a> {
    Absent,
    Text(&'a str),
    /// A point in time; its calendar fields are read in the local zone.
    Instant(DateTime<Utc>),
    /// A wall-clock reading already expressed in the local zone.
    WallClock(NaiveDateTime),
    Day(NaiveDate),
    EpochMillis(i64),
}

impl<'a> From<&'a str> for DateInput<'a> {
    fn from(s: &'a str) -> Self {
        DateInput::Text(s)
    }
}

impl<'a> From<&'a String> for DateInput<'a> {
    fn from(s: &'a String) -> Self {
        DateInput::Text(s.as_str())
    }
}

impl<'a> From<Option<&'a str>> for DateInput<'a> {
    fn from(s: Option<&'a str>) -> Self {
        s.map_or(DateInput::Absent, DateInput::Text)
    }
}

impl<'a> From<&'a NoteDateKey> for DateInput<'a> {
    fn from(key: &'a NoteDateKey) -> Self {
        DateInput::Text(key.as_str())
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for DateInput<'_> {
    fn from(dt: DateTime<Tz>) -> Self {
        DateInput::Instant(dt.with_timezone(&Utc))
    }
}

impl From<NaiveDateTime> for DateInput<'_> {
    fn from(dt: NaiveDateTime) -> Self {
        DateInput::WallClock(dt)
    }
}

impl From<NaiveDate> for DateInput<'_> {
    fn from(d: NaiveDate) -> Self {
        DateInput::Day(d)
    }
}

impl From<CalendarDay> for DateInput<'_> {
    fn from(d: CalendarDay) -> Self {
        DateInput::Day(d.date())
    }
}

/// Reads calendar days against an injected clock and local zone.
#[derive(Debug, Clone)]
pub struct DateNormalizer<C = SystemClock> {
    clock: C,
    zone: LocalZone,
}

impl DateNormalizer<SystemClock> {
    /// Real clock, host timezone.
    pub fn system() -> Self {
        Self::new(SystemClock, LocalZone::System)
    }

    pub fn with_zone(zone: LocalZone) -> Self {
        Self::new(SystemClock, zone)
    }
}

impl Default for DateNormalizer<SystemClock> {
    fn default() -> Self {
        Self::system()
    }
}

impl<C: Clock> DateNormalizer<C> {
    pub fn new(clock: C, zone: LocalZone) -> Self {
        Self { clock, zone }
    }

    pub fn zone(&self) -> LocalZone {
        self.zone
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn today(&self) -> CalendarDay {
        let now = self.clock.now();
        match self.zone.to_local(now) {
            Some(local) => CalendarDay(local.date()),
            None => CalendarDay(now.date_naive()),
        }
    }

    /// Resolves `input` to a local calendar day. Never fails; anything
    /// absent or unparseable is today.
    pub fn parse_local_date<'a>(&self, input: impl Into<DateInput<'a>>) -> CalendarDay {
        match input.into() {
            DateInput::Absent => self.today(),
            DateInput::Instant(dt) => self.day_of_instant(dt),
            DateInput::WallClock(dt) => CalendarDay(dt.date()),
            DateInput::Day(d) => CalendarDay(d),
            DateInput::EpochMillis(ms) => match DateTime::from_timestamp_millis(ms) {
                Some(dt) => self.day_of_instant(dt),
                None => self.today(),
            },
            DateInput::Text(s) => self.parse_text(s),
        }
    }

    /// `YYYY-MM-DD` key of the local calendar day `input` resolves to.
    pub fn to_local_date_key<'a>(&self, input: impl Into<DateInput<'a>>) -> NoteDateKey {
        self.parse_local_date(input).key()
    }

    /// Like [`to_local_date_key`](Self::to_local_date_key), except canonical
    /// strings are passed through byte for byte.
    pub fn normalize_date_key<'a>(&self, input: impl Into<DateInput<'a>>) -> NoteDateKey {
        let input = input.into();
        if let DateInput::Text(s) = input {
            if let Some(key) = NoteDateKey::from_canonical(s) {
                return key;
            }
        }
        self.to_local_date_key(input)
    }

    /// The instant of local noon on `day`.
    pub fn noon_anchor(&self, day: CalendarDay) -> DateTime<Utc> {
        self.zone.from_local(day.noon())
    }

    fn day_of_instant(&self, dt: DateTime<Utc>) -> CalendarDay {
        match self.zone.to_local(dt) {
            Some(local) => CalendarDay(local.date()),
            None => {
                debug!(instant = %dt, zone = %self.zone, "date.out_of_range");
                self.today()
            }
        }
    }

    fn parse_text(&self, raw: &str) -> CalendarDay {
        if raw.is_empty() {
            return self.today();
        }

        if let Some((y, m, d)) = strict_fields(raw) {
            return match rolled_date(y, m, d) {
                Some(date) => self.anchored_day(date),
                None => self.today(),
            };
        }

        match self.parse_general(raw.trim()) {
            Some(day) => day,
            None => {
                debug!(input = raw, "date.unparseable");
                self.today()
            }
        }
    }

    /// Day holding local noon of `date`. Only differs from `date` when the
    /// zone skipped that whole day.
    fn anchored_day(&self, date: NaiveDate) -> CalendarDay {
        match self.zone.try_from_local(CalendarDay(date).noon()) {
            Some(anchor) => self.day_of_instant(anchor),
            None => CalendarDay(date),
        }
    }

    fn parse_general(&self, s: &str) -> Option<CalendarDay> {
        if s.is_empty() {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(self.day_of_instant(dt.with_timezone(&Utc)));
        }
        for fmt in OFFSET_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
                return Some(self.day_of_instant(dt.with_timezone(&Utc)));
            }
        }
        if let Some(stripped) = s.strip_suffix(['Z', 'z']) {
            if let Some(naive) = parse_wall_clock(stripped) {
                return Some(self.day_of_instant(naive.and_utc()));
            }
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
            return Some(self.day_of_instant(dt.with_timezone(&Utc)));
        }
        if let Some(naive) = parse_wall_clock(s) {
            return Some(CalendarDay(naive.date()));
        }
        DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
            .map(CalendarDay)
    }
}

fn parse_wall_clock(s: &str) -> Option<NaiveDateTime> {
    WALL_CLOCK_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Fields of a key-shaped string, `^-?\d{4,}-\d{2}-\d{2}$`. This is the
/// canonical form plus the wider years [`CalendarDay::key`] can emit.
fn strict_fields(s: &str) -> Option<(i32, u32, u32)> {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let mut parts = digits.rsplitn(3, '-');
    let (day, month, year) = (parts.next()?, parts.next()?, parts.next()?);
    let all_digits = |p: &str| p.bytes().all(|c| c.is_ascii_digit());
    if day.len() != 2 || month.len() != 2 || year.len() < 4 {
        return None;
    }
    if !(all_digits(day) && all_digits(month) && all_digits(year)) {
        return None;
    }
    let year: i32 = year.parse().ok()?;
    Some((
        if negative { -year } else { year },
        month.parse().ok()?,
        day.parse().ok()?,
    ))
}

/// Builds a date the way a lenient calendar constructor does: months past 12
/// or days past the month's end carry into the following month, and zero
/// steps back into the previous one (`2025-02-30` is March 2nd).
fn rolled_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let months = i64::from(year) * 12 + i64::from(month) - 1;
    let y = i32::try_from(months.div_euclid(12)).ok()?;
    let m = u32::try_from(months.rem_euclid(12)).ok()? + 1;
    NaiveDate::from_ymd_opt(y, m, 1)?.checked_add_signed(Duration::days(i64::from(day) - 1))
}

/// [`DateNormalizer::parse_local_date`] against the system clock and zone.
pub fn parse_local_date<'a>(input: impl Into<DateInput<'a>>) -> CalendarDay {
    DateNormalizer::system().parse_local_date(input)
}

/// [`DateNormalizer::to_local_date_key`] against the system clock and zone.
pub fn to_local_date_key<'a>(input: impl Into<DateInput<'a>>) -> NoteDateKey {
    DateNormalizer::system().to_local_date_key(input)
}

/// [`DateNormalizer::normalize_date_key`] against the system clock and zone.
pub fn normalize_date_key<'a>(input: impl Into<DateInput<'a>>) -> NoteDateKey {
    DateNormalizer::system().normalize_date_key(input)
}

/// Returns YYYY-MM-DD for today in the given timezone.
pub fn day_key(tz: &str) -> Result<String> {
    let zone = LocalZone::parse(tz)?;
    Ok(DateNormalizer::with_zone(zone).today().key().into_string())
}
