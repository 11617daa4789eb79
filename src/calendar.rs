use std::{collections::BTreeMap, fmt, str::FromStr};

use anyhow::{anyhow, Result};
use chrono::{Datelike, Months, NaiveDate};

use crate::clock::Clock;
use crate::date::{CalendarDay, DateNormalizer, NoteDateKey};
use crate::domain::{Note, Priority};

/// Notes bucketed by local day, in chronological order.
pub fn group_by_day<'a, C: Clock>(
    notes: &'a [Note],
    normalizer: &DateNormalizer<C>,
) -> BTreeMap<NoteDateKey, Vec<&'a Note>> {
    let mut groups: BTreeMap<NoteDateKey, Vec<&'a Note>> = BTreeMap::new();
    for note in notes {
        groups.entry(note.day_key(normalizer)).or_default().push(note);
    }
    groups
}

pub fn notes_for_day<'a, C: Clock>(
    notes: &'a [Note],
    day: CalendarDay,
    normalizer: &DateNormalizer<C>,
) -> Vec<&'a Note> {
    let key = day.key();
    notes
        .iter()
        .filter(|n| n.day_key(normalizer) == key)
        .collect()
}

pub fn pinned_notes(notes: &[Note]) -> Vec<&Note> {
    notes.iter().filter(|n| n.pinned).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    /// Always the 1st.
    first: NaiveDate,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|first| Self { first })
            .ok_or_else(|| anyhow!("invalid month: {year}-{month}"))
    }

    pub fn of(day: CalendarDay) -> Self {
        let date = day.date();
        Self {
            first: date - chrono::Duration::days(i64::from(date.day0())),
        }
    }

    pub fn year(&self) -> i32 {
        self.first.year()
    }

    pub fn month(&self) -> u32 {
        self.first.month()
    }

    pub fn first_day(&self) -> CalendarDay {
        self.first.into()
    }

    pub fn last_day(&self) -> CalendarDay {
        self.first
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .map_or(self.first_day(), CalendarDay::from)
    }

    pub fn next(&self) -> Self {
        self.first
            .checked_add_months(Months::new(1))
            .map_or(*self, |first| Self { first })
    }

    pub fn prev(&self) -> Self {
        self.first
            .checked_sub_months(Months::new(1))
            .map_or(*self, |first| Self { first })
    }

    pub fn contains(&self, day: CalendarDay) -> bool {
        day.year() == self.year() && day.month() == self.month()
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl FromStr for Month {
    type Err = anyhow::Error;

    /// `YYYY-MM`
    fn from_str(s: &str) -> Result<Self> {
        let (y, m) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| anyhow!("invalid month: {s} (expected YYYY-MM)"))?;
        let year = y.parse().map_err(|_| anyhow!("invalid year: {y}"))?;
        let month = m.parse().map_err(|_| anyhow!("invalid month: {m}"))?;
        Self::new(year, month)
    }
}

/// Whole weeks (Sunday through Saturday) covering a month.
#[derive(Debug, Clone)]
pub struct MonthGrid {
    month: Month,
    days: Vec<CalendarDay>,
}

impl MonthGrid {
    pub fn new(month: Month) -> Self {
        let first = month.first_day();
        let last = month.last_day();
        let lead = i64::from(first.date().weekday().num_days_from_sunday());
        let trail = 6 - i64::from(last.date().weekday().num_days_from_sunday());

        let start = first.add_days(-lead).unwrap_or(first);
        let end = last.add_days(trail).unwrap_or(last);

        let days = start
            .date()
            .iter_days()
            .take_while(|d| *d <= end.date())
            .map(CalendarDay::from)
            .collect();
        Self { month, days }
    }

    pub fn month(&self) -> Month {
        self.month
    }

    pub fn days(&self) -> &[CalendarDay] {
        &self.days
    }

    pub fn weeks(&self) -> impl Iterator<Item = &[CalendarDay]> {
        self.days.chunks(7)
    }

    /// Only the days belonging to the month itself.
    pub fn visible_days(&self) -> impl Iterator<Item = CalendarDay> + '_ {
        self.days.iter().copied().filter(|d| self.month.contains(*d))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriorityCounts {
    pub normal: usize,
    pub important: usize,
    pub reminder: usize,
}

impl PriorityCounts {
    pub fn of<'a>(notes: impl IntoIterator<Item = &'a Note>) -> Self {
        notes.into_iter().fold(Self::default(), |mut acc, n| {
            match n.priority {
                Priority::Normal => acc.normal += 1,
                Priority::Important => acc.important += 1,
                Priority::Reminder => acc.reminder += 1,
            }
            acc
        })
    }

    pub fn total(&self) -> usize {
        self.normal + self.important + self.reminder
    }
}

pub const RECENT_LIMIT: usize = 3;

/// Sidebar figures for one month.
#[derive(Debug, Clone)]
pub struct MonthSummary<'a> {
    pub month: Month,
    pub notes: Vec<&'a Note>,
    pub counts: PriorityCounts,
    /// Latest days first.
    pub recent: Vec<&'a Note>,
    pub pinned: Vec<&'a Note>,
}

impl<'a> MonthSummary<'a> {
    pub fn build<C: Clock>(
        notes: &'a [Note],
        month: Month,
        normalizer: &DateNormalizer<C>,
    ) -> Self {
        let in_month: Vec<(CalendarDay, &'a Note)> = notes
            .iter()
            .map(|n| (n.day(normalizer), n))
            .filter(|(day, _)| month.contains(*day))
            .collect();

        let mut by_recency = in_month.clone();
        by_recency.sort_by(|a, b| b.0.cmp(&a.0));

        let notes: Vec<&'a Note> = in_month.into_iter().map(|(_, n)| n).collect();
        Self {
            month,
            counts: PriorityCounts::of(notes.iter().copied()),
            recent: by_recency
                .into_iter()
                .take(RECENT_LIMIT)
                .map(|(_, n)| n)
                .collect(),
            pinned: notes.iter().copied().filter(|n| n.pinned).collect(),
            notes,
        }
    }

    pub fn total(&self) -> usize {
        self.notes.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterRange {
    pub from: Option<CalendarDay>,
    pub to: Option<CalendarDay>,
}

/// Title search, priority and an inclusive day range.
#[derive(Debug, Clone, Default)]
pub struct NoteFilter {
    pub query: Option<String>,
    pub priority: Option<Priority>,
    pub from: Option<CalendarDay>,
    pub to: Option<CalendarDay>,
}

impl NoteFilter {
    pub fn is_empty(&self) -> bool {
        self.query().is_none() && self.priority.is_none() && self.range().is_none()
    }

    pub fn range(&self) -> Option<FilterRange> {
        if self.from.is_none() && self.to.is_none() {
            return None;
        }
        Some(FilterRange {
            from: self.from,
            to: self.to,
        })
    }

    fn query(&self) -> Option<String> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase)
    }

    pub fn matches<C: Clock>(&self, note: &Note, normalizer: &DateNormalizer<C>) -> bool {
        self.matches_with(note, self.query().as_deref(), normalizer)
    }

    pub fn apply<'a, C: Clock>(
        &self,
        notes: &'a [Note],
        normalizer: &DateNormalizer<C>,
    ) -> Vec<&'a Note> {
        let query = self.query();
        notes
            .iter()
            .filter(|n| self.matches_with(n, query.as_deref(), normalizer))
            .collect()
    }

    fn matches_with<C: Clock>(
        &self,
        note: &Note,
        query: Option<&str>,
        normalizer: &DateNormalizer<C>,
    ) -> bool {
        if let Some(q) = query {
            if !note.title.to_lowercase().contains(q) {
                return false;
            }
        }
        if self.priority.is_some_and(|p| p != note.priority) {
            return false;
        }
        if self.from.is_none() && self.to.is_none() {
            return true;
        }
        let day = note.day(normalizer);
        self.from.map_or(true, |from| day >= from) && self.to.map_or(true, |to| day <= to)
    }
}
