use std::{fmt, sync::Arc};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDateTime, Offset, TimeZone, Utc};

/// Source of "now". Date logic takes one of these instead of reading the
/// system clock directly so tests can pin time.
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

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// The timezone used as "local" when reading calendar fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalZone {
    /// Host timezone, as reported by the OS.
    #[default]
    System,
    Named(chrono_tz::Tz),
    Fixed(FixedOffset),
}

// Upper bound when walking forward out of a DST gap.
const GAP_STEP_MINUTES: i64 = 15;
const GAP_MAX_STEPS: i64 = 24 * 60 / GAP_STEP_MINUTES;

impl LocalZone {
    /// Accepts `local`/`system`, `UTC`, fixed offsets (`+05:30`, `-0500`,
    /// `UTC-5`) and IANA names (`America/Bogota`).
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "" | "local" | "system" => return Ok(Self::System),
            "utc" | "z" | "gmt" => return Ok(Self::Fixed(utc_offset())),
            _ => {}
        }

        let offset_part = ["utc", "gmt"]
            .iter()
            .find_map(|p| lower.strip_prefix(p))
            .unwrap_or(&lower);
        if offset_part.starts_with('+') || offset_part.starts_with('-') {
            return parse_offset(offset_part)
                .map(Self::Fixed)
                .ok_or_else(|| anyhow!("invalid tz offset: {s}"));
        }

        let tz: chrono_tz::Tz = s.parse().map_err(|_| anyhow!("invalid tz: {s}"))?;
        Ok(Self::Named(tz))
    }

    /// Wall-clock reading of `instant` in this zone. `None` when the reading
    /// falls outside the representable date range.
    pub fn to_local(&self, instant: DateTime<Utc>) -> Option<NaiveDateTime> {
        let offset = self.offset_at(instant);
        instant
            .naive_utc()
            .checked_add_signed(Duration::seconds(i64::from(offset.local_minus_utc())))
    }

    /// Instant for a wall-clock reading. Ambiguous readings (DST fall-back)
    /// take the earlier instant; readings inside a gap move forward to the
    /// first wall-clock time that exists. Readings that cannot be placed are
    /// taken as UTC.
    pub fn from_local(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        self.try_from_local(naive).unwrap_or_else(|| naive.and_utc())
    }

    /// Like [`from_local`](Self::from_local), but `None` when neither the
    /// reading nor anything in the next 24h maps to a representable instant.
    pub fn try_from_local(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        for step in 0..=GAP_MAX_STEPS {
            let candidate = naive.checked_add_signed(Duration::minutes(step * GAP_STEP_MINUTES))?;
            if let Some(dt) = self.resolve(candidate) {
                return Some(dt);
            }
        }
        None
    }

    /// UTC offset in minutes, east-positive, in effect at `instant`.
    pub fn offset_minutes_at(&self, instant: DateTime<Utc>) -> i32 {
        self.offset_at(instant).local_minus_utc() / 60
    }

    fn offset_at(&self, instant: DateTime<Utc>) -> FixedOffset {
        let utc = instant.naive_utc();
        match self {
            Self::System => Local.offset_from_utc_datetime(&utc).fix(),
            Self::Named(tz) => tz.offset_from_utc_datetime(&utc).fix(),
            Self::Fixed(off) => *off,
        }
    }

    fn resolve(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        let offset = match self {
            Self::System => Local.offset_from_local_datetime(&naive).earliest()?.fix(),
            Self::Named(tz) => tz.offset_from_local_datetime(&naive).earliest()?.fix(),
            Self::Fixed(off) => *off,
        };
        naive
            .checked_sub_signed(Duration::seconds(i64::from(offset.local_minus_utc())))
            .map(|utc| utc.and_utc())
    }
}

impl fmt::Display for LocalZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("local"),
            Self::Named(tz) => f.write_str(tz.name()),
            Self::Fixed(off) => write!(f, "{off}"),
        }
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// `+5`, `-05`, `+0530`, `+05:30`
fn parse_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };

    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };
    if hours.is_empty() || hours.len() > 2 || !hours.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !minutes.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
