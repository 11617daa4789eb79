use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Utc};

use crate::clock::{Clock, LocalZone};
use crate::date::{CalendarDay, DateNormalizer};
use crate::domain::Note;

/// Offsets offered by the editor: 30 min, 1 h, 1 day before.
pub const REMINDER_PRESETS: [u32; 3] = [30, 60, 24 * 60];

const MAX_OFFSET_MINUTES: u32 = 7 * 24 * 60;

/// What the user picked for a note's reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderSettings {
    /// How long before `clock` on the note's day the reminder fires.
    pub offset_minutes: u32,
    /// Local wall-clock time on the note's day.
    pub clock: NaiveTime,
    pub email: Option<String>,
}

impl ReminderSettings {
    pub fn new(offset_minutes: u32, clock: &str, email: Option<String>) -> Result<Self> {
        if offset_minutes > MAX_OFFSET_MINUTES {
            bail!("reminder offset {offset_minutes}m exceeds {MAX_OFFSET_MINUTES}m");
        }
        let email = email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        if let Some(e) = email.as_deref() {
            validate_email(e)?;
        }
        Ok(Self {
            offset_minutes,
            clock: parse_clock(clock)?,
            email,
        })
    }
}

pub fn parse_clock(s: &str) -> Result<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| anyhow!("invalid reminder time: {s} (expected HH:MM)"))
}

pub fn format_clock(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

/// Shape check only; delivery is the server's problem.
pub fn validate_email(s: &str) -> Result<()> {
    let invalid = || anyhow!("invalid reminder email: {s}");
    if s.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = s.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return Err(invalid());
    }
    Ok(())
}

/// A reminder pinned to a day, with the UTC offset captured when it was
/// saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderSchedule {
    pub day: CalendarDay,
    pub clock: NaiveTime,
    pub offset_minutes: u32,
    /// East-positive offset of the saving client, e.g. -300 for UTC-5.
    pub tz_offset_minutes: i32,
    pub email: Option<String>,
}

impl ReminderSchedule {
    /// Captures the zone offset in effect right now, not on `day`.
    pub fn capture<C: Clock>(
        day: CalendarDay,
        settings: &ReminderSettings,
        normalizer: &DateNormalizer<C>,
    ) -> Self {
        let tz_offset_minutes = normalizer.zone().offset_minutes_at(normalizer.now());
        Self {
            day,
            clock: settings.clock,
            offset_minutes: settings.offset_minutes,
            tz_offset_minutes,
            email: settings.email.clone(),
        }
    }

    /// Rebuilds the schedule stored on a note. `None` when the reminder is
    /// off or incomplete.
    pub fn from_note<C: Clock>(note: &Note, normalizer: &DateNormalizer<C>) -> Option<Self> {
        if !note.reminder {
            return None;
        }
        let clock = parse_clock(note.reminder_clock.as_deref()?).ok()?;
        Some(Self {
            day: note.day(normalizer),
            clock,
            offset_minutes: note.reminder_offset_minutes.unwrap_or(0),
            tz_offset_minutes: note.tz_offset_minutes?,
            email: note.reminder_email.clone(),
        })
    }

    /// Wall-clock time the user expects the reminder at.
    fn intended_wall_clock(&self) -> NaiveDateTime {
        self.day
            .date()
            .and_time(self.clock)
            .checked_sub_signed(Duration::minutes(i64::from(self.offset_minutes)))
            .unwrap_or(NaiveDateTime::MIN)
    }

    /// Clamped to the representable range.
    pub fn fire_at(&self) -> DateTime<Utc> {
        let offset = Duration::minutes(i64::from(self.tz_offset_minutes));
        match self.intended_wall_clock().checked_sub_signed(offset) {
            Some(utc) => utc.and_utc(),
            None if offset > Duration::zero() => DateTime::<Utc>::MIN_UTC,
            None => DateTime::<Utc>::MAX_UTC,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.fire_at() <= now
    }

    /// Minutes between the wall-clock time the user chose and the wall-clock
    /// time the reminder actually fires at when observed from `zone`.
    /// Non-zero when `zone` (or its DST state) differs from the one at save
    /// time. `None` when the fire time can't be read in `zone`.
    pub fn wall_clock_drift(&self, zone: LocalZone) -> Option<i64> {
        let observed = zone.to_local(self.fire_at())?;
        Some((observed - self.intended_wall_clock()).num_minutes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    fn normalizer(now: &str, tz: &str) -> DateNormalizer<FixedClock> {
        let now = DateTime::parse_from_rfc3339(now).unwrap().with_timezone(&Utc);
        DateNormalizer::new(FixedClock::new(now), LocalZone::parse(tz).unwrap())
    }

    #[test]
    fn parses_clock_strings() {
        assert_eq!(parse_clock("09:00").unwrap(), NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(parse_clock(" 9:05 ").unwrap(), NaiveTime::from_hms_opt(9, 5, 0).unwrap());
        assert_eq!(parse_clock("23:59:30").unwrap(), NaiveTime::from_hms_opt(23, 59, 30).unwrap());
        assert!(parse_clock("24:00").is_err());
        assert!(parse_clock("nine").is_err());
        assert_eq!(format_clock(NaiveTime::from_hms_opt(7, 3, 0).unwrap()), "07:03");
    }

    #[test]
    fn email_shapes() {
        assert!(validate_email("ana@example.com").is_ok());
        assert!(validate_email("ana@localhost").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("ana@@example.com").is_err());
        assert!(validate_email("ana @example.com").is_err());
        assert!(validate_email("ana@example.").is_err());
    }

    #[test]
    fn settings_validation() {
        let s = ReminderSettings::new(60, "09:00", Some("  ".into())).unwrap();
        assert_eq!(s.email, None);
        assert!(ReminderSettings::new(MAX_OFFSET_MINUTES + 1, "09:00", None).is_err());
        assert!(ReminderSettings::new(30, "09:00", Some("nope".into())).is_err());
        for preset in REMINDER_PRESETS {
            assert!(ReminderSettings::new(preset, "08:30", None).is_ok());
        }
    }

    #[test]
    fn fire_time_uses_captured_offset() {
        let n = normalizer("2025-03-01T15:00:00Z", "America/New_York");
        let settings = ReminderSettings::new(60, "09:00", None).unwrap();
        let day = CalendarDay::from_ymd(2025, 3, 10).unwrap();
        let schedule = ReminderSchedule::capture(day, &settings, &n);

        assert_eq!(schedule.tz_offset_minutes, -300);
        assert_eq!(
            schedule.fire_at(),
            DateTime::parse_from_rfc3339("2025-03-10T13:00:00Z").unwrap()
        );
        assert!(!schedule.is_due(n.now()));
    }

    #[test]
    fn day_before_offset_crosses_midnight() {
        let n = normalizer("2025-03-01T15:00:00Z", "+02:00");
        let settings = ReminderSettings::new(24 * 60, "08:00", None).unwrap();
        let schedule =
            ReminderSchedule::capture(CalendarDay::from_ymd(2025, 3, 1).unwrap(), &settings, &n);
        assert_eq!(
            schedule.fire_at(),
            DateTime::parse_from_rfc3339("2025-02-28T06:00:00Z").unwrap()
        );
        assert!(schedule.is_due(n.now()));
    }

    #[test]
    fn drift_after_dst_change_or_travel() {
        // Saved in winter (EST), fires after the switch to EDT.
        let n = normalizer("2025-03-01T15:00:00Z", "America/New_York");
        let settings = ReminderSettings::new(60, "09:00", None).unwrap();
        let schedule =
            ReminderSchedule::capture(CalendarDay::from_ymd(2025, 3, 10).unwrap(), &settings, &n);

        let drift = |tz: &str| schedule.wall_clock_drift(LocalZone::parse(tz).unwrap());
        assert_eq!(drift("-05:00"), Some(0));
        assert_eq!(schedule.wall_clock_drift(n.zone()), Some(60));
        assert_eq!(drift("Europe/Madrid"), Some(360));
    }

    #[test]
    fn schedule_at_range_edge_does_not_panic() {
        let n = normalizer("2025-03-01T15:00:00Z", "+09:00");
        let last = ReminderSchedule {
            day: CalendarDay::from(chrono::NaiveDate::MAX),
            clock: parse_clock("23:30").unwrap(),
            offset_minutes: 0,
            tz_offset_minutes: -720,
            email: None,
        };
        assert_eq!(last.fire_at(), DateTime::<Utc>::MAX_UTC);
        assert_eq!(last.wall_clock_drift(n.zone()), None);

        let first = ReminderSchedule {
            day: CalendarDay::from(chrono::NaiveDate::MIN),
            offset_minutes: 60,
            tz_offset_minutes: 0,
            ..last
        };
        assert_eq!(first.fire_at(), NaiveDateTime::MIN.and_utc());
        assert_eq!(first.wall_clock_drift(LocalZone::parse("-05:00").unwrap()), None);
    }

    #[test]
    fn schedule_from_note() {
        let n = normalizer("2025-03-01T15:00:00Z", "-05:00");
        let mut note = Note {
            date: "2025-03-10".into(),
            reminder: true,
            reminder_clock: Some("09:00".into()),
            reminder_offset_minutes: Some(30),
            tz_offset_minutes: Some(-300),
            ..Note::default()
        };
        let schedule = ReminderSchedule::from_note(&note, &n).unwrap();
        assert_eq!(schedule.day, CalendarDay::from_ymd(2025, 3, 10).unwrap());
        assert_eq!(
            schedule.fire_at(),
            DateTime::parse_from_rfc3339("2025-03-10T13:30:00Z").unwrap()
        );

        note.reminder = false;
        assert!(ReminderSchedule::from_note(&note, &n).is_none());
        note.reminder = true;
        note.tz_offset_minutes = None;
        assert!(ReminderSchedule::from_note(&note, &n).is_none());
    }
}
