//! Property tests for local-day normalization.
//!
//! - Canonical keys pass through untouched in every zone
//! - Normalizing a key again changes nothing, whatever produced it
//! - Reading a day's key back lands on that day, or the next one when the
//!   zone skipped it

use calnotes::{CalendarDay, DateInput, DateNormalizer, FixedClock, LocalZone, NoteDateKey};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use proptest::prelude::*;

const ZONES: &[&str] = &[
    "UTC",
    "-05:00",
    "+09:00",
    "+14:00",
    "-12:00",
    "America/New_York",
    "Europe/Berlin",
    "Pacific/Kiritimati",
    "Pacific/Pago_Pago",
    "Pacific/Apia",
    "Asia/Kolkata",
];

fn normalizer(zone: usize) -> DateNormalizer<FixedClock> {
    let now = DateTime::parse_from_rfc3339("2025-06-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    DateNormalizer::new(FixedClock::new(now), LocalZone::parse(ZONES[zone]).unwrap())
}

fn any_date() -> impl Strategy<Value = NaiveDate> {
    (NaiveDate::MIN.num_days_from_ce()..=NaiveDate::MAX.num_days_from_ce())
        .prop_map(|d| NaiveDate::from_num_days_from_ce_opt(d).unwrap())
}

fn modern_date() -> impl Strategy<Value = NaiveDate> {
    let from = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap().num_days_from_ce();
    let to = NaiveDate::from_ymd_opt(2100, 12, 31).unwrap().num_days_from_ce();
    (from..=to).prop_map(|d| NaiveDate::from_num_days_from_ce_opt(d).unwrap())
}

fn any_millis() -> impl Strategy<Value = i64> {
    DateTime::<Utc>::MIN_UTC.timestamp_millis()..=DateTime::<Utc>::MAX_UTC.timestamp_millis()
}

fn assert_stable(n: &DateNormalizer<FixedClock>, input: DateInput) -> Result<(), TestCaseError> {
    let once = n.normalize_date_key(input);
    let twice = n.normalize_date_key(&once);
    prop_assert_eq!(&once, &twice, "{:?}", input);
    Ok(())
}

/// Property: key-shaped strings come back byte for byte
#[test]
fn proptest_canonical_passthrough() {
    proptest!(|(s in "[0-9]{4}-[0-9]{2}-[0-9]{2}", zone in 0..ZONES.len())| {
        prop_assert!(NoteDateKey::is_canonical(&s));
        prop_assert_eq!(normalizer(zone).normalize_date_key(s.as_str()), s.as_str());
    });
}

/// Property: normalizing is idempotent for days anywhere in range
#[test]
fn proptest_idempotent_days() {
    proptest!(|(date in any_date(), zone in 0..ZONES.len())| {
        assert_stable(&normalizer(zone), DateInput::Day(date))?;
    });
}

/// Property: normalizing is idempotent for instants anywhere in range
#[test]
fn proptest_idempotent_instants() {
    proptest!(|(ms in any_millis(), zone in 0..ZONES.len())| {
        let n = normalizer(zone);
        assert_stable(&n, DateInput::EpochMillis(ms))?;
        let instant = DateTime::from_timestamp_millis(ms).unwrap();
        assert_stable(&n, DateInput::Instant(instant))?;
    });
}

/// Property: arbitrary text never panics and settles after one pass
#[test]
fn proptest_idempotent_text() {
    proptest!(|(text in "\\PC{0,40}", zone in 0..ZONES.len())| {
        assert_stable(&normalizer(zone), DateInput::Text(&text))?;
    });
}

/// Property: a day's key reads back as that day, or the next when skipped
#[test]
fn proptest_key_round_trip() {
    proptest!(|(date in modern_date(), zone in 0..ZONES.len())| {
        let n = normalizer(zone);
        let day = CalendarDay::from(date);
        let back = n.parse_local_date(&day.key());
        prop_assert!(
            back == day || Some(back) == day.add_days(1),
            "{} read back as {}", day, back
        );
    });
}
