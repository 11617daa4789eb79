use anyhow::Result;
use chrono::NaiveDate;
use std::{fs::File, io::Write, path::Path};

use crate::calendar::group_by_day;
use crate::clock::Clock;
use crate::date::DateNormalizer;
use crate::domain::{Note, Priority};

/// Writes notes as a markdown agenda, one section per local day.
pub fn write_agenda<C: Clock, W: Write>(
    out: &mut W,
    title: &str,
    notes: &[Note],
    normalizer: &DateNormalizer<C>,
) -> Result<()> {
    writeln!(out, "# {title}\n")?;
    writeln!(
        out,
        "_Generated {} ({})_\n",
        normalizer.today(),
        normalizer.zone()
    )?;

    let groups = group_by_day(notes, normalizer);
    if groups.is_empty() {
        writeln!(out, "No notes.")?;
        return Ok(());
    }

    for (key, day_notes) in groups {
        // The key's own date, even when the zone skipped that day.
        let date = NaiveDate::parse_from_str(key.as_str(), "%Y-%m-%d")
            .unwrap_or_else(|_| normalizer.parse_local_date(&key).date());
        writeln!(out, "## {} ({})\n", key, date.format("%A"))?;

        let mut day_notes = day_notes;
        // Pinned first, then by title.
        day_notes.sort_by(|a, b| b.pinned.cmp(&a.pinned).then_with(|| a.title.cmp(&b.title)));

        for note in day_notes {
            let mut line = format!("- {}", note.title);
            if note.pinned {
                line.push_str(" [pinned]");
            }
            if note.priority != Priority::Normal {
                line.push_str(&format!(" ({})", note.priority));
            }
            let fire = note
                .reminder_schedule(normalizer)
                .and_then(|s| normalizer.zone().to_local(s.fire_at()));
            if let Some(fire) = fire {
                line.push_str(&format!(" reminder {}", fire.format("%Y-%m-%d %H:%M")));
            }
            writeln!(out, "{line}")?;

            let body = note.body().trim();
            if !body.is_empty() {
                for body_line in body.lines() {
                    writeln!(out, "  > {body_line}")?;
                }
            }
        }
        writeln!(out)?;
    }

    Ok(())
}

pub fn write_agenda_file<C: Clock>(
    path: impl AsRef<Path>,
    title: &str,
    notes: &[Note],
    normalizer: &DateNormalizer<C>,
) -> Result<()> {
    let mut f = File::create(path)?;
    write_agenda(&mut f, title, notes, normalizer)?;
    f.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, LocalZone};
    use chrono::{TimeZone, Utc};

    fn normalizer() -> DateNormalizer<FixedClock> {
        DateNormalizer::new(
            FixedClock::new(Utc.with_ymd_and_hms(2025, 3, 5, 12, 0, 0).unwrap()),
            LocalZone::parse("America/Los_Angeles").unwrap(),
        )
    }

    fn note(title: &str, date: &str) -> Note {
        Note {
            title: title.into(),
            date: date.into(),
            ..Note::default()
        }
    }

    #[test]
    fn groups_by_local_day() {
        let notes = vec![
            note("b", "2025-03-06T12:00:00Z"),
            Note {
                pinned: true,
                priority: Priority::Important,
                description: "bring id\nand forms".into(),
                ..note("z", "2025-03-06")
            },
            // 05:00Z on the 7th is the evening of the 6th in LA.
            note("a", "2025-03-07T05:00:00Z"),
            note("later", "2025-03-09"),
        ];
        let mut out = Vec::new();
        write_agenda(&mut out, "March", &notes, &normalizer()).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("# March\n"));
        assert!(text.contains("_Generated 2025-03-05 (America/Los_Angeles)_"));
        let day6 = text.find("## 2025-03-06 (Thursday)").unwrap();
        let day9 = text.find("## 2025-03-09 (Sunday)").unwrap();
        assert!(day6 < day9);
        assert!(!text.contains("2025-03-07"));

        let section = &text[day6..day9];
        let lines: Vec<&str> = section.lines().filter(|l| l.starts_with("- ")).collect();
        assert_eq!(lines, ["- z [pinned] (important)", "- a", "- b"]);
        assert!(section.contains("  > bring id\n  > and forms\n"));
    }

    #[test]
    fn empty_agenda_and_file_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agenda.md");
        write_agenda_file(&path, "Empty", &[], &normalizer()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("No notes.\n"));
    }

    #[test]
    fn shows_reminder_in_local_time() {
        let n = Note {
            reminder: true,
            reminder_clock: Some("09:00".into()),
            reminder_offset_minutes: Some(30),
            tz_offset_minutes: Some(-480),
            ..note("dentist", "2025-03-06")
        };
        let mut out = Vec::new();
        write_agenda(&mut out, "R", &[n], &normalizer()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("- dentist reminder 2025-03-06 08:30"));
    }

    #[test]
    fn skipped_day_keeps_its_weekday() {
        let apia = DateNormalizer::new(
            FixedClock::new(Utc.with_ymd_and_hms(2025, 3, 5, 12, 0, 0).unwrap()),
            LocalZone::parse("Pacific/Apia").unwrap(),
        );
        let notes = vec![note("nye eve", "2011-12-30"), note("nye", "2011-12-31")];
        let mut out = Vec::new();
        write_agenda(&mut out, "Samoa", &notes, &apia).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("## 2011-12-30 (Friday)"), "{text}");
        assert!(text.contains("## 2011-12-31 (Saturday)"), "{text}");
    }
}
