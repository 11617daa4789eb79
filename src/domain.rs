use std::{fmt, path::Path, str::FromStr};

use anyhow::{anyhow, bail, Result};
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::clock::Clock;
use crate::date::{CalendarDay, DateNormalizer, NoteDateKey};
use crate::reminder::{format_clock, ReminderSchedule, ReminderSettings};

/// Server-side identifier. The API sends either strings or numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Int(i64),
        }
        Ok(match Raw::deserialize(d)? {
            Raw::Text(s) => Self(s),
            Raw::Int(n) => Self(n.to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    Important,
    Reminder,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Normal, Priority::Important, Priority::Reminder];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Normal => "normal",
            Priority::Important => "important",
            Priority::Reminder => "reminder",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Priority::Normal),
            "important" => Ok(Priority::Important),
            "reminder" => Ok(Priority::Reminder),
            other => Err(anyhow!("unknown priority: {other}")),
        }
    }
}

// Lenient: missing, null or unknown values read as `normal`.
impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(raw.and_then(|s| s.parse().ok()).unwrap_or_default())
    }
}

fn null_as_default<'de, D, T>(d: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// Integer, float or numeric string. Anything else, including values out
/// of range for `T`, reads as absent.
fn lenient_number<'de, D, T>(d: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<i64>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
        Other(serde::de::IgnoredAny),
    }
    let rounded = |f: f64| f.is_finite().then(|| f.round() as i64);
    let n = match Raw::deserialize(d)? {
        Raw::Int(n) => Some(n),
        Raw::Float(f) => rounded(f),
        Raw::Text(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(rounded))
        }
        Raw::Other(_) => None,
    };
    Ok(n.and_then(|n| T::try_from(n).ok()))
}

/// A note as the API returns it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(default, alias = "_id")]
    pub id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<RecordId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pinned: bool,
    /// Whatever the server sent until [`Note::normalized`] replaces it with
    /// the day key.
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reminder: bool,
    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub reminder_offset_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_clock: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub tz_offset_minutes: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_type: Option<String>,
}

impl Note {
    /// Replaces `date` with its local day key.
    pub fn normalized<C: Clock>(mut self, normalizer: &DateNormalizer<C>) -> Self {
        self.date = normalizer.normalize_date_key(&self.date).into_string();
        self
    }

    pub fn day<C: Clock>(&self, normalizer: &DateNormalizer<C>) -> CalendarDay {
        normalizer.parse_local_date(&self.date)
    }

    pub fn day_key<C: Clock>(&self, normalizer: &DateNormalizer<C>) -> NoteDateKey {
        normalizer.normalize_date_key(&self.date)
    }

    /// Body text; older notes only carry `content`.
    pub fn body(&self) -> &str {
        if self.description.is_empty() {
            self.content.as_deref().unwrap_or("")
        } else {
            &self.description
        }
    }

    pub fn image(&self) -> Option<ImageAttachment> {
        match (&self.image_base64, &self.image_type) {
            (Some(data), Some(mime)) if !data.is_empty() => Some(ImageAttachment {
                base64: data.clone(),
                mime: mime.clone(),
            }),
            _ => None,
        }
    }

    pub fn reminder_schedule<C: Clock>(
        &self,
        normalizer: &DateNormalizer<C>,
    ) -> Option<ReminderSchedule> {
        ReminderSchedule::from_note(self, normalizer)
    }
}

/// Base64 image data as stored on a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    #[serde(rename = "imageBase64")]
    pub base64: String,
    #[serde(rename = "imageType")]
    pub mime: String,
}

impl ImageAttachment {
    pub fn from_bytes(bytes: &[u8], mime: impl Into<String>) -> Self {
        Self {
            base64: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime: mime.into(),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mime = image_mime(path)?;
        let bytes = std::fs::read(path)?;
        Ok(Self::from_bytes(&bytes, mime))
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        Ok(base64::engine::general_purpose::STANDARD.decode(&self.base64)?)
    }

    /// `data:` URL suitable for previews.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.base64)
    }
}

pub fn image_mime(path: &Path) -> Result<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Ok("image/png"),
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "gif" => Ok("image/gif"),
        "webp" => Ok("image/webp"),
        "bmp" => Ok("image/bmp"),
        "svg" => Ok("image/svg+xml"),
        _ => Err(anyhow!("not an image: {}", path.display())),
    }
}

/// Editor state for a new or existing note.
#[derive(Debug, Clone, Default)]
pub struct NoteDraft {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub pinned: bool,
    /// Any date-like string; empty or absent means the day the editor was
    /// opened for.
    pub date: Option<String>,
    pub image: Option<ImageAttachment>,
    pub reminder: Option<ReminderSettings>,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Starts an edit from an existing note. The reminder is left off; pass
    /// new settings to keep one.
    pub fn from_note(note: &Note) -> Self {
        Self {
            title: note.title.clone(),
            description: Some(note.description.clone()),
            priority: Some(note.priority),
            pinned: note.pinned,
            date: Some(note.date.clone()).filter(|d| !d.is_empty()),
            image: note.image(),
            reminder: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            bail!("title is required");
        }
        Ok(())
    }
}

/// Body sent when creating or updating a note.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<RecordId>,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub pinned: bool,
    /// `{key}T12:00:00Z`
    pub date: String,
    pub image_base64: Option<String>,
    pub image_type: Option<String>,
    pub reminder: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_offset_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_clock: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tz_offset_minutes: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_email: Option<String>,
}

impl NotePayload {
    /// The day comes from the draft's own date, else `opened_for`, else
    /// today.
    pub fn from_draft<C: Clock>(
        draft: &NoteDraft,
        opened_for: Option<CalendarDay>,
        user_id: Option<RecordId>,
        normalizer: &DateNormalizer<C>,
    ) -> Result<Self> {
        draft.validate()?;

        let day = match (draft.date.as_deref().filter(|d| !d.is_empty()), opened_for) {
            (Some(date), _) => normalizer.parse_local_date(date),
            (None, Some(day)) => day,
            (None, None) => normalizer.today(),
        };
        let key = day.key();

        let schedule = draft
            .reminder
            .as_ref()
            .map(|settings| ReminderSchedule::capture(day, settings, normalizer));

        Ok(Self {
            user_id,
            title: draft.title.clone(),
            description: draft.description.clone().unwrap_or_default(),
            priority: draft.priority.unwrap_or_default(),
            pinned: draft.pinned,
            date: wire_timestamp(&key),
            image_base64: draft.image.as_ref().map(|i| i.base64.clone()),
            image_type: draft.image.as_ref().map(|i| i.mime.clone()),
            reminder: schedule.is_some(),
            reminder_offset_minutes: schedule.as_ref().map(|s| s.offset_minutes),
            reminder_clock: schedule.as_ref().map(|s| format_clock(s.clock)),
            tz_offset_minutes: schedule.as_ref().map(|s| s.tz_offset_minutes),
            reminder_email: schedule.and_then(|s| s.email),
        })
    }

    /// Applies the saved values onto a locally held note.
    pub fn apply_to(&self, note: &mut Note) {
        note.title = self.title.clone();
        note.description = self.description.clone();
        note.priority = self.priority;
        note.pinned = self.pinned;
        note.date = self.date.clone();
        note.image_base64 = self.image_base64.clone();
        note.image_type = self.image_type.clone();
        note.reminder = self.reminder;
        note.reminder_offset_minutes = self.reminder_offset_minutes;
        note.reminder_clock = self.reminder_clock.clone();
        note.tz_offset_minutes = self.tz_offset_minutes;
        note.reminder_email = self.reminder_email.clone();
    }
}

/// Timestamp sent to the API for a day: noon UTC on the key's date.
pub fn wire_timestamp(key: &NoteDateKey) -> String {
    format!("{key}T12:00:00Z")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, LocalZone};
    use chrono::{DateTime, Utc};

    fn normalizer(tz: &str) -> DateNormalizer<FixedClock> {
        let now = DateTime::parse_from_rfc3339("2025-06-15T03:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        DateNormalizer::new(FixedClock::new(now), LocalZone::parse(tz).unwrap())
    }

    #[test]
    fn decodes_server_note() {
        let raw = r#"{
            "id": 42,
            "userId": "u-1",
            "title": "Dentist",
            "description": null,
            "priority": "Important",
            "pinned": true,
            "date": "2025-11-10T00:00:00Z",
            "reminder": null,
            "imageBase64": "aGk=",
            "imageType": "image/png"
        }"#;
        let note: Note = serde_json::from_str(raw).unwrap();
        assert_eq!(note.id, RecordId::new("42"));
        assert_eq!(note.user_id, Some(RecordId::new("u-1")));
        assert_eq!(note.description, "");
        assert_eq!(note.priority, Priority::Important);
        assert!(note.pinned);
        assert!(!note.reminder);
        assert_eq!(note.image().unwrap().data_url(), "data:image/png;base64,aGk=");

        let note = note.normalized(&normalizer("-05:00"));
        assert_eq!(note.date, "2025-11-09");
    }

    #[test]
    fn lenient_reminder_numbers() {
        let note: Note = serde_json::from_str(
            r#"{"id":1,"reminderOffsetMinutes":"30","tzOffsetMinutes":330.0}"#,
        )
        .unwrap();
        assert_eq!(note.reminder_offset_minutes, Some(30));
        assert_eq!(note.tz_offset_minutes, Some(330));

        let note: Note = serde_json::from_str(
            r#"{"id":2,"reminderOffsetMinutes":-5,"tzOffsetMinutes":" -300 "}"#,
        )
        .unwrap();
        assert_eq!(note.reminder_offset_minutes, None);
        assert_eq!(note.tz_offset_minutes, Some(-300));

        let note: Note = serde_json::from_str(
            r#"{"id":3,"reminderOffsetMinutes":"soon","tzOffsetMinutes":{"h":5}}"#,
        )
        .unwrap();
        assert_eq!(note.reminder_offset_minutes, None);
        assert_eq!(note.tz_offset_minutes, None);

        let note: Note = serde_json::from_str(
            r#"{"id":4,"reminderOffsetMinutes":null,"tzOffsetMinutes":"59.6"}"#,
        )
        .unwrap();
        assert_eq!(note.reminder_offset_minutes, None);
        assert_eq!(note.tz_offset_minutes, Some(60));
    }

    #[test]
    fn lenient_priority() {
        let note: Note = serde_json::from_str(r#"{"id":"a","priority":"urgent"}"#).unwrap();
        assert_eq!(note.priority, Priority::Normal);
        let note: Note = serde_json::from_str(r#"{"_id":"b","priority":null}"#).unwrap();
        assert_eq!(note.id.as_str(), "b");
        assert_eq!(note.priority, Priority::Normal);
        assert_eq!(" REMINDER ".parse::<Priority>().unwrap(), Priority::Reminder);
        assert!("soon".parse::<Priority>().is_err());
    }

    #[test]
    fn missing_date_normalizes_to_today() {
        let note: Note = serde_json::from_str(r#"{"id":"a","title":"x"}"#).unwrap();
        assert_eq!(note.normalized(&normalizer("-05:00")).date, "2025-06-14");
    }

    #[test]
    fn body_falls_back_to_content() {
        let mut note = Note {
            content: Some("legacy".into()),
            ..Note::default()
        };
        assert_eq!(note.body(), "legacy");
        note.description = "fresh".into();
        assert_eq!(note.body(), "fresh");
    }

    #[test]
    fn payload_day_precedence() {
        let n = normalizer("-05:00");
        let opened = CalendarDay::from_ymd(2025, 3, 1);

        let mut draft = NoteDraft::new("Standup");
        let p = NotePayload::from_draft(&draft, opened, None, &n).unwrap();
        assert_eq!(p.date, "2025-03-01T12:00:00Z");

        let p = NotePayload::from_draft(&draft, None, None, &n).unwrap();
        assert_eq!(p.date, "2025-06-14T12:00:00Z");

        draft.date = Some("2025-11-10T00:00:00Z".into());
        let p = NotePayload::from_draft(&draft, opened, None, &n).unwrap();
        assert_eq!(p.date, "2025-11-09T12:00:00Z");

        draft.date = Some(String::new());
        let p = NotePayload::from_draft(&draft, opened, None, &n).unwrap();
        assert_eq!(p.date, "2025-03-01T12:00:00Z");
    }

    #[test]
    fn payload_requires_title() {
        let n = normalizer("UTC");
        let err = NotePayload::from_draft(&NoteDraft::new("   "), None, None, &n).unwrap_err();
        assert!(err.to_string().contains("title"));
    }

    #[test]
    fn payload_wire_shape() {
        let n = normalizer("America/New_York");
        let draft = NoteDraft {
            title: "Pay rent".into(),
            priority: Some(Priority::Reminder),
            pinned: true,
            date: Some("2025-07-01".into()),
            reminder: Some(
                ReminderSettings::new(60, "09:00", Some("me@example.com".into())).unwrap(),
            ),
            ..NoteDraft::default()
        };
        let p = NotePayload::from_draft(&draft, None, Some(RecordId::new("7")), &n).unwrap();
        let json = serde_json::to_value(&p).unwrap();

        assert_eq!(json["userId"], "7");
        assert_eq!(json["title"], "Pay rent");
        assert_eq!(json["description"], "");
        assert_eq!(json["priority"], "reminder");
        assert_eq!(json["pinned"], true);
        assert_eq!(json["date"], "2025-07-01T12:00:00Z");
        assert_eq!(json["reminder"], true);
        assert_eq!(json["reminderOffsetMinutes"], 60);
        assert_eq!(json["reminderClock"], "09:00");
        // Saved in June: EDT.
        assert_eq!(json["tzOffsetMinutes"], -240);
        assert_eq!(json["reminderEmail"], "me@example.com");
        assert!(json["imageBase64"].is_null());
    }

    #[test]
    fn edit_round_trip_keeps_fields() {
        let n = normalizer("UTC");
        let mut note = Note {
            id: RecordId::new("1"),
            title: "Old".into(),
            date: "2025-02-02".into(),
            image_base64: Some("aGk=".into()),
            image_type: Some("image/gif".into()),
            ..Note::default()
        };
        let mut draft = NoteDraft::from_note(&note);
        draft.title = "New".into();
        let payload = NotePayload::from_draft(&draft, None, None, &n).unwrap();
        payload.apply_to(&mut note);

        assert_eq!(note.title, "New");
        assert_eq!(note.date, "2025-02-02T12:00:00Z");
        assert_eq!(note.image_type.as_deref(), Some("image/gif"));
        assert_eq!(note.day_key(&n), "2025-02-02");
    }

    #[test]
    fn image_from_bytes() {
        let img = ImageAttachment::from_bytes(b"hi", "image/png");
        assert_eq!(img.base64, "aGk=");
        assert_eq!(img.decode().unwrap(), b"hi");
        assert_eq!(image_mime(Path::new("cat.JPG")).unwrap(), "image/jpeg");
        assert!(image_mime(Path::new("notes.txt")).is_err());
    }
}
