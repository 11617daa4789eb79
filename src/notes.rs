use anyhow::{anyhow, bail, Result};
use tracing::{info, warn};

use crate::api::{ApiClient, LoginOutcome};
use crate::clock::{Clock, SystemClock};
use crate::date::{CalendarDay, DateInput, DateNormalizer, NoteDateKey};
use crate::domain::{wire_timestamp, Note, NoteDraft, NotePayload, Priority, RecordId};
use crate::reminder::{format_clock, ReminderSchedule, ReminderSettings};

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Added {
        /// Third guest note: time to suggest signing up.
        guest_prompt: bool,
    },
    Updated(Note),
}

/// Note operations on top of [`ApiClient`], with dates kept as local day
/// keys on the way in and noon timestamps on the way out.
pub struct NotesService<C = SystemClock> {
    api: ApiClient,
    normalizer: DateNormalizer<C>,
}

impl<C: Clock> NotesService<C> {
    pub fn new(api: ApiClient, normalizer: DateNormalizer<C>) -> Self {
        Self { api, normalizer }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn normalizer(&self) -> &DateNormalizer<C> {
        &self.normalizer
    }

    /// All visible notes, each `date` replaced by its local day key, ordered
    /// by day.
    pub async fn fetch(&self) -> Result<Vec<Note>> {
        let mut notes: Vec<Note> = self
            .api
            .notes()
            .await?
            .into_iter()
            .map(|n| n.normalized(&self.normalizer))
            .collect();
        notes.sort_by(|a, b| a.date.cmp(&b.date));
        info!(count = notes.len(), guest = !self.api.session().is_authenticated(), "notes.fetched");
        Ok(notes)
    }

    pub async fn find(&self, id: &RecordId) -> Result<Note> {
        self.fetch()
            .await?
            .into_iter()
            .find(|n| &n.id == id)
            .ok_or_else(|| anyhow!("note {id} not found"))
    }

    /// Draft for editing `note` that keeps its current reminder.
    pub fn edit_draft(&self, note: &Note) -> Result<NoteDraft> {
        let mut draft = NoteDraft::from_note(note);
        if let Some(s) = note.reminder_schedule(&self.normalizer) {
            draft.reminder = Some(ReminderSettings::new(
                s.offset_minutes,
                &format_clock(s.clock),
                s.email,
            )?);
        }
        Ok(draft)
    }

    /// Adds a note, or updates `active` when editing one. `opened_for` is the
    /// day the editor was opened on.
    pub async fn save(
        &self,
        draft: &NoteDraft,
        opened_for: Option<CalendarDay>,
        active: Option<&Note>,
    ) -> Result<SaveOutcome> {
        let session = self.api.session();
        let payload =
            NotePayload::from_draft(draft, opened_for, session.user_id(), &self.normalizer)?;

        match active {
            Some(note) => {
                let offset = self.normalizer.zone().offset_minutes_at(self.normalizer.now());
                self.api.update_note(&note.id, &payload, offset).await?;
                let mut updated = note.clone();
                payload.apply_to(&mut updated);
                let updated = updated.normalized(&self.normalizer);
                info!(id = %note.id, date = %updated.date, "notes.updated");
                Ok(SaveOutcome::Updated(updated))
            }
            None => {
                self.api.add_note(&payload).await?;
                let guest_prompt = if session.is_authenticated() {
                    false
                } else {
                    session.record_guest_note()?
                };
                info!(date = %payload.date, guest_prompt, "notes.added");
                Ok(SaveOutcome::Added { guest_prompt })
            }
        }
    }

    pub async fn remove(&self, id: &RecordId) -> Result<()> {
        self.api.delete_note(id).await?;
        info!(%id, "notes.deleted");
        Ok(())
    }

    /// Moves a note to another day. Returns the day key it landed on.
    pub async fn move_to<'a>(
        &self,
        id: &RecordId,
        day: impl Into<DateInput<'a>>,
    ) -> Result<NoteDateKey> {
        let key = self.normalizer.normalize_date_key(day);
        self.api.update_note_date(id, &wire_timestamp(&key)).await?;
        info!(%id, date = %key, "notes.moved");
        Ok(key)
    }

    /// Flips the pin and returns the new state.
    pub async fn toggle_pin(&self, note: &Note) -> Result<bool> {
        let pinned = !note.pinned;
        self.set_pinned(&note.id, pinned).await?;
        Ok(pinned)
    }

    pub async fn set_pinned(&self, id: &RecordId, pinned: bool) -> Result<()> {
        self.api.set_pinned(id, pinned).await?;
        info!(%id, pinned, "notes.pinned");
        Ok(())
    }

    pub async fn set_priority(&self, id: &RecordId, priority: Priority) -> Result<()> {
        self.api.set_priority(id, priority).await?;
        info!(%id, %priority, "notes.priority");
        Ok(())
    }

    /// Turns the reminder on with `settings`, or off with `None`. Turning it
    /// on rewrites the note so the offset and clock are stored with it.
    pub async fn set_reminder(
        &self,
        note: &Note,
        settings: Option<ReminderSettings>,
    ) -> Result<Option<ReminderSchedule>> {
        let Some(settings) = settings else {
            self.api.set_reminder(&note.id, false).await?;
            info!(id = %note.id, "notes.reminder_off");
            return Ok(None);
        };

        let mut draft = NoteDraft::from_note(note);
        draft.reminder = Some(settings);
        let day = note.day(&self.normalizer);
        self.save(&draft, Some(day), Some(note)).await?;

        let schedule = draft
            .reminder
            .as_ref()
            .map(|s| ReminderSchedule::capture(day, s, &self.normalizer));
        if let Some(s) = &schedule {
            info!(id = %note.id, fire_at = %s.fire_at(), "notes.reminder_on");
        }
        Ok(schedule)
    }

    /// Logs in. The user id comes from the login response, else from the
    /// current-user endpoint.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome> {
        let outcome = self.api.login(username, password).await?;
        if matches!(outcome, LoginOutcome::LoggedIn { .. })
            && self.api.session().user_id().is_none()
        {
            let user = self.api.current_user().await?;
            self.api.session().set_user_id(Some(user.id))?;
        }
        Ok(outcome)
    }

    pub fn logout(&self) -> Result<()> {
        self.api.session().logout()?;
        info!("auth.logged_out");
        Ok(())
    }

    /// Whether guest notes are waiting to be moved into the account.
    pub fn should_offer_migration(&self) -> bool {
        let st = self.api.session().snapshot();
        st.is_authenticated() && st.user_id.is_some() && st.has_guest_notes
    }

    pub async fn migrate_guest_notes(&self) -> Result<()> {
        let session = self.api.session();
        if !session.is_authenticated() {
            bail!("log in before migrating guest notes");
        }
        let Some(user_id) = session.user_id() else {
            bail!("no user id in session; log in again");
        };
        match self.api.migrate_guest_notes(&user_id).await {
            Ok(_) => {
                session.mark_guest_notes_migrated()?;
                info!(%user_id, "notes.guest_migrated");
                Ok(())
            }
            Err(e) => {
                warn!(%user_id, error = %e, "notes.guest_migration_failed");
                Err(e)
            }
        }
    }

    /// Reminders of `notes` that are due at the clock's current time.
    pub fn due_reminders<'a>(&self, notes: &'a [Note]) -> Vec<(&'a Note, ReminderSchedule)> {
        let now = self.normalizer.now();
        notes
            .iter()
            .filter_map(|n| n.reminder_schedule(&self.normalizer).map(|s| (n, s)))
            .filter(|(_, s)| s.is_due(now))
            .collect()
    }
}
