use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use crate::domain::RecordId;

/// Guest notes saved before the sign-up prompt appears.
pub const GUEST_PROMPT_AFTER: u32 = 3;

/// Client-side session, persisted between runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionState {
    pub version: u32,
    pub token: Option<String>,
    pub user_id: Option<RecordId>,
    pub user_email: Option<String>,
    pub has_guest_notes: bool,
    pub guest_note_count: u32,
    pub guest_prompt_shown: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            version: 1,
            token: None,
            user_id: None,
            user_email: None,
            has_guest_notes: false,
            guest_note_count: 0,
            guest_prompt_shown: false,
        }
    }
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<SessionState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        let st = serde_json::from_str(&raw)?;
        Ok(Some(st))
    }

    pub fn save(&self, st: &SessionState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(st)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

/// Shared handle to the session; every change is written through to the
/// store when there is one.
#[derive(Clone)]
pub struct SessionHandle {
    state: Arc<RwLock<SessionState>>,
    store: Option<Arc<StateStore>>,
}

impl SessionHandle {
    pub fn in_memory(state: SessionState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            store: None,
        }
    }

    pub fn open(store: StateStore) -> Result<Self> {
        let state = store.load()?.unwrap_or_default();
        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            store: Some(Arc::new(store)),
        })
    }

    pub fn snapshot(&self) -> SessionState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn token(&self) -> Option<String> {
        self.snapshot().token.filter(|t| !t.is_empty())
    }

    pub fn user_id(&self) -> Option<RecordId> {
        self.snapshot().user_id
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot().is_authenticated()
    }

    pub fn login(&self, token: String, email: Option<String>) -> Result<()> {
        self.update(|st| {
            st.token = Some(token);
            st.user_email = email;
        })
    }

    pub fn set_user_id(&self, id: Option<RecordId>) -> Result<()> {
        self.update(|st| st.user_id = id)
    }

    /// Drops credentials, keeps guest bookkeeping.
    pub fn logout(&self) -> Result<()> {
        self.update(|st| {
            st.token = None;
            st.user_id = None;
            st.user_email = None;
        })
    }

    /// Forgets everything, as after a rejected token.
    pub fn clear(&self) -> Result<()> {
        self.update(|st| *st = SessionState::default())
    }

    /// Counts a note saved as a guest. Returns true exactly once, when the
    /// count reaches [`GUEST_PROMPT_AFTER`].
    pub fn record_guest_note(&self) -> Result<bool> {
        self.update(|st| {
            st.has_guest_notes = true;
            st.guest_note_count += 1;
            let prompt = st.guest_note_count == GUEST_PROMPT_AFTER && !st.guest_prompt_shown;
            if prompt {
                st.guest_prompt_shown = true;
            }
            prompt
        })
    }

    pub fn mark_guest_notes_migrated(&self) -> Result<()> {
        self.update(|st| {
            st.has_guest_notes = false;
            st.guest_note_count = 0;
        })
    }

    fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> Result<R> {
        let (out, snapshot) = {
            let mut st = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let out = f(&mut st);
            (out, st.clone())
        };
        if let Some(store) = &self.store {
            store.save(&snapshot)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("session.json"));
        assert_eq!(store.load().unwrap(), None);
        let session = SessionHandle::open(store).unwrap();
        assert!(!session.is_authenticated());
    }

    #[test]
    fn changes_persist_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/session.json");

        let session = SessionHandle::open(StateStore::new(&path)).unwrap();
        session.login("tok".into(), Some("ana@example.com".into())).unwrap();
        session.set_user_id(Some(RecordId::new("9"))).unwrap();

        let reopened = SessionHandle::open(StateStore::new(&path)).unwrap();
        assert_eq!(reopened.token().as_deref(), Some("tok"));
        assert_eq!(reopened.user_id(), Some(RecordId::new("9")));

        reopened.logout().unwrap();
        let st = StateStore::new(&path).load().unwrap().unwrap();
        assert!(!st.is_authenticated());
        assert_eq!(st.user_id, None);
    }

    #[test]
    fn tolerates_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, r#"{"token":"abc"}"#).unwrap();
        let st = StateStore::new(&path).load().unwrap().unwrap();
        assert_eq!(st.version, 1);
        assert!(st.is_authenticated());
    }

    #[test]
    fn guest_prompt_fires_once_on_third_note() {
        let session = SessionHandle::in_memory(SessionState::default());
        let prompts: Vec<bool> = (0..5).map(|_| session.record_guest_note().unwrap()).collect();
        assert_eq!(prompts, [false, false, true, false, false]);
        assert!(session.snapshot().has_guest_notes);

        session.mark_guest_notes_migrated().unwrap();
        assert!(!session.snapshot().has_guest_notes);
        // Already shown once; stays quiet.
        let prompts: Vec<bool> = (0..3).map(|_| session.record_guest_note().unwrap()).collect();
        assert_eq!(prompts, [false, false, false]);
    }

    #[test]
    fn clear_wipes_everything() {
        let session = SessionHandle::in_memory(SessionState {
            token: Some("t".into()),
            has_guest_notes: true,
            ..SessionState::default()
        });
        session.clear().unwrap();
        assert_eq!(session.snapshot(), SessionState::default());
    }
}
