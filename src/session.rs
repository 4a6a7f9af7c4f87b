//! Per-session UI state.
//!
//! Each browser session gets its own [`SessionState`], keyed by a random id
//! stored in the `session` cookie. The state says which form is open, which
//! patient the selector points at, and carries a one-shot flash message to
//! show on the next render.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::record::{MedicationTable, PatientRecord, RecordFields};

pub const SESSION_COOKIE: &str = "session";

/// Date format used for the add form's default dates.
pub const DATE_FORMAT: &str = "%m/%d/%Y";

/// Which form the dashboard shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FormView {
    #[default]
    Idle,
    /// The add form, holding what the caregiver has typed so far.
    AddFormOpen { draft: PatientRecord },
    /// The modify form for `patient_id`. `draft` holds values from a failed
    /// save; otherwise the form shows the stored record.
    ModifyFormOpen {
        patient_id: String,
        draft: Option<RecordFields>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashKind {
    Success,
    Error,
    Info,
}

/// Message shown once on the next render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Flash {
            kind: FlashKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Flash {
            kind: FlashKind::Error,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Flash {
            kind: FlashKind::Info,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub view: FormView,
    pub selected_id: Option<String>,
    pub flash: Option<Flash>,
}

impl SessionState {
    /// Show an empty add form with both dates defaulting to `today`.
    pub fn open_add_form(&mut self, today: &str) {
        let draft = PatientRecord {
            last_administered_date: today.to_string(),
            next_due_date: today.to_string(),
            ..PatientRecord::default()
        };
        self.view = FormView::AddFormOpen { draft };
    }

    pub fn close_forms(&mut self) {
        self.view = FormView::Idle;
    }

    pub fn add_succeeded(&mut self, patient_id: &str) {
        self.view = FormView::Idle;
        self.selected_id = Some(patient_id.to_string());
        self.flash = Some(Flash::success("New patient added."));
    }

    /// Keep the add form open with the rejected values.
    pub fn add_rejected(&mut self, draft: PatientRecord, message: impl Into<String>) {
        self.view = FormView::AddFormOpen { draft };
        self.flash = Some(Flash::error(message));
    }

    pub fn open_modify_form(&mut self, patient_id: &str) {
        self.selected_id = Some(patient_id.to_string());
        self.view = FormView::ModifyFormOpen {
            patient_id: patient_id.to_string(),
            draft: None,
        };
    }

    pub fn modify_succeeded(&mut self, patient_id: &str) {
        self.view = FormView::Idle;
        self.flash = Some(Flash::success(format!(
            "Record for Patient ID {patient_id} updated."
        )));
    }

    pub fn modify_failed(&mut self, patient_id: &str, draft: RecordFields, message: impl Into<String>) {
        self.view = FormView::ModifyFormOpen {
            patient_id: patient_id.to_string(),
            draft: Some(draft),
        };
        self.flash = Some(Flash::error(message));
    }

    pub fn deleted(&mut self, patient_id: &str) {
        if self.selected_id.as_deref() == Some(patient_id) {
            self.selected_id = None;
        }
        self.view = FormView::Idle;
        self.flash = Some(Flash::success(format!(
            "Record with Patient ID {patient_id} deleted."
        )));
    }

    pub fn failed(&mut self, message: impl Into<String>) {
        self.flash = Some(Flash::error(message));
    }

    pub fn take_flash(&mut self) -> Option<Flash> {
        self.flash.take()
    }

    /// Drop references to records that are no longer in `table`.
    pub fn reconcile(&mut self, table: &MedicationTable) {
        if let Some(selected) = &self.selected_id {
            if !table.contains_id(selected) {
                self.selected_id = None;
            }
        }
        if let FormView::ModifyFormOpen { patient_id, .. } = &self.view {
            if !table.contains_id(patient_id) {
                let message = format!("Record with Patient ID {patient_id} no longer exists.");
                self.view = FormView::Idle;
                self.flash.get_or_insert(Flash::info(message));
            }
        }
    }

    /// Patient id the modify form is editing, if it is open.
    pub fn modify_target(&self) -> Option<&str> {
        match &self.view {
            FormView::ModifyFormOpen { patient_id, .. } => Some(patient_id),
            _ => None,
        }
    }
}

struct Entry {
    state: SessionState,
    expires_at: SystemTime,
}

/// All live sessions of the server.
pub struct Sessions {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
}

impl Sessions {
    pub fn new(ttl: Duration) -> Self {
        Sessions {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Find the session named by the cookie, or start a new one.
    ///
    /// Returns the jar to send back (with a fresh cookie when a session was
    /// created) and the session id.
    pub fn resolve(&self, jar: CookieJar) -> (CookieJar, String) {
        let now = SystemTime::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, entry| entry.expires_at > now);

        if let Some(cookie) = jar.get(SESSION_COOKIE) {
            if let Some(entry) = entries.get_mut(cookie.value()) {
                entry.expires_at = now + self.ttl;
                let id = cookie.value().to_string();
                return (jar, id);
            }
        }

        let id = Uuid::new_v4().to_string();
        entries.insert(
            id.clone(),
            Entry {
                state: SessionState::default(),
                expires_at: now + self.ttl,
            },
        );
        log::debug!("started session {id}");

        let cookie = Cookie::build((SESSION_COOKIE, id.clone()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax);
        (jar.add(cookie), id)
    }

    /// Run `f` against the state of session `id`, creating it if needed.
    pub fn with<R>(&self, id: &str, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.entry(id.to_string()).or_insert_with(|| Entry {
            state: SessionState::default(),
            expires_at: SystemTime::now() + self.ttl,
        });
        f(&mut entry.state)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
