use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;

use crate::models::{DateKey, NoteRecord, StoredNote};
use crate::ports::{Channel, Importance, KeyValueStore, Notifier, NotifyError, StorageError, Trigger};
use crate::retry::RetryPolicy;

/// Key under which the whole note mapping is persisted.
pub const NOTES_STORAGE_KEY: &str = "calendarNotes";

pub const REMINDER_CHANNEL_ID: &str = "calendar-reminders";
const REMINDER_CHANNEL_NAME: &str = "Calendar reminders";
const REMINDER_TITLE: &str = "📅 Calendar reminder";

pub type NoteMap = BTreeMap<DateKey, StoredNote>;

#[derive(Debug, Error)]
pub enum NoteStoreError {
    #[error("failed to save calendar notes: {0}")]
    Persist(#[source] StorageError),

    #[error("failed to encode calendar notes: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to schedule reminder {trigger_id}: {source}")]
    Schedule {
        trigger_id: String,
        #[source]
        source: NotifyError,
    },

    #[error("failed to cancel reminder {trigger_id}: {source}")]
    Cancel {
        trigger_id: String,
        #[source]
        source: NotifyError,
    },
}

/// What happened to the reminder of a saved note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReminderOutcome {
    /// No reminder was asked for and none existed.
    NotRequested,
    #[serde(rename_all = "camelCase")]
    Scheduled {
        trigger_id: String,
        fire_at: NaiveDateTime,
    },
    #[serde(rename_all = "camelCase")]
    Cancelled { trigger_id: String },
    /// The reminder time had already passed; the note was saved without it.
    #[serde(rename_all = "camelCase")]
    RejectedPast { fire_at: NaiveDateTime },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpsertOutcome {
    #[serde(rename_all = "camelCase")]
    Saved {
        record: NoteRecord,
        created: bool,
        notification_changed: bool,
        reminder: ReminderOutcome,
    },
    /// Blank text removed the day's note.
    #[serde(rename_all = "camelCase")]
    Deleted {
        removed: Option<NoteRecord>,
        reminder_cancelled: bool,
    },
}

impl UpsertOutcome {
    /// Message for the caller when the save succeeded only partially.
    pub fn warning(&self) -> Option<String> {
        match self {
            Self::Saved {
                reminder: ReminderOutcome::RejectedPast { fire_at },
                ..
            } => Some(format!(
                "reminder not set: {} is in the past",
                fire_at.format("%Y-%m-%d %H:%M")
            )),
            _ => None,
        }
    }
}

/// Lookup of which days carry a note.
pub trait NoteIndex {
    fn has_note(&self, key: &DateKey) -> bool;
}

impl NoteIndex for NoteMap {
    fn has_note(&self, key: &DateKey) -> bool {
        self.contains_key(key)
    }
}

/// Per-day notes with their 07:00 reminders.
///
/// The in-memory mapping is the source of truth once loaded. Every mutation
/// first talks to the notifier, then persists the whole mapping, and only
/// then replaces the in-memory state, so a failed call leaves the store as
/// it was.
pub struct NoteStore<S, N> {
    storage: S,
    notifier: N,
    retry: RetryPolicy,
    notes: NoteMap,
}

impl<S: KeyValueStore, N: Notifier> NoteStore<S, N> {
    /// Create an empty store. Call [`NoteStore::load`] to read persisted notes.
    pub fn new(storage: S, notifier: N) -> Self {
        Self {
            storage,
            notifier,
            retry: RetryPolicy::default(),
            notes: NoteMap::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Create a store and load it in one step.
    pub fn open(storage: S, notifier: N, retry: RetryPolicy) -> Self {
        let mut store = Self::new(storage, notifier).with_retry(retry);
        store.load();
        store
    }

    /// Replace the in-memory mapping with the persisted one.
    ///
    /// Unreadable or unparsable state loads as an empty mapping.
    pub fn load(&mut self) -> &NoteMap {
        self.notes = match self.storage.get(NOTES_STORAGE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<NoteMap>(&raw) {
                Ok(mut notes) => {
                    notes.retain(|_, stored| !stored.note.trim().is_empty());
                    notes
                }
                Err(e) => {
                    tracing::warn!("Discarding unparsable calendar notes: {}", e);
                    NoteMap::new()
                }
            },
            Ok(None) => NoteMap::new(),
            Err(e) => {
                tracing::warn!("Failed to read calendar notes, starting empty: {}", e);
                NoteMap::new()
            }
        };
        tracing::debug!("Loaded {} calendar notes", self.notes.len());
        &self.notes
    }

    pub fn get(&self, key: &DateKey) -> Option<NoteRecord> {
        self.notes
            .get(key)
            .map(|stored| NoteRecord::new(*key, stored))
    }

    /// All records in date order.
    pub fn records(&self) -> Vec<NoteRecord> {
        self.notes
            .iter()
            .map(|(key, stored)| NoteRecord::new(*key, stored))
            .collect()
    }

    pub fn notes(&self) -> &NoteMap {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Save the note of a day.
    ///
    /// Blank text deletes the day's note. A reminder whose time has passed is
    /// not an error: the note is saved with `has_notification = false` and
    /// the outcome carries a warning.
    pub fn upsert(
        &mut self,
        key: DateKey,
        note_text: &str,
        wants_notification: bool,
    ) -> Result<UpsertOutcome, NoteStoreError> {
        let text = note_text.trim();
        if text.is_empty() {
            let removed = self.delete(&key)?;
            let reminder_cancelled = removed.as_ref().is_some_and(|r| r.has_notification);
            return Ok(UpsertOutcome::Deleted {
                removed,
                reminder_cancelled,
            });
        }

        let previous = self.notes.get(&key).cloned();
        let had_notification = previous.as_ref().is_some_and(|p| p.has_notification);

        let reminder = if wants_notification {
            self.schedule_reminder(key, text)?
        } else if had_notification {
            self.cancel_reminder(key)?;
            ReminderOutcome::Cancelled {
                trigger_id: key.trigger_id(),
            }
        } else {
            ReminderOutcome::NotRequested
        };
        let has_notification = matches!(reminder, ReminderOutcome::Scheduled { .. });

        let stored = StoredNote {
            note: text.to_string(),
            has_notification,
        };
        let mut next = self.notes.clone();
        next.insert(key, stored.clone());

        if let Err(e) = self.persist(&next) {
            if has_notification || had_notification {
                self.roll_back_reminder(key, previous.as_ref());
            }
            return Err(e);
        }
        self.notes = next;

        tracing::info!("Saved calendar note for {}", key);
        Ok(UpsertOutcome::Saved {
            record: NoteRecord::new(key, &stored),
            created: previous.is_none(),
            notification_changed: had_notification != has_notification,
            reminder,
        })
    }

    /// Remove the note of a day, cancelling its reminder if it had one.
    ///
    /// Returns the removed record; deleting an absent day is a no-op.
    pub fn delete(&mut self, key: &DateKey) -> Result<Option<NoteRecord>, NoteStoreError> {
        let Some(stored) = self.notes.get(key).cloned() else {
            return Ok(None);
        };

        if stored.has_notification {
            self.cancel_reminder(*key)?;
        }

        let mut next = self.notes.clone();
        next.remove(key);
        if let Err(e) = self.persist(&next) {
            if stored.has_notification {
                self.roll_back_reminder(*key, Some(&stored));
            }
            return Err(e);
        }
        self.notes = next;

        tracing::info!("Deleted calendar note for {}", key);
        Ok(Some(NoteRecord::new(*key, &stored)))
    }

    fn persist(&self, notes: &NoteMap) -> Result<(), NoteStoreError> {
        let blob = serde_json::to_string(notes)?;
        self.retry
            .run(
                "save calendar notes",
                || self.storage.set(NOTES_STORAGE_KEY, &blob),
                |_| true,
            )
            .map_err(NoteStoreError::Persist)
    }

    /// Put the notifier back in line with `previous` after a failed save:
    /// re-arm its reminder, or withdraw one that was scheduled for the
    /// unsaved note. Failures are logged and the save error is reported.
    fn roll_back_reminder(&self, key: DateKey, previous: Option<&StoredNote>) {
        let result = match previous {
            Some(note) if note.has_notification => {
                self.notifier.schedule(&reminder_trigger(key, &note.note))
            }
            _ => self.notifier.cancel(&key.trigger_id()),
        };
        match result {
            Ok(()) => tracing::info!("Restored reminder state of {} after save failure", key),
            Err(e) => tracing::warn!(
                "Failed to restore reminder {} after save failure: {}",
                key.trigger_id(),
                e
            ),
        }
    }

    fn schedule_reminder(&self, key: DateKey, body: &str) -> Result<ReminderOutcome, NoteStoreError> {
        let trigger_id = key.trigger_id();
        let channel = Channel {
            id: REMINDER_CHANNEL_ID.to_string(),
            name: REMINDER_CHANNEL_NAME.to_string(),
            importance: Importance::High,
        };
        self.retry
            .run(
                "create reminder channel",
                || self.notifier.create_channel(&channel),
                NotifyError::is_retryable,
            )
            .map_err(|source| NoteStoreError::Schedule {
                trigger_id: trigger_id.clone(),
                source,
            })?;

        let trigger = reminder_trigger(key, body);
        match self.retry.run(
            "schedule reminder",
            || self.notifier.schedule(&trigger),
            NotifyError::is_retryable,
        ) {
            Ok(()) => {
                tracing::info!("Scheduled reminder {} at {}", trigger_id, trigger.fire_at);
                Ok(ReminderOutcome::Scheduled {
                    trigger_id,
                    fire_at: trigger.fire_at,
                })
            }
            Err(NotifyError::PastTrigger { fire_at }) => {
                tracing::warn!("Reminder {} rejected, {} is in the past", trigger_id, fire_at);
                Ok(ReminderOutcome::RejectedPast { fire_at })
            }
            Err(source) => Err(NoteStoreError::Schedule { trigger_id, source }),
        }
    }

    fn cancel_reminder(&self, key: DateKey) -> Result<(), NoteStoreError> {
        let trigger_id = key.trigger_id();
        self.retry
            .run(
                "cancel reminder",
                || self.notifier.cancel(&trigger_id),
                NotifyError::is_retryable,
            )
            .map_err(|source| NoteStoreError::Cancel {
                trigger_id: trigger_id.clone(),
                source,
            })
    }
}

fn reminder_trigger(key: DateKey, body: &str) -> Trigger {
    Trigger {
        id: key.trigger_id(),
        channel_id: REMINDER_CHANNEL_ID.to_string(),
        fire_at: key.reminder_time(),
        title: REMINDER_TITLE.to_string(),
        body: body.to_string(),
    }
}

impl<S, N> NoteIndex for NoteStore<S, N> {
    fn has_note(&self, key: &DateKey) -> bool {
        self.notes.contains_key(key)
    }
}
