//! Notification triggers kept in the application database.
//!
//! [`SqliteNotifier`] is the production [`Notifier`]: triggers are rows in
//! `notification_triggers`, and delivery means draining the due rows with
//! [`SqliteNotifier::deliver_due`] (the `reminders due` command does this).

use std::sync::Arc;

use anyhow::Result;

use crate::db::{fire_at_in_range, Database};
use crate::ports::{Channel, Clock, Notifier, NotifyError, Trigger};

#[derive(Clone)]
pub struct SqliteNotifier {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl SqliteNotifier {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Registered triggers that have not fired yet.
    pub fn pending(&self) -> Result<Vec<Trigger>> {
        self.db.pending_triggers()
    }

    /// Fire every trigger whose time has come. Each trigger is returned once.
    pub fn deliver_due(&self) -> Result<Vec<Trigger>> {
        let due = self.db.take_due_triggers(self.clock.now())?;
        for trigger in &due {
            tracing::info!(
                "Delivering reminder {} ({}): {}",
                trigger.id,
                trigger.fire_at,
                trigger.body
            );
        }
        Ok(due)
    }
}

fn backend(e: anyhow::Error) -> NotifyError {
    NotifyError::Backend(format!("{:#}", e))
}

impl Notifier for SqliteNotifier {
    fn create_channel(&self, channel: &Channel) -> Result<(), NotifyError> {
        self.db.upsert_channel(channel).map_err(backend)
    }

    fn schedule(&self, trigger: &Trigger) -> Result<(), NotifyError> {
        if trigger.fire_at <= self.clock.now() {
            return Err(NotifyError::PastTrigger {
                fire_at: trigger.fire_at,
            });
        }
        if !fire_at_in_range(trigger.fire_at) {
            return Err(NotifyError::OutOfRange {
                fire_at: trigger.fire_at,
            });
        }
        if self.db.get_channel(&trigger.channel_id).map_err(backend)?.is_none() {
            return Err(NotifyError::UnknownChannel(trigger.channel_id.clone()));
        }
        self.db.upsert_trigger(trigger).map_err(backend)
    }

    fn cancel(&self, id: &str) -> Result<(), NotifyError> {
        let removed = self.db.delete_trigger(id).map_err(backend)?;
        if !removed {
            tracing::debug!("Cancel of unknown reminder {} ignored", id);
        }
        Ok(())
    }
}
