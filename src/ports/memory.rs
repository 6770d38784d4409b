//! In-memory fakes of the capability ports.
//!
//! All fakes are cheap to clone and share their state between clones, so a
//! test can hand one clone to a store and inspect the other.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{Datelike, Duration, NaiveDateTime};

use crate::models::{MAX_YEAR, MIN_YEAR};

use super::{Channel, Clock, KeyValueStore, Notifier, NotifyError, StorageError, Trigger};

// ============================================================
// Clock
// ============================================================

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<NaiveDateTime>>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().expect("clock lock poisoned") = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().expect("clock lock poisoned")
    }
}

// ============================================================
// Key-value storage
// ============================================================

#[derive(Debug, Default)]
struct KvState {
    values: HashMap<String, String>,
    writes: usize,
    failing_writes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    state: Arc<Mutex<KvState>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw value without counting it as a write.
    pub fn insert_raw(&self, key: &str, value: &str) {
        let mut state = self.state.lock().expect("kv lock poisoned");
        state.values.insert(key.to_string(), value.to_string());
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        let state = self.state.lock().expect("kv lock poisoned");
        state.values.get(key).cloned()
    }

    /// Number of successful `set` calls.
    pub fn writes(&self) -> usize {
        self.state.lock().expect("kv lock poisoned").writes
    }

    /// Make the next `count` writes fail.
    pub fn fail_next_writes(&self, count: usize) {
        self.state.lock().expect("kv lock poisoned").failing_writes = count;
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.raw(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut state = self.state.lock().expect("kv lock poisoned");
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(StorageError::WriteRejected(key.to_string()));
        }
        state.values.insert(key.to_string(), value.to_string());
        state.writes += 1;
        Ok(())
    }
}

// ============================================================
// Notifications
// ============================================================

/// A call received by [`MemoryNotifier`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierCall {
    CreateChannel(String),
    Schedule(Trigger),
    Cancel(String),
}

#[derive(Debug, Default)]
struct NotifierState {
    channels: HashMap<String, Channel>,
    triggers: BTreeMap<String, Trigger>,
    calls: Vec<NotifierCall>,
    failing_calls: usize,
}

#[derive(Clone)]
pub struct MemoryNotifier {
    state: Arc<Mutex<NotifierState>>,
    clock: Arc<dyn Clock>,
}

impl MemoryNotifier {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(NotifierState::default())),
            clock,
        }
    }

    pub fn calls(&self) -> Vec<NotifierCall> {
        self.state.lock().expect("notifier lock poisoned").calls.clone()
    }

    /// Triggers passed to `schedule`, accepted or not.
    pub fn schedule_requests(&self) -> Vec<Trigger> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                NotifierCall::Schedule(trigger) => Some(trigger),
                _ => None,
            })
            .collect()
    }

    pub fn cancellations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                NotifierCall::Cancel(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Currently registered trigger with the given id.
    pub fn trigger(&self, id: &str) -> Option<Trigger> {
        let state = self.state.lock().expect("notifier lock poisoned");
        state.triggers.get(id).cloned()
    }

    pub fn active_triggers(&self) -> Vec<Trigger> {
        let state = self.state.lock().expect("notifier lock poisoned");
        state.triggers.values().cloned().collect()
    }

    /// Make the next `count` schedule/cancel calls fail with a backend error.
    pub fn fail_next_calls(&self, count: usize) {
        self.state.lock().expect("notifier lock poisoned").failing_calls = count;
    }

    fn take_failure(state: &mut NotifierState) -> Result<(), NotifyError> {
        if state.failing_calls > 0 {
            state.failing_calls -= 1;
            return Err(NotifyError::Backend("simulated failure".to_string()));
        }
        Ok(())
    }
}

impl Notifier for MemoryNotifier {
    fn create_channel(&self, channel: &Channel) -> Result<(), NotifyError> {
        let mut state = self.state.lock().expect("notifier lock poisoned");
        state
            .calls
            .push(NotifierCall::CreateChannel(channel.id.clone()));
        state.channels.insert(channel.id.clone(), channel.clone());
        Ok(())
    }

    fn schedule(&self, trigger: &Trigger) -> Result<(), NotifyError> {
        let now = self.clock.now();
        let mut state = self.state.lock().expect("notifier lock poisoned");
        state.calls.push(NotifierCall::Schedule(trigger.clone()));
        Self::take_failure(&mut state)?;

        if !state.channels.contains_key(&trigger.channel_id) {
            return Err(NotifyError::UnknownChannel(trigger.channel_id.clone()));
        }
        if trigger.fire_at <= now {
            return Err(NotifyError::PastTrigger {
                fire_at: trigger.fire_at,
            });
        }
        if !(MIN_YEAR..=MAX_YEAR).contains(&trigger.fire_at.year()) {
            return Err(NotifyError::OutOfRange {
                fire_at: trigger.fire_at,
            });
        }

        state.triggers.insert(trigger.id.clone(), trigger.clone());
        Ok(())
    }

    fn cancel(&self, id: &str) -> Result<(), NotifyError> {
        let mut state = self.state.lock().expect("notifier lock poisoned");
        state.calls.push(NotifierCall::Cancel(id.to_string()));
        Self::take_failure(&mut state)?;
        state.triggers.remove(id);
        Ok(())
    }
}
