//! Capability interfaces the stores depend on.
//!
//! Each capability has one production implementation ([`crate::db::Database`],
//! [`crate::notify::SqliteNotifier`], [`local::SystemClock`],
//! [`local::LocalFileSystem`]) and, where tests need isolation, an in-memory
//! fake in [`memory`].

pub mod local;
pub mod memory;

use std::io;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================
// Key-value storage
// ============================================================

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend failed: {0}")]
    Backend(String),

    #[error("storage write rejected for key {0}")]
    WriteRejected(String),
}

/// Durable key-value storage holding whole serialized blobs.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

// ============================================================
// Local notifications
// ============================================================

/// Delivery priority of a notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Low,
    Default,
    High,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Default => "default",
            Self::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "default" => Some(Self::Default),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub importance: Importance,
}

/// A one-shot, timestamp-based notification registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub id: String,
    pub channel_id: String,
    /// Local wall-clock time at which the trigger fires.
    pub fire_at: NaiveDateTime,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("trigger time {fire_at} is not in the future")]
    PastTrigger { fire_at: NaiveDateTime },

    #[error("trigger time {fire_at} is outside the supported years")]
    OutOfRange { fire_at: NaiveDateTime },

    #[error("unknown notification channel: {0}")]
    UnknownChannel(String),

    #[error("notification backend failed: {0}")]
    Backend(String),
}

impl NotifyError {
    /// Only backend failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

/// One-shot local notification capability.
///
/// `schedule` replaces any trigger registered under the same id and rejects
/// triggers that are not strictly in the future. `cancel` is idempotent.
pub trait Notifier: Send + Sync {
    fn create_channel(&self, channel: &Channel) -> Result<(), NotifyError>;
    fn schedule(&self, trigger: &Trigger) -> Result<(), NotifyError>;
    fn cancel(&self, id: &str) -> Result<(), NotifyError>;
}

// ============================================================
// Clock
// ============================================================

/// Local wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

// ============================================================
// File system
// ============================================================

pub trait FileSystem: Send + Sync {
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    fn exists(&self, path: &Path) -> bool;
    /// Copies `from` to `to`, returning the number of bytes written.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
}
