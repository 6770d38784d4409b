mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::models::{MAX_YEAR, MIN_YEAR};
use crate::ports::{Channel, Importance, KeyValueStore, StorageError, Trigger};

const FIRE_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        Self::open(default_path()?)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Key-value operations
    // ============================================================

    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let value = conn
            .query_row("SELECT value FROM kv_store WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            (key, value, Utc::now().to_rfc3339()),
        )?;
        Ok(())
    }

    // ============================================================
    // Notification operations
    // ============================================================

    pub fn upsert_channel(&self, channel: &Channel) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "INSERT INTO notification_channels (id, name, importance, created_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, importance = excluded.importance",
            (
                &channel.id,
                &channel.name,
                channel.importance.as_str(),
                Utc::now().to_rfc3339(),
            ),
        )?;
        Ok(())
    }

    pub fn get_channel(&self, id: &str) -> Result<Option<Channel>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let channel = conn
            .query_row(
                "SELECT id, name, importance FROM notification_channels WHERE id = ?",
                [id],
                |row| {
                    Ok(Channel {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        importance: Importance::from_str(&row.get::<_, String>(2)?)
                            .unwrap_or(Importance::Default),
                    })
                },
            )
            .optional()?;
        Ok(channel)
    }

    /// Register a trigger, replacing any trigger with the same id.
    pub fn upsert_trigger(&self, trigger: &Trigger) -> Result<()> {
        if !fire_at_in_range(trigger.fire_at) {
            anyhow::bail!(
                "Trigger {} fires outside years {}..={}",
                trigger.id,
                MIN_YEAR,
                MAX_YEAR
            );
        }
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "INSERT INTO notification_triggers (id, channel_id, fire_at, title, body, created_at, delivered_at)
             VALUES (?, ?, ?, ?, ?, ?, NULL)
             ON CONFLICT(id) DO UPDATE SET
                channel_id = excluded.channel_id,
                fire_at = excluded.fire_at,
                title = excluded.title,
                body = excluded.body,
                created_at = excluded.created_at,
                delivered_at = NULL",
            (
                &trigger.id,
                &trigger.channel_id,
                format_fire_at(trigger.fire_at),
                &trigger.title,
                &trigger.body,
                Utc::now().to_rfc3339(),
            ),
        )?;
        Ok(())
    }

    pub fn delete_trigger(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM notification_triggers WHERE id = ?", [id])?;
        Ok(rows > 0)
    }

    pub fn get_trigger(&self, id: &str) -> Result<Option<Trigger>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let trigger = conn
            .query_row(
                "SELECT id, channel_id, fire_at, title, body FROM notification_triggers WHERE id = ?",
                [id],
                trigger_from_row,
            )
            .optional()?;
        Ok(trigger)
    }

    /// Undelivered triggers ordered by fire time.
    pub fn pending_triggers(&self) -> Result<Vec<Trigger>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, channel_id, fire_at, title, body FROM notification_triggers
             WHERE delivered_at IS NULL ORDER BY fire_at, id",
        )?;
        let triggers = stmt
            .query_map([], trigger_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(triggers)
    }

    /// Mark every undelivered trigger due at `now` as delivered and return them.
    pub fn take_due_triggers(&self, now: NaiveDateTime) -> Result<Vec<Trigger>> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        let cutoff = format_fire_at(now.min(latest_fire_at()));

        let due = {
            let mut stmt = tx.prepare(
                "SELECT id, channel_id, fire_at, title, body FROM notification_triggers
                 WHERE delivered_at IS NULL AND fire_at <= ? ORDER BY fire_at, id",
            )?;
            let rows = stmt
                .query_map([&cutoff], trigger_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let delivered_at = Utc::now().to_rfc3339();
        for trigger in &due {
            tx.execute(
                "UPDATE notification_triggers SET delivered_at = ? WHERE id = ?",
                (&delivered_at, &trigger.id),
            )?;
        }
        tx.commit()?;

        Ok(due)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

impl KeyValueStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.kv_get(key)
            .map_err(|e| StorageError::Backend(format!("{:#}", e)))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.kv_set(key, value)
            .map_err(|e| StorageError::Backend(format!("{:#}", e)))
    }
}

/// `<data dir>/pal-pan.db` for the current user.
pub fn default_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "pal-pan")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
    Ok(dirs.data_dir().join("pal-pan.db"))
}

/// Stored fire times compare as text, which only orders four-digit years.
pub fn fire_at_in_range(at: NaiveDateTime) -> bool {
    (MIN_YEAR..=MAX_YEAR).contains(&at.year())
}

fn latest_fire_at() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(MAX_YEAR, 12, 31)
        .and_then(|date| date.and_hms_opt(23, 59, 59))
        .unwrap_or(NaiveDateTime::MAX)
}

fn format_fire_at(at: NaiveDateTime) -> String {
    at.format(FIRE_AT_FORMAT).to_string()
}

fn trigger_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Trigger> {
    let fire_at: String = row.get(2)?;
    let fire_at = NaiveDateTime::parse_from_str(&fire_at, FIRE_AT_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Trigger {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        fire_at,
        title: row.get(3)?,
        body: row.get(4)?,
    })
}
