use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{TodoItem, TodoStats};
use crate::ports::{KeyValueStore, StorageError};
use crate::retry::RetryPolicy;

pub const TODOS_STORAGE_KEY: &str = "todos";

#[derive(Debug, Error)]
pub enum TodoError {
    #[error("task text cannot be empty")]
    EmptyText,

    #[error("failed to save tasks: {0}")]
    Persist(#[source] StorageError),

    #[error("failed to encode tasks: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The task list, persisted as one JSON array in insertion order.
pub struct TodoList<S> {
    storage: S,
    retry: RetryPolicy,
    items: Vec<TodoItem>,
}

impl<S: KeyValueStore> TodoList<S> {
    pub fn open(storage: S, retry: RetryPolicy) -> Self {
        let mut list = Self {
            storage,
            retry,
            items: Vec::new(),
        };
        list.load();
        list
    }

    /// Reload from storage; unreadable state loads as an empty list.
    pub fn load(&mut self) -> &[TodoItem] {
        self.items = match self.storage.get(TODOS_STORAGE_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("Discarding unparsable task list: {}", e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to read task list, starting empty: {}", e);
                Vec::new()
            }
        };
        &self.items
    }

    pub fn items(&self) -> &[TodoItem] {
        &self.items
    }

    pub fn get(&self, id: Uuid) -> Option<&TodoItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn stats(&self) -> TodoStats {
        TodoStats {
            total: self.items.len(),
            completed: self.items.iter().filter(|item| item.completed).count(),
        }
    }

    pub fn add(&mut self, text: &str) -> Result<TodoItem, TodoError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TodoError::EmptyText);
        }

        let item = TodoItem {
            id: Uuid::new_v4(),
            text: text.to_string(),
            completed: false,
            created_at: Utc::now(),
        };
        let mut next = self.items.clone();
        next.push(item.clone());
        self.commit(next)?;

        tracing::info!("Added task {}", item.id);
        Ok(item)
    }

    /// Flip the completion state. Returns the updated item, or `None` if absent.
    pub fn toggle(&mut self, id: Uuid) -> Result<Option<TodoItem>, TodoError> {
        let Some(index) = self.items.iter().position(|item| item.id == id) else {
            return Ok(None);
        };

        let mut next = self.items.clone();
        next[index].completed = !next[index].completed;
        let updated = next[index].clone();
        self.commit(next)?;

        Ok(Some(updated))
    }

    pub fn delete(&mut self, id: Uuid) -> Result<bool, TodoError> {
        if self.get(id).is_none() {
            return Ok(false);
        }

        let next = self
            .items
            .iter()
            .filter(|item| item.id != id)
            .cloned()
            .collect();
        self.commit(next)?;

        tracing::info!("Deleted task {}", id);
        Ok(true)
    }

    fn commit(&mut self, next: Vec<TodoItem>) -> Result<(), TodoError> {
        let blob = serde_json::to_string(&next)?;
        self.retry
            .run(
                "save tasks",
                || self.storage.set(TODOS_STORAGE_KEY, &blob),
                |_| true,
            )
            .map_err(TodoError::Persist)?;
        self.items = next;
        Ok(())
    }
}
