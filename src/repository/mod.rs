//! Partitioned note storage.
//!
//! Records are keyed by `(user_id, note_id)`. Stores return raw records,
//! soft-deleted ones included; visibility rules live in the service.

mod memory;
mod postgres;
mod resilient;

pub use memory::MemoryNoteStore;
pub use postgres::PgNoteStore;
pub use resilient::{ResilientStore, RetryPolicy};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use std::{error::Error as _, time::Duration};

use crate::models::Note;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(#[from] tokio_postgres::Error),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to migrate store: {0}")]
    Migration(#[from] refinery::Error),
}

impl StoreError {
    /// Whether repeating the call may succeed.
    ///
    /// Errors reported by the database itself (constraint violations, bad
    /// SQL) and row decoding failures are permanent; a closed connection, an
    /// I/O failure or a timeout is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Backend(e) => {
                e.is_closed() || e.source().is_some_and(|s| s.is::<std::io::Error>())
            }
            Self::Timeout(_) => true,
            Self::Migration(_) => false,
        }
    }
}

/// Row selection for [`NoteStore::query_by_user`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryFilter {
    All,
    /// Only rows where `is_deleted` is false or absent.
    Visible,
}

/// Predicate evaluated by the store against the current record at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    None,
    NotDeleted,
}

impl Precondition {
    pub const fn holds(self, is_deleted: bool) -> bool {
        match self {
            Self::None => true,
            Self::NotDeleted => !is_deleted,
        }
    }
}

/// Field assignments for a conditional update. `updated_at` is always written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    /// Marks the note deleted at this instant.
    pub deleted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl NoteChanges {
    pub fn edit(title: impl Into<String>, content: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            title: Some(title.into()),
            content: Some(content.into()),
            deleted_at: None,
            updated_at: now,
        }
    }

    pub const fn soft_delete(now: DateTime<Utc>) -> Self {
        Self {
            title: None,
            content: None,
            deleted_at: Some(now),
            updated_at: now,
        }
    }

    /// Applies the assignments to a record. `updated_at` never moves before
    /// `created_at`.
    pub fn apply_to(&self, record: &mut NoteRecord) {
        if let Some(title) = &self.title {
            record.title.clone_from(title);
        }
        if let Some(content) = &self.content {
            record.content.clone_from(content);
        }
        if let Some(deleted_at) = self.deleted_at {
            record.is_deleted = Some(true);
            record.deleted_at = Some(deleted_at);
        }
        record.updated_at = self.updated_at.max(record.created_at);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated(Note),
    /// No record exists under the key.
    Missing,
    /// The record exists but the precondition did not hold.
    PreconditionFailed,
}

/// A note as persisted.
///
/// Rows written before soft-delete existed carry no `is_deleted` value;
/// they decode as `None` here and become `false` on conversion to [`Note`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteRecord {
    pub user_id: String,
    pub note_id: String,
    pub title: String,
    pub content: String,
    pub is_deleted: Option<bool>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NoteRecord {
    pub fn is_deleted(&self) -> bool {
        self.is_deleted.unwrap_or(false)
    }
}

impl From<NoteRecord> for Note {
    fn from(record: NoteRecord) -> Self {
        let is_deleted = record.is_deleted();
        Self {
            user_id: record.user_id,
            note_id: record.note_id,
            title: record.title,
            content: record.content,
            is_deleted,
            deleted_at: record.deleted_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

impl From<&Note> for NoteRecord {
    fn from(note: &Note) -> Self {
        Self {
            user_id: note.user_id.clone(),
            note_id: note.note_id.clone(),
            title: note.title.clone(),
            content: note.content.clone(),
            is_deleted: Some(note.is_deleted),
            deleted_at: note.deleted_at,
            created_at: note.created_at,
            updated_at: note.updated_at,
        }
    }
}

#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Inserts or overwrites the full record.
    async fn put(&self, note: &Note) -> Result<(), StoreError>;

    /// Returns the records in a user's partition, in store order.
    async fn query_by_user(
        &self,
        user_id: &str,
        filter: QueryFilter,
    ) -> Result<Vec<Note>, StoreError>;

    /// Exact key lookup; soft-deleted records are returned as is.
    async fn get_by_key(&self, user_id: &str, note_id: &str) -> Result<Option<Note>, StoreError>;

    /// Applies `changes` only if `precondition` holds for the stored record.
    /// Never creates a record.
    async fn conditional_update(
        &self,
        user_id: &str,
        note_id: &str,
        changes: &NoteChanges,
        precondition: Precondition,
    ) -> Result<UpdateOutcome, StoreError>;
}
