use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A user's note as seen by the service and sent over the wire.
///
/// `(user_id, note_id)` is the primary key. Soft-deleted notes keep their
/// record with `is_deleted` set and `deleted_at` stamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Owner of the note, partition key
    pub user_id: String,
    /// Note ID, unique within the owner's partition
    pub note_id: String,
    /// Note title
    pub title: String,
    /// Note content
    pub content: String,
    /// Soft-delete flag
    pub is_deleted: bool,
    /// When the note was soft-deleted
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Builds a fresh, active note stamped with `now`.
    pub fn new(
        user_id: impl Into<String>,
        note_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            note_id: note_id.into(),
            title: title.into(),
            content: content.into(),
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
