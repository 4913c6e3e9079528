//! Note lifecycle.
//!
//! A note is created active, may be edited while active, and is soft-deleted
//! exactly once. Deleted notes stay in the store but are invisible to every
//! read: fetching, editing or deleting one again reports `NotFound`.

use chrono::Utc;
use uuid::Uuid;

use std::sync::Arc;

use crate::{
    models::Note,
    repository::{NoteChanges, NoteStore, Precondition, QueryFilter, StoreError, UpdateOutcome},
    validation::{self, ValidationError},
};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("note not found")]
    NotFound,

    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct NoteService {
    store: Arc<dyn NoteStore>,
}

impl NoteService {
    pub fn new(store: Arc<dyn NoteStore>) -> Self {
        Self { store }
    }

    pub async fn create_note(
        &self,
        user_id: &str,
        title: &str,
        content: &str,
    ) -> Result<Note, ServiceError> {
        validation::validate(user_id, title, content)?;

        let note = Note::new(
            user_id,
            Uuid::new_v4().to_string(),
            title.trim(),
            content.trim(),
            Utc::now(),
        );
        self.store.put(&note).await?;

        Ok(note)
    }

    /// Lists the user's visible notes in store order.
    pub async fn get_notes_by_user(&self, user_id: &str) -> Result<Vec<Note>, ServiceError> {
        let mut notes = self
            .store
            .query_by_user(user_id, QueryFilter::Visible)
            .await?;
        notes.retain(|note| !note.is_deleted);

        Ok(notes)
    }

    pub async fn get_note(&self, user_id: &str, note_id: &str) -> Result<Note, ServiceError> {
        match self.store.get_by_key(user_id, note_id).await? {
            Some(note) if !note.is_deleted => Ok(note),
            _ => Err(ServiceError::NotFound),
        }
    }

    /// Replaces title and content of an active note.
    pub async fn update_note(
        &self,
        user_id: &str,
        note_id: &str,
        title: &str,
        content: &str,
    ) -> Result<Note, ServiceError> {
        validation::validate(user_id, title, content)?;

        let changes = NoteChanges::edit(title.trim(), content.trim(), Utc::now());
        self.apply(user_id, note_id, &changes).await
    }

    /// Soft-deletes an active note and returns the deleted record.
    ///
    /// The check and the write are one conditional update, so of several
    /// concurrent deletes exactly one succeeds and the rest see `NotFound`.
    pub async fn delete_note(&self, user_id: &str, note_id: &str) -> Result<Note, ServiceError> {
        let changes = NoteChanges::soft_delete(Utc::now());
        self.apply(user_id, note_id, &changes).await
    }

    async fn apply(
        &self,
        user_id: &str,
        note_id: &str,
        changes: &NoteChanges,
    ) -> Result<Note, ServiceError> {
        let outcome = self
            .store
            .conditional_update(user_id, note_id, changes, Precondition::NotDeleted)
            .await?;

        match outcome {
            UpdateOutcome::Updated(note) => Ok(note),
            UpdateOutcome::Missing | UpdateOutcome::PreconditionFailed => {
                Err(ServiceError::NotFound)
            }
        }
    }
}
