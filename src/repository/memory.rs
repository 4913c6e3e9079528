use async_trait::async_trait;
use tokio::sync::RwLock;

use std::collections::{BTreeMap, HashMap};

use crate::{
    models::Note,
    repository::{
        NoteChanges, NoteRecord, NoteStore, Precondition, QueryFilter, StoreError, UpdateOutcome,
    },
};

/// In-process note store, one ordered partition per user.
///
/// Each conditional update checks and writes under a single write lock, so
/// it is atomic with respect to other calls on the same store.
#[derive(Default)]
pub struct MemoryNoteStore {
    partitions: RwLock<HashMap<String, BTreeMap<String, NoteRecord>>>,
}

impl MemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a raw record, bypassing the note model. Lets callers seed rows
    /// in shapes the service never produces, such as a missing `is_deleted`.
    pub async fn insert_record(&self, record: NoteRecord) {
        self.partitions
            .write()
            .await
            .entry(record.user_id.clone())
            .or_default()
            .insert(record.note_id.clone(), record);
    }

    pub async fn record(&self, user_id: &str, note_id: &str) -> Option<NoteRecord> {
        self.partitions
            .read()
            .await
            .get(user_id)
            .and_then(|partition| partition.get(note_id))
            .cloned()
    }
}

#[async_trait]
impl NoteStore for MemoryNoteStore {
    async fn put(&self, note: &Note) -> Result<(), StoreError> {
        self.insert_record(NoteRecord::from(note)).await;
        Ok(())
    }

    async fn query_by_user(
        &self,
        user_id: &str,
        filter: QueryFilter,
    ) -> Result<Vec<Note>, StoreError> {
        let partitions = self.partitions.read().await;
        let Some(partition) = partitions.get(user_id) else {
            return Ok(Vec::new());
        };

        Ok(partition
            .values()
            .filter(|record| filter == QueryFilter::All || !record.is_deleted())
            .cloned()
            .map(Note::from)
            .collect())
    }

    async fn get_by_key(&self, user_id: &str, note_id: &str) -> Result<Option<Note>, StoreError> {
        Ok(self.record(user_id, note_id).await.map(Note::from))
    }

    async fn conditional_update(
        &self,
        user_id: &str,
        note_id: &str,
        changes: &NoteChanges,
        precondition: Precondition,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut partitions = self.partitions.write().await;
        let Some(record) = partitions
            .get_mut(user_id)
            .and_then(|partition| partition.get_mut(note_id))
        else {
            return Ok(UpdateOutcome::Missing);
        };

        if !precondition.holds(record.is_deleted()) {
            return Ok(UpdateOutcome::PreconditionFailed);
        }

        changes.apply_to(record);
        Ok(UpdateOutcome::Updated(Note::from(record.clone())))
    }
}
