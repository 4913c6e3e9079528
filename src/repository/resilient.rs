use async_trait::async_trait;

use std::{future::Future, time::Duration};

use crate::{
    models::Note,
    repository::{NoteChanges, NoteStore, Precondition, QueryFilter, StoreError, UpdateOutcome},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deadline for a single store call.
    pub call_timeout: Duration,
    /// Extra attempts after the first one fails with a transient error.
    pub max_retries: u32,
    /// Delay before the first retry, doubled on every further retry.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
            max_retries: 2,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Wraps a store with a per-call deadline and bounded retries.
///
/// Reads and puts are retried on transient errors. Conditional updates are
/// attempted once: a timed out attempt may still have been applied, and a
/// retried soft-delete would then report a precondition failure.
pub struct ResilientStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: NoteStore> ResilientStore<S> {
    pub const fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub const fn inner(&self) -> &S {
        &self.inner
    }

    async fn attempt<T, Fut>(&self, call: Fut) -> Result<T, StoreError>
    where
        Fut: Future<Output = Result<T, StoreError>> + Send,
    {
        tokio::time::timeout(self.policy.call_timeout, call)
            .await
            .unwrap_or(Err(StoreError::Timeout(self.policy.call_timeout)))
    }

    async fn with_retries<T, F, Fut>(&self, call: F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, StoreError>> + Send,
        T: Send,
    {
        let mut delay = self.policy.backoff;
        let mut retries = 0;

        loop {
            match self.attempt(call()).await {
                Err(e) if e.is_transient() && retries < self.policy.max_retries => {
                    retries += 1;
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl<S: NoteStore> NoteStore for ResilientStore<S> {
    async fn put(&self, note: &Note) -> Result<(), StoreError> {
        self.with_retries(|| self.inner.put(note)).await
    }

    async fn query_by_user(
        &self,
        user_id: &str,
        filter: QueryFilter,
    ) -> Result<Vec<Note>, StoreError> {
        self.with_retries(|| self.inner.query_by_user(user_id, filter))
            .await
    }

    async fn get_by_key(&self, user_id: &str, note_id: &str) -> Result<Option<Note>, StoreError> {
        self.with_retries(|| self.inner.get_by_key(user_id, note_id))
            .await
    }

    async fn conditional_update(
        &self,
        user_id: &str,
        note_id: &str,
        changes: &NoteChanges,
        precondition: Precondition,
    ) -> Result<UpdateOutcome, StoreError> {
        self.attempt(
            self.inner
                .conditional_update(user_id, note_id, changes, precondition),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryNoteStore;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` reads with a timeout, then delegates.
    struct FlakyStore {
        inner: MemoryNoteStore,
        failures: u32,
        calls: AtomicU32,
        delay: Option<Duration>,
    }

    impl FlakyStore {
        fn failing(failures: u32) -> Self {
            Self {
                inner: MemoryNoteStore::new(),
                failures,
                calls: AtomicU32::new(0),
                delay: None,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::failing(0)
            }
        }

        async fn hit(&self) -> Result<(), StoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if call < self.failures {
                return Err(StoreError::Timeout(Duration::ZERO));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl NoteStore for FlakyStore {
        async fn put(&self, note: &Note) -> Result<(), StoreError> {
            self.hit().await?;
            self.inner.put(note).await
        }

        async fn query_by_user(
            &self,
            user_id: &str,
            filter: QueryFilter,
        ) -> Result<Vec<Note>, StoreError> {
            self.hit().await?;
            self.inner.query_by_user(user_id, filter).await
        }

        async fn get_by_key(
            &self,
            user_id: &str,
            note_id: &str,
        ) -> Result<Option<Note>, StoreError> {
            self.hit().await?;
            self.inner.get_by_key(user_id, note_id).await
        }

        async fn conditional_update(
            &self,
            user_id: &str,
            note_id: &str,
            changes: &NoteChanges,
            precondition: Precondition,
        ) -> Result<UpdateOutcome, StoreError> {
            self.hit().await?;
            self.inner
                .conditional_update(user_id, note_id, changes, precondition)
                .await
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            call_timeout: Duration::from_millis(200),
            max_retries,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn transient_read_failures_are_retried() {
        let store = ResilientStore::new(FlakyStore::failing(2), policy(2));

        let notes = store.query_by_user("u1", QueryFilter::Visible).await.unwrap();

        assert!(notes.is_empty());
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let store = ResilientStore::new(FlakyStore::failing(5), policy(1));

        let err = store.get_by_key("u1", "n1").await.unwrap_err();

        assert!(matches!(err, StoreError::Timeout(_)));
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn conditional_updates_are_not_retried() {
        let store = ResilientStore::new(FlakyStore::failing(1), policy(3));

        let err = store
            .conditional_update(
                "u1",
                "n1",
                &NoteChanges::soft_delete(Utc::now()),
                Precondition::NotDeleted,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Timeout(_)));
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let store = ResilientStore::new(
            FlakyStore::slow(Duration::from_millis(500)),
            RetryPolicy {
                call_timeout: Duration::from_millis(10),
                max_retries: 0,
                backoff: Duration::ZERO,
            },
        );

        let err = store
            .put(&Note::new("u1", "n1", "t", "c", Utc::now()))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Timeout(d) if d == Duration::from_millis(10)));
    }
}
