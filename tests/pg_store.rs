//! Postgres store tests. They run only when `PG_DSN` points at a database
//! the tests may write to; otherwise each test returns early.

use chrono::{TimeDelta, Utc};
use tokio::sync::Mutex;
use tokio_postgres::NoTls;
use uuid::Uuid;

use std::sync::{Arc, LazyLock};

use notes_api::{
    models::Note,
    repository::{NoteChanges, NoteStore, PgNoteStore, Precondition, QueryFilter, UpdateOutcome},
};

static MIGRATED: LazyLock<Mutex<bool>> = LazyLock::new(|| Mutex::new(false));

fn dsn() -> Option<String> {
    let dsn = std::env::var("PG_DSN").ok();
    if dsn.is_none() {
        eprintln!("PG_DSN not set, skipping Postgres store test");
    }
    dsn
}

async fn store(dsn: &str) -> PgNoteStore {
    let mut store = PgNoteStore::connect(dsn).await.expect("connect");

    let mut migrated = MIGRATED.lock().await;
    if !*migrated {
        store.migrate().await.expect("migrate");
        *migrated = true;
    }

    store
}

fn fresh_user() -> String {
    format!("pg-test-{}", Uuid::new_v4())
}

/// Writes a row the way it looked before soft delete existed.
async fn insert_legacy_row(dsn: &str, user_id: &str, note_id: &str) {
    let (client, con) = tokio_postgres::connect(dsn, NoTls).await.expect("connect");
    tokio::spawn(con);

    let now = Utc::now();
    client
        .execute(
            "INSERT INTO notes (user_id, note_id, title, content, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5)",
            &[&user_id, &note_id, &"legacy", &"legacy body", &now],
        )
        .await
        .expect("insert legacy row");
}

#[tokio::test]
async fn visible_filter_matches_filtering_afterwards() {
    let Some(dsn) = dsn() else { return };
    let store = store(&dsn).await;
    let user = fresh_user();

    store.put(&Note::new(&user, "a", "A", "a", Utc::now())).await.unwrap();
    store.put(&Note::new(&user, "b", "B", "b", Utc::now())).await.unwrap();
    store.put(&Note::new(&user, "c", "C", "c", Utc::now())).await.unwrap();
    insert_legacy_row(&dsn, &user, "legacy").await;
    let delete = NoteChanges::soft_delete(Utc::now());
    let outcome = store
        .conditional_update(&user, "c", &delete, Precondition::NotDeleted)
        .await
        .unwrap();
    assert!(matches!(outcome, UpdateOutcome::Updated(_)));

    let all = store.query_by_user(&user, QueryFilter::All).await.unwrap();
    let visible = store.query_by_user(&user, QueryFilter::Visible).await.unwrap();

    let mut filtered: Vec<String> = all
        .iter()
        .filter(|note| !note.is_deleted)
        .map(|note| note.note_id.clone())
        .collect();
    let mut visible_ids: Vec<String> = visible.iter().map(|note| note.note_id.clone()).collect();
    filtered.sort();
    visible_ids.sort();

    assert_eq!(all.len(), 4);
    assert_eq!(visible_ids, ["a", "b", "legacy"]);
    assert_eq!(visible_ids, filtered);
}

#[tokio::test]
async fn legacy_row_reads_as_active_and_can_be_deleted() {
    let Some(dsn) = dsn() else { return };
    let store = store(&dsn).await;
    let user = fresh_user();
    insert_legacy_row(&dsn, &user, "old").await;

    let note = store.get_by_key(&user, "old").await.unwrap().expect("row exists");
    assert!(!note.is_deleted);
    assert_eq!(note.deleted_at, None);

    let delete = NoteChanges::soft_delete(Utc::now());
    let outcome = store
        .conditional_update(&user, "old", &delete, Precondition::NotDeleted)
        .await
        .unwrap();

    let UpdateOutcome::Updated(deleted) = outcome else {
        panic!("expected update, got {outcome:?}");
    };
    assert!(deleted.is_deleted);
    assert!(deleted.deleted_at.is_some());
}

#[tokio::test]
async fn conditional_update_separates_missing_from_precondition_failure() {
    let Some(dsn) = dsn() else { return };
    let store = store(&dsn).await;
    let user = fresh_user();
    store.put(&Note::new(&user, "n1", "T", "C", Utc::now())).await.unwrap();
    let delete = NoteChanges::soft_delete(Utc::now());

    let first = store
        .conditional_update(&user, "n1", &delete, Precondition::NotDeleted)
        .await
        .unwrap();
    assert!(matches!(first, UpdateOutcome::Updated(_)));

    let second = store
        .conditional_update(&user, "n1", &delete, Precondition::NotDeleted)
        .await
        .unwrap();
    assert_eq!(second, UpdateOutcome::PreconditionFailed);

    let missing = store
        .conditional_update(&user, "nope", &delete, Precondition::NotDeleted)
        .await
        .unwrap();
    assert_eq!(missing, UpdateOutcome::Missing);

    let other_partition = store
        .conditional_update(&fresh_user(), "n1", &delete, Precondition::NotDeleted)
        .await
        .unwrap();
    assert_eq!(other_partition, UpdateOutcome::Missing);
}

#[tokio::test]
async fn update_never_creates_a_row() {
    let Some(dsn) = dsn() else { return };
    let store = store(&dsn).await;
    let user = fresh_user();

    let edit = NoteChanges::edit("T", "C", Utc::now());
    let outcome = store
        .conditional_update(&user, "ghost", &edit, Precondition::None)
        .await
        .unwrap();

    assert_eq!(outcome, UpdateOutcome::Missing);
    assert!(store.get_by_key(&user, "ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn updated_at_is_clamped_to_created_at() {
    let Some(dsn) = dsn() else { return };
    let store = store(&dsn).await;
    let user = fresh_user();
    let created = Utc::now();
    store.put(&Note::new(&user, "n1", "T", "C", created)).await.unwrap();

    let edit = NoteChanges::edit("new", "new body", created - TimeDelta::seconds(60));
    let outcome = store
        .conditional_update(&user, "n1", &edit, Precondition::NotDeleted)
        .await
        .unwrap();

    let UpdateOutcome::Updated(note) = outcome else {
        panic!("expected update, got {outcome:?}");
    };
    assert_eq!(note.title, "new");
    assert_eq!(note.content, "new body");
    assert_eq!(note.updated_at, note.created_at);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deletes_have_one_winner() {
    let Some(dsn) = dsn() else { return };
    let store = Arc::new(store(&dsn).await);
    let user = fresh_user();
    store.put(&Note::new(&user, "n1", "T", "C", Utc::now())).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let user = user.clone();
            tokio::spawn(async move {
                store
                    .conditional_update(
                        &user,
                        "n1",
                        &NoteChanges::soft_delete(Utc::now()),
                        Precondition::NotDeleted,
                    )
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            UpdateOutcome::Updated(_) => winners += 1,
            UpdateOutcome::PreconditionFailed => {}
            UpdateOutcome::Missing => panic!("note vanished"),
        }
    }

    assert_eq!(winners, 1);
}
