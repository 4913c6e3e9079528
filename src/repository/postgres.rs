mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

use async_trait::async_trait;
use tokio_postgres::{Client, NoTls, Row};

use crate::{
    models::Note,
    repository::{
        NoteChanges, NoteRecord, NoteStore, Precondition, QueryFilter, StoreError, UpdateOutcome,
    },
};

const NOTE_COLUMNS: &str =
    "user_id, note_id, title, content, is_deleted, deleted_at, created_at, updated_at";

/// Note store on a Postgres table keyed by `(user_id, note_id)`.
///
/// `is_deleted` is nullable so rows that predate soft-delete keep reading
/// as active notes.
pub struct PgNoteStore {
    client: Client,
}

impl PgNoteStore {
    pub async fn connect(database_dsn: &str) -> Result<Self, StoreError> {
        let (client, con) = tokio_postgres::connect(database_dsn, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = con.await {
                tracing::error!("connection error: {}", e);
            }
        });

        Ok(Self { client })
    }

    pub async fn migrate(&mut self) -> Result<(), StoreError> {
        let migrations_report = embedded::migrations::runner()
            .run_async(&mut self.client)
            .await?;

        for migration in migrations_report.applied_migrations() {
            tracing::info!(
                "Migration Applied -  Name: {}, Version: {}",
                migration.name(),
                migration.version()
            );
        }

        tracing::info!("DB migrations finished!");

        Ok(())
    }

    async fn exists(&self, user_id: &str, note_id: &str) -> Result<bool, StoreError> {
        let row = self
            .client
            .query_opt(
                "SELECT 1 FROM notes WHERE user_id = $1 AND note_id = $2",
                &[&user_id, &note_id],
            )
            .await?;

        Ok(row.is_some())
    }
}

fn note_from_row(row: &Row) -> Result<Note, StoreError> {
    let record = NoteRecord {
        user_id: row.try_get("user_id")?,
        note_id: row.try_get("note_id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        is_deleted: row.try_get("is_deleted")?,
        deleted_at: row.try_get("deleted_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    };

    Ok(record.into())
}

#[async_trait]
impl NoteStore for PgNoteStore {
    async fn put(&self, note: &Note) -> Result<(), StoreError> {
        self.client
            .execute(
                "INSERT INTO notes (user_id, note_id, title, content, is_deleted, deleted_at, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (user_id, note_id) DO UPDATE SET \
                 title = EXCLUDED.title, content = EXCLUDED.content, \
                 is_deleted = EXCLUDED.is_deleted, deleted_at = EXCLUDED.deleted_at, \
                 created_at = EXCLUDED.created_at, updated_at = EXCLUDED.updated_at",
                &[
                    &note.user_id,
                    &note.note_id,
                    &note.title,
                    &note.content,
                    &note.is_deleted,
                    &note.deleted_at,
                    &note.created_at,
                    &note.updated_at,
                ],
            )
            .await?;

        Ok(())
    }

    async fn query_by_user(
        &self,
        user_id: &str,
        filter: QueryFilter,
    ) -> Result<Vec<Note>, StoreError> {
        let query = match filter {
            QueryFilter::All => format!("SELECT {NOTE_COLUMNS} FROM notes WHERE user_id = $1"),
            QueryFilter::Visible => format!(
                "SELECT {NOTE_COLUMNS} FROM notes WHERE user_id = $1 \
                 AND (is_deleted = FALSE OR is_deleted IS NULL)"
            ),
        };

        let rows = self.client.query(query.as_str(), &[&user_id]).await?;

        rows.iter().map(note_from_row).collect()
    }

    async fn get_by_key(&self, user_id: &str, note_id: &str) -> Result<Option<Note>, StoreError> {
        let query = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE user_id = $1 AND note_id = $2");
        let row = self
            .client
            .query_opt(query.as_str(), &[&user_id, &note_id])
            .await?;

        row.as_ref().map(note_from_row).transpose()
    }

    async fn conditional_update(
        &self,
        user_id: &str,
        note_id: &str,
        changes: &NoteChanges,
        precondition: Precondition,
    ) -> Result<UpdateOutcome, StoreError> {
        let unconditional = precondition == Precondition::None;
        let query = format!(
            "UPDATE notes SET \
             title = COALESCE($3, title), \
             content = COALESCE($4, content), \
             is_deleted = CASE WHEN $5::timestamptz IS NULL THEN is_deleted ELSE TRUE END, \
             deleted_at = COALESCE($5, deleted_at), \
             updated_at = GREATEST($6, created_at) \
             WHERE user_id = $1 AND note_id = $2 \
             AND ($7 OR is_deleted = FALSE OR is_deleted IS NULL) \
             RETURNING {NOTE_COLUMNS}"
        );

        let row = self
            .client
            .query_opt(
                query.as_str(),
                &[
                    &user_id,
                    &note_id,
                    &changes.title,
                    &changes.content,
                    &changes.deleted_at,
                    &changes.updated_at,
                    &unconditional,
                ],
            )
            .await?;

        if let Some(row) = row {
            return Ok(UpdateOutcome::Updated(note_from_row(&row)?));
        }

        if self.exists(user_id, note_id).await? {
            Ok(UpdateOutcome::PreconditionFailed)
        } else {
            Ok(UpdateOutcome::Missing)
        }
    }
}
