use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

/// A saved document the user can later select as a report source.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DocumentRow {
    pub id: i64,
    pub name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[tracing::instrument(name = "db.documents.list", skip(pool))]
pub async fn list_documents(pool: &PgPool) -> Result<Vec<DocumentRow>, sqlx::Error> {
    sqlx::query_as::<_, DocumentRow>(
        "SELECT id, name, content, created_at FROM documents ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await
}

#[tracing::instrument(
    name = "db.documents.save",
    skip(pool, content),
    fields(document.content_chars = content.chars().count())
)]
pub async fn save_document(
    pool: &PgPool,
    name: &str,
    content: &str,
) -> Result<DocumentRow, sqlx::Error> {
    sqlx::query_as::<_, DocumentRow>(
        "INSERT INTO documents (name, content) VALUES ($1, $2) \
         RETURNING id, name, content, created_at",
    )
    .bind(name)
    .bind(content)
    .fetch_one(pool)
    .await
}

/// Returns `false` when no document had this id.
#[tracing::instrument(name = "db.documents.delete", skip(pool))]
pub async fn delete_document(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM documents WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
