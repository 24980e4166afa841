use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::repository::{RepoError, Repository, WorkId};
use crate::types::{ImageRef, WorkSummary};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS comics (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    slug            TEXT NOT NULL UNIQUE,
    title           TEXT NOT NULL,
    author          TEXT NOT NULL,
    status          TEXT NOT NULL,
    cover           TEXT NOT NULL,
    genres          TEXT NOT NULL,
    views           TEXT NOT NULL,
    likes           TEXT NOT NULL,
    follows         TEXT NOT NULL,
    last_synced_at  TEXT
);
CREATE TABLE IF NOT EXISTS chapters (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    comic_id        INTEGER NOT NULL REFERENCES comics(id),
    chapter_number  REAL NOT NULL,
    title           TEXT NOT NULL,
    UNIQUE (comic_id, chapter_number)
);
CREATE TABLE IF NOT EXISTS chapter_images (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    chapter_id      INTEGER NOT NULL REFERENCES chapters(id),
    page_number     INTEGER NOT NULL,
    image_path      TEXT NOT NULL,
    source_url      TEXT NOT NULL
);
";

/// Relational adapter over SQLite. A single pooled connection keeps the
/// writes serialized; each repository operation is one transaction.
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Connect and apply the schema. `url` accepts the usual sqlx forms,
    /// e.g. `sqlite://comics.db?mode=rwc` or `sqlite::memory:`.
    pub async fn connect(url: &str) -> Result<Self, RepoError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await?;
        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl Repository for SqliteRepository {
    async fn upsert_work(&self, summary: &WorkSummary) -> Result<WorkId, RepoError> {
        let genres = serde_json::to_string(&summary.genres)
            .map_err(|err| RepoError::Transport(err.to_string()))?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO comics (slug, title, author, status, cover, genres, views, likes, follows)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (slug) DO UPDATE SET
                 title = excluded.title,
                 author = excluded.author,
                 status = excluded.status,
                 cover = excluded.cover,
                 genres = excluded.genres,
                 views = excluded.views,
                 likes = excluded.likes,
                 follows = excluded.follows",
        )
        .bind(&summary.slug)
        .bind(&summary.title)
        .bind(&summary.author)
        .bind(summary.status.as_str())
        .bind(&summary.cover)
        .bind(&genres)
        .bind(&summary.views)
        .bind(&summary.likes)
        .bind(&summary.follows)
        .execute(&mut *tx)
        .await?;

        let id: i64 = sqlx::query_scalar("SELECT id FROM comics WHERE slug = ?1")
            .bind(&summary.slug)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn last_synced_at(&self, slug: &str) -> Result<Option<DateTime<Utc>>, RepoError> {
        let row: Option<Option<DateTime<Utc>>> =
            sqlx::query_scalar("SELECT last_synced_at FROM comics WHERE slug = ?1")
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.flatten())
    }

    async fn chapter_exists(&self, work: WorkId, chapter_number: f64) -> Result<bool, RepoError> {
        let id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM chapters WHERE comic_id = ?1 AND chapter_number = ?2",
        )
        .bind(work)
        .bind(chapter_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id.is_some())
    }

    async fn upsert_chapter(
        &self,
        work: WorkId,
        chapter_number: f64,
        title: &str,
        images: &[ImageRef],
    ) -> Result<i64, RepoError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO chapters (comic_id, chapter_number, title)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (comic_id, chapter_number) DO UPDATE SET title = excluded.title",
        )
        .bind(work)
        .bind(chapter_number)
        .bind(title)
        .execute(&mut *tx)
        .await?;

        let chapter_id: i64 = sqlx::query_scalar(
            "SELECT id FROM chapters WHERE comic_id = ?1 AND chapter_number = ?2",
        )
        .bind(work)
        .bind(chapter_number)
        .fetch_one(&mut *tx)
        .await?;

        // A re-harvest supersedes the previous image list wholesale.
        sqlx::query("DELETE FROM chapter_images WHERE chapter_id = ?1")
            .bind(chapter_id)
            .execute(&mut *tx)
            .await?;
        for image in images {
            sqlx::query(
                "INSERT INTO chapter_images (chapter_id, page_number, image_path, source_url)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(chapter_id)
            .bind(i64::from(image.page_number))
            .bind(&image.path)
            .bind(&image.source_url)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(chapter_id)
    }

    async fn mark_synchronized(&self, work: WorkId, at: DateTime<Utc>) -> Result<(), RepoError> {
        sqlx::query("UPDATE comics SET last_synced_at = ?1 WHERE id = ?2")
            .bind(at)
            .bind(work)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

impl SqliteRepository {
    /// Image rows for one chapter, page order. Inspection helper; not part
    /// of the `Repository` capability.
    pub async fn chapter_images(&self, chapter_id: i64) -> Result<Vec<ImageRef>, RepoError> {
        let rows: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT page_number, image_path, source_url
             FROM chapter_images WHERE chapter_id = ?1 ORDER BY page_number",
        )
        .bind(chapter_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(page, path, source_url)| ImageRef {
                page_number: page as u32,
                path,
                source_url,
            })
            .collect())
    }
}
