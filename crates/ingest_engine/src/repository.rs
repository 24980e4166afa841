use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{ImageRef, WorkSummary};

pub type WorkId = i64;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("api returned status {status} for {url}")]
    Api { status: u16, url: String },
    #[error("api transport error: {0}")]
    Transport(String),
}

/// Durable store for works, chapters and image references. Backed by
/// either the relational adapter or the remote content API; the sync
/// engine only ever talks to this trait.
///
/// Every write is a single transaction on the backend; a chapter's image
/// list is never spread across multiple uncommitted writes.
#[async_trait::async_trait]
pub trait Repository: Send + Sync {
    /// Create or update a work, keyed by slug. Idempotent.
    async fn upsert_work(&self, summary: &WorkSummary) -> Result<WorkId, RepoError>;

    async fn last_synced_at(&self, slug: &str) -> Result<Option<DateTime<Utc>>, RepoError>;

    async fn chapter_exists(&self, work: WorkId, chapter_number: f64) -> Result<bool, RepoError>;

    /// Create or update a chapter and replace its image list. Keyed by
    /// `(work, chapter_number)`; a re-sync updates in place.
    async fn upsert_chapter(
        &self,
        work: WorkId,
        chapter_number: f64,
        title: &str,
        images: &[ImageRef],
    ) -> Result<i64, RepoError>;

    async fn mark_synchronized(&self, work: WorkId, at: DateTime<Utc>) -> Result<(), RepoError>;
}

/// Discards all writes. Backs the CLI's `--skip-store` mode, where a run
/// only exercises extraction and the image store.
#[derive(Debug, Default)]
pub struct NoopRepository;

#[async_trait::async_trait]
impl Repository for NoopRepository {
    async fn upsert_work(&self, _summary: &WorkSummary) -> Result<WorkId, RepoError> {
        Ok(0)
    }

    async fn last_synced_at(&self, _slug: &str) -> Result<Option<DateTime<Utc>>, RepoError> {
        Ok(None)
    }

    async fn chapter_exists(&self, _work: WorkId, _chapter_number: f64) -> Result<bool, RepoError> {
        Ok(false)
    }

    async fn upsert_chapter(
        &self,
        _work: WorkId,
        _chapter_number: f64,
        _title: &str,
        _images: &[ImageRef],
    ) -> Result<i64, RepoError> {
        Ok(0)
    }

    async fn mark_synchronized(&self, _work: WorkId, _at: DateTime<Utc>) -> Result<(), RepoError> {
        Ok(())
    }
}
