use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use crate::repository::{RepoError, Repository, WorkId};
use crate::types::{format_chapter_number, ImageRef, WorkSummary};

#[derive(Debug, Serialize)]
struct UpsertWorkRequest<'a> {
    slug: &'a str,
    title: &'a str,
    author: &'a str,
    status: &'a str,
    cover: &'a str,
    genres: &'a [String],
    views: &'a str,
    likes: &'a str,
    follows: &'a str,
}

#[derive(Debug, Deserialize)]
struct WorkResponse {
    id: i64,
    #[serde(default)]
    last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct UpsertChapterRequest<'a> {
    chapter_number: f64,
    title: &'a str,
    images: Vec<ImageBody<'a>>,
}

#[derive(Debug, Serialize)]
struct ImageBody<'a> {
    page_number: u32,
    image_path: &'a str,
    source_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChapterResponse {
    id: i64,
}

#[derive(Debug, Serialize)]
struct MarkSynchronizedRequest {
    last_synced_at: DateTime<Utc>,
}

/// Repository adapter for the remote story-service REST API. Each call is
/// one request; the server side commits atomically per request.
pub struct HttpApiRepository {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApiRepository {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { client, base_url }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, RepoError> {
        let status = response.status();
        info!("{} {} {}", response.url(), status.as_u16(), status);
        if !status.is_success() {
            return Err(RepoError::Api {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        Ok(response)
    }

    async fn fetch_work(&self, slug: &str) -> Result<Option<WorkResponse>, RepoError> {
        let url = self.endpoint(&format!("/api/comics/{slug}"));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| RepoError::Transport(err.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response).await?;
        let work = response
            .json::<WorkResponse>()
            .await
            .map_err(|err| RepoError::Transport(err.to_string()))?;
        Ok(Some(work))
    }
}

#[async_trait::async_trait]
impl Repository for HttpApiRepository {
    async fn upsert_work(&self, summary: &WorkSummary) -> Result<WorkId, RepoError> {
        let url = self.endpoint(&format!("/api/comics/{}", summary.slug));
        let body = UpsertWorkRequest {
            slug: &summary.slug,
            title: &summary.title,
            author: &summary.author,
            status: summary.status.as_str(),
            cover: &summary.cover,
            genres: &summary.genres,
            views: &summary.views,
            likes: &summary.likes,
            follows: &summary.follows,
        };
        let response = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| RepoError::Transport(err.to_string()))?;
        let response = Self::check(response).await?;
        let work = response
            .json::<WorkResponse>()
            .await
            .map_err(|err| RepoError::Transport(err.to_string()))?;
        Ok(work.id)
    }

    async fn last_synced_at(&self, slug: &str) -> Result<Option<DateTime<Utc>>, RepoError> {
        Ok(self.fetch_work(slug).await?.and_then(|w| w.last_synced_at))
    }

    async fn chapter_exists(&self, work: WorkId, chapter_number: f64) -> Result<bool, RepoError> {
        let url = self.endpoint(&format!(
            "/api/comics/{work}/chapters/{}",
            format_chapter_number(chapter_number)
        ));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| RepoError::Transport(err.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::check(response).await?;
        Ok(true)
    }

    async fn upsert_chapter(
        &self,
        work: WorkId,
        chapter_number: f64,
        title: &str,
        images: &[ImageRef],
    ) -> Result<i64, RepoError> {
        let url = self.endpoint(&format!(
            "/api/comics/{work}/chapters/{}",
            format_chapter_number(chapter_number)
        ));
        let body = UpsertChapterRequest {
            chapter_number,
            title,
            images: images
                .iter()
                .map(|image| ImageBody {
                    page_number: image.page_number,
                    image_path: &image.path,
                    source_url: &image.source_url,
                })
                .collect(),
        };
        let response = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| RepoError::Transport(err.to_string()))?;
        let response = Self::check(response).await?;
        let chapter = response
            .json::<ChapterResponse>()
            .await
            .map_err(|err| RepoError::Transport(err.to_string()))?;
        Ok(chapter.id)
    }

    async fn mark_synchronized(&self, work: WorkId, at: DateTime<Utc>) -> Result<(), RepoError> {
        let url = self.endpoint(&format!("/api/comics/{work}/synchronized"));
        let response = self
            .client
            .post(&url)
            .json(&MarkSynchronizedRequest { last_synced_at: at })
            .send()
            .await
            .map_err(|err| RepoError::Transport(err.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }
}
