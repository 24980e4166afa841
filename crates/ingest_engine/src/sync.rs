use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::extract::{decode_page, ExtractError, PageExtractor};
use crate::fetch::{FetchError, Fetcher};
use crate::freshness::FreshnessGate;
use crate::harvest::{HarvestPolicy, ImageHarvester};
use crate::repository::{RepoError, Repository, WorkId};
use crate::slug::slug_from_url;
use crate::store::{ChapterInfo, ImageStore, StoreError, WorkInfo};
use crate::types::{
    format_chapter_number, ChapterFailure, ChapterFailureKind, ChapterRef, SyncResult, WorkSummary,
};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Crawl the chapter list after the work metadata. Off = metadata only.
    pub crawl_chapters: bool,
    /// Skip chapters the repository already has. On for incremental runs.
    pub skip_existing: bool,
    /// Bypass the freshness gate.
    pub force: bool,
    /// Concurrent chapter harvests. The request pacer keeps the aggregate
    /// rate polite regardless, so this stays in the low single digits.
    pub concurrency: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            crawl_chapters: true,
            skip_existing: true,
            force: false,
            concurrency: 2,
        }
    }
}

/// Run-fatal errors. Per-chapter and per-image problems never surface
/// here; they end up in the result's failure tally instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("listing page fetch failed: {0}")]
    ListingFetch(#[from] FetchError),
    #[error(transparent)]
    Extraction(#[from] ExtractError),
    #[error("work persistence failed: {0}")]
    Persistence(#[from] RepoError),
    #[error("image store failed: {0}")]
    Store(#[from] StoreError),
}

enum ChapterOutcome {
    Stored { info: ChapterInfo, rejected: usize },
    AlreadyPresent,
    Failed(ChapterFailure),
}

/// Everything a chapter task needs, shared across the bounded worker set.
struct ChapterContext {
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn PageExtractor>,
    repository: Arc<dyn Repository>,
    harvester: Arc<ImageHarvester>,
    skip_existing: bool,
    work_id: WorkId,
    slug: String,
}

impl ChapterContext {
    /// Process one chapter end to end. The chapter is committed only after
    /// a full harvest; any earlier failure leaves no partial record.
    async fn process(&self, chapter: ChapterRef) -> ChapterOutcome {
        let label = format_chapter_number(chapter.number);
        let fail = |kind, message: String| {
            ChapterOutcome::Failed(ChapterFailure {
                number: chapter.number,
                kind,
                message,
            })
        };

        if self.skip_existing {
            match self
                .repository
                .chapter_exists(self.work_id, chapter.number)
                .await
            {
                Ok(true) => {
                    debug!("chapter {label} of {} already present", self.slug);
                    return ChapterOutcome::AlreadyPresent;
                }
                Ok(false) => {}
                // Fail open: the upsert is idempotent anyway.
                Err(err) => warn!("chapter_exists check failed for {label}: {err}"),
            }
        }

        let page = match self.fetcher.get(&chapter.url, Some(&chapter.url)).await {
            Ok(page) => page,
            Err(err) => return fail(ChapterFailureKind::Fetch, err.to_string()),
        };
        let html = match decode_page(&page) {
            Ok(html) => html,
            Err(err) => return fail(ChapterFailureKind::Extraction, err.to_string()),
        };
        let tags = self.extractor.image_tags(&html);
        if tags.is_empty() {
            return fail(
                ChapterFailureKind::Extraction,
                "no image tags on chapter page".into(),
            );
        }

        let harvest = self
            .harvester
            .harvest(&tags, &chapter.url, &self.slug, &label)
            .await;
        if harvest.images.is_empty() {
            // An empty chapter record is worse than none; report and move on.
            return fail(
                ChapterFailureKind::NoImages,
                format!(
                    "{} policy-rejected, {} failed of {} tags",
                    harvest.rejected,
                    harvest.failed,
                    tags.len()
                ),
            );
        }

        match self
            .repository
            .upsert_chapter(self.work_id, chapter.number, &chapter.title, &harvest.images)
            .await
        {
            Ok(_) => ChapterOutcome::Stored {
                info: ChapterInfo {
                    number: chapter.number,
                    title: chapter.title,
                    url: chapter.url,
                    images: harvest.images,
                },
                rejected: harvest.rejected,
            },
            Err(err) => fail(ChapterFailureKind::Persistence, err.to_string()),
        }
    }
}

/// Orchestrates one incremental synchronization run:
/// freshness gate, listing extraction, work upsert, then the chapter loop
/// with per-chapter commit atomicity and whole-run resumability.
pub struct SyncEngine {
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn PageExtractor>,
    repository: Arc<dyn Repository>,
    store: Arc<ImageStore>,
    harvester: Arc<ImageHarvester>,
    gate: FreshnessGate,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn PageExtractor>,
        repository: Arc<dyn Repository>,
        store: Arc<ImageStore>,
        policy: HarvestPolicy,
        gate: FreshnessGate,
        options: SyncOptions,
    ) -> Self {
        let harvester = Arc::new(ImageHarvester::new(fetcher.clone(), store.clone(), policy));
        Self {
            fetcher,
            extractor,
            repository,
            store,
            harvester,
            gate,
            options,
        }
    }

    /// Synchronize the work behind `url`. Returns the aggregate tally even
    /// on partial failure; only a total inability to identify or persist
    /// the work itself is an error.
    pub async fn sync(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<SyncResult, SyncError> {
        let slug = slug_from_url(url);
        let mut result = SyncResult::new(&slug);

        if !self.options.force && !self.gate.should_sync(self.repository.as_ref(), &slug).await {
            result.skipped = true;
            return Ok(result);
        }

        let listing = self.fetcher.get(url, None).await?;
        let html = decode_page(&listing)?;
        let extracted = self.extractor.work_summary(&html, url)?;

        let cover = self.store_cover(&slug, &extracted.cover_url, url).await;
        let summary = WorkSummary {
            slug: slug.clone(),
            title: extracted.title,
            cover,
            author: extracted.author,
            status: extracted.status,
            genres: extracted.genres,
            views: extracted.views,
            likes: extracted.likes,
            follows: extracted.follows,
        };

        // Upserting the work before the chapter loop keeps a crashed run
        // discoverable and re-runnable.
        let work_id = self.repository.upsert_work(&summary).await?;
        info!("work {slug} upserted as #{work_id}");

        let mut stored_chapters: Vec<ChapterInfo> = Vec::new();
        if self.options.crawl_chapters {
            let mut chapters = self.extractor.chapter_refs(&html, url);
            // Oldest first: stable, resumable order independent of how the
            // page happens to list them.
            chapters.sort_by(|a, b| a.number.total_cmp(&b.number));
            info!("{} chapters listed for {slug}", chapters.len());
            self.run_chapters(
                chapters,
                work_id,
                &slug,
                cancel,
                &mut result,
                &mut stored_chapters,
            )
            .await;
        }

        if cancel.is_cancelled() {
            // Leave last_synced_at untouched so the next run picks up the
            // remaining chapters without waiting out the freshness window.
            warn!("sync of {slug} cancelled; not marking synchronized");
        } else {
            self.repository
                .mark_synchronized(work_id, Utc::now())
                .await?;
        }

        // The sidecar carries the full chapter index, so entries skipped
        // this run must survive from the previous sidecar.
        let mut chapter_index = match self.store.read_info(&slug) {
            Ok(Some(previous)) => previous.chapters,
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!("unreadable info.json for {slug}, rebuilding index: {err}");
                Vec::new()
            }
        };
        for info in stored_chapters {
            match chapter_index.iter_mut().find(|c| c.number == info.number) {
                Some(slot) => *slot = info,
                None => chapter_index.push(info),
            }
        }
        chapter_index.sort_by(|a, b| a.number.total_cmp(&b.number));
        let work_info = WorkInfo {
            summary,
            chapters: chapter_index,
        };
        if let Err(err) = self.store.write_info(&slug, &work_info) {
            // The sidecar mirrors repository state; losing it is not fatal.
            warn!("failed to write info.json for {slug}: {err}");
        }

        info!(
            "sync of {slug} done: {} stored, {} skipped, {} failed, {} images",
            result.chapters_processed,
            result.chapters_skipped,
            result.chapters_failed.len(),
            result.images_stored
        );
        Ok(result)
    }

    /// Cover download is best-effort: on failure the remote URL is kept as
    /// the stored reference.
    async fn store_cover(&self, slug: &str, cover_url: &str, page_url: &str) -> String {
        match self.fetcher.get(cover_url, Some(page_url)).await {
            Ok(output) => match self.store.write_cover(slug, &output.bytes) {
                Ok(path) => path,
                Err(err) => {
                    warn!("could not store cover for {slug}: {err}");
                    cover_url.to_string()
                }
            },
            Err(err) => {
                warn!("cover download failed for {slug}, keeping remote url: {err}");
                cover_url.to_string()
            }
        }
    }

    async fn run_chapters(
        &self,
        chapters: Vec<ChapterRef>,
        work_id: WorkId,
        slug: &str,
        cancel: &CancellationToken,
        result: &mut SyncResult,
        stored_chapters: &mut Vec<ChapterInfo>,
    ) {
        let context = Arc::new(ChapterContext {
            fetcher: self.fetcher.clone(),
            extractor: self.extractor.clone(),
            repository: self.repository.clone(),
            harvester: self.harvester.clone(),
            skip_existing: self.options.skip_existing,
            work_id,
            slug: slug.to_string(),
        });
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for chapter in chapters {
            // Cancellation stops launching new chapter work; tasks already
            // running are left to finish their commit cleanly.
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let context = context.clone();
            tasks.spawn(async move {
                let outcome = context.process(chapter).await;
                drop(permit);
                outcome
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(ChapterOutcome::Stored { info, rejected }) => {
                    result.chapters_processed += 1;
                    result.images_stored += info.images.len();
                    result.images_rejected += rejected;
                    stored_chapters.push(info);
                }
                Ok(ChapterOutcome::AlreadyPresent) => result.chapters_skipped += 1,
                Ok(ChapterOutcome::Failed(failure)) => {
                    warn!(
                        "chapter {} of {slug}: {} ({})",
                        format_chapter_number(failure.number),
                        failure.kind,
                        failure.message
                    );
                    result.chapters_failed.push(failure);
                }
                Err(err) => error!("chapter task for {slug} panicked: {err}"),
            }
        }
        result
            .chapters_failed
            .sort_by(|a, b| a.number.total_cmp(&b.number));
    }
}
