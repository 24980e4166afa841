//! Incremental chapter-synchronization engine: fetch a comic listing page,
//! extract work and chapter metadata, harvest per-chapter page images, and
//! commit everything idempotently to a repository backend.
mod extract;
mod fetch;
mod freshness;
mod harvest;
mod repo_http;
mod repo_sqlite;
mod repository;
mod slug;
mod store;
mod sync;
mod types;

pub use extract::{
    decode_page, parse_chapter_number, ExtractError, ExtractedWork, PageExtractor,
    TruyenPageExtractor,
};
pub use fetch::{
    FetchError, FetchOutput, FetchSettings, Fetcher, ReqwestFetcher, RequestPacer,
    DEFAULT_USER_AGENT,
};
pub use freshness::FreshnessGate;
pub use harvest::{resolve_url, HarvestOutcome, HarvestPolicy, ImageHarvester};
pub use repo_http::HttpApiRepository;
pub use repo_sqlite::SqliteRepository;
pub use repository::{NoopRepository, RepoError, Repository, WorkId};
pub use slug::{slug_from_url, slugify};
pub use store::{ChapterInfo, ImageStore, StoreError, WorkInfo};
pub use sync::{SyncEngine, SyncError, SyncOptions};
pub use types::{
    format_chapter_number, ChapterFailure, ChapterFailureKind, ChapterRef, ImageRef, ImageTag,
    SyncResult, WorkStatus, WorkSummary, UNKNOWN_FIELD,
};
