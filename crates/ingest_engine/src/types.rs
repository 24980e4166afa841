use serde::{Deserialize, Serialize};

/// Sentinel stored for optional metadata the source page did not provide.
pub const UNKNOWN_FIELD: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkStatus {
    Ongoing,
    Completed,
    Unknown,
}

impl WorkStatus {
    /// Parse the free-text status label the source pages use.
    pub fn parse(raw: &str) -> Self {
        let lowered = raw.trim().to_lowercase();
        match lowered.as_str() {
            "đang cập nhật" | "ongoing" => WorkStatus::Ongoing,
            "hoàn thành" | "completed" | "full" => WorkStatus::Completed,
            _ => WorkStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::Ongoing => "ongoing",
            WorkStatus::Completed => "completed",
            WorkStatus::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for WorkStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(WorkStatus::parse(s))
    }
}

/// Persisted identity and metadata of one serialized title.
///
/// `cover` holds the stored reference: a store-relative path when the cover
/// download succeeded, otherwise the original remote URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkSummary {
    pub slug: String,
    pub title: String,
    pub cover: String,
    pub author: String,
    pub status: WorkStatus,
    pub genres: Vec<String>,
    pub views: String,
    pub likes: String,
    pub follows: String,
}

/// One chapter as listed on the work's listing page. Transient, not yet
/// persisted; the engine sorts these by `number` before processing.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterRef {
    pub number: f64,
    pub title: String,
    pub url: String,
}

/// Raw `<img>` attributes from a chapter page. Lazy-loading sites put the
/// real source in `data-src` and a placeholder in `src`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageTag {
    pub src: Option<String>,
    pub data_src: Option<String>,
}

impl ImageTag {
    /// Preferred source attribute, `data-src` over `src`.
    pub fn source(&self) -> Option<&str> {
        self.data_src.as_deref().or(self.src.as_deref())
    }
}

/// One stored page of a chapter. `path` is relative to the image store root;
/// `source_url` is kept for retry provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub page_number: u32,
    pub path: String,
    pub source_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterFailureKind {
    Fetch,
    Extraction,
    NoImages,
    Persistence,
}

impl std::fmt::Display for ChapterFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChapterFailureKind::Fetch => write!(f, "fetch failed"),
            ChapterFailureKind::Extraction => write!(f, "extraction failed"),
            ChapterFailureKind::NoImages => write!(f, "no images accepted"),
            ChapterFailureKind::Persistence => write!(f, "persistence failed"),
        }
    }
}

/// A chapter that could not be committed during a run. The run continues
/// past these; they only show up in the final tally.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterFailure {
    pub number: f64,
    pub kind: ChapterFailureKind,
    pub message: String,
}

/// Aggregate outcome of one `sync` run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncResult {
    pub work_slug: String,
    /// True when the freshness gate short-circuited the run.
    pub skipped: bool,
    /// Chapters committed this run.
    pub chapters_processed: usize,
    /// Chapters skipped because they already existed in the repository.
    pub chapters_skipped: usize,
    pub chapters_failed: Vec<ChapterFailure>,
    pub images_stored: usize,
    /// Images dropped by the inclusion policy, tallied apart from failures.
    pub images_rejected: usize,
}

impl SyncResult {
    pub fn new(work_slug: impl Into<String>) -> Self {
        Self {
            work_slug: work_slug.into(),
            ..Self::default()
        }
    }
}

/// Render a chapter number the way it appears in storage paths: integral
/// numbers without a fraction ("12"), fractional ones as-is ("12.5").
pub fn format_chapter_number(number: f64) -> String {
    if number.fract() == 0.0 {
        format!("{}", number as i64)
    } else {
        number.to_string()
    }
}
