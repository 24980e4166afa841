use std::sync::Arc;

use image::GenericImageView;
use log::{debug, info, warn};
use url::Url;

use crate::fetch::Fetcher;
use crate::store::ImageStore;
use crate::types::{ImageRef, ImageTag};

/// Inclusion policy for chapter images.
///
/// The denylist catches ad and banner assets by URL substring. The
/// near-square check filters decorative squares the sites splice between
/// pages; it is a heuristic tuned for the observed source, so the pixel
/// delta stays configurable and the whole check can be switched off.
#[derive(Debug, Clone)]
pub struct HarvestPolicy {
    pub url_denylist: Vec<String>,
    /// Reject images with |width - height| below this. `None` disables the
    /// check and skips decoding entirely.
    pub square_pixel_delta: Option<u32>,
}

impl Default for HarvestPolicy {
    fn default() -> Self {
        Self {
            url_denylist: vec!["banner".to_string(), "quangcao".to_string()],
            square_pixel_delta: Some(10),
        }
    }
}

impl HarvestPolicy {
    fn is_denied(&self, url: &str) -> bool {
        self.url_denylist.iter().any(|needle| url.contains(needle))
    }
}

/// Tally of one chapter's harvest. Policy rejections are deliberate filter
/// outcomes and counted apart from download/decode failures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarvestOutcome {
    pub images: Vec<ImageRef>,
    pub rejected: usize,
    pub failed: usize,
}

/// Resolve an image/link reference against its page URL. Protocol-relative
/// references inherit the page's scheme; relative paths resolve against the
/// page; absolute URLs pass through.
pub fn resolve_url(raw: &str, page_url: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(rest) = raw.strip_prefix("//") {
        let scheme = Url::parse(page_url).ok()?.scheme().to_string();
        return Some(format!("{scheme}://{rest}"));
    }
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Some(raw.to_string());
    }
    Url::parse(page_url)
        .ok()?
        .join(raw)
        .ok()
        .map(|joined| joined.to_string())
}

/// Downloads, filters and sequences the images of one chapter.
pub struct ImageHarvester {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<ImageStore>,
    policy: HarvestPolicy,
}

impl ImageHarvester {
    pub fn new(fetcher: Arc<dyn Fetcher>, store: Arc<ImageStore>, policy: HarvestPolicy) -> Self {
        Self {
            fetcher,
            store,
            policy,
        }
    }

    /// Harvest `tags` into `{slug}/{chapter}`. Page numbers are assigned to
    /// accepted images only, contiguous from 1; the per-tag index is
    /// discarded. Individual failures are logged and skipped, never retried
    /// within the run.
    pub async fn harvest(
        &self,
        tags: &[ImageTag],
        chapter_url: &str,
        slug: &str,
        chapter: &str,
    ) -> HarvestOutcome {
        let mut outcome = HarvestOutcome::default();
        let mut next_page: u32 = 1;

        for tag in tags {
            let Some(raw) = tag.source() else {
                continue;
            };
            let Some(url) = resolve_url(raw, chapter_url) else {
                warn!("unresolvable image reference {raw} on {chapter_url}");
                outcome.failed += 1;
                continue;
            };

            if self.policy.is_denied(&url) {
                debug!("policy rejected {url}");
                outcome.rejected += 1;
                continue;
            }

            // Pacing between image fetches happens inside the fetcher.
            let output = match self.fetcher.get(&url, Some(chapter_url)).await {
                Ok(output) => output,
                Err(err) => {
                    warn!("image fetch failed for {url}: {err}");
                    outcome.failed += 1;
                    continue;
                }
            };

            if let Some(delta) = self.policy.square_pixel_delta {
                match image::load_from_memory(&output.bytes) {
                    Ok(decoded) => {
                        let (width, height) = decoded.dimensions();
                        if width.abs_diff(height) < delta {
                            debug!("policy rejected near-square image {url} ({width}x{height})");
                            outcome.rejected += 1;
                            continue;
                        }
                    }
                    Err(err) => {
                        warn!("undecodable image {url}: {err}");
                        outcome.failed += 1;
                        continue;
                    }
                }
            }

            let extension = extension_for(&url);
            match self
                .store
                .write_page(slug, chapter, next_page, extension, &output.bytes)
            {
                Ok(path) => {
                    outcome.images.push(ImageRef {
                        page_number: next_page,
                        path,
                        source_url: url,
                    });
                    next_page += 1;
                }
                Err(err) => {
                    warn!("failed to store image {url}: {err}");
                    outcome.failed += 1;
                }
            }
        }

        info!(
            "harvested {}/{} images for {slug}/{chapter} ({} rejected, {} failed)",
            outcome.images.len(),
            tags.len(),
            outcome.rejected,
            outcome.failed
        );
        outcome
    }
}

/// File extension for a stored page, taken from the URL path when it names
/// a known image format, `jpg` otherwise.
fn extension_for(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "png" => "png",
        "webp" => "webp",
        _ => "jpg",
    }
}
