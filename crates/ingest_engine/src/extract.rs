use std::collections::HashSet;
use std::sync::OnceLock;

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use log::debug;
use regex::Regex;
use scraper::{Html, Selector};
use thiserror::Error;

use crate::fetch::FetchOutput;
use crate::harvest::resolve_url;
use crate::types::{ChapterRef, ImageTag, WorkStatus, UNKNOWN_FIELD};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("required field missing: {0}")]
    MissingField(&'static str),
    #[error("could not decode page bytes as {0}")]
    Decode(String),
}

/// Work metadata as read off the listing page. The cover is still the
/// remote URL here; the engine decides what reference ends up stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedWork {
    pub title: String,
    pub cover_url: String,
    pub author: String,
    pub status: WorkStatus,
    pub genres: Vec<String>,
    pub views: String,
    pub likes: String,
    pub follows: String,
}

/// Structured view over the source site's pages. Selector details live
/// behind this seam so the sync engine stays layout-agnostic.
pub trait PageExtractor: Send + Sync {
    /// Required fields (title, cover) missing is an error; optional ones
    /// fall back to the `UNKNOWN_FIELD` sentinel.
    fn work_summary(&self, html: &str, page_url: &str) -> Result<ExtractedWork, ExtractError>;

    /// Chapter list in page order. The caller sorts; no order is promised.
    fn chapter_refs(&self, html: &str, page_url: &str) -> Vec<ChapterRef>;

    /// Raw image tags of a chapter page, in document order.
    fn image_tags(&self, html: &str) -> Vec<ImageTag>;
}

/// Decode fetched page bytes into UTF-8: charset from the Content-Type
/// header first, then BOM, then chardetng detection.
pub fn decode_page(output: &FetchOutput) -> Result<String, ExtractError> {
    let encoding = charset_label(output.content_type.as_deref())
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| Encoding::for_bom(&output.bytes).map(|(encoding, _)| encoding))
        .unwrap_or_else(|| {
            let mut detector = EncodingDetector::new();
            detector.feed(&output.bytes, true);
            detector.guess(None, true)
        });

    let (text, _, had_errors) = encoding.decode(&output.bytes);
    if had_errors {
        return Err(ExtractError::Decode(encoding.name().to_string()));
    }
    Ok(text.into_owned())
}

fn charset_label(content_type: Option<&str>) -> Option<String> {
    content_type?
        .split(';')
        .map(str::trim)
        .find_map(|part| {
            let (key, value) = part.split_once('=')?;
            key.eq_ignore_ascii_case("charset")
                .then(|| value.trim_matches([' ', '"', '\''].as_ref()).to_string())
        })
}

/// Extract the numeric chapter key from a chapter title, e.g.
/// "Chương 12.5" -> 12.5. Titles without a number map to 0.
pub fn parse_chapter_number(title: &str) -> f64 {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    let re = NUMBER.get_or_init(|| {
        Regex::new(r"(?i)(?:chương|chapter|chap)\s*(\d+(?:\.\d+)?)").expect("chapter number regex")
    });
    re.captures(title)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0.0)
}

/// Extractor for the truyenqq-style layout the crawler targets.
#[derive(Debug, Default)]
pub struct TruyenPageExtractor;

impl TruyenPageExtractor {
    /// Value of the `ul.list-info` row whose icon carries `icon_class`.
    fn info_by_icon(doc: &Html, icon_class: &str) -> Option<String> {
        let row_sel = Selector::parse("ul.list-info li.row").ok()?;
        let icon_sel = Selector::parse("i").ok()?;
        let value_sel = Selector::parse("p.col-xs-9").ok()?;

        for row in doc.select(&row_sel) {
            let Some(icon) = row.select(&icon_sel).next() else {
                continue;
            };
            if !icon.value().classes().any(|class| class == icon_class) {
                continue;
            }
            if let Some(value) = row.select(&value_sel).next() {
                let text = value.text().collect::<String>().trim().to_string();
                if !text.is_empty() {
                    return Some(text);
                }
            }
        }
        None
    }
}

impl PageExtractor for TruyenPageExtractor {
    fn work_summary(&self, html: &str, page_url: &str) -> Result<ExtractedWork, ExtractError> {
        let doc = Html::parse_document(html);

        let title = Selector::parse("div.book_other h1[itemprop='name']")
            .ok()
            .and_then(|sel| doc.select(&sel).next())
            .map(|node| node.text().collect::<String>().trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(ExtractError::MissingField("title"))?;

        let cover_raw = Selector::parse("div.book_avatar img[itemprop='image']")
            .ok()
            .and_then(|sel| doc.select(&sel).next())
            .and_then(|node| node.value().attr("src").map(str::to_string))
            .ok_or(ExtractError::MissingField("cover"))?;
        let cover_url =
            resolve_url(&cover_raw, page_url).ok_or(ExtractError::MissingField("cover"))?;

        let author =
            Self::info_by_icon(&doc, "fa-user").unwrap_or_else(|| UNKNOWN_FIELD.to_string());
        let status = Self::info_by_icon(&doc, "fa-rss")
            .map(|raw| WorkStatus::parse(&raw))
            .unwrap_or(WorkStatus::Unknown);
        let views = Self::info_by_icon(&doc, "fa-eye").unwrap_or_else(|| UNKNOWN_FIELD.to_string());
        let likes =
            Self::info_by_icon(&doc, "fa-thumbs-up").unwrap_or_else(|| UNKNOWN_FIELD.to_string());
        let follows =
            Self::info_by_icon(&doc, "fa-heart").unwrap_or_else(|| UNKNOWN_FIELD.to_string());

        let mut seen = HashSet::new();
        let genres = Selector::parse("ul.list01 li.li03 a")
            .ok()
            .map(|sel| {
                doc.select(&sel)
                    .map(|node| node.text().collect::<String>().trim().to_string())
                    .filter(|genre| !genre.is_empty() && seen.insert(genre.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(ExtractedWork {
            title,
            cover_url,
            author,
            status,
            genres,
            views,
            likes,
            follows,
        })
    }

    fn chapter_refs(&self, html: &str, page_url: &str) -> Vec<ChapterRef> {
        let doc = Html::parse_document(html);
        let Some(item_sel) = Selector::parse("div.list_chapter div.works-chapter-item").ok() else {
            return Vec::new();
        };
        let Some(link_sel) = Selector::parse("div.name-chap a").ok() else {
            return Vec::new();
        };

        let mut chapters = Vec::new();
        for item in doc.select(&item_sel) {
            let Some(link) = item.select(&link_sel).next() else {
                continue;
            };
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let Some(url) = resolve_url(href, page_url) else {
                debug!("skipping chapter link with unresolvable href {href}");
                continue;
            };
            let title = link.text().collect::<String>().trim().to_string();
            chapters.push(ChapterRef {
                number: parse_chapter_number(&title),
                title,
                url,
            });
        }
        chapters
    }

    fn image_tags(&self, html: &str) -> Vec<ImageTag> {
        let doc = Html::parse_document(html);
        let Some(img_sel) =
            Selector::parse(".chapter-content img, .chapter_content img, #chapter-content img")
                .ok()
        else {
            return Vec::new();
        };

        doc.select(&img_sel)
            .map(|node| ImageTag {
                src: node.value().attr("src").map(str::to_string),
                data_src: node.value().attr("data-src").map(str::to_string),
            })
            .collect()
    }
}
