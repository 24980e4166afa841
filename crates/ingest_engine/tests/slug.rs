use ingest_engine::{slug_from_url, slugify};
use pretty_assertions::assert_eq;

#[test]
fn folds_vietnamese_titles_to_ascii_hyphenated() {
    let slug = slugify("Chương Đặc Biệt!");
    // "Đ" has no NFKD decomposition and is dropped with the other
    // non-ASCII leftovers; the diacritics fold away.
    assert_eq!(slug, "chuong-ac-biet");
    assert!(slug.chars().all(|c| c.is_ascii()));
    assert!(!slug.starts_with('-') && !slug.ends_with('-'));
}

#[test]
fn slugify_is_idempotent() {
    for input in ["Chương Đặc Biệt!", "  Mixed   CASE  title ", "a--b--c"] {
        let once = slugify(input);
        assert_eq!(slugify(&once), once, "not idempotent for {input:?}");
    }
}

#[test]
fn collapses_separator_runs() {
    assert_eq!(slugify("a - b   c"), "a-b-c");
    assert_eq!(slugify("--leading and trailing--"), "leading-and-trailing");
}

#[test]
fn punctuation_is_dropped_without_separating() {
    assert_eq!(slugify("don't stop"), "dont-stop");
}

#[test]
fn derives_slug_from_listing_url() {
    assert_eq!(
        slug_from_url("https://example.com/truyen-tranh/mot-bo-truyen-17622"),
        "mot-bo-truyen-17622"
    );
    assert_eq!(
        slug_from_url("https://example.com/truyen-tranh/Mot-Bo-Truyen.html?page=2"),
        "mot-bo-truyen"
    );
    assert_eq!(
        slug_from_url("https://example.com/truyen/abc/"),
        "abc"
    );
}

#[test]
fn slug_from_url_matches_slugify_of_segment() {
    let url = "https://example.com/truyen-tranh/chuong-dac-biet.html";
    assert_eq!(slug_from_url(url), slugify("chuong-dac-biet"));
}
