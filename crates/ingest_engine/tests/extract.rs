use ingest_engine::{
    decode_page, parse_chapter_number, ExtractError, FetchOutput, PageExtractor,
    TruyenPageExtractor, WorkStatus, UNKNOWN_FIELD,
};
use pretty_assertions::assert_eq;

const PAGE_URL: &str = "https://example.com/truyen-tranh/bo-truyen-17622";

fn listing_page() -> String {
    r#"<html><body>
        <div class="book_avatar">
            <img itemprop="image" src="//cdn.example.com/covers/bo-truyen.jpg">
        </div>
        <div class="book_other">
            <h1 itemprop="name"> Bộ Truyện Thử Nghiệm </h1>
        </div>
        <ul class="list-info">
            <li class="row"><i class="fa fa-user"></i><p class="col-xs-9">Tác Giả A</p></li>
            <li class="row"><i class="fa fa-rss"></i><p class="col-xs-9">Đang Cập Nhật</p></li>
            <li class="row"><i class="fa fa-eye"></i><p class="col-xs-9">12345</p></li>
            <li class="row"><i class="fa fa-thumbs-up"></i><p class="col-xs-9">90</p></li>
            <li class="row"><i class="fa fa-heart"></i><p class="col-xs-9">678</p></li>
        </ul>
        <ul class="list01">
            <li class="li03"><a>Action</a></li>
            <li class="li03"><a>Action</a></li>
            <li class="li03"><a>Comedy</a></li>
        </ul>
        <div class="list_chapter">
            <div class="works-chapter-item">
                <div class="name-chap"><a href="/truyen/bo-truyen-chap-13.html">Chương 13</a></div>
            </div>
            <div class="works-chapter-item">
                <div class="name-chap"><a href="/truyen/bo-truyen-chap-12.5.html">Chương 12.5</a></div>
            </div>
            <div class="works-chapter-item">
                <div class="name-chap"><a href="/truyen/bo-truyen-oneshot.html">Ngoại truyện</a></div>
            </div>
        </div>
    </body></html>"#
        .to_string()
}

#[test]
fn extracts_work_summary_with_required_and_optional_fields() {
    let extractor = TruyenPageExtractor;
    let work = extractor.work_summary(&listing_page(), PAGE_URL).unwrap();

    assert_eq!(work.title, "Bộ Truyện Thử Nghiệm");
    // Protocol-relative cover inherits the listing page's scheme.
    assert_eq!(work.cover_url, "https://cdn.example.com/covers/bo-truyen.jpg");
    assert_eq!(work.author, "Tác Giả A");
    assert_eq!(work.status, WorkStatus::Ongoing);
    assert_eq!(work.views, "12345");
    assert_eq!(work.likes, "90");
    assert_eq!(work.follows, "678");
    assert_eq!(work.genres, vec!["Action".to_string(), "Comedy".to_string()]);
}

#[test]
fn missing_title_is_fatal() {
    let html = r#"<div class="book_avatar"><img itemprop="image" src="/c.jpg"></div>"#;
    let err = TruyenPageExtractor
        .work_summary(html, PAGE_URL)
        .unwrap_err();
    assert_eq!(err, ExtractError::MissingField("title"));
}

#[test]
fn missing_cover_is_fatal() {
    let html = r#"<div class="book_other"><h1 itemprop="name">T</h1></div>"#;
    let err = TruyenPageExtractor
        .work_summary(html, PAGE_URL)
        .unwrap_err();
    assert_eq!(err, ExtractError::MissingField("cover"));
}

#[test]
fn optional_fields_fall_back_to_sentinel() {
    let html = r#"
        <div class="book_other"><h1 itemprop="name">T</h1></div>
        <div class="book_avatar"><img itemprop="image" src="/c.jpg"></div>
    "#;
    let work = TruyenPageExtractor.work_summary(html, PAGE_URL).unwrap();
    assert_eq!(work.author, UNKNOWN_FIELD);
    assert_eq!(work.views, UNKNOWN_FIELD);
    assert_eq!(work.likes, UNKNOWN_FIELD);
    assert_eq!(work.follows, UNKNOWN_FIELD);
    assert_eq!(work.status, WorkStatus::Unknown);
    assert!(work.genres.is_empty());
}

#[test]
fn chapter_refs_resolve_urls_and_parse_numbers() {
    let chapters = TruyenPageExtractor.chapter_refs(&listing_page(), PAGE_URL);
    assert_eq!(chapters.len(), 3);

    assert_eq!(chapters[0].number, 13.0);
    assert_eq!(chapters[0].title, "Chương 13");
    assert_eq!(
        chapters[0].url,
        "https://example.com/truyen/bo-truyen-chap-13.html"
    );

    assert_eq!(chapters[1].number, 12.5);
    // No recognizable number: documented fallback to 0.
    assert_eq!(chapters[2].number, 0.0);
}

#[test]
fn chapter_number_parsing_variants() {
    assert_eq!(parse_chapter_number("Chương 12.5"), 12.5);
    assert_eq!(parse_chapter_number("chương 7"), 7.0);
    assert_eq!(parse_chapter_number("Chapter 3"), 3.0);
    assert_eq!(parse_chapter_number("Chap 41: tiêu đề"), 41.0);
    assert_eq!(parse_chapter_number("Ngoại truyện"), 0.0);
}

#[test]
fn decodes_windows_1258_pages_via_the_charset_header() {
    // Sticks to characters windows-1258 maps one-to-one (horn vowels, đ);
    // tone marks round-trip as combining characters and would not compare
    // equal to the composed literal.
    let text = "Chương 1 đang ra";
    let (bytes, _, _) = encoding_rs::WINDOWS_1258.encode(text);
    let output = FetchOutput {
        bytes: bytes.into_owned(),
        final_url: PAGE_URL.to_string(),
        content_type: Some("text/html; charset=windows-1258".to_string()),
    };
    assert_eq!(decode_page(&output).unwrap(), text);
}

#[test]
fn decodes_utf16_pages_via_the_bom() {
    let text = "<h1>Chương 12</h1>";
    let mut bytes = vec![0xFF, 0xFE];
    bytes.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
    let output = FetchOutput {
        bytes,
        final_url: PAGE_URL.to_string(),
        // No charset header: the BOM has to carry the encoding.
        content_type: Some("text/html".to_string()),
    };
    assert_eq!(decode_page(&output).unwrap(), text);
}

#[test]
fn image_tags_keep_document_order_and_both_attributes() {
    let html = r#"
        <div class="chapter_content">
            <img src="/a.jpg">
            <img data-src="/real.jpg" src="/placeholder.gif">
        </div>
        <div id="chapter-content"><img src="/b.jpg"></div>
    "#;
    let tags = TruyenPageExtractor.image_tags(html);
    assert_eq!(tags.len(), 3);
    assert_eq!(tags[0].source(), Some("/a.jpg"));
    // data-src wins over the lazy-load placeholder.
    assert_eq!(tags[1].source(), Some("/real.jpg"));
    assert_eq!(tags[2].source(), Some("/b.jpg"));
}
