use std::fs;

use ingest_engine::{ChapterInfo, ImageRef, ImageStore, WorkInfo, WorkStatus, WorkSummary};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn summary(slug: &str) -> WorkSummary {
    WorkSummary {
        slug: slug.to_string(),
        title: "Bộ Truyện".to_string(),
        cover: format!("{slug}/cover.jpg"),
        author: "A".to_string(),
        status: WorkStatus::Ongoing,
        genres: vec!["Action".to_string()],
        views: "1".to_string(),
        likes: "3".to_string(),
        follows: "2".to_string(),
    }
}

#[test]
fn lays_out_pages_and_cover_under_the_slug() {
    let dir = TempDir::new().unwrap();
    let store = ImageStore::new(dir.path());

    let page = store.write_page("bo-truyen", "12.5", 3, "jpg", b"page").unwrap();
    assert_eq!(page, "bo-truyen/12.5/003.jpg");
    assert_eq!(fs::read(dir.path().join(&page)).unwrap(), b"page");

    let cover = store.write_cover("bo-truyen", b"cover").unwrap();
    assert_eq!(cover, "bo-truyen/cover.jpg");
    assert!(dir.path().join(&cover).is_file());
}

#[test]
fn info_sidecar_is_replaced_atomically() {
    let dir = TempDir::new().unwrap();
    let store = ImageStore::new(dir.path());

    let first = WorkInfo {
        summary: summary("bo-truyen"),
        chapters: Vec::new(),
    };
    let path = store.write_info("bo-truyen", &first).unwrap();
    assert_eq!(path, dir.path().join("bo-truyen/info.json"));

    let second = WorkInfo {
        summary: summary("bo-truyen"),
        chapters: vec![ChapterInfo {
            number: 1.0,
            title: "Chương 1".to_string(),
            url: "https://example.com/chap-1.html".to_string(),
            images: vec![ImageRef {
                page_number: 1,
                path: "bo-truyen/1/001.jpg".to_string(),
                source_url: "https://cdn.example.com/1.jpg".to_string(),
            }],
        }],
    };
    store.write_info("bo-truyen", &second).unwrap();

    let raw = fs::read_to_string(&path).unwrap();
    let reloaded: WorkInfo = serde_json::from_str(&raw).unwrap();
    assert_eq!(reloaded, second);

    // No temp files left behind by the write-rename.
    let leftovers: Vec<_> = fs::read_dir(dir.path().join("bo-truyen"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers.len(), 1);
}

#[test]
fn write_fails_when_root_is_a_file() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocked");
    fs::write(&blocker, "x").unwrap();

    let store = ImageStore::new(&blocker);
    assert!(store.write_cover("slug", b"bytes").is_err());
}
