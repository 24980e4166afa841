use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::types::{ImageRef, WorkSummary};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store root missing or not writable: {0}")]
    Root(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Chapter entry of the `info.json` sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterInfo {
    pub number: f64,
    pub title: String,
    pub url: String,
    pub images: Vec<ImageRef>,
}

/// `info.json` contents: the work summary plus the chapter index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkInfo {
    #[serde(flatten)]
    pub summary: WorkSummary,
    pub chapters: Vec<ChapterInfo>,
}

/// On-disk image layout:
/// `{root}/{slug}/{chapter}/{page:03}.{ext}`, `{root}/{slug}/cover.jpg`,
/// and an atomically replaced `{root}/{slug}/info.json` sidecar.
///
/// Returned references are relative to the store root so they stay valid
/// when the root moves between hosts.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn work_dir(&self, slug: &str) -> PathBuf {
        self.root.join(slug)
    }

    pub fn write_page(
        &self,
        slug: &str,
        chapter: &str,
        page_number: u32,
        extension: &str,
        bytes: &[u8],
    ) -> Result<String, StoreError> {
        let dir = self.root.join(slug).join(chapter);
        ensure_dir(&dir)?;
        let filename = format!("{page_number:03}.{extension}");
        fs::write(dir.join(&filename), bytes)?;
        Ok(format!("{slug}/{chapter}/{filename}"))
    }

    pub fn write_cover(&self, slug: &str, bytes: &[u8]) -> Result<String, StoreError> {
        let dir = self.work_dir(slug);
        ensure_dir(&dir)?;
        fs::write(dir.join("cover.jpg"), bytes)?;
        Ok(format!("{slug}/cover.jpg"))
    }

    /// Previously written `info.json` for the work, if any.
    pub fn read_info(&self, slug: &str) -> Result<Option<WorkInfo>, StoreError> {
        let path = self.work_dir(slug).join("info.json");
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Replace `info.json` through a temp file and rename, so readers never
    /// observe a half-written sidecar.
    pub fn write_info(&self, slug: &str, info: &WorkInfo) -> Result<PathBuf, StoreError> {
        let dir = self.work_dir(slug);
        ensure_dir(&dir)?;
        let target = dir.join("info.json");

        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, info)?;
        tmp.write_all(b"\n")?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        if target.exists() {
            fs::remove_file(&target)?;
        }
        tmp.persist(&target).map_err(|e| StoreError::Io(e.error))?;
        Ok(target)
    }
}

fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| StoreError::Root(e.to_string()))?;
        if !meta.is_dir() {
            return Err(StoreError::Root("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| StoreError::Root(e.to_string()))?;
    }
    Ok(())
}
