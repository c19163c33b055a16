use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::models::report::{ChapterOutcome, ChapterReport};

pub const STATE_FILE_NAME: &str = ".download_state.json";

// Checkpoint for one comic's run, written next to the chapter directories.
// last_processed_index counts fully processed chapters, so a resumed run
// restarts at that slice index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadState {
    pub last_processed_index: usize,
    pub total_items: usize,
    pub success_count: usize,
    #[serde(default)]
    pub partial_count: usize,
    pub fail_count: usize,
    #[serde(default)]
    pub images_found: usize,
    #[serde(default)]
    pub images_downloaded: usize,
    #[serde(default)]
    pub images_skipped: usize,
    #[serde(default)]
    pub images_failed: usize,
    pub timestamp: DateTime<Utc>,
}

impl DownloadState {
    pub fn new(total_items: usize) -> Self {
        Self {
            last_processed_index: 0,
            total_items,
            success_count: 0,
            partial_count: 0,
            fail_count: 0,
            images_found: 0,
            images_downloaded: 0,
            images_skipped: 0,
            images_failed: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn path_for(comic_dir: &Path) -> PathBuf {
        comic_dir.join(STATE_FILE_NAME)
    }

    pub fn apply(&mut self, chapter: &ChapterReport) {
        match chapter.outcome {
            ChapterOutcome::Completed => self.success_count += 1,
            ChapterOutcome::PartiallyFailed => self.partial_count += 1,
            ChapterOutcome::Failed => self.fail_count += 1,
        }
        self.images_found += chapter.found;
        self.images_downloaded += chapter.downloaded;
        self.images_skipped += chapter.skipped;
        self.images_failed += chapter.failed;
        self.timestamp = Utc::now();
    }

    // Missing and unreadable files both mean no checkpoint.
    pub fn load(path: &Path) -> Option<Self> {
        let data = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&data) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Ignoring unreadable checkpoint {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        // Write a sibling tmp file first so a crash never leaves a torn
        // checkpoint behind.
        let tmp = tmp_sibling(path);
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn clear(path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != ErrorKind::NotFound {
                warn!("Could not remove checkpoint {}: {}", path.display(), e);
            }
        }
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
