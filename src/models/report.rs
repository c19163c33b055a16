use crate::models::chapter::ChapterRef;
use crate::models::state::DownloadState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterOutcome {
    Completed,
    PartiallyFailed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ChapterReport {
    pub number: String,
    pub title: String,
    pub outcome: ChapterOutcome,
    pub found: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_hint: u32,
    pub from_catalog: bool,
    pub interrupted: bool,
}

impl ChapterReport {
    pub fn new(chapter: &ChapterRef) -> Self {
        Self {
            number: chapter.number.clone(),
            title: chapter.title.clone(),
            outcome: ChapterOutcome::Failed,
            found: 0,
            downloaded: 0,
            skipped: 0,
            failed: 0,
            total_hint: 0,
            from_catalog: false,
            interrupted: false,
        }
    }

    pub fn satisfied(&self) -> usize {
        self.downloaded + self.skipped
    }

    // A chapter with nothing resolved or nothing on disk afterwards is a
    // failure; anything on disk with leftover misses is partial.
    pub fn classify(&mut self) {
        self.outcome = if self.found == 0 || self.satisfied() == 0 {
            ChapterOutcome::Failed
        } else if self.failed > 0 {
            ChapterOutcome::PartiallyFailed
        } else {
            ChapterOutcome::Completed
        };
    }
}

// Includes counts replayed from the checkpoint when the run resumed.
#[derive(Debug, Clone, Default)]
pub struct ComicReport {
    pub comic_name: String,
    pub total_chapters: usize,
    pub processed: usize,
    pub completed: usize,
    pub partial: usize,
    pub failed: usize,
    pub catalog_skipped: usize,
    pub images_found: usize,
    pub images_downloaded: usize,
    pub images_skipped: usize,
    pub images_failed: usize,
    pub interrupted: bool,
    pub chapters: Vec<ChapterReport>,
}

impl ComicReport {
    pub fn new(comic_name: &str, total_chapters: usize) -> Self {
        Self {
            comic_name: comic_name.to_string(),
            total_chapters,
            ..Default::default()
        }
    }

    pub fn absorb(&mut self, chapter: &ChapterReport) {
        self.processed += 1;
        match chapter.outcome {
            ChapterOutcome::Completed => self.completed += 1,
            ChapterOutcome::PartiallyFailed => self.partial += 1,
            ChapterOutcome::Failed => self.failed += 1,
        }
        if chapter.from_catalog {
            self.catalog_skipped += 1;
        }
        self.images_found += chapter.found;
        self.images_downloaded += chapter.downloaded;
        self.images_skipped += chapter.skipped;
        self.images_failed += chapter.failed;
        self.chapters.push(chapter.clone());
    }

    pub fn seed_from_state(&mut self, state: &DownloadState) {
        self.processed = state.last_processed_index;
        self.completed = state.success_count;
        self.partial = state.partial_count;
        self.failed = state.fail_count;
        self.images_found = state.images_found;
        self.images_downloaded = state.images_downloaded;
        self.images_skipped = state.images_skipped;
        self.images_failed = state.images_failed;
    }

    pub fn progress_line(&self) -> String {
        let percent = if self.total_chapters > 0 {
            self.processed as f64 * 100.0 / self.total_chapters as f64
        } else {
            0.0
        };
        format!(
            "{}: {}/{} chapters ({:.1}%), {} completed, {} partial, {} failed",
            self.comic_name,
            self.processed,
            self.total_chapters,
            percent,
            self.completed,
            self.partial,
            self.failed
        )
    }

    pub fn summary_line(&self) -> String {
        let mut text = format!(
            "{}: {} of {} chapters processed ({} completed, {} partial, {} failed), images: {} downloaded, {} already present, {} failed",
            self.comic_name,
            self.processed,
            self.total_chapters,
            self.completed,
            self.partial,
            self.failed,
            self.images_downloaded,
            self.images_skipped,
            self.images_failed
        );
        if self.interrupted {
            text.push_str(" [interrupted]");
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn chapter(number: &str) -> ChapterRef {
        ChapterRef {
            number: number.to_string(),
            title: format!("第{number}话"),
            url: Url::parse(&format!("https://example.com/comic/1/{number}.html")).unwrap(),
        }
    }

    #[test]
    fn classify_covers_all_outcomes() {
        let mut full = ChapterReport::new(&chapter("1"));
        full.found = 10;
        full.downloaded = 8;
        full.skipped = 2;
        full.classify();
        assert_eq!(full.outcome, ChapterOutcome::Completed);

        let mut partial = ChapterReport::new(&chapter("2"));
        partial.found = 10;
        partial.downloaded = 3;
        partial.failed = 7;
        partial.classify();
        assert_eq!(partial.outcome, ChapterOutcome::PartiallyFailed);

        let mut dead = ChapterReport::new(&chapter("3"));
        dead.found = 10;
        dead.failed = 10;
        dead.classify();
        assert_eq!(dead.outcome, ChapterOutcome::Failed);

        let mut empty = ChapterReport::new(&chapter("4"));
        empty.classify();
        assert_eq!(empty.outcome, ChapterOutcome::Failed);
    }

    #[test]
    fn absorb_accumulates_counts() {
        let mut report = ComicReport::new("test", 2);

        let mut a = ChapterReport::new(&chapter("1"));
        a.found = 5;
        a.downloaded = 5;
        a.classify();
        report.absorb(&a);

        let mut b = ChapterReport::new(&chapter("2"));
        b.found = 4;
        b.downloaded = 1;
        b.skipped = 1;
        b.failed = 2;
        b.classify();
        report.absorb(&b);

        assert_eq!(report.processed, 2);
        assert_eq!(report.completed, 1);
        assert_eq!(report.partial, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.images_found, 9);
        assert_eq!(report.images_downloaded, 6);
        assert_eq!(report.images_skipped, 1);
        assert_eq!(report.images_failed, 2);
        assert_eq!(report.chapters.len(), 2);
    }

    #[test]
    fn summary_marks_interruption() {
        let mut report = ComicReport::new("test", 4);
        report.processed = 1;
        assert!(!report.summary_line().contains("[interrupted]"));
        report.interrupted = true;
        assert!(report.summary_line().contains("[interrupted]"));
    }
}
