use anyhow::{bail, Context, Result};
use futures_util::{stream, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

use crate::catalog::Catalog;
use crate::configuration::FetchSettings;
use crate::models::{
    ChapterOutcome, ChapterRef, ChapterReport, ComicReport, DownloadState, ImageRef,
};
use crate::notify::Notifier;
use crate::paths;
use crate::source::ComicSource;

// Pause between attempts at the same image.
const RETRY_PAUSE: Duration = Duration::from_secs(1);

// Chapter-by-chapter downloader for one comic: resolve, fetch with bounded
// retry, skip what is already on disk, checkpoint between chapters.
pub struct BatchFetcher<'a> {
    source: &'a dyn ComicSource,
    options: &'a FetchSettings,
    notifier: &'a Notifier,
    catalog: Option<&'a Catalog>,
    cancel: &'a AtomicBool,
}

struct PageJob {
    image: ImageRef,
    dest: PathBuf,
}

struct PageResult {
    page: u32,
    url: Url,
    dest: PathBuf,
    status: PageStatus,
}

enum PageStatus {
    Downloaded,
    Skipped,
    Failed,
    Cancelled,
}

impl<'a> BatchFetcher<'a> {
    pub fn new(
        source: &'a dyn ComicSource,
        options: &'a FetchSettings,
        notifier: &'a Notifier,
        catalog: Option<&'a Catalog>,
        cancel: &'a AtomicBool,
    ) -> Self {
        Self {
            source,
            options,
            notifier,
            catalog,
            cancel,
        }
    }

    pub async fn download_comic(
        &self,
        comic_name: &str,
        comic_id: Option<i64>,
        chapters: &[ChapterRef],
        comic_dir: &Path,
    ) -> Result<ComicReport> {
        std::fs::create_dir_all(comic_dir)
            .with_context(|| format!("create comic directory {}", comic_dir.display()))?;

        let state_path = DownloadState::path_for(comic_dir);
        let mut state = match DownloadState::load(&state_path) {
            Some(state) if state.total_items == chapters.len() => {
                info!(
                    "Resuming {} from chapter index {}",
                    comic_name, state.last_processed_index
                );
                state
            }
            Some(state) => {
                warn!(
                    "Checkpoint covers {} chapters but the listing has {}, starting over",
                    state.total_items,
                    chapters.len()
                );
                DownloadState::new(chapters.len())
            }
            None => DownloadState::new(chapters.len()),
        };

        let mut report = ComicReport::new(comic_name, chapters.len());
        report.seed_from_state(&state);
        let start_index = state.last_processed_index;

        if start_index > 0 {
            self.notifier
                .summary(&format!(
                    "Resuming {}: {} of {} chapters already processed",
                    comic_name,
                    start_index,
                    chapters.len()
                ))
                .await;
        } else {
            self.notifier
                .summary(&format!("Starting {}: {} chapters", comic_name, chapters.len()))
                .await;
        }

        let delay = self.options.delay_duration();
        let mut since_checkpoint = 0usize;

        for (index, chapter) in chapters.iter().enumerate().skip(start_index) {
            if self.cancel.load(Ordering::SeqCst) {
                report.interrupted = true;
                break;
            }

            info!("Chapter [{}/{}] {}", index + 1, chapters.len(), chapter.title);
            let chapter_report = self.process_chapter(comic_id, chapter, comic_dir).await;

            if chapter_report.interrupted {
                // Mid-chapter interrupt: the chapter does not count as
                // processed and the next run redoes it, skipping whatever
                // already landed on disk.
                report.interrupted = true;
                break;
            }

            state.last_processed_index = index + 1;
            state.apply(&chapter_report);
            let failed_chapter = chapter_report.outcome == ChapterOutcome::Failed;
            report.absorb(&chapter_report);

            since_checkpoint += 1;
            if since_checkpoint >= self.options.checkpoint_interval.max(1) || failed_chapter {
                self.persist(&state, &state_path);
                since_checkpoint = 0;
                self.notifier.progress(&report.progress_line()).await;
            }

            if !delay.is_zero() && index + 1 < chapters.len() {
                sleep(delay).await;
            }
        }

        if report.interrupted {
            warn!(
                "Interrupted, checkpoint kept at chapter index {}",
                state.last_processed_index
            );
            self.persist(&state, &state_path);
        } else {
            // A finished run owes no resume point
            DownloadState::clear(&state_path);
        }

        Ok(report)
    }

    async fn process_chapter(
        &self,
        comic_id: Option<i64>,
        chapter: &ChapterRef,
        comic_dir: &Path,
    ) -> ChapterReport {
        let mut report = ChapterReport::new(chapter);
        let chapter_dir = paths::chapter_dir(comic_dir, &chapter.number);

        if let Some(catalog) = self.catalog {
            match catalog.chapter_downloaded(&chapter.url) {
                Ok(true) if dir_has_files(&chapter_dir) => {
                    debug!("Chapter {} already cataloged, skipping", chapter.title);
                    report.outcome = ChapterOutcome::Completed;
                    report.from_catalog = true;
                    return report;
                }
                Ok(_) => {}
                Err(e) => warn!("Catalog lookup failed for {}: {}", chapter.url, e),
            }
        }

        let resolved = match self.source.resolve_chapter(chapter).await {
            Ok(resolved) => resolved,
            Err(e) => {
                error!("Could not resolve chapter {}: {}", chapter.title, e);
                self.record_history(comic_id, None, "failed", "resolve error");
                return report;
            }
        };
        if resolved.images.is_empty() {
            warn!("No images found for chapter {}", chapter.title);
            self.record_history(comic_id, None, "failed", "no images");
            return report;
        }

        report.found = resolved.images.len();
        report.total_hint = resolved.total_hint;

        if let Err(e) = std::fs::create_dir_all(&chapter_dir) {
            error!("Cannot create {}: {}", chapter_dir.display(), e);
            return report;
        }

        let chapter_id = self.catalog.and_then(|catalog| {
            match catalog.upsert_chapter(comic_id?, chapter, resolved.total_hint) {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!("Could not catalog chapter {}: {}", chapter.title, e);
                    None
                }
            }
        });

        // Pad page numbers to the widest the chapter can reach
        let width_total = resolved.total_hint.max(report.found as u32);
        let jobs: Vec<PageJob> = resolved
            .images
            .iter()
            .map(|image| PageJob {
                dest: chapter_dir.join(paths::page_file_name(
                    image.page,
                    width_total,
                    &paths::image_extension(&image.url),
                )),
                image: image.clone(),
            })
            .collect();

        let bar = progress_bar(report.found as u64, &paths::chapter_label(&chapter.number));
        let mut interrupted = false;
        {
            let mut transfers = stream::iter(jobs)
                .map(|job| self.transfer(job))
                .buffer_unordered(self.options.concurrent_downloads.max(1));

            while let Some(result) = transfers.next().await {
                bar.inc(1);
                match result.status {
                    PageStatus::Downloaded => {
                        report.downloaded += 1;
                        if let (Some(catalog), Some(chapter_id)) = (self.catalog, chapter_id) {
                            if let Err(e) = catalog.record_image(
                                chapter_id,
                                result.page,
                                &result.url,
                                &result.dest,
                            ) {
                                warn!("Could not catalog page {}: {}", result.page, e);
                            }
                        }
                    }
                    PageStatus::Skipped => report.skipped += 1,
                    PageStatus::Failed => report.failed += 1,
                    PageStatus::Cancelled => interrupted = true,
                }
            }
        }
        bar.finish_and_clear();

        if interrupted {
            report.interrupted = true;
            return report;
        }

        report.classify();
        if report.outcome == ChapterOutcome::Completed {
            if let (Some(catalog), Some(chapter_id)) = (self.catalog, chapter_id) {
                if let Err(e) = catalog.mark_chapter_downloaded(chapter_id) {
                    warn!("Could not flag chapter {} downloaded: {}", chapter.title, e);
                }
            }
        }
        self.record_history(
            comic_id,
            chapter_id,
            outcome_status(report.outcome),
            &format!(
                "{} downloaded, {} skipped, {} failed of {}",
                report.downloaded, report.skipped, report.failed, report.found
            ),
        );
        info!(
            "Chapter {}: {}/{} images on disk ({} new, {} already present, {} failed)",
            chapter.title,
            report.satisfied(),
            report.found,
            report.downloaded,
            report.skipped,
            report.failed
        );

        report
    }

    async fn transfer(&self, job: PageJob) -> PageResult {
        if file_satisfied(&job.dest) {
            debug!("Page file {} exists, skipping", job.dest.display());
            return result(job, PageStatus::Skipped);
        }

        let delay = self.options.delay_duration();
        let attempts = self.options.retry.max(1);
        for attempt in 1..=attempts {
            if self.cancel.load(Ordering::SeqCst) {
                return result(job, PageStatus::Cancelled);
            }
            if !delay.is_zero() {
                sleep(delay).await;
            }
            let outcome = self.fetch_once(&job).await;
            match outcome {
                Ok(()) => return result(job, PageStatus::Downloaded),
                Err(e) if attempt < attempts => {
                    debug!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt, attempts, job.image.url, e
                    );
                    sleep(RETRY_PAUSE).await;
                }
                Err(e) => {
                    warn!(
                        "Giving up on {} after {} attempts: {}",
                        job.image.url, attempts, e
                    );
                }
            }
        }
        result(job, PageStatus::Failed)
    }

    async fn fetch_once(&self, job: &PageJob) -> Result<()> {
        let bytes = self.source.fetch_image(&job.image.url).await?;
        if bytes.is_empty() {
            bail!("empty response body");
        }
        tokio::fs::write(&job.dest, &bytes)
            .await
            .with_context(|| format!("write {}", job.dest.display()))?;
        Ok(())
    }

    fn persist(&self, state: &DownloadState, path: &Path) {
        if let Err(e) = state.save(path) {
            warn!("Could not write checkpoint {}: {}", path.display(), e);
        }
    }

    fn record_history(
        &self,
        comic_id: Option<i64>,
        chapter_id: Option<i64>,
        status: &str,
        detail: &str,
    ) {
        if let Some(catalog) = self.catalog {
            if let Err(e) =
                catalog.record_history(comic_id, chapter_id, "chapter", status, Some(detail))
            {
                warn!("Could not record fetch history: {}", e);
            }
        }
    }
}

fn result(job: PageJob, status: PageStatus) -> PageResult {
    PageResult {
        page: job.image.page,
        url: job.image.url,
        dest: job.dest,
        status,
    }
}

fn outcome_status(outcome: ChapterOutcome) -> &'static str {
    match outcome {
        ChapterOutcome::Completed => "completed",
        ChapterOutcome::PartiallyFailed => "partial",
        ChapterOutcome::Failed => "failed",
    }
}

// A zero-byte file is a truncated earlier write, not a download
fn file_satisfied(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

fn dir_has_files(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

fn progress_bar(len: u64, label: &str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:30}] {pos}/{len}") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(label.to_string());
    bar
}
