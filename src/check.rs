use anyhow::Result;
use log::{info, warn};
use std::path::Path;

use crate::catalog::Catalog;
use crate::models::ChapterRef;
use crate::paths;
use crate::source::ComicSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterStatus {
    Complete,
    Missing,
    EmptyDir,
    ZeroByteFiles,
    MissingPages,
}

#[derive(Debug, Clone)]
pub struct ChapterFinding {
    pub number: String,
    pub title: String,
    pub status: ChapterStatus,
    pub files: usize,
    pub expected: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub comic_name: String,
    pub total: usize,
    pub complete: usize,
    pub missing: usize,
    pub incomplete: usize,
    pub findings: Vec<ChapterFinding>,
}

impl CheckReport {
    fn new(comic_name: &str, total: usize) -> Self {
        Self {
            comic_name: comic_name.to_string(),
            total,
            ..Default::default()
        }
    }

    pub fn clean(&self) -> bool {
        self.missing == 0 && self.incomplete == 0
    }
}

// Audits one comic's tree against its chapter listing. With verify the file
// count is also compared to an expected page count; see expected_count for
// where that number comes from.
pub async fn audit_comic(
    source: &dyn ComicSource,
    catalog: Option<&Catalog>,
    comic_name: &str,
    chapters: &[ChapterRef],
    comic_dir: &Path,
    verify: bool,
) -> Result<CheckReport> {
    let mut report = CheckReport::new(comic_name, chapters.len());

    for chapter in chapters {
        let dir = paths::chapter_dir(comic_dir, &chapter.number);

        let mut files = 0;
        let mut expected = None;
        let status = if !dir.exists() {
            ChapterStatus::Missing
        } else {
            let sizes = file_sizes(&dir);
            files = sizes.len();
            if sizes.is_empty() {
                ChapterStatus::EmptyDir
            } else if sizes.iter().any(|&len| len == 0) {
                ChapterStatus::ZeroByteFiles
            } else if verify {
                expected = expected_count(source, catalog, chapter).await;
                match expected {
                    Some(want) if (files as u32) < want => ChapterStatus::MissingPages,
                    _ => ChapterStatus::Complete,
                }
            } else {
                ChapterStatus::Complete
            }
        };

        match status {
            ChapterStatus::Complete => {
                report.complete += 1;
                info!("Chapter {} ok ({} files)", chapter.title, files);
            }
            ChapterStatus::Missing => {
                report.missing += 1;
                warn!("Chapter {} has not been downloaded", chapter.title);
            }
            ChapterStatus::EmptyDir => {
                report.incomplete += 1;
                warn!("Chapter {} directory is empty", chapter.title);
            }
            ChapterStatus::ZeroByteFiles => {
                report.incomplete += 1;
                warn!("Chapter {} has truncated files", chapter.title);
            }
            ChapterStatus::MissingPages => {
                report.incomplete += 1;
                warn!(
                    "Chapter {} has {} of {} pages",
                    chapter.title,
                    files,
                    expected.unwrap_or(0)
                );
            }
        }
        report.findings.push(ChapterFinding {
            number: chapter.number.clone(),
            title: chapter.title.clone(),
            status,
            files,
            expected,
        });
    }

    Ok(report)
}

// Cheapest source wins: the catalog, falling back to the viewer indicator,
// falling back to a full resolve.
async fn expected_count(
    source: &dyn ComicSource,
    catalog: Option<&Catalog>,
    chapter: &ChapterRef,
) -> Option<u32> {
    if let Some(catalog) = catalog {
        match catalog.expected_page_count(&chapter.url) {
            Ok(Some(count)) => return Some(count),
            Ok(None) => {}
            Err(e) => warn!("Catalog lookup failed for {}: {}", chapter.url, e),
        }
    }

    match source.quick_page_count(chapter).await {
        Ok(count) if count > 0 => return Some(count),
        Ok(_) => {}
        Err(e) => warn!("Quick count failed for {}: {}", chapter.title, e),
    }

    match source.resolve_chapter(chapter).await {
        Ok(resolved) if !resolved.images.is_empty() => Some(resolved.total_hint),
        Ok(_) => None,
        Err(e) => {
            warn!("Could not resolve {} for the audit: {}", chapter.title, e);
            None
        }
    }
}

fn file_sizes(dir: &Path) -> Vec<u64> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut sizes = Vec::new();
    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.is_file() {
            sizes.push(meta.len());
        }
    }
    sizes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ImageRef, ResolvedChapter};
    use crate::source::testing::ScriptedSource;
    use tempfile::tempdir;
    use url::Url;

    fn chapter(n: u32) -> ChapterRef {
        ChapterRef {
            number: n.to_string(),
            title: format!("第{n}话"),
            url: Url::parse(&format!("https://example.com/comic/1/{n}.html")).unwrap(),
        }
    }

    fn resolved(pages: u32) -> ResolvedChapter {
        ResolvedChapter {
            images: (1..=pages)
                .map(|page| ImageRef {
                    page,
                    url: Url::parse(&format!("https://i.example.com/{page}.jpg")).unwrap(),
                })
                .collect(),
            total_hint: pages,
        }
    }

    fn write_pages(dir: &Path, count: u32, empty_last: bool) {
        std::fs::create_dir_all(dir).unwrap();
        for page in 1..=count {
            let body: &[u8] = if empty_last && page == count {
                b""
            } else {
                b"page bytes"
            };
            std::fs::write(dir.join(format!("{page}.jpg")), body).unwrap();
        }
    }

    #[tokio::test]
    async fn flags_missing_empty_and_truncated_chapters() {
        let dir = tempdir().unwrap();
        let comic_dir = dir.path();
        let source = ScriptedSource::new(vec![
            (chapter(1), resolved(3)),
            (chapter(2), resolved(3)),
            (chapter(3), resolved(3)),
            (chapter(4), resolved(3)),
        ]);

        write_pages(&paths::chapter_dir(comic_dir, "1"), 3, false);
        std::fs::create_dir_all(paths::chapter_dir(comic_dir, "2")).unwrap();
        write_pages(&paths::chapter_dir(comic_dir, "3"), 2, true);
        // Chapter 4 has no directory at all

        let report = audit_comic(&source, None, "Test Comic", &source.chapters, comic_dir, false)
            .await
            .unwrap();

        assert_eq!(4, report.total);
        assert_eq!(1, report.complete);
        assert_eq!(1, report.missing);
        assert_eq!(2, report.incomplete);
        assert!(!report.clean());
        assert_eq!(ChapterStatus::Complete, report.findings[0].status);
        assert_eq!(ChapterStatus::EmptyDir, report.findings[1].status);
        assert_eq!(ChapterStatus::ZeroByteFiles, report.findings[2].status);
        assert_eq!(ChapterStatus::Missing, report.findings[3].status);
    }

    #[tokio::test]
    async fn verify_compares_against_expected_pages() {
        let dir = tempdir().unwrap();
        let comic_dir = dir.path();
        let source = ScriptedSource::new(vec![
            (chapter(1), resolved(5)),
            (chapter(2), resolved(3)),
        ]);

        write_pages(&paths::chapter_dir(comic_dir, "1"), 2, false);
        write_pages(&paths::chapter_dir(comic_dir, "2"), 3, false);

        let relaxed = audit_comic(&source, None, "Test Comic", &source.chapters, comic_dir, false)
            .await
            .unwrap();
        assert_eq!(2, relaxed.complete);

        let strict = audit_comic(&source, None, "Test Comic", &source.chapters, comic_dir, true)
            .await
            .unwrap();
        assert_eq!(1, strict.complete);
        assert_eq!(1, strict.incomplete);
        assert_eq!(ChapterStatus::MissingPages, strict.findings[0].status);
        assert_eq!(Some(5), strict.findings[0].expected);
        assert_eq!(2, strict.findings[0].files);
        assert_eq!(ChapterStatus::Complete, strict.findings[1].status);
    }

    #[tokio::test]
    async fn verify_prefers_the_catalog_count() {
        let dir = tempdir().unwrap();
        let comic_dir = dir.path().join("comic");
        let source = ScriptedSource::new(vec![(chapter(1), resolved(9))]);

        let catalog = Catalog::open(&dir.path().join("catalog.sqlite")).unwrap();
        let comic_id = catalog.upsert_comic(&source.info).unwrap();
        catalog.upsert_chapter(comic_id, &chapter(1), 2).unwrap();

        write_pages(&paths::chapter_dir(&comic_dir, "1"), 2, false);

        let report = audit_comic(
            &source,
            Some(&catalog),
            "Test Comic",
            &source.chapters,
            &comic_dir,
            true,
        )
        .await
        .unwrap();

        // Catalog said 2 pages, so 2 files on disk is complete; the site
        // was never probed
        assert_eq!(1, report.complete);
        assert_eq!(Some(2), report.findings[0].expected);
        assert_eq!(0, source.resolves());
    }
}
