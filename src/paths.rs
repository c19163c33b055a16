use chrono::Utc;
use std::path::{Path, PathBuf};
use url::Url;

use crate::catalog::CatalogStats;
use crate::models::{ComicInfo, ComicReport};

pub fn sanitize_name(name: &str) -> String {
    name.replace(['<', '>', ':', '"', '/', '\\', '|', '?', '*'], "_")
        .trim()
        .to_string()
}

// Chapter directories keep the layout the old scripts wrote, so existing
// collections resume without re-downloading.
pub fn chapter_label(number: &str) -> String {
    format!("第{number}话")
}

pub fn chapter_dir(comic_dir: &Path, number: &str) -> PathBuf {
    comic_dir.join(sanitize_name(&chapter_label(number)))
}

// Zero-pad width that keeps filename order and page order aligned.
pub fn pad_width(total: u32) -> usize {
    total.max(1).to_string().len()
}

pub fn page_file_name(page: u32, total: u32, ext: &str) -> String {
    format!("{:0width$}.{}", page, ext, width = pad_width(total))
}

pub fn image_extension(url: &Url) -> String {
    let ext = Path::new(url.path())
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some(e @ ("jpg" | "jpeg" | "png" | "webp" | "gif")) => e.to_string(),
        _ => "jpg".to_string(),
    }
}

pub fn write_info_txt(
    comic_dir: &Path,
    info: &ComicInfo,
    report: &ComicReport,
    stats: Option<CatalogStats>,
) -> anyhow::Result<()> {
    let mut content = format!(
        "name: {}\nurl: {}\nchapters listed: {}\ncompleted: {} (partial {}, failed {})\nimages: {} downloaded, {} already present, {} failed\n",
        info.name,
        info.url,
        report.total_chapters,
        report.completed,
        report.partial,
        report.failed,
        report.images_downloaded,
        report.images_skipped,
        report.images_failed
    );
    if let Some(stats) = stats {
        content.push_str(&format!(
            "catalog: {} chapters known, {} downloaded, {} images\n",
            stats.chapters, stats.chapters_downloaded, stats.images
        ));
    }
    content.push_str(&format!("last run: {}\n", Utc::now().to_rfc3339()));

    std::fs::write(comic_dir.join("info.txt"), content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sanitize_strips_filesystem_poison() {
        assert_eq!("ONE PIECE", sanitize_name("ONE PIECE"));
        assert_eq!("a_b_c", sanitize_name("a/b\\c"));
        assert_eq!("what_ when_", sanitize_name("what? when*"));
        assert_eq!("题目_第1话", sanitize_name("题目:第1话"));
    }

    #[test]
    fn chapter_dirs_follow_the_old_layout() {
        let dir = chapter_dir(Path::new("/tmp/comic"), "42");
        assert_eq!(Path::new("/tmp/comic/第42话"), dir);
    }

    #[test]
    fn pad_width_tracks_digit_count() {
        assert_eq!(1, pad_width(0));
        assert_eq!(1, pad_width(1));
        assert_eq!(1, pad_width(9));
        assert_eq!(2, pad_width(10));
        assert_eq!(2, pad_width(99));
        assert_eq!(3, pad_width(100));
    }

    #[test]
    fn page_names_pad_to_the_total() {
        assert_eq!("3.jpg", page_file_name(3, 9, "jpg"));
        assert_eq!("03.jpg", page_file_name(3, 12, "jpg"));
        assert_eq!("003.png", page_file_name(3, 184, "png"));
        assert_eq!("100.jpg", page_file_name(100, 100, "jpg"));
    }

    #[test]
    fn extension_comes_from_the_url_path() {
        let jpg = Url::parse("https://i.example.com/a/b/007.JPG?e=123&sig=x").unwrap();
        assert_eq!("jpg", image_extension(&jpg));

        let webp = Url::parse("https://i.example.com/a/b/007.webp").unwrap();
        assert_eq!("webp", image_extension(&webp));

        let odd = Url::parse("https://i.example.com/image.php?id=9").unwrap();
        assert_eq!("jpg", image_extension(&odd));

        let bare = Url::parse("https://i.example.com/image").unwrap();
        assert_eq!("jpg", image_extension(&bare));
    }

    #[test]
    fn info_txt_records_the_run() {
        let dir = tempdir().unwrap();
        let info = ComicInfo {
            name: "Test Comic".into(),
            url: Url::parse("https://example.com/comic/1/").unwrap(),
        };
        let mut report = ComicReport::new("Test Comic", 3);
        report.completed = 2;
        report.failed = 1;
        report.images_downloaded = 20;
        report.images_failed = 4;

        write_info_txt(dir.path(), &info, &report, None).unwrap();

        let text = std::fs::read_to_string(dir.path().join("info.txt")).unwrap();
        assert!(text.contains("name: Test Comic"));
        assert!(text.contains("chapters listed: 3"));
        assert!(text.contains("completed: 2 (partial 0, failed 1)"));
        assert!(text.contains("images: 20 downloaded, 0 already present, 4 failed"));
        assert!(!text.contains("catalog:"));

        let stats = CatalogStats {
            chapters: 3,
            chapters_downloaded: 2,
            images: 20,
        };
        write_info_txt(dir.path(), &info, &report, Some(stats)).unwrap();
        let text = std::fs::read_to_string(dir.path().join("info.txt")).unwrap();
        assert!(text.contains("catalog: 3 chapters known, 2 downloaded, 20 images"));
    }
}
