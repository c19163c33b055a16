use log::{debug, warn};
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

use super::PageLoader;
use crate::models::{ImageRef, ResolvedChapter};

// Hard ceiling on viewer pages per chapter.
pub const MAX_VIEWER_PAGES: usize = 1000;

const IMAGE_ATTRS: &[&str] = &["src", "data-src", "data-original"];
const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "webp"];
const SKIP_MARKERS: &[&str] = &["logo", "icon", "banner", "ad", "avatar"];
const INDICATOR_SELECTORS: &[&str] = &["span.manga-page", "#pageNo"];
const DIALOG_SELECTORS: &[&str] = &["#checkAdult", ".alert-mask"];
const NEXT_TEXT: &str = "下一页";

// Viewer position like "12/184P"; single-page chapters show a bare number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageIndicator {
    pub current: u32,
    pub total: Option<u32>,
}

pub fn parse_indicator(text: &str) -> Option<PageIndicator> {
    let text = text.trim();
    if let Some((current, total)) = text.split_once('/') {
        let current = current.trim().parse().ok()?;
        let total = total.trim().trim_end_matches(['P', 'p']).trim().parse().ok()?;
        Some(PageIndicator {
            current,
            total: Some(total),
        })
    } else {
        text.parse().ok().map(|current| PageIndicator {
            current,
            total: None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ViewPage {
    pub images: Vec<Url>,
    pub indicator: Option<PageIndicator>,
    pub next: Option<Url>,
    pub dialog: bool,
}

pub fn parse_view(html: &str, view_url: &Url) -> ViewPage {
    let doc = Html::parse_document(html);

    let dialog = DIALOG_SELECTORS.iter().any(|s| {
        Selector::parse(s)
            .map(|sel| doc.select(&sel).next().is_some())
            .unwrap_or(false)
    });

    let mut images = Vec::new();
    let mut seen = HashSet::new();
    if let Ok(sel) = Selector::parse("img") {
        for img in doc.select(&sel) {
            let Some(src) = IMAGE_ATTRS.iter().copied().find_map(|a| img.value().attr(a)) else {
                continue;
            };
            if !looks_like_content_image(src) {
                continue;
            }
            let Ok(resolved) = view_url.join(src) else {
                continue;
            };
            if seen.insert(resolved.to_string()) {
                images.push(resolved);
            }
        }
    }

    let indicator = INDICATOR_SELECTORS.iter().find_map(|s| {
        let sel = Selector::parse(s).ok()?;
        let el = doc.select(&sel).next()?;
        parse_indicator(&el.text().collect::<String>())
    });

    let next = find_next_link(&doc, view_url);

    ViewPage {
        images,
        indicator,
        next,
        dialog,
    }
}

fn looks_like_content_image(src: &str) -> bool {
    let lower = src.to_ascii_lowercase();
    IMAGE_EXTS.iter().any(|e| lower.contains(e))
        && !SKIP_MARKERS.iter().any(|m| lower.contains(m))
}

fn find_next_link(doc: &Html, view_url: &Url) -> Option<Url> {
    let sel = Selector::parse("a").ok()?;
    for a in doc.select(&sel) {
        let is_next = a
            .value()
            .attr("data-action")
            .map_or(false, |v| v.contains("next"))
            || a.text().collect::<String>().contains(NEXT_TEXT);
        if !is_next {
            continue;
        }
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        // Fragment-only links are button wiring, nothing to follow
        if href.trim().is_empty() || href.starts_with('#') {
            continue;
        }
        if let Ok(next) = view_url.join(href) {
            return Some(next);
        }
    }
    None
}

// Walks the viewer pages, collecting images in first-seen order. Stops on the
// indicator's last page, a confirmation dialog, a missing next link, or the
// hard bound. An unreachable first view yields an empty result.
pub async fn resolve_chapter_images(
    loader: &dyn PageLoader,
    chapter_url: &Url,
    delay: Duration,
) -> ResolvedChapter {
    let mut images: Vec<ImageRef> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut indicator_total: Option<u32> = None;
    let mut view_url = chapter_url.clone();

    for view_no in 0..MAX_VIEWER_PAGES {
        let html = match loader.load_view(&view_url).await {
            Ok(html) => html,
            Err(e) if view_no == 0 => {
                warn!("Chapter view {} did not load: {}", view_url, e);
                return ResolvedChapter::default();
            }
            Err(e) => {
                warn!(
                    "View {} of {} did not load, keeping {} images: {}",
                    view_no + 1,
                    chapter_url,
                    images.len(),
                    e
                );
                break;
            }
        };

        let view = parse_view(&html, &view_url);

        if view.dialog {
            debug!("Confirmation dialog on {}, stopping", view_url);
            break;
        }

        for url in view.images {
            if seen.insert(url.to_string()) {
                images.push(ImageRef {
                    page: images.len() as u32 + 1,
                    url,
                });
            }
        }
        debug!("View {}: {} images collected", view_no + 1, images.len());

        if let Some(indicator) = view.indicator {
            if view_no == 0 {
                indicator_total = indicator.total;
            }
            if indicator.total == Some(indicator.current) {
                debug!("Last view reached ({}/{})", indicator.current, indicator.current);
                break;
            }
        }

        match view.next {
            Some(next) => {
                view_url = next;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            None => break,
        }
    }

    // The indicator can undercount chapters whose views carry several
    // images, and a truncated walk undercounts the indicator.
    let total_hint = indicator_total.unwrap_or(0).max(images.len() as u32);
    ResolvedChapter { images, total_hint }
}

// Reads only the first view's indicator, no walk.
pub async fn quick_page_count(loader: &dyn PageLoader, chapter_url: &Url) -> u32 {
    let html = match loader.load_view(chapter_url).await {
        Ok(html) => html,
        Err(e) => {
            warn!("Chapter view {} did not load: {}", chapter_url, e);
            return 0;
        }
    };
    match parse_view(&html, chapter_url).indicator {
        Some(PageIndicator { total: Some(total), .. }) => total,
        Some(PageIndicator { current, total: None }) => current,
        None => 0,
    }
}
