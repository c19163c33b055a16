use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, REFERER, USER_AGENT};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

use super::{resolve, ComicSource, PageLoader};
use crate::configuration::{FetchSettings, SourceSettings};
use crate::models::{ChapterRef, ComicInfo, ResolvedChapter};

const BROWSER_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

// Listing and viewer pages go through the retrying middleware client; image
// bytes use a bare client, the fetcher owns the per-image attempt count.
pub struct HttpSource {
    base_url: Url,
    pages: ClientWithMiddleware,
    images: reqwest::Client,
    delay: Duration,
}

impl HttpSource {
    pub fn new(source: &SourceSettings, fetch: &FetchSettings) -> Result<Self> {
        let base_url = Url::parse(&source.base_url)
            .with_context(|| format!("invalid base url {}", source.base_url))?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
        headers.insert(REFERER, HeaderValue::from_str(base_url.as_str())?);
        if let Some(cookie) = &source.cookie {
            // Pre-seeded session cookie doubles as the adult-gate consent
            headers.insert(
                COOKIE,
                HeaderValue::from_str(cookie).context("invalid session cookie")?,
            );
        }

        let plain = reqwest::Client::builder()
            .timeout(fetch.timeout_duration())
            .default_headers(headers)
            .build()?;

        // Retry up to 3 times with increasing intervals between attempts.
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let pages = ClientBuilder::new(plain.clone())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            base_url,
            pages,
            images: plain,
            delay: fetch.delay_duration(),
        })
    }

    async fn get_text(&self, url: &Url) -> Result<String> {
        debug!("GET {}", url);
        let res = self.pages.get(url.clone()).send().await?;
        let res = res.error_for_status()?;
        Ok(res.text().await?)
    }
}

#[async_trait]
impl PageLoader for HttpSource {
    async fn load_view(&self, url: &Url) -> Result<String> {
        self.get_text(url).await
    }
}

#[async_trait]
impl ComicSource for HttpSource {
    async fn comic_info(&self, comic_url: &Url) -> Result<ComicInfo> {
        let html = self
            .get_text(comic_url)
            .await
            .with_context(|| format!("load comic page {comic_url}"))?;
        parse_comic_page(&html, comic_url)
    }

    async fn list_chapters(&self, comic_url: &Url) -> Result<Vec<ChapterRef>> {
        let html = self
            .get_text(comic_url)
            .await
            .with_context(|| format!("load comic page {comic_url}"))?;
        let chapters = parse_chapter_list(&html, comic_url)?;
        info!("Found {} chapters at {}", chapters.len(), comic_url);
        Ok(chapters)
    }

    async fn search(&self, keyword: &str) -> Result<Vec<ComicInfo>> {
        let url = self.base_url.join(&format!("/s/{keyword}"))?;
        let html = self
            .get_text(&url)
            .await
            .with_context(|| format!("load search page {url}"))?;
        parse_search_page(&html, &self.base_url)
    }

    async fn resolve_chapter(&self, chapter: &ChapterRef) -> Result<ResolvedChapter> {
        Ok(resolve::resolve_chapter_images(self, &chapter.url, self.delay).await)
    }

    async fn quick_page_count(&self, chapter: &ChapterRef) -> Result<u32> {
        Ok(resolve::quick_page_count(self, &chapter.url).await)
    }

    async fn fetch_image(&self, image_url: &Url) -> Result<Vec<u8>> {
        let res = self.images.get(image_url.clone()).send().await?;
        let res = res.error_for_status()?;
        let bytes = res.bytes().await?;
        Ok(bytes.to_vec())
    }
}

fn parse_comic_page(html: &str, comic_url: &Url) -> Result<ComicInfo> {
    let doc = Html::parse_document(html);
    let sel = selector("h1")?;
    let name = doc
        .select(&sel)
        .next()
        .map(|h| h.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("comic page has no title: {comic_url}"))?;
    Ok(ComicInfo {
        name,
        url: comic_url.clone(),
    })
}

fn parse_chapter_list(html: &str, comic_url: &Url) -> Result<Vec<ChapterRef>> {
    let chapter_href = Regex::new(r"/(\d+)\.html$")?;
    let chapter_num = Regex::new(r"第(\d+)[话章节]")?;

    let doc = Html::parse_document(html);
    let sel = selector(r#"a[href*="/comic/"]"#)?;

    let mut chapters = Vec::new();
    let mut seen_numbers = HashSet::new();
    for a in doc.select(&sel) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let Some(caps) = chapter_href.captures(href) else {
            continue;
        };
        let url_id = caps[1].to_string();
        let Ok(url) = comic_url.join(href) else {
            continue;
        };
        let title = a.text().collect::<String>().trim().to_string();
        // Chapter key from the title when it carries one, else the URL id
        let number = chapter_num
            .captures(&title)
            .map(|c| c[1].to_string())
            .unwrap_or(url_id);
        if seen_numbers.insert(number.clone()) {
            chapters.push(ChapterRef { number, title, url });
        }
    }
    Ok(chapters)
}

fn parse_search_page(html: &str, base_url: &Url) -> Result<Vec<ComicInfo>> {
    let comic_href = Regex::new(r"/comic/(\d+)/?$")?;

    let doc = Html::parse_document(html);
    let sel = selector(r#"a[href*="/comic/"]"#)?;

    let mut comics = Vec::new();
    let mut seen_ids = HashSet::new();
    for a in doc.select(&sel) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let Some(caps) = comic_href.captures(href) else {
            continue;
        };
        if !seen_ids.insert(caps[1].to_string()) {
            continue;
        }
        let Ok(url) = base_url.join(href) else {
            continue;
        };
        let name = match a.value().attr("title") {
            Some(title) if !title.trim().is_empty() => title.trim().to_string(),
            _ => a.text().collect::<String>().trim().to_string(),
        };
        if name.is_empty() {
            continue;
        }
        comics.push(ComicInfo { name, url });
    }
    Ok(comics)
}

fn selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| anyhow!("bad selector {s}: {e}"))
}
