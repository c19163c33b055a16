pub mod http;
pub mod resolve;

use anyhow::Result;
use async_trait::async_trait;
use url::Url;

use crate::models::{ChapterRef, ComicInfo, ResolvedChapter};

pub use http::HttpSource;

#[async_trait]
pub trait PageLoader: Send + Sync {
    async fn load_view(&self, url: &Url) -> Result<String>;
}

// Everything the pipeline needs from a comic site. Tests swap in a scripted
// implementation.
#[async_trait]
pub trait ComicSource: Send + Sync {
    async fn comic_info(&self, comic_url: &Url) -> Result<ComicInfo>;

    async fn list_chapters(&self, comic_url: &Url) -> Result<Vec<ChapterRef>>;

    async fn search(&self, keyword: &str) -> Result<Vec<ComicInfo>>;

    // An unreachable first view comes back as an empty result, not an error.
    async fn resolve_chapter(&self, chapter: &ChapterRef) -> Result<ResolvedChapter>;

    // 0 means the site did not say.
    async fn quick_page_count(&self, chapter: &ChapterRef) -> Result<u32>;

    async fn fetch_image(&self, image_url: &Url) -> Result<Vec<u8>>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use anyhow::bail;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    pub(crate) enum FetchScript {
        Fail,
        Empty,
    }

    // Canned site: fixed chapters, per-image failure scripts, call counters.
    pub(crate) struct ScriptedSource {
        pub info: ComicInfo,
        pub chapters: Vec<ChapterRef>,
        pub resolved: HashMap<String, ResolvedChapter>,
        pub scripts: HashMap<String, FetchScript>,
        pub fetch_total: AtomicUsize,
        pub fetch_by_url: Mutex<HashMap<String, usize>>,
        pub resolve_total: AtomicUsize,
        pub cancel_on_resolve: Option<(String, Arc<AtomicBool>)>,
    }

    impl ScriptedSource {
        pub fn new(entries: Vec<(ChapterRef, ResolvedChapter)>) -> Self {
            let chapters = entries.iter().map(|(c, _)| c.clone()).collect();
            let resolved = entries
                .into_iter()
                .map(|(c, r)| (c.url.to_string(), r))
                .collect();
            Self {
                info: ComicInfo {
                    name: "Test Comic".into(),
                    url: Url::parse("https://example.com/comic/1/").unwrap(),
                },
                chapters,
                resolved,
                scripts: HashMap::new(),
                fetch_total: AtomicUsize::new(0),
                fetch_by_url: Mutex::new(HashMap::new()),
                resolve_total: AtomicUsize::new(0),
                cancel_on_resolve: None,
            }
        }

        pub fn script(mut self, url: &Url, script: FetchScript) -> Self {
            self.scripts.insert(url.to_string(), script);
            self
        }

        pub fn fetches_for(&self, url: &Url) -> usize {
            self.fetch_by_url
                .lock()
                .unwrap()
                .get(url.as_str())
                .copied()
                .unwrap_or(0)
        }

        pub fn fetches(&self) -> usize {
            self.fetch_total.load(Ordering::SeqCst)
        }

        pub fn resolves(&self) -> usize {
            self.resolve_total.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ComicSource for ScriptedSource {
        async fn comic_info(&self, _comic_url: &Url) -> Result<ComicInfo> {
            Ok(self.info.clone())
        }

        async fn list_chapters(&self, _comic_url: &Url) -> Result<Vec<ChapterRef>> {
            Ok(self.chapters.clone())
        }

        async fn search(&self, _keyword: &str) -> Result<Vec<ComicInfo>> {
            Ok(vec![self.info.clone()])
        }

        async fn resolve_chapter(&self, chapter: &ChapterRef) -> Result<ResolvedChapter> {
            self.resolve_total.fetch_add(1, Ordering::SeqCst);
            if let Some((url, flag)) = &self.cancel_on_resolve {
                if url == chapter.url.as_str() {
                    flag.store(true, Ordering::SeqCst);
                }
            }
            match self.resolved.get(chapter.url.as_str()) {
                Some(resolved) => Ok(resolved.clone()),
                None => bail!("no script for {}", chapter.url),
            }
        }

        async fn quick_page_count(&self, chapter: &ChapterRef) -> Result<u32> {
            Ok(self
                .resolved
                .get(chapter.url.as_str())
                .map(|r| r.total_hint)
                .unwrap_or(0))
        }

        async fn fetch_image(&self, image_url: &Url) -> Result<Vec<u8>> {
            self.fetch_total.fetch_add(1, Ordering::SeqCst);
            *self
                .fetch_by_url
                .lock()
                .unwrap()
                .entry(image_url.to_string())
                .or_insert(0) += 1;
            match self.scripts.get(image_url.as_str()) {
                Some(FetchScript::Fail) => bail!("scripted failure for {}", image_url),
                Some(FetchScript::Empty) => Ok(Vec::new()),
                None => Ok(format!("img:{image_url}").into_bytes()),
            }
        }
    }
}
