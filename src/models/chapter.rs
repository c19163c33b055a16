use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComicInfo {
    pub name: String,
    pub url: Url,
}

// One chapter as listed on a comic's landing page. Identity is the URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterRef {
    pub number: String,
    pub title: String,
    pub url: Url,
}

// page is 1-based and follows first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub page: u32,
    pub url: Url,
}

// total_hint is the viewer's claimed page count and never undercounts the
// collected images.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedChapter {
    pub images: Vec<ImageRef>,
    pub total_hint: u32,
}
