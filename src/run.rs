use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use resolve_path::PathResolveExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::Url;

use crate::catalog::Catalog;
use crate::check;
use crate::configuration::{ComicEntry, Settings};
use crate::fetcher::BatchFetcher;
use crate::models::cli::{ChaptersArgs, CheckArgs, DownloadArgs, SearchArgs};
use crate::models::{ChapterRef, ComicReport};
use crate::notify::Notifier;
use crate::paths;
use crate::source::{ComicSource, HttpSource};

pub async fn download(settings: Settings, args: DownloadArgs) -> Result<()> {
    let save_root = resolve_save_root(&settings)?;
    info!("Output directory: {}", save_root.display());

    let source = HttpSource::new(&settings.source, &settings.fetch)?;
    let notifier = Notifier::new(&settings.telegram, settings.fetch.notify_level);
    let catalog = open_catalog(&settings, &save_root);

    let cancel = Arc::new(AtomicBool::new(false));
    spawn_ctrl_c_listener(cancel.clone());

    let entries = entries_for(&settings, &args);
    if entries.is_empty() {
        bail!("no comics to download: pass --url or add a comics list to the configuration");
    }

    let mut failures = 0usize;
    for entry in &entries {
        match download_one(
            &source,
            &notifier,
            catalog.as_ref(),
            &settings,
            &save_root,
            entry,
            &cancel,
        )
        .await
        {
            Ok(report) => {
                info!("{}", report.summary_line());
                notifier.summary(&report.summary_line()).await;
                if report.interrupted {
                    break;
                }
            }
            Err(e) => {
                error!("Download failed for {}: {:#}", entry.url, e);
                notifier
                    .summary(&format!("Download failed for {}: {e:#}", entry.url))
                    .await;
                failures += 1;
            }
        }
        if cancel.load(Ordering::SeqCst) {
            break;
        }
    }

    if failures == entries.len() {
        bail!("every download failed");
    }
    info!("Finished!");
    Ok(())
}

async fn download_one(
    source: &HttpSource,
    notifier: &Notifier,
    catalog: Option<&Catalog>,
    settings: &Settings,
    save_root: &Path,
    entry: &ComicEntry,
    cancel: &AtomicBool,
) -> Result<ComicReport> {
    let comic_url =
        Url::parse(&entry.url).with_context(|| format!("invalid comic url {}", entry.url))?;

    let info = source
        .comic_info(&comic_url)
        .await
        .context("load comic info")?;
    // Name override from the config entry wins
    let comic_name = entry.name.clone().unwrap_or_else(|| info.name.clone());
    info!("Checking comic: {}", comic_name);

    let comic_id = catalog.and_then(|catalog| match catalog.upsert_comic(&info) {
        Ok(id) => Some(id),
        Err(e) => {
            warn!("Could not catalog comic {}: {}", comic_name, e);
            None
        }
    });

    let mut chapters = source
        .list_chapters(&comic_url)
        .await
        .context("list chapters")?;
    if chapters.is_empty() {
        bail!("no chapters listed at {comic_url}");
    }
    if entry.reverse {
        chapters.reverse();
    }
    let chapters = filter_chapter_range(chapters, entry.start_chapter, entry.end_chapter);
    if chapters.is_empty() {
        bail!("chapter range filter left nothing to download");
    }
    info!("{} chapters selected", chapters.len());

    let comic_dir = save_root.join(paths::sanitize_name(&comic_name));
    let fetcher = BatchFetcher::new(source, &settings.fetch, notifier, catalog, cancel);
    let report = fetcher
        .download_comic(&comic_name, comic_id, &chapters, &comic_dir)
        .await?;

    let stats = match (catalog, comic_id) {
        (Some(catalog), Some(id)) => catalog.comic_stats(id).ok(),
        _ => None,
    };
    if let Err(e) = paths::write_info_txt(&comic_dir, &info, &report, stats) {
        warn!("Could not write info.txt: {}", e);
    }

    Ok(report)
}

pub async fn list_chapters(settings: Settings, args: ChaptersArgs) -> Result<()> {
    let source = HttpSource::new(&settings.source, &settings.fetch)?;
    let url = Url::parse(&args.url).with_context(|| format!("invalid comic url {}", args.url))?;

    let chapters = source.list_chapters(&url).await?;
    for chapter in &chapters {
        println!("{}\t{}\t{}", chapter.number, chapter.title, chapter.url);
    }
    println!("{} chapters", chapters.len());
    Ok(())
}

pub async fn search(settings: Settings, args: SearchArgs) -> Result<()> {
    let source = HttpSource::new(&settings.source, &settings.fetch)?;

    let comics = source.search(&args.keyword).await?;
    if comics.is_empty() {
        println!("Nothing found for \"{}\"", args.keyword);
        return Ok(());
    }
    for comic in &comics {
        println!("{}\t{}", comic.name, comic.url);
    }
    Ok(())
}

pub async fn check(settings: Settings, args: CheckArgs) -> Result<()> {
    let save_root = resolve_save_root(&settings)?;
    let source = HttpSource::new(&settings.source, &settings.fetch)?;
    let catalog = open_catalog(&settings, &save_root);
    let url = Url::parse(&args.url).with_context(|| format!("invalid comic url {}", args.url))?;

    let info = source.comic_info(&url).await.context("load comic info")?;
    let chapters = source.list_chapters(&url).await?;
    let comic_dir = save_root.join(paths::sanitize_name(&info.name));

    let report = check::audit_comic(
        &source,
        catalog.as_ref(),
        &info.name,
        &chapters,
        &comic_dir,
        args.verify,
    )
    .await?;

    println!(
        "{}: {} chapters, {} complete, {} missing, {} incomplete",
        report.comic_name, report.total, report.complete, report.missing, report.incomplete
    );
    if !report.clean() {
        println!("Run the download command again to fill the gaps");
    }
    Ok(())
}

fn resolve_save_root(settings: &Settings) -> Result<PathBuf> {
    let root = settings.save_path.resolve().into_owned();
    std::fs::create_dir_all(&root)
        .with_context(|| format!("create output directory {}", root.display()))?;
    Ok(root)
}

fn open_catalog(settings: &Settings, save_root: &Path) -> Option<Catalog> {
    if !settings.database.enabled {
        return None;
    }
    let path = settings
        .database
        .path
        .as_ref()
        .map(|p| p.resolve().into_owned())
        .unwrap_or_else(|| save_root.join("comichub.sqlite"));
    match Catalog::open(&path) {
        Ok(catalog) => {
            info!("Catalog open at {}", path.display());
            Some(catalog)
        }
        Err(e) => {
            warn!("Catalog unavailable ({}), continuing without it", e);
            None
        }
    }
}

fn entries_for(settings: &Settings, args: &DownloadArgs) -> Vec<ComicEntry> {
    if let Some(url) = &args.url {
        return vec![ComicEntry {
            url: url.clone(),
            name: None,
            start_chapter: args.start_chapter,
            end_chapter: args.end_chapter,
            reverse: args.reverse,
        }];
    }
    let mut entries = settings.comics.clone();
    // Range flags narrow configured entries too
    for entry in &mut entries {
        if args.start_chapter.is_some() {
            entry.start_chapter = args.start_chapter;
        }
        if args.end_chapter.is_some() {
            entry.end_chapter = args.end_chapter;
        }
        if args.reverse {
            entry.reverse = true;
        }
    }
    entries
}

fn filter_chapter_range(
    chapters: Vec<ChapterRef>,
    start: Option<u32>,
    end: Option<u32>,
) -> Vec<ChapterRef> {
    if start.is_none() && end.is_none() {
        return chapters;
    }
    chapters
        .into_iter()
        .filter(|chapter| match chapter.number.parse::<u32>() {
            // Specials without a numeric key are always kept
            Err(_) => true,
            Ok(n) => start.map_or(true, |s| n >= s) && end.map_or(true, |e| n <= e),
        })
        .collect()
}

fn spawn_ctrl_c_listener(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl-c handler unavailable: {}", e);
            return;
        }
        warn!("Interrupt received, stopping after the current chapter");
        cancel.store(true, Ordering::SeqCst);
    });
}
