use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::models::{ChapterRef, ComicInfo};

// SQLite record of what has been durably fetched. Everything here is
// advisory: callers log write failures and fall back to filesystem checks.
pub struct Catalog {
    conn: Connection,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CatalogStats {
    pub chapters: usize,
    pub chapters_downloaded: usize,
    pub images: usize,
}

impl Catalog {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(10))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let catalog = Self { conn };
        catalog.migrate()?;
        Ok(catalog)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS comics (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS chapters (
                id INTEGER PRIMARY KEY,
                comic_id INTEGER NOT NULL REFERENCES comics(id) ON DELETE CASCADE,
                number TEXT NOT NULL,
                title TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                page_count INTEGER NOT NULL DEFAULT 0,
                downloaded INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS images (
                id INTEGER PRIMARY KEY,
                chapter_id INTEGER NOT NULL REFERENCES chapters(id) ON DELETE CASCADE,
                page INTEGER NOT NULL,
                url TEXT NOT NULL,
                path TEXT NOT NULL,
                UNIQUE(chapter_id, page)
            );
            CREATE TABLE IF NOT EXISTS fetch_history (
                id INTEGER PRIMARY KEY,
                comic_id INTEGER,
                chapter_id INTEGER,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                detail TEXT,
                fetched_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chapters_comic ON chapters(comic_id);
            CREATE INDEX IF NOT EXISTS idx_images_chapter ON images(chapter_id);",
        )?;
        Ok(())
    }

    pub fn upsert_comic(&self, info: &ComicInfo) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO comics (name, url, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(url) DO UPDATE SET name = excluded.name",
            params![info.name, info.url.as_str(), Utc::now().to_rfc3339()],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM comics WHERE url = ?1",
            params![info.url.as_str()],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn upsert_chapter(
        &self,
        comic_id: i64,
        chapter: &ChapterRef,
        page_count: u32,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO chapters (comic_id, number, title, url, page_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(url) DO UPDATE SET title = excluded.title, page_count = excluded.page_count",
            params![
                comic_id,
                chapter.number,
                chapter.title,
                chapter.url.as_str(),
                page_count,
                Utc::now().to_rfc3339()
            ],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM chapters WHERE url = ?1",
            params![chapter.url.as_str()],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn chapter_downloaded(&self, url: &Url) -> Result<bool> {
        let downloaded: Option<i64> = self
            .conn
            .query_row(
                "SELECT downloaded FROM chapters WHERE url = ?1",
                params![url.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(downloaded == Some(1))
    }

    // Only call this once every page file of the chapter is on disk.
    pub fn mark_chapter_downloaded(&self, chapter_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE chapters SET downloaded = 1 WHERE id = ?1",
            params![chapter_id],
        )?;
        Ok(())
    }

    pub fn expected_page_count(&self, url: &Url) -> Result<Option<u32>> {
        let count: Option<u32> = self
            .conn
            .query_row(
                "SELECT page_count FROM chapters WHERE url = ?1",
                params![url.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.filter(|&n| n > 0))
    }

    pub fn record_image(&self, chapter_id: i64, page: u32, url: &Url, path: &Path) -> Result<()> {
        self.conn.execute(
            "INSERT INTO images (chapter_id, page, url, path) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(chapter_id, page) DO UPDATE SET url = excluded.url, path = excluded.path",
            params![
                chapter_id,
                page,
                url.as_str(),
                path.to_string_lossy().into_owned()
            ],
        )?;
        Ok(())
    }

    pub fn record_history(
        &self,
        comic_id: Option<i64>,
        chapter_id: Option<i64>,
        kind: &str,
        status: &str,
        detail: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO fetch_history (comic_id, chapter_id, kind, status, detail, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                comic_id,
                chapter_id,
                kind,
                status,
                detail,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn comic_stats(&self, comic_id: i64) -> Result<CatalogStats> {
        let chapters: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM chapters WHERE comic_id = ?1",
            params![comic_id],
            |row| row.get(0),
        )?;
        let chapters_downloaded: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM chapters WHERE comic_id = ?1 AND downloaded = 1",
            params![comic_id],
            |row| row.get(0),
        )?;
        let images: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM images i JOIN chapters c ON c.id = i.chapter_id
             WHERE c.comic_id = ?1",
            params![comic_id],
            |row| row.get(0),
        )?;
        Ok(CatalogStats {
            chapters: chapters as usize,
            chapters_downloaded: chapters_downloaded as usize,
            images: images as usize,
        })
    }
}
