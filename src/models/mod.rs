pub mod chapter;
pub mod cli;
pub mod report;
pub mod state;

pub use chapter::{ChapterRef, ComicInfo, ImageRef, ResolvedChapter};
pub use cli::Cli;
pub use report::{ChapterOutcome, ChapterReport, ComicReport};
pub use state::DownloadState;
