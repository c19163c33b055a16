use clap::{Args, Parser, Subcommand};

#[derive(Debug, clap::Parser)]
#[command(version, about = "Personal comic downloader")]
pub struct Cli {
    #[arg(short, long, default_value = "comichub")]
    pub config_file: String,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn new() -> Self {
        Cli::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download one comic by URL, or everything in the config's comics list
    Download(DownloadArgs),
    /// Print the chapter listing for a comic
    Chapters(ChaptersArgs),
    /// Search the site and print matching comics
    Search(SearchArgs),
    /// Audit downloaded chapters for gaps
    Check(CheckArgs),
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Comic landing page URL; omit to use the configured comics list
    #[arg(short, long)]
    pub url: Option<String>,

    /// First chapter number to download
    #[arg(short, long)]
    pub start_chapter: Option<u32>,

    /// Last chapter number to download
    #[arg(short, long)]
    pub end_chapter: Option<u32>,

    /// Walk the listing oldest-first
    #[arg(short, long)]
    pub reverse: bool,
}

#[derive(Debug, Args)]
pub struct ChaptersArgs {
    /// Comic landing page URL
    #[arg(short, long)]
    pub url: String,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Title keyword to look for
    #[arg(short, long)]
    pub keyword: String,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Comic landing page URL
    #[arg(short, long)]
    pub url: String,

    /// Also compare file counts against expected page counts
    #[arg(short, long)]
    pub verify: bool,
}
