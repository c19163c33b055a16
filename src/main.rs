use comichub::configuration::Settings;
use comichub::models::cli::{Cli, Command};
use comichub::run;
use env_logger::{Builder, Env, Target};
use log::error;
use std::process;

#[tokio::main]
async fn main() {
    // Init logging
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.target(Target::Stdout);
    builder.init();

    // Parse Args
    let cli = Cli::new();

    // Parse Settings
    let settings = Settings::new(&cli.config_file);
    if let Err(e) = settings {
        error!("Configuration error: {}", e);
        process::exit(1);
    }
    let s = settings.unwrap();

    // Run
    let result = match cli.command {
        Command::Download(args) => run::download(s, args).await,
        Command::Chapters(args) => run::list_chapters(s, args).await,
        Command::Search(args) => run::search(s, args).await,
        Command::Check(args) => run::check(s, args).await,
    };
    if let Err(e) = result {
        error!("Application error: {}", e);
        process::exit(1);
    }
}
