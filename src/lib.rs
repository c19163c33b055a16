pub mod catalog;
pub mod check;
pub mod configuration;
pub mod fetcher;
pub mod models;
pub mod notify;
pub mod paths;
pub mod run;
pub mod source;

pub use configuration::Settings;
pub use models::Cli;
