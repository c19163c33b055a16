use config::{Config, ConfigError};
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize, Debug)]
pub struct Settings {
    pub save_path: String,
    #[serde(default)]
    pub source: SourceSettings,
    #[serde(default)]
    pub fetch: FetchSettings,
    #[serde(default)]
    pub telegram: TelegramSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub comics: Vec<ComicEntry>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SourceSettings {
    pub base_url: String,
    pub cookie: Option<String>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            base_url: "https://m.manhuagui.com".into(),
            cookie: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FetchSettings {
    pub concurrent_downloads: usize,
    pub retry: u32,
    pub timeout: u64,
    pub delay: f64,
    pub checkpoint_interval: usize,
    pub notify_level: NotifyLevel,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            concurrent_downloads: 5,
            retry: 3,
            timeout: 30,
            delay: 1.0,
            checkpoint_interval: 10,
            notify_level: NotifyLevel::Summary,
        }
    }
}

impl FetchSettings {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn delay_duration(&self) -> Duration {
        Duration::from_secs_f64(self.delay.max(0.0))
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum NotifyLevel {
    Off,
    Summary,
    Progress,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TelegramSettings {
    pub enabled: bool,
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseSettings {
    pub enabled: bool,
    pub path: Option<String>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ComicEntry {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start_chapter: Option<u32>,
    #[serde(default)]
    pub end_chapter: Option<u32>,
    #[serde(default)]
    pub reverse: bool,
}

impl Settings {
    pub fn new(config_file: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(config_file))
            .build()?;
        builder.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::*;

    #[test]
    fn load_config() {
        let c = Settings::new("comichub.test.yaml").unwrap();

        assert_eq!("./test/comics", c.save_path);
        let _a: OsString = c.save_path.into();

        assert_eq!("https://m.manhuagui.com", c.source.base_url);
        assert_eq!(c.source.cookie.as_deref(), Some("device=mobile"));

        assert_eq!(2, c.fetch.concurrent_downloads);
        assert_eq!(2, c.fetch.retry);
        assert_eq!(5, c.fetch.timeout);
        assert_eq!(0.1, c.fetch.delay);
        assert_eq!(3, c.fetch.checkpoint_interval);
        assert_eq!(NotifyLevel::Progress, c.fetch.notify_level);

        assert!(c.telegram.enabled);
        assert_eq!("test-token", c.telegram.bot_token);
        assert_eq!("12345", c.telegram.chat_id);

        assert!(!c.database.enabled);

        let comic1 = ComicEntry {
            url: "https://m.manhuagui.com/comic/1128/".into(),
            name: Some("ONE PIECE".into()),
            start_chapter: Some(1),
            end_chapter: Some(10),
            reverse: true,
        };
        let comic2 = ComicEntry {
            url: "https://m.manhuagui.com/comic/2592/".into(),
            name: None,
            start_chapter: None,
            end_chapter: None,
            reverse: false,
        };
        assert_eq!(vec![comic1, comic2], c.comics);
    }

    #[test]
    fn defaults_cover_optional_sections() {
        let fetch = FetchSettings::default();
        assert_eq!(5, fetch.concurrent_downloads);
        assert_eq!(3, fetch.retry);
        assert_eq!(Duration::from_secs(30), fetch.timeout_duration());
        assert_eq!(Duration::from_secs(1), fetch.delay_duration());
        assert_eq!(NotifyLevel::Summary, fetch.notify_level);

        assert!(DatabaseSettings::default().enabled);
        assert!(!TelegramSettings::default().enabled);
        assert!(NotifyLevel::Off < NotifyLevel::Summary);
        assert!(NotifyLevel::Summary < NotifyLevel::Progress);
    }
}
