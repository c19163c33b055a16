use log::{debug, warn};
use serde_json::json;
use std::time::Duration;

use crate::configuration::{NotifyLevel, TelegramSettings};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

// Fire-and-forget Telegram messages. Send errors are logged and swallowed.
pub struct Notifier {
    client: Option<reqwest::Client>,
    api_url: String,
    chat_id: String,
    level: NotifyLevel,
}

impl Notifier {
    pub fn new(telegram: &TelegramSettings, level: NotifyLevel) -> Self {
        let configured = telegram.enabled
            && !telegram.bot_token.is_empty()
            && !telegram.chat_id.is_empty()
            && level != NotifyLevel::Off;
        let client = if configured {
            match reqwest::Client::builder().timeout(SEND_TIMEOUT).build() {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!("Telegram client unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };
        Self {
            client,
            api_url: format!(
                "https://api.telegram.org/bot{}/sendMessage",
                telegram.bot_token
            ),
            chat_id: telegram.chat_id.clone(),
            level,
        }
    }

    pub fn disabled() -> Self {
        Self {
            client: None,
            api_url: String::new(),
            chat_id: String::new(),
            level: NotifyLevel::Off,
        }
    }

    // Run start and end messages.
    pub async fn summary(&self, text: &str) {
        if self.level >= NotifyLevel::Summary {
            self.send(text).await;
        }
    }

    // Checkpoint heartbeats, only at the progress level.
    pub async fn progress(&self, text: &str) {
        if self.level >= NotifyLevel::Progress {
            self.send(text).await;
        }
    }

    async fn send(&self, text: &str) {
        let Some(client) = &self.client else {
            return;
        };
        let body = json!({ "chat_id": self.chat_id, "text": text });
        match client.post(&self.api_url).json(&body).send().await {
            Ok(res) if res.status().is_success() => debug!("Notification sent"),
            Ok(res) => warn!("Notification rejected: HTTP {}", res.status()),
            Err(e) => warn!("Notification failed: {}", e),
        }
    }
}
