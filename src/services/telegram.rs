use std::time::Duration;

use rand::random_range;
use reqwest::Url;
use tokio::time::sleep;

use crate::config::NotifierConfig;

use super::adapter::Notifier;

/// ============================================================
/// TelegramNotifier
/// ============================================================
///
/// Sends operator messages through a bot `sendMessage` endpoint:
/// GET {url}?chat_id=<chat>&text=<message>
///
/// Behavior:
/// - Up to 3 attempts with a short jittered backoff
/// - Never fails: a message that cannot be delivered is logged
pub struct TelegramNotifier {
    http: reqwest::Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(cfg: &NotifierConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Url::parse(&cfg.url)?;

        Ok(Self {
            http,
            endpoint: cfg.url.clone(),
            chat_id: cfg.chat_id.clone(),
        })
    }

    async fn send(&self, message: &str) -> anyhow::Result<()> {
        let url = Url::parse_with_params(
            &self.endpoint,
            &[("chat_id", self.chat_id.as_str()), ("text", message)],
        )?;
        self.http.get(url).send().await?.error_for_status()?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) {
        for attempt in 1..=3 {
            match self.send(message).await {
                Ok(()) => return,
                Err(e) => {
                    log::warn!("[NOTIFY] attempt {} failed: {}", attempt, e);
                    if attempt < 3 {
                        sleep(Duration::from_millis(500 * attempt + random_range(0..250))).await;
                    }
                }
            }
        }

        log::error!("[NOTIFY] message not delivered: {}", message);
    }
}

/// Demo notifier: messages only go to the log.
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) {
        log::info!("DEMO → {}", message);
    }
}
