//! Best-effort notifications.
//!
//! Notification failures never affect a run: callers dispatch through
//! `notify_best_effort`, which spawns the send and swallows any error
//! after logging it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outbound notification channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> Result<()>;
}

/// Fire-and-forget dispatch: never blocks the caller, never fails.
pub fn notify_best_effort(notifier: Option<Arc<dyn Notifier>>, message: String) {
    let Some(notifier) = notifier else {
        return;
    };
    tokio::spawn(async move {
        if let Err(e) = notifier.send(&message).await {
            warn!(error = %e, "Notification failed (ignored)");
        }
    });
}

// ---------------------------------------------------------------------------
// Telegram
// ---------------------------------------------------------------------------

pub struct TelegramNotifier {
    client: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build Telegram HTTP client")?;
        Ok(TelegramNotifier {
            client,
            bot_token,
            chat_id,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": message,
            }))
            .send()
            .await
            .context("Telegram request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("Telegram API returned {}", resp.status());
        }
        debug!("Notification sent");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
