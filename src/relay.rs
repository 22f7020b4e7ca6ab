use async_trait::async_trait;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("telegram request failed: {0}")]
    Telegram(#[from] teloxide::RequestError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    Html,
}

/// Outbound operator-facing messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str, format: TextFormat)
        -> Result<(), RelayError>;
}

#[derive(Debug, Clone)]
pub struct TelegramRelay {
    bot: Bot,
}

impl TelegramRelay {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramRelay {
    #[instrument(skip(self, text))]
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        format: TextFormat,
    ) -> Result<(), RelayError> {
        let request = self.bot.send_message(chat_id, text);
        match format {
            TextFormat::Plain => request.await?,
            TextFormat::Html => request.parse_mode(ParseMode::Html).await?,
        };
        Ok(())
    }
}
