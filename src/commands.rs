use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{info, instrument, warn};

use crate::relay::{Notifier, RelayError, TextFormat};
use crate::store::Store;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "open the content web app")]
    Start,
    #[command(description = "start parsing sources")]
    Parse,
    #[command(description = "show post statistics")]
    Stats,
}

impl Command {
    /// Parse the leading command word of `text`; trailing arguments such as a
    /// `/start` deep-link payload are ignored.
    pub fn from_text(text: &str, bot_username: &str) -> Option<Self> {
        let head = text.split_whitespace().next()?;
        if !head.starts_with('/') {
            return None;
        }
        Command::parse(head, bot_username).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub format: TextFormat,
}

impl Reply {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: TextFormat::Plain,
        }
    }
}

#[derive(Clone)]
pub struct CommandContext {
    pub store: Arc<dyn Store>,
    pub notifier: Arc<dyn Notifier>,
    /// Bot username without the leading `@`.
    pub bot_username: String,
}

pub fn welcome_message(bot_username: &str) -> String {
    format!(
        "🤖 <b>AI Content Empire</b>\n\n\
         Manage content in the web app:\n\
         https://t.me/{}/app\n\n\
         Or use the commands:\n\
         /parse - start parsing\n\
         /stats - statistics",
        bot_username
    )
}

/// Compute the reply for `cmd`. `/stats` reads the store and falls back to a
/// notice when the read fails.
#[instrument(skip(ctx))]
pub async fn reply_for(ctx: &CommandContext, cmd: &Command) -> Reply {
    match cmd {
        Command::Start => Reply {
            text: welcome_message(&ctx.bot_username),
            format: TextFormat::Html,
        },
        Command::Parse => Reply::plain("🔍 Parsing started..."),
        Command::Stats => match ctx.store.count_posts(None).await {
            Ok(total) => Reply::plain(format!("📊 Total posts: {}", total)),
            Err(err) => {
                warn!(?err, "post count unavailable for /stats");
                Reply::plain("📊 Statistics are unavailable right now, try again later.")
            }
        },
    }
}

/// Handle one inbound text message. Returns `Ok(false)` when the text is not a
/// recognized command.
#[instrument(skip(ctx, text))]
pub async fn handle_text(ctx: &CommandContext, chat_id: ChatId, text: &str) -> Result<bool, RelayError> {
    let Some(cmd) = Command::from_text(text, &ctx.bot_username) else {
        return Ok(false);
    };
    info!(?cmd, "command received");
    let reply = reply_for(ctx, &cmd).await;
    ctx.notifier.send_text(chat_id, &reply.text, reply.format).await?;
    Ok(true)
}

/// Long-poll Telegram and answer commands until the process receives Ctrl-C.
pub async fn run(bot: Bot, ctx: CommandContext) {
    if let Err(err) = bot.set_my_commands(Command::bot_commands()).await {
        warn!(?err, "failed to register bot commands");
    }

    let ctx = Arc::new(ctx);
    info!("starting telegram bot");
    teloxide::repl(bot, move |msg: Message| {
        let ctx = ctx.clone();
        async move {
            if let Some(text) = msg.text() {
                if let Err(err) = handle_text(&ctx, msg.chat.id, text).await {
                    warn!(?err, chat_id = msg.chat.id.0, "failed to send reply");
                }
            }
            respond(())
        }
    })
    .await;
}
