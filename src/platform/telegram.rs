use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::dispatching::HandlerExt;
use teloxide::prelude::*;
use teloxide::types::{ChatId, Recipient, UserId};
use teloxide::utils::command::BotCommands;
use teloxide::{ApiError, RequestError};
use tracing::{debug, info, warn};

use crate::broadcast::conversation::{Command, ConversationMachine, Input, Step};
use crate::broadcast::delivery::{
    DeliveryError, DeliveryPipeline, Notifier, RecipientSender, TokioPacer,
};
use crate::broadcast::recipients::RecipientHandle;
use crate::broadcast::store::ConversationStore;
use crate::broadcast::summary;
use crate::config::Config;

/// Telegram rejects messages above 4096 chars; leave some headroom.
const MAX_CHUNK_LEN: usize = 4000;

type TelegramPipeline = DeliveryPipeline<TelegramSender, TelegramNotifier, TokioPacer>;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum BotCommand {
    #[command(description = "start sending messages")]
    Start,
    #[command(description = "cancel the current operation")]
    Cancel,
    #[command(description = "show this help message")]
    Help,
}

impl From<BotCommand> for Command {
    fn from(command: BotCommand) -> Self {
        match command {
            BotCommand::Start => Command::StartBroadcast,
            BotCommand::Cancel => Command::Cancel,
            BotCommand::Help => Command::Help,
        }
    }
}

/// Delivers a broadcast body to a Telegram username.
pub struct TelegramSender {
    bot: Bot,
}

impl TelegramSender {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl RecipientSender for TelegramSender {
    async fn resolve_and_send(
        &self,
        recipient: &RecipientHandle,
        body: &str,
    ) -> Result<(), DeliveryError> {
        if !is_valid_username(recipient.as_str()) {
            return Err(DeliveryError::InvalidHandle);
        }

        let chat = Recipient::ChannelUsername(recipient.to_string());
        self.bot
            .send_message(chat, body)
            .await
            .map(|_| ())
            .map_err(|e| classify_error(&e))
    }
}

/// Replies to the user in their private chat with the bot.
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, user_id: u64, text: &str) -> Result<()> {
        let chat_id = ChatId::from(UserId(user_id));
        for chunk in split_message(text, MAX_CHUNK_LEN) {
            self.bot.send_message(chat_id, chunk).await?;
        }
        Ok(())
    }
}

/// Map a Telegram API failure onto the delivery error taxonomy.
fn classify_error(error: &RequestError) -> DeliveryError {
    match error {
        RequestError::RetryAfter(wait) => DeliveryError::RateLimited {
            retry_after: wait.duration(),
        },
        RequestError::Api(api) => match api {
            ApiError::ChatNotFound | ApiError::UserNotFound | ApiError::UserDeactivated => {
                DeliveryError::NotFound
            }
            ApiError::BotBlocked | ApiError::CantInitiateConversation => {
                DeliveryError::PrivacyRestricted
            }
            ApiError::CantTalkWithBots | ApiError::BotKicked => DeliveryError::NotAUserAccount,
            other => DeliveryError::unknown(other.to_string()),
        },
        other => DeliveryError::unknown(other.to_string()),
    }
}

/// Telegram usernames: 5-32 chars of `[a-z0-9_]`, starting with a letter.
fn is_valid_username(handle: &str) -> bool {
    let len = handle.chars().count();
    (5..=32).contains(&len)
        && handle.starts_with(|c: char| c.is_ascii_lowercase())
        && handle
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Split long messages for Telegram's 4096 char limit
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

/// Run the Telegram bot until interrupted.
pub async fn run(bot: Bot, config: Config) -> Result<()> {
    let config = Arc::new(config);
    let store = Arc::new(ConversationStore::new());
    let machine = Arc::new(ConversationMachine::new(store, config.broadcast));
    let pipeline: Arc<TelegramPipeline> = Arc::new(DeliveryPipeline::new(
        TelegramSender::new(bot.clone()),
        TelegramNotifier::new(bot.clone()),
        TokioPacer,
        config.broadcast.delay(),
    ));

    if let Err(e) = bot.set_my_commands(BotCommand::bot_commands()).await {
        warn!("Failed to register bot commands: {}", e);
    }

    info!("Starting Telegram platform...");

    let allowed = config.clone();
    let handler = Update::filter_message()
        .filter_map(move |msg: Message| {
            let user = msg.from.as_ref()?;
            if msg.chat.is_private() && allowed.is_user_allowed(user.id.0) {
                Some(msg)
            } else {
                None
            }
        })
        .branch(
            dptree::entry()
                .filter_command::<BotCommand>()
                .endpoint(handle_command),
        )
        .branch(dptree::endpoint(handle_text));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![machine, pipeline])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    command: BotCommand,
    machine: Arc<ConversationMachine>,
    pipeline: Arc<TelegramPipeline>,
) -> ResponseResult<()> {
    let user_id = match msg.from.as_ref() {
        Some(user) => user.id.0,
        None => return Ok(()),
    };

    info!(user_id, ?command, "Telegram command");

    let step = machine.handle(user_id, Input::Command(command.into())).await;
    perform(&bot, &msg, user_id, step, &pipeline).await
}

async fn handle_text(
    bot: Bot,
    msg: Message,
    machine: Arc<ConversationMachine>,
    pipeline: Arc<TelegramPipeline>,
) -> ResponseResult<()> {
    let user_id = match msg.from.as_ref() {
        Some(user) => user.id.0,
        None => return Ok(()),
    };

    let text = match msg.text() {
        Some(t) => t.to_string(),
        None => return Ok(()),
    };

    debug!(user_id, len = text.len(), "Telegram text");

    let step = machine.handle(user_id, Input::Text(&text)).await;
    perform(&bot, &msg, user_id, step, &pipeline).await
}

async fn perform(
    bot: &Bot,
    msg: &Message,
    user_id: u64,
    step: Step,
    pipeline: &TelegramPipeline,
) -> ResponseResult<()> {
    match step {
        Step::Reply(text) => {
            bot.send_message(msg.chat.id, text).await?;
        }
        Step::Ignored => {
            bot.send_message(
                msg.chat.id,
                "Send /start to begin a broadcast, or /help for usage.",
            )
            .await?;
        }
        Step::Dispatch {
            ack,
            body,
            recipients,
        } => {
            pipeline.notify_best_effort(user_id, &ack).await;
            let report = pipeline.dispatch(user_id, recipients, &body).await;
            pipeline
                .notify_best_effort(user_id, &summary::summarize(&report))
                .await;
        }
    }
    Ok(())
}
