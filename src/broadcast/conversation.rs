use std::sync::Arc;

use tracing::{debug, info};

use crate::broadcast::recipients::{self, RecipientHandle};
use crate::broadcast::store::{ConversationState, ConversationStore, Draft};
use crate::broadcast::UserId;
use crate::config::BroadcastConfig;

/// Commands the dialogue understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartBroadcast,
    Cancel,
    Help,
}

/// One inbound turn from a user.
#[derive(Debug, Clone, Copy)]
pub enum Input<'a> {
    Command(Command),
    Text(&'a str),
}

/// What the caller should do after a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Send this text back to the user.
    Reply(String),
    /// Draft is complete and already cleared; acknowledge, then deliver.
    Dispatch {
        ack: String,
        body: String,
        recipients: Vec<RecipientHandle>,
    },
    /// Not part of a broadcast flow.
    Ignored,
}

/// Turn-by-turn broadcast dialogue. Sole writer of the conversation store.
pub struct ConversationMachine {
    store: Arc<ConversationStore>,
    limits: BroadcastConfig,
}

impl ConversationMachine {
    pub fn new(store: Arc<ConversationStore>, limits: BroadcastConfig) -> Self {
        Self { store, limits }
    }

    pub async fn handle(&self, user_id: UserId, input: Input<'_>) -> Step {
        match input {
            Input::Command(Command::StartBroadcast) => {
                self.store.begin(user_id).await;
                info!(user_id, "Broadcast started");
                Step::Reply(welcome_text())
            }
            Input::Command(Command::Cancel) => {
                let had_draft = self.store.clear(user_id).await;
                info!(user_id, had_draft, "Broadcast cancelled");
                Step::Reply(cancel_text())
            }
            Input::Command(Command::Help) => Step::Reply(help_text(&self.limits)),
            Input::Text(text) => self.handle_text(user_id, text).await,
        }
    }

    /// One text turn, applied under a single store update so a concurrent
    /// cancel either happens before it or after it.
    async fn handle_text(&self, user_id: UserId, text: &str) -> Step {
        let max = self.limits.max_recipients;
        let turn = self
            .store
            .update(user_id, |entry| {
                let Some(mut conversation) = entry.take() else {
                    return Turn::Idle;
                };
                match conversation.state {
                    ConversationState::Idle => Turn::Idle,
                    ConversationState::AwaitingMessage => {
                        conversation.draft.body = Some(text.to_string());
                        conversation.state = ConversationState::AwaitingRecipients;
                        *entry = Some(conversation);
                        Turn::MessageStored
                    }
                    ConversationState::AwaitingRecipients => {
                        let parsed = recipients::parse(text);
                        if parsed.is_empty() {
                            *entry = Some(conversation);
                            return Turn::NoRecipients;
                        }
                        if parsed.len() > max {
                            *entry = Some(conversation);
                            return Turn::TooMany(parsed.len());
                        }
                        conversation.draft.recipients = Some(parsed);
                        match conversation.draft {
                            Draft {
                                body: Some(body),
                                recipients: Some(recipients),
                            } => Turn::Complete { body, recipients },
                            _ => Turn::Idle,
                        }
                    }
                }
            })
            .await;

        match turn {
            Turn::Idle => {
                debug!(user_id, "Text outside of a broadcast flow");
                Step::Ignored
            }
            Turn::MessageStored => {
                info!(user_id, len = text.len(), "Message body stored");
                Step::Reply(recipients_prompt(max))
            }
            Turn::NoRecipients => Step::Reply(
                "❌ No valid usernames found. Please enter at least one username:".to_string(),
            ),
            Turn::TooMany(count) => {
                info!(user_id, count, max, "Too many recipients");
                Step::Reply(format!(
                    "❌ Too many usernames! You provided {}, but the maximum allowed is {}.\n\n\
                     Please enter {} or fewer usernames:",
                    count, max, max
                ))
            }
            Turn::Complete { body, recipients } => {
                info!(user_id, recipients = recipients.len(), "Draft complete, dispatching");
                Step::Dispatch {
                    ack: format!(
                        "📤 Starting to send messages to {} user(s)...\n\
                         ⏱️ There will be a {}-second delay between each message.\n\
                         Please wait...",
                        recipients.len(),
                        self.limits.delay_seconds
                    ),
                    body,
                    recipients,
                }
            }
        }
    }
}

/// Result of applying a text turn to the store.
enum Turn {
    Idle,
    MessageStored,
    NoRecipients,
    TooMany(usize),
    Complete {
        body: String,
        recipients: Vec<RecipientHandle>,
    },
}

fn welcome_text() -> String {
    "👋 Welcome to the Message Sender Bot!\n\n\
     I'll help you send messages to multiple Telegram users.\n\n\
     Please type the message you want to send:"
        .to_string()
}

fn cancel_text() -> String {
    "❌ Operation cancelled. Send /start to begin again.".to_string()
}

fn recipients_prompt(max: usize) -> String {
    format!(
        "✅ Message received!\n\n\
         Now, please enter the Telegram usernames to send this message to.\n\
         • You can enter up to {} usernames\n\
         • Separate usernames with commas or put each on a new line\n\
         • Include or exclude the @ symbol (both work)\n\n\
         Example: @user1, @user2, @user3",
        max
    )
}

pub fn help_text(limits: &BroadcastConfig) -> String {
    format!(
        "📖 How to use this bot:\n\n\
         1. Send /start to begin\n\
         2. Enter the message you want to send\n\
         3. Enter the usernames (up to {})\n\
         4. The bot will send messages with a {}-second delay between each\n\n\
         Commands:\n\
         /start - Start sending messages\n\
         /cancel - Cancel the current operation\n\
         /help - Show this help message",
        limits.max_recipients, limits.delay_seconds
    )
}
