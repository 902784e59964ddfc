//! Broadcast engine: collects a message and a recipient list over several
//! turns, then delivers the message to each recipient with pacing.

pub mod conversation;
pub mod delivery;
pub mod recipients;
pub mod store;
pub mod summary;

#[cfg(test)]
pub(crate) mod testing;

/// Platform-assigned identity of the user talking to the bot.
pub type UserId = u64;
