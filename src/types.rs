//! Common types used throughout the slackgpt bot.

use serde::{Deserialize, Serialize};

/// Role of a message sent to the OpenAI APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from the human user
    User,
    /// Message from the AI assistant
    Assistant,
    /// System prompt or instructions
    System,
}

/// A notification that the bot was `@mentioned` in a channel.
///
/// Lives for exactly one request/response cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionEvent {
    /// Channel the mention was posted in
    pub channel: String,
    /// Timestamp of the mentioning message
    pub ts: String,
    /// Parent thread timestamp, when the mention was posted inside a thread
    pub thread_ts: Option<String>,
    /// Author of the mention, when Slack provides one
    pub user: Option<String>,
    /// Raw message text, including the `<@U…>` mention itself
    pub text: String,
}

impl MentionEvent {
    /// Thread the reply belongs in: the existing thread, or a new one rooted at the mention.
    pub fn reply_thread_ts(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }
}
