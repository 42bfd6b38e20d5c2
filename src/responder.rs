//! Mention responder: turns each mention into exactly one reply.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info};
use tokio::sync::mpsc;

use crate::backend::Backend;
use crate::error::Result;
use crate::slack::SlackWebClient;
use crate::types::MentionEvent;

/// Reply posted when the backend could not produce one.
pub const BACKEND_ERROR_REPLY: &str = "OpenAI API Error!!";

/// Where replies go.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn post_reply(&self, channel: &str, text: &str, thread_ts: Option<&str>) -> Result<()>;
}

#[async_trait]
impl ReplySink for SlackWebClient {
    async fn post_reply(&self, channel: &str, text: &str, thread_ts: Option<&str>) -> Result<()> {
        let ts = self.post_message(channel, text, thread_ts).await?;
        debug!("Posted reply {ts} in channel {channel}");
        Ok(())
    }
}

pub struct Responder {
    backend: Box<dyn Backend>,
    sink: Arc<dyn ReplySink>,
    reply_in_thread: bool,
    exit_on_post_failure: bool,
}

impl Responder {
    pub fn new(backend: Box<dyn Backend>, sink: Arc<dyn ReplySink>) -> Self {
        Self {
            backend,
            sink,
            reply_in_thread: true,
            exit_on_post_failure: false,
        }
    }

    /// Address replies to the mention's thread (default) or to the channel itself.
    #[must_use]
    pub fn reply_in_thread(mut self, enabled: bool) -> Self {
        self.reply_in_thread = enabled;
        self
    }

    /// Treat a failed post as fatal instead of dropping the event.
    #[must_use]
    pub fn exit_on_post_failure(mut self, enabled: bool) -> Self {
        self.exit_on_post_failure = enabled;
        self
    }

    /// Reply text for `event`; backend failures become [`BACKEND_ERROR_REPLY`].
    pub async fn reply_for(&self, event: &MentionEvent) -> String {
        match self.backend.generate(&event.text).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(
                    "{} backend failed for mention in channel {}: {e}",
                    self.backend.name(),
                    event.channel
                );
                BACKEND_ERROR_REPLY.to_string()
            }
        }
    }

    /// Generate and post the reply for one mention. Only delivery failures are returned.
    pub async fn handle(&self, event: &MentionEvent) -> Result<()> {
        let reply = self.reply_for(event).await;
        let thread_ts = self.reply_in_thread.then(|| event.reply_thread_ts());

        self.sink
            .post_reply(&event.channel, &reply, thread_ts)
            .await?;
        info!("Replied in channel {}: {}", event.channel, reply);
        Ok(())
    }

    /// Handle mentions one at a time until the channel closes.
    pub async fn run(&self, mut events: mpsc::Receiver<MentionEvent>) -> Result<()> {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.handle(&event).await {
                error!("Failed posting message to channel {}: {e}", event.channel);
                if self.exit_on_post_failure {
                    return Err(e);
                }
            }
        }
        debug!("Mention channel closed");
        Ok(())
    }
}
