//! Socket Mode connection loop.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::error::{BotError, Result};
use crate::types::MentionEvent;

use super::SlackWebClient;
use super::envelope::{self, Frame};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Slack errors from `apps.connections.open` that retrying cannot fix.
const FATAL_OPEN_ERRORS: &[&str] = &[
    "invalid_auth",
    "not_authed",
    "token_revoked",
    "account_inactive",
    "not_allowed_token_type",
];

/// Why a single socket session ended.
enum SessionEnd {
    /// Slack sent a `disconnect` frame; a fresh connection can be opened at once.
    Disconnect,
    /// The socket closed or the stream ended.
    Closed,
    /// Nobody is listening for mentions any more.
    ReceiverDropped,
}

fn is_fatal_open_error(err: &BotError) -> bool {
    matches!(err, BotError::SlackApi { error, .. } if FATAL_OPEN_ERRORS.contains(&error.as_str()))
}

/// Receives mention events over Slack Socket Mode and forwards them to a channel.
pub struct SocketModeClient {
    web: Arc<SlackWebClient>,
    reconnect_delay: Duration,
}

impl SocketModeClient {
    pub fn new(web: Arc<SlackWebClient>) -> Self {
        Self {
            web,
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    /// Fixed wait before reconnecting after a close or error.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Run until `events` is closed.
    ///
    /// Failing to open the first connection is fatal, as is an auth error on
    /// any later one. Other failures wait `reconnect_delay` and retry.
    pub async fn run(&self, events: mpsc::Sender<MentionEvent>) -> Result<()> {
        let mut connected_once = false;

        loop {
            let ws_url = match self.web.open_connection().await {
                Ok(url) => url,
                Err(e) if !connected_once || is_fatal_open_error(&e) => return Err(e),
                Err(e) => {
                    warn!(
                        "Failed to open Socket Mode connection: {e}; retrying in {:?}",
                        self.reconnect_delay
                    );
                    tokio::time::sleep(self.reconnect_delay).await;
                    if events.is_closed() {
                        return Ok(());
                    }
                    continue;
                }
            };
            connected_once = true;
            debug!("Got Socket Mode URL");

            let wait = match self.connect_and_run(&ws_url, &events).await {
                Ok(SessionEnd::ReceiverDropped) => {
                    info!("Mention receiver closed, stopping Socket Mode");
                    return Ok(());
                }
                Ok(SessionEnd::Disconnect) => {
                    info!("Socket Mode refresh requested, reconnecting");
                    false
                }
                Ok(SessionEnd::Closed) => {
                    info!(
                        "Socket Mode session closed, reconnecting in {:?}",
                        self.reconnect_delay
                    );
                    true
                }
                Err(e) => {
                    warn!(
                        "Socket Mode connection error: {e}; reconnecting in {:?}",
                        self.reconnect_delay
                    );
                    true
                }
            };

            if events.is_closed() {
                return Ok(());
            }
            if wait {
                tokio::time::sleep(self.reconnect_delay).await;
            }
        }
    }

    async fn connect_and_run(
        &self,
        ws_url: &str,
        events: &mpsc::Sender<MentionEvent>,
    ) -> Result<SessionEnd> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        info!("Connected to Slack Socket Mode");
        let (mut write, mut read) = ws_stream.split();

        while let Some(message) = read.next().await {
            let text = match message? {
                WsMessage::Text(text) => text,
                WsMessage::Ping(data) => {
                    write.send(WsMessage::Pong(data)).await?;
                    continue;
                }
                WsMessage::Close(frame) => {
                    info!("Slack closed the socket: {frame:?}");
                    return Ok(SessionEnd::Closed);
                }
                _ => continue,
            };

            let envelope = match envelope::parse(&text) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!("Ignoring unreadable Socket Mode frame: {e}");
                    continue;
                }
            };

            if let Some(envelope_id) = &envelope.envelope_id {
                write
                    .send(WsMessage::text(envelope::ack_message(envelope_id)?))
                    .await?;
                debug!("Acknowledged envelope {envelope_id}");
            }

            match envelope.frame {
                Frame::Hello => info!("Socket Mode connection ready"),
                Frame::Disconnect { reason } => {
                    info!(
                        "Slack requested disconnect ({})",
                        reason.as_deref().unwrap_or("no reason")
                    );
                    return Ok(SessionEnd::Disconnect);
                }
                Frame::Mention(event) => {
                    info!(
                        "Received mention from {} in channel {}: {}",
                        event.user.as_deref().unwrap_or("unknown user"),
                        event.channel,
                        event.text
                    );
                    if events.send(event).await.is_err() {
                        return Ok(SessionEnd::ReceiverDropped);
                    }
                }
                Frame::Ignored { reason } => debug!("Ignored frame: {reason}"),
            }
        }

        debug!("Socket Mode stream ended");
        Ok(SessionEnd::Closed)
    }
}
