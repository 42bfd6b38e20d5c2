//! Socket Mode frames and the mention events they carry.
//!
//! Every frame Slack sends over the socket is a JSON envelope with a `type`.
//! Envelopes that carry an `envelope_id` must be acknowledged by echoing the
//! id back, otherwise Slack redelivers them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::types::MentionEvent;

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EventsApiPayload {
    EventCallback { event: InnerEvent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InnerEvent {
    AppMention(AppMention),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AppMention {
    channel: String,
    ts: String,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct Ack<'a> {
    envelope_id: &'a str,
}

/// What a Socket Mode frame means to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Connection established.
    Hello,
    /// Slack is about to close this connection; open a new one.
    Disconnect { reason: Option<String> },
    /// Someone mentioned the bot.
    Mention(MentionEvent),
    /// Anything the bot does not act on.
    Ignored { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Id to acknowledge, if the frame needs one.
    pub envelope_id: Option<String>,
    pub frame: Frame,
}

/// Decode one text frame received on the socket.
pub fn parse(text: &str) -> Result<Envelope> {
    let raw: RawEnvelope = serde_json::from_str(text)?;

    let frame = match raw.kind.as_str() {
        "hello" => Frame::Hello,
        "disconnect" => Frame::Disconnect { reason: raw.reason },
        "events_api" => match raw.payload.map(serde_json::from_value::<EventsApiPayload>) {
            Some(Ok(payload)) => events_api_frame(payload),
            Some(Err(e)) => Frame::Ignored {
                reason: format!("undecodable events_api payload: {e}"),
            },
            None => Frame::Ignored {
                reason: "events_api envelope without payload".to_string(),
            },
        },
        other => Frame::Ignored {
            reason: format!("{other} envelope"),
        },
    };

    Ok(Envelope {
        envelope_id: raw.envelope_id,
        frame,
    })
}

fn events_api_frame(payload: EventsApiPayload) -> Frame {
    match payload {
        EventsApiPayload::EventCallback {
            event: InnerEvent::AppMention(mention),
        } => {
            if mention.text.trim().is_empty() {
                return Frame::Ignored {
                    reason: "app_mention without text".to_string(),
                };
            }
            Frame::Mention(MentionEvent {
                channel: mention.channel,
                ts: mention.ts,
                thread_ts: mention.thread_ts,
                user: mention.user,
                text: mention.text,
            })
        }
        EventsApiPayload::EventCallback {
            event: InnerEvent::Other,
        } => Frame::Ignored {
            reason: "non-mention event".to_string(),
        },
        EventsApiPayload::Other => Frame::Ignored {
            reason: "non-callback events_api payload".to_string(),
        },
    }
}

/// JSON acknowledgement for an envelope.
pub fn ack_message(envelope_id: &str) -> Result<String> {
    Ok(serde_json::to_string(&Ack { envelope_id })?)
}
