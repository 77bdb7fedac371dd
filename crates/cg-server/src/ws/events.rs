//! Chat event wire format and the per-connection inbound event stream.
//!
//! Frames are JSON text: `{"event":"message","data":{"name":"…","message":"…"}}`.

use axum::extract::ws::Message;
use futures_util::{future, Stream, StreamExt};
use serde::{Deserialize, Serialize};

/// One chat message. Neither field is validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub name: String,
    pub message: String,
}

/// Events exchanged over the socket, in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ChatEvent {
    Message(ChatMessage),
}

impl ChatEvent {
    pub fn to_frame(&self) -> Result<Message, serde_json::Error> {
        Ok(Message::Text(serde_json::to_string(self)?.into()))
    }
}

/// Turn raw socket frames into typed events.
///
/// The stream ends at the first Close frame or transport error. Binary
/// frames and text that doesn't parse as a known event are skipped.
pub fn inbound<S>(frames: S) -> impl Stream<Item = ChatEvent>
where
    S: Stream<Item = Result<Message, axum::Error>>,
{
    frames
        .take_while(|frame| {
            future::ready(matches!(frame, Ok(msg) if !matches!(msg, Message::Close(_))))
        })
        .filter_map(|frame| future::ready(decode(frame)))
}

fn decode(frame: Result<Message, axum::Error>) -> Option<ChatEvent> {
    match frame {
        Ok(Message::Text(text)) => match serde_json::from_str::<ChatEvent>(text.as_str()) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring unrecognized text frame");
                None
            }
        },
        Ok(Message::Binary(data)) => {
            tracing::debug!(bytes = data.len(), "Ignoring binary frame");
            None
        }
        _ => None,
    }
}
