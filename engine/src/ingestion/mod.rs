//! Inbound Event Ingestion
//!
//! Two paths feed one internal event shape into the dispatch queue:
//!
//! - **pull**: [`PollLoop`] drives a [`PollSource`] (Telegram `getUpdates`),
//!   advancing an [`IngestionCursor`] before each event is handed off.
//! - **push**: the [`webhook`] server answers the verification handshake and
//!   accepts Messenger and WhatsApp deliveries. No cursor; duplicates reach
//!   the dispatcher.

pub mod cursor;
pub mod messenger;
pub mod poll;
pub mod telegram;
pub mod webhook;
pub mod whatsapp;

pub use cursor::IngestionCursor;
pub use poll::{PollLoop, PollSource, PolledEvent};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sdk::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Channel an event arrived on; replies go back the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Telegram,
    Messenger,
    #[serde(rename = "whatsapp")]
    WhatsApp,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Telegram => f.write_str("telegram"),
            Channel::Messenger => f.write_str("messenger"),
            Channel::WhatsApp => f.write_str("whatsapp"),
        }
    }
}

/// A request from the outside world
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    pub sender_id: String,
    /// Where the reply goes (Telegram chat id, Messenger PSID, WhatsApp
    /// phone number)
    pub reply_to: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
    pub channel: Channel,
}

impl InboundEvent {
    pub fn new(
        channel: Channel,
        sender_id: impl Into<String>,
        reply_to: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            reply_to: reply_to.into(),
            text: text.into(),
            received_at: Utc::now(),
            channel,
        }
    }
}

/// Sends reply text back over a channel.
#[async_trait]
pub trait Replier: Send + Sync {
    async fn reply(&self, to: &str, text: &str) -> Result<(), EngineError>;
}

/// Split `text` into chunks of at most `max` characters, preferring line
/// breaks.
pub fn chunk_text(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len <= max {
            current.push_str(line);
            current_len += line_len;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        // A single line longer than the limit is hard-split.
        let mut chars = line.chars().peekable();
        while chars.peek().is_some() {
            let piece: String = chars.by_ref().take(max).collect();
            let piece_len = piece.chars().count();
            if piece_len == max {
                chunks.push(piece);
            } else {
                current = piece;
                current_len = piece_len;
            }
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}
