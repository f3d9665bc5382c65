//! Facebook Messenger
//!
//! Delivery payload parsing for the webhook and the Send API replier.

use super::{chunk_text, Channel, InboundEvent, Replier};
use async_trait::async_trait;
use reqwest::Client;
use sdk::EngineError;
use serde::Deserialize;
use serde_json::{json, Value};

/// Messenger rejects text messages over 2000 characters.
pub const MESSAGE_CHUNK: usize = 2000;

#[derive(Deserialize, Debug)]
struct Delivery {
    object: Option<String>,
    entry: Vec<Entry>,
}

#[derive(Deserialize, Debug)]
struct Entry {
    #[serde(default)]
    messaging: Vec<Messaging>,
}

#[derive(Deserialize, Debug)]
struct Messaging {
    sender: Party,
    message: Option<IncomingMessage>,
}

#[derive(Deserialize, Debug)]
struct Party {
    id: String,
}

#[derive(Deserialize, Debug)]
struct IncomingMessage {
    text: Option<String>,
    #[serde(default)]
    is_echo: bool,
}

/// Convert a webhook delivery into events.
///
/// Accepts the Messenger shape (`{object, entry: [{messaging: [...]}]}`)
/// or a bare `{senderId, text}` object.
///
/// # Errors
/// A description of what is wrong with the payload.
pub fn parse_delivery(payload: &Value) -> Result<Vec<InboundEvent>, String> {
    if payload.get("entry").is_some() {
        let delivery: Delivery =
            serde_json::from_value(payload.clone()).map_err(|e| format!("invalid delivery: {}", e))?;
        if let Some(object) = &delivery.object {
            if object != "page" {
                return Err(format!("unsupported object '{}'", object));
            }
        }

        return Ok(delivery
            .entry
            .into_iter()
            .flat_map(|entry| entry.messaging)
            .filter_map(|m| {
                let message = m.message.filter(|msg| !msg.is_echo)?;
                let text = message.text.filter(|t| !t.trim().is_empty())?;
                Some(InboundEvent::new(
                    Channel::Messenger,
                    m.sender.id.clone(),
                    m.sender.id,
                    text,
                ))
            })
            .collect());
    }

    let sender = payload
        .get("senderId")
        .and_then(Value::as_str)
        .ok_or("missing 'entry' or 'senderId'")?;
    let text = payload
        .get("text")
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
        .ok_or("missing 'text'")?;

    Ok(vec![InboundEvent::new(Channel::Messenger, sender, sender, text)])
}

/// Messenger Send API client
pub struct MessengerClient {
    client: Client,
    api_base: String,
    page_token: String,
}

impl MessengerClient {
    pub fn new(api_base: &str, page_token: String) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            page_token,
        }
    }

    pub async fn send_message(&self, recipient: &str, text: &str) -> Result<(), EngineError> {
        for chunk in chunk_text(text, MESSAGE_CHUNK) {
            let response = self
                .client
                .post(format!("{}/me/messages", self.api_base))
                .query(&[("access_token", self.page_token.as_str())])
                .json(&json!({
                    "recipient": {"id": recipient},
                    "messaging_type": "RESPONSE",
                    "message": {"text": chunk},
                }))
                .send()
                .await
                .map_err(|e| EngineError::Transport(crate::secrets::scrub(&e.to_string())))?;

            if !response.status().is_success() {
                return Err(EngineError::Transport(format!(
                    "send API returned {}",
                    response.status()
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Replier for MessengerClient {
    async fn reply(&self, to: &str, text: &str) -> Result<(), EngineError> {
        self.send_message(to, text).await
    }
}
