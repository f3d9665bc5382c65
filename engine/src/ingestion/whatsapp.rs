//! WhatsApp Cloud API
//!
//! Deliveries arrive on the same webhook as Messenger with
//! `object = "whatsapp_business_account"`; replies go out through
//! `/{phone_number_id}/messages`.

use super::{chunk_text, Channel, InboundEvent, Replier};
use async_trait::async_trait;
use reqwest::Client;
use sdk::EngineError;
use serde::Deserialize;
use serde_json::{json, Value};

/// Object name of a WhatsApp delivery
pub const OBJECT: &str = "whatsapp_business_account";

/// WhatsApp caps text bodies at 4096 characters.
pub const MESSAGE_CHUNK: usize = 4000;

#[derive(Deserialize, Debug)]
struct Delivery {
    entry: Vec<Entry>,
}

#[derive(Deserialize, Debug)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Deserialize, Debug)]
struct Change {
    value: ChangeValue,
}

#[derive(Deserialize, Debug)]
struct ChangeValue {
    #[serde(default)]
    messages: Vec<IncomingMessage>,
}

#[derive(Deserialize, Debug)]
struct IncomingMessage {
    from: String,
    #[serde(rename = "type")]
    kind: String,
    text: Option<TextBody>,
}

#[derive(Deserialize, Debug)]
struct TextBody {
    body: String,
}

/// Convert a WhatsApp delivery into events.
///
/// Status callbacks (`statuses`) and non-text messages carry nothing to
/// answer and are skipped.
pub fn parse_delivery(payload: &Value) -> Result<Vec<InboundEvent>, String> {
    let delivery: Delivery = serde_json::from_value(payload.clone())
        .map_err(|e| format!("invalid whatsapp delivery: {}", e))?;

    Ok(delivery
        .entry
        .into_iter()
        .flat_map(|entry| entry.changes)
        .flat_map(|change| change.value.messages)
        .filter(|message| message.kind == "text")
        .filter_map(|message| {
            let text = message.text.map(|t| t.body).filter(|t| !t.trim().is_empty())?;
            Some(InboundEvent::new(
                Channel::WhatsApp,
                message.from.clone(),
                message.from,
                text,
            ))
        })
        .collect())
}

/// Cloud API send client
pub struct WhatsAppClient {
    client: Client,
    api_base: String,
    phone_number_id: String,
    access_token: String,
}

impl WhatsAppClient {
    pub fn new(api_base: &str, phone_number_id: String, access_token: String) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            phone_number_id,
            access_token,
        }
    }

    pub async fn send_message(&self, to: &str, text: &str) -> Result<(), EngineError> {
        let url = format!("{}/{}/messages", self.api_base, self.phone_number_id);

        for chunk in chunk_text(text, MESSAGE_CHUNK) {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.access_token)
                .json(&json!({
                    "messaging_product": "whatsapp",
                    "to": to,
                    "type": "text",
                    "text": {"body": chunk},
                }))
                .send()
                .await
                .map_err(|e| EngineError::Transport(crate::secrets::scrub(&e.to_string())))?;

            if !response.status().is_success() {
                return Err(EngineError::Transport(format!(
                    "whatsapp API returned {}",
                    response.status()
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Replier for WhatsAppClient {
    async fn reply(&self, to: &str, text: &str) -> Result<(), EngineError> {
        self.send_message(to, text).await
    }
}
