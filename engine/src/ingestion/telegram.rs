//! Telegram Bot API
//!
//! `getUpdates` long-polling as a [`PollSource`] and `sendMessage` as the
//! channel's [`Replier`].

use super::{chunk_text, Channel, InboundEvent, PollSource, PolledEvent, Replier};
use async_trait::async_trait;
use reqwest::Client;
use sdk::EngineError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Telegram rejects messages over 4096 characters.
pub const MESSAGE_CHUNK: usize = 4000;

#[derive(Deserialize, Debug)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Deserialize, Debug)]
struct Message {
    chat: Chat,
    text: Option<String>,
    from: Option<User>,
}

#[derive(Deserialize, Debug)]
struct Chat {
    id: i64,
}

#[derive(Deserialize, Debug)]
struct User {
    id: i64,
}

#[derive(Deserialize, Debug)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    api_base: String,
    token: String,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl TelegramClient {
    pub fn new(api_base: &str, token: String) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn get_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>, EngineError> {
        let response = self
            .client
            .get(self.url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout.as_secs().to_string()),
            ])
            // The HTTP timeout has to outlast the long-poll wait.
            .timeout(timeout + Duration::from_secs(10))
            .send()
            .await
            .map_err(transport)?
            .json::<ApiResponse<Vec<Update>>>()
            .await
            .map_err(transport)?;

        if !response.ok {
            return Err(EngineError::Transport(format!(
                "getUpdates returned ok=false: {}",
                response.description.unwrap_or_default()
            )));
        }
        Ok(response.result.unwrap_or_default())
    }

    /// Send `text` to `chat_id`, split into chunks Telegram accepts.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), EngineError> {
        #[derive(Serialize)]
        struct SendMessage<'a> {
            chat_id: &'a str,
            text: &'a str,
        }

        for chunk in chunk_text(text, MESSAGE_CHUNK) {
            let response = self
                .client
                .post(self.url("sendMessage"))
                .json(&SendMessage {
                    chat_id,
                    text: &chunk,
                })
                .send()
                .await
                .map_err(transport)?;

            if !response.status().is_success() {
                return Err(EngineError::Transport(format!(
                    "sendMessage returned {}",
                    response.status()
                )));
            }
        }
        Ok(())
    }
}

fn transport(e: reqwest::Error) -> EngineError {
    EngineError::Transport(crate::secrets::scrub(&e.to_string()))
}

/// Telegram updates as pull-path events.
pub struct TelegramSource {
    client: TelegramClient,
    allowed_users: Vec<i64>,
}

impl TelegramSource {
    /// An empty `allowed_users` accepts every sender.
    pub fn new(client: TelegramClient, allowed_users: Vec<i64>) -> Self {
        Self {
            client,
            allowed_users,
        }
    }

    fn is_allowed(&self, user_id: i64) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.contains(&user_id)
    }

    fn convert(&self, update: Update) -> PolledEvent {
        let id = update.update_id;
        let event = update.message.and_then(|msg| {
            let user_id = msg.from.as_ref().map(|u| u.id)?;
            if !self.is_allowed(user_id) {
                warn!(user_id, "Ignoring message from unauthorized user");
                return None;
            }
            let text = msg.text.filter(|t| !t.trim().is_empty())?;
            Some(InboundEvent::new(
                Channel::Telegram,
                user_id.to_string(),
                msg.chat.id.to_string(),
                text,
            ))
        });
        if event.is_none() {
            debug!(update_id = id, "Update carries nothing to dispatch");
        }
        PolledEvent { id, event }
    }
}

#[async_trait]
impl PollSource for TelegramSource {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn poll(&self, cursor: i64, max_wait: Duration) -> Result<Vec<PolledEvent>, EngineError> {
        let updates = self.client.get_updates(cursor, max_wait).await?;
        Ok(updates.into_iter().map(|u| self.convert(u)).collect())
    }
}

#[async_trait]
impl Replier for TelegramClient {
    async fn reply(&self, to: &str, text: &str) -> Result<(), EngineError> {
        self.send_message(to, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(json: serde_json::Value) -> Update {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_convert_allowed_text_message() {
        let source = TelegramSource::new(TelegramClient::new("http://x", "t".into()), vec![7]);
        let polled = source.convert(update(serde_json::json!({
            "update_id": 12,
            "message": {"chat": {"id": 70}, "from": {"id": 7}, "text": "/report"}
        })));
        assert_eq!(polled.id, 12);
        let event = polled.event.unwrap();
        assert_eq!(event.sender_id, "7");
        assert_eq!(event.reply_to, "70");
        assert_eq!(event.text, "/report");
    }

    #[test]
    fn test_convert_drops_unauthorized_and_empty() {
        let source = TelegramSource::new(TelegramClient::new("http://x", "t".into()), vec![7]);
        let stranger = source.convert(update(serde_json::json!({
            "update_id": 1,
            "message": {"chat": {"id": 9}, "from": {"id": 9}, "text": "hola"}
        })));
        assert!(stranger.event.is_none());

        let sticker = source.convert(update(serde_json::json!({
            "update_id": 2,
            "message": {"chat": {"id": 7}, "from": {"id": 7}}
        })));
        assert!(sticker.event.is_none());
    }

    #[test]
    fn test_debug_hides_token() {
        let client = TelegramClient::new("https://api.telegram.org/", "123:secret".into());
        assert!(!format!("{:?}", client).contains("secret"));
        assert_eq!(client.url("getMe"), "https://api.telegram.org/bot123:secret/getMe");
    }
}
