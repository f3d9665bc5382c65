use super::{Completion, LLMError, ReasoningEngine};
use crate::config::{LLMConfig, TierModelConfig};
use crate::router::Tier;
use async_trait::async_trait;
use serde_json::json;

/// OpenAI-compatible chat completions, one model per tier.
pub struct OpenAIEngine {
    config: LLMConfig,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAIEngine {
    /// `api_key` of `None` makes every call fail with `AuthenticationFailed`.
    pub fn new(config: LLMConfig, api_key: Option<String>) -> Self {
        Self {
            config,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn tier_config(&self, tier: Tier) -> &TierModelConfig {
        match tier {
            Tier::Basic => &self.config.basic,
            Tier::Premium => &self.config.premium,
            Tier::Ultra => &self.config.ultra,
        }
    }
}

#[async_trait]
impl ReasoningEngine for OpenAIEngine {
    fn name(&self) -> &str {
        "openai"
    }

    fn model_for(&self, tier: Tier) -> &str {
        &self.tier_config(tier).model
    }

    async fn complete(&self, request: &Completion) -> super::Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            LLMError::AuthenticationFailed("openai_api_key is not configured".to_string())
        })?;

        let tier = self.tier_config(request.tier);
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let api_messages: Vec<_> = request
            .messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content
                })
            })
            .collect();

        let payload = json!({
            "model": tier.model,
            "messages": api_messages,
            "max_tokens": tier.max_tokens,
            "temperature": tier.temperature,
        });

        tracing::debug!(model = %tier.model, tier = %request.tier, "Calling reasoning engine");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| LLMError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(LLMError::AuthenticationFailed(text));
            } else if status.as_u16() == 429 {
                return Err(LLMError::RateLimitExceeded);
            } else {
                return Err(LLMError::InvalidRequest(format!("{}: {}", status, text)));
            }
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        data.get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| LLMError::ParseError("No content in response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_per_tier() {
        let engine = OpenAIEngine::new(LLMConfig::default(), None);
        assert_eq!(engine.model_for(Tier::Basic), "gpt-4o-mini");
        assert_eq!(engine.model_for(Tier::Premium), "gpt-4o");
        assert_eq!(engine.model_for(Tier::Ultra), "gpt-4-turbo");
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_network() {
        let engine = OpenAIEngine::new(LLMConfig::default(), None);
        let err = engine
            .complete(&Completion::new(Tier::Basic, "s", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::AuthenticationFailed(_)));
    }
}
