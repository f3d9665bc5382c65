use super::names::GENERATE_CONTENT;
use crate::capability::{Capability, Handler};
use crate::config::BusinessConfig;
use crate::executor::{ROLE_KEY, TIER_KEY};
use crate::llm::{Completion, ReasoningEngine};
use crate::router::Tier;
use async_trait::async_trait;
use sdk::{
    CapabilityArgs, CapabilityOutput, EngineError, ExternalCapability, FieldKind, InputSchema,
};
use serde_json::json;
use std::sync::Arc;

/// Writes copy with the reasoning engine at the task's tier.
pub struct GenerateContent {
    engine: Arc<dyn ReasoningEngine>,
    business: BusinessConfig,
}

impl GenerateContent {
    pub fn new(engine: Arc<dyn ReasoningEngine>, business: BusinessConfig) -> Self {
        Self { engine, business }
    }

    pub fn capability(handler: Handler) -> Capability {
        Capability::new(
            GENERATE_CONTENT,
            "Write marketing copy with the reasoning engine",
            InputSchema::empty()
                .required("input", FieldKind::String)
                .optional("platform", FieldKind::String)
                .optional("topic", FieldKind::String),
            handler,
        )
    }

    fn system_prompt(&self, args: &CapabilityArgs) -> String {
        let mut system = String::new();
        if let Some(role) = args.param_str_opt(ROLE_KEY) {
            system.push_str(role);
            system.push_str("\n\n");
        }
        system.push_str(&self.business.prompt_preamble());
        if let Some(platform) = args.param_str_opt("platform") {
            system.push_str(&format!("\nTarget platform: {}", platform));
            system.push_str(platform_guidance(platform));
        }
        system
    }
}

fn platform_guidance(platform: &str) -> &'static str {
    match platform {
        "instagram" => "\nKeep it under 2200 characters, open with a hook, end with a call to action.",
        "facebook" => "\nUse short paragraphs and end with the booking link.",
        "email" => "\nStart with a line 'Subject: ...' followed by the body.",
        _ => "",
    }
}

#[async_trait]
impl ExternalCapability for GenerateContent {
    async fn call(&self, args: &CapabilityArgs) -> Result<CapabilityOutput, EngineError> {
        let tier = args
            .param_str_opt(TIER_KEY)
            .and_then(|t| t.parse::<Tier>().ok())
            .unwrap_or(Tier::Basic);

        let mut prompt = args.input().to_string();
        if let Some(topic) = args.param_str_opt("topic") {
            prompt.push_str(&format!("\n\nTopic: {}", topic));
        }

        let request = Completion::new(tier, self.system_prompt(args), prompt);
        let text = self
            .engine
            .complete(&request)
            .await
            .map_err(|e| EngineError::external(GENERATE_CONTENT, e.to_string()))?;

        Ok(CapabilityOutput::with_data(
            text,
            json!({
                "tier": tier,
                "model": self.engine.model_for(tier),
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LLMError, Result as LLMResult};
    use std::sync::Mutex;

    struct Recording {
        seen: Mutex<Vec<Completion>>,
        fail: bool,
    }

    #[async_trait]
    impl ReasoningEngine for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn model_for(&self, tier: Tier) -> &str {
            tier.as_str()
        }

        async fn complete(&self, request: &Completion) -> LLMResult<String> {
            self.seen.lock().unwrap().push(request.clone());
            if self.fail {
                Err(LLMError::RateLimitExceeded)
            } else {
                Ok("copy".to_string())
            }
        }
    }

    fn args() -> CapabilityArgs {
        CapabilityArgs::new()
            .with_param("input", json!("Escribe un post"))
            .with_param("platform", json!("instagram"))
            .with_param("topic", json!("temazcal"))
            .with_param(TIER_KEY, json!("premium"))
            .with_param(ROLE_KEY, json!("You are the creator."))
    }

    #[tokio::test]
    async fn test_uses_task_tier_and_role() {
        let engine = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            fail: false,
        });
        let cap = GenerateContent::new(engine.clone(), BusinessConfig::default());

        let out = cap.call(&args()).await.unwrap();
        assert_eq!(out.text, "copy");
        assert_eq!(out.data["model"], "premium");

        let seen = engine.seen.lock().unwrap();
        assert_eq!(seen[0].tier, Tier::Premium);
        assert!(seen[0].messages[0].content.starts_with("You are the creator."));
        assert!(seen[0].messages[0].content.contains("Target platform: instagram"));
        assert!(seen[0].messages[1].content.ends_with("Topic: temazcal"));
    }

    #[tokio::test]
    async fn test_engine_failure_is_external_call_failure() {
        let engine = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            fail: true,
        });
        let cap = GenerateContent::new(engine, BusinessConfig::default());
        let err = cap.call(&args()).await.unwrap_err();
        assert!(matches!(err, EngineError::ExternalCallFailed { .. }));
    }
}
