use super::names::SEND_CAMPAIGN;
use super::source_text;
use crate::capability::{Capability, Handler};
use crate::config::BusinessConfig;
use crate::store::{Lead, LeadStatus, Record, Store};
use async_trait::async_trait;
use sdk::{
    CapabilityArgs, CapabilityOutput, EngineError, ExternalCapability, FieldKind, InputSchema,
};
use serde_json::{json, Value};
use std::sync::Arc;

const SUBJECT_MAX_CHARS: usize = 80;

/// Sends an email campaign to stored leads.
///
/// Unless `send_to_all` is set, only the first matching lead receives the
/// email, so a campaign can be checked before it goes out to everyone.
pub struct SendCampaign {
    client: reqwest::Client,
    store: Arc<Store>,
    business: BusinessConfig,
    api_key: Option<String>,
}

impl SendCampaign {
    pub fn new(
        client: reqwest::Client,
        store: Arc<Store>,
        business: BusinessConfig,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            store,
            business,
            api_key,
        }
    }

    pub fn capability(handler: Handler) -> Capability {
        let statuses: Vec<&'static str> = LeadStatus::ALL.iter().map(|s| s.as_str()).collect();
        Capability::new(
            SEND_CAMPAIGN,
            "Email stored leads",
            InputSchema::empty()
                .required("input", FieldKind::String)
                .optional("subject", FieldKind::String)
                .optional("segment", FieldKind::OneOf(statuses))
                .optional("send_to_all", FieldKind::Bool),
            handler,
        )
    }

    async fn recipients(&self, args: &CapabilityArgs) -> Vec<Record<Lead>> {
        let segment = args
            .param_str_opt("segment")
            .and_then(|s| s.parse::<LeadStatus>().ok());

        self.store
            .leads
            .view(|r| match segment {
                Some(status) => r.fields.status == status,
                None => r.fields.status != LeadStatus::Lost,
            })
            .await
            .into_iter()
            .filter(|r| !r.fields.email.trim().is_empty())
            .collect()
    }
}

/// Split generated copy into a subject and a body.
///
/// A leading `Subject:` / `Asunto:` line becomes the subject; otherwise the
/// first non-empty line is used and the full text stays as the body.
pub fn split_subject(content: &str) -> (String, String) {
    let content = content.trim();
    let first = content.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let trimmed = first.trim();

    for prefix in ["Subject:", "subject:", "Asunto:", "asunto:"] {
        if let Some(subject) = trimmed.strip_prefix(prefix) {
            let body = content
                .split_once(first)
                .map(|(_, rest)| rest.trim())
                .unwrap_or("")
                .to_string();
            return (clip(subject.trim()), body);
        }
    }

    (clip(trimmed.trim_start_matches('#').trim()), content.to_string())
}

fn clip(text: &str) -> String {
    text.chars().take(SUBJECT_MAX_CHARS).collect()
}

#[async_trait]
impl ExternalCapability for SendCampaign {
    async fn call(&self, args: &CapabilityArgs) -> Result<CapabilityOutput, EngineError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| EngineError::external(SEND_CAMPAIGN, "email api key is not configured"))?;
        let from = self
            .business
            .email_from
            .as_deref()
            .ok_or_else(|| EngineError::external(SEND_CAMPAIGN, "business.email_from is not configured"))?;

        let mut recipients = self.recipients(args).await;
        if recipients.is_empty() {
            return Err(EngineError::external(SEND_CAMPAIGN, "no leads to send to"));
        }

        let test_mode = !args.param_bool_opt("send_to_all").unwrap_or(false);
        if test_mode {
            recipients.truncate(1);
        }

        let (derived_subject, body) = split_subject(source_text(args));
        let subject = args
            .param_str_opt("subject")
            .map(str::to_string)
            .unwrap_or(derived_subject);
        if body.trim().is_empty() {
            return Err(EngineError::schema(SEND_CAMPAIGN, "email body is empty"));
        }

        let personalizations: Vec<Value> = recipients
            .iter()
            .map(|r| json!({"to": [{"email": r.fields.email, "name": r.fields.name}]}))
            .collect();

        let payload = json!({
            "personalizations": personalizations,
            "from": {"email": from, "name": self.business.name},
            "subject": subject,
            "content": [{"type": "text/plain", "value": body}],
        });

        let url = format!(
            "{}/mail/send",
            self.business.email_api_base.trim_end_matches('/')
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| EngineError::external(SEND_CAMPAIGN, e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::external(
                SEND_CAMPAIGN,
                format!("email provider returned {}", response.status()),
            ));
        }

        tracing::info!(recipients = recipients.len(), test_mode, "Campaign sent");

        Ok(CapabilityOutput::with_data(
            format!(
                "Campaign '{}' sent to {} lead(s){}",
                subject,
                recipients.len(),
                if test_mode { " (test mode)" } else { "" }
            ),
            json!({
                "subject": subject,
                "recipients": recipients.len(),
                "testMode": test_mode,
            }),
        ))
    }
}
