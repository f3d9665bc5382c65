use super::names::IMAGE_GENERATOR;
use super::{source_text, TEXT_KEY};
use crate::capability::{Capability, Handler};
use crate::config::BusinessConfig;
use crate::executor::PREVIOUS_DATA_KEY;
use async_trait::async_trait;
use sdk::{
    CapabilityArgs, CapabilityOutput, EngineError, ExternalCapability, FieldKind, InputSchema,
};
use serde_json::{json, Value};

/// Visual styles a post image can be generated in
pub const STYLES: [&str; 5] = ["spiritual", "nature", "ceremony", "healing", "retreat"];

fn style_cues(style: &str) -> &'static str {
    match style {
        "nature" => "lush vegetation, sacred plants, serene mountains, natural light, clear water",
        "ceremony" => "ceremonial space, feathers, crystals, candles, peaceful meditation",
        "healing" => "healing energy, golden light, transformation, rebirth, inner peace",
        "retreat" => "beautiful retreat center, mountain landscape, peaceful sanctuary, meditation space",
        _ => "mystical, ethereal, soft lighting, nature elements, sacred geometry, warm earth tones",
    }
}

/// Generates a post image through an OpenAI-compatible images endpoint.
pub struct GenerateImage {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
    size: String,
    business: BusinessConfig,
}

impl GenerateImage {
    pub fn new(
        client: reqwest::Client,
        api_base: &str,
        api_key: Option<String>,
        model: String,
        size: String,
        business: BusinessConfig,
    ) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            model,
            size,
            business,
        }
    }

    pub fn capability(handler: Handler) -> Capability {
        Capability::new(
            IMAGE_GENERATOR,
            "Generate a marketing image for a post",
            InputSchema::empty()
                .required("input", FieldKind::String)
                .optional("style", FieldKind::one_of(&STYLES))
                .optional("text", FieldKind::String),
            handler,
        )
    }

    /// What the image shows: explicit text, else the content of the post
    /// the previous task stored, else the usual source text.
    fn subject<'a>(args: &'a CapabilityArgs) -> &'a str {
        if let Some(text) = args.param_str_opt(TEXT_KEY).filter(|t| !t.trim().is_empty()) {
            return text;
        }
        args.params
            .get(PREVIOUS_DATA_KEY)
            .and_then(|data| data.get("content"))
            .and_then(Value::as_str)
            .filter(|content| !content.trim().is_empty())
            .unwrap_or_else(|| source_text(args))
    }

    /// Prompt for an Instagram-ready image about `subject`.
    pub fn prompt(&self, style: &str, subject: &str) -> String {
        format!(
            "Professional marketing image for {name}, a retreat in {location}.\n\
             Subject: {subject}\n\
             Style: {cues}. High resolution, professional photography, warm inviting colors, \
             spiritual but not overwhelming, clean modern composition suitable for social media.\n\
             Leave a clean area for a text overlay.\n\
             Avoid: dark or scary imagery, anything overly psychedelic, any text in the image.",
            name = self.business.name,
            location = self.business.location,
            subject = subject.trim(),
            cues = style_cues(style),
        )
    }
}

#[async_trait]
impl ExternalCapability for GenerateImage {
    async fn call(&self, args: &CapabilityArgs) -> Result<CapabilityOutput, EngineError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| EngineError::external(IMAGE_GENERATOR, "openai_api_key is not configured"))?;
        let style = args.param_str_opt("style").unwrap_or(STYLES[0]);
        let prompt = self.prompt(style, Self::subject(args));

        let response = self
            .client
            .post(format!("{}/images/generations", self.api_base))
            .bearer_auth(key)
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "size": self.size,
                "n": 1,
            }))
            .send()
            .await
            .map_err(|e| EngineError::external(IMAGE_GENERATOR, e.to_string()))?;

        let status = response.status();
        let data: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let message = data
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("no error message");
            return Err(EngineError::external(
                IMAGE_GENERATOR,
                format!("{}: {}", status, message),
            ));
        }

        let url = data
            .pointer("/data/0/url")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::external(IMAGE_GENERATOR, "response had no image url"))?;

        tracing::info!(style, model = %self.model, "Image generated");

        Ok(CapabilityOutput::with_data(
            format!("Image: {}", url),
            json!({
                "imageUrl": url,
                "style": style,
                "model": self.model,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(key: Option<&str>) -> GenerateImage {
        GenerateImage::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/v1/",
            key.map(str::to_string),
            "dall-e-3".into(),
            "1024x1024".into(),
            BusinessConfig::default(),
        )
    }

    #[test]
    fn test_prompt_carries_subject_and_style() {
        let prompt = generator(None).prompt("ceremony", "  luna llena en el temazcal ");
        assert!(prompt.contains("Subject: luna llena en el temazcal\n"));
        assert!(prompt.contains("candles"));
        assert!(prompt.contains("Valle de Bravo"));
    }

    #[test]
    fn test_subject_prefers_stored_post() {
        let args = CapabilityArgs::new()
            .with_param("input", json!("Image for today's post"))
            .with_param("previous", json!("Calendar entry #3 added"))
            .with_param(PREVIOUS_DATA_KEY, json!({"id": 3, "content": "Ven al temazcal"}));
        assert_eq!(GenerateImage::subject(&args), "Ven al temazcal");

        let args = args.with_param(TEXT_KEY, json!("luna llena"));
        assert_eq!(GenerateImage::subject(&args), "luna llena");
    }

    #[tokio::test]
    async fn test_missing_key() {
        let args = CapabilityArgs::new().with_param("input", json!("retiro"));
        let err = generator(None).call(&args).await.unwrap_err();
        assert!(err.to_string().contains("openai_api_key"));
    }
}
