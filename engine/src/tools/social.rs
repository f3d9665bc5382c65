use super::names::PUBLISH_POST;
use super::source_text;
use crate::capability::{Capability, Handler};
use async_trait::async_trait;
use sdk::{
    CapabilityArgs, CapabilityOutput, EngineError, ExternalCapability, FieldKind, InputSchema,
};
use serde_json::{json, Value};

/// Publishes a post through the Graph API.
///
/// Instagram is a two-step publish (create a media container, then publish
/// it) and needs an image. Facebook posts go straight to the page feed.
pub struct PublishPost {
    client: reqwest::Client,
    api_base: String,
    access_token: Option<String>,
    instagram_account_id: Option<String>,
    facebook_page_id: Option<String>,
}

impl PublishPost {
    pub fn new(
        client: reqwest::Client,
        api_base: String,
        access_token: Option<String>,
        instagram_account_id: Option<String>,
        facebook_page_id: Option<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            access_token,
            instagram_account_id,
            facebook_page_id,
        }
    }

    pub fn capability(handler: Handler) -> Capability {
        Capability::new(
            PUBLISH_POST,
            "Publish a post on Instagram or Facebook",
            InputSchema::empty()
                .required("platform", FieldKind::one_of(&["instagram", "facebook"]))
                .required("input", FieldKind::String)
                .optional("text", FieldKind::String)
                .optional("image_url", FieldKind::String)
                .optional("link", FieldKind::String),
            handler,
        )
    }

    async fn post(&self, url: &str, body: Value) -> Result<String, EngineError> {
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::external(PUBLISH_POST, e.to_string()))?;

        let status = response.status();
        let data: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let message = data
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .unwrap_or("no error message");
            return Err(EngineError::external(
                PUBLISH_POST,
                format!("{}: {}", status, message),
            ));
        }

        data.get("id")
            .and_then(|id| id.as_str())
            .map(str::to_string)
            .ok_or_else(|| EngineError::external(PUBLISH_POST, "response had no id"))
    }

    async fn publish_instagram(
        &self,
        token: &str,
        caption: &str,
        args: &CapabilityArgs,
    ) -> Result<String, EngineError> {
        let account = self
            .instagram_account_id
            .as_deref()
            .ok_or_else(|| EngineError::external(PUBLISH_POST, "instagram account id is not configured"))?;
        let image_url = args
            .param_str_opt("image_url")
            .ok_or_else(|| EngineError::schema(PUBLISH_POST, "instagram posts need image_url"))?;

        let creation_id = self
            .post(
                &format!("{}/{}/media", self.api_base, account),
                json!({
                    "image_url": image_url,
                    "caption": caption,
                    "access_token": token,
                }),
            )
            .await?;

        self.post(
            &format!("{}/{}/media_publish", self.api_base, account),
            json!({
                "creation_id": creation_id,
                "access_token": token,
            }),
        )
        .await
    }

    async fn publish_facebook(
        &self,
        token: &str,
        message: &str,
        args: &CapabilityArgs,
    ) -> Result<String, EngineError> {
        let page = self
            .facebook_page_id
            .as_deref()
            .ok_or_else(|| EngineError::external(PUBLISH_POST, "facebook page id is not configured"))?;

        let mut body = json!({
            "message": message,
            "access_token": token,
        });
        if let Some(link) = args.param_str_opt("link") {
            body["link"] = json!(link);
        }

        self.post(&format!("{}/{}/feed", self.api_base, page), body)
            .await
    }
}

#[async_trait]
impl ExternalCapability for PublishPost {
    async fn call(&self, args: &CapabilityArgs) -> Result<CapabilityOutput, EngineError> {
        let platform = args
            .param_str("platform")
            .map_err(|e| e.for_capability(PUBLISH_POST))?;
        let token = self
            .access_token
            .as_deref()
            .ok_or_else(|| EngineError::external(PUBLISH_POST, "meta access token is not configured"))?;

        let text = source_text(args).trim();
        if text.is_empty() {
            return Err(EngineError::schema(PUBLISH_POST, "nothing to publish"));
        }

        let post_id = match platform {
            "instagram" => self.publish_instagram(token, text, args).await?,
            _ => self.publish_facebook(token, text, args).await?,
        };

        tracing::info!(platform, post_id = %post_id, "Post published");

        Ok(CapabilityOutput::with_data(
            format!("Published to {} (post id {})", platform, post_id),
            json!({
                "platform": platform,
                "postId": post_id,
                "content": text,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publisher(token: Option<&str>) -> PublishPost {
        PublishPost::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/".into(),
            token.map(str::to_string),
            Some("ig".into()),
            Some("page".into()),
        )
    }

    #[tokio::test]
    async fn test_missing_token() {
        let args = CapabilityArgs::new()
            .with_param("platform", json!("facebook"))
            .with_param("input", json!("hola"));
        let err = publisher(None).call(&args).await.unwrap_err();
        assert!(matches!(err, EngineError::ExternalCallFailed { .. }));
    }

    #[tokio::test]
    async fn test_instagram_needs_image() {
        let args = CapabilityArgs::new()
            .with_param("platform", json!("instagram"))
            .with_param("input", json!("hola"));
        let err = publisher(Some("t")).call(&args).await.unwrap_err();
        assert!(matches!(err, EngineError::SchemaViolation { .. }));
    }
}
