//! Integration tests for the built-in capabilities that leave the process
//!
//! The Graph API and the email provider are served by wiremock; calls go
//! through the capability registry exactly as the executor makes them.

use async_trait::async_trait;
use crewline_engine::capability::CapabilityRegistry;
use crewline_engine::config::{BusinessConfig, Config, LLMConfig};
use crewline_engine::llm::{self, Completion, ReasoningEngine};
use crewline_engine::router::Tier;
use crewline_engine::store::{Lead, LeadStatus, Store};
use crewline_engine::tools::{names, register_builtin, BuiltinDeps};
use sdk::{CapabilityArgs, EngineError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

struct Silent;

#[async_trait]
impl ReasoningEngine for Silent {
    fn name(&self) -> &str {
        "silent"
    }

    fn model_for(&self, _tier: Tier) -> &str {
        "none"
    }

    async fn complete(&self, _request: &Completion) -> llm::Result<String> {
        Ok(String::new())
    }
}

fn business(server: &MockServer) -> BusinessConfig {
    let mut business = Config::default_config().business;
    business.instagram_account_id = Some("ig-1".to_string());
    business.facebook_page_id = Some("page-1".to_string());
    business.email_from = Some("hola@casaluna.example".to_string());
    business.email_api_base = format!("{}/v3", server.uri());
    business
}

async fn registry(server: &MockServer, dir: &std::path::Path) -> (CapabilityRegistry, Arc<Store>) {
    let store = Arc::new(Store::open(dir).await.unwrap());
    let mut registry = CapabilityRegistry::new(Duration::from_secs(5));
    register_builtin(
        &mut registry,
        BuiltinDeps {
            engine: Arc::new(Silent),
            store: Arc::clone(&store),
            business: business(server),
            llm: LLMConfig {
                base_url: format!("{}/v1", server.uri()),
                ..LLMConfig::default()
            },
            openai_api_key: Some("sk-test".to_string()),
            graph_api_base: server.uri(),
            meta_access_token: Some("EAAtesttoken".to_string()),
            sendgrid_api_key: Some("SG.test".to_string()),
        },
    )
    .unwrap();
    (registry, store)
}

#[tokio::test]
async fn test_facebook_post_goes_to_page_feed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/page-1/feed"))
        .and(body_partial_json(json!({"message": "Retiro de luna llena"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "page-1_99"})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (registry, _store) = registry(&server, dir.path()).await;

    let args = CapabilityArgs::new()
        .with_param("input", json!("Publish it"))
        .with_param("platform", json!("facebook"))
        .with_param("text", json!("  Retiro de luna llena "));
    let invocation = registry.invoke(names::PUBLISH_POST, &args).await.unwrap();
    assert_eq!(invocation.output.data["postId"], json!("page-1_99"));
    assert!(invocation.committed.is_none());
}

#[tokio::test]
async fn test_instagram_publish_is_two_step() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ig-1/media"))
        .and(body_partial_json(json!({"image_url": "https://img.example/luna.jpg"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "container-7"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ig-1/media_publish"))
        .and(body_partial_json(json!({"creation_id": "container-7"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "media-8"})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (registry, _store) = registry(&server, dir.path()).await;

    let args = CapabilityArgs::new()
        .with_param("input", json!("Publish it"))
        .with_param("platform", json!("instagram"))
        .with_param("image_url", json!("https://img.example/luna.jpg"))
        .with_param("previous", json!("Ven al temazcal"));
    let invocation = registry.invoke(names::PUBLISH_POST, &args).await.unwrap();
    assert_eq!(invocation.output.data["postId"], json!("media-8"));
    assert_eq!(invocation.output.data["content"], json!("Ven al temazcal"));
}

#[tokio::test]
async fn test_graph_error_is_external_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/page-1/feed"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"message": "Invalid OAuth access token", "code": 190}
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (registry, _store) = registry(&server, dir.path()).await;

    let args = CapabilityArgs::new()
        .with_param("input", json!("hola"))
        .with_param("platform", json!("facebook"));
    let err = registry.invoke(names::PUBLISH_POST, &args).await.unwrap_err();
    match err {
        EngineError::ExternalCallFailed { capability, reason } => {
            assert_eq!(capability, names::PUBLISH_POST);
            assert!(reason.contains("Invalid OAuth access token"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_platform_is_schema_violation() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let (registry, _store) = registry(&server, dir.path()).await;

    let args = CapabilityArgs::new()
        .with_param("input", json!("hola"))
        .with_param("platform", json!("tiktok"));
    let err = registry.invoke(names::PUBLISH_POST, &args).await.unwrap_err();
    assert!(matches!(err, EngineError::SchemaViolation { .. }));
}

#[tokio::test]
async fn test_campaign_test_mode_sends_to_first_lead() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/mail/send"))
        .and(header("authorization", "Bearer SG.test"))
        .and(body_partial_json(json!({"subject": "Tu retiro te espera"})))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (registry, store) = registry(&server, dir.path()).await;
    for (name, status) in [("Ana", LeadStatus::Interested), ("Luis", LeadStatus::Interested)] {
        let mut lead = Lead::new(name, format!("{}@example.com", name.to_lowercase()), "test");
        lead.status = status;
        store.leads.add(lead).await.unwrap();
    }

    let args = CapabilityArgs::new()
        .with_param("input", json!("Subject: Tu retiro te espera\n\nHola, te esperamos."))
        .with_param("segment", json!("interested"));
    let invocation = registry.invoke(names::SEND_CAMPAIGN, &args).await.unwrap();
    assert_eq!(invocation.output.data["recipients"], json!(1));
    assert_eq!(invocation.output.data["testMode"], json!(true));
}

#[tokio::test]
async fn test_campaign_without_matching_leads_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (registry, store) = registry(&server, dir.path()).await;
    store
        .leads
        .add(Lead::new("Ana", "ana@example.com", "test"))
        .await
        .unwrap();

    let args = CapabilityArgs::new()
        .with_param("input", json!("Subject: Hola\n\ncuerpo"))
        .with_param("segment", json!("converted"));
    let err = registry.invoke(names::SEND_CAMPAIGN, &args).await.unwrap_err();
    assert!(err.to_string().contains("no leads to send to"));
}

#[tokio::test]
async fn test_image_generator_returns_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "dall-e-3", "n": 1})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": [{"url": "https://img.example/x.png"}]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (registry, _store) = registry(&server, dir.path()).await;

    let args = CapabilityArgs::new()
        .with_param("input", json!("Image for the full moon retreat"))
        .with_param("style", json!("ceremony"));
    let invocation = registry.invoke(names::IMAGE_GENERATOR, &args).await.unwrap();
    assert_eq!(invocation.output.data["imageUrl"], json!("https://img.example/x.png"));
    assert_eq!(invocation.output.data["style"], json!("ceremony"));
    assert_eq!(invocation.output.text, "Image: https://img.example/x.png");
}

#[tokio::test]
async fn test_image_generator_surfaces_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .respond_with(ResponseTemplate::new(400).set_body_json(
            json!({"error": {"message": "Your request was rejected by the safety system"}}),
        ))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (registry, _store) = registry(&server, dir.path()).await;

    let args = CapabilityArgs::new().with_param("input", json!("retiro"));
    let err = registry.invoke(names::IMAGE_GENERATOR, &args).await.unwrap_err();
    match err {
        EngineError::ExternalCallFailed { capability, reason } => {
            assert_eq!(capability, names::IMAGE_GENERATOR);
            assert!(reason.contains("safety system"));
        }
        other => panic!("expected external failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_image_style_outside_catalog_is_rejected() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let (registry, _store) = registry(&server, dir.path()).await;

    let args = CapabilityArgs::new()
        .with_param("input", json!("retiro"))
        .with_param("style", json!("neon"));
    let err = registry.invoke(names::IMAGE_GENERATOR, &args).await.unwrap_err();
    assert!(matches!(err, EngineError::SchemaViolation { .. }));
}
