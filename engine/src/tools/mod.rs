//! Built-in capabilities
//!
//! | name | side effect |
//! |---|---|
//! | `generate_content` | external call (reasoning engine) |
//! | `image_generator` | external call (images endpoint) |
//! | `appointment_setter` | external call (reasoning engine) |
//! | `format_post` | pure |
//! | `publish_post` | external call (Graph API) |
//! | `send_campaign` | external call (email provider) |
//! | `leads_manager` | store mutation |
//! | `content_calendar` | store mutation |

pub mod appointment;
pub mod calendar;
pub mod content;
pub mod email;
pub mod format;
pub mod image;
pub mod leads;
pub mod social;

pub use appointment::AppointmentSetter;
pub use calendar::ContentCalendar;
pub use content::GenerateContent;
pub use email::SendCampaign;
pub use format::FormatPost;
pub use image::GenerateImage;
pub use leads::LeadsManager;
pub use social::PublishPost;

use crate::capability::{CapabilityRegistry, Handler};
use crate::config::{BusinessConfig, LLMConfig};
use crate::executor::PREVIOUS_KEY;
use crate::llm::ReasoningEngine;
use crate::store::Store;
use sdk::{CapabilityArgs, EngineError};
use std::sync::Arc;

/// Capability names
pub mod names {
    pub const GENERATE_CONTENT: &str = "generate_content";
    pub const IMAGE_GENERATOR: &str = "image_generator";
    pub const APPOINTMENT_SETTER: &str = "appointment_setter";
    pub const FORMAT_POST: &str = "format_post";
    pub const PUBLISH_POST: &str = "publish_post";
    pub const SEND_CAMPAIGN: &str = "send_campaign";
    pub const LEADS_MANAGER: &str = "leads_manager";
    pub const CONTENT_CALENDAR: &str = "content_calendar";

    pub const ALL: [&str; 8] = [
        GENERATE_CONTENT,
        IMAGE_GENERATOR,
        APPOINTMENT_SETTER,
        FORMAT_POST,
        PUBLISH_POST,
        SEND_CAMPAIGN,
        LEADS_MANAGER,
        CONTENT_CALENDAR,
    ];
}

/// What the built-in capabilities need from the process context
pub struct BuiltinDeps {
    pub engine: Arc<dyn ReasoningEngine>,
    pub store: Arc<Store>,
    pub business: BusinessConfig,
    pub llm: LLMConfig,
    pub openai_api_key: Option<String>,
    pub graph_api_base: String,
    pub meta_access_token: Option<String>,
    pub sendgrid_api_key: Option<String>,
}

/// Register all built-in capabilities.
pub fn register_builtin(
    registry: &mut CapabilityRegistry,
    deps: BuiltinDeps,
) -> Result<(), EngineError> {
    let client = reqwest::Client::new();

    registry.register(GenerateContent::capability(Handler::External(Arc::new(
        GenerateContent::new(deps.engine.clone(), deps.business.clone()),
    ))))?;

    registry.register(GenerateImage::capability(Handler::External(Arc::new(
        GenerateImage::new(
            client.clone(),
            &deps.llm.base_url,
            deps.openai_api_key,
            deps.llm.image_model,
            deps.llm.image_size,
            deps.business.clone(),
        ),
    ))))?;

    registry.register(AppointmentSetter::capability(Handler::External(Arc::new(
        AppointmentSetter::new(deps.engine, deps.business.clone()),
    ))))?;

    registry.register(FormatPost::capability(Handler::Pure(Arc::new(
        FormatPost::new(deps.business.hashtags.clone()),
    ))))?;

    registry.register(PublishPost::capability(Handler::External(Arc::new(
        PublishPost::new(
            client.clone(),
            deps.graph_api_base,
            deps.meta_access_token,
            deps.business.instagram_account_id.clone(),
            deps.business.facebook_page_id.clone(),
        ),
    ))))?;

    registry.register(SendCampaign::capability(Handler::External(Arc::new(
        SendCampaign::new(
            client,
            deps.store.clone(),
            deps.business.clone(),
            deps.sendgrid_api_key,
        ),
    ))))?;

    registry.register(LeadsManager::capability(Handler::Store(Arc::new(
        LeadsManager::new(deps.store.clone()),
    ))))?;

    registry.register(ContentCalendar::capability(Handler::Store(Arc::new(
        ContentCalendar::new(deps.store),
    ))))?;

    Ok(())
}

/// Argument carrying literal text supplied by the requester
pub const TEXT_KEY: &str = "text";

/// The text a task operates on: an explicit `text` argument, else the
/// previous task's output, else the task input.
pub(crate) fn source_text(args: &CapabilityArgs) -> &str {
    [TEXT_KEY, PREVIOUS_KEY]
        .iter()
        .filter_map(|key| args.param_str_opt(key))
        .find(|text| !text.trim().is_empty())
        .unwrap_or_else(|| args.input())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_text_prefers_previous() {
        let args = CapabilityArgs::new()
            .with_param("input", json!("task"))
            .with_param(PREVIOUS_KEY, json!("draft"));
        assert_eq!(source_text(&args), "draft");

        let args = CapabilityArgs::new()
            .with_param("input", json!("task"))
            .with_param(PREVIOUS_KEY, json!("  "));
        assert_eq!(source_text(&args), "task");

        let args = args.with_param(TEXT_KEY, json!("literal"));
        assert_eq!(source_text(&args), "literal");
    }
}
