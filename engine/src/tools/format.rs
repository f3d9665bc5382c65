use super::names::FORMAT_POST;
use super::source_text;
use crate::capability::{Capability, Handler};
use sdk::{CapabilityArgs, CapabilityOutput, EngineError, FieldKind, InputSchema, PureCapability};
use serde_json::json;

/// Platform character limits
pub const INSTAGRAM_LIMIT: usize = 2200;
pub const FACEBOOK_LIMIT: usize = 63_206;

/// Fits copy to a platform: hashtags for Instagram, hard length limits.
pub struct FormatPost {
    hashtags: Vec<String>,
}

impl FormatPost {
    pub fn new(hashtags: Vec<String>) -> Self {
        Self { hashtags }
    }

    pub fn capability(handler: Handler) -> Capability {
        Capability::new(
            FORMAT_POST,
            "Fit copy to a platform's length limit and hashtag conventions",
            InputSchema::empty()
                .required("platform", FieldKind::one_of(&["instagram", "facebook", "email"]))
                .required("input", FieldKind::String)
                .optional("text", FieldKind::String),
            handler,
        )
    }

    /// Format `body` for `platform`. Returns the text and whether it was cut.
    pub fn format(&self, platform: &str, body: &str) -> (String, bool) {
        let body = body.trim();

        let suffix = if platform == "instagram" {
            let lower = body.to_lowercase();
            let missing: Vec<&str> = self
                .hashtags
                .iter()
                .filter(|tag| !lower.contains(&tag.to_lowercase()))
                .map(String::as_str)
                .collect();
            if missing.is_empty() {
                String::new()
            } else {
                format!("\n\n{}", missing.join(" "))
            }
        } else {
            String::new()
        };

        let limit = match platform {
            "instagram" => Some(INSTAGRAM_LIMIT),
            "facebook" => Some(FACEBOOK_LIMIT),
            _ => None,
        };

        let Some(limit) = limit else {
            return (format!("{}{}", body, suffix), false);
        };

        let budget = limit.saturating_sub(suffix.chars().count());
        let (body, truncated) = truncate_chars(body, budget);
        (format!("{}{}", body, suffix), truncated)
    }
}

/// Cut to at most `max` characters, ending with an ellipsis when cut.
fn truncate_chars(text: &str, max: usize) -> (String, bool) {
    if text.chars().count() <= max {
        return (text.to_string(), false);
    }
    if max == 0 {
        return (String::new(), true);
    }
    let mut cut: String = text.chars().take(max - 1).collect();
    cut.push('…');
    (cut, true)
}

impl PureCapability for FormatPost {
    fn apply(&self, args: &CapabilityArgs) -> Result<CapabilityOutput, EngineError> {
        let platform = args
            .param_str("platform")
            .map_err(|e| e.for_capability(FORMAT_POST))?;

        let (text, truncated) = self.format(platform, source_text(args));
        let length = text.chars().count();

        Ok(CapabilityOutput::with_data(
            text,
            json!({
                "platform": platform,
                "length": length,
                "truncated": truncated,
            }),
        ))
    }
}
