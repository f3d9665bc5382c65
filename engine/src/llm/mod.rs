//! Reasoning engine interface
//!
//! The engine never reasons on its own; it sends a prompt to an external
//! scored-tier service and gets text back. [`ReasoningEngine`] is the seam,
//! [`openai::OpenAIEngine`] the production implementation.

use crate::router::Tier;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod openai;

pub use openai::OpenAIEngine;

/// Result type for reasoning engine calls
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors from a reasoning engine
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Role of a chat message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
        }
    }
}

/// One chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// A completion request at a given tier
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub tier: Tier,
    pub messages: Vec<Message>,
}

impl Completion {
    pub fn new(tier: Tier, system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            tier,
            messages: vec![Message::system(system), Message::user(prompt)],
        }
    }
}

/// An external text generator with per-tier models.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Name for logs
    fn name(&self) -> &str;

    /// Model used for `tier`
    fn model_for(&self, tier: Tier) -> &str;

    /// Generate a reply
    async fn complete(&self, request: &Completion) -> Result<String>;
}
