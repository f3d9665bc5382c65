//! Domain fields of the two collections

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pipeline position of a lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Interested,
    Converted,
    Lost,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 5] = [
        LeadStatus::New,
        LeadStatus::Contacted,
        LeadStatus::Interested,
        LeadStatus::Converted,
        LeadStatus::Lost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Interested => "interested",
            LeadStatus::Converted => "converted",
            LeadStatus::Lost => "lost",
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown lead status '{}'", s))
    }
}

/// A prospective client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub name: String,
    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// Where the lead came from (telegram, messenger, website, cli)
    #[serde(default)]
    pub source: String,

    #[serde(default)]
    pub status: LeadStatus,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interests: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Lead {
    pub fn new(name: impl Into<String>, email: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: None,
            source: source.into(),
            status: LeadStatus::New,
            interests: Vec::new(),
            notes: None,
        }
    }
}

/// Lifecycle of a calendar entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    #[default]
    Draft,
    Scheduled,
    Published,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Draft => "draft",
            EntryStatus::Scheduled => "scheduled",
            EntryStatus::Published => "published",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(EntryStatus::Draft),
            "scheduled" => Ok(EntryStatus::Scheduled),
            "published" => Ok(EntryStatus::Published),
            other => Err(format!("unknown entry status '{}'", other)),
        }
    }
}

/// A planned or published post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEntry {
    pub platform: String,

    #[serde(default)]
    pub topic: String,

    /// Post body
    #[serde(default)]
    pub content: String,

    /// ISO-8601 date or date-time the post is planned for
    #[serde(
        default,
        rename = "scheduledFor",
        skip_serializing_if = "Option::is_none"
    )]
    pub scheduled_for: Option<String>,

    #[serde(default)]
    pub status: EntryStatus,

    /// Platform post id once published
    #[serde(default, rename = "postId", skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
}

impl CalendarEntry {
    pub fn draft(platform: impl Into<String>, topic: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            topic: topic.into(),
            content: content.into(),
            scheduled_for: None,
            status: EntryStatus::Draft,
            post_id: None,
        }
    }
}
