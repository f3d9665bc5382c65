//! Plan library
//!
//! Turns a request (a slash command or free text) into a validated run plan
//! over the default roster.

use super::{ContextRef, PlanBuilder, RunPlan, TaskNode};
use crate::capability::CapabilityRegistry;
use crate::router::Tier;
use crate::store::LeadStatus;
use crate::tools::image::STYLES;
use crate::tools::names::*;
use crate::tools::TEXT_KEY;
use crate::workers::*;
use sdk::EngineError;
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Kind of email campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmailKind {
    #[default]
    Promotional,
    Educational,
    Testimonial,
    Nurture,
}

impl EmailKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailKind::Promotional => "promotional",
            EmailKind::Educational => "educational",
            EmailKind::Testimonial => "testimonial",
            EmailKind::Nurture => "nurture",
        }
    }

    fn brief(&self) -> &'static str {
        match self {
            EmailKind::Promotional => "the next retreat date and how to book it",
            EmailKind::Educational => "how to prepare for the retreat and its ceremonies",
            EmailKind::Testimonial => "transformation stories from past participants",
            EmailKind::Nurture => "a warm follow-up for leads who showed interest",
        }
    }

    /// Leads the campaign goes to.
    fn segment(&self) -> Option<LeadStatus> {
        match self {
            EmailKind::Nurture => Some(LeadStatus::Interested),
            _ => None,
        }
    }
}

impl fmt::Display for EmailKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmailKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "promotional" | "promo" => Ok(EmailKind::Promotional),
            "educational" => Ok(EmailKind::Educational),
            "testimonial" | "testimonials" => Ok(EmailKind::Testimonial),
            "nurture" => Ok(EmailKind::Nurture),
            other => Err(format!(
                "unknown email kind '{}' (promotional, educational, testimonial, nurture)",
                other
            )),
        }
    }
}

/// A parsed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Costs,
    Models,
    Strategy,
    Content { topic: String },
    Image { style: String, topic: String },
    /// A prospect's question for the appointment setter
    Ask { question: String },
    Email { kind: EmailKind },
    Leads { segment: LeadStatus },
    Report,
    Campaign { goal: String },
    Daily,
    Publish {
        platform: String,
        image_url: Option<String>,
        text: String,
    },
    /// Anything that is not a command
    Request(String),
    /// A command that could not be understood; carries the usage hint
    Invalid(String),
}

const DEFAULT_TOPIC: &str = "the upcoming retreat";
const DEFAULT_GOAL: &str = "fill the next retreat";

impl Command {
    /// Parse a message. A leading `/` marks a command; `@botname` suffixes
    /// are ignored.
    pub fn parse(text: &str) -> Command {
        let text = text.trim();
        let Some(body) = text.strip_prefix('/') else {
            return Command::Request(text.to_string());
        };

        let (head, rest) = match body.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (body, ""),
        };
        let name = head.split('@').next().unwrap_or(head).to_lowercase();
        let or_default = |value: &str, default: &str| {
            if value.is_empty() {
                default.to_string()
            } else {
                value.to_string()
            }
        };

        match name.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "costs" | "stats" => Command::Costs,
            "models" => Command::Models,
            "strategy" => Command::Strategy,
            "content" | "social" => Command::Content {
                topic: or_default(rest, DEFAULT_TOPIC),
            },
            "image" => {
                let (style, topic) = match rest.split_once(char::is_whitespace) {
                    Some((first, tail)) if STYLES.contains(&first.to_lowercase().as_str()) => {
                        (first.to_lowercase(), tail.trim())
                    }
                    _ if STYLES.contains(&rest.to_lowercase().as_str()) => (rest.to_lowercase(), ""),
                    _ => (STYLES[0].to_string(), rest),
                };
                Command::Image {
                    style,
                    topic: or_default(topic, DEFAULT_TOPIC),
                }
            }
            "ask" | "info" => {
                if rest.is_empty() {
                    return Command::Invalid("usage: /ask <question>".to_string());
                }
                Command::Ask {
                    question: rest.to_string(),
                }
            }
            "email" => {
                if rest.is_empty() {
                    return Command::Email {
                        kind: EmailKind::default(),
                    };
                }
                match rest.parse() {
                    Ok(kind) => Command::Email { kind },
                    Err(e) => Command::Invalid(e),
                }
            }
            "leads" => {
                if rest.is_empty() {
                    return Command::Leads {
                        segment: LeadStatus::Interested,
                    };
                }
                match rest.parse() {
                    Ok(segment) => Command::Leads { segment },
                    Err(e) => Command::Invalid(e),
                }
            }
            "report" => Command::Report,
            "campaign" => Command::Campaign {
                goal: or_default(rest, DEFAULT_GOAL),
            },
            "daily" => Command::Daily,
            "publish" => parse_publish(rest),
            _ => Command::Request(text.to_string()),
        }
    }

    /// The same request from a prospect: free text goes to the appointment
    /// setter, commands are unchanged.
    pub fn for_prospect(self) -> Command {
        match self {
            Command::Request(question) => Command::Ask { question },
            other => other,
        }
    }

    /// Whether answering needs a run rather than a canned reply.
    pub fn needs_run(&self) -> bool {
        !matches!(
            self,
            Command::Start | Command::Help | Command::Costs | Command::Models | Command::Invalid(_)
        )
    }
}

const PUBLISH_USAGE: &str =
    "usage: /publish <instagram|facebook> [image_url] <text> (instagram needs an image url)";

fn parse_publish(rest: &str) -> Command {
    let mut parts = rest.splitn(2, char::is_whitespace);
    let platform = parts.next().unwrap_or("").to_lowercase();
    let mut text = parts.next().unwrap_or("").trim();

    if platform != "instagram" && platform != "facebook" {
        return Command::Invalid(PUBLISH_USAGE.to_string());
    }

    let mut image_url = None;
    if let Some((first, tail)) = text.split_once(char::is_whitespace) {
        if first.starts_with("http://") || first.starts_with("https://") {
            image_url = Some(first.to_string());
            text = tail.trim();
        }
    }

    if text.is_empty() || (platform == "instagram" && image_url.is_none()) {
        return Command::Invalid(PUBLISH_USAGE.to_string());
    }

    Command::Publish {
        platform,
        image_url,
        text: text.to_string(),
    }
}

/// Builds validated plans for commands.
pub struct PlanLibrary {
    workers: Arc<WorkerRegistry>,
    capabilities: Arc<CapabilityRegistry>,
}

impl PlanLibrary {
    pub fn new(workers: Arc<WorkerRegistry>, capabilities: Arc<CapabilityRegistry>) -> Self {
        Self {
            workers,
            capabilities,
        }
    }

    /// Plan for `command` at `tier`, or `None` for commands answered
    /// without a run.
    pub fn prepare(&self, command: &Command, tier: Tier) -> Result<Option<RunPlan>, EngineError> {
        let builder = match command {
            Command::Strategy => strategy(tier),
            Command::Content { topic } => content(tier, topic),
            Command::Image { style, topic } => image(tier, style, topic),
            Command::Ask { question } => ask(tier, question),
            Command::Email { kind } => email(tier, *kind),
            Command::Leads { segment } => leads(tier, *segment),
            Command::Report => report(tier),
            Command::Campaign { goal } => campaign(tier, goal),
            Command::Daily => daily(tier),
            Command::Publish {
                platform,
                image_url,
                text,
            } => publish(tier, platform, image_url.as_deref(), text),
            Command::Request(text) => request(tier, text),
            _ => return Ok(None),
        };

        builder.build(&self.workers, &self.capabilities).map(Some)
    }
}

fn calendar_view(worker: &str) -> TaskNode {
    TaskNode::new(
        "calendar_review",
        worker,
        CONTENT_CALENDAR,
        "List the entries in the content calendar",
    )
    .param("action", json!("view"))
    .context(ContextRef::None)
    .quiet()
}

fn instagram_post(topic: &str) -> [TaskNode; 3] {
    [
        TaskNode::new(
            "instagram_draft",
            CREATOR,
            GENERATE_CONTENT,
            format!(
                "Write an Instagram post about {}. Open with a hook, tell one concrete benefit, \
                 close with a call to action to book.",
                topic
            ),
        )
        .expected("Post copy ready to format, without hashtags")
        .param("platform", json!("instagram"))
        .param("topic", json!(topic)),
        TaskNode::new(
            "instagram_format",
            CREATOR,
            FORMAT_POST,
            "Fit the draft to Instagram",
        )
        .param("platform", json!("instagram"))
        .context(ContextRef::Previous),
        TaskNode::new(
            "calendar_entry",
            CREATOR,
            CONTENT_CALENDAR,
            "Record the post in the content calendar as a draft",
        )
        .param("action", json!("add"))
        .param("platform", json!("instagram"))
        .param("topic", json!(topic))
        .context(ContextRef::Previous),
    ]
}

fn strategy(tier: Tier) -> PlanBuilder {
    PlanBuilder::new("strategy", tier)
        .task(calendar_view(STRATEGIST))
        .task(
            TaskNode::new(
                "content_strategy",
                STRATEGIST,
                GENERATE_CONTENT,
                "Design a four-week content strategy for Instagram, Facebook and email. \
                 Build on what is already in the calendar.",
            )
            .expected("Content pillars, weekly themes, posting cadence and three post ideas per week"),
        )
}

fn content(tier: Tier, topic: &str) -> PlanBuilder {
    instagram_post(topic)
        .into_iter()
        .fold(PlanBuilder::new("content", tier), PlanBuilder::task)
}

fn image(tier: Tier, style: &str, topic: &str) -> PlanBuilder {
    PlanBuilder::new(format!("image:{}", style), tier).task(
        TaskNode::new(
            "image",
            CREATOR,
            IMAGE_GENERATOR,
            format!("Generate an image for a post about {}", topic),
        )
        .param("style", json!(style))
        .param(TEXT_KEY, json!(topic))
        .context(ContextRef::None),
    )
}

fn ask(tier: Tier, question: &str) -> PlanBuilder {
    PlanBuilder::new("ask", tier).task(
        TaskNode::new("answer", CUSTOMER_SUCCESS, APPOINTMENT_SETTER, question)
            .expected("A warm answer that invites the prospect to a discovery call")
            .context(ContextRef::None),
    )
}

fn email(tier: Tier, kind: EmailKind) -> PlanBuilder {
    let mut list = TaskNode::new(
        "audience",
        EMAIL_SPECIALIST,
        LEADS_MANAGER,
        "List the leads this campaign goes to",
    )
    .param("action", json!("view"))
    .context(ContextRef::None)
    .quiet();
    let mut send = TaskNode::new(
        "send",
        EMAIL_SPECIALIST,
        SEND_CAMPAIGN,
        "Send the campaign in test mode",
    )
    .context(ContextRef::Previous);
    if let Some(segment) = kind.segment() {
        list = list.param("status", json!(segment));
        send = send.param("segment", json!(segment));
    }

    PlanBuilder::new(format!("email:{}", kind), tier)
        .task(list)
        .task(
            TaskNode::new(
                "email_copy",
                EMAIL_SPECIALIST,
                GENERATE_CONTENT,
                format!(
                    "Write a {} email about {}. Start with a line 'Subject: ...' of at most 50 \
                     characters, then the body with a clear call to action and the contact details.",
                    kind,
                    kind.brief()
                ),
            )
            .expected("Subject line followed by the email body")
            .param("platform", json!("email")),
        )
        .task(send)
}

fn leads(tier: Tier, segment: LeadStatus) -> PlanBuilder {
    PlanBuilder::new(format!("leads:{}", segment), tier)
        .task(
            TaskNode::new(
                "segment",
                CUSTOMER_SUCCESS,
                LEADS_MANAGER,
                format!("Segment the leads with status {}", segment),
            )
            .param("action", json!("segment"))
            .param("segment", json!(segment))
            .context(ContextRef::None),
        )
        .task(
            TaskNode::new(
                "follow_up",
                CUSTOMER_SUCCESS,
                GENERATE_CONTENT,
                format!(
                    "Propose a personal follow-up for each {} lead listed above, \
                     and one next step for the whole segment.",
                    segment
                ),
            )
            .expected("One short follow-up message per lead and a segment-level next step"),
        )
}

fn report(tier: Tier) -> PlanBuilder {
    PlanBuilder::new("report", tier)
        .task(calendar_view(ANALYST))
        .task(
            TaskNode::new(
                "lead_review",
                ANALYST,
                LEADS_MANAGER,
                "List every lead",
            )
            .param("action", json!("view"))
            .context(ContextRef::None)
            .quiet(),
        )
        .task(
            TaskNode::new(
                "performance_report",
                ANALYST,
                GENERATE_CONTENT,
                "Write a performance report from the calendar and leads above: what was \
                 published, how the pipeline moved, and what to change next week.",
            )
            .expected("Short report with numbers and three recommendations"),
        )
}

fn campaign(tier: Tier, goal: &str) -> PlanBuilder {
    let builder = PlanBuilder::new("campaign", tier).task(
        TaskNode::new(
            "campaign_strategy",
            STRATEGIST,
            GENERATE_CONTENT,
            format!("Plan a multi-channel campaign whose goal is to {}.", goal),
        )
        .expected("Core message, audience, channel plan and timeline"),
    );

    instagram_post(goal)
        .into_iter()
        .fold(builder, PlanBuilder::task)
        .task(
            TaskNode::new(
                "facebook_post",
                SOCIAL_MANAGER,
                GENERATE_CONTENT,
                "Write the Facebook post for this campaign. It can be longer than the \
                 Instagram post and should include the booking link.",
            )
            .expected("Facebook post copy")
            .param("platform", json!("facebook")),
        )
        .task(
            TaskNode::new(
                "campaign_email",
                EMAIL_SPECIALIST,
                GENERATE_CONTENT,
                "Write the campaign email. Start with a line 'Subject: ...'.",
            )
            .expected("Subject line followed by the email body")
            .param("platform", json!("email")),
        )
        .task(
            TaskNode::new(
                "campaign_metrics",
                ANALYST,
                GENERATE_CONTENT,
                "Define how to measure this campaign: KPIs per channel and targets.",
            )
            .expected("KPI table with targets"),
        )
        .task(
            TaskNode::new(
                "lead_follow_up",
                CUSTOMER_SUCCESS,
                GENERATE_CONTENT,
                "Describe how to follow up with the leads this campaign brings in.",
            )
            .expected("Follow-up sequence for new leads"),
        )
}

fn daily(tier: Tier) -> PlanBuilder {
    let builder = PlanBuilder::new("daily", tier).task(calendar_view(STRATEGIST));

    instagram_post("today's theme from the calendar, or the upcoming retreat")
        .into_iter()
        .fold(builder, PlanBuilder::task)
        .task(
            TaskNode::new(
                "daily_image",
                CREATOR,
                IMAGE_GENERATOR,
                "Generate the image for today's post",
            )
            .param("style", json!("retreat"))
            .context(ContextRef::Previous),
        )
        .task(
            TaskNode::new(
                "interested_leads",
                CUSTOMER_SUCCESS,
                LEADS_MANAGER,
                "Segment the interested leads",
            )
            .param("action", json!("segment"))
            .param("segment", json!(LeadStatus::Interested))
            .context(ContextRef::None)
            .quiet(),
        )
        .task(
            TaskNode::new(
                "daily_summary",
                ANALYST,
                GENERATE_CONTENT,
                "Summarise today's marketing work and list the next actions, \
                 including which interested leads to contact.",
            )
            .expected("Short daily summary with a checklist"),
        )
}

fn publish(tier: Tier, platform: &str, image_url: Option<&str>, text: &str) -> PlanBuilder {
    let mut post = TaskNode::new(
        "publish",
        SOCIAL_MANAGER,
        PUBLISH_POST,
        format!("Publish the post on {}", platform),
    )
    .param("platform", json!(platform))
    .context(ContextRef::Previous);
    if let Some(url) = image_url {
        post = post.param("image_url", json!(url));
    }

    PlanBuilder::new(format!("publish:{}", platform), tier)
        .task(
            TaskNode::new(
                "format",
                SOCIAL_MANAGER,
                FORMAT_POST,
                format!("Fit the post to {}", platform),
            )
            .param("platform", json!(platform))
            .param(TEXT_KEY, json!(text))
            .context(ContextRef::None),
        )
        .task(post)
        .task(
            TaskNode::new(
                "calendar_entry",
                SOCIAL_MANAGER,
                CONTENT_CALENDAR,
                "Record the published post",
            )
            .param("action", json!("add"))
            .context(ContextRef::Previous),
        )
}

fn request(tier: Tier, text: &str) -> PlanBuilder {
    PlanBuilder::new("request", tier).task(
        TaskNode::new("answer", CREATOR, GENERATE_CONTENT, text)
            .expected("A direct, helpful answer")
            .context(ContextRef::None),
    )
}
