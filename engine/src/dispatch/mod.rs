//! Request dispatch
//!
//! Events from both ingestion paths land in one bounded queue. Each event
//! gets its own task, gated by a semaphore of `max_concurrent_runs`, so a
//! slow run never holds up the poll loop or other senders.
//!
//! Per event: parse → route (tier + ledger) → plan → execute → reply on the
//! channel the event came from.

use crate::context::EngineContext;
use crate::executor::plans::Command;
use crate::executor::RunOutcome;
use crate::ingestion::{Channel, InboundEvent, Replier};
use crate::router::{Tier, TierDecision, UsageReport};
use crate::secrets::scrub;
use sdk::{CrewErrorExt, EngineError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, info_span, warn, Instrument};

/// What a request produced
#[derive(Debug)]
pub struct Reply {
    pub text: String,
    pub decision: Option<TierDecision>,
    pub outcome: Option<RunOutcome>,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            decision: None,
            outcome: None,
        }
    }
}

pub struct Dispatcher {
    ctx: Arc<EngineContext>,
    repliers: HashMap<Channel, Arc<dyn Replier>>,
    /// Channels whose free text is answered by the appointment setter
    prospect_channels: HashSet<Channel>,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        let permits = Arc::new(Semaphore::new(ctx.config.executor.max_concurrent_runs));
        Self {
            ctx,
            repliers: HashMap::new(),
            prospect_channels: HashSet::new(),
            permits,
        }
    }

    pub fn with_replier(mut self, channel: Channel, replier: Arc<dyn Replier>) -> Self {
        self.repliers.insert(channel, replier);
        self
    }

    pub fn with_prospect_channel(mut self, channel: Channel) -> Self {
        self.prospect_channels.insert(channel);
        self
    }

    pub fn has_replier(&self, channel: Channel) -> bool {
        self.repliers.contains_key(&channel)
    }

    /// Answer one request.
    ///
    /// # Errors
    /// Only errors that stop a run from being planned (ledger persistence,
    /// plan validation). Run failures are part of the reply.
    pub async fn respond(&self, text: &str) -> Result<Reply, EngineError> {
        self.respond_to(Command::parse(text), text).await
    }

    async fn respond_to(&self, command: Command, text: &str) -> Result<Reply, EngineError> {
        match &command {
            Command::Start => return Ok(Reply::text(self.start_text())),
            Command::Help => return Ok(Reply::text(HELP)),
            Command::Costs => return Ok(Reply::text(render_usage(&self.ctx.router.ledger().report().await))),
            Command::Models => return Ok(Reply::text(self.models_text())),
            Command::Invalid(hint) => return Ok(Reply::text(hint.clone())),
            _ => {}
        }

        let decision = self.ctx.router.route(text).await?;
        let Some(plan) = self.ctx.plans.prepare(&command, decision.tier)? else {
            return Ok(Reply::text(HELP));
        };

        let outcome = self.ctx.executor.execute(plan).await;
        Ok(Reply {
            text: render_outcome(&outcome),
            decision: Some(decision),
            outcome: Some(outcome),
        })
    }

    /// Answer an event and send the reply back on its channel.
    pub async fn handle(&self, event: InboundEvent) {
        let span = info_span!("event", channel = %event.channel, sender = %event.sender_id);
        async {
            info!(text_len = event.text.len(), "Handling event");

            let mut command = Command::parse(&event.text);
            if self.prospect_channels.contains(&event.channel) {
                command = command.for_prospect();
            }

            let text = match self.respond_to(command, &event.text).await {
                Ok(reply) => reply.text,
                Err(e) => {
                    error!(error = %scrub(&e.to_string()), "Request could not be planned");
                    format!("Sorry, that request could not be started. {}", e.user_hint())
                }
            };

            let Some(replier) = self.repliers.get(&event.channel) else {
                warn!("No replier configured for channel; reply dropped");
                return;
            };
            if let Err(e) = replier.reply(&event.reply_to, &scrub(&text)).await {
                error!(error = %scrub(&e.to_string()), "Failed to send reply");
            }
        }
        .instrument(span)
        .await
    }

    /// Drain the queue until every sender is gone.
    pub async fn run(self: Arc<Self>, mut queue: mpsc::Receiver<InboundEvent>) {
        info!(
            max_concurrent_runs = self.ctx.config.executor.max_concurrent_runs,
            "Dispatcher started"
        );

        while let Some(event) = queue.recv().await {
            let permit = match Arc::clone(&self.permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                this.handle(event).await;
                drop(permit);
            });
        }

        // Wait for in-flight runs before returning.
        let _ = self
            .permits
            .acquire_many(self.ctx.config.executor.max_concurrent_runs as u32)
            .await;
        info!("Dispatcher stopped");
    }

    fn start_text(&self) -> String {
        format!(
            "Hi! I'm the marketing crew for {}.\n\n{}",
            self.ctx.config.business.name, HELP
        )
    }

    fn models_text(&self) -> String {
        let costs = self.ctx.router.costs();
        let mut out = String::from("Models by tier:");
        for tier in Tier::ALL {
            out.push_str(&format!(
                "\n{}: {} ({} per request)",
                tier,
                self.ctx.engine.model_for(tier),
                costs.of(tier)
            ));
        }
        out
    }
}

const HELP: &str = "Commands:\n\
/strategy - four-week content strategy\n\
/content <topic> - Instagram post, formatted and added to the calendar\n\
/image [spiritual|nature|ceremony|healing|retreat] <topic> - image for a post\n\
/ask <question> - answer a prospect and invite them to a discovery call\n\
/email [promotional|educational|testimonial|nurture] - write and send a campaign (test mode)\n\
/leads [status] - lead segment with follow-ups\n\
/report - performance report\n\
/campaign [goal] - full multi-channel campaign\n\
/daily - today's post, leads and summary\n\
/publish <instagram|facebook> [image_url] <text> - publish now\n\
/costs - usage and savings\n\
/models - models per tier\n\n\
Anything else is answered directly.";

/// Reportable outputs, plus the failing task for a failed run.
pub fn render_outcome(outcome: &RunOutcome) -> String {
    let entries: Vec<_> = outcome.context.reportable().collect();
    let mut out = match entries.as_slice() {
        [] => String::new(),
        [only] => only.output.text.clone(),
        many => many
            .iter()
            .map(|e| format!("[{}]\n{}", e.task, e.output.text))
            .collect::<Vec<_>>()
            .join("\n\n"),
    };

    if let Some(failure) = &outcome.failure {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&format!(
            "Task '{}' ({}) failed: {}\n{}",
            failure.task,
            failure.worker,
            failure.error.user_hint(),
            scrub(&failure.error.to_string())
        ));
    }

    if out.is_empty() {
        out.push_str("Done.");
    }
    out
}

/// Ledger totals as text.
pub fn render_usage(report: &UsageReport) -> String {
    let mut out = format!(
        "Requests: {}\nTotal cost: {}\nAll-premium cost: {}\nSavings: {} ({:.1}%)",
        report.total_requests,
        report.total_cost,
        report.counterfactual_premium_cost,
        report.savings(),
        report.savings_percent()
    );
    for tier in Tier::ALL {
        let usage = report.tier(tier);
        out.push_str(&format!("\n  {}: {} requests, {}", tier, usage.count, usage.cost));
    }
    out
}
