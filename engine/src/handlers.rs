//! Command handlers for CLI operations
//!
//! - serve: run the ingestion paths and the dispatcher
//! - run: answer one request locally
//! - classify / usage: tier routing and the ledger
//! - leads / calendar: the durable collections
//! - workers / secrets: roster and credentials

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::context::{EngineContext, ResolvedSecrets};
use crate::dispatch::{render_usage, Dispatcher};
use crate::ingestion::messenger::MessengerClient;
use crate::ingestion::telegram::{TelegramClient, TelegramSource};
use crate::ingestion::webhook::{self, WebhookState};
use crate::ingestion::whatsapp::WhatsAppClient;
use crate::ingestion::{Channel, IngestionCursor, PollLoop};
use crate::scheduler::Scheduler;
use crate::router::ledger::{UsageLedger, USAGE_FILE};
use crate::router::{Cost, TierRouter};
use crate::secrets::{self, SecretManager, KNOWN_SECRETS};
use crate::store::{EntryStatus, Lead, LeadStatus, Store};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run the enabled ingestion paths until Ctrl-C.
pub async fn handle_serve(config: &Config) -> Result<()> {
    if !config.telegram.enabled && !config.webhook.enabled {
        bail!("Nothing to serve. Enable [telegram] or [webhook] in config.toml");
    }

    let secrets = ResolvedSecrets::resolve(&SecretManager::default());
    if secrets.openai_api_key.is_none() {
        warn!("openai_api_key is not set; generation tasks will fail");
    }
    let ctx = Arc::new(EngineContext::build(config.clone(), secrets).await?);

    let (queue_tx, queue_rx) = mpsc::channel(config.executor.queue_capacity);
    let mut dispatcher = Dispatcher::new(Arc::clone(&ctx));
    let mut poll_tasks = Vec::new();
    let mut webhook_task = None;

    if config.telegram.enabled {
        let token = ctx.secrets.telegram_bot_token.clone().context(
            "Telegram is enabled but telegram_bot_token is missing. \
             Run `crewline secrets set telegram_bot_token`",
        )?;
        let client = TelegramClient::new(&config.telegram.api_base, token);
        dispatcher = dispatcher.with_replier(Channel::Telegram, Arc::new(client.clone()));

        let poll_loop = PollLoop::new(
            TelegramSource::new(client, config.telegram.allowed_users.clone()),
            Arc::new(IngestionCursor::default()),
            queue_tx.clone(),
            Duration::from_secs(config.telegram.poll_timeout_secs),
            Duration::from_secs(config.telegram.retry_backoff_secs),
        );
        poll_tasks.push(tokio::spawn(async move { poll_loop.run().await }));
    }

    if config.webhook.enabled {
        match ctx.secrets.page_access_token.clone() {
            Some(token) => {
                dispatcher = dispatcher.with_replier(
                    Channel::Messenger,
                    Arc::new(MessengerClient::new(&config.webhook.graph_api_base, token)),
                );
            }
            None => warn!("page_access_token is not set; Messenger replies will be dropped"),
        }
        match (
            config.webhook.whatsapp_phone_number_id.clone(),
            ctx.secrets.whatsapp_access_token.clone(),
        ) {
            (Some(phone_number_id), Some(token)) => {
                dispatcher = dispatcher.with_replier(
                    Channel::WhatsApp,
                    Arc::new(WhatsAppClient::new(
                        &config.webhook.graph_api_base,
                        phone_number_id,
                        token,
                    )),
                );
            }
            (Some(_), None) => {
                warn!("whatsapp_access_token is not set; WhatsApp replies will be dropped")
            }
            (None, _) => {}
        }
        if config.webhook.prospect_replies {
            dispatcher = dispatcher
                .with_prospect_channel(Channel::Messenger)
                .with_prospect_channel(Channel::WhatsApp);
        }
        if ctx.secrets.webhook_verify_token.is_none() {
            warn!("webhook_verify_token is not set; verification requests will be rejected");
        }

        let state = WebhookState::new(
            ctx.secrets.webhook_verify_token.clone(),
            config.webhook.allowed_senders.clone(),
            queue_tx.clone(),
            Arc::clone(ctx.router.ledger()),
        )
        .with_health(json!({
            "telegram": config.telegram.enabled,
            "messenger": ctx.secrets.page_access_token.is_some(),
            "whatsapp": dispatcher.has_replier(Channel::WhatsApp),
            "schedule": config.schedule.enabled,
            "openai": ctx.secrets.openai_api_key.is_some(),
            "publishing": ctx.secrets.meta_access_token.is_some(),
            "email": ctx.secrets.sendgrid_api_key.is_some(),
        }));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let bind = config.webhook.bind.clone();
        let handle = tokio::spawn(async move {
            let shutdown = async move {
                shutdown_rx.await.ok();
            };
            if let Err(e) = webhook::serve(&bind, state, shutdown).await {
                error!("Webhook server error: {}", e);
            }
        });
        webhook_task = Some((shutdown_tx, handle));
    }

    if config.schedule.enabled {
        let scheduler = Scheduler::from_config(
            &config.schedule,
            queue_tx.clone(),
            chrono::Local::now().naive_local(),
        )?;
        if !dispatcher.has_replier(scheduler.channel()) {
            warn!(
                channel = %scheduler.channel(),
                "Scheduled runs target a channel with no replier; replies will be dropped"
            );
        }
        info!(at = %config.schedule.daily_at, command = %config.schedule.command, "Daily schedule armed");
        poll_tasks.push(tokio::spawn(scheduler.run()));
    }

    // Only the ingestion paths and the scheduler hold senders from here on.
    drop(queue_tx);
    let dispatch_task = tokio::spawn(Arc::new(dispatcher).run(queue_rx));

    println!("Crewline is serving. Press Ctrl-C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");

    for task in poll_tasks {
        task.abort();
    }
    if let Some((shutdown_tx, handle)) = webhook_task {
        shutdown_tx.send(()).ok();
        handle.await.ok();
    }
    dispatch_task.await.ok();

    println!("Crewline stopped.");
    Ok(())
}

/// Answer one request locally and print the reply.
pub async fn handle_run(text: String, config: &Config, format: OutputFormat) -> Result<()> {
    let secrets = ResolvedSecrets::resolve(&SecretManager::default());
    let ctx = Arc::new(EngineContext::build(config.clone(), secrets).await?);
    let reply = Dispatcher::new(ctx).respond(&text).await?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "reply": secrets::scrub(&reply.text),
            "decision": reply.decision,
            "run": reply.outcome.as_ref().map(|o| o.to_json()),
        })),
        OutputFormat::Text => {
            if let Some(decision) = &reply.decision {
                println!(
                    "[{} tier, {} rule, {}]",
                    decision.tier, decision.rule, decision.estimated_cost
                );
            }
            println!("{}", secrets::scrub(&reply.text));
            Ok(())
        }
    }
}

/// Classify without recording.
pub async fn handle_classify(text: String, config: &Config, format: OutputFormat) -> Result<()> {
    let ledger = Arc::new(UsageLedger::in_memory(Cost::from_usd(
        config.router.premium_unit_cost,
    )));
    let decision = TierRouter::from_config(&config.router, ledger).classify(&text);

    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(&decision)?),
        OutputFormat::Text => {
            println!("Tier:           {}", decision.tier);
            println!("Rule:           {}", decision.rule);
            if let Some(matched) = &decision.matched {
                println!("Matched:        {}", matched);
            }
            println!("Estimated cost: {}", decision.estimated_cost);
            Ok(())
        }
    }
}

/// Print the persisted usage ledger.
pub async fn handle_usage(config: &Config, format: OutputFormat) -> Result<()> {
    let report = UsageLedger::read_snapshot(&config.core.data_dir.join(USAGE_FILE)).await?;

    match format {
        OutputFormat::Json => {
            let mut value = serde_json::to_value(&report)?;
            value["savings"] = json!(report.savings());
            value["savingsPercent"] = json!(report.savings_percent());
            print_json(&value)
        }
        OutputFormat::Text => {
            println!("{}", render_usage(&report));
            Ok(())
        }
    }
}

async fn open_store(data_dir: &Path) -> Result<Store> {
    Store::open(data_dir)
        .await
        .with_context(|| format!("Failed to open the store in {}", data_dir.display()))
}

pub async fn handle_leads_list(
    status: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let status = status
        .map(|s| s.parse::<LeadStatus>())
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let store = open_store(&config.core.data_dir).await?;
    let leads = store
        .leads
        .view(|r| status.map_or(true, |s| r.fields.status == s))
        .await;

    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(&leads)?),
        OutputFormat::Text => {
            if leads.is_empty() {
                println!("No leads.");
            }
            for lead in leads {
                println!(
                    "#{:<4} {:<11} {} <{}> ({}, {})",
                    lead.id,
                    lead.fields.status,
                    lead.fields.name,
                    lead.fields.email,
                    lead.fields.source,
                    lead.created_at.format("%Y-%m-%d")
                );
            }
            Ok(())
        }
    }
}

pub async fn handle_leads_add(
    lead: Lead,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    if lead.name.trim().is_empty() || lead.email.trim().is_empty() {
        bail!("A lead needs a name and an email");
    }
    let store = open_store(&config.core.data_dir).await?;
    let record = store.leads.add(lead).await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(&record)?),
        OutputFormat::Text => {
            println!("Lead #{} added.", record.id);
            Ok(())
        }
    }
}

pub async fn handle_leads_status(
    id: u64,
    status: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let status: LeadStatus = status.parse().map_err(anyhow::Error::msg)?;
    let store = open_store(&config.core.data_dir).await?;
    let record = store.leads.patch(id, &json!({ "status": status })).await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(&record)?),
        OutputFormat::Text => {
            println!("Lead #{} is now {}.", record.id, record.fields.status);
            Ok(())
        }
    }
}

pub async fn handle_calendar_list(
    status: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let status = status
        .map(|s| s.parse::<EntryStatus>())
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let store = open_store(&config.core.data_dir).await?;
    let entries = store
        .calendar
        .view(|r| status.map_or(true, |s| r.fields.status == s))
        .await;

    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(&entries)?),
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("The content calendar is empty.");
            }
            for entry in entries {
                let preview: String = entry.fields.content.chars().take(60).collect();
                println!(
                    "#{:<4} {:<9} {:<9} {:<12} {}",
                    entry.id,
                    entry.fields.status,
                    entry.fields.platform,
                    entry.fields.scheduled_for.as_deref().unwrap_or("-"),
                    preview.replace('\n', " ")
                );
            }
            Ok(())
        }
    }
}

pub async fn handle_workers(config: &Config, format: OutputFormat) -> Result<()> {
    let ctx = EngineContext::build(config.clone(), ResolvedSecrets::default()).await?;
    let workers = ctx.workers.all();

    match format {
        OutputFormat::Json => print_json(&json!(workers
            .iter()
            .map(|w| json!({
                "name": w.name,
                "role": w.role,
                "goal": w.goal,
                "tier": w.tier,
                "capabilities": w.capabilities,
            }))
            .collect::<Vec<_>>())),
        OutputFormat::Text => {
            for worker in workers {
                println!("{} ({}, min tier {})", worker.name, worker.role, worker.tier);
                println!(
                    "  capabilities: {}",
                    worker.capabilities.iter().cloned().collect::<Vec<_>>().join(", ")
                );
            }
            Ok(())
        }
    }
}

pub fn handle_secrets_status(format: OutputFormat) -> Result<()> {
    let manager = SecretManager::default();
    let status: Vec<(&str, bool)> = KNOWN_SECRETS
        .iter()
        .map(|key| (*key, manager.has_secret(key)))
        .collect();

    match format {
        OutputFormat::Json => print_json(&json!(status
            .iter()
            .map(|(key, set)| json!({ "key": key, "configured": set, "env": secrets::env_var_name(key) }))
            .collect::<Vec<_>>())),
        OutputFormat::Text => {
            for (key, set) in status {
                println!(
                    "{:<22} {:<14} (env {})",
                    key,
                    if set { "configured" } else { "not configured" },
                    secrets::env_var_name(key)
                );
            }
            Ok(())
        }
    }
}

pub fn handle_secrets_set(key: String) -> Result<()> {
    if !KNOWN_SECRETS.contains(&key.as_str()) {
        bail!(
            "Unknown secret '{}'. Known secrets: {}",
            key,
            KNOWN_SECRETS.join(", ")
        );
    }

    eprintln!("Enter value for {} and press Enter:", key);
    let mut value = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut value)
        .context("Failed to read secret from stdin")?;

    SecretManager::default().set_secret(&key, value.trim())?;
    println!("Stored {} in the OS keychain.", key);
    Ok(())
}
