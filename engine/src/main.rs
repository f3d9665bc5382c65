// Crewline
// Main entry point for the crewline binary

use clap::Parser;
use crewline_engine::cli::{Cli, Command, LeadsAction, SecretsAction};
use crewline_engine::config::Config;
use crewline_engine::handlers::{
    handle_calendar_list, handle_classify, handle_leads_add, handle_leads_list,
    handle_leads_status, handle_run, handle_secrets_set, handle_secrets_status, handle_serve,
    handle_usage, handle_workers, OutputFormat,
};
use crewline_engine::store::Lead;
use crewline_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --log wins over config; the subscriber can only be installed once.
    if let Some(level) = &cli.log {
        init_telemetry_with_level(level);
    }

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // Config-driven level (no-op if a subscriber is already installed)
    init_telemetry_with_level(&config.core.log_level);
    tracing::debug!("Crewline v{} ({} - {})", version, commit, timestamp);

    match cli.command {
        Command::Serve => {
            tracing::info!("Starting ingestion...");
            handle_serve(&config).await
        }

        Command::Run { text } => handle_run(text, &config, format).await,

        Command::Classify { text } => handle_classify(text, &config, format).await,

        Command::Usage => handle_usage(&config, format).await,

        Command::Leads { action } => match action {
            LeadsAction::List { status } => handle_leads_list(status, &config, format).await,
            LeadsAction::Add {
                name,
                email,
                phone,
                source,
            } => {
                let mut lead = Lead::new(name, email, source);
                lead.phone = phone;
                handle_leads_add(lead, &config, format).await
            }
            LeadsAction::Status { id, status } => {
                handle_leads_status(id, status, &config, format).await
            }
        },

        Command::Calendar { status } => handle_calendar_list(status, &config, format).await,

        Command::Workers => handle_workers(&config, format).await,

        Command::Secrets { action } => match action {
            SecretsAction::Status => handle_secrets_status(format),
            SecretsAction::Set { key } => handle_secrets_set(key),
        },
    }
}
