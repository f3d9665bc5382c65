//! CLI interface for Crewline
//!
//! Commands and global flags, via clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Crewline marketing crew
///
/// Routes requests to a cost tier, runs them through a crew of workers and
/// answers on Telegram or Messenger.
#[derive(Parser, Debug)]
#[command(name = "crewline")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the enabled ingestion paths until interrupted
    Serve,

    /// Answer one request locally, as if it came in on a channel
    Run {
        /// Request text or slash command (e.g. "/content temazcal")
        text: String,
    },

    /// Show which tier a request would be routed to, without recording it
    Classify {
        /// Request text
        text: String,
    },

    /// Show the usage ledger
    Usage,

    /// Manage leads
    Leads {
        #[command(subcommand)]
        action: LeadsAction,
    },

    /// Show the content calendar
    Calendar {
        /// Only entries with this status (draft, scheduled, published)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// List workers and their granted capabilities
    Workers,

    /// Manage secrets
    Secrets {
        #[command(subcommand)]
        action: SecretsAction,
    },
}

/// Lead management actions
#[derive(Subcommand, Debug)]
pub enum LeadsAction {
    /// List leads
    List {
        /// Only leads with this status
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Add a lead
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: Option<String>,
        /// Where the lead came from
        #[arg(long, default_value = "manual")]
        source: String,
    },

    /// Change a lead's status
    Status {
        id: u64,
        /// new, contacted, interested, converted, lost
        status: String,
    },
}

/// Secret management actions
#[derive(Subcommand, Debug)]
pub enum SecretsAction {
    /// Show which secrets are configured
    Status,

    /// Store a secret in the OS keychain (value read from stdin)
    Set {
        /// Secret name, e.g. telegram_bot_token
        key: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["crewline", "serve"]);
        assert!(matches!(cli.command, Command::Serve));
        assert!(!cli.json);
        assert!(cli.log.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["crewline", "--json", "--log", "debug", "usage"]);
        assert!(cli.json);
        assert_eq!(cli.log, Some("debug".to_string()));
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from(["crewline", "run", "/content luna llena"]);
        if let Command::Run { text } = cli.command {
            assert_eq!(text, "/content luna llena");
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_leads_add() {
        let cli = Cli::parse_from([
            "crewline", "leads", "add", "--name", "Ana", "--email", "ana@x.com",
        ]);
        if let Command::Leads {
            action: LeadsAction::Add { name, source, phone, .. },
        } = cli.command
        {
            assert_eq!(name, "Ana");
            assert_eq!(source, "manual");
            assert!(phone.is_none());
        } else {
            panic!("Expected Leads Add command");
        }
    }

    #[test]
    fn test_leads_status() {
        let cli = Cli::parse_from(["crewline", "leads", "status", "3", "interested"]);
        assert!(matches!(
            cli.command,
            Command::Leads {
                action: LeadsAction::Status { id: 3, .. }
            }
        ));
    }

    #[test]
    fn test_secrets_set() {
        let cli = Cli::parse_from(["crewline", "secrets", "set", "telegram_bot_token"]);
        if let Command::Secrets {
            action: SecretsAction::Set { key },
        } = cli.command
        {
            assert_eq!(key, "telegram_bot_token");
        } else {
            panic!("Expected Secrets Set command");
        }
    }
}
