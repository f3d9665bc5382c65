//! Configuration management
//!
//! This module handles loading, validation, and management of the Crewline configuration.
//! Configuration is stored in TOML format at ~/.crewline/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Data directory and log level
//! - **router**: Per-tier unit costs and optional phrase-table overrides
//! - **llm**: Reasoning engine endpoint and per-tier model settings
//! - **executor**: External call timeout and run concurrency
//! - **telegram**: Pull ingestion settings
//! - **webhook**: Push ingestion settings (Messenger and WhatsApp)
//! - **schedule**: The daily run fed into the dispatch queue
//! - **business**: Facts about the business injected into generation prompts
//!
//! Secrets (API tokens) never live in this file. See [`crate::secrets`].
//!
//! # Examples
//!
//! ```no_run
//! use crewline_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Data dir: {:?}", config.core.data_dir);
//! println!("Premium unit cost: {}", config.router.premium_unit_cost);
//! # Ok(())
//! # }
//! ```

use crate::ingestion::Channel;
use chrono::NaiveTime;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// Tier router settings
    #[serde(default)]
    pub router: RouterConfig,

    /// Reasoning engine settings
    #[serde(default)]
    pub llm: LLMConfig,

    /// Executor settings
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Telegram pull ingestion
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Webhook push ingestion
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Daily scheduled run
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Business facts
    #[serde(default)]
    pub business: BusinessConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion). Holds the durable collections.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Tier router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// USD per basic request
    #[serde(default = "default_basic_cost")]
    pub basic_unit_cost: f64,

    /// USD per premium request
    #[serde(default = "default_premium_cost")]
    pub premium_unit_cost: f64,

    /// USD per ultra request
    #[serde(default = "default_ultra_cost")]
    pub ultra_unit_cost: f64,

    /// A request with fewer words than this that starts with a question word
    /// never escalates to premium
    #[serde(default = "default_short_question_words")]
    pub short_question_words: usize,

    /// Replace the built-in ultra phrases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ultra_phrases: Option<Vec<String>>,

    /// Replace the built-in premium phrases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium_phrases: Option<Vec<String>>,

    /// Replace the built-in brainstorm phrases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brainstorm_phrases: Option<Vec<String>>,

    /// Replace the built-in question words
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_words: Option<Vec<String>>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            basic_unit_cost: default_basic_cost(),
            premium_unit_cost: default_premium_cost(),
            ultra_unit_cost: default_ultra_cost(),
            short_question_words: default_short_question_words(),
            ultra_phrases: None,
            premium_phrases: None,
            brainstorm_phrases: None,
            question_words: None,
        }
    }
}

/// Reasoning engine configuration (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Base URL for the API
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model used for basic requests
    #[serde(default)]
    pub basic: TierModelConfig,

    /// Model used for premium requests
    #[serde(default = "default_premium_model")]
    pub premium: TierModelConfig,

    /// Model used for ultra requests
    #[serde(default = "default_ultra_model")]
    pub ultra: TierModelConfig,

    /// Model behind the image generation capability
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Size requested for generated images
    #[serde(default = "default_image_size")]
    pub image_size: String,
    // Note: API key stored in keychain or environment, not in config
}

/// Model settings for one tier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierModelConfig {
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for TierModelConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            basic: TierModelConfig::default(),
            premium: default_premium_model(),
            ultra: default_ultra_model(),
            image_model: default_image_model(),
            image_size: default_image_size(),
        }
    }
}

/// Executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Upper bound for any external-call capability
    #[serde(default = "default_external_timeout")]
    pub external_call_timeout_secs: u64,

    /// Runs executing at once across all senders
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,

    /// Inbound events buffered before ingestion applies back-pressure
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            external_call_timeout_secs: default_external_timeout(),
            max_concurrent_runs: default_max_concurrent_runs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Telegram pull ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Enable the long-poll loop
    #[serde(default)]
    pub enabled: bool,

    /// Telegram user ids allowed to send requests; empty allows everyone
    #[serde(default)]
    pub allowed_users: Vec<i64>,

    /// Long-poll wait passed to getUpdates
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    /// Delay before retrying after a transport error (minimum 1)
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,

    /// Bot API base URL
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_users: Vec::new(),
            poll_timeout_secs: default_poll_timeout(),
            retry_backoff_secs: default_retry_backoff(),
            api_base: default_telegram_api_base(),
        }
    }
}

/// Webhook push ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Enable the webhook server
    #[serde(default)]
    pub enabled: bool,

    /// Listen address
    #[serde(default = "default_webhook_bind")]
    pub bind: String,

    /// Sender ids allowed to send requests; empty allows everyone
    #[serde(default)]
    pub allowed_senders: Vec<String>,

    /// Graph API base used to send replies and publish posts
    #[serde(default = "default_graph_api_base")]
    pub graph_api_base: String,

    /// WhatsApp Cloud API phone number id replies are sent from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp_phone_number_id: Option<String>,

    /// Answer free text on Messenger and WhatsApp with the appointment
    /// setter instead of the content creator
    #[serde(default)]
    pub prospect_replies: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_webhook_bind(),
            allowed_senders: Vec::new(),
            graph_api_base: default_graph_api_base(),
            whatsapp_phone_number_id: None,
            prospect_replies: false,
        }
    }
}

/// Daily scheduled run
///
/// At `daily_at` (server local time) `command` is queued as if it had been
/// sent on `channel`; the reply goes to `reply_to`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Time of day, `HH:MM`
    #[serde(default = "default_daily_at")]
    pub daily_at: String,

    #[serde(default = "default_schedule_command")]
    pub command: String,

    /// Channel the reply is delivered on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,

    /// Chat id, PSID or phone number on `channel`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            daily_at: default_daily_at(),
            command: default_schedule_command(),
            channel: None,
            reply_to: None,
        }
    }
}

impl ScheduleConfig {
    /// Parsed `daily_at`.
    pub fn time_of_day(&self) -> Result<NaiveTime, EngineError> {
        NaiveTime::parse_from_str(self.daily_at.trim(), "%H:%M").map_err(|_| {
            EngineError::Config(format!(
                "schedule.daily_at must be HH:MM, got '{}'",
                self.daily_at
            ))
        })
    }
}

/// Facts about the business
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessConfig {
    pub name: String,
    pub website: String,
    pub booking_link: String,
    pub phone: String,
    pub location: String,

    /// Language generated content is written in
    #[serde(default = "default_language")]
    pub language: String,

    /// Hashtags appended to formatted Instagram posts
    #[serde(default)]
    pub hashtags: Vec<String>,

    /// Instagram business account id used for publishing
    #[serde(default)]
    pub instagram_account_id: Option<String>,

    /// Facebook page id used for publishing
    #[serde(default)]
    pub facebook_page_id: Option<String>,

    /// Sender address for email campaigns
    #[serde(default)]
    pub email_from: Option<String>,

    /// SendGrid-compatible API base for email campaigns
    #[serde(default = "default_email_api_base")]
    pub email_api_base: String,
}

impl Default for BusinessConfig {
    fn default() -> Self {
        Self {
            name: "Sacred Rebirth".to_string(),
            website: "https://sacred-rebirth.com".to_string(),
            booking_link: "https://sacred-rebirth.com/appointment.html".to_string(),
            phone: "+52 722 512 3413".to_string(),
            location: "Valle de Bravo, Mexico".to_string(),
            language: default_language(),
            hashtags: vec![
                "#SacredRebirth".to_string(),
                "#ValleDeBravo".to_string(),
                "#Retiro".to_string(),
                "#Wellness".to_string(),
            ],
            instagram_account_id: None,
            facebook_page_id: None,
            email_from: None,
            email_api_base: default_email_api_base(),
        }
    }
}

impl BusinessConfig {
    /// Render the business facts as a prompt preamble.
    pub fn prompt_preamble(&self) -> String {
        format!(
            "Business: {}\nLocation: {}\nWebsite: {}\nBooking link: {}\nPhone: {}\nWrite in: {}",
            self.name, self.location, self.website, self.booking_link, self.phone, self.language
        )
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.crewline/data")
}

fn default_basic_cost() -> f64 {
    0.0003
}

fn default_premium_cost() -> f64 {
    0.003
}

fn default_ultra_cost() -> f64 {
    0.01
}

fn default_short_question_words() -> usize {
    15
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_premium_model() -> TierModelConfig {
    TierModelConfig {
        model: "gpt-4o".to_string(),
        max_tokens: 2000,
        temperature: 0.8,
    }
}

fn default_ultra_model() -> TierModelConfig {
    TierModelConfig {
        model: "gpt-4-turbo".to_string(),
        max_tokens: 2000,
        temperature: 0.8,
    }
}

fn default_image_model() -> String {
    "dall-e-3".to_string()
}

fn default_image_size() -> String {
    "1024x1024".to_string()
}

fn default_max_tokens() -> u32 {
    1500
}

fn default_temperature() -> f32 {
    0.7
}

fn default_external_timeout() -> u64 {
    60
}

fn default_max_concurrent_runs() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    100
}

fn default_poll_timeout() -> u64 {
    30
}

fn default_retry_backoff() -> u64 {
    5
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_webhook_bind() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_graph_api_base() -> String {
    "https://graph.facebook.com/v18.0".to_string()
}

fn default_daily_at() -> String {
    "09:00".to_string()
}

fn default_schedule_command() -> String {
    "/daily".to_string()
}

fn default_language() -> String {
    "es".to_string()
}

fn default_email_api_base() -> String {
    "https://api.sendgrid.com/v3".to_string()
}

impl Config {
    /// Load configuration from the default location (~/.crewline/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, TOML parsing fails, or
    /// validation fails.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default_config();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = config;
        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.crewline/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".crewline").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig {
                log_level: default_log_level(),
                data_dir: default_data_dir(),
            },
            router: RouterConfig::default(),
            llm: LLMConfig::default(),
            executor: ExecutorConfig::default(),
            telegram: TelegramConfig::default(),
            webhook: WebhookConfig::default(),
            schedule: ScheduleConfig::default(),
            business: BusinessConfig::default(),
        }
    }

    /// Validate and process configuration
    ///
    /// Expands ~ in the data directory and creates it when missing.
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let costs = [
            ("basic_unit_cost", self.router.basic_unit_cost),
            ("premium_unit_cost", self.router.premium_unit_cost),
            ("ultra_unit_cost", self.router.ultra_unit_cost),
        ];
        for (name, cost) in costs {
            if !cost.is_finite() || cost <= 0.0 {
                return Err(EngineError::Config(format!(
                    "{} must be a positive number",
                    name
                )));
            }
        }

        if self.router.short_question_words == 0 {
            return Err(EngineError::Config(
                "short_question_words must be at least 1".to_string(),
            ));
        }

        if self.telegram.retry_backoff_secs < 1 {
            return Err(EngineError::Config(
                "retry_backoff_secs must be at least 1".to_string(),
            ));
        }

        if self.executor.max_concurrent_runs == 0 {
            return Err(EngineError::Config(
                "max_concurrent_runs must be at least 1".to_string(),
            ));
        }

        if self.executor.queue_capacity == 0 {
            return Err(EngineError::Config(
                "queue_capacity must be at least 1".to_string(),
            ));
        }

        if self.executor.external_call_timeout_secs == 0 {
            return Err(EngineError::Config(
                "external_call_timeout_secs must be at least 1".to_string(),
            ));
        }

        self.schedule.time_of_day()?;
        if self.schedule.enabled
            && (self.schedule.channel.is_none() || self.schedule.reply_to.is_none())
        {
            return Err(EngineError::Config(
                "schedule needs channel and reply_to when enabled".to_string(),
            ));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default_config();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.router.short_question_words, 15);
        assert_eq!(config.llm.basic.model, "gpt-4o-mini");
        assert_eq!(config.llm.premium.model, "gpt-4o");
        assert_eq!(config.llm.ultra.model, "gpt-4-turbo");
        assert!(!config.telegram.enabled);
        assert!(!config.webhook.enabled);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default_config();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(config.llm.ultra, deserialized.llm.ultra);
        assert_eq!(
            config.router.premium_unit_cost,
            deserialized.router.premium_unit_cost
        );
    }

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            "[core]\ndata_dir = {:?}\n",
            dir.path().join("data").to_str().unwrap()
        );
        let config = Config::from_toml_str(&toml).unwrap();
        assert_eq!(config.executor.max_concurrent_runs, 4);
        assert_eq!(config.telegram.retry_backoff_secs, 5);
        assert!(dir.path().join("data").is_dir());
    }

    #[test]
    fn test_rejects_zero_backoff() {
        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            "[core]\ndata_dir = {:?}\n[telegram]\nretry_backoff_secs = 0\n",
            dir.path().to_str().unwrap()
        );
        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("retry_backoff_secs"));
    }

    #[test]
    fn test_rejects_non_positive_cost() {
        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            "[core]\ndata_dir = {:?}\n[router]\npremium_unit_cost = 0.0\n",
            dir.path().to_str().unwrap()
        );
        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("premium_unit_cost"));
    }

    #[test]
    fn test_schedule_validation() {
        let dir = tempfile::tempdir().unwrap();
        let base = format!("[core]\ndata_dir = {:?}\n", dir.path().to_str().unwrap());

        let err = Config::from_toml_str(&format!("{}[schedule]\ndaily_at = \"9am\"\n", base))
            .unwrap_err();
        assert!(err.to_string().contains("HH:MM"));

        let err = Config::from_toml_str(&format!("{}[schedule]\nenabled = true\n", base))
            .unwrap_err();
        assert!(err.to_string().contains("reply_to"));

        let config = Config::from_toml_str(&format!(
            "{}[schedule]\nenabled = true\ndaily_at = \"07:30\"\nchannel = \"whatsapp\"\nreply_to = \"5215500000000\"\n",
            base
        ))
        .unwrap();
        assert_eq!(config.schedule.channel, Some(Channel::WhatsApp));
        assert_eq!(
            config.schedule.time_of_day().unwrap(),
            NaiveTime::from_hms_opt(7, 30, 0).unwrap()
        );
        assert_eq!(config.schedule.command, "/daily");
    }

    #[test]
    fn test_rejects_bad_log_level() {
        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            "[core]\nlog_level = \"loud\"\ndata_dir = {:?}\n",
            dir.path().to_str().unwrap()
        );
        assert!(Config::from_toml_str(&toml).is_err());
    }
}
