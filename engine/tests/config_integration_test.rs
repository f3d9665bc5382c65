//! Integration tests for configuration loading and secret resolution

use crewline_engine::config::Config;
use crewline_engine::router::{Cost, Tier, TierRouter, UsageLedger};
use crewline_engine::secrets::{env_var_name, scrub, SecretManager};
use sdk::EngineError;
use std::io::Write;
use std::sync::Arc;

fn write_config(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "[core]\ndata_dir = {:?}\n", dir.path().join("data").to_str().unwrap()).unwrap();
    file.write_all(body.as_bytes()).unwrap();
    path
}

#[test]
fn test_load_full_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r##"
[router]
basic_unit_cost = 0.001
premium_phrases = ["retiro vip", "=ad"]

[llm]
base_url = "http://localhost:9999/v1"

[llm.basic]
model = "small-model"

[executor]
max_concurrent_runs = 2
queue_capacity = 10

[telegram]
enabled = true
allowed_users = [7, 8]

[webhook]
enabled = true
bind = "127.0.0.1:9000"
allowed_senders = ["psid-1"]

[business]
name = "Casa Luna"
website = "https://casaluna.example"
booking_link = "https://casaluna.example/book"
phone = "+52 555 000 0000"
location = "Tepoztlán"
hashtags = ["#CasaLuna"]
"##,
    );

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.llm.basic.model, "small-model");
    assert_eq!(config.llm.basic.max_tokens, 1500);
    assert_eq!(config.llm.premium.model, "gpt-4o");
    assert_eq!(config.executor.max_concurrent_runs, 2);
    assert_eq!(config.telegram.allowed_users, vec![7, 8]);
    assert_eq!(config.webhook.allowed_senders, vec!["psid-1".to_string()]);
    assert_eq!(config.business.name, "Casa Luna");
    assert_eq!(config.business.hashtags, vec!["#CasaLuna".to_string()]);
    assert!(dir.path().join("data").is_dir());

    let router = TierRouter::from_config(
        &config.router,
        Arc::new(UsageLedger::in_memory(Cost::from_usd(config.router.premium_unit_cost))),
    );
    assert_eq!(router.classify("un ad para el retiro vip").tier, Tier::Premium);
    assert_eq!(router.classify("un anuncio profesional").tier, Tier::Basic);
    assert_eq!(router.costs().basic.micros(), 1000);
}

#[test]
fn test_missing_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load_from_path(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}

#[test]
fn test_core_section_is_required() {
    let err = Config::from_toml_str("[telegram]\nenabled = true\n").unwrap_err();
    assert!(err.to_string().contains("Failed to parse config"));
}

#[test]
fn test_zero_concurrency_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[executor]\nmax_concurrent_runs = 0\n");
    let err = Config::load_from_path(&path).unwrap_err();
    assert!(err.to_string().contains("max_concurrent_runs"));
}

#[test]
fn test_environment_overrides_keychain() {
    let key = "integration_test_only_secret";
    std::env::set_var(env_var_name(key), "  value-from-env \n");

    let manager = SecretManager::new("crewline-integration-test");
    assert_eq!(manager.get_secret(key).unwrap(), "value-from-env");
    assert!(manager.has_secret(key));

    std::env::remove_var(env_var_name(key));
}

#[test]
fn test_env_var_naming() {
    assert_eq!(env_var_name("telegram_bot_token"), "CREWLINE_TELEGRAM_BOT_TOKEN");
}

#[test]
fn test_scrub_known_token_shapes() {
    let text = "GET https://graph.facebook.com/me/messages?access_token=EAAB123&x=1 \
                failed; key sk-abcdefghijklmnopqrstuvwx; bot 123456789:ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghi";
    let scrubbed = scrub(text);
    assert!(!scrubbed.contains("EAAB123"));
    assert!(!scrubbed.contains("sk-abcdefghijklmnopqrstuvwx"));
    assert!(!scrubbed.contains("ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghi"));
    assert!(scrubbed.contains("[REDACTED]"));
}
