//! Process context
//!
//! Everything a request needs, built once at startup: store, capability and
//! worker registries, tier router with its ledger, executor and plan
//! library. Shared behind `Arc` by the ingestion loops and the dispatcher.

use crate::capability::CapabilityRegistry;
use crate::config::Config;
use crate::executor::{Executor, PlanLibrary};
use crate::llm::{OpenAIEngine, ReasoningEngine};
use crate::router::ledger::{UsageLedger, USAGE_FILE};
use crate::router::{Cost, TierRouter};
use crate::secrets::{self, SecretManager};
use crate::store::Store;
use crate::tools::{self, BuiltinDeps};
use crate::workers::WorkerRegistry;
use sdk::EngineError;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Secrets resolved at startup. Missing ones disable the features that
/// need them.
#[derive(Clone, Default)]
pub struct ResolvedSecrets {
    pub openai_api_key: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub webhook_verify_token: Option<String>,
    pub page_access_token: Option<String>,
    pub meta_access_token: Option<String>,
    pub sendgrid_api_key: Option<String>,
    pub whatsapp_access_token: Option<String>,
}

impl ResolvedSecrets {
    pub fn resolve(manager: &SecretManager) -> Self {
        Self {
            openai_api_key: manager.get_optional(secrets::OPENAI_API_KEY),
            telegram_bot_token: manager.get_optional(secrets::TELEGRAM_BOT_TOKEN),
            webhook_verify_token: manager.get_optional(secrets::WEBHOOK_VERIFY_TOKEN),
            page_access_token: manager.get_optional(secrets::PAGE_ACCESS_TOKEN),
            meta_access_token: manager.get_optional(secrets::META_ACCESS_TOKEN),
            sendgrid_api_key: manager.get_optional(secrets::SENDGRID_API_KEY),
            whatsapp_access_token: manager.get_optional(secrets::WHATSAPP_ACCESS_TOKEN),
        }
    }
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let set = |v: &Option<String>| if v.is_some() { "set" } else { "missing" };
        f.debug_struct("ResolvedSecrets")
            .field("openai_api_key", &set(&self.openai_api_key))
            .field("telegram_bot_token", &set(&self.telegram_bot_token))
            .field("webhook_verify_token", &set(&self.webhook_verify_token))
            .field("page_access_token", &set(&self.page_access_token))
            .field("meta_access_token", &set(&self.meta_access_token))
            .field("sendgrid_api_key", &set(&self.sendgrid_api_key))
            .field("whatsapp_access_token", &set(&self.whatsapp_access_token))
            .finish()
    }
}

pub struct EngineContext {
    pub config: Config,
    pub secrets: ResolvedSecrets,
    pub engine: Arc<dyn ReasoningEngine>,
    pub store: Arc<Store>,
    pub capabilities: Arc<CapabilityRegistry>,
    pub workers: Arc<WorkerRegistry>,
    pub router: Arc<TierRouter>,
    pub executor: Arc<Executor>,
    pub plans: Arc<PlanLibrary>,
}

impl EngineContext {
    /// Build the context with the configured OpenAI-compatible engine.
    pub async fn build(config: Config, secrets: ResolvedSecrets) -> Result<Self, EngineError> {
        let engine: Arc<dyn ReasoningEngine> = Arc::new(OpenAIEngine::new(
            config.llm.clone(),
            secrets.openai_api_key.clone(),
        ));
        Self::with_engine(config, secrets, engine).await
    }

    /// Build the context around a given reasoning engine.
    pub async fn with_engine(
        config: Config,
        secrets: ResolvedSecrets,
        engine: Arc<dyn ReasoningEngine>,
    ) -> Result<Self, EngineError> {
        let data_dir = config.core.data_dir.clone();
        let store = Arc::new(Store::open(&data_dir).await?);

        let mut capabilities = CapabilityRegistry::new(Duration::from_secs(
            config.executor.external_call_timeout_secs,
        ));
        tools::register_builtin(
            &mut capabilities,
            BuiltinDeps {
                engine: engine.clone(),
                store: store.clone(),
                business: config.business.clone(),
                llm: config.llm.clone(),
                openai_api_key: secrets.openai_api_key.clone(),
                graph_api_base: config.webhook.graph_api_base.clone(),
                meta_access_token: secrets.meta_access_token.clone(),
                sendgrid_api_key: secrets.sendgrid_api_key.clone(),
            },
        )?;
        let capabilities = Arc::new(capabilities);

        let workers = Arc::new(WorkerRegistry::default_roster(&capabilities)?);

        let ledger = Arc::new(
            UsageLedger::open(
                &data_dir.join(USAGE_FILE),
                Cost::from_usd(config.router.premium_unit_cost),
            )
            .await?,
        );
        let router = Arc::new(TierRouter::from_config(&config.router, ledger));

        let executor = Arc::new(Executor::new(capabilities.clone(), workers.clone()));
        let plans = Arc::new(PlanLibrary::new(workers.clone(), capabilities.clone()));

        info!(
            capabilities = capabilities.describe().len(),
            workers = workers.all().len(),
            data_dir = %data_dir.display(),
            "Engine context ready"
        );

        Ok(Self {
            config,
            secrets,
            engine,
            store,
            capabilities,
            workers,
            router,
            executor,
            plans,
        })
    }
}
