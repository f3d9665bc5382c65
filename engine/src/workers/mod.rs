//! Worker Registry
//!
//! A worker binds a role and goal to a minimum reasoning tier and the set of
//! capabilities it may invoke. Workers are defined at startup, validated
//! against the capability registry, and never change afterwards.

use crate::capability::CapabilityRegistry;
use crate::router::Tier;
use crate::tools::names;
use sdk::errors::EngineError;
use std::collections::{BTreeSet, HashMap};

/// A defined worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worker {
    pub name: String,
    pub role: String,
    pub goal: String,
    /// Lowest tier this worker runs at; a request can raise it
    pub tier: Tier,
    pub capabilities: BTreeSet<String>,
}

impl Worker {
    pub fn can_use(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// System preamble used when this worker asks the reasoning engine.
    pub fn preamble(&self) -> String {
        format!("You are the {}. Your goal: {}", self.role, self.goal)
    }

    /// Effective tier for a request routed at `requested`.
    pub fn effective_tier(&self, requested: Tier) -> Tier {
        self.tier.max(requested)
    }
}

/// Registry of workers
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, Worker>,
    order: Vec<String>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a worker.
    ///
    /// # Errors
    /// `UnknownCapability` if any granted capability is not registered,
    /// `Config` if the name is already defined.
    pub fn define_worker(
        &mut self,
        capabilities: &CapabilityRegistry,
        name: &str,
        role: &str,
        goal: &str,
        tier: Tier,
        grants: &[&str],
    ) -> Result<&Worker, EngineError> {
        if self.workers.contains_key(name) {
            return Err(EngineError::Config(format!(
                "worker '{}' is defined twice",
                name
            )));
        }

        for grant in grants {
            if !capabilities.contains(grant) {
                return Err(EngineError::UnknownCapability(grant.to_string()));
            }
        }

        let worker = Worker {
            name: name.to_string(),
            role: role.to_string(),
            goal: goal.to_string(),
            tier,
            capabilities: grants.iter().map(|g| g.to_string()).collect(),
        };

        tracing::debug!(worker = name, tier = %tier, grants = grants.len(), "Worker defined");

        self.order.push(name.to_string());
        self.workers.insert(name.to_string(), worker);
        self.get(name)
    }

    /// Look up a worker by name.
    pub fn get(&self, name: &str) -> Result<&Worker, EngineError> {
        self.workers
            .get(name)
            .ok_or_else(|| EngineError::UnknownWorker(name.to_string()))
    }

    /// Workers in definition order.
    pub fn all(&self) -> Vec<&Worker> {
        self.order
            .iter()
            .filter_map(|name| self.workers.get(name))
            .collect()
    }

    /// The six-worker marketing roster.
    pub fn default_roster(capabilities: &CapabilityRegistry) -> Result<Self, EngineError> {
        let mut registry = Self::new();

        registry.define_worker(
            capabilities,
            STRATEGIST,
            "content strategist for a wellness retreat business",
            "Plan content strategies that fill retreats: pillars, themes, posting cadence",
            Tier::Premium,
            &[names::GENERATE_CONTENT, names::CONTENT_CALENDAR],
        )?;
        registry.define_worker(
            capabilities,
            CREATOR,
            "multichannel content creator",
            "Write authentic posts and emails for Instagram, Facebook and the mailing list",
            Tier::Basic,
            &[
                names::GENERATE_CONTENT,
                names::IMAGE_GENERATOR,
                names::FORMAT_POST,
                names::CONTENT_CALENDAR,
            ],
        )?;
        registry.define_worker(
            capabilities,
            SOCIAL_MANAGER,
            "community manager",
            "Publish content on Instagram and Facebook and keep the calendar current",
            Tier::Basic,
            &[
                names::GENERATE_CONTENT,
                names::IMAGE_GENERATOR,
                names::FORMAT_POST,
                names::PUBLISH_POST,
                names::CONTENT_CALENDAR,
            ],
        )?;
        registry.define_worker(
            capabilities,
            EMAIL_SPECIALIST,
            "email marketing specialist",
            "Run email campaigns that turn leads into participants",
            Tier::Basic,
            &[
                names::GENERATE_CONTENT,
                names::SEND_CAMPAIGN,
                names::LEADS_MANAGER,
            ],
        )?;
        registry.define_worker(
            capabilities,
            ANALYST,
            "marketing analyst",
            "Measure what was published and who converted, and recommend the next step",
            Tier::Basic,
            &[
                names::GENERATE_CONTENT,
                names::CONTENT_CALENDAR,
                names::LEADS_MANAGER,
            ],
        )?;
        registry.define_worker(
            capabilities,
            CUSTOMER_SUCCESS,
            "customer success specialist",
            "Nurture leads, answer prospects and book discovery calls",
            Tier::Basic,
            &[
                names::GENERATE_CONTENT,
                names::APPOINTMENT_SETTER,
                names::LEADS_MANAGER,
                names::SEND_CAMPAIGN,
            ],
        )?;

        Ok(registry)
    }
}

pub const STRATEGIST: &str = "strategist";
pub const CREATOR: &str = "creator";
pub const SOCIAL_MANAGER: &str = "social_manager";
pub const EMAIL_SPECIALIST: &str = "email_specialist";
pub const ANALYST: &str = "analyst";
pub const CUSTOMER_SUCCESS: &str = "customer_success";
