//! Usage ledger
//!
//! Process-wide record of every routed request: per-tier counts and cost,
//! the running total, and what the same traffic would have cost had every
//! request gone to the premium tier. The ledger only grows.
//!
//! When opened with a path, a snapshot is written atomically after each
//! decision so totals survive restarts.

use super::{Cost, Tier, TierDecision};
use crate::store::write_json_atomic;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// File name of the persisted snapshot
pub const USAGE_FILE: &str = "usage.json";

/// Count and cost for one tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierUsage {
    pub count: u64,
    pub cost: Cost,
}

/// Ledger query result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    pub total_requests: u64,
    pub total_cost: Cost,
    pub per_tier: BTreeMap<Tier, TierUsage>,
    pub counterfactual_premium_cost: Cost,
}

impl UsageReport {
    /// Amount saved versus sending everything to premium.
    pub fn savings(&self) -> Cost {
        self.counterfactual_premium_cost
            .saturating_sub(self.total_cost)
    }

    /// Savings as a percentage of the counterfactual cost.
    pub fn savings_percent(&self) -> f64 {
        let counterfactual = self.counterfactual_premium_cost.micros();
        if counterfactual == 0 {
            return 0.0;
        }
        self.savings().micros() as f64 / counterfactual as f64 * 100.0
    }

    pub fn tier(&self, tier: Tier) -> TierUsage {
        self.per_tier.get(&tier).copied().unwrap_or_default()
    }
}

/// Append-only usage ledger
pub struct UsageLedger {
    premium_unit_cost: Cost,
    path: Option<PathBuf>,
    state: Mutex<UsageReport>,
}

impl UsageLedger {
    /// A ledger that lives only as long as the process.
    pub fn in_memory(premium_unit_cost: Cost) -> Self {
        Self {
            premium_unit_cost,
            path: None,
            state: Mutex::new(UsageReport::default()),
        }
    }

    /// Open a persisted ledger, resuming from an existing snapshot.
    pub async fn open(path: &Path, premium_unit_cost: Cost) -> Result<Self, EngineError> {
        let state = match tokio::fs::read_to_string(path).await {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => UsageReport::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            premium_unit_cost,
            path: Some(path.to_path_buf()),
            state: Mutex::new(state),
        })
    }

    /// Read a snapshot file without opening a ledger.
    pub async fn read_snapshot(path: &Path) -> Result<UsageReport, EngineError> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(UsageReport::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Append one decision.
    pub async fn record(&self, decision: &TierDecision) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;

        let mut next = state.clone();
        next.total_requests += 1;
        next.total_cost += decision.estimated_cost;
        next.counterfactual_premium_cost += self.premium_unit_cost;
        let tier = next.per_tier.entry(decision.tier).or_default();
        tier.count += 1;
        tier.cost += decision.estimated_cost;

        if let Some(path) = &self.path {
            write_json_atomic(path, &next).await?;
        }
        *state = next;

        debug!(
            total_requests = state.total_requests,
            total_cost = %state.total_cost,
            "Usage ledger updated"
        );
        Ok(())
    }

    /// Current totals.
    pub async fn report(&self) -> UsageReport {
        self.state.lock().await.clone()
    }
}
