//! Capability handler traits
//!
//! A capability is one of three kinds, distinguished by its side effect. The
//! engine registry stores handlers as a tagged variant over these kinds and
//! invokes them through one signature, so the side-effect class is fixed by the
//! type of the handler rather than declared separately.

use crate::errors::EngineError;
use crate::types::{CapabilityArgs, CapabilityOutput};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Side-effect class of a capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    /// No effect outside the returned value
    Pure,
    /// Calls a service outside the process; bounded by a timeout
    ExternalCall,
    /// Writes one of the durable collections; must be confirmed before a run advances
    StoreMutation,
}

impl fmt::Display for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SideEffect::Pure => write!(f, "pure"),
            SideEffect::ExternalCall => write!(f, "external-call"),
            SideEffect::StoreMutation => write!(f, "store-mutation"),
        }
    }
}

/// A capability with no side effects.
pub trait PureCapability: Send + Sync {
    fn apply(&self, args: &CapabilityArgs) -> Result<CapabilityOutput, EngineError>;
}

/// A capability that calls an external service.
///
/// Failures should be reported as [`EngineError::ExternalCallFailed`]. Any
/// retry policy belongs inside the implementation and must be idempotent.
#[async_trait]
pub trait ExternalCapability: Send + Sync {
    async fn call(&self, args: &CapabilityArgs) -> Result<CapabilityOutput, EngineError>;
}

/// A capability that mutates a durable collection.
///
/// The returned receipt is only produced once the write is on disk.
#[async_trait]
pub trait StoreCapability: Send + Sync {
    async fn mutate(&self, args: &CapabilityArgs) -> Result<StoreReceipt, EngineError>;
}

/// Confirmation returned by a store capability.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreReceipt {
    pub output: CapabilityOutput,

    /// The write that was persisted, `None` for read-only actions
    pub committed: Option<CommittedWrite>,
}

impl StoreReceipt {
    pub fn read_only(output: CapabilityOutput) -> Self {
        Self {
            output,
            committed: None,
        }
    }

    pub fn committed(output: CapabilityOutput, collection: impl Into<String>, id: u64) -> Self {
        Self {
            output,
            committed: Some(CommittedWrite {
                collection: collection.into(),
                record_id: id,
            }),
        }
    }
}

/// A persisted write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedWrite {
    pub collection: String,
    pub record_id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_effect_display() {
        assert_eq!(SideEffect::Pure.to_string(), "pure");
        assert_eq!(SideEffect::ExternalCall.to_string(), "external-call");
        assert_eq!(SideEffect::StoreMutation.to_string(), "store-mutation");
    }

    #[test]
    fn test_side_effect_serde() {
        let json = serde_json::to_string(&SideEffect::StoreMutation).unwrap();
        assert_eq!(json, "\"store_mutation\"");
    }

    #[test]
    fn test_receipt_constructors() {
        let r = StoreReceipt::committed(CapabilityOutput::text("ok"), "leads", 4);
        assert_eq!(
            r.committed,
            Some(CommittedWrite {
                collection: "leads".into(),
                record_id: 4
            })
        );
        assert!(StoreReceipt::read_only(CapabilityOutput::text("x"))
            .committed
            .is_none());
    }
}
