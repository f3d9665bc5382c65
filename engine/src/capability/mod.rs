//! Capability Registry
//!
//! Maps a capability name to an executable unit with a declared input schema
//! and side-effect class. Capabilities are registered once at startup; the
//! registry is then shared read-only behind an `Arc`.
//!
//! Every invocation goes through [`CapabilityRegistry::invoke`]:
//!
//! 1. Unknown name → `UnknownCapability`
//! 2. Arguments checked against the schema → `SchemaViolation`
//! 3. Dispatch on the handler kind:
//!    - pure: called inline
//!    - external call: bounded by the configured timeout → `ExternalCallFailed("timeout")`
//!    - store mutation: awaited to completion; the receipt confirms the write
//!      is on disk before the caller advances

use sdk::{
    CapabilityArgs, CapabilityOutput, CommittedWrite, EngineError, ExternalCapability,
    InputSchema, PureCapability, SideEffect, StoreCapability,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// The executable part of a capability, tagged by side effect.
#[derive(Clone)]
pub enum Handler {
    Pure(Arc<dyn PureCapability>),
    External(Arc<dyn ExternalCapability>),
    Store(Arc<dyn StoreCapability>),
}

impl Handler {
    pub fn side_effect(&self) -> SideEffect {
        match self {
            Handler::Pure(_) => SideEffect::Pure,
            Handler::External(_) => SideEffect::ExternalCall,
            Handler::Store(_) => SideEffect::StoreMutation,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({})", self.side_effect())
    }
}

/// The failure a capability reports beyond schema violations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Pure capabilities only fail on bad input
    None,
    ExternalCallFailed,
    StoreConflict,
}

impl From<SideEffect> for FailureKind {
    fn from(effect: SideEffect) -> Self {
        match effect {
            SideEffect::Pure => FailureKind::None,
            SideEffect::ExternalCall => FailureKind::ExternalCallFailed,
            SideEffect::StoreMutation => FailureKind::StoreConflict,
        }
    }
}

/// A registered capability
#[derive(Debug, Clone)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub schema: InputSchema,
    pub handler: Handler,
}

impl Capability {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: InputSchema,
        handler: Handler,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            handler,
        }
    }

    pub fn side_effect(&self) -> SideEffect {
        self.handler.side_effect()
    }

    pub fn failure_kind(&self) -> FailureKind {
        self.side_effect().into()
    }
}

/// Result of a successful invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub output: CapabilityOutput,
    /// Set when a store capability persisted a write
    pub committed: Option<CommittedWrite>,
}

/// Registry of capabilities available to workers.
pub struct CapabilityRegistry {
    entries: HashMap<String, Capability>,
    order: Vec<String>,
    external_timeout: Duration,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new(external_timeout: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            external_timeout,
        }
    }

    /// Register a capability.
    ///
    /// # Errors
    /// `DuplicateCapability` if the name is already taken.
    pub fn register(&mut self, capability: Capability) -> Result<(), EngineError> {
        if self.entries.contains_key(&capability.name) {
            return Err(EngineError::DuplicateCapability(capability.name));
        }

        debug!(
            capability = %capability.name,
            side_effect = %capability.side_effect(),
            "Capability registered"
        );

        self.order.push(capability.name.clone());
        self.entries.insert(capability.name.clone(), capability);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.entries.get(name)
    }

    /// Capabilities in registration order.
    pub fn describe(&self) -> Vec<&Capability> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name))
            .collect()
    }

    pub fn external_timeout(&self) -> Duration {
        self.external_timeout
    }

    /// Validate and run a capability.
    pub async fn invoke(
        &self,
        name: &str,
        args: &CapabilityArgs,
    ) -> Result<Invocation, EngineError> {
        let capability = self
            .entries
            .get(name)
            .ok_or_else(|| EngineError::UnknownCapability(name.to_string()))?;

        capability
            .schema
            .validate(args)
            .map_err(|reason| EngineError::schema(name, reason))?;

        debug!(capability = name, side_effect = %capability.side_effect(), "Invoking capability");

        match &capability.handler {
            Handler::Pure(handler) => Ok(Invocation {
                output: handler.apply(args)?,
                committed: None,
            }),
            Handler::External(handler) => {
                match tokio::time::timeout(self.external_timeout, handler.call(args)).await {
                    Ok(result) => Ok(Invocation {
                        output: result?,
                        committed: None,
                    }),
                    Err(_) => {
                        warn!(
                            capability = name,
                            timeout_secs = self.external_timeout.as_secs(),
                            "External call timed out"
                        );
                        Err(EngineError::external(name, "timeout"))
                    }
                }
            }
            Handler::Store(handler) => {
                let receipt = handler.mutate(args).await?;
                if let Some(write) = &receipt.committed {
                    debug!(
                        capability = name,
                        collection = %write.collection,
                        record_id = write.record_id,
                        "Store write confirmed"
                    );
                }
                Ok(Invocation {
                    output: receipt.output,
                    committed: receipt.committed,
                })
            }
        }
    }
}
