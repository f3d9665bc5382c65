//! Crewline SDK
//!
//! Shared library providing the capability contract used by the engine and
//! by any capability implemented outside of it.

/// Capability handler traits and side-effect classes
pub mod capability;

/// Error types and handling
pub mod errors;

/// Declared input schemas
pub mod schema;

/// Capability input/output types
pub mod types;

// Re-export commonly used types
pub use capability::{
    CommittedWrite, ExternalCapability, PureCapability, SideEffect, StoreCapability, StoreReceipt,
};
pub use errors::{CrewErrorExt, EngineError, ErrorClass};
pub use schema::{FieldKind, FieldSpec, InputSchema};
pub use types::{ArgError, CapabilityArgs, CapabilityOutput, INPUT_KEY};
