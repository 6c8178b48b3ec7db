//! Guardrails Telemetry
//!
//! The violation audit ledger and metric descriptions.
//!
//! Provides:
//! - The [`ViolationRecorder`] interface consumed by the scan path
//! - An in-memory recorder with a simulated-outage switch
//! - A hash-chained JSON-lines ledger with rotation and verification

pub mod audit;
pub mod metrics;
pub mod persistence;
pub mod recorder;

pub use audit::{ChainLink, HashChain};
pub use persistence::{verify_chain, ChainVerification, JsonlRecorder, LedgerConfig};
pub use recorder::{MemoryRecorder, ViolationRecorder};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::persistence::{JsonlRecorder, LedgerConfig};
    pub use crate::recorder::{MemoryRecorder, ViolationRecorder};
}
