//! Guardrails Core
//!
//! Core types and utilities shared across the Guardrails components.
//!
//! This crate provides:
//! - The rule data model (pattern types, categories, severities)
//! - Actors and roles used for explicit org-scoped authorization
//! - The immutable violation record that feeds the audit ledger
//! - Error types and result handling
//! - The redaction policy applied to matched text before it leaves the engine

pub mod actor;
pub mod error;
pub mod redact;
pub mod rule;
pub mod types;
pub mod violation;

pub use actor::{Actor, Role};
pub use error::{Error, Result};
pub use redact::MatchRedaction;
pub use rule::{Category, PatternType, Rule, RuleDraft, RulePatch, RuleSource, Severity};
pub use types::{OrgId, RuleId};
pub use violation::{ActionTaken, RecordId, RecordedViolation, Violation};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::actor::{Actor, Role};
    pub use crate::error::{Error, Result};
    pub use crate::rule::{Category, PatternType, Rule, RuleDraft, Severity};
    pub use crate::types::{OrgId, RuleId};
    pub use crate::violation::{ActionTaken, Violation};
}
