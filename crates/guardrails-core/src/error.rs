//! Error types for the Guardrails engine

use std::time::Duration;

use crate::types::RuleId;

/// Result type alias using the Guardrails error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Guardrails operations
///
/// Every variant carries enough structure (kind plus offending rule, when
/// one is known) for a caller to render a specific message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A rule pattern could not be compiled into a matcher
    #[error("invalid {pattern_type} pattern: {message}")]
    Compile {
        /// Rule being saved, if it already has an identity
        rule_id: Option<RuleId>,
        /// Pattern type tag the author selected
        pattern_type: String,
        /// Compiler diagnostic
        message: String,
    },

    /// A rule exceeded its evaluation budget during a scan
    #[error("rule {rule_id} exceeded its scan budget of {budget:?}")]
    ScanTimeout {
        /// Rule that ran over
        rule_id: RuleId,
        /// Configured per-rule budget
        budget: Duration,
    },

    /// The audit ledger rejected a write
    #[error("failed to record violation: {0}")]
    Recording(String),

    /// A suggestion was asked to transition out of a terminal state
    #[error("suggestion {suggestion_id} is already {status}")]
    LifecycleState {
        /// Suggestion that was targeted
        suggestion_id: String,
        /// Status it is already in
        status: String,
    },

    /// The org's plan does not permit a packaged rule
    #[error("plan does not permit rule '{rule_name}' from pack '{pack}'")]
    Entitlement {
        /// Pack being installed
        pack: String,
        /// Packaged rule name
        rule_name: String,
    },

    /// The actor's role may not perform the operation
    #[error("role '{role}' may not {operation}")]
    Forbidden {
        /// Actor role
        role: String,
        /// Operation that was refused
        operation: String,
    },

    /// A referenced entity does not exist in the actor's org
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Entity kind (rule, suggestion, pack)
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Built-in rules may only be toggled or re-graded
    #[error("built-in rule {rule_id} cannot be {operation}")]
    BuiltInRule {
        /// Built-in rule that was targeted
        rule_id: RuleId,
        /// Refused operation
        operation: &'static str,
    },

    /// Rule fields failed validation
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a compile error for a pattern that has no rule identity yet
    pub fn compile(pattern_type: impl ToString, message: impl Into<String>) -> Self {
        Self::Compile {
            rule_id: None,
            pattern_type: pattern_type.to_string(),
            message: message.into(),
        }
    }

    /// Create a new recording error
    pub fn recording(msg: impl Into<String>) -> Self {
        Self::Recording(msg.into())
    }

    /// Create a new forbidden error
    pub fn forbidden(role: impl ToString, operation: impl Into<String>) -> Self {
        Self::Forbidden {
            role: role.to_string(),
            operation: operation.into(),
        }
    }

    /// Create a new not-found error
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Create a new invalid rule error
    pub fn invalid_rule(msg: impl Into<String>) -> Self {
        Self::InvalidRule(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Attach the offending rule to a compile error
    pub fn with_rule(self, id: &RuleId) -> Self {
        match self {
            Self::Compile {
                pattern_type,
                message,
                ..
            } => Self::Compile {
                rule_id: Some(id.clone()),
                pattern_type,
                message,
            },
            other => other,
        }
    }

    /// Stable snake_case identifier of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Compile { .. } => "compile_error",
            Self::ScanTimeout { .. } => "scan_timeout",
            Self::Recording(_) => "recording_error",
            Self::LifecycleState { .. } => "lifecycle_state_error",
            Self::Entitlement { .. } => "entitlement_error",
            Self::Forbidden { .. } => "forbidden",
            Self::NotFound { .. } => "not_found",
            Self::BuiltInRule { .. } => "built_in_rule",
            Self::InvalidRule(_) => "invalid_rule",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// The rule this error concerns, when known
    pub fn rule_id(&self) -> Option<&RuleId> {
        match self {
            Self::Compile { rule_id, .. } => rule_id.as_ref(),
            Self::ScanTimeout { rule_id, .. } | Self::BuiltInRule { rule_id, .. } => Some(rule_id),
            _ => None,
        }
    }
}
