//! Violation records
//!
//! A violation is written exactly once per (content, rule) match and is
//! never updated afterwards. It keeps a denormalized snapshot of the rule
//! so the audit trail stays readable after the rule is edited or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::rule::{Category, Severity};
use crate::types::{OrgId, RuleId};

/// What happened to the content that triggered the rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTaken {
    /// Content was rejected
    Blocked,
    /// Content was allowed through despite the finding
    Overridden,
    /// Matched text was replaced with a placeholder before release
    AutoRedacted,
}

impl fmt::Display for ActionTaken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Blocked => "blocked",
            Self::Overridden => "overridden",
            Self::AutoRedacted => "auto_redacted",
        })
    }
}

/// Immutable audit record of one rule firing against one piece of content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub org_id: OrgId,
    pub rule_id: RuleId,

    /// Rule name at fire time
    pub rule_name: String,

    /// Rule category at fire time
    pub category: Category,

    /// Rule severity at fire time
    pub severity: Severity,

    /// Matched text, already passed through the redaction policy
    pub matched_text: String,

    pub user_id: String,

    /// Content the match was found in (a prompt id, for example)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,

    pub action_taken: ActionTaken,

    pub created_at: DateTime<Utc>,
}

/// Identifier assigned by the recorder
pub type RecordId = String;

/// A violation as read back from the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedViolation {
    pub id: RecordId,
    #[serde(flatten)]
    pub violation: Violation,
}
