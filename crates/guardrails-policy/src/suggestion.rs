//! Member-submitted rule suggestions

use chrono::{DateTime, Utc};
use guardrails_core::types::generate_id;
use guardrails_core::{Category, Error, OrgId, Result, RuleId, Severity};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a suggestion; `Approved` and `Rejected` are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        })
    }
}

/// What a member submits. The pattern is chosen by the reviewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: Category,
    pub severity: Severity,
    /// Free-text explanation for the reviewer
    #[serde(default)]
    pub rationale: String,
}

/// A proposed rule awaiting review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSuggestion {
    pub id: String,
    pub org_id: OrgId,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub severity: Severity,
    pub rationale: String,
    pub suggested_by: String,
    pub status: SuggestionStatus,
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,

    /// Rule materialized on approval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<RuleId>,
}

impl RuleSuggestion {
    pub fn new(org_id: OrgId, draft: SuggestionDraft, suggested_by: impl Into<String>) -> Result<Self> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(Error::invalid_rule("suggestion name must not be empty"));
        }

        Ok(Self {
            id: generate_id("sug"),
            org_id,
            name: name.to_string(),
            description: draft.description,
            category: draft.category,
            severity: draft.severity,
            rationale: draft.rationale,
            suggested_by: suggested_by.into(),
            status: SuggestionStatus::Pending,
            created_at: Utc::now(),
            resolved_by: None,
            resolved_at: None,
            rejection_reason: None,
            rule_id: None,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == SuggestionStatus::Pending
    }

    /// Fail unless the suggestion can still transition
    pub fn ensure_pending(&self) -> Result<()> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(Error::LifecycleState {
                suggestion_id: self.id.clone(),
                status: self.status.to_string(),
            })
        }
    }

    pub(crate) fn mark_approved(&mut self, reviewer: &str, rule_id: RuleId) -> Result<()> {
        self.ensure_pending()?;
        self.status = SuggestionStatus::Approved;
        self.resolved_by = Some(reviewer.to_string());
        self.resolved_at = Some(Utc::now());
        self.rule_id = Some(rule_id);
        Ok(())
    }

    pub(crate) fn mark_rejected(&mut self, reviewer: &str, reason: Option<String>) -> Result<()> {
        self.ensure_pending()?;
        self.status = SuggestionStatus::Rejected;
        self.resolved_by = Some(reviewer.to_string());
        self.resolved_at = Some(Utc::now());
        self.rejection_reason = reason;
        Ok(())
    }
}
