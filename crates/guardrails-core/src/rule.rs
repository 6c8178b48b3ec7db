//! Rule definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::types::{OrgId, RuleId};

/// Maximum accepted length of a raw pattern, in bytes
pub const MAX_PATTERN_LEN: usize = 4096;

/// Maximum accepted length of a rule name
pub const MAX_NAME_LEN: usize = 200;

/// How a rule's pattern string is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    /// Case-sensitive literal substring
    Exact,
    /// Case-insensitive literal substring
    Keyword,
    /// Regular expression, evaluated as written
    Regex,
    /// `*` and `?` wildcards, matched anywhere in the text
    Glob,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Keyword => "keyword",
            Self::Regex => "regex",
            Self::Glob => "glob",
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification tag of a rule; informational only, never affects matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ApiKeys,
    Credentials,
    Pii,
    Secrets,
    InternalTerms,
    FinancialData,
    HealthData,
    Custom,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiKeys => "api_keys",
            Self::Credentials => "credentials",
            Self::Pii => "pii",
            Self::Secrets => "secrets",
            Self::InternalTerms => "internal_terms",
            Self::FinancialData => "financial_data",
            Self::HealthData => "health_data",
            Self::Custom => "custom",
        }
    }

    /// Token name used when sanitizing a match of this category.
    ///
    /// `None` for [`Category::Custom`], whose token is derived from the rule name.
    pub fn placeholder_name(&self) -> Option<&'static str> {
        match self {
            Self::ApiKeys => Some("API_KEY"),
            Self::Credentials => Some("CREDENTIAL"),
            Self::Pii => Some("PII"),
            Self::Secrets => Some("SECRET"),
            Self::InternalTerms => Some("INTERNAL_TERM"),
            Self::FinancialData => Some("FINANCIAL_DATA"),
            Self::HealthData => Some("HEALTH_DATA"),
            Self::Custom => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a match of the rule means for the content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Content must not leave the organization
    Block,
    /// Content may proceed after the user sees a notice
    Warn,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Warn => "warn",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a rule entered the org's rule set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ref", rename_all = "snake_case")]
pub enum RuleSource {
    BuiltIn,
    Custom,
    /// Installed from the named policy pack
    Pack(String),
    /// Materialized from the given suggestion
    Suggestion(String),
}

/// A single detection policy, scoped to one organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub org_id: OrgId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub pattern: String,
    pub pattern_type: PatternType,
    pub category: Category,
    pub severity: Severity,
    pub is_active: bool,
    pub is_built_in: bool,
    pub source: RuleSource,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    /// Build a rule from validated author input
    pub fn from_draft(
        org_id: OrgId,
        draft: RuleDraft,
        created_by: impl Into<String>,
        source: RuleSource,
    ) -> Result<Self> {
        draft.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: RuleId::generate(),
            org_id,
            name: draft.name.trim().to_string(),
            description: draft.description,
            pattern: draft.pattern,
            pattern_type: draft.pattern_type,
            category: draft.category,
            severity: draft.severity,
            is_active: draft.is_active,
            is_built_in: matches!(source, RuleSource::BuiltIn),
            source,
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a patch in place, validating the resulting definition.
    ///
    /// Built-in rules accept only `is_active` and `severity` changes.
    pub fn apply_patch(&mut self, patch: &RulePatch) -> Result<()> {
        if self.is_built_in && patch.touches_definition() {
            return Err(Error::BuiltInRule {
                rule_id: self.id.clone(),
                operation: "edited",
            });
        }

        if let Some(name) = &patch.name {
            validate_name(name)?;
        }
        if let Some(pattern) = &patch.pattern {
            validate_pattern(pattern)?;
        }

        if let Some(name) = &patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(pattern) = &patch.pattern {
            self.pattern = pattern.clone();
        }
        if let Some(pattern_type) = patch.pattern_type {
            self.pattern_type = pattern_type;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(severity) = patch.severity {
            self.severity = severity;
        }
        if let Some(is_active) = patch.is_active {
            self.is_active = is_active;
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Author input for a new rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub pattern: String,
    pub pattern_type: PatternType,
    pub category: Category,
    pub severity: Severity,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl RuleDraft {
    /// Check field-level constraints (pattern compilation is checked separately)
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        validate_pattern(&self.pattern)
    }
}

/// Partial update of a rule; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_type: Option<PatternType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl RulePatch {
    /// Whether the patch changes anything beyond activation and severity
    pub fn touches_definition(&self) -> bool {
        self.name.is_some()
            || self.description.is_some()
            || self.pattern.is_some()
            || self.pattern_type.is_some()
            || self.category.is_some()
    }

    /// Whether the patch requires the pattern to be recompiled
    pub fn touches_pattern(&self) -> bool {
        self.pattern.is_some() || self.pattern_type.is_some()
    }
}

fn validate_name(name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::invalid_rule("name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::invalid_rule(format!(
            "name exceeds {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(())
}

fn validate_pattern(pattern: &str) -> Result<()> {
    if pattern.is_empty() {
        return Err(Error::invalid_rule("pattern must not be empty"));
    }
    if pattern.len() > MAX_PATTERN_LEN {
        return Err(Error::invalid_rule(format!(
            "pattern exceeds {} bytes",
            MAX_PATTERN_LEN
        )));
    }
    Ok(())
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> RuleDraft {
        RuleDraft {
            name: "Stripe live key".to_string(),
            description: String::new(),
            pattern: "sk_live_".to_string(),
            pattern_type: PatternType::Exact,
            category: Category::ApiKeys,
            severity: Severity::Block,
            is_active: true,
        }
    }

    #[test]
    fn test_draft_deserialization() {
        let yaml = r#"
name: Internal codename
pattern: "project-falcon"
pattern_type: keyword
category: internal_terms
severity: warn
"#;
        let draft: RuleDraft = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(draft.pattern_type, PatternType::Keyword);
        assert_eq!(draft.category, Category::InternalTerms);
        assert!(draft.is_active);
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        let json = r#"{"name": "x", "pattern": "y", "pattern_type": "exact",
                       "category": "gossip", "severity": "warn"}"#;
        assert!(serde_json::from_str::<RuleDraft>(json).is_err());
    }

    #[test]
    fn test_from_draft_validates_fields() {
        let mut bad = draft();
        bad.name = "   ".to_string();
        assert!(matches!(
            Rule::from_draft(OrgId::from("acme"), bad, "u1", RuleSource::Custom),
            Err(Error::InvalidRule(_))
        ));

        let rule = Rule::from_draft(OrgId::from("acme"), draft(), "u1", RuleSource::Custom).unwrap();
        assert!(!rule.is_built_in);
        assert_eq!(rule.org_id.as_str(), "acme");
    }

    #[test]
    fn test_built_in_rules_only_toggle_and_regrade() {
        let mut rule =
            Rule::from_draft(OrgId::from("acme"), draft(), "system", RuleSource::BuiltIn).unwrap();
        assert!(rule.is_built_in);

        let toggle = RulePatch {
            is_active: Some(false),
            severity: Some(Severity::Warn),
            ..Default::default()
        };
        rule.apply_patch(&toggle).unwrap();
        assert!(!rule.is_active);
        assert_eq!(rule.severity, Severity::Warn);

        let edit = RulePatch {
            pattern: Some("sk_test_".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            rule.apply_patch(&edit),
            Err(Error::BuiltInRule { .. })
        ));
        assert_eq!(rule.pattern, "sk_live_");
    }

    #[test]
    fn test_placeholder_names() {
        assert_eq!(Category::ApiKeys.placeholder_name(), Some("API_KEY"));
        assert_eq!(Category::Custom.placeholder_name(), None);
    }
}
