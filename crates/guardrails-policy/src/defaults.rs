//! Built-in default rules seeded into every new organization
//!
//! Built-in rules can be deactivated or re-graded but never deleted.

use chrono::Utc;
use guardrails_core::{Category, OrgId, PatternType, Rule, RuleId, RuleSource, Severity};

/// Static definition of a built-in rule
pub struct BuiltIn {
    pub slug: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub pattern: &'static str,
    pub pattern_type: PatternType,
    pub category: Category,
    pub severity: Severity,
}

impl BuiltIn {
    const fn new(
        slug: &'static str,
        name: &'static str,
        pattern: &'static str,
        category: Category,
        severity: Severity,
        description: &'static str,
    ) -> Self {
        Self {
            slug,
            name,
            description,
            pattern,
            pattern_type: PatternType::Regex,
            category,
            severity,
        }
    }

    fn to_rule(&self, org_id: &OrgId) -> Rule {
        let now = Utc::now();
        Rule {
            id: built_in_id(self.slug),
            org_id: org_id.clone(),
            name: self.name.to_string(),
            description: self.description.to_string(),
            pattern: self.pattern.to_string(),
            pattern_type: self.pattern_type,
            category: self.category,
            severity: self.severity,
            is_active: true,
            is_built_in: true,
            source: RuleSource::BuiltIn,
            created_by: "system".to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// API keys and tokens issued by common providers
pub const API_KEY_RULES: &[BuiltIn] = &[
    BuiltIn::new(
        "openai-api-key",
        "OpenAI API key",
        r"\bsk-(?:proj-)?[A-Za-z0-9_-]{20,}",
        Category::ApiKeys,
        Severity::Block,
        "OpenAI secret key",
    ),
    BuiltIn::new(
        "stripe-live-key",
        "Stripe live key",
        r"\b[rs]k_live_[A-Za-z0-9]{16,}",
        Category::ApiKeys,
        Severity::Block,
        "Stripe live secret or restricted key",
    ),
    BuiltIn::new(
        "aws-access-key-id",
        "AWS access key ID",
        r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b",
        Category::ApiKeys,
        Severity::Block,
        "AWS access key identifier",
    ),
    BuiltIn::new(
        "github-token",
        "GitHub token",
        r"\bgh[pousr]_[A-Za-z0-9]{36,}\b",
        Category::ApiKeys,
        Severity::Block,
        "GitHub personal access or app token",
    ),
    BuiltIn::new(
        "slack-token",
        "Slack token",
        r"\bxox[baprs]-[A-Za-z0-9-]{10,}",
        Category::ApiKeys,
        Severity::Block,
        "Slack bot, user or app token",
    ),
];

/// Key material and credentials
pub const SECRET_RULES: &[BuiltIn] = &[
    BuiltIn::new(
        "private-key-block",
        "Private key block",
        r"-----BEGIN (?:RSA |EC |DSA |OPENSSH |PGP |ENCRYPTED )?PRIVATE KEY-----",
        Category::Secrets,
        Severity::Block,
        "PEM-encoded private key",
    ),
    BuiltIn::new(
        "json-web-token",
        "JSON web token",
        r"\beyJ[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}",
        Category::Secrets,
        Severity::Warn,
        "Signed JWT, often a live session credential",
    ),
    BuiltIn::new(
        "password-assignment",
        "Password assignment",
        r"(?i)\b(?:password|passwd|pwd)\s*[:=]\s*\S+",
        Category::Credentials,
        Severity::Warn,
        "Inline password in config or prose",
    ),
];

/// Personal and financial identifiers
pub const PII_RULES: &[BuiltIn] = &[
    BuiltIn::new(
        "us-ssn",
        "US social security number",
        r"\b\d{3}-\d{2}-\d{4}\b",
        Category::Pii,
        Severity::Block,
        "US SSN in ddd-dd-dddd form",
    ),
    BuiltIn::new(
        "payment-card-number",
        "Payment card number",
        r"\b(?:\d{4}[- ]?){3}\d{4}\b",
        Category::FinancialData,
        Severity::Block,
        "16-digit card number, optionally grouped",
    ),
    BuiltIn::new(
        "email-address",
        "Email address",
        r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
        Category::Pii,
        Severity::Warn,
        "Email address",
    ),
];

/// Identifier of a built-in rule; stable across orgs and restarts
pub fn built_in_id(slug: &str) -> RuleId {
    RuleId::new(format!("builtin_{}", slug))
}

/// Every built-in definition, in evaluation order
pub fn definitions() -> impl Iterator<Item = &'static BuiltIn> {
    API_KEY_RULES
        .iter()
        .chain(SECRET_RULES.iter())
        .chain(PII_RULES.iter())
}

/// Materialize the built-in rules for an org
pub fn built_in_rules(org_id: &OrgId) -> Vec<Rule> {
    definitions().map(|b| b.to_rule(org_id)).collect()
}
