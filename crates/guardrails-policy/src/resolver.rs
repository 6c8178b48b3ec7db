//! Severity/action resolver
//!
//! Turns a [`ScanResult`] into a final verdict and, in sanitize mode, a
//! substitution plan plus the sanitized text. Resolution performs no I/O;
//! recording the outcome is the caller's job.

use guardrails_core::{ActionTaken, Category, Error, RuleId, Severity};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, warn};

use crate::engine::{Finding, ScanAborted, ScanEngine, ScanResult};
use crate::pattern::{next_char_boundary, Matcher, Span};
use crate::store::RuleSet;

/// Failure kind reported when sanitized text still trips a sanitized rule
pub const SANITIZE_INCOMPLETE: &str = "sanitize_incomplete";

/// Placeholders tried, in order, when the category token is unusable
const FALLBACK_PLACEHOLDERS: &[&str] = &["{{REDACTED}}", "[REDACTED]", "***"];

/// How the caller wants findings handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Reject content with block findings; never modify it
    #[default]
    BlockOnly,
    /// Replace matched spans with placeholders where policy allows
    BlockAndSanitize,
}

/// Org-level resolver settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResolverPolicy {
    /// Sanitize block-severity findings instead of rejecting the content
    #[serde(default)]
    pub sanitize_blocking: bool,
}

/// Verdict for the scanned content as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalAction {
    PassThrough,
    Warned,
    Blocked,
    AutoRedacted,
}

impl FinalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PassThrough => "pass_through",
            Self::Warned => "warned",
            Self::Blocked => "blocked",
            Self::AutoRedacted => "auto_redacted",
        }
    }
}

impl fmt::Display for FinalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finding together with what happened to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFinding {
    pub finding: Finding,
    pub action_taken: ActionTaken,
}

/// One planned replacement in the original text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substitution {
    pub rule_id: RuleId,
    pub span: Span,
    pub placeholder: String,
}

/// A rule that matches the sanitized text only within inserted placeholders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderCollision {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub severity: Severity,
}

/// Why a resolution failed closed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFailure {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<RuleId>,
    pub message: String,
}

impl From<&Error> for ScanFailure {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind().to_string(),
            rule_id: err.rule_id().cloned(),
            message: err.to_string(),
        }
    }
}

/// Outcome of resolving a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub final_action: FinalAction,

    /// Findings in evaluation order, each with its audit action
    pub findings: Vec<ResolvedFinding>,

    /// Present only for [`FinalAction::AutoRedacted`]
    pub sanitized_content: Option<String>,

    pub substitutions: Vec<Substitution>,

    pub placeholder_collisions: Vec<PlaceholderCollision>,

    /// Set when the verdict is a fail-closed block
    pub failure: Option<ScanFailure>,
}

impl Resolution {
    /// A block verdict for a scan that could not reach a definitive answer
    pub fn fail_closed(err: &Error) -> Self {
        Self::fail_closed_with(&[], ScanFailure::from(err))
    }

    /// A block verdict for an aborted scan; findings made before the
    /// abort are kept and marked blocked
    pub fn aborted(aborted: &ScanAborted) -> Self {
        Self::fail_closed_with(&aborted.findings, ScanFailure::from(&aborted.error))
    }

    fn fail_closed_with(findings: &[Finding], failure: ScanFailure) -> Self {
        Self {
            final_action: FinalAction::Blocked,
            findings: findings
                .iter()
                .cloned()
                .map(|finding| ResolvedFinding {
                    finding,
                    action_taken: ActionTaken::Blocked,
                })
                .collect(),
            sanitized_content: None,
            substitutions: Vec::new(),
            placeholder_collisions: Vec::new(),
            failure: Some(failure),
        }
    }

    /// `false` whenever the content must not be forwarded
    pub fn passed(&self) -> bool {
        self.final_action != FinalAction::Blocked
    }

    pub fn is_fail_closed(&self) -> bool {
        self.failure.is_some()
    }
}

/// Maps scan findings to a final action
#[derive(Debug, Clone, Copy, Default)]
pub struct Resolver {
    engine: ScanEngine,
    policy: ResolverPolicy,
}

impl Resolver {
    /// `engine` is used to re-scan sanitized text
    pub fn new(engine: ScanEngine, policy: ResolverPolicy) -> Self {
        Self { engine, policy }
    }

    pub fn policy(&self) -> ResolverPolicy {
        self.policy
    }

    /// Resolve a scan of `content` taken against `rules`.
    ///
    /// `rules` must be the snapshot the scan ran against.
    pub fn resolve(
        &self,
        content: &str,
        scan: &ScanResult,
        rules: &RuleSet,
        mode: ScanMode,
    ) -> Resolution {
        if scan.is_clean() {
            return Resolution {
                final_action: FinalAction::PassThrough,
                findings: Vec::new(),
                sanitized_content: None,
                substitutions: Vec::new(),
                placeholder_collisions: Vec::new(),
                failure: None,
            };
        }

        let sanitize = mode == ScanMode::BlockAndSanitize
            && (self.policy.sanitize_blocking || !scan.has_blocking());

        if !sanitize {
            return Self::without_sanitizing(scan);
        }

        match self.sanitize(content, scan, rules) {
            Ok(resolution) => resolution,
            Err(failure) => {
                warn!(
                    kind = %failure.kind,
                    rule = ?failure.rule_id,
                    "Sanitization failed, blocking content"
                );
                Resolution::fail_closed_with(&scan.findings, failure)
            }
        }
    }

    fn without_sanitizing(scan: &ScanResult) -> Resolution {
        let (final_action, warn_action) = if scan.has_blocking() {
            (FinalAction::Blocked, ActionTaken::Blocked)
        } else {
            (FinalAction::Warned, ActionTaken::Overridden)
        };

        let findings = scan
            .findings
            .iter()
            .cloned()
            .map(|finding| {
                let action_taken = if finding.is_blocking() {
                    ActionTaken::Blocked
                } else {
                    warn_action
                };
                ResolvedFinding {
                    finding,
                    action_taken,
                }
            })
            .collect();

        Resolution {
            final_action,
            findings,
            sanitized_content: None,
            substitutions: Vec::new(),
            placeholder_collisions: Vec::new(),
            failure: None,
        }
    }

    fn sanitize(
        &self,
        content: &str,
        scan: &ScanResult,
        rules: &RuleSet,
    ) -> std::result::Result<Resolution, ScanFailure> {
        let mut substitutions: Vec<Substitution> = Vec::new();

        for finding in &scan.findings {
            let compiled = rules.get(&finding.rule_id).ok_or_else(|| ScanFailure {
                kind: SANITIZE_INCOMPLETE.to_string(),
                rule_id: Some(finding.rule_id.clone()),
                message: "rule missing from snapshot".to_string(),
            })?;
            let matcher = compiled.matcher();

            let placeholder = choose_placeholder(finding, matcher).ok_or_else(|| ScanFailure {
                kind: SANITIZE_INCOMPLETE.to_string(),
                rule_id: Some(finding.rule_id.clone()),
                message: "rule matches every available placeholder".to_string(),
            })?;

            // Earlier rules own any text they already claimed
            for span in unclaimed_matches(matcher, content, &substitutions) {
                substitutions.push(Substitution {
                    rule_id: finding.rule_id.clone(),
                    span,
                    placeholder: placeholder.clone(),
                });
            }
        }

        let sanitized = apply_substitutions(content, &substitutions);
        let placeholders = placeholder_spans(&substitutions);
        let sanitized_rules: HashSet<&RuleId> =
            scan.findings.iter().map(|f| &f.rule_id).collect();

        let rescan = self
            .engine
            .scan(&sanitized, rules)
            .map_err(|e| ScanFailure::from(&e))?;

        let mut collisions = Vec::new();
        for hit in &rescan.findings {
            if sanitized_rules.contains(&hit.rule_id) {
                let survived = rules
                    .get(&hit.rule_id)
                    .map(|c| c.matcher().find_all(&sanitized))
                    .unwrap_or_else(|| vec![hit.span])
                    .into_iter()
                    .any(|span| !placeholders.iter().any(|p| contains(p, &span)));
                if survived {
                    return Err(ScanFailure {
                        kind: SANITIZE_INCOMPLETE.to_string(),
                        rule_id: Some(hit.rule_id.clone()),
                        message: format!("rule '{}' still matches sanitized text", hit.rule_name),
                    });
                }
            }
            warn!(
                rule = %hit.rule_id,
                severity = %hit.severity,
                "Rule matches placeholder text in sanitized output"
            );
            collisions.push(PlaceholderCollision {
                rule_id: hit.rule_id.clone(),
                rule_name: hit.rule_name.clone(),
                severity: hit.severity,
            });
        }

        debug!(
            substitutions = substitutions.len(),
            collisions = collisions.len(),
            "Sanitized content"
        );

        Ok(Resolution {
            final_action: FinalAction::AutoRedacted,
            findings: scan
                .findings
                .iter()
                .cloned()
                .map(|finding| ResolvedFinding {
                    finding,
                    action_taken: ActionTaken::AutoRedacted,
                })
                .collect(),
            sanitized_content: Some(sanitized),
            substitutions,
            placeholder_collisions: collisions,
            failure: None,
        })
    }
}

/// Matches of `matcher` in `content` that overlap no existing substitution.
///
/// A match that overlaps a claimed span is skipped one char at a time, so a
/// later occurrence hidden behind it is still found.
fn unclaimed_matches(matcher: &Matcher, content: &str, claimed: &[Substitution]) -> Vec<Span> {
    let mut spans: Vec<Span> = Vec::new();
    let mut at = 0;
    while at < content.len() {
        let Some(span) = matcher.find_at(content, at) else {
            break;
        };
        if claimed.iter().any(|s| s.span.overlaps(&span)) {
            at = next_char_boundary(content, span.start);
        } else {
            at = span.end;
            spans.push(span);
        }
    }
    spans
}

/// Where each placeholder lands in the sanitized text
fn placeholder_spans(substitutions: &[Substitution]) -> Vec<Span> {
    let mut sorted: Vec<&Substitution> = substitutions.iter().collect();
    sorted.sort_by_key(|s| s.span.start);

    let mut shift: isize = 0;
    sorted
        .into_iter()
        .map(|sub| {
            let start = (sub.span.start as isize + shift) as usize;
            shift += sub.placeholder.len() as isize - sub.span.len() as isize;
            Span::new(start, start + sub.placeholder.len())
        })
        .collect()
}

fn contains(outer: &Span, inner: &Span) -> bool {
    outer.start <= inner.start && inner.end <= outer.end
}

/// Placeholder token for a finding's category, or its rule name for custom rules
pub fn placeholder_token(category: Category, rule_name: &str) -> Option<String> {
    let name = match category.placeholder_name() {
        Some(name) => name.to_string(),
        None => upper_snake(rule_name),
    };
    if name.is_empty() {
        None
    } else {
        Some(format!("{{{{{}}}}}", name))
    }
}

fn choose_placeholder(finding: &Finding, matcher: &Matcher) -> Option<String> {
    placeholder_token(finding.category, &finding.rule_name)
        .into_iter()
        .chain(FALLBACK_PLACEHOLDERS.iter().map(|p| p.to_string()))
        .find(|candidate| !matcher.is_match(candidate))
}

fn upper_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_uppercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Apply non-overlapping substitutions to the original text.
///
/// Replacements are spliced from the end of the text backwards so earlier
/// byte offsets stay valid.
pub fn apply_substitutions(text: &str, substitutions: &[Substitution]) -> String {
    let mut result = text.to_string();

    let mut sorted: Vec<&Substitution> = substitutions.iter().collect();
    sorted.sort_by(|a, b| b.span.start.cmp(&a.span.start));

    for sub in sorted {
        let Span { start, end } = sub.span;
        if start < end && end <= result.len() {
            result.replace_range(start..end, &sub.placeholder);
        }
    }

    result
}
