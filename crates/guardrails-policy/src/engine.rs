//! Scan engine
//!
//! Evaluates every active rule of a snapshot against a block of text.
//! Scanning is synchronous and holds no shared mutable state, so any
//! number of scans may run concurrently against the same snapshot.

use guardrails_core::{Category, Error, Result, RuleId, Severity};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::pattern::Span;
use crate::store::{CompiledRule, RuleSet};

/// Wall-clock allowance for a single rule evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanBudget {
    #[serde(with = "duration_ms")]
    pub per_rule: Duration,
}

impl Default for ScanBudget {
    fn default() -> Self {
        Self {
            per_rule: Duration::from_millis(50),
        }
    }
}

/// One rule firing against the scanned content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub category: Category,
    pub severity: Severity,

    /// Leftmost match of the rule
    pub span: Span,

    /// Raw matched substring; redact before it leaves the engine
    pub matched_text: String,
}

impl Finding {
    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Block
    }
}

/// Result of scanning one piece of content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// `true` unless a block-severity rule matched
    pub passed: bool,

    /// Findings in rule evaluation order, at most one per rule
    pub findings: Vec<Finding>,

    /// Number of active rules that were evaluated
    pub rules_evaluated: usize,

    /// Version of the snapshot the scan ran against
    pub snapshot_version: u64,
}

impl ScanResult {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn blocking(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.is_blocking())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| !f.is_blocking())
    }

    pub fn has_blocking(&self) -> bool {
        self.blocking().next().is_some()
    }
}

/// A scan that stopped before evaluating every rule.
///
/// Carries whatever matched before the abort, so the caller can still
/// record those findings against the block it issues.
#[derive(Debug)]
pub struct ScanAborted {
    pub error: Error,
    pub findings: Vec<Finding>,
}

/// Runs rule snapshots against content
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanEngine {
    budget: ScanBudget,
}

impl ScanEngine {
    pub fn new(budget: ScanBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> ScanBudget {
        self.budget
    }

    /// Scan content against every active rule of a snapshot.
    ///
    /// Every rule is evaluated; a block finding does not stop evaluation
    /// of the rest. A rule that overruns its budget aborts the scan with
    /// [`Error::ScanTimeout`]; callers must treat that as a block.
    pub fn scan(&self, content: &str, rules: &RuleSet) -> Result<ScanResult> {
        self.scan_keeping_partial(content, rules)
            .map_err(|aborted| aborted.error)
    }

    /// Like [`ScanEngine::scan`], but an aborted scan keeps its findings
    pub fn scan_keeping_partial(
        &self,
        content: &str,
        rules: &RuleSet,
    ) -> std::result::Result<ScanResult, ScanAborted> {
        let mut result = self.scan_rules(content, rules.active())?;
        result.snapshot_version = rules.version();
        Ok(result)
    }

    /// Scan content against an explicit sequence of rules
    pub fn scan_rules<'a>(
        &self,
        content: &str,
        rules: impl IntoIterator<Item = &'a CompiledRule>,
    ) -> std::result::Result<ScanResult, ScanAborted> {
        let mut findings = Vec::new();
        let mut evaluated = 0usize;

        for compiled in rules {
            let rule = &compiled.rule;
            if !rule.is_active {
                continue;
            }
            evaluated += 1;

            let started = Instant::now();
            let found = compiled.matcher().find(content);
            let elapsed = started.elapsed();

            if let Some(span) = found {
                debug!(rule = %rule.id, severity = %rule.severity, "Rule matched");
                findings.push(Finding {
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                    category: rule.category,
                    severity: rule.severity,
                    span,
                    matched_text: content[span.start..span.end].to_string(),
                });
            }

            if elapsed > self.budget.per_rule {
                warn!(
                    rule = %rule.id,
                    elapsed_us = elapsed.as_micros() as u64,
                    findings = findings.len(),
                    "Rule exceeded scan budget"
                );
                metrics::counter!("guardrails_scan_timeouts_total").increment(1);
                return Err(ScanAborted {
                    error: Error::ScanTimeout {
                        rule_id: rule.id.clone(),
                        budget: self.budget.per_rule,
                    },
                    findings,
                });
            }
        }

        let passed = !findings.iter().any(Finding::is_blocking);

        metrics::counter!("guardrails_scans_total").increment(1);
        for finding in &findings {
            metrics::counter!(
                "guardrails_findings_total",
                "severity" => finding.severity.as_str()
            )
            .increment(1);
        }

        Ok(ScanResult {
            passed,
            findings,
            rules_evaluated: evaluated,
            snapshot_version: 0,
        })
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::PatternCompiler;
    use guardrails_core::{OrgId, PatternType, Rule, RuleDraft, RuleSource};

    fn rule(name: &str, pattern: &str, pattern_type: PatternType, severity: Severity) -> Rule {
        Rule::from_draft(
            OrgId::from("acme"),
            RuleDraft {
                name: name.to_string(),
                description: String::new(),
                pattern: pattern.to_string(),
                pattern_type,
                category: Category::Secrets,
                severity,
                is_active: true,
            },
            "u1",
            RuleSource::Custom,
        )
        .unwrap()
    }

    fn rule_set(rules: Vec<Rule>) -> RuleSet {
        RuleSet::compile(OrgId::from("acme"), rules, &PatternCompiler::default()).unwrap()
    }

    #[test]
    fn test_exact_block_rule() {
        let rules = rule_set(vec![rule("stripe", "sk_live_", PatternType::Exact, Severity::Block)]);
        let result = ScanEngine::default()
            .scan("here is sk_live_abc123", &rules)
            .unwrap();

        assert!(!result.passed);
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].matched_text, "sk_live_");
    }

    #[test]
    fn test_warn_keyword_does_not_block() {
        let rules = rule_set(vec![rule("ssn", "SSN", PatternType::Keyword, Severity::Warn)]);
        let result = ScanEngine::default()
            .scan("Patient ssn on file", &rules)
            .unwrap();

        assert!(result.passed);
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].severity, Severity::Warn);
        assert_eq!(result.findings[0].matched_text, "ssn");
    }

    #[test]
    fn test_all_rules_evaluated_in_order() {
        let rules = rule_set(vec![
            rule("warn-first", "project", PatternType::Keyword, Severity::Warn),
            rule("block", r"\d{3}-\d{2}-\d{4}", PatternType::Regex, Severity::Block),
            rule("warn-last", "falcon", PatternType::Keyword, Severity::Warn),
            rule("miss", "zebra", PatternType::Exact, Severity::Block),
        ]);
        let result = ScanEngine::default()
            .scan("Project Falcon: 123-45-6789", &rules)
            .unwrap();

        let names: Vec<_> = result.findings.iter().map(|f| f.rule_name.as_str()).collect();
        assert_eq!(names, vec!["warn-first", "block", "warn-last"]);
        assert!(!result.passed);
        assert_eq!(result.rules_evaluated, 4);
    }

    #[test]
    fn test_one_finding_per_rule_leftmost() {
        let rules = rule_set(vec![rule("digits", r"\d+", PatternType::Regex, Severity::Warn)]);
        let result = ScanEngine::default().scan("a 12 b 345", &rules).unwrap();

        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].matched_text, "12");
        assert_eq!(result.findings[0].span, Span::new(2, 4));
    }

    #[test]
    fn test_inactive_rules_are_skipped() {
        let mut inactive = rule("off", "secret", PatternType::Keyword, Severity::Block);
        inactive.is_active = false;
        let rules = rule_set(vec![inactive]);

        let result = ScanEngine::default().scan("top secret", &rules).unwrap();
        assert!(result.passed);
        assert!(result.is_clean());
        assert_eq!(result.rules_evaluated, 0);
    }

    #[test]
    fn test_zero_budget_fails_with_timeout() {
        let rules = rule_set(vec![rule("slow", r"(?:\w+\s*)+done", PatternType::Regex, Severity::Warn)]);
        let engine = ScanEngine::new(ScanBudget {
            per_rule: Duration::ZERO,
        });

        let text = "word ".repeat(20_000);
        let err = engine.scan(&text, &rules).unwrap_err();
        assert_eq!(err.kind(), "scan_timeout");
        assert_eq!(err.rule_id(), Some(&rules.rules()[0].rule.id));
    }

    #[test]
    fn test_timeout_keeps_earlier_findings() {
        let rules = rule_set(vec![
            rule("stripe", "sk_live_", PatternType::Exact, Severity::Block),
            rule("slow", r"\w{3}z\d{5}q", PatternType::Regex, Severity::Warn),
        ]);
        let engine = ScanEngine::new(ScanBudget {
            per_rule: Duration::ZERO,
        });

        let text = format!("sk_live_abc {}", "word ".repeat(20_000));
        let aborted = engine.scan_keeping_partial(&text, &rules).unwrap_err();

        assert_eq!(aborted.error.kind(), "scan_timeout");
        assert_eq!(aborted.findings.len(), 1);
        assert_eq!(aborted.findings[0].rule_name, "stripe");
        assert_eq!(aborted.findings[0].matched_text, "sk_live_");
    }

    #[test]
    fn test_budget_serializes_as_millis() {
        let budget = ScanBudget {
            per_rule: Duration::from_millis(75),
        };
        assert_eq!(serde_json::to_string(&budget).unwrap(), r#"{"per_rule":75}"#);
    }
}
