//! Scan, resolve and record
//!
//! A scan response is only returned once every violation it reports is in
//! the ledger. If recording fails the request fails; the content is never
//! reported as passed on an unrecorded decision.

use chrono::Utc;
use guardrails_core::{ActionTaken, Actor, Category, RecordId, RuleId, Severity, Violation};
use guardrails_policy::{
    FinalAction, PlaceholderCollision, Resolution, Resolver, RuleSet, ScanFailure, ScanMode,
};
use guardrails_telemetry::metrics::{
    RECORDING_FAILURES_TOTAL, SCAN_DURATION_SECONDS, SCAN_FAIL_CLOSED_TOTAL,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::state::AppState;

/// Body of `POST /v1/orgs/:org_id/scan`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub content: String,

    #[serde(default)]
    pub mode: ScanMode,

    /// Caller's identifier for the content, copied onto each violation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
}

/// A finding as reported to the caller, matched text redacted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportedViolation {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub category: Category,
    pub severity: Severity,
    pub matched_text: String,
    pub action_taken: ActionTaken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResponse {
    pub passed: bool,
    pub final_action: FinalAction,
    pub violations: Vec<ReportedViolation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sanitized_content: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub placeholder_collisions: Vec<PlaceholderCollision>,

    /// Why the scan failed closed, if it did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ScanFailure>,

    /// Ledger ids of the recorded violations, in `violations` order
    pub record_ids: Vec<RecordId>,

    pub rules_evaluated: usize,
    pub snapshot_version: u64,
}

/// Scan content for the actor's org and record every resulting violation
pub async fn scan_content(
    state: &AppState,
    actor: &Actor,
    request: ScanRequest,
) -> Result<ScanResponse, AppError> {
    let size = request.content.len();
    if size > state.max_content_bytes {
        return Err(AppError::PayloadTooLarge {
            size,
            limit: state.max_content_bytes,
        });
    }

    let started = Instant::now();
    let rules = state.lifecycle.store(&actor.org_id)?.snapshot();
    let engine = state.engine;
    let policy = state.orgs.resolver_policy(&actor.org_id);
    let mode = request.mode;
    let content = request.content;

    let (resolution, rules_evaluated, rules) = tokio::task::spawn_blocking(move || {
        match engine.scan_keeping_partial(&content, &rules) {
            Ok(scan) => {
                let resolution = Resolver::new(engine, policy).resolve(&content, &scan, &rules, mode);
                (resolution, scan.rules_evaluated, rules)
            }
            Err(aborted) => {
                warn!(
                    org = %rules.org_id(),
                    kind = aborted.error.kind(),
                    findings = aborted.findings.len(),
                    "Scan failed, blocking content: {}",
                    aborted.error
                );
                (Resolution::aborted(&aborted), 0, rules)
            }
        }
    })
    .await?;

    if resolution.is_fail_closed() {
        metrics::counter!(SCAN_FAIL_CLOSED_TOTAL).increment(1);
    }

    let reported = report(&resolution, &rules, state);
    let violations: Vec<Violation> = reported
        .iter()
        .map(|v| Violation {
            org_id: actor.org_id.clone(),
            rule_id: v.rule_id.clone(),
            rule_name: v.rule_name.clone(),
            category: v.category,
            severity: v.severity,
            matched_text: v.matched_text.clone(),
            user_id: actor.user_id.clone(),
            content_id: request.content_id.clone(),
            action_taken: v.action_taken,
            created_at: Utc::now(),
        })
        .collect();

    let record_ids = match state.recorder.record_all(violations).await {
        Ok(ids) => ids,
        Err(err) => {
            metrics::counter!(RECORDING_FAILURES_TOTAL).increment(1);
            error!(
                org = %actor.org_id,
                actor = %actor.user_id,
                "Violation recording failed, rejecting scan: {}",
                err
            );
            return Err(err.into());
        }
    };

    metrics::histogram!(SCAN_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    info!(
        org = %actor.org_id,
        actor = %actor.user_id,
        action = %resolution.final_action,
        violations = record_ids.len(),
        "Scan resolved"
    );

    Ok(ScanResponse {
        passed: resolution.passed(),
        final_action: resolution.final_action,
        violations: reported,
        sanitized_content: resolution.sanitized_content,
        placeholder_collisions: resolution.placeholder_collisions,
        failure: resolution.failure,
        record_ids,
        rules_evaluated,
        snapshot_version: rules.version(),
    })
}

/// Violations to record for a resolution.
///
/// A fail-closed scan also records the rule it failed on, unless that rule
/// already has a finding, so the block has an audit trail.
fn report(resolution: &Resolution, rules: &RuleSet, state: &AppState) -> Vec<ReportedViolation> {
    let mut reported: Vec<ReportedViolation> = resolution
        .findings
        .iter()
        .map(|r| ReportedViolation {
            rule_id: r.finding.rule_id.clone(),
            rule_name: r.finding.rule_name.clone(),
            category: r.finding.category,
            severity: r.finding.severity,
            matched_text: state.redaction.apply(&r.finding.matched_text),
            action_taken: r.action_taken,
        })
        .collect();

    let failed_on = resolution
        .failure
        .as_ref()
        .and_then(|f| f.rule_id.as_ref())
        .filter(|id| !reported.iter().any(|v| &v.rule_id == *id))
        .and_then(|id| rules.get(id));
    if let Some(compiled) = failed_on {
        reported.push(ReportedViolation {
            rule_id: compiled.rule.id.clone(),
            rule_name: compiled.rule.name.clone(),
            category: compiled.rule.category,
            severity: compiled.rule.severity,
            matched_text: String::new(),
            action_taken: ActionTaken::Blocked,
        });
    }

    reported
}
