//! Violation recorder interface
//!
//! The audit ledger is append-only. A failed write is always returned to
//! the caller as [`Error::Recording`]; it is never logged and dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guardrails_core::types::generate_id;
use guardrails_core::{Error, OrgId, RecordId, RecordedViolation, Result, Violation};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Prefix of every violation record id
pub const RECORD_ID_PREFIX: &str = "vio";

/// Storage for violation records
#[async_trait]
pub trait ViolationRecorder: Send + Sync {
    /// Append one violation; the returned id is stable
    async fn record(&self, violation: Violation) -> Result<RecordId>;

    /// Number of violations recorded for an org at or after `since`
    async fn count_since(&self, org_id: &OrgId, since: DateTime<Utc>) -> Result<u64>;

    /// Most recent violations for an org, newest first
    async fn recent(&self, org_id: &OrgId, limit: usize) -> Result<Vec<RecordedViolation>>;

    /// Append several violations in order, stopping at the first failure
    async fn record_all(&self, violations: Vec<Violation>) -> Result<Vec<RecordId>> {
        let mut ids = Vec::with_capacity(violations.len());
        for violation in violations {
            ids.push(self.record(violation).await?);
        }
        Ok(ids)
    }
}

pub(crate) fn new_record_id() -> RecordId {
    generate_id(RECORD_ID_PREFIX)
}

pub(crate) fn count_recorded(violation: &Violation) {
    metrics::counter!(
        crate::metrics::VIOLATIONS_RECORDED_TOTAL,
        "action" => violation.action_taken.to_string()
    )
    .increment(1);
}

/// In-process recorder for tests and single-node deployments without a ledger
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    records: RwLock<Vec<RecordedViolation>>,
    failing: AtomicBool,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `record` fail, simulating a storage outage
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All records in write order
    pub fn records(&self) -> Vec<RecordedViolation> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl ViolationRecorder for MemoryRecorder {
    async fn record(&self, violation: Violation) -> Result<RecordId> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::recording("memory recorder is unavailable"));
        }

        let id = new_record_id();
        debug!(id = %id, org = %violation.org_id, rule = %violation.rule_id, "Recorded violation");
        count_recorded(&violation);
        self.records.write().push(RecordedViolation {
            id: id.clone(),
            violation,
        });
        Ok(id)
    }

    async fn count_since(&self, org_id: &OrgId, since: DateTime<Utc>) -> Result<u64> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| &r.violation.org_id == org_id && r.violation.created_at >= since)
            .count() as u64)
    }

    async fn recent(&self, org_id: &OrgId, limit: usize) -> Result<Vec<RecordedViolation>> {
        Ok(self
            .records
            .read()
            .iter()
            .rev()
            .filter(|r| &r.violation.org_id == org_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
