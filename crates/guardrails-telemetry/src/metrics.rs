//! Metric names and descriptions
//!
//! The engine emits through the `metrics` facade; call [`describe`] once
//! after installing a recorder so exporters carry help text.

use metrics::{describe_counter, describe_histogram, Unit};

pub const SCANS_TOTAL: &str = "guardrails_scans_total";
pub const FINDINGS_TOTAL: &str = "guardrails_findings_total";
pub const SCAN_TIMEOUTS_TOTAL: &str = "guardrails_scan_timeouts_total";
pub const SCAN_FAIL_CLOSED_TOTAL: &str = "guardrails_scan_fail_closed_total";
pub const SCAN_DURATION_SECONDS: &str = "guardrails_scan_duration_seconds";
pub const VIOLATIONS_RECORDED_TOTAL: &str = "guardrails_violations_recorded_total";
pub const RECORDING_FAILURES_TOTAL: &str = "guardrails_recording_failures_total";

/// Register descriptions for every metric the engine emits
pub fn describe() {
    describe_counter!(SCANS_TOTAL, "Completed scans");
    describe_counter!(FINDINGS_TOTAL, "Rule findings, by severity");
    describe_counter!(
        SCAN_TIMEOUTS_TOTAL,
        "Scans aborted because a rule exceeded its budget"
    );
    describe_counter!(
        SCAN_FAIL_CLOSED_TOTAL,
        "Scans resolved as blocked because no definitive verdict was reached"
    );
    describe_histogram!(
        SCAN_DURATION_SECONDS,
        Unit::Seconds,
        "Wall-clock time of scan plus resolution"
    );
    describe_counter!(
        VIOLATIONS_RECORDED_TOTAL,
        "Violations appended to the ledger, by action"
    );
    describe_counter!(
        RECORDING_FAILURES_TOTAL,
        "Ledger writes that failed"
    );
}
