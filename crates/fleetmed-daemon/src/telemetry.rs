use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct TelemetryState {
    ingest_accepted_total: u64,
    ingest_rejected_total: BTreeMap<String, u64>,
    auth_failures_total: BTreeMap<String, u64>,
    query_requests_total: BTreeMap<String, u64>,
    records_disclosed_total: u64,
}

/// In-process counters for the daemon's two surfaces. Security events
/// additionally go to the structured log at the point of failure.
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    state: Arc<Mutex<TelemetryState>>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_ingest_accepted(&self) {
        let mut guard = self.state.lock();
        guard.ingest_accepted_total = guard.ingest_accepted_total.saturating_add(1);
    }

    pub fn record_ingest_rejected(&self, reason: &str) {
        let mut guard = self.state.lock();
        let entry = guard
            .ingest_rejected_total
            .entry(reason.to_string())
            .or_insert(0);
        *entry = entry.saturating_add(1);
    }

    pub fn record_auth_failure(&self, kind: &str) {
        let mut guard = self.state.lock();
        let entry = guard
            .auth_failures_total
            .entry(kind.to_string())
            .or_insert(0);
        *entry = entry.saturating_add(1);
    }

    pub fn record_query(&self, role: &str, records_disclosed: u64) {
        let mut guard = self.state.lock();
        let entry = guard
            .query_requests_total
            .entry(role.to_string())
            .or_insert(0);
        *entry = entry.saturating_add(1);
        guard.records_disclosed_total = guard
            .records_disclosed_total
            .saturating_add(records_disclosed);
    }

    /// Render counters in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let guard = self.state.lock();
        let mut out = String::new();
        let _ = writeln!(
            out,
            "fleetmed_ingest_accepted_total {}",
            guard.ingest_accepted_total
        );
        for (reason, count) in &guard.ingest_rejected_total {
            let _ = writeln!(
                out,
                "fleetmed_ingest_rejected_total{{reason=\"{reason}\"}} {count}"
            );
        }
        for (kind, count) in &guard.auth_failures_total {
            let _ = writeln!(out, "fleetmed_auth_failures_total{{kind=\"{kind}\"}} {count}");
        }
        for (role, count) in &guard.query_requests_total {
            let _ = writeln!(
                out,
                "fleetmed_query_requests_total{{role=\"{role}\"}} {count}"
            );
        }
        let _ = writeln!(
            out,
            "fleetmed_records_disclosed_total {}",
            guard.records_disclosed_total
        );
        out
    }
}
