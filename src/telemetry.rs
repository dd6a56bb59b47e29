//! Lifecycle events emitted by the engine.
//!
//! Export is someone else's job: the engine hands each event to an
//! [`EventSink`]. The default sink turns events into `tracing` records under
//! the `scan_events` target so any subscriber layer can ship them.

use serde::Serialize;
use time::{format_description::well_known, OffsetDateTime};
use tracing::{debug, info};

use crate::types::{JobState, PortStatus};

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    JobCreated {
        job_id: String,
        timestamp: String,
        targets: usize,
        ports: usize,
    },
    ProbeOutcomeRecorded {
        job_id: String,
        timestamp: String,
        target: String,
        port: u16,
        status: PortStatus,
    },
    AnalysisCompleted {
        job_id: String,
        timestamp: String,
        insights: usize,
    },
    JobCompleted {
        job_id: String,
        timestamp: String,
        state: JobState,
    },
}

impl EngineEvent {
    pub fn job_id(&self) -> &str {
        match self {
            EngineEvent::JobCreated { job_id, .. }
            | EngineEvent::ProbeOutcomeRecorded { job_id, .. }
            | EngineEvent::AnalysisCompleted { job_id, .. }
            | EngineEvent::JobCompleted { job_id, .. } => job_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::JobCreated { .. } => "job_created",
            EngineEvent::ProbeOutcomeRecorded { .. } => "probe_outcome_recorded",
            EngineEvent::AnalysisCompleted { .. } => "analysis_completed",
            EngineEvent::JobCompleted { .. } => "job_completed",
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Writes events as structured log records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: EngineEvent) {
        match &event {
            // One per probe; keep it out of the default log level.
            EngineEvent::ProbeOutcomeRecorded {
                job_id,
                timestamp,
                target,
                port,
                status,
            } => debug!(
                target: "scan_events",
                event = event.name(),
                job_id = %job_id,
                timestamp = %timestamp,
                host = %target,
                port,
                ?status
            ),
            other => info!(
                target: "scan_events",
                event = other.name(),
                job_id = %other.job_id(),
                payload = %serde_json::to_string(other).unwrap_or_default()
            ),
        }
    }
}

/// RFC 3339 UTC timestamp.
pub fn now_rfc3339() -> String {
    format_rfc3339(OffsetDateTime::now_utc())
}

pub fn format_rfc3339(ts: OffsetDateTime) -> String {
    ts.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
