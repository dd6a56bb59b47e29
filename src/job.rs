//! Scan job state machine.
//!
//! A job moves `Pending -> Running -> {Completed | Cancelled}` or ends in
//! `Error` when setup fails. All mutation goes through one `RwLock`, so a
//! reader always sees outcomes, progress and state from the same instant.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use time::OffsetDateTime;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::analysis::ResultAggregate;
use crate::plan::ResolvedPlan;
use crate::telemetry::format_rfc3339;
use crate::types::{
    HistoryEntry, Insight, JobState, PortEntry, PortOutcome, PortStatus, ResultDocument,
    StatusReport, TargetResult,
};

#[derive(Debug)]
pub struct ScanJob {
    id: String,
    plan: ResolvedPlan,
    cancel: CancellationToken,
    inner: RwLock<JobInner>,
}

#[derive(Debug)]
struct JobInner {
    state: JobState,
    created_at: OffsetDateTime,
    created: Instant,
    ended_at: Option<OffsetDateTime>,
    ended: Option<Instant>,
    outcomes: HashMap<(String, u16), PortOutcome>,
    progress: f64,
    error: Option<String>,
    insights: Option<Vec<Insight>>,
}

impl ScanJob {
    pub fn new(id: impl Into<String>, plan: ResolvedPlan) -> Self {
        Self {
            id: id.into(),
            plan,
            cancel: CancellationToken::new(),
            inner: RwLock::new(JobInner {
                state: JobState::Pending,
                created_at: OffsetDateTime::now_utc(),
                created: Instant::now(),
                ended_at: None,
                ended: None,
                outcomes: HashMap::new(),
                progress: 0.0,
                error: None,
                insights: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn plan(&self) -> &ResolvedPlan {
        &self.plan
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop dispatching new probes. In-flight probes finish on their own.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn state(&self) -> JobState {
        self.inner.read().await.state
    }

    /// `Pending -> Running`. Returns false if the job already left `Pending`.
    pub async fn mark_running(&self) -> bool {
        let mut inner = self.inner.write().await;
        if inner.state != JobState::Pending {
            return false;
        }
        inner.state = JobState::Running;
        true
    }

    /// Record one outcome and advance progress in the same critical section.
    /// Returns false for a duplicate pair or a job that is not running.
    pub async fn record(&self, outcome: PortOutcome) -> bool {
        let total = self.plan.total_work();
        let mut inner = self.inner.write().await;
        if inner.state != JobState::Running {
            return false;
        }
        let key = (outcome.target.clone(), outcome.port);
        if inner.outcomes.contains_key(&key) {
            return false;
        }
        inner.outcomes.insert(key, outcome);
        let pct = inner.outcomes.len() as f64 / total as f64 * 100.0;
        // Never move backwards, even under float rounding.
        inner.progress = inner.progress.max(pct.min(100.0));
        true
    }

    /// Snapshot of the outcomes recorded so far.
    pub async fn aggregate(&self) -> ResultAggregate {
        let inner = self.inner.read().await;
        ResultAggregate::from_outcomes(self.plan.targets(), inner.outcomes.values().cloned())
    }

    /// Terminal transition after the last probe drained. Insights, end time and
    /// state become visible together.
    pub async fn finish(&self, insights: Vec<Insight>, cancelled: bool) -> JobState {
        let mut inner = self.inner.write().await;
        if inner.state.is_terminal() {
            return inner.state;
        }
        let state = if cancelled {
            JobState::Cancelled
        } else {
            JobState::Completed
        };
        if state == JobState::Completed {
            inner.progress = 100.0;
        }
        inner.state = state;
        inner.insights = Some(insights);
        inner.ended_at = Some(OffsetDateTime::now_utc());
        inner.ended = Some(Instant::now());
        inner.state
    }

    /// Setup failure. Terminal.
    pub async fn fail(&self, message: impl Into<String>) {
        let mut inner = self.inner.write().await;
        if inner.state.is_terminal() {
            return;
        }
        inner.state = JobState::Error;
        inner.error = Some(message.into());
        inner.ended_at = Some(OffsetDateTime::now_utc());
        inner.ended = Some(Instant::now());
    }

    pub async fn status(&self) -> StatusReport {
        let inner = self.inner.read().await;
        StatusReport {
            scan_id: self.id.clone(),
            state: inner.state,
            progress: inner.progress,
            elapsed_seconds: inner.elapsed().as_secs_f64(),
            error: inner.error.clone(),
        }
    }

    /// Result document; partial while running, final once terminal.
    pub async fn document(&self) -> ResultDocument {
        let inner = self.inner.read().await;
        let mut results: BTreeMap<String, TargetResult> = self
            .plan
            .targets()
            .iter()
            .map(|t| (t.clone(), TargetResult::default()))
            .collect();
        for o in inner.outcomes.values() {
            results.entry(o.target.clone()).or_default().ports.insert(
                o.port,
                PortEntry {
                    status: o.status,
                    service: o.service.clone(),
                },
            );
        }
        ResultDocument {
            scan_id: self.id.clone(),
            state: inner.state,
            targets: self.plan.targets().to_vec(),
            scan_type: self.plan.scan_type(),
            ports: self.plan.ports().to_vec(),
            start_time: format_rfc3339(inner.created_at),
            end_time: inner.ended_at.map(format_rfc3339),
            duration: inner.ended.map(|e| (e - inner.created).as_secs_f64()),
            results,
            insights: inner.insights.clone(),
            error: inner.error.clone(),
        }
    }

    pub async fn history_entry(&self) -> HistoryEntry {
        let inner = self.inner.read().await;
        HistoryEntry {
            scan_id: self.id.clone(),
            datetime: format_rfc3339(inner.created_at),
            targets: self.plan.targets().iter().take(3).cloned().collect(),
            target_count: self.plan.targets().len(),
            open_ports: inner
                .outcomes
                .values()
                .filter(|o| o.status == PortStatus::Open)
                .count(),
            state: inner.state,
        }
    }
}

impl JobInner {
    fn elapsed(&self) -> Duration {
        match self.ended {
            Some(end) => end - self.created,
            None => self.created.elapsed(),
        }
    }
}
