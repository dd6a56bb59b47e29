use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analysis::AnalysisPipeline;
use crate::error::ScanError;
use crate::job::ScanJob;
use crate::prober::Prober;
use crate::telemetry::{now_rfc3339, EngineEvent, EventSink};
use crate::types::{JobState, PortOutcome, PortStatus};

/// Slack on top of the probe timeout before the coordinator stops waiting for
/// a probe and records it as `filtered`.
const PROBE_GRACE: Duration = Duration::from_millis(250);

/// Upper bound on resolving one target name during setup.
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Collaborators one coordinator run needs.
#[derive(Clone)]
pub struct ScanContext {
    pub prober: Arc<dyn Prober>,
    pub pipeline: Arc<AnalysisPipeline>,
    pub events: Arc<dyn EventSink>,
    /// Upper bound on concurrent probes for this job.
    pub max_workers: usize,
}

impl std::fmt::Debug for ScanContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanContext")
            .field("prober", &self.prober.name())
            .field("pipeline", &self.pipeline)
            .field("max_workers", &self.max_workers)
            .finish()
    }
}

/// Worker count for a job: one per work unit, capped.
pub fn pool_size(total_work: u64, cap: usize) -> usize {
    let cap = cap.clamp(1, 5_000);
    usize::try_from(total_work).unwrap_or(usize::MAX).clamp(1, cap)
}

/// Outcome of the setup phase.
enum Setup {
    Resolved(Vec<(String, IpAddr)>),
    Cancelled,
}

/// Drive one job from `Pending` to a terminal state.
///
/// - Resolves every target first, concurrently and abandoning the lookups on
///   cancel; a failure there puts the job in `Error`.
/// - Limits concurrent probes using a `Semaphore` and runs them in a `JoinSet`.
/// - Dispatches target-major, port-minor, checking the job's cancel token
///   between dispatches. In-flight probes are always allowed to finish.
/// - Wraps each probe in a hard timeout so a misbehaving backend cannot stall
///   the job; every dispatched pair records exactly one outcome.
/// - Runs the analysis pipeline before the terminal state becomes visible.
pub async fn run_job(job: Arc<ScanJob>, ctx: ScanContext) -> JobState {
    let plan = job.plan();
    let total = plan.total_work();
    let timeout = plan.probe_timeout();

    if job.is_cancelled() {
        return cancel_pending(&job, &ctx).await;
    }

    let cancel = job.cancel_token();
    let workers = pool_size(total, ctx.max_workers);
    let setup = resolve_targets(&ctx.prober, plan.targets(), &cancel, workers).await;
    let resolved = match setup {
        Ok(Setup::Resolved(r)) => r,
        Ok(Setup::Cancelled) => {
            info!(job_id = %job.id(), "cancelled during setup");
            return cancel_pending(&job, &ctx).await;
        }
        Err(e) => {
            warn!(job_id = %job.id(), error = %e, "job setup failed");
            job.fail(e.to_string()).await;
            return complete(&job, &ctx, JobState::Error);
        }
    };

    if !job.mark_running().await {
        return job.state().await;
    }

    info!(
        job_id = %job.id(),
        targets = plan.targets().len(),
        ports = plan.ports().len(),
        workers,
        prober = ctx.prober.name(),
        "scan started"
    );

    let sem = Arc::new(Semaphore::new(workers));
    let mut set = JoinSet::new();
    let mut dispatched: u64 = 0;

    'dispatch: for (target, addr) in &resolved {
        for &port in plan.ports() {
            if cancel.is_cancelled() {
                break 'dispatch;
            }
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'dispatch,
                permit = sem.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break 'dispatch,
                },
            };

            let job = job.clone();
            let prober = ctx.prober.clone();
            let events = ctx.events.clone();
            let target = target.clone();
            let addr = *addr;

            set.spawn(async move {
                let _permit = permit; // keep permit until task completes
                let outcome = probe_once(prober, &target, addr, port, timeout).await;
                let status = outcome.status;
                if job.record(outcome).await {
                    events.emit(EngineEvent::ProbeOutcomeRecorded {
                        job_id: job.id().to_string(),
                        timestamp: now_rfc3339(),
                        target,
                        port,
                        status,
                    });
                }
            });
            dispatched += 1;

            while let Some(res) = set.try_join_next() {
                log_join_error(res);
            }
        }
    }

    while let Some(res) = set.join_next().await {
        log_join_error(res);
    }

    let cancelled = dispatched < total;
    if cancelled {
        info!(job_id = %job.id(), dispatched, total, "scan cancelled");
    }

    let aggregate = job.aggregate().await;
    let insights = ctx.pipeline.run(&aggregate);
    ctx.events.emit(EngineEvent::AnalysisCompleted {
        job_id: job.id().to_string(),
        timestamp: now_rfc3339(),
        insights: insights.len(),
    });

    let state = job.finish(insights, cancelled).await;
    info!(
        job_id = %job.id(),
        ?state,
        outcomes = aggregate.len(),
        "scan finished"
    );
    complete(&job, &ctx, state)
}

/// End a job that was cancelled before any probe was dispatched.
pub async fn cancel_pending(job: &ScanJob, ctx: &ScanContext) -> JobState {
    let state = job.finish(Vec::new(), true).await;
    complete(job, ctx, state)
}

fn complete(job: &ScanJob, ctx: &ScanContext, state: JobState) -> JobState {
    ctx.events.emit(EngineEvent::JobCompleted {
        job_id: job.id().to_string(),
        timestamp: now_rfc3339(),
        state,
    });
    state
}

/// Resolve every target with at most `workers` lookups in flight. Returns as
/// soon as the job is cancelled or any lookup fails.
async fn resolve_targets(
    prober: &Arc<dyn Prober>,
    targets: &[String],
    cancel: &CancellationToken,
    workers: usize,
) -> Result<Setup, ScanError> {
    let sem = Arc::new(Semaphore::new(workers.max(1)));
    let mut set = JoinSet::new();
    for (idx, target) in targets.iter().enumerate() {
        let prober = prober.clone();
        let sem = sem.clone();
        let target = target.clone();
        set.spawn(async move {
            let _permit = sem
                .acquire_owned()
                .await
                .map_err(|e| ScanError::JobSetup(e.to_string()))?;
            match time::timeout(RESOLVE_TIMEOUT, prober.resolve(&target)).await {
                Ok(res) => res.map(|addr| (idx, addr)),
                Err(_) => Err(ScanError::JobSetup(format!("timed out resolving {target}"))),
            }
        });
    }

    let mut addrs: Vec<Option<IpAddr>> = vec![None; targets.len()];
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                set.abort_all();
                return Ok(Setup::Cancelled);
            }
            next = set.join_next() => next,
        };
        match next {
            None => break,
            Some(Ok(Ok((idx, addr)))) => addrs[idx] = Some(addr),
            Some(Ok(Err(e))) => {
                set.abort_all();
                return Err(e);
            }
            Some(Err(e)) => {
                set.abort_all();
                return Err(ScanError::JobSetup(e.to_string()));
            }
        }
    }

    targets
        .iter()
        .zip(addrs)
        .map(|(t, addr)| {
            addr.map(|a| (t.clone(), a))
                .ok_or_else(|| ScanError::JobSetup(format!("no address for {t}")))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Setup::Resolved)
}

/// Run the backend probe in its own task so a panic or hang becomes an
/// outcome instead of a lost work unit.
async fn probe_once(
    prober: Arc<dyn Prober>,
    target: &str,
    addr: IpAddr,
    port: u16,
    timeout: Duration,
) -> PortOutcome {
    let owned = target.to_string();
    let mut handle =
        tokio::spawn(async move { prober.probe(&owned, addr, port, timeout).await });

    match time::timeout(timeout + PROBE_GRACE, &mut handle).await {
        Ok(Ok(mut outcome)) => {
            // Key the outcome by the dispatched pair, whatever the backend echoed.
            outcome.target = target.to_string();
            outcome.port = port;
            outcome
        }
        Ok(Err(e)) => PortOutcome::new(target, port, PortStatus::Error)
            .with_error(ScanError::Probe(e.to_string()).to_string()),
        Err(_) => {
            handle.abort();
            debug!(host = target, port, "probe exceeded hard timeout");
            PortOutcome::new(target, port, PortStatus::Filtered)
        }
    }
}

fn log_join_error(res: Result<(), JoinError>) {
    if let Err(e) = res {
        warn!(error = %e, "probe worker failed");
    }
}
