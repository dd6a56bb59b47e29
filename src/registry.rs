//! Process-wide job table.
//!
//! The registry owns every job for its lifetime, spawns one coordinator task
//! per accepted request and keeps a bounded history of terminal jobs (oldest
//! evicted first). Running and pending jobs are never evicted.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{Notify, RwLock, Semaphore};
use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::AnalysisPipeline;
use crate::config::EngineConfig;
use crate::error::{Result, ScanError};
use crate::job::ScanJob;
use crate::plan::ResolvedPlan;
use crate::prober::Prober;
use crate::scanner::{self, ScanContext};
use crate::store::ResultStore;
use crate::telemetry::{now_rfc3339, EngineEvent, EventSink, TracingSink};
use crate::types::{HistoryEntry, JobState, ResultDocument, ScanRequest, StatusReport};

pub struct JobRegistry {
    cfg: EngineConfig,
    ctx: ScanContext,
    store: Option<Arc<dyn ResultStore>>,
    active: Arc<Semaphore>,
    inner: RwLock<RegistryInner>,
    settled: Notify,
}

#[derive(Default)]
struct RegistryInner {
    jobs: HashMap<String, Arc<ScanJob>>,
    /// Terminal job ids in the order they finished.
    terminal: VecDeque<String>,
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("cfg", &self.cfg)
            .field("ctx", &self.ctx)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

impl JobRegistry {
    pub fn new(cfg: EngineConfig, prober: Arc<dyn Prober>) -> Self {
        let ctx = ScanContext {
            prober,
            pipeline: Arc::new(AnalysisPipeline::standard(&cfg)),
            events: Arc::new(TracingSink),
            max_workers: cfg.max_workers_per_job,
        };
        Self {
            active: Arc::new(Semaphore::new(cfg.max_active_jobs.max(1))),
            cfg,
            ctx,
            store: None,
            inner: RwLock::new(RegistryInner::default()),
            settled: Notify::new(),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.ctx.events = events;
        self
    }

    pub fn with_pipeline(mut self, pipeline: AnalysisPipeline) -> Self {
        self.ctx.pipeline = Arc::new(pipeline);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Validate a request and start it. Request errors surface here and no job
    /// is created.
    pub async fn submit(self: &Arc<Self>, req: &ScanRequest) -> Result<String> {
        let plan = ResolvedPlan::from_request(req, &self.cfg)?;
        Ok(self.start(plan).await)
    }

    /// Register a plan and spawn its coordinator. Returns without waiting.
    pub async fn start(self: &Arc<Self>, plan: ResolvedPlan) -> String {
        let job = self.create(plan).await;
        let id = job.id().to_string();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let cancel = job.cancel_token();
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = this.active.clone().acquire_owned() => permit.ok(),
            };
            match permit {
                Some(permit) => {
                    scanner::run_job(job.clone(), this.ctx.clone()).await;
                    drop(permit);
                }
                // Cancelled while queued for an active slot.
                None => {
                    scanner::cancel_pending(&job, &this.ctx).await;
                }
            }
            this.settle(&job).await;
        });
        id
    }

    /// Insert a `Pending` job under a fresh id.
    pub async fn create(&self, plan: ResolvedPlan) -> Arc<ScanJob> {
        let id = Uuid::new_v4().to_string();
        let (targets, ports) = (plan.targets().len(), plan.ports().len());
        let job = Arc::new(ScanJob::new(id.clone(), plan));
        self.inner.write().await.jobs.insert(id.clone(), job.clone());
        info!(job_id = %id, targets, ports, "job created");
        self.ctx.events.emit(EngineEvent::JobCreated {
            job_id: id,
            timestamp: now_rfc3339(),
            targets,
            ports,
        });
        job
    }

    pub async fn get(&self, id: &str) -> Result<Arc<ScanJob>> {
        self.inner
            .read()
            .await
            .jobs
            .get(id)
            .cloned()
            .ok_or_else(|| ScanError::NotFound(id.to_string()))
    }

    pub async fn status(&self, id: &str) -> Result<StatusReport> {
        Ok(self.get(id).await?.status().await)
    }

    /// Live or final document. Jobs already evicted from memory are looked up
    /// in the result store when one is configured.
    pub async fn results(&self, id: &str) -> Result<ResultDocument> {
        match self.get(id).await {
            Ok(job) => Ok(job.document().await),
            Err(not_found) => match &self.store {
                Some(store) => store.load(id).await?.ok_or(not_found),
                None => Err(not_found),
            },
        }
    }

    /// Best-effort cancel. A no-op for terminal jobs.
    pub async fn cancel(&self, id: &str) -> Result<StatusReport> {
        let job = self.get(id).await?;
        if !job.state().await.is_terminal() {
            info!(job_id = %id, "cancel requested");
            job.cancel();
        }
        Ok(job.status().await)
    }

    /// Wait until the job is terminal and its bookkeeping (history, store) is done.
    pub async fn wait(&self, id: &str) -> Result<JobState> {
        let job = self.get(id).await?;
        loop {
            let notified = self.settled.notified();
            if self.is_settled(id).await {
                return Ok(job.state().await);
            }
            notified.await;
        }
    }

    /// Terminal job summaries, most recent first.
    pub async fn history(&self, limit: usize) -> Vec<HistoryEntry> {
        let jobs: Vec<Arc<ScanJob>> = {
            let inner = self.inner.read().await;
            inner
                .terminal
                .iter()
                .rev()
                .take(limit)
                .filter_map(|id| inner.jobs.get(id).cloned())
                .collect()
        };
        let mut out = Vec::with_capacity(jobs.len());
        for job in jobs {
            out.push(job.history_entry().await);
        }
        out
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn is_settled(&self, id: &str) -> bool {
        let inner = self.inner.read().await;
        !inner.jobs.contains_key(id) || inner.terminal.iter().any(|t| t == id)
    }

    async fn settle(&self, job: &ScanJob) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&job.document().await).await {
                warn!(job_id = %job.id(), error = %e, "failed to persist result document");
            }
        }

        let evicted = {
            let mut inner = self.inner.write().await;
            inner.terminal.push_back(job.id().to_string());
            let mut evicted = Vec::new();
            while inner.terminal.len() > self.cfg.history_cap {
                if let Some(old) = inner.terminal.pop_front() {
                    inner.jobs.remove(&old);
                    evicted.push(old);
                }
            }
            evicted
        };
        for id in evicted {
            info!(job_id = %id, "evicted from history");
        }
        self.settled.notify_waiters();
    }
}
