#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scan_orchestrator::config::EngineConfig;
use scan_orchestrator::prober::Prober;
use scan_orchestrator::telemetry::{EngineEvent, EventSink};
use scan_orchestrator::types::{PortOutcome, PortStatus};
use scan_orchestrator::{JobRegistry, ScanError};

/// Answers from a fixed table; every unlisted pair is `closed`.
#[derive(Default)]
pub struct ScriptedProber {
    pub open: HashSet<(String, u16)>,
    pub unresolvable: HashSet<String>,
    pub panic_on: HashSet<u16>,
    pub hang_on: HashSet<u16>,
    pub delay: Duration,
    pub resolve_delay: Duration,
}

impl ScriptedProber {
    pub fn all_closed() -> Self {
        Self::default()
    }

    pub fn with_open(mut self, target: &str, ports: &[u16]) -> Self {
        for &p in ports {
            self.open.insert((target.to_string(), p));
        }
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_resolve_delay(mut self, delay: Duration) -> Self {
        self.resolve_delay = delay;
        self
    }

    pub fn unresolvable(mut self, name: &str) -> Self {
        self.unresolvable.insert(name.to_string());
        self
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn resolve(&self, target: &str) -> scan_orchestrator::Result<IpAddr> {
        if !self.resolve_delay.is_zero() {
            tokio::time::sleep(self.resolve_delay).await;
        }
        if self.unresolvable.contains(target) {
            return Err(ScanError::JobSetup(format!("cannot resolve {target}")));
        }
        Ok(target
            .parse()
            .unwrap_or(IpAddr::from([127, 0, 0, 1])))
    }

    async fn probe(&self, target: &str, _addr: IpAddr, port: u16, _timeout: Duration) -> PortOutcome {
        if self.panic_on.contains(&port) {
            panic!("backend blew up on port {port}");
        }
        if self.hang_on.contains(&port) {
            std::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let status = if self.open.contains(&(target.to_string(), port)) {
            PortStatus::Open
        } else {
            PortStatus::Closed
        };
        PortOutcome::new(target, port, status).with_latency(1)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl RecordingSink {
    pub fn names_for(&self, job_id: &str) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.job_id() == job_id)
            .map(EngineEvent::name)
            .collect()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        probe_timeout_ms: Some(200),
        max_workers_per_job: 8,
        ..EngineConfig::default()
    }
}

pub fn registry(prober: ScriptedProber) -> Arc<JobRegistry> {
    Arc::new(JobRegistry::new(test_config(), Arc::new(prober)))
}
