use std::time::Duration;

use tracing::info;

use crate::config::EngineConfig;
use crate::error::{Result, ScanError};
use crate::ports;
use crate::targets;
use crate::types::{ScanRequest, ScanType};

/// Immutable (targets x ports) matrix for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPlan {
    targets: Vec<String>,
    ports: Vec<u16>,
    scan_type: ScanType,
    probe_timeout: Duration,
}

impl ResolvedPlan {
    pub fn new(
        targets: Vec<String>,
        ports: Vec<u16>,
        scan_type: ScanType,
        probe_timeout: Duration,
    ) -> Result<Self> {
        if targets.is_empty() {
            return Err(ScanError::EmptyPlan("no targets".into()));
        }
        if ports.is_empty() {
            return Err(ScanError::EmptyPlan("no ports".into()));
        }
        if ports.contains(&0) {
            return Err(ScanError::InvalidPort("port 0 is not scannable".into()));
        }
        Ok(Self {
            targets,
            ports,
            scan_type,
            probe_timeout,
        })
    }

    /// Validate a request and derive its plan. Fails before any job exists.
    pub fn from_request(req: &ScanRequest, cfg: &EngineConfig) -> Result<Self> {
        let targets = targets::expand_with_limit(&req.targets, cfg.max_cidr_prefix)?;

        let mut scan_type = req.scan_type;
        if scan_type == ScanType::Comprehensive {
            if let Some(limit) = cfg.downgrade_comprehensive_above {
                if targets.len() > limit {
                    info!(
                        targets = targets.len(),
                        limit, "downgrading comprehensive scan to standard"
                    );
                    scan_type = ScanType::Standard;
                }
            }
        }

        let ports = ports::resolve(scan_type, req.custom_ports.as_deref())?;
        let timeout = cfg
            .probe_timeout_override()
            .unwrap_or_else(|| scan_type.default_timeout());
        Self::new(targets, ports, scan_type, timeout)
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    pub fn scan_type(&self) -> ScanType {
        self.scan_type
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    pub fn total_work(&self) -> u64 {
        self.targets.len() as u64 * self.ports.len() as u64
    }

    /// Work units in dispatch order: target-major, port-minor.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, u16)> + '_ {
        self.targets
            .iter()
            .flat_map(move |t| self.ports.iter().map(move |&p| (t.as_str(), p)))
    }
}
