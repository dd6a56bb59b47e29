use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

/// Engine tunables. Every field has a default, so a TOML file only needs the
/// keys it wants to change.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on concurrent probes within one job.
    pub max_workers_per_job: usize,
    /// Overrides the scan profile's per-probe timeout when set.
    pub probe_timeout_ms: Option<u64>,
    /// Process-wide ceiling on jobs in the `running` state.
    pub max_active_jobs: usize,
    /// Terminal jobs retained for polling and history.
    pub history_cap: usize,
    /// Entries kept by the common-services stage.
    pub top_services: usize,
    /// A target with more open ports than this is reported as an anomaly.
    pub open_port_threshold: usize,
    /// Standard deviations above the mean open-port count that count as an outlier.
    pub z_threshold: f64,
    /// Comprehensive scans with more targets than this are run with the standard profile.
    pub downgrade_comprehensive_above: Option<usize>,
    /// Shortest CIDR prefix accepted in a target spec.
    pub max_cidr_prefix: u8,
    /// Directory for JSON result documents. No persistence when unset.
    pub results_dir: Option<PathBuf>,
    pub bind: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers_per_job: 256,
            probe_timeout_ms: None,
            max_active_jobs: 4,
            history_cap: 100,
            top_services: 10,
            open_port_threshold: 10,
            z_threshold: 2.0,
            downgrade_comprehensive_above: Some(10),
            max_cidr_prefix: 16,
            results_dir: None,
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: EngineConfig =
            toml::from_str(s).map_err(|e| ScanError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_workers_per_job == 0 {
            return Err(ScanError::Config("max_workers_per_job must be > 0".into()));
        }
        if self.max_active_jobs == 0 {
            return Err(ScanError::Config("max_active_jobs must be > 0".into()));
        }
        if self.max_cidr_prefix > 32 {
            return Err(ScanError::Config(format!(
                "max_cidr_prefix out of range: {}",
                self.max_cidr_prefix
            )));
        }
        if !(self.z_threshold.is_finite() && self.z_threshold > 0.0) {
            return Err(ScanError::Config("z_threshold must be positive".into()));
        }
        Ok(())
    }

    pub fn probe_timeout_override(&self) -> Option<Duration> {
        self.probe_timeout_ms.map(Duration::from_millis)
    }
}
