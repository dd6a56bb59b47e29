use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Named port profile a scan request selects.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanType {
    Quick,
    #[default]
    Standard,
    Comprehensive,
    Custom,
}

impl ScanType {
    pub const ALL: [ScanType; 4] = [
        ScanType::Quick,
        ScanType::Standard,
        ScanType::Comprehensive,
        ScanType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanType::Quick => "quick",
            ScanType::Standard => "standard",
            ScanType::Comprehensive => "comprehensive",
            ScanType::Custom => "custom",
        }
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quick" => Ok(ScanType::Quick),
            "standard" => Ok(ScanType::Standard),
            "comprehensive" => Ok(ScanType::Comprehensive),
            "custom" => Ok(ScanType::Custom),
            other => Err(format!("unknown scan type: {other}")),
        }
    }
}

/// Inbound scan request, as produced by the request layer or a command interpreter.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub targets: String,
    #[serde(default)]
    pub scan_type: ScanType,
    #[serde(default)]
    pub custom_ports: Option<String>,
}

impl ScanRequest {
    pub fn new(targets: impl Into<String>, scan_type: ScanType) -> Self {
        Self {
            targets: targets.into(),
            scan_type,
            custom_ports: None,
        }
    }

    pub fn custom(targets: impl Into<String>, ports: impl Into<String>) -> Self {
        Self {
            targets: targets.into(),
            scan_type: ScanType::Custom,
            custom_ports: Some(ports.into()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PortStatus {
    Open,
    Closed,
    Filtered,
    Error,
}

/// Recorded result of one probe against one (target, port) pair.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortOutcome {
    pub target: String,
    pub port: u16,
    pub status: PortStatus,
    pub service: String,
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Cancelled,
    Error,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Error
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Medium,
    Low,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServiceCount {
    pub service: String,
    pub count: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SecurityRecommendation {
    pub target: String,
    pub port: u16,
    pub service: String,
    pub severity: Severity,
    pub description: String,
    pub recommendation: String,
}

/// One finding of the anomaly stage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnomalyRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    /// Always within `0.0..=1.0`.
    pub confidence: f64,
    pub description: String,
    pub targets: Vec<String>,
    pub ports: Vec<u16>,
}

/// Structured finding produced by one analysis stage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Insight {
    Statistics {
        total_targets: usize,
        total_ports_scanned: usize,
        open_ports: usize,
        closed_ports: usize,
        filtered_ports: usize,
        error_ports: usize,
    },
    CommonServices {
        services: Vec<ServiceCount>,
    },
    SecurityRecommendations {
        recommendations: Vec<SecurityRecommendation>,
    },
    Anomalies {
        count: usize,
        details: Vec<AnomalyRecord>,
    },
}

/// Status poll response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub scan_id: String,
    pub state: JobState,
    pub progress: f64,
    pub elapsed_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    pub status: PortStatus,
    pub service: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct TargetResult {
    pub ports: BTreeMap<u16, PortEntry>,
}

/// Results poll response. The same shape is used mid-run and after completion;
/// `insights` is only present once the job is terminal.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResultDocument {
    pub scan_id: String,
    pub state: JobState,
    pub targets: Vec<String>,
    pub scan_type: ScanType,
    pub ports: Vec<u16>,
    pub start_time: String,
    pub end_time: Option<String>,
    pub duration: Option<f64>,
    pub results: BTreeMap<String, TargetResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insights: Option<Vec<Insight>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultDocument {
    pub fn open_port_count(&self) -> usize {
        self.results
            .values()
            .flat_map(|t| t.ports.values())
            .filter(|p| p.status == PortStatus::Open)
            .count()
    }

    pub fn outcome_count(&self) -> usize {
        self.results.values().map(|t| t.ports.len()).sum()
    }
}

/// Summary row of a terminal job for the history listing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub scan_id: String,
    pub datetime: String,
    pub targets: Vec<String>,
    pub target_count: usize,
    pub open_ports: usize,
    pub state: JobState,
}
