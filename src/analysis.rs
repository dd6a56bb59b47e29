//! Post-scan analysis.
//!
//! The pipeline is a fixed list of independent stages. Each stage reads the
//! whole [`ResultAggregate`] and contributes at most one [`Insight`]; stages
//! never see each other's output. Insights come out in stage order.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::EngineConfig;
use crate::types::{
    AnomalyRecord, Insight, PortOutcome, PortStatus, SecurityRecommendation, ServiceCount,
    Severity,
};

/// Per-target view over a job's outcomes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultAggregate {
    targets: Vec<String>,
    by_target: BTreeMap<String, BTreeMap<u16, PortOutcome>>,
}

impl ResultAggregate {
    /// Every target is present, even before any of its outcomes arrive.
    pub fn new(targets: &[String]) -> Self {
        Self {
            targets: targets.to_vec(),
            by_target: targets
                .iter()
                .map(|t| (t.clone(), BTreeMap::new()))
                .collect(),
        }
    }

    pub fn from_outcomes<I>(targets: &[String], outcomes: I) -> Self
    where
        I: IntoIterator<Item = PortOutcome>,
    {
        let mut agg = Self::new(targets);
        for o in outcomes {
            agg.insert(o);
        }
        agg
    }

    pub fn insert(&mut self, outcome: PortOutcome) {
        if !self.by_target.contains_key(&outcome.target) {
            self.targets.push(outcome.target.clone());
        }
        self.by_target
            .entry(outcome.target.clone())
            .or_default()
            .insert(outcome.port, outcome);
    }

    /// Targets in plan order.
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// All outcomes, targets in plan order, ports ascending.
    pub fn outcomes(&self) -> impl Iterator<Item = &PortOutcome> + '_ {
        self.targets
            .iter()
            .filter_map(move |t| self.by_target.get(t))
            .flat_map(|ports| ports.values())
    }

    pub fn open_ports(&self, target: &str) -> Vec<u16> {
        self.by_target
            .get(target)
            .map(|ports| {
                ports
                    .values()
                    .filter(|o| o.status == PortStatus::Open)
                    .map(|o| o.port)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_target.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait AnalysisStage: Send + Sync {
    fn name(&self) -> &'static str;
    fn analyze(&self, agg: &ResultAggregate) -> Option<Insight>;
}

pub struct AnalysisPipeline {
    stages: Vec<Box<dyn AnalysisStage>>,
}

impl std::fmt::Debug for AnalysisPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|s| s.name()))
            .finish()
    }
}

impl AnalysisPipeline {
    pub fn new(stages: Vec<Box<dyn AnalysisStage>>) -> Self {
        Self { stages }
    }

    /// Statistics, common services, security recommendations, anomalies.
    pub fn standard(cfg: &EngineConfig) -> Self {
        Self::with_scorer(cfg, Box::new(RuleBasedScorer::from_config(cfg)))
    }

    /// Standard stages with a different anomaly scorer.
    pub fn with_scorer(cfg: &EngineConfig, scorer: Box<dyn AnomalyScorer>) -> Self {
        Self::new(vec![
            Box::new(StatisticsStage),
            Box::new(CommonServicesStage {
                top_n: cfg.top_services,
            }),
            Box::new(SecurityStage),
            Box::new(AnomalyStage::new(scorer)),
        ])
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn run(&self, agg: &ResultAggregate) -> Vec<Insight> {
        self.stages.iter().filter_map(|s| s.analyze(agg)).collect()
    }
}

impl Default for AnalysisPipeline {
    fn default() -> Self {
        Self::standard(&EngineConfig::default())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StatisticsStage;

impl AnalysisStage for StatisticsStage {
    fn name(&self) -> &'static str {
        "statistics"
    }

    fn analyze(&self, agg: &ResultAggregate) -> Option<Insight> {
        if agg.is_empty() {
            return None;
        }
        let (mut open, mut closed, mut filtered, mut error) = (0, 0, 0, 0);
        for o in agg.outcomes() {
            match o.status {
                PortStatus::Open => open += 1,
                PortStatus::Closed => closed += 1,
                PortStatus::Filtered => filtered += 1,
                PortStatus::Error => error += 1,
            }
        }
        Some(Insight::Statistics {
            total_targets: agg.targets().len(),
            total_ports_scanned: agg.len(),
            open_ports: open,
            closed_ports: closed,
            filtered_ports: filtered,
            error_ports: error,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CommonServicesStage {
    pub top_n: usize,
}

impl AnalysisStage for CommonServicesStage {
    fn name(&self) -> &'static str {
        "common_services"
    }

    fn analyze(&self, agg: &ResultAggregate) -> Option<Insight> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for o in agg.outcomes().filter(|o| o.status == PortStatus::Open) {
            *counts.entry(o.service.as_str()).or_default() += 1;
        }
        if counts.is_empty() || self.top_n == 0 {
            return None;
        }
        let mut ranked: Vec<ServiceCount> = counts
            .into_iter()
            .map(|(service, count)| ServiceCount {
                service: service.to_string(),
                count,
            })
            .collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.service.cmp(&b.service)));
        ranked.truncate(self.top_n);
        Some(Insight::CommonServices { services: ranked })
    }
}

struct SecurityRule {
    port: u16,
    service: &'static str,
    severity: Severity,
    description: &'static str,
    recommendation: &'static str,
}

const SECURITY_RULES: &[SecurityRule] = &[
    SecurityRule {
        port: 21,
        service: "FTP",
        severity: Severity::High,
        description: "FTP transfers credentials and data in plaintext.",
        recommendation: "Replace with SFTP or FTPS for file transfers.",
    },
    SecurityRule {
        port: 22,
        service: "SSH",
        severity: Severity::Medium,
        description: "SSH is a common target for brute-force attacks.",
        recommendation: "Use key-based authentication, disable password login and rate-limit attempts.",
    },
    SecurityRule {
        port: 23,
        service: "Telnet",
        severity: Severity::High,
        description: "Telnet sends sessions, including passwords, in plaintext.",
        recommendation: "Disable Telnet and use SSH instead.",
    },
    SecurityRule {
        port: 25,
        service: "SMTP",
        severity: Severity::Medium,
        description: "SMTP may be abusable as an open relay.",
        recommendation: "Restrict relaying to authenticated clients and require STARTTLS.",
    },
    SecurityRule {
        port: 80,
        service: "HTTP",
        severity: Severity::Medium,
        description: "Unencrypted web service.",
        recommendation: "Serve over HTTPS, add security headers and restrict access if not public.",
    },
    SecurityRule {
        port: 445,
        service: "SMB",
        severity: Severity::High,
        description: "SMB has a history of critical remote vulnerabilities.",
        recommendation: "Patch, disable SMBv1 and never expose SMB outside the local network.",
    },
    SecurityRule {
        port: 3306,
        service: "MySQL",
        severity: Severity::Medium,
        description: "Database port reachable over the network.",
        recommendation: "Bind to localhost or firewall to application hosts only.",
    },
    SecurityRule {
        port: 3389,
        service: "RDP",
        severity: Severity::High,
        description: "RDP is a frequent target for brute force and exploits.",
        recommendation: "Require Network Level Authentication and put RDP behind a VPN.",
    },
    SecurityRule {
        port: 5432,
        service: "PostgreSQL",
        severity: Severity::Medium,
        description: "Database port reachable over the network.",
        recommendation: "Restrict pg_hba.conf and firewall to application hosts only.",
    },
    SecurityRule {
        port: 5900,
        service: "VNC",
        severity: Severity::High,
        description: "VNC remote desktop, often weakly authenticated and unencrypted.",
        recommendation: "Tunnel VNC over SSH or a VPN and enforce strong passwords.",
    },
    SecurityRule {
        port: 6379,
        service: "Redis",
        severity: Severity::High,
        description: "Redis frequently runs without authentication.",
        recommendation: "Enable protected mode and AUTH, and bind to localhost.",
    },
    SecurityRule {
        port: 8080,
        service: "HTTP-Proxy",
        severity: Severity::Medium,
        description: "Unencrypted alternate web or admin interface.",
        recommendation: "Serve over HTTPS and restrict admin interfaces to trusted networks.",
    },
];

#[derive(Debug, Default, Clone, Copy)]
pub struct SecurityStage;

impl AnalysisStage for SecurityStage {
    fn name(&self) -> &'static str {
        "security_recommendations"
    }

    fn analyze(&self, agg: &ResultAggregate) -> Option<Insight> {
        let mut seen: HashSet<(&str, &str)> = HashSet::new();
        let mut recommendations = Vec::new();
        for o in agg.outcomes().filter(|o| o.status == PortStatus::Open) {
            let Some(rule) = SECURITY_RULES.iter().find(|r| r.port == o.port) else {
                continue;
            };
            if !seen.insert((o.target.as_str(), rule.service)) {
                continue;
            }
            recommendations.push(SecurityRecommendation {
                target: o.target.clone(),
                port: o.port,
                service: rule.service.to_string(),
                severity: rule.severity,
                description: rule.description.to_string(),
                recommendation: rule.recommendation.to_string(),
            });
        }
        if recommendations.is_empty() {
            return None;
        }
        Some(Insight::SecurityRecommendations { recommendations })
    }
}

/// Anomaly scoring seam: aggregate in, anomaly records out. A learned model
/// can implement this without touching the pipeline.
pub trait AnomalyScorer: Send + Sync {
    fn score(&self, agg: &ResultAggregate) -> Vec<AnomalyRecord>;
}

pub struct AnomalyStage {
    scorer: Box<dyn AnomalyScorer>,
}

impl AnomalyStage {
    pub fn new(scorer: Box<dyn AnomalyScorer>) -> Self {
        Self { scorer }
    }
}

impl AnalysisStage for AnomalyStage {
    fn name(&self) -> &'static str {
        "anomalies"
    }

    fn analyze(&self, agg: &ResultAggregate) -> Option<Insight> {
        let details = self.scorer.score(agg);
        if details.is_empty() {
            return None;
        }
        Some(Insight::Anomalies {
            count: details.len(),
            details,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCombination {
    pub ports: Vec<u16>,
    pub description: String,
}

impl PortCombination {
    pub fn new(ports: &[u16], description: &str) -> Self {
        Self {
            ports: ports.to_vec(),
            description: description.to_string(),
        }
    }
}

pub fn default_port_combinations() -> Vec<PortCombination> {
    vec![
        PortCombination::new(&[22, 2222], "Multiple SSH ports open"),
        PortCombination::new(&[80, 8080, 8888], "Multiple HTTP ports open"),
        PortCombination::new(&[21, 22, 23], "Multiple remote access services"),
        PortCombination::new(&[3306, 5432], "Multiple database services"),
    ]
}

const EXCESSIVE_OPEN_PORTS: &str = "excessive_open_ports";

/// Heuristic scorer:
/// - `excessive_open_ports`: open-port count above an absolute threshold, or
///   a z-score above `z_threshold` against the scan's per-target mean
///   (needs three or more targets and non-zero spread). One record per target.
/// - `unusual_port_combination`: two or more members of a risky port set open.
/// - `identical_port_pattern`: several hosts exposing the same set of more
///   than two open ports.
#[derive(Debug, Clone)]
pub struct RuleBasedScorer {
    open_port_threshold: usize,
    z_threshold: f64,
    combinations: Vec<PortCombination>,
    identical_patterns: bool,
}

impl RuleBasedScorer {
    pub fn new(open_port_threshold: usize, z_threshold: f64) -> Self {
        Self {
            open_port_threshold,
            z_threshold,
            combinations: default_port_combinations(),
            identical_patterns: true,
        }
    }

    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self::new(cfg.open_port_threshold, cfg.z_threshold)
    }

    pub fn without_port_combinations(mut self) -> Self {
        self.combinations.clear();
        self
    }

    pub fn without_identical_patterns(mut self) -> Self {
        self.identical_patterns = false;
        self
    }

    fn excessive_open_ports(&self, open: &[(&String, Vec<u16>)]) -> Vec<AnomalyRecord> {
        let n = open.len();
        if n == 0 {
            return Vec::new();
        }
        let counts: Vec<f64> = open.iter().map(|(_, p)| p.len() as f64).collect();
        let mean = counts.iter().sum::<f64>() / n as f64;
        let variance = counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n as f64;
        let stddev = variance.sqrt();
        let threshold = self.open_port_threshold;

        let mut out = Vec::new();
        for ((target, ports), &count) in open.iter().zip(&counts) {
            let mut signal: Option<f64> = None;
            if ports.len() > threshold {
                let excess = (ports.len() - threshold) as f64 / threshold.max(1) as f64;
                signal = Some(excess);
            }
            if n >= 3 && stddev > 0.0 {
                let z = (count - mean) / stddev;
                if z > self.z_threshold {
                    let excess = (z - self.z_threshold) / self.z_threshold;
                    signal = Some(signal.map_or(excess, |s| s.max(excess)));
                }
            }
            let Some(signal) = signal else {
                continue;
            };
            let confidence = clamp_unit(signal);
            out.push(AnomalyRecord {
                kind: EXCESSIVE_OPEN_PORTS.into(),
                severity: severity_for(confidence),
                confidence,
                description: format!(
                    "{target} has {} open ports (threshold {threshold}, scan mean {mean:.1})",
                    ports.len()
                ),
                targets: vec![(*target).clone()],
                ports: ports.clone(),
            });
        }
        out
    }

    fn port_combinations(&self, open: &[(&String, Vec<u16>)]) -> Vec<AnomalyRecord> {
        let mut out = Vec::new();
        for (target, ports) in open {
            for combo in &self.combinations {
                let matched: Vec<u16> = combo
                    .ports
                    .iter()
                    .copied()
                    .filter(|p| ports.contains(p))
                    .collect();
                if matched.len() < 2 {
                    continue;
                }
                let confidence = clamp_unit(matched.len() as f64 / combo.ports.len() as f64);
                out.push(AnomalyRecord {
                    kind: "unusual_port_combination".into(),
                    severity: Severity::Medium,
                    confidence,
                    description: combo.description.clone(),
                    targets: vec![(*target).clone()],
                    ports: matched,
                });
            }
        }
        out
    }

    fn identical_port_patterns(&self, open: &[(&String, Vec<u16>)]) -> Vec<AnomalyRecord> {
        let mut groups: BTreeMap<&[u16], Vec<String>> = BTreeMap::new();
        for (target, ports) in open {
            if ports.len() > 2 {
                groups.entry(ports.as_slice()).or_default().push((*target).clone());
            }
        }
        groups
            .into_iter()
            .filter(|(_, hosts)| hosts.len() > 1)
            .map(|(ports, hosts)| {
                let confidence = clamp_unit((hosts.len() - 1) as f64 / hosts.len() as f64);
                AnomalyRecord {
                    kind: "identical_port_pattern".into(),
                    severity: Severity::Low,
                    confidence,
                    description: format!(
                        "{} hosts have identical open port patterns",
                        hosts.len()
                    ),
                    targets: hosts,
                    ports: ports.to_vec(),
                }
            })
            .collect()
    }
}

impl Default for RuleBasedScorer {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl AnomalyScorer for RuleBasedScorer {
    fn score(&self, agg: &ResultAggregate) -> Vec<AnomalyRecord> {
        let open: Vec<(&String, Vec<u16>)> = agg
            .targets()
            .iter()
            .map(|t| (t, agg.open_ports(t)))
            .collect();

        let mut records = self.excessive_open_ports(&open);
        // A target already flagged for its open-port count gets one record;
        // combination hits are folded into it.
        for combo in self.port_combinations(&open) {
            let flagged = records
                .iter_mut()
                .find(|r| r.kind == EXCESSIVE_OPEN_PORTS && r.targets == combo.targets);
            match flagged {
                Some(record) => fold_combination(record, combo),
                None => records.push(combo),
            }
        }
        if self.identical_patterns {
            records.extend(self.identical_port_patterns(&open));
        }
        records
    }
}

fn fold_combination(record: &mut AnomalyRecord, combo: AnomalyRecord) {
    record.confidence = record.confidence.max(combo.confidence);
    record.severity = severity_for(record.confidence);
    record.description = format!("{}; {}", record.description, combo.description);
    record.ports.extend(combo.ports);
    record.ports.sort_unstable();
    record.ports.dedup();
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

fn severity_for(confidence: f64) -> Severity {
    if confidence >= 0.75 {
        Severity::High
    } else if confidence >= 0.4 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(target: &str, port: u16, status: PortStatus) -> PortOutcome {
        PortOutcome::new(target, port, status)
    }

    fn aggregate(rows: &[(&str, &[u16], &[u16])]) -> ResultAggregate {
        let targets: Vec<String> = rows.iter().map(|(t, _, _)| t.to_string()).collect();
        let mut outcomes = Vec::new();
        for (t, open, closed) in rows {
            outcomes.extend(open.iter().map(|&p| outcome(t, p, PortStatus::Open)));
            outcomes.extend(closed.iter().map(|&p| outcome(t, p, PortStatus::Closed)));
        }
        ResultAggregate::from_outcomes(&targets, outcomes)
    }

    #[test]
    fn empty_aggregate_yields_nothing() {
        let agg = ResultAggregate::new(&["10.0.0.1".to_string()]);
        assert!(AnalysisPipeline::default().run(&agg).is_empty());
    }

    #[test]
    fn statistics_counts_every_status() {
        let targets = vec!["a".to_string()];
        let agg = ResultAggregate::from_outcomes(
            &targets,
            vec![
                outcome("a", 1, PortStatus::Open),
                outcome("a", 2, PortStatus::Closed),
                outcome("a", 3, PortStatus::Filtered),
                outcome("a", 4, PortStatus::Error),
            ],
        );
        assert_eq!(
            StatisticsStage.analyze(&agg),
            Some(Insight::Statistics {
                total_targets: 1,
                total_ports_scanned: 4,
                open_ports: 1,
                closed_ports: 1,
                filtered_ports: 1,
                error_ports: 1,
            })
        );
    }

    #[test]
    fn common_services_rank_by_count_then_name() {
        let agg = aggregate(&[
            ("a", &[22, 80, 443], &[]),
            ("b", &[22, 443], &[]),
            ("c", &[80], &[]),
        ]);
        let Some(Insight::CommonServices { services }) =
            (CommonServicesStage { top_n: 2 }).analyze(&agg)
        else {
            panic!("expected common services");
        };
        // HTTP, HTTPS and SSH all have 2; name order breaks the tie.
        assert_eq!(
            services,
            vec![
                ServiceCount { service: "HTTP".into(), count: 2 },
                ServiceCount { service: "HTTPS".into(), count: 2 },
            ]
        );
    }

    #[test]
    fn security_rules_follow_target_then_port_order() {
        let agg = aggregate(&[("a", &[21, 23], &[]), ("b", &[23], &[445])]);
        let Some(Insight::SecurityRecommendations { recommendations }) = SecurityStage.analyze(&agg)
        else {
            panic!("expected recommendations");
        };
        let keys: Vec<(&str, &str)> = recommendations
            .iter()
            .map(|r| (r.target.as_str(), r.service.as_str()))
            .collect();
        assert_eq!(keys, vec![("a", "FTP"), ("a", "Telnet"), ("b", "Telnet")]);
        assert!(recommendations.iter().all(|r| r.severity == Severity::High));
    }

    #[test]
    fn closed_risky_ports_produce_no_recommendation() {
        let agg = aggregate(&[("a", &[], &[21, 23, 445])]);
        assert_eq!(SecurityStage.analyze(&agg), None);
    }

    #[test]
    fn outlier_above_absolute_threshold() {
        let agg = aggregate(&[
            ("10.0.0.1", &[21, 23, 80], &[]),
            ("10.0.0.2", &[80], &[21]),
            ("10.0.0.3", &[], &[21, 80]),
            ("10.0.0.4", &[443], &[]),
        ]);
        let scorer = RuleBasedScorer::new(2, 2.0).without_port_combinations();
        let records = scorer.score(&agg);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.kind, "excessive_open_ports");
        assert_eq!(r.targets, vec!["10.0.0.1"]);
        assert_eq!(r.ports, vec![21, 23, 80]);
        assert!(r.confidence > 0.0 && r.confidence <= 1.0);
    }

    #[test]
    fn combination_on_flagged_target_folds_into_one_record() {
        let agg = aggregate(&[
            ("10.0.0.1", &[21, 23, 80], &[22]),
            ("10.0.0.2", &[22], &[21, 23, 80]),
            ("10.0.0.3", &[], &[21, 22, 23, 80]),
            ("10.0.0.4", &[], &[21, 22, 23, 80]),
        ]);
        let records = RuleBasedScorer::new(2, 2.0).score(&agg);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.kind, "excessive_open_ports");
        assert_eq!(r.targets, vec!["10.0.0.1"]);
        assert_eq!(r.ports, vec![21, 23, 80]);
        // 21+23 of the {21,22,23} combination outweighs (3-2)/2.
        assert!((r.confidence - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(r.severity, Severity::Medium);
        assert!(r.description.contains("; "));
    }

    #[test]
    fn z_score_outlier_without_absolute_hit() {
        let mut rows: Vec<(&str, &[u16], &[u16])> = Vec::new();
        rows.push(("big", &[1, 2, 3, 4, 5, 6], &[]));
        let names = ["h1", "h2", "h3", "h4", "h5", "h6", "h7", "h8", "h9"];
        for n in names {
            rows.push((n, &[1], &[]));
        }
        let agg = aggregate(&rows);
        let records = RuleBasedScorer::new(100, 2.0)
            .without_port_combinations()
            .without_identical_patterns()
            .score(&agg);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].targets, vec!["big"]);
        assert!(records[0].confidence > 0.0);
    }

    #[test]
    fn confidence_is_clamped() {
        let agg = aggregate(&[("a", &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12], &[])]);
        let records = RuleBasedScorer::new(1, 2.0).without_port_combinations().score(&agg);
        assert_eq!(records[0].confidence, 1.0);
        assert_eq!(records[0].severity, Severity::High);
    }

    #[test]
    fn port_combination_confidence_scales_with_match() {
        let agg = aggregate(&[("a", &[21, 23], &[22])]);
        let records = RuleBasedScorer::new(10, 2.0).score(&agg);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, "unusual_port_combination");
        assert_eq!(records[0].ports, vec![21, 23]);
        assert!((records[0].confidence - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn identical_patterns_grouped() {
        let agg = aggregate(&[
            ("a", &[443, 5000, 9000], &[]),
            ("b", &[443, 5000, 9000], &[]),
            ("c", &[443], &[]),
        ]);
        let records = RuleBasedScorer::new(10, 2.0).score(&agg);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, "identical_port_pattern");
        assert_eq!(records[0].targets, vec!["a", "b"]);
        assert_eq!(records[0].confidence, 0.5);
    }

    #[test]
    fn pipeline_emits_in_stage_order() {
        let pipeline = AnalysisPipeline::default();
        assert_eq!(
            pipeline.stage_names(),
            vec!["statistics", "common_services", "security_recommendations", "anomalies"]
        );
        let agg = aggregate(&[("a", &[21, 22, 23], &[80])]);
        let insights = pipeline.run(&agg);
        let kinds: Vec<&str> = insights
            .iter()
            .map(|i| match i {
                Insight::Statistics { .. } => "statistics",
                Insight::CommonServices { .. } => "common_services",
                Insight::SecurityRecommendations { .. } => "security_recommendations",
                Insight::Anomalies { .. } => "anomalies",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["statistics", "common_services", "security_recommendations", "anomalies"]
        );
    }

    struct FixedScorer;

    impl AnomalyScorer for FixedScorer {
        fn score(&self, agg: &ResultAggregate) -> Vec<AnomalyRecord> {
            vec![AnomalyRecord {
                kind: "model".into(),
                severity: Severity::Low,
                confidence: 0.9,
                description: format!("{} outcomes scored", agg.len()),
                targets: agg.targets().to_vec(),
                ports: vec![],
            }]
        }
    }

    #[test]
    fn scorer_is_swappable() {
        let pipeline = AnalysisPipeline::with_scorer(&EngineConfig::default(), Box::new(FixedScorer));
        let agg = aggregate(&[("a", &[], &[80])]);
        let insights = pipeline.run(&agg);
        assert!(matches!(
            insights.last(),
            Some(Insight::Anomalies { count: 1, details }) if details[0].kind == "model"
        ));
    }
}
