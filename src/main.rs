use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use scan_orchestrator::prober::TcpConnectProber;
use scan_orchestrator::store::JsonFileStore;
use scan_orchestrator::types::{Insight, PortStatus, ResultDocument, ScanRequest, ScanType};
use scan_orchestrator::{netdetect, server, EngineConfig, JobRegistry};

/// scan-orchestrator: concurrent TCP port scans with post-scan analysis and an HTTP job API.
#[derive(Debug, Clone, Parser)]
#[command(name = "scan-orchestrator", version, long_about = None)]
struct Cli {
    /// Run the HTTP API and static UI instead of a one-shot scan.
    #[arg(long, default_value_t = false)]
    serve: bool,

    /// Comma-separated IPs, ranges (10.0.0.1-20), CIDRs or hostnames. Defaults to local networks.
    #[arg(long)]
    targets: Option<String>,

    /// quick, standard, comprehensive or custom.
    #[arg(long = "scan-type", default_value_t = ScanType::Standard)]
    scan_type: ScanType,

    /// Port list for custom scans, e.g. "22,80,8000-8100".
    #[arg(long = "custom-ports")]
    custom_ports: Option<String>,

    /// Max concurrent probes per job.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-probe timeout in milliseconds; overrides the scan profile.
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Write the result document as pretty JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// TOML engine configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,

    /// Listen address for --serve. Overrides the config file.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let cfg = load_config(&cli)?;
    let mut registry = JobRegistry::new(cfg.clone(), Arc::new(TcpConnectProber));
    if let Some(dir) = &cfg.results_dir {
        let store = JsonFileStore::open(dir)
            .await
            .with_context(|| format!("opening results dir {}", dir.display()))?;
        registry = registry.with_store(Arc::new(store));
    }
    let registry = Arc::new(registry);

    if cli.serve {
        println!("API listening on http://{} (Ctrl+C to stop)", cfg.bind);
        tokio::select! {
            res = server::spawn_server(&cfg.bind, registry) => res?,
            _ = tokio::signal::ctrl_c() => info!("shutting down"),
        }
        return Ok(());
    }

    let targets = match cli.targets.clone() {
        Some(t) => t,
        None => netdetect::local_target_spec()?
            .context("no targets given and no local IPv4 network detected")?,
    };
    let req = ScanRequest {
        targets,
        scan_type: cli.scan_type,
        custom_ports: cli.custom_ports.clone(),
    };

    let id = registry.submit(&req).await?;
    let plan_summary = {
        let job = registry.get(&id).await?;
        let plan = job.plan();
        (plan.targets().len(), plan.ports().len(), plan.scan_type())
    };
    println!("scan {id}");
    println!("  targets   : {}", plan_summary.0);
    println!("  ports     : {}", plan_summary.1);
    println!("  scan_type : {}", plan_summary.2);

    let waiter = registry.clone();
    let wait_id = id.clone();
    let mut done = tokio::spawn(async move { waiter.wait(&wait_id).await });
    tokio::select! {
        res = &mut done => { res??; }
        _ = tokio::signal::ctrl_c() => {
            warn!(scan_id = %id, "interrupted, cancelling scan");
            registry.cancel(&id).await?;
            done.await??;
        }
    }

    let doc = registry.results(&id).await?;
    print_results_table(&doc);
    print_insights(&doc);

    if let Some(path) = cli.output.as_deref() {
        match write_results_json(path, &doc) {
            Ok(()) => println!("Wrote JSON results to {}", path.display()),
            Err(e) => eprintln!("Failed to write JSON to {}: {e}", path.display()),
        }
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut cfg = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(c) = cli.concurrency {
        cfg.max_workers_per_job = c;
    }
    if let Some(ms) = cli.timeout_ms {
        cfg.probe_timeout_ms = Some(ms);
    }
    if let Some(bind) = &cli.bind {
        cfg.bind = bind.clone();
    }
    cfg.validate()?;
    Ok(cfg)
}

fn print_results_table(doc: &ResultDocument) {
    let rows: Vec<(&str, u16, &str)> = doc
        .results
        .iter()
        .flat_map(|(target, r)| {
            r.ports
                .iter()
                .filter(|(_, p)| p.status == PortStatus::Open)
                .map(move |(port, p)| (target.as_str(), *port, p.service.as_str()))
        })
        .collect();

    let target_w = rows
        .iter()
        .map(|r| r.0.len())
        .max()
        .unwrap_or(0)
        .max("target".len());
    let port_w = "port".len().max(5);
    let svc_w = rows
        .iter()
        .map(|r| r.2.len())
        .max()
        .unwrap_or(0)
        .max("service".len());

    println!(
        "\nState: {:?}  open ports: {} (scanned: {})",
        doc.state,
        doc.open_port_count(),
        doc.outcome_count()
    );
    println!("{:<target_w$}  {:>port_w$}  {:<svc_w$}", "target", "port", "service");
    println!("{:-<target_w$}  {:-<port_w$}  {:-<svc_w$}", "", "", "");
    for (target, port, service) in rows {
        println!("{target:<target_w$}  {port:>port_w$}  {service:<svc_w$}");
    }
}

fn print_insights(doc: &ResultDocument) {
    let Some(insights) = &doc.insights else {
        return;
    };
    println!();
    for insight in insights {
        match insight {
            Insight::Statistics {
                total_targets,
                total_ports_scanned,
                open_ports,
                closed_ports,
                filtered_ports,
                error_ports,
            } => println!(
                "stats: {total_targets} targets, {total_ports_scanned} probes, \
                 {open_ports} open / {closed_ports} closed / {filtered_ports} filtered / {error_ports} error"
            ),
            Insight::CommonServices { services } => {
                let list: Vec<String> = services
                    .iter()
                    .map(|s| format!("{} ({})", s.service, s.count))
                    .collect();
                println!("common services: {}", list.join(", "));
            }
            Insight::SecurityRecommendations { recommendations } => {
                println!("security recommendations:");
                for r in recommendations {
                    println!(
                        "  [{:?}] {}:{} {} - {}",
                        r.severity, r.target, r.port, r.service, r.recommendation
                    );
                }
            }
            Insight::Anomalies { count, details } => {
                println!("anomalies: {count}");
                for a in details {
                    println!(
                        "  [{:?} {:.2}] {}: {}",
                        a.severity, a.confidence, a.kind, a.description
                    );
                }
            }
        }
    }
}

fn write_results_json(path: &std::path::Path, doc: &ResultDocument) -> anyhow::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, doc)?;
    Ok(())
}
