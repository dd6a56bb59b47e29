use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::trace;

use crate::error::{Result, ScanError};
use crate::types::{PortOutcome, PortStatus};

/// Probing backend. The coordinator only talks to this trait, so a raw-packet
/// or external-tool backend can replace the TCP connect probe.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Resolve a target name to an address before any probe is dispatched.
    async fn resolve(&self, target: &str) -> Result<IpAddr> {
        resolve_host(target).await
    }

    /// Probe one port. Must classify every failure into the returned outcome
    /// rather than erroring, and should honour `timeout`.
    async fn probe(&self, target: &str, addr: IpAddr, port: u16, timeout: Duration)
        -> PortOutcome;

    fn name(&self) -> &'static str;
}

/// Literal addresses pass through; names go through the system resolver.
pub async fn resolve_host(target: &str) -> Result<IpAddr> {
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(ip);
    }
    let mut addrs = tokio::net::lookup_host((target, 0))
        .await
        .map_err(|e| ScanError::JobSetup(format!("cannot resolve {target}: {e}")))?;
    addrs
        .next()
        .map(|sa| sa.ip())
        .ok_or_else(|| ScanError::JobSetup(format!("no addresses for {target}")))
}

/// Full TCP handshake probe with a connect timeout.
///
/// - connected: `open`
/// - connection refused (RST): `closed`
/// - no answer within the timeout: `filtered`
/// - any other socket error: `error`
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnectProber;

#[async_trait]
impl Prober for TcpConnectProber {
    async fn probe(
        &self,
        target: &str,
        addr: IpAddr,
        port: u16,
        timeout: Duration,
    ) -> PortOutcome {
        let sock = SocketAddr::new(addr, port);
        let start = Instant::now();
        let res = time::timeout(timeout, TcpStream::connect(sock)).await;
        let latency_ms = start.elapsed().as_millis() as u64;
        match res {
            Ok(Ok(_stream)) => {
                PortOutcome::new(target, port, PortStatus::Open).with_latency(latency_ms)
            }
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                PortOutcome::new(target, port, PortStatus::Closed).with_latency(latency_ms)
            }
            Ok(Err(e)) => {
                trace!(%sock, error = %e, "connect failed");
                PortOutcome::new(target, port, PortStatus::Error).with_error(e.to_string())
            }
            Err(_) => PortOutcome::new(target, port, PortStatus::Filtered),
        }
    }

    fn name(&self) -> &'static str {
        "tcp-connect"
    }
}

impl PortOutcome {
    pub fn new(target: impl Into<String>, port: u16, status: PortStatus) -> Self {
        Self {
            target: target.into(),
            port,
            status,
            service: service_name(port),
            latency_ms: None,
            error: None,
        }
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Best-effort service name for a well-known port.
pub fn service_name(port: u16) -> String {
    let name = match port {
        21 => "FTP",
        22 => "SSH",
        23 => "Telnet",
        25 => "SMTP",
        53 => "DNS",
        80 => "HTTP",
        110 => "POP3",
        111 => "RPCbind",
        135 => "MSRPC",
        139 => "NetBIOS",
        143 => "IMAP",
        161 => "SNMP",
        389 => "LDAP",
        443 => "HTTPS",
        445 => "SMB",
        465 => "SMTPS",
        587 => "Submission",
        631 => "IPP",
        993 => "IMAPS",
        995 => "POP3S",
        1433 => "MSSQL",
        1521 => "Oracle",
        1723 => "PPTP",
        2049 => "NFS",
        2222 => "SSH-Alt",
        2375 => "Docker",
        3306 => "MySQL",
        3389 => "RDP",
        5432 => "PostgreSQL",
        5900 => "VNC",
        5985 => "WinRM",
        6379 => "Redis",
        8080 => "HTTP-Proxy",
        8443 => "HTTPS-Alt",
        8888 => "HTTP-Alt",
        9200 => "Elasticsearch",
        11211 => "Memcached",
        27017 => "MongoDB",
        _ => return format!("Unknown ({port})"),
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    #[test]
    fn service_names() {
        assert_eq!(service_name(22), "SSH");
        assert_eq!(service_name(8080), "HTTP-Proxy");
        assert_eq!(service_name(4242), "Unknown (4242)");
    }

    #[tokio::test]
    async fn literal_address_resolves_without_lookup() {
        assert_eq!(
            resolve_host("127.0.0.1").await.unwrap(),
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        );
    }

    #[tokio::test]
    async fn connect_probe_sees_listener_as_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let out = TcpConnectProber
            .probe(
                "127.0.0.1",
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                port,
                Duration::from_secs(2),
            )
            .await;
        assert_eq!(out.status, PortStatus::Open);
        assert!(out.latency_ms.is_some());
    }

    #[tokio::test]
    async fn connect_probe_sees_unbound_port_as_closed() {
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        let out = TcpConnectProber
            .probe(
                "127.0.0.1",
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                port,
                Duration::from_secs(2),
            )
            .await;
        assert_eq!(out.status, PortStatus::Closed);
    }
}
