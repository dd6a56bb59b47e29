use std::collections::BTreeSet;
use std::time::Duration;

use serde::Serialize;

use crate::error::{Result, ScanError};
use crate::types::ScanType;

const QUICK: &[u16] = &[21, 22, 23, 25, 53, 80, 443, 3389];

const STANDARD: &[u16] = &[
    21, 22, 23, 25, 53, 80, 110, 111, 135, 139, 143, 161, 389, 443, 445, 465, 587, 631, 993,
    995, 1433, 1521, 1723, 2049, 2375, 3000, 3306, 3389, 5000, 5432, 5900, 5985, 6379, 8000,
    8080, 8443, 8888, 9200, 11211, 27017,
];

/// High ports appended to 1-1024 for the comprehensive profile.
const COMPREHENSIVE_EXTRA: &[u16] = &[
    1025, 1433, 1521, 1723, 1883, 2049, 2222, 2375, 2380, 3000, 3128, 3260, 3306, 3389, 4369,
    5000, 5432, 5672, 5900, 5985, 5986, 6379, 7001, 7002, 8000, 8008, 8080, 8081, 8088, 8443,
    8500, 8888, 9000, 9092, 9200, 9300, 11211, 27017,
];

/// Description of one scan profile, as listed by the `scan-types` endpoint.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ProfileInfo {
    pub scan_type: ScanType,
    pub name: &'static str,
    pub description: &'static str,
    pub ports: Vec<u16>,
    pub timeout_ms: u64,
}

impl ScanType {
    /// Default per-probe timeout for the profile.
    pub fn default_timeout(&self) -> Duration {
        match self {
            ScanType::Quick => Duration::from_secs(1),
            ScanType::Standard | ScanType::Custom => Duration::from_secs(2),
            ScanType::Comprehensive => Duration::from_secs(3),
        }
    }

    pub fn profile(&self) -> ProfileInfo {
        let (name, description) = match self {
            ScanType::Quick => ("Quick Scan", "Fast scan of a handful of well-known ports"),
            ScanType::Standard => ("Standard Scan", "Common service ports"),
            ScanType::Comprehensive => (
                "Comprehensive Scan",
                "Ports 1-1024 plus common high service ports",
            ),
            ScanType::Custom => ("Custom Scan", "Caller-supplied ports and ranges"),
        };
        ProfileInfo {
            scan_type: *self,
            name,
            description,
            ports: profile_ports(*self),
            timeout_ms: self.default_timeout().as_millis() as u64,
        }
    }

    pub fn profiles() -> Vec<ProfileInfo> {
        ScanType::ALL.iter().map(ScanType::profile).collect()
    }
}

/// Fixed port table of a profile, ascending. Empty for `Custom`.
pub fn profile_ports(scan_type: ScanType) -> Vec<u16> {
    let set: BTreeSet<u16> = match scan_type {
        ScanType::Quick => QUICK.iter().copied().collect(),
        ScanType::Standard => STANDARD.iter().copied().collect(),
        ScanType::Comprehensive => (1..=1024).chain(COMPREHENSIVE_EXTRA.iter().copied()).collect(),
        ScanType::Custom => BTreeSet::new(),
    };
    set.into_iter().collect()
}

/// Resolve a profile (plus the custom list for `Custom`) into a deduplicated,
/// ascending port list.
pub fn resolve(scan_type: ScanType, custom_ports: Option<&str>) -> Result<Vec<u16>> {
    if scan_type != ScanType::Custom {
        return Ok(profile_ports(scan_type));
    }
    let spec = custom_ports.map(str::trim).unwrap_or("");
    if spec.is_empty() {
        return Err(ScanError::InvalidPort(
            "custom scan requires a port list".into(),
        ));
    }
    parse_ports_str(spec)
}

/// Parse a comma-separated port list into a deduplicated, ascending list of
/// TCP ports (1..=65535).
///
/// Each token is a single port (`80`) or an inclusive range (`8000-8010`).
/// Whitespace around tokens is ignored; empty tokens are malformed.
pub fn parse_ports_str(s: &str) -> Result<Vec<u16>> {
    let mut out = BTreeSet::new();

    for (idx, raw) in s.split(',').enumerate() {
        let token = raw.trim();
        let pos = idx + 1;
        if token.is_empty() {
            return Err(ScanError::InvalidPort(format!("token {pos}: empty")));
        }

        if let Some((a, b)) = token.split_once('-') {
            let start = parse_port_str(a.trim())
                .map_err(|e| ScanError::InvalidPort(format!("token {pos}: range start: {e}")))?;
            let end = parse_port_str(b.trim())
                .map_err(|e| ScanError::InvalidPort(format!("token {pos}: range end: {e}")))?;
            if start > end {
                return Err(ScanError::InvalidPort(format!(
                    "token {pos}: invalid range {start}-{end} (start > end)"
                )));
            }
            out.extend(start..=end);
            continue;
        }

        let p = parse_port_str(token)
            .map_err(|e| ScanError::InvalidPort(format!("token {pos}: {e}")))?;
        out.insert(p);
    }

    Ok(out.into_iter().collect())
}

fn parse_port_str(s: &str) -> std::result::Result<u16, String> {
    // `str::parse` tolerates a leading `+`; ports are bare digits only.
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("invalid port value {s:?}"));
    }
    let val: u32 = s
        .parse::<u32>()
        .map_err(|e| format!("invalid port value {s:?}: {e}"))?;
    if val == 0 || val > 65535 {
        return Err(format!("port out of range: {val}"));
    }
    Ok(val as u16)
}
