//! Target specification parsing.
//!
//! A spec is a comma-separated list of tokens. Each token is one of:
//! - an IPv4 or IPv6 address: `192.168.1.10`, `::1`
//! - a hostname: `scanme.example.org`
//! - an IPv4 last-octet range: `10.0.0.1-20` (inclusive)
//! - an IPv4 CIDR block: `192.168.1.0/28` (network and broadcast excluded)
//!
//! Output order is first-seen; duplicates are dropped.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};

use ipnet::{IpNet, Ipv4Net};

use crate::error::{Result, ScanError};
use crate::netdetect;

const DEFAULT_MIN_PREFIX: u8 = 16;

/// Expand a target spec using the default CIDR size limit (/16).
pub fn expand(spec: &str) -> Result<Vec<String>> {
    expand_with_limit(spec, DEFAULT_MIN_PREFIX)
}

/// Expand a target spec, rejecting CIDR blocks with a prefix shorter than `min_prefix`.
pub fn expand_with_limit(spec: &str, min_prefix: u8) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::new();
    let mut seen = HashSet::new();

    for token in spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        for addr in expand_token(token, min_prefix)? {
            if seen.insert(addr.clone()) {
                out.push(addr);
            }
        }
    }

    if out.is_empty() {
        return Err(ScanError::InvalidTarget(format!(
            "no targets in specification: {:?}",
            spec
        )));
    }
    Ok(out)
}

fn expand_token(token: &str, min_prefix: u8) -> Result<Vec<String>> {
    if token.contains('/') {
        return expand_cidr(token, min_prefix);
    }
    if let Some(range) = parse_octet_range(token)? {
        return Ok(range);
    }
    if let Ok(ip) = token.parse::<IpAddr>() {
        return Ok(vec![ip.to_string()]);
    }
    if is_valid_hostname(token) {
        return Ok(vec![token.to_ascii_lowercase()]);
    }
    Err(ScanError::InvalidTarget(format!(
        "unrecognised target: {token}"
    )))
}

fn expand_cidr(token: &str, min_prefix: u8) -> Result<Vec<String>> {
    let net: Ipv4Net = token
        .parse()
        .map_err(|e| ScanError::InvalidTarget(format!("invalid CIDR {token}: {e}")))?;
    if net.prefix_len() < min_prefix {
        return Err(ScanError::InvalidTarget(format!(
            "CIDR {token} is larger than /{min_prefix}"
        )));
    }
    Ok(netdetect::expand_cidr_to_ips(IpNet::V4(net))
        .into_iter()
        .map(|ip| ip.to_string())
        .collect())
}

/// `Ok(None)` when the token is not shaped like `a.b.c.x-y` at all, so it can
/// still be tried as a hostname (`my-host.lan`).
fn parse_octet_range(token: &str) -> Result<Option<Vec<String>>> {
    let Some((base, range)) = token.rsplit_once('.') else {
        return Ok(None);
    };
    let Some((start, end)) = range.split_once('-') else {
        return Ok(None);
    };
    let octets: Vec<&str> = base.split('.').collect();
    let base_is_numeric = octets.len() == 3
        && octets
            .iter()
            .all(|o| !o.is_empty() && o.chars().all(|c| c.is_ascii_digit()));
    if !base_is_numeric {
        return Ok(None);
    }

    let invalid = |why: &str| ScanError::InvalidTarget(format!("invalid range {token}: {why}"));
    let mut prefix = [0u8; 3];
    for (slot, o) in prefix.iter_mut().zip(&octets) {
        *slot = o.parse::<u8>().map_err(|_| invalid("octet out of range"))?;
    }
    let (start, end) = (start.trim(), end.trim());
    if !is_digits(start) || !is_digits(end) {
        return Err(invalid("bounds must be decimal numbers"));
    }
    let start: u16 = start.parse().map_err(|_| invalid("bad start"))?;
    let end: u16 = end.parse().map_err(|_| invalid("bad end"))?;
    if start > 255 || end > 255 {
        return Err(invalid("bound outside 0-255"));
    }
    if start > end {
        return Err(invalid("start > end"));
    }

    Ok(Some(
        (start..=end)
            .map(|last| Ipv4Addr::new(prefix[0], prefix[1], prefix[2], last as u8).to_string())
            .collect(),
    ))
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// RFC 1123 hostname check. A final all-numeric label is rejected so that
/// malformed dotted quads (`300.1.1.1`) are not mistaken for names.
pub fn is_valid_hostname(name: &str) -> bool {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() || name.len() > 253 {
        return false;
    }
    let labels: Vec<&str> = name.split('.').collect();
    let label_ok = |l: &&str| {
        !l.is_empty()
            && l.len() <= 63
            && !l.starts_with('-')
            && !l.ends_with('-')
            && l.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    };
    if !labels.iter().all(label_ok) {
        return false;
    }
    labels
        .last()
        .map(|l| !l.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}
