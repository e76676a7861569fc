//! Endpoint candidate enumeration.
//!
//! Pure address construction plus one best-effort self-lookup; no other
//! network I/O. Output is ordered most-likely-to-succeed first and is
//! deterministic for a given environment so retries and diagnostics are
//! reproducible.

use std::collections::HashSet;
use std::net::{IpAddr, ToSocketAddrs};
use std::process::Command;

use tracing::debug;

use super::{Candidate, TransportKind};

/// Generate the ordered, deduplicated candidate list for one transport.
///
/// Order: `localhost`, `127.0.0.1`, `0.0.0.0`, `::1`, then the
/// machine's resolved non-loopback IP and its hostname when available.
/// A failed self-lookup only omits the trailing entries; the loopback
/// addresses are always present.
pub fn generate(port: u16, transport: TransportKind) -> Vec<Candidate> {
    let mut hosts: Vec<String> = vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
        "0.0.0.0".to_string(),
        "::1".to_string(),
    ];

    if let Some(name) = machine_hostname() {
        if let Some(ip) = resolve_non_loopback(&name, port) {
            hosts.push(ip.to_string());
            hosts.push(name);
        }
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for host in hosts {
        if !seen.insert(host.clone()) {
            continue;
        }
        out.push(Candidate {
            host,
            port,
            transport,
            rank: out.len(),
        });
    }

    debug!(count = out.len(), ?transport, "Generated endpoint candidates");
    out
}

/// Best-effort machine hostname: `HOSTNAME` env first, then the
/// `hostname` utility.
fn machine_hostname() -> Option<String> {
    if let Ok(name) = std::env::var("HOSTNAME") {
        let name = name.trim().to_string();
        if !name.is_empty() {
            return Some(name);
        }
    }

    let output = Command::new("hostname").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!name.is_empty()).then_some(name)
}

/// Resolve a hostname to its first non-loopback address, if any.
fn resolve_non_loopback(name: &str, port: u16) -> Option<IpAddr> {
    let addrs = (name, port).to_socket_addrs().ok()?;
    addrs.map(|a| a.ip()).find(|ip| !ip.is_loopback())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_always_present() {
        let cands = generate(8090, TransportKind::Http);
        assert!(!cands.is_empty());
        assert!(cands.iter().any(|c| c.host == "localhost"));
        assert!(cands.iter().any(|c| c.host == "127.0.0.1"));
        assert!(cands.iter().any(|c| c.host == "::1"));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a: Vec<String> = generate(8090, TransportKind::Http)
            .into_iter()
            .map(|c| c.host)
            .collect();
        let b: Vec<String> = generate(8090, TransportKind::Http)
            .into_iter()
            .map(|c| c.host)
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_ranks_follow_generation_order() {
        let cands = generate(8090, TransportKind::RawTcp);
        for (i, c) in cands.iter().enumerate() {
            assert_eq!(c.rank, i);
            assert_eq!(c.port, 8090);
            assert_eq!(c.transport, TransportKind::RawTcp);
        }
        assert_eq!(cands[0].host, "localhost");
    }

    #[test]
    fn test_no_duplicate_hosts() {
        let cands = generate(8090, TransportKind::Http);
        let mut seen = HashSet::new();
        for c in &cands {
            assert!(seen.insert(c.host.clone()), "duplicate host {}", c.host);
        }
    }
}
