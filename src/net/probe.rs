//! Low-level reachability probe.
//!
//! One TCP connect with a short bounded timeout and no protocol
//! exchange. This separates "nothing is listening on the port" from
//! "the port accepts connections but the protocol layer on top
//! misbehaves", which is what VPN gateway interference looks like.

use std::io;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

use super::Candidate;

/// Outcome of a reachability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    Reachable,
    Refused,
    TimedOut,
    Unreachable,
}

/// Probe one candidate. The connection is dropped immediately; a probe
/// failure short-circuits the candidate without a protocol exchange.
pub async fn probe(candidate: &Candidate, limit: Duration) -> ProbeResult {
    let addr = candidate.authority();
    let result = match timeout(limit, TcpStream::connect(&addr)).await {
        Ok(Ok(_stream)) => ProbeResult::Reachable,
        Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => ProbeResult::Refused,
        Ok(Err(_)) => ProbeResult::Unreachable,
        Err(_) => ProbeResult::TimedOut,
    };
    trace!(addr = %addr, ?result, "Probe finished");
    result
}
