//! Remote synthesis tiers: candidate enumeration, reachability probing,
//! and the two dispatchers (HTTP and raw TCP) behind one contract.

pub mod candidates;
pub mod http;
pub mod probe;
pub mod raw;

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use crate::diagnostics::{AttemptStatus, Tier};
use crate::orchestrator::SynthesisRequest;

/// How a candidate is spoken to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Structured request/response over HTTP.
    Http,
    /// Single framed JSON exchange over a bare TCP connection.
    RawTcp,
}

/// A transport-qualified network location that might host the synthesis
/// service. Candidate lists are generated fresh for every attempt
/// sequence because local interfaces can change between calls.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub host: String,
    pub port: u16,
    pub transport: TransportKind,
    /// Position in generation order. Used for logging and the single
    /// permitted rank-0 retry, never for correctness.
    pub rank: usize,
}

impl Candidate {
    /// `host:port`, with IPv6 hosts bracketed.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.authority())
    }
}

/// Classified result of one dispatch attempt.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub status: AttemptStatus,
    pub detail: Option<String>,
}

impl DispatchOutcome {
    pub fn success() -> Self {
        Self {
            status: AttemptStatus::Success,
            detail: None,
        }
    }

    pub fn failed(status: AttemptStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: Some(detail.into()),
        }
    }
}

/// One synthesis attempt against one candidate (dyn-compatible).
///
/// Implementations enforce their own bounded timeout and never retry
/// internally; retry policy belongs entirely to the orchestrator. On
/// success the audio artifact exists at `artifact_path`.
pub trait RemoteDispatch: Send + Sync {
    fn tier(&self) -> Tier;

    fn dispatch<'a>(
        &'a self,
        candidate: &'a Candidate,
        request: &'a SynthesisRequest,
        artifact_path: &'a Path,
    ) -> Pin<Box<dyn Future<Output = DispatchOutcome> + Send + 'a>>;
}
