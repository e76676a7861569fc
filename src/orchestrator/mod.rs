//! Fallback orchestration.
//!
//! Drives candidate generation -> probe -> dispatch across transport
//! tiers, escalating to local synthesis once every remote path is
//! exhausted. Escalation is forward-only: the network tier is never
//! re-entered for the same request. Within a request, candidates and
//! transports are tried strictly in generator order; nothing is cached
//! across requests, so a since-resolved transient failure cannot mask
//! a working endpoint.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::diagnostics::{AttemptOutcome, AttemptStatus, DiagnosticsReporter, Tier};
use crate::net::probe::{self, ProbeResult};
use crate::net::{candidates, Candidate, RemoteDispatch, TransportKind};
use crate::tts::adapter::BackendAdapter;

/// One captured input event, immutable for the life of the request.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    /// None = auto-detect from the text.
    pub language: Option<String>,
    /// None = allocate a temp artifact path.
    pub output_path: Option<PathBuf>,
    /// Explicit model choice; always wins over auto-selection.
    pub model_override: Option<String>,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: None,
            output_path: None,
            model_override: None,
        }
    }
}

/// Successful synthesis: the audio artifact and which path produced it.
#[derive(Debug, Clone)]
pub struct Synthesized {
    pub audio_path: PathBuf,
    pub produced_by: String,
}

/// Tunable timeouts and budgets for the remote search.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub probe_timeout: Duration,
    /// Delay before the single permitted rank-0 retry.
    pub retry_delay: Duration,
    /// Wall-clock bound on the remote-tier search, so the request
    /// degrades to local synthesis promptly instead of leaving the
    /// user waiting.
    pub remote_budget: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(2),
            retry_delay: Duration::from_millis(500),
            remote_budget: Duration::from_secs(8),
        }
    }
}

pub struct Orchestrator {
    port: u16,
    /// Remote tiers in escalation order (HTTP first, then raw TCP).
    tiers: Vec<Box<dyn RemoteDispatch>>,
    adapter: BackendAdapter,
    settings: OrchestratorSettings,
    diagnostics: Arc<DiagnosticsReporter>,
}

impl Orchestrator {
    pub fn new(
        port: u16,
        tiers: Vec<Box<dyn RemoteDispatch>>,
        adapter: BackendAdapter,
        settings: OrchestratorSettings,
        diagnostics: Arc<DiagnosticsReporter>,
    ) -> Self {
        Self {
            port,
            tiers,
            adapter,
            settings,
            diagnostics,
        }
    }

    pub fn diagnostics(&self) -> &Arc<DiagnosticsReporter> {
        &self.diagnostics
    }

    /// Process one request to exactly one result.
    ///
    /// Network-level failures are recovered by advancing to the next
    /// candidate, transport, or the local tier; only exhaustion of
    /// every tier including the OS voice surfaces as an error.
    pub async fn handle(&self, request: &SynthesisRequest) -> anyhow::Result<Synthesized> {
        let artifact_path = request
            .output_path
            .clone()
            .unwrap_or_else(crate::tts::default_artifact_path);
        let mark = self.diagnostics.len();

        if let Some(done) = self.try_remote(request, &artifact_path).await {
            return Ok(done);
        }

        info!("Remote tiers exhausted, escalating to local synthesis");
        match self
            .adapter
            .synthesize(request, &artifact_path, &self.diagnostics)
            .await
        {
            Some(done) => Ok(done),
            None => {
                let summary = self.diagnostics.summarize_since(mark);
                Err(anyhow::anyhow!(
                    "all synthesis tiers exhausted:\n{summary}"
                ))
            }
        }
    }

    async fn try_remote(
        &self,
        request: &SynthesisRequest,
        artifact_path: &std::path::Path,
    ) -> Option<Synthesized> {
        let deadline = Instant::now() + self.settings.remote_budget;

        for dispatcher in &self.tiers {
            let transport = match dispatcher.tier() {
                Tier::Http => TransportKind::Http,
                Tier::RawTcp => TransportKind::RawTcp,
                Tier::Local => continue,
            };
            // Interfaces can change between requests; enumerate fresh
            // for every tier of every request.
            for candidate in candidates::generate(self.port, transport) {
                if Instant::now() >= deadline {
                    warn!("Remote search budget spent, stopping candidate iteration");
                    return None;
                }
                if let Some(done) = self
                    .try_candidate(dispatcher.as_ref(), &candidate, request, artifact_path)
                    .await
                {
                    return Some(done);
                }
            }
        }
        None
    }

    /// One probe plus dispatch, with the single permitted rank-0 retry
    /// on a transient timeout.
    async fn try_candidate(
        &self,
        dispatcher: &dyn RemoteDispatch,
        candidate: &Candidate,
        request: &SynthesisRequest,
        artifact_path: &std::path::Path,
    ) -> Option<Synthesized> {
        let tier = dispatcher.tier();
        let target = candidate.authority();

        let probe_start = Instant::now();
        let probed = probe::probe(candidate, self.settings.probe_timeout).await;
        if probed != ProbeResult::Reachable {
            let status = match probed {
                ProbeResult::Refused => AttemptStatus::ConnectionRefused,
                ProbeResult::TimedOut => AttemptStatus::Timeout,
                _ => AttemptStatus::Unreachable,
            };
            self.diagnostics.record(AttemptOutcome {
                tier,
                target,
                status,
                latency: probe_start.elapsed(),
                detail: Some("probe failed".to_string()),
            });
            return None;
        }

        let mut attempts_left = if candidate.rank == 0 { 2 } else { 1 };
        loop {
            let start = Instant::now();
            let outcome = dispatcher
                .dispatch(candidate, request, artifact_path)
                .await;
            self.diagnostics.record(AttemptOutcome {
                tier,
                target: target.clone(),
                status: outcome.status,
                latency: start.elapsed(),
                detail: outcome.detail,
            });

            match outcome.status {
                AttemptStatus::Success => {
                    info!(tier = %tier, target = %target, "Remote synthesis succeeded");
                    return Some(Synthesized {
                        audio_path: artifact_path.to_path_buf(),
                        produced_by: format!("{tier} {target}"),
                    });
                }
                AttemptStatus::Timeout if attempts_left > 1 => {
                    attempts_left -= 1;
                    debug!(
                        target = %target,
                        "Transient timeout on first-ranked candidate, retrying once"
                    );
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
                _ => return None,
            }
        }
    }
}
