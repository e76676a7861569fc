//! Per-attempt outcome recording.
//!
//! The reporter observes the fallback flow without owning it: recording
//! never fails and never alters control flow. Records are appended and
//! never mutated afterwards.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;

/// One level of the fallback hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Structured HTTP exchange with the synthesis service.
    Http,
    /// Raw TCP exchange with the synthesis service.
    RawTcp,
    /// Local synthesis backends.
    Local,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Http => write!(f, "http"),
            Tier::RawTcp => write!(f, "raw-tcp"),
            Tier::Local => write!(f, "local"),
        }
    }
}

/// Classified result of one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    Success,
    ConnectionRefused,
    Timeout,
    ProtocolError,
    Unreachable,
    InitFailed,
    InferenceFailed,
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttemptStatus::Success => "success",
            AttemptStatus::ConnectionRefused => "connection-refused",
            AttemptStatus::Timeout => "timeout",
            AttemptStatus::ProtocolError => "protocol-error",
            AttemptStatus::Unreachable => "unreachable",
            AttemptStatus::InitFailed => "init-failed",
            AttemptStatus::InferenceFailed => "inference-failed",
        };
        f.write_str(s)
    }
}

/// Result of one (candidate, transport) or backend trial.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub tier: Tier,
    /// `host:port` for network trials, backend id for local ones.
    pub target: String,
    pub status: AttemptStatus,
    pub latency: Duration,
    pub detail: Option<String>,
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<7} {:<24} {} ({}ms)",
            self.tier.to_string(),
            self.target,
            self.status,
            self.latency.as_millis()
        )?;
        if let Some(ref detail) = self.detail {
            write!(f, ": {}", detail)?;
        }
        Ok(())
    }
}

/// Append-only accumulator of attempt outcomes for the process lifetime.
#[derive(Default)]
pub struct DiagnosticsReporter {
    attempts: Mutex<Vec<AttemptOutcome>>,
}

impl DiagnosticsReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: AttemptOutcome) {
        debug!(
            tier = %outcome.tier,
            target = %outcome.target,
            status = %outcome.status,
            latency_ms = outcome.latency.as_millis() as u64,
            "Attempt recorded"
        );
        self.attempts.lock().unwrap().push(outcome);
    }

    /// Number of outcomes recorded so far. Used as a cursor for
    /// per-request summaries.
    pub fn len(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<AttemptOutcome> {
        self.attempts.lock().unwrap().clone()
    }

    /// Render the outcomes recorded since the `from` cursor, one line
    /// per attempt in recording order.
    pub fn summarize_since(&self, from: usize) -> String {
        let attempts = self.attempts.lock().unwrap();
        attempts
            .iter()
            .skip(from)
            .map(|a| format!("  {}", a))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(tier: Tier, target: &str, status: AttemptStatus) -> AttemptOutcome {
        AttemptOutcome {
            tier,
            target: target.to_string(),
            status,
            latency: Duration::from_millis(3),
            detail: None,
        }
    }

    #[test]
    fn test_record_is_append_only() {
        let reporter = DiagnosticsReporter::new();
        assert!(reporter.is_empty());

        reporter.record(outcome(Tier::Http, "localhost:8090", AttemptStatus::ConnectionRefused));
        reporter.record(outcome(Tier::RawTcp, "127.0.0.1:8090", AttemptStatus::Timeout));

        let snap = reporter.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].tier, Tier::Http);
        assert_eq!(snap[1].status, AttemptStatus::Timeout);
    }

    #[test]
    fn test_summarize_since_cursor() {
        let reporter = DiagnosticsReporter::new();
        reporter.record(outcome(Tier::Http, "localhost:8090", AttemptStatus::Unreachable));

        let mark = reporter.len();
        reporter.record(outcome(Tier::Local, "system-voice", AttemptStatus::Success));

        let summary = reporter.summarize_since(mark);
        assert!(summary.contains("system-voice"));
        assert!(!summary.contains("localhost"));
    }

    #[test]
    fn test_outcome_display() {
        let mut o = outcome(Tier::RawTcp, "[::1]:8090", AttemptStatus::ProtocolError);
        o.detail = Some("truncated response frame".to_string());
        let line = o.to_string();
        assert!(line.contains("raw-tcp"));
        assert!(line.contains("protocol-error"));
        assert!(line.contains("truncated"));
    }
}
