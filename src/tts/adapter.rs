//! Local backend selection and escalation.
//!
//! Mirrors the network tier in spirit: ordered options, per-option
//! failure recovery, one always-available option at the end. Backend
//! readiness is decided once per process lifetime; a backend that fails
//! both loading modes stays unavailable until restart.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::diagnostics::{AttemptOutcome, AttemptStatus, DiagnosticsReporter, Tier};
use crate::orchestrator::{Synthesized, SynthesisRequest};

use super::model::{EnglishModel, MultilingualModel};
use super::system::SystemVoice;
use super::{contains_cjk, Capability, LoadMode, SynthesisBackend};

pub struct BackendAdapter {
    /// Most preferred first. The last entry is expected to be the OS
    /// voice, whose initialization never fails.
    backends: Vec<Box<dyn SynthesisBackend>>,
    /// Backend id -> readiness. Written once per backend; a second
    /// concurrent initializer redoes harmless work and converges to
    /// the same value.
    readiness: Mutex<HashMap<String, bool>>,
}

impl BackendAdapter {
    pub fn new(backends: Vec<Box<dyn SynthesisBackend>>) -> Self {
        Self {
            backends,
            readiness: Mutex::new(HashMap::new()),
        }
    }

    /// Production chain: English model, multilingual model, OS voice.
    pub fn with_default_backends(model_dir: &Path) -> Self {
        Self::new(vec![
            Box::new(EnglishModel::new(model_dir)),
            Box::new(MultilingualModel::new(model_dir)),
            Box::new(SystemVoice::new()),
        ])
    }

    /// Escalate through matching backends until one produces audio.
    ///
    /// Individual backend failures are recorded in diagnostics, never
    /// raised. Returns `None` only when every backend, including the OS
    /// voice, has failed.
    pub async fn synthesize(
        &self,
        request: &SynthesisRequest,
        out: &Path,
        diagnostics: &DiagnosticsReporter,
    ) -> Option<Synthesized> {
        let required = required_capability(request);
        let language = request
            .language
            .as_deref()
            .map(str::to_string)
            .unwrap_or_else(|| {
                if contains_cjk(&request.text) {
                    "zh-cn".to_string()
                } else {
                    "en".to_string()
                }
            });

        for backend in &self.backends {
            if let Some(cap) = required {
                if !backend.capabilities().contains(&cap) {
                    debug!(
                        backend = backend.id(),
                        ?cap,
                        "Skipping backend without required capability"
                    );
                    continue;
                }
            }

            if !self.ensure_ready(backend.as_ref(), diagnostics) {
                continue;
            }

            let start = Instant::now();
            match backend.synthesize(&request.text, Some(&language), out).await {
                Ok(()) => {
                    diagnostics.record(AttemptOutcome {
                        tier: Tier::Local,
                        target: backend.id().to_string(),
                        status: AttemptStatus::Success,
                        latency: start.elapsed(),
                        detail: None,
                    });
                    info!(backend = backend.id(), "Local synthesis complete");
                    return Some(Synthesized {
                        audio_path: out.to_path_buf(),
                        produced_by: format!("local {}", backend.id()),
                    });
                }
                Err(e) => {
                    warn!(backend = backend.id(), error = %e, "Backend failed on this input");
                    diagnostics.record(AttemptOutcome {
                        tier: Tier::Local,
                        target: backend.id().to_string(),
                        status: AttemptStatus::InferenceFailed,
                        latency: start.elapsed(),
                        detail: Some(e.to_string()),
                    });
                }
            }
        }

        None
    }

    /// Readiness check with two-phase initialization: strict loading
    /// first, relaxed on failure. The first fully failed attempt pins
    /// the backend unavailable for the rest of the process lifetime.
    fn ensure_ready(
        &self,
        backend: &dyn SynthesisBackend,
        diagnostics: &DiagnosticsReporter,
    ) -> bool {
        if let Some(&ready) = self.readiness.lock().unwrap().get(backend.id()) {
            return ready;
        }

        let start = Instant::now();
        let ready = match backend.initialize(LoadMode::Strict) {
            Ok(()) => true,
            Err(strict_err) => {
                warn!(
                    backend = backend.id(),
                    error = %strict_err,
                    "Strict load failed, retrying relaxed"
                );
                match backend.initialize(LoadMode::Relaxed) {
                    Ok(()) => true,
                    Err(relaxed_err) => {
                        diagnostics.record(AttemptOutcome {
                            tier: Tier::Local,
                            target: backend.id().to_string(),
                            status: AttemptStatus::InitFailed,
                            latency: start.elapsed(),
                            detail: Some(relaxed_err.to_string()),
                        });
                        false
                    }
                }
            }
        };

        if ready {
            info!(backend = backend.id(), "Backend ready");
        }

        // First writer wins; readiness never flips afterwards.
        *self
            .readiness
            .lock()
            .unwrap()
            .entry(backend.id().to_string())
            .or_insert(ready)
    }
}

/// Capability a request demands of its backend. An explicit model
/// override always wins over text classification.
fn required_capability(request: &SynthesisRequest) -> Option<Capability> {
    if let Some(ref model) = request.model_override {
        let lower = model.to_lowercase();
        if lower.contains("xtts") || lower.contains("multilingual") {
            return Some(Capability::HandlesCjk);
        }
        return None;
    }
    contains_cjk(&request.text).then_some(Capability::HandlesCjk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeBackend {
        id: String,
        caps: Vec<Capability>,
        fail_init: bool,
        fail_inference: bool,
        init_calls: Arc<AtomicUsize>,
        synth_calls: Arc<AtomicUsize>,
    }

    impl FakeBackend {
        fn new(id: &str, caps: Vec<Capability>) -> Self {
            Self {
                id: id.to_string(),
                caps,
                fail_init: false,
                fail_inference: false,
                init_calls: Arc::new(AtomicUsize::new(0)),
                synth_calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing_init(mut self) -> Self {
            self.fail_init = true;
            self
        }

        fn failing_inference(mut self) -> Self {
            self.fail_inference = true;
            self
        }
    }

    impl SynthesisBackend for FakeBackend {
        fn id(&self) -> &str {
            &self.id
        }

        fn capabilities(&self) -> &[Capability] {
            &self.caps
        }

        fn initialize(&self, _mode: LoadMode) -> anyhow::Result<()> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_init {
                anyhow::bail!("weights failed to load");
            }
            Ok(())
        }

        fn synthesize<'a>(
            &'a self,
            _text: &'a str,
            _language: Option<&'a str>,
            out: &'a Path,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
            self.synth_calls.fetch_add(1, Ordering::SeqCst);
            let fail = self.fail_inference;
            let out = out.to_path_buf();
            Box::pin(async move {
                if fail {
                    anyhow::bail!("inference blew up");
                }
                std::fs::write(&out, b"RIFFfakewav")?;
                Ok(())
            })
        }
    }

    fn request(text: &str) -> SynthesisRequest {
        SynthesisRequest {
            text: text.to_string(),
            language: None,
            output_path: None,
            model_override: None,
        }
    }

    fn temp_out() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("clipspeak-test-{}.wav", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_primary_backend_handles_plain_text() {
        let adapter = BackendAdapter::new(vec![
            Box::new(FakeBackend::new("primary", vec![])),
            Box::new(FakeBackend::new("secondary", vec![Capability::HandlesCjk])),
        ]);
        let diag = DiagnosticsReporter::new();

        let result = adapter
            .synthesize(&request("Hello"), &temp_out(), &diag)
            .await
            .unwrap();
        assert_eq!(result.produced_by, "local primary");
    }

    #[tokio::test]
    async fn test_cjk_text_skips_non_cjk_primary() {
        let primary = FakeBackend::new("primary", vec![]);
        let primary_synths = primary.synth_calls.clone();
        let adapter = BackendAdapter::new(vec![
            Box::new(primary),
            Box::new(FakeBackend::new("secondary", vec![Capability::HandlesCjk])),
        ]);
        let diag = DiagnosticsReporter::new();

        let result = adapter
            .synthesize(&request("这是一个测试"), &temp_out(), &diag)
            .await
            .unwrap();
        assert_eq!(result.produced_by, "local secondary");
        assert_eq!(primary_synths.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_model_override_wins_over_classification() {
        // CJK-free text, but the override demands the multilingual model.
        let adapter = BackendAdapter::new(vec![
            Box::new(FakeBackend::new("primary", vec![])),
            Box::new(FakeBackend::new("secondary", vec![Capability::HandlesCjk])),
        ]);
        let diag = DiagnosticsReporter::new();

        let mut req = request("Hello");
        req.model_override = Some("tts_models/multilingual/multi-dataset/xtts_v2".to_string());

        let result = adapter.synthesize(&req, &temp_out(), &diag).await.unwrap();
        assert_eq!(result.produced_by, "local secondary");
    }

    #[tokio::test]
    async fn test_failed_init_falls_through_to_last_resort() {
        let adapter = BackendAdapter::new(vec![
            Box::new(FakeBackend::new("primary", vec![]).failing_init()),
            Box::new(FakeBackend::new("secondary", vec![Capability::HandlesCjk]).failing_init()),
            Box::new(FakeBackend::new("system-voice", vec![Capability::HandlesCjk])),
        ]);
        let diag = DiagnosticsReporter::new();

        let result = adapter
            .synthesize(&request("Hello"), &temp_out(), &diag)
            .await
            .unwrap();
        assert_eq!(result.produced_by, "local system-voice");

        // Both failed initializations were recorded, not raised.
        let snap = diag.snapshot();
        let init_failures = snap
            .iter()
            .filter(|o| o.status == AttemptStatus::InitFailed)
            .count();
        assert_eq!(init_failures, 2);
    }

    #[tokio::test]
    async fn test_readiness_is_monotonic_across_requests() {
        let failing = FakeBackend::new("primary", vec![]).failing_init();
        let init_calls = failing.init_calls.clone();
        let adapter = BackendAdapter::new(vec![
            Box::new(failing),
            Box::new(FakeBackend::new("system-voice", vec![Capability::HandlesCjk])),
        ]);
        let diag = DiagnosticsReporter::new();

        for _ in 0..5 {
            let result = adapter
                .synthesize(&request("Hello"), &temp_out(), &diag)
                .await
                .unwrap();
            assert_eq!(result.produced_by, "local system-voice");
        }

        // Strict + relaxed on the first request only, never again.
        assert_eq!(init_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_all_backends_failing_returns_none() {
        let adapter = BackendAdapter::new(vec![
            Box::new(FakeBackend::new("primary", vec![]).failing_init()),
            Box::new(
                FakeBackend::new("system-voice", vec![Capability::HandlesCjk])
                    .failing_inference(),
            ),
        ]);
        let diag = DiagnosticsReporter::new();

        let result = adapter
            .synthesize(&request("Hello"), &temp_out(), &diag)
            .await;
        assert!(result.is_none());

        let snap = diag.snapshot();
        assert!(snap.iter().any(|o| o.status == AttemptStatus::InitFailed));
        assert!(snap
            .iter()
            .any(|o| o.status == AttemptStatus::InferenceFailed));
    }
}
