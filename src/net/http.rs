//! Structured HTTP dispatcher.
//!
//! The preferred tier: GET /health to confirm the peer really is the
//! synthesis service, then POST /tts with a JSON body and the audio
//! bytes back in the response. Non-success statuses and malformed
//! payloads classify as protocol errors so the orchestrator can advance
//! to the next candidate.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info};

use crate::diagnostics::{AttemptStatus, Tier};
use crate::orchestrator::SynthesisRequest;

use super::{Candidate, DispatchOutcome, RemoteDispatch};

/// Default English model, matching the service's own default.
pub const DEFAULT_MODEL: &str = "tts_models/en/ljspeech/tacotron2-DDC";
/// Multilingual model required for CJK text.
pub const MULTILINGUAL_MODEL: &str = "tts_models/multilingual/multi-dataset/xtts_v2";

/// Pick the remote model name for a request: explicit override wins,
/// otherwise CJK classification selects the multilingual model.
pub fn model_for(request: &SynthesisRequest) -> String {
    if let Some(ref model) = request.model_override {
        return model.clone();
    }
    if crate::tts::contains_cjk(&request.text) {
        MULTILINGUAL_MODEL.to_string()
    } else {
        DEFAULT_MODEL.to_string()
    }
}

pub struct HttpDispatcher {
    client: reqwest::Client,
    health_timeout: Duration,
    synth_timeout: Duration,
}

impl HttpDispatcher {
    pub fn new(health_timeout: Duration, synth_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            health_timeout,
            synth_timeout,
        }
    }

    /// GET /health, expecting `{"status": "running"}`.
    pub async fn check_health(&self, base_url: &str) -> anyhow::Result<()> {
        let resp = self
            .client
            .get(format!("{base_url}/health"))
            .timeout(self.health_timeout)
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("health endpoint returned {}", resp.status());
        }
        let body: serde_json::Value = resp.json().await?;
        if body.get("status").and_then(|s| s.as_str()) != Some("running") {
            anyhow::bail!("unexpected health payload: {body}");
        }
        Ok(())
    }

    /// GET /models: identifiers of the models the service has loaded.
    pub async fn list_models(&self, base_url: &str) -> anyhow::Result<Vec<String>> {
        let resp = self
            .client
            .get(format!("{base_url}/models"))
            .timeout(self.health_timeout)
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("models endpoint returned {}", resp.status());
        }
        let body: serde_json::Value = resp.json().await?;
        let models = body
            .get("loaded_models")
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        Ok(models)
    }

    async fn attempt(
        &self,
        candidate: &Candidate,
        request: &SynthesisRequest,
        artifact_path: &Path,
    ) -> DispatchOutcome {
        let base_url = candidate.base_url();

        if let Err(e) = self.check_health(&base_url).await {
            return classify_error(e, "health check failed");
        }

        let mut payload = json!({
            "text": request.text,
            "model_name": model_for(request),
        });
        if let Some(ref language) = request.language {
            payload["language"] = json!(language);
        }

        debug!(url = %base_url, "Requesting synthesis over HTTP");

        let resp = match self
            .client
            .post(format!("{base_url}/tts"))
            .json(&payload)
            .timeout(self.synth_timeout)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return classify_error(e.into(), "synthesis request failed"),
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return DispatchOutcome::failed(
                AttemptStatus::ProtocolError,
                format!("service returned {status}: {body}"),
            );
        }

        let bytes = match resp.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return classify_error(e.into(), "failed to read audio body"),
        };
        if bytes.is_empty() {
            return DispatchOutcome::failed(AttemptStatus::ProtocolError, "empty audio body");
        }

        if let Err(e) = tokio::fs::write(artifact_path, &bytes).await {
            return DispatchOutcome::failed(
                AttemptStatus::ProtocolError,
                format!("failed to write artifact: {e}"),
            );
        }

        info!(
            bytes = bytes.len(),
            path = %artifact_path.display(),
            "HTTP synthesis complete"
        );
        DispatchOutcome::success()
    }
}

/// Map a transport-level error onto the attempt taxonomy.
fn classify_error(e: anyhow::Error, context: &str) -> DispatchOutcome {
    let status = match e.downcast_ref::<reqwest::Error>() {
        Some(re) if re.is_timeout() => AttemptStatus::Timeout,
        Some(re) if re.is_connect() => AttemptStatus::Unreachable,
        Some(_) => AttemptStatus::ProtocolError,
        None => AttemptStatus::ProtocolError,
    };
    DispatchOutcome::failed(status, format!("{context}: {e}"))
}

impl RemoteDispatch for HttpDispatcher {
    fn tier(&self) -> Tier {
        Tier::Http
    }

    fn dispatch<'a>(
        &'a self,
        candidate: &'a Candidate,
        request: &'a SynthesisRequest,
        artifact_path: &'a Path,
    ) -> Pin<Box<dyn Future<Output = DispatchOutcome> + Send + 'a>> {
        Box::pin(self.attempt(candidate, request, artifact_path))
    }
}
