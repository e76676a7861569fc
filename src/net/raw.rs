//! Raw TCP dispatcher.
//!
//! Used when the port accepts connections but the HTTP layer is being
//! interfered with (VPN gateways that answer every HTTP request with
//! their own error page). One framed JSON request out, one response
//! frame back.
//!
//! Framing convention: the request frame is terminated by shutting down
//! the write half of the connection; the response frame is terminated
//! by peer close, bounded by the dispatch timeout. The service writes
//! the audio artifact to `output_path` itself (it runs on the same
//! machine), so a successful exchange is confirmed by a non-empty
//! artifact file, and a truncated or unparseable response counts as a
//! protocol error.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::diagnostics::{AttemptStatus, Tier};
use crate::orchestrator::SynthesisRequest;

use super::http::model_for;
use super::{Candidate, DispatchOutcome, RemoteDispatch};

#[derive(Debug, Serialize)]
struct RawRequest<'a> {
    text: &'a str,
    output_path: &'a str,
    model_name: &'a str,
}

/// Response frame: JSON with an optional error, or plain text.
#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    error: Option<String>,
}

pub struct RawDispatcher {
    dispatch_timeout: Duration,
}

impl RawDispatcher {
    pub fn new(dispatch_timeout: Duration) -> Self {
        Self { dispatch_timeout }
    }

    async fn attempt(
        &self,
        candidate: &Candidate,
        request: &SynthesisRequest,
        artifact_path: &Path,
    ) -> DispatchOutcome {
        let model_name = model_for(request);
        let output_path = artifact_path.to_string_lossy();
        let frame = match serde_json::to_vec(&RawRequest {
            text: &request.text,
            output_path: &output_path,
            model_name: &model_name,
        }) {
            Ok(frame) => frame,
            Err(e) => {
                return DispatchOutcome::failed(
                    AttemptStatus::ProtocolError,
                    format!("failed to encode request frame: {e}"),
                )
            }
        };

        let addr = candidate.authority();
        debug!(addr = %addr, "Dispatching over raw TCP");

        let exchange = async {
            let mut stream = TcpStream::connect(&addr).await?;
            stream.write_all(&frame).await?;
            // Write-half close marks the end of the request frame.
            stream.shutdown().await?;
            let mut response = Vec::new();
            stream.read_to_end(&mut response).await?;
            Ok::<Vec<u8>, std::io::Error>(response)
        };

        let response = match timeout(self.dispatch_timeout, exchange).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                return DispatchOutcome::failed(AttemptStatus::ConnectionRefused, e.to_string())
            }
            Ok(Err(e)) => {
                return DispatchOutcome::failed(AttemptStatus::Unreachable, e.to_string())
            }
            Err(_) => {
                return DispatchOutcome::failed(
                    AttemptStatus::Timeout,
                    format!("no response within {:?}", self.dispatch_timeout),
                )
            }
        };

        if response.is_empty() {
            return DispatchOutcome::failed(AttemptStatus::ProtocolError, "empty response frame");
        }

        if let Ok(parsed) = serde_json::from_slice::<RawResponse>(&response) {
            if let Some(error) = parsed.error {
                return DispatchOutcome::failed(
                    AttemptStatus::ProtocolError,
                    format!("service reported: {error}"),
                );
            }
        }
        // Plain-text acknowledgements are accepted as-is.

        match std::fs::metadata(artifact_path) {
            Ok(meta) if meta.len() > 0 => {
                info!(
                    bytes = meta.len(),
                    path = %artifact_path.display(),
                    "Raw TCP synthesis complete"
                );
                DispatchOutcome::success()
            }
            _ => DispatchOutcome::failed(
                AttemptStatus::ProtocolError,
                "service acknowledged but wrote no audio artifact",
            ),
        }
    }
}

impl RemoteDispatch for RawDispatcher {
    fn tier(&self) -> Tier {
        Tier::RawTcp
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::TransportKind;
    use tokio::net::TcpListener;

    fn request(text: &str) -> SynthesisRequest {
        SynthesisRequest {
            text: text.to_string(),
            language: None,
            output_path: None,
            model_override: None,
        }
    }

    fn candidate(port: u16) -> Candidate {
        Candidate {
            host: "127.0.0.1".to_string(),
            port,
            transport: TransportKind::RawTcp,
            rank: 0,
        }
    }

    fn temp_artifact() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("clipspeak-test-{}.wav", uuid::Uuid::new_v4()))
    }

    /// Fake service: reads the request frame, writes the artifact file
    /// named inside it, and acknowledges.
    async fn spawn_happy_service() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut frame = Vec::new();
            stream.read_to_end(&mut frame).await.unwrap();

            let parsed: serde_json::Value = serde_json::from_slice(&frame).unwrap();
            let out = parsed["output_path"].as_str().unwrap();
            std::fs::write(out, b"RIFFfakewav").unwrap();

            stream
                .write_all(br#"{"status": "ok"}"#)
                .await
                .unwrap();
        });
        port
    }

    #[tokio::test]
    async fn test_dispatch_success_when_artifact_written() {
        let port = spawn_happy_service().await;
        let dispatcher = RawDispatcher::new(Duration::from_secs(5));
        let out = temp_artifact();

        let outcome = dispatcher
            .dispatch(&candidate(port), &request("Hello"), &out)
            .await;

        assert_eq!(outcome.status, AttemptStatus::Success);
        assert!(std::fs::metadata(&out).unwrap().len() > 0);
        let _ = std::fs::remove_file(&out);
    }

    #[tokio::test]
    async fn test_dispatch_protocol_error_without_artifact() {
        // Acknowledges but never writes the file.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut frame = Vec::new();
            stream.read_to_end(&mut frame).await.unwrap();
            stream.write_all(b"done").await.unwrap();
        });

        let dispatcher = RawDispatcher::new(Duration::from_secs(5));
        let outcome = dispatcher
            .dispatch(&candidate(port), &request("Hello"), &temp_artifact())
            .await;

        assert_eq!(outcome.status, AttemptStatus::ProtocolError);
        assert!(outcome.detail.unwrap().contains("no audio artifact"));
    }

    #[tokio::test]
    async fn test_dispatch_protocol_error_on_service_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut frame = Vec::new();
            stream.read_to_end(&mut frame).await.unwrap();
            stream
                .write_all(br#"{"error": "model failed to load"}"#)
                .await
                .unwrap();
        });

        let dispatcher = RawDispatcher::new(Duration::from_secs(5));
        let outcome = dispatcher
            .dispatch(&candidate(port), &request("Hello"), &temp_artifact())
            .await;

        assert_eq!(outcome.status, AttemptStatus::ProtocolError);
        assert!(outcome.detail.unwrap().contains("model failed to load"));
    }

    #[tokio::test]
    async fn test_dispatch_timeout_on_silent_peer() {
        // Accepts and then never responds or closes.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let dispatcher = RawDispatcher::new(Duration::from_millis(200));
        let outcome = dispatcher
            .dispatch(&candidate(port), &request("Hello"), &temp_artifact())
            .await;

        assert_eq!(outcome.status, AttemptStatus::Timeout);
    }
}
