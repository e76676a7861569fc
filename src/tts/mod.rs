//! Local synthesis tier.
//!
//! Provides a common `SynthesisBackend` trait with implementations for:
//! - English ONNX model (behind the `onnx` feature)
//! - Multilingual ONNX model with reference-audio conditioning
//! - Operating-system voice utility (always available, last resort)

pub mod adapter;
pub mod model;
pub mod playback;
pub mod system;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

/// Capability tags advertised by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Can pronounce CJK text.
    HandlesCjk,
    /// Needs a reference audio clip for voice conditioning.
    RequiresReferenceAudio,
}

/// How hard to validate model weights during initialization.
///
/// Strict loading is tried first; some exported graphs only load in
/// relaxed mode, so a strict failure is retried relaxed before the
/// backend is written off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    Strict,
    Relaxed,
}

/// Common trait for all local synthesis backends (dyn-compatible).
pub trait SynthesisBackend: Send + Sync {
    /// Stable identifier, e.g. "tacotron-en".
    fn id(&self) -> &str;

    fn capabilities(&self) -> &[Capability];

    /// Load the backend. The adapter calls this at most twice per
    /// process lifetime (strict, then relaxed) and never again once
    /// both modes have failed.
    fn initialize(&self, mode: LoadMode) -> anyhow::Result<()>;

    /// Synthesize text to a WAV artifact at `out`.
    fn synthesize<'a>(
        &'a self,
        text: &'a str,
        language: Option<&'a str>,
        out: &'a Path,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;
}

/// True when the text contains CJK unified ideographs, which the
/// English-only backends cannot pronounce.
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c))
}

/// Allocate a fresh artifact path in the OS temp dir.
pub fn default_artifact_path() -> PathBuf {
    std::env::temp_dir().join(format!("clipspeak-{}.wav", uuid::Uuid::new_v4()))
}
