//! ONNX model backends.
//!
//! The real implementations are gated behind the `onnx` feature. When
//! the feature is disabled, stubs are provided whose initialization
//! always fails, which pushes the adapter down to the OS voice.

use super::{Capability, LoadMode, SynthesisBackend};

// ── onnx enabled ────────────────────────────────────────────────
#[cfg(feature = "onnx")]
mod inner {
    use std::future::Future;
    use std::path::{Path, PathBuf};
    use std::pin::Pin;
    use std::sync::Mutex;

    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use tracing::{debug, info};

    use super::{Capability, LoadMode, SynthesisBackend};

    const SAMPLE_RATE: u32 = 22050;
    /// Model context length; longer inputs are synthesized in chunks.
    const MAX_INPUT_TOKENS: usize = 512;

    /// Build an inference session for the given loading mode.
    ///
    /// Strict runs the full optimization passes, which also validate
    /// the graph; relaxed disables them because some exported graphs
    /// fail shape inference during optimization but still execute.
    fn build_session(model_path: &Path, mode: LoadMode) -> anyhow::Result<Session> {
        if !model_path.exists() {
            anyhow::bail!(
                "model not found: {}. Download it into the model directory.",
                model_path.display()
            );
        }
        let level = match mode {
            LoadMode::Strict => GraphOptimizationLevel::Level3,
            LoadMode::Relaxed => GraphOptimizationLevel::Disable,
        };
        let session = Session::builder()?
            .with_optimization_level(level)?
            .commit_from_file(model_path)?;
        Ok(session)
    }

    /// Encode text as codepoint token IDs, the input representation
    /// both bundled models were exported with.
    fn encode_text(text: &str) -> Vec<i64> {
        text.chars().map(|c| c as i64).collect()
    }

    fn write_wav(out: &Path, samples: &[f32]) -> anyhow::Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(out, spec)?;
        for &s in samples {
            writer.write_sample(s)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Run one chunk of tokens through a session, returning samples.
    fn infer_chunk(session: &mut Session, tokens: &[i64]) -> anyhow::Result<Vec<f32>> {
        let input = ort::value::Tensor::from_array((
            vec![1i64, tokens.len() as i64],
            tokens.to_vec().into_boxed_slice(),
        ))?;
        let outputs = session.run(ort::inputs! { "text" => input })?;
        let (_shape, audio) = outputs[0].try_extract_tensor::<f32>()?;
        Ok(audio.to_vec())
    }

    fn synthesize_with(session: &Mutex<Option<Session>>, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut guard = session.lock().unwrap();
        let session = guard
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("backend not initialized"))?;

        let tokens = encode_text(text);
        if tokens.is_empty() {
            anyhow::bail!("no tokens for input text");
        }

        let mut all_audio = Vec::new();
        for chunk in tokens.chunks(MAX_INPUT_TOKENS) {
            let audio = infer_chunk(session, chunk)?;
            all_audio.extend_from_slice(&audio);
        }

        if all_audio.is_empty() {
            anyhow::bail!("no audio generated for input text");
        }
        Ok(all_audio)
    }

    // ── English model ───────────────────────────────────────────

    pub struct EnglishModel {
        model_path: PathBuf,
        session: Mutex<Option<Session>>,
    }

    impl EnglishModel {
        pub fn new(model_dir: &Path) -> Self {
            Self {
                model_path: model_dir.join("tacotron-en.onnx"),
                session: Mutex::new(None),
            }
        }
    }

    impl SynthesisBackend for EnglishModel {
        fn id(&self) -> &str {
            "tacotron-en"
        }

        fn capabilities(&self) -> &[Capability] {
            &[]
        }

        fn initialize(&self, mode: LoadMode) -> anyhow::Result<()> {
            let mut guard = self.session.lock().unwrap();
            if guard.is_some() {
                return Ok(());
            }
            let session = build_session(&self.model_path, mode)?;
            info!(model = %self.model_path.display(), ?mode, "English model loaded");
            *guard = Some(session);
            Ok(())
        }

        fn synthesize<'a>(
            &'a self,
            text: &'a str,
            _language: Option<&'a str>,
            out: &'a Path,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
            Box::pin(async move {
                let samples = synthesize_with(&self.session, text)?;
                write_wav(out, &samples)?;
                info!(
                    samples = samples.len(),
                    duration_secs = samples.len() as f64 / SAMPLE_RATE as f64,
                    "English model synthesis complete"
                );
                Ok(())
            })
        }
    }

    // ── Multilingual model ──────────────────────────────────────

    pub struct MultilingualModel {
        model_path: PathBuf,
        reference_path: PathBuf,
        session: Mutex<Option<Session>>,
    }

    impl MultilingualModel {
        pub fn new(model_dir: &Path) -> Self {
            Self {
                model_path: model_dir.join("xtts-multilingual.onnx"),
                reference_path: model_dir.join("reference.wav"),
                session: Mutex::new(None),
            }
        }

        /// Reference audio samples for voice conditioning.
        fn load_reference(&self) -> anyhow::Result<Vec<f32>> {
            let mut reader = hound::WavReader::open(&self.reference_path).map_err(|e| {
                anyhow::anyhow!(
                    "reference audio missing at {}: {e}",
                    self.reference_path.display()
                )
            })?;
            let samples: Result<Vec<f32>, _> = match reader.spec().sample_format {
                hound::SampleFormat::Float => reader.samples::<f32>().collect(),
                hound::SampleFormat::Int => reader
                    .samples::<i16>()
                    .map(|s| s.map(|v| v as f32 / 32768.0))
                    .collect(),
            };
            Ok(samples?)
        }
    }

    impl SynthesisBackend for MultilingualModel {
        fn id(&self) -> &str {
            "xtts-multilingual"
        }

        fn capabilities(&self) -> &[Capability] {
            &[Capability::HandlesCjk, Capability::RequiresReferenceAudio]
        }

        fn initialize(&self, mode: LoadMode) -> anyhow::Result<()> {
            let mut guard = self.session.lock().unwrap();
            if guard.is_some() {
                return Ok(());
            }
            let session = build_session(&self.model_path, mode)?;
            info!(model = %self.model_path.display(), ?mode, "Multilingual model loaded");
            *guard = Some(session);
            Ok(())
        }

        fn synthesize<'a>(
            &'a self,
            text: &'a str,
            language: Option<&'a str>,
            out: &'a Path,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
            Box::pin(async move {
                let reference = self.load_reference()?;
                debug!(
                    reference_samples = reference.len(),
                    language = ?language,
                    "Conditioning on reference audio"
                );

                let mut guard = self.session.lock().unwrap();
                let session = guard
                    .as_mut()
                    .ok_or_else(|| anyhow::anyhow!("backend not initialized"))?;

                let tokens = encode_text(text);
                if tokens.is_empty() {
                    anyhow::bail!("no tokens for input text");
                }

                let mut all_audio = Vec::new();
                for chunk in tokens.chunks(MAX_INPUT_TOKENS) {
                    let text_input = ort::value::Tensor::from_array((
                        vec![1i64, chunk.len() as i64],
                        chunk.to_vec().into_boxed_slice(),
                    ))?;
                    let speaker_input = ort::value::Tensor::from_array((
                        vec![1i64, reference.len() as i64],
                        reference.clone().into_boxed_slice(),
                    ))?;
                    let outputs = session.run(ort::inputs! {
                        "text" => text_input,
                        "speaker" => speaker_input
                    })?;
                    let (_shape, audio) = outputs[0].try_extract_tensor::<f32>()?;
                    all_audio.extend_from_slice(audio);
                }
                drop(guard);

                if all_audio.is_empty() {
                    anyhow::bail!("no audio generated for input text");
                }
                write_wav(out, &all_audio)?;
                info!(
                    samples = all_audio.len(),
                    duration_secs = all_audio.len() as f64 / SAMPLE_RATE as f64,
                    "Multilingual model synthesis complete"
                );
                Ok(())
            })
        }
    }
}

// ── onnx disabled (stubs) ───────────────────────────────────────
#[cfg(not(feature = "onnx"))]
mod inner {
    use std::future::Future;
    use std::path::Path;
    use std::pin::Pin;

    use tracing::warn;

    use super::{Capability, LoadMode, SynthesisBackend};

    pub struct EnglishModel;

    impl EnglishModel {
        pub fn new(_model_dir: &Path) -> Self {
            Self
        }
    }

    impl SynthesisBackend for EnglishModel {
        fn id(&self) -> &str {
            "tacotron-en"
        }

        fn capabilities(&self) -> &[Capability] {
            &[]
        }

        fn initialize(&self, _mode: LoadMode) -> anyhow::Result<()> {
            warn!("English model requested but the onnx feature is disabled");
            anyhow::bail!("local model synthesis is not available (compile with --features onnx)")
        }

        fn synthesize<'a>(
            &'a self,
            _text: &'a str,
            _language: Option<&'a str>,
            _out: &'a Path,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
            Box::pin(async {
                anyhow::bail!(
                    "local model synthesis is not available (compile with --features onnx)"
                )
            })
        }
    }

    pub struct MultilingualModel;

    impl MultilingualModel {
        pub fn new(_model_dir: &Path) -> Self {
            Self
        }
    }

    impl SynthesisBackend for MultilingualModel {
        fn id(&self) -> &str {
            "xtts-multilingual"
        }

        fn capabilities(&self) -> &[Capability] {
            &[Capability::HandlesCjk, Capability::RequiresReferenceAudio]
        }

        fn initialize(&self, _mode: LoadMode) -> anyhow::Result<()> {
            warn!("Multilingual model requested but the onnx feature is disabled");
            anyhow::bail!("local model synthesis is not available (compile with --features onnx)")
        }

        fn synthesize<'a>(
            &'a self,
            _text: &'a str,
            _language: Option<&'a str>,
            _out: &'a Path,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
            Box::pin(async {
                anyhow::bail!(
                    "local model synthesis is not available (compile with --features onnx)"
                )
            })
        }
    }
}

pub use inner::{EnglishModel, MultilingualModel};
